//! Live voice connections the pipeline writes decoded audio into.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shanty_core::types::TenantId;
use tokio::sync::RwLock;

use crate::error::PipelineError;

/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;
/// Interleaved output channels.
pub const CHANNELS: usize = 2;
/// Samples per channel in one frame.
pub const FRAME_SAMPLES: usize = 960;
/// Bytes in one s16le frame (960 samples x 2 channels x 2 bytes).
pub const FRAME_BYTES: usize = FRAME_SAMPLES * CHANNELS * 2;
/// Wall-clock length of one frame.
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// 20 ms of interleaved 48 kHz stereo s16le PCM.
pub type PcmFrame = Vec<u8>;

/// A tenant's real-time audio transport.
#[async_trait]
pub trait LiveConnection: Send + Sync {
    /// Whether frames can be delivered right now.
    fn is_ready(&self) -> bool;

    /// Toggle the "speaking" indicator shown to listeners.
    async fn set_speaking(&self, speaking: bool) -> Result<(), PipelineError>;

    async fn send_frame(&self, frame: PcmFrame) -> Result<(), PipelineError>;
}

/// Lookup of the live connection for a tenant.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connection(&self, tenant_id: &str) -> Option<Arc<dyn LiveConnection>>;
}

/// In-process [`VoiceGateway`]: the gateway client or the voice-bridge
/// socket attaches a connection per tenant and detaches it when it goes
/// away.
#[derive(Default)]
pub struct ConnectionTable {
    connections: RwLock<HashMap<TenantId, Arc<dyn LiveConnection>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `conn` as the tenant's connection, replacing any previous one.
    pub async fn attach(&self, tenant_id: &str, conn: Arc<dyn LiveConnection>) {
        let replaced = self
            .connections
            .write()
            .await
            .insert(tenant_id.to_string(), conn)
            .is_some();
        tracing::info!(tenant_id, replaced, "Voice connection attached");
    }

    /// Remove the tenant's connection, but only if it is still `conn`; a
    /// newer connection attached in the meantime is left alone.
    pub async fn detach(&self, tenant_id: &str, conn: &Arc<dyn LiveConnection>) -> bool {
        let mut conns = self.connections.write().await;
        let same = conns
            .get(tenant_id)
            .is_some_and(|current| Arc::ptr_eq(current, conn));
        if same {
            conns.remove(tenant_id);
            tracing::info!(tenant_id, "Voice connection detached");
        }
        same
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

#[async_trait]
impl VoiceGateway for ConnectionTable {
    async fn connection(&self, tenant_id: &str) -> Option<Arc<dyn LiveConnection>> {
        self.connections.read().await.get(tenant_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct Dummy(AtomicBool);

    #[async_trait]
    impl LiveConnection for Dummy {
        fn is_ready(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
        async fn set_speaking(&self, _speaking: bool) -> Result<(), PipelineError> {
            Ok(())
        }
        async fn send_frame(&self, _frame: PcmFrame) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    #[test]
    fn frame_geometry() {
        assert_eq!(FRAME_BYTES, 3840);
        assert_eq!(
            FRAME_SAMPLES as u32 * 1000 / SAMPLE_RATE,
            FRAME_DURATION.as_millis() as u32
        );
    }

    #[tokio::test]
    async fn detach_ignores_stale_connection() {
        let table = ConnectionTable::new();
        let old: Arc<dyn LiveConnection> = Arc::new(Dummy(AtomicBool::new(true)));
        let new: Arc<dyn LiveConnection> = Arc::new(Dummy(AtomicBool::new(true)));

        table.attach("g1", Arc::clone(&old)).await;
        table.attach("g1", Arc::clone(&new)).await;

        assert!(!table.detach("g1", &old).await);
        assert!(table.connection("g1").await.is_some());
        assert!(table.detach("g1", &new).await);
        assert!(table.connection("g1").await.is_none());
        assert!(table.is_empty().await);
    }
}
