//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish side of the queue event pipeline. It is
//! shared via `Arc<EventBus>` between every tenant's player and the
//! [`Broadcaster`](crate::Broadcaster) that fans events out per tenant.

use shanty_core::types::TenantId;
use tokio::sync::broadcast;

use crate::event::{QueueEvent, TenantEvent};

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Publishing is synchronous and never waits on a consumer, so it is safe
/// to call while holding a player's session lock.
pub struct EventBus {
    sender: broadcast::Sender<TenantEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event for one tenant.
    pub fn publish(&self, tenant_id: impl Into<TenantId>, event: QueueEvent) {
        let event = TenantEvent::new(tenant_id, event);
        tracing::trace!(tenant_id = %event.tenant_id, kind = event.event.kind(), "Publishing queue event");
        // Zero receivers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to every tenant's events.
    pub fn subscribe(&self) -> broadcast::Receiver<TenantEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
