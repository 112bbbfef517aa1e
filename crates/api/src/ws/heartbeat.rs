use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// Spawn a background task that pings every event feed and voice bridge
/// each `period`, dropping sockets whose writer has already gone away.
/// Runs until `shutdown` is cancelled.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    period: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let stale = ws_manager.ping_all().await;
            let (events, voice) = ws_manager.kind_counts().await;
            if stale > 0 {
                tracing::info!(stale, events, voice, "Dropped stale WebSocket connections");
            } else {
                tracing::debug!(events, voice, "WebSocket heartbeat ping");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;

    use super::*;
    use crate::ws::SocketKind;

    #[tokio::test]
    async fn pings_until_cancelled() {
        let manager = Arc::new(WsManager::new());
        let (_tx, mut rx) = manager.add("a".into(), "g1", SocketKind::Voice).await;
        let (_tx2, gone) = manager.add("b".into(), "g1", SocketKind::Events).await;
        drop(gone);

        let shutdown = CancellationToken::new();
        let handle = start_heartbeat(
            Arc::clone(&manager),
            Duration::from_millis(10),
            shutdown.clone(),
        );

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(matches!(first, Some(Message::Ping(_))));
        assert_eq!(manager.connection_count().await, 1);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
