//! Per-tenant fan-out of queue events.
//!
//! [`Broadcaster`] keeps, for every tenant, the set of live subscribers
//! (dashboard feeds, chat notifiers). It consumes the [`EventBus`] and
//! delivers each event only to subscribers of the event's tenant. Each
//! subscriber has its own bounded buffer: a slow or dead subscriber loses
//! events or is pruned, but never holds up the others or the publisher.
//!
//! [`EventBus`]: crate::EventBus

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use shanty_core::types::TenantId;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::event::TenantEvent;

/// Default per-subscriber buffer.
const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Identifies one subscription so it can be removed later.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: u64,
    pub tenant_id: TenantId,
}

/// The receiving end of a subscription.
///
/// Dropping it is enough to unsubscribe: the next dispatch to its tenant
/// finds the channel closed and prunes it.
pub struct Subscription {
    handle: SubscriptionHandle,
    receiver: mpsc::Receiver<TenantEvent>,
}

impl Subscription {
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Wait for the next event. `None` once the broadcaster dropped this
    /// subscription.
    pub async fn recv(&mut self) -> Option<TenantEvent> {
        self.receiver.recv().await
    }

    /// Non-blocking receive, used by tests and polling consumers.
    pub fn try_recv(&mut self) -> Option<TenantEvent> {
        self.receiver.try_recv().ok()
    }
}

type SubscriberMap = HashMap<TenantId, HashMap<u64, mpsc::Sender<TenantEvent>>>;

/// Registry of per-tenant subscribers.
pub struct Broadcaster {
    subscribers: RwLock<SubscriberMap>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Broadcaster {
    /// Create a broadcaster whose subscribers buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a subscriber for one tenant's events.
    pub async fn subscribe(&self, tenant_id: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers
            .write()
            .await
            .entry(tenant_id.to_string())
            .or_default()
            .insert(id, tx);

        tracing::debug!(tenant_id, subscription_id = id, "Subscriber added");
        Subscription {
            handle: SubscriptionHandle {
                id,
                tenant_id: tenant_id.to_string(),
            },
            receiver: rx,
        }
    }

    /// Remove a subscriber. Returns `false` when it was already gone.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut subs = self.subscribers.write().await;
        let Some(tenant) = subs.get_mut(&handle.tenant_id) else {
            return false;
        };
        let removed = tenant.remove(&handle.id).is_some();
        if tenant.is_empty() {
            subs.remove(&handle.tenant_id);
        }
        if removed {
            tracing::debug!(
                tenant_id = %handle.tenant_id,
                subscription_id = handle.id,
                "Subscriber removed"
            );
        }
        removed
    }

    /// Number of live subscribers for a tenant.
    pub async fn subscriber_count(&self, tenant_id: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(tenant_id)
            .map_or(0, HashMap::len)
    }

    /// Deliver one event to every subscriber of its tenant.
    ///
    /// Returns how many subscribers accepted it. A full buffer drops the
    /// event for that subscriber only; a closed one is pruned.
    pub async fn dispatch(&self, event: &TenantEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let subs = self.subscribers.read().await;
            let Some(tenant) = subs.get(&event.tenant_id) else {
                return 0;
            };
            for (id, tx) in tenant {
                match tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            tenant_id = %event.tenant_id,
                            subscription_id = id,
                            kind = event.event.kind(),
                            "Subscriber buffer full, event dropped"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subs = self.subscribers.write().await;
            if let Some(tenant) = subs.get_mut(&event.tenant_id) {
                tenant.retain(|id, tx| !(closed.contains(id) && tx.is_closed()));
                if tenant.is_empty() {
                    subs.remove(&event.tenant_id);
                }
            }
            tracing::debug!(
                tenant_id = %event.tenant_id,
                pruned = closed.len(),
                "Pruned closed subscribers"
            );
        }

        delivered
    }

    /// Consume the bus until it closes, dispatching every event.
    pub async fn run(self: Arc<Self>, mut receiver: broadcast::Receiver<TenantEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    self.dispatch(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event broadcaster lagged, some events were not delivered");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, broadcaster shutting down");
                    break;
                }
            }
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::event::tests::entry;
    use crate::event::QueueEvent;
    use crate::EventBus;

    fn added(tenant: &str, id: i64) -> TenantEvent {
        TenantEvent::new(tenant, QueueEvent::Added { entry: entry(id, tenant) })
    }

    #[tokio::test]
    async fn delivers_only_to_matching_tenant() {
        let b = Broadcaster::default();
        let mut g1 = b.subscribe("g1").await;
        let mut g2 = b.subscribe("g2").await;

        assert_eq!(b.dispatch(&added("g1", 1)).await, 1);

        assert_eq!(g1.try_recv().map(|e| e.event.request_id()), Some(Some(1)));
        assert!(g2.try_recv().is_none());
    }

    #[tokio::test]
    async fn preserves_publication_order() {
        let b = Broadcaster::default();
        let mut sub = b.subscribe("g1").await;

        for id in 1..=5 {
            b.dispatch(&added("g1", id)).await;
        }
        let ids: Vec<_> = std::iter::from_fn(|| sub.try_recv())
            .filter_map(|e| e.event.request_id())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn full_subscriber_does_not_block_others() {
        let b = Broadcaster::new(1);
        let mut slow = b.subscribe("g1").await;
        let mut fast = b.subscribe("g1").await;

        assert_eq!(b.dispatch(&added("g1", 1)).await, 2);
        fast.try_recv().unwrap();

        // `slow` still holds event 1, so event 2 is dropped for it only.
        assert_eq!(b.dispatch(&added("g1", 2)).await, 1);
        assert_eq!(fast.try_recv().and_then(|e| e.event.request_id()), Some(2));
        assert_eq!(slow.try_recv().and_then(|e| e.event.request_id()), Some(1));
        assert!(slow.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned() {
        let b = Broadcaster::default();
        let sub = b.subscribe("g1").await;
        let _live = b.subscribe("g1").await;
        assert_eq!(b.subscriber_count("g1").await, 2);

        drop(sub);
        assert_eq!(b.dispatch(&added("g1", 1)).await, 1);
        assert_eq!(b.subscriber_count("g1").await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let b = Broadcaster::default();
        let sub = b.subscribe("g1").await;
        let handle = sub.handle().clone();

        assert!(b.unsubscribe(&handle).await);
        assert!(!b.unsubscribe(&handle).await);
        assert_eq!(b.subscriber_count("g1").await, 0);
    }

    #[tokio::test]
    async fn run_forwards_bus_events() {
        let bus = EventBus::default();
        let b = Arc::new(Broadcaster::default());
        let mut sub = b.subscribe("g1").await;
        let task = tokio::spawn(Arc::clone(&b).run(bus.subscribe()));

        bus.publish("g1", QueueEvent::SkippedAll { cleared: 4 });
        let got = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("event in time")
            .expect("subscription open");
        assert_eq!(got.event, QueueEvent::SkippedAll { cleared: 4 });

        drop(bus);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("broadcaster stops when bus closes")
            .unwrap();
    }
}
