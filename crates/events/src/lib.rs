//! Queue lifecycle events and their fan-out.
//!
//! - [`QueueEvent`] / [`TenantEvent`]: the lifecycle variants published by
//!   the playback controller, denormalised so subscribers can render
//!   without a follow-up query.
//! - [`EventBus`]: in-process publish hub backed by
//!   `tokio::sync::broadcast`; publishing never blocks the publisher.
//! - [`Broadcaster`]: per-tenant subscriber registry that consumes the
//!   bus and delivers to each subscriber in isolation.

pub mod broadcaster;
pub mod bus;
pub mod event;

pub use broadcaster::{Broadcaster, Subscription, SubscriptionHandle};
pub use bus::EventBus;
pub use event::{QueueEvent, TenantEvent};
