//! Error types for subscription bookkeeping.
//!
//! Neither error is fatal: the bus logs it and leaves its subscriber list
//! unchanged. They are returned so callers and tests can observe the
//! mistake.

/// Errors returned by [`EventBus::subscribe`](crate::EventBus::subscribe)
/// and [`EventBus::unsubscribe`](crate::EventBus::unsubscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The listener is already subscribed; re-subscription is unsupported.
    #[error("listener is already subscribed to the event bus")]
    AlreadySubscribed,

    /// The listener is not subscribed.
    #[error("listener is not subscribed to the event bus")]
    NotSubscribed,
}
