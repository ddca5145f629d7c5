//! Thread-affinity delivery: worker pool, owning-thread contexts, dispatcher.

pub mod context;
pub mod dispatcher;
pub mod pool;

pub use context::DeliveryContext;
pub use dispatcher::DeliveryDispatcher;

pub(crate) use context::ContextHandle;

/// Selects the thread a message is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryThread {
    /// Deliver synchronously on the broadcasting thread.
    Current,
    /// Deliver asynchronously on the broker's worker pool.
    Background,
    /// Deliver on the thread that registered the subscription, via the
    /// [`DeliveryContext`] it had installed. Falls back to synchronous
    /// current-thread delivery when no context was captured.
    Owning,
}
