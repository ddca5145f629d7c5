//! Weak entry records kept by a channel.
//!
//! Channels never hold strong references to publishers or subscribers. Each
//! record stores a liveness-checkable weak handle; the sweep pass drops a
//! record exactly when its handle reports the target unreachable.

use std::any::Any;
use std::sync::Weak;

use crate::bus::event::{HandlerToken, SourceCore};
use crate::bus::forwarder::ForwarderFn;
use crate::deliver::{ContextHandle, DeliveryThread};

/// Weak handle to a subscription target.
#[derive(Clone)]
pub enum SubscriberHandle {
    /// A subscriber object, held weakly. Dead once its last `Arc` drops.
    Instance(Weak<dyn Any + Send + Sync>),
    /// A free function with no target object. Never dies.
    Static,
}

impl SubscriberHandle {
    /// Whether the target can still be reached.
    pub fn is_alive(&self) -> bool {
        match self {
            SubscriberHandle::Instance(weak) => weak.strong_count() > 0,
            SubscriberHandle::Static => true,
        }
    }
}

/// One subscribing method bound to a channel: the weak target, the cached
/// dispatch forwarder for the method, and the delivery policy (plus the
/// owning-thread context captured at registration time, if any).
#[derive(Clone)]
pub(crate) struct SubscriptionEntry {
    pub handle: SubscriberHandle,
    pub forwarder: ForwarderFn,
    pub thread: DeliveryThread,
    pub context: Option<ContextHandle>,
}

/// One publisher event bound to a channel: the weak publisher for the sweep,
/// and enough to detach the forwarding callback when the channel closes.
pub(crate) struct PublicationBinding {
    pub publisher: Weak<dyn Any + Send + Sync>,
    pub source: Weak<SourceCore>,
    pub token: HandlerToken,
}

impl PublicationBinding {
    pub fn is_alive(&self) -> bool {
        self.publisher.strong_count() > 0
    }

    /// Detaches the forwarding callback from the publisher's event, if the
    /// source is still reachable.
    pub fn detach(&self) {
        if let Some(core) = self.source.upgrade() {
            core.detach(self.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn instance_handle_dies_with_its_target() {
        let target: Arc<dyn Any + Send + Sync> = Arc::new(42u32);
        let handle = SubscriberHandle::Instance(Arc::downgrade(&target));

        assert!(handle.is_alive());
        drop(target);
        assert!(!handle.is_alive());
    }

    #[test]
    fn static_handle_is_always_alive() {
        assert!(SubscriberHandle::Static.is_alive());
    }
}
