//! Channel engine: registry, channels, weak entries, and dispatch forwarders.

pub mod broker;
pub mod channel;
pub mod entry;
pub mod event;
pub mod forwarder;

pub use broker::{BrokerConfig, MessageBroker};
pub use channel::Channel;
pub use entry::SubscriberHandle;
pub use event::{EventSource, HandlerToken};

use std::any::Any;
use std::sync::Arc;

/// Type-erased message payload.
///
/// Senders and event arguments cross the broker as shared `Any` values;
/// forwarders downcast the arguments back to the concrete type the
/// subscribing method was registered with.
pub type Payload = Arc<dyn Any + Send + Sync>;
