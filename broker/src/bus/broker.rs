//! Channel registry and collaborator entry points.
//!
//! [`MessageBroker`] is the process-facing surface: a map from channel name
//! to [`Channel`], created lazily on first lookup. Channel names are opaque
//! strings; the surrounding system conventionally uses a URI-like scheme
//! such as `message://Type/EventName`, but nothing here parses them.
//!
//! The broker is a plain value owned by whoever composes the system; there
//! is no hidden process-wide singleton. Dropping it (or calling
//! [`shutdown`](MessageBroker::shutdown)) closes every channel, which severs
//! all still-alive publication bindings: publishers keep working, they just
//! no longer reach anyone.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

use crate::bus::Payload;
use crate::bus::channel::Channel;
use crate::bus::event::EventSource;
use crate::bus::forwarder::ForwarderCache;
use crate::deliver::{DeliveryDispatcher, DeliveryThread};
use crate::error::BrokerError;

/// Tunables for a broker instance.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Worker threads serving `DeliveryThread::Background` deliveries.
    pub background_workers: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            background_workers: 2,
        }
    }
}

/// Registry of named message channels.
///
/// All channels of one broker share a forwarder cache and a delivery
/// dispatcher. `get_channel` is safe under concurrent callers: at most one
/// channel object is ever created per name.
pub struct MessageBroker {
    channels: DashMap<String, Arc<Channel>>,
    forwarders: Arc<ForwarderCache>,
    dispatcher: Arc<DeliveryDispatcher>,
}

impl MessageBroker {
    /// Creates a broker with the default configuration.
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Creates a broker with an explicit configuration.
    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            channels: DashMap::new(),
            forwarders: Arc::new(ForwarderCache::new()),
            dispatcher: Arc::new(DeliveryDispatcher::new(config.background_workers)),
        }
    }

    /// Returns the channel with the given name, creating it first if
    /// necessary.
    pub fn get_channel(&self, name: &str) -> Arc<Channel> {
        let entry = self.channels.entry(name.to_string()).or_insert_with(|| {
            log::debug!("creating channel `{name}`");
            Channel::new(
                name,
                Arc::clone(&self.forwarders),
                Arc::clone(&self.dispatcher),
            )
        });
        Arc::clone(entry.value())
    }

    /// Closes a channel and removes it from the registry. Unknown names are
    /// a no-op.
    pub fn close_channel(&self, name: &str) {
        if let Some((_, channel)) = self.channels.remove(name) {
            channel.close();
        }
    }

    /// Enables a channel, causing it to pass messages through as they occur.
    ///
    /// Creates the channel if it does not exist yet, so configuration can
    /// precede registration.
    pub fn enable_channel(&self, name: &str) {
        self.get_channel(name).enable();
    }

    /// Disables a channel, blocking messages without unregistering anything.
    ///
    /// Creates the channel if it does not exist yet.
    pub fn disable_channel(&self, name: &str) {
        self.get_channel(name).disable();
    }

    /// Closes every channel and clears the registry. Idempotent; also runs
    /// on drop.
    ///
    /// After shutdown a previously bound publisher's event has no listeners
    /// left, so raising it becomes a no-op.
    pub fn shutdown(&self) {
        for entry in self.channels.iter() {
            entry.value().close();
        }
        self.channels.clear();
    }

    /// Number of channels currently in the registry.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    // ==================== Collaborator entry points ====================

    /// Binds a publisher's event to the named channel (created on first
    /// use). Raising the event afterwards broadcasts into the channel.
    pub fn register_publication<P, A>(
        &self,
        channel: &str,
        publisher: &Arc<P>,
        source: &EventSource<A>,
    ) where
        P: Any + Send + Sync,
        A: Any + Send + Sync,
    {
        self.get_channel(channel).add_publication(publisher, source);
    }

    /// Binds a subscriber method to the named channel (created on first
    /// use).
    ///
    /// `method` must be a plain function or non-capturing closure taking
    /// `(&T, &Payload, &A)`; anything capturing state is rejected with
    /// [`BrokerError::CapturingHandler`].
    pub fn register_subscription<T, A, F>(
        &self,
        channel: &str,
        subscriber: &Arc<T>,
        method: F,
        thread: DeliveryThread,
    ) -> Result<(), BrokerError>
    where
        T: Any + Send + Sync,
        A: Any + Send + Sync,
        F: Fn(&T, &Payload, &A) + Send + Sync + 'static,
    {
        self.get_channel(channel)
            .add_subscription(subscriber, method, thread)
    }

    /// Binds a free function to the named channel. The subscription has no
    /// target object and lives until the channel closes.
    pub fn register_static_subscription<A, F>(
        &self,
        channel: &str,
        handler: F,
        thread: DeliveryThread,
    ) -> Result<(), BrokerError>
    where
        A: Any + Send + Sync,
        F: Fn(&Payload, &A) + Send + Sync + 'static,
    {
        self.get_channel(channel).add_static_subscription(handler, thread)
    }
}

impl Default for MessageBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessageBroker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
