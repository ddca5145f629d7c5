//! A single named topic: publication bindings, subscription entries,
//! broadcast, and the dead-entry sweep.
//!
//! # Locking
//!
//! Publications and subscriptions sit behind separate mutexes so broadcast
//! never blocks publisher registration and vice versa. `broadcast` snapshots
//! the subscription list and releases the lock before invoking anything, so
//! a slow or reentrant handler cannot deadlock a concurrent
//! `add_subscription`. Entries added mid-broadcast are not guaranteed to see
//! that broadcast.
//!
//! # Reclamation
//!
//! Dropping the last `Arc` to a publisher or subscriber does not notify the
//! channel. Dead entries are detected lazily by the sweep that runs after
//! every broadcast (enabled or not) by checking each stored weak handle. A
//! channel with no traffic retains stale entries until its next broadcast.

use std::any::Any;
use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicBool, Ordering},
};

use crate::bus::Payload;
use crate::bus::entry::{PublicationBinding, SubscriberHandle, SubscriptionEntry};
use crate::bus::event::EventSource;
use crate::bus::forwarder::ForwarderCache;
use crate::deliver::{ContextHandle, DeliveryDispatcher, DeliveryThread};
use crate::error::BrokerError;

/// A named topic through which publications fan out to subscriptions.
///
/// Channels are created by
/// [`MessageBroker::get_channel`](crate::MessageBroker::get_channel) and live
/// until explicitly closed or the broker shuts down. They hold only weak
/// references to the objects bound to them.
pub struct Channel {
    name: Arc<str>,
    /// Handle to our own `Arc`, captured at construction so publication
    /// callbacks can route back here without keeping the channel alive.
    weak_self: Weak<Channel>,
    enabled: AtomicBool,
    closed: AtomicBool,
    publications: Mutex<Vec<PublicationBinding>>,
    subscriptions: Mutex<Vec<SubscriptionEntry>>,
    forwarders: Arc<ForwarderCache>,
    dispatcher: Arc<DeliveryDispatcher>,
}

impl Channel {
    pub(crate) fn new(
        name: &str,
        forwarders: Arc<ForwarderCache>,
        dispatcher: Arc<DeliveryDispatcher>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            name: Arc::from(name),
            weak_self: weak_self.clone(),
            enabled: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            publications: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            forwarders,
            dispatcher,
        })
    }

    /// The channel's name, as registered with the broker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches this channel's broadcast entry point to the publisher's
    /// event and records the binding.
    ///
    /// The event keeps only a weak channel handle, and the binding keeps
    /// only weak handles back, so neither side extends the other's lifetime.
    /// The binding is removed when the publisher dies (next sweep) or the
    /// channel closes (active detach).
    pub fn add_publication<P, A>(&self, publisher: &Arc<P>, source: &EventSource<A>)
    where
        P: Any + Send + Sync,
        A: Any + Send + Sync,
    {
        let channel = self.weak_self.clone();
        let token = source.core().attach(Arc::new(move |sender, args| {
            if let Some(channel) = channel.upgrade() {
                channel.broadcast(sender, args);
            }
        }));

        let erased: Arc<dyn Any + Send + Sync> = publisher.clone();
        let binding = PublicationBinding {
            publisher: Arc::downgrade(&erased),
            source: Arc::downgrade(source.core()),
            token,
        };

        self.publications.lock().unwrap().push(binding);
        log::trace!("publication added to channel `{}`", self.name);
    }

    /// Binds a subscriber method to this channel.
    ///
    /// The forwarder for `method` comes from the shared cache (built on
    /// first use). Fails fast with [`BrokerError::CapturingHandler`] if
    /// `method` captures state. For [`DeliveryThread::Owning`], the calling
    /// thread's installed [`DeliveryContext`](crate::DeliveryContext) is
    /// captured here.
    pub fn add_subscription<T, A, F>(
        &self,
        subscriber: &Arc<T>,
        method: F,
        thread: DeliveryThread,
    ) -> Result<(), BrokerError>
    where
        T: Any + Send + Sync,
        A: Any + Send + Sync,
        F: Fn(&T, &Payload, &A) + Send + Sync + 'static,
    {
        let forwarder = self.forwarders.instance_forwarder(method)?;
        let erased: Arc<dyn Any + Send + Sync> = subscriber.clone();
        self.push_subscription(SubscriptionEntry {
            handle: SubscriberHandle::Instance(Arc::downgrade(&erased)),
            forwarder,
            thread,
            context: capture_context(thread),
        });
        Ok(())
    }

    /// Binds a free function to this channel. The entry has no target
    /// object and is only removed when the channel closes.
    pub fn add_static_subscription<A, F>(
        &self,
        handler: F,
        thread: DeliveryThread,
    ) -> Result<(), BrokerError>
    where
        A: Any + Send + Sync,
        F: Fn(&Payload, &A) + Send + Sync + 'static,
    {
        let forwarder = self.forwarders.static_forwarder(handler)?;
        self.push_subscription(SubscriptionEntry {
            handle: SubscriberHandle::Static,
            forwarder,
            thread,
            context: capture_context(thread),
        });
        Ok(())
    }

    fn push_subscription(&self, entry: SubscriptionEntry) {
        self.subscriptions.lock().unwrap().push(entry);
        log::trace!("subscription added to channel `{}`", self.name);
    }

    /// Fans `(sender, args)` out to every live subscription entry, then
    /// sweeps dead entries.
    ///
    /// On a disabled channel no dispatch happens, but the sweep still runs.
    /// On a closed channel this is a complete no-op.
    pub fn broadcast(&self, sender: &Payload, args: &Payload) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        if self.enabled.load(Ordering::Acquire) {
            let snapshot: Vec<SubscriptionEntry> =
                self.subscriptions.lock().unwrap().clone();
            for entry in &snapshot {
                self.dispatcher.deliver(entry, sender, args);
            }
        }

        self.sweep();
    }

    /// Detaches every still-reachable publication binding from its
    /// publisher's event and discards all entries. Subscription entries have
    /// nothing to unhook and are simply cleared.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);

        let bindings: Vec<PublicationBinding> = {
            let mut publications = self.publications.lock().unwrap();
            publications.drain(..).collect()
        };
        for binding in &bindings {
            binding.detach();
        }

        self.subscriptions.lock().unwrap().clear();
        log::trace!("channel `{}` closed", self.name);
    }

    /// Resumes delivery. Does not touch existing bindings.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Suppresses delivery without unregistering anything.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Whether broadcasts currently dispatch to subscribers.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Number of subscription entries, dead ones included until the next
    /// sweep.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    /// Number of publication bindings, dead ones included until the next
    /// sweep.
    pub fn publication_count(&self) -> usize {
        self.publications.lock().unwrap().len()
    }

    /// Drops every entry whose weak handle reports its target unreachable.
    fn sweep(&self) {
        self.subscriptions
            .lock()
            .unwrap()
            .retain(|entry| entry.handle.is_alive());
        self.publications
            .lock()
            .unwrap()
            .retain(|binding| binding.is_alive());
    }
}

fn capture_context(thread: DeliveryThread) -> Option<ContextHandle> {
    match thread {
        DeliveryThread::Owning => ContextHandle::capture(),
        _ => None,
    }
}
