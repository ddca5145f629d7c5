//! Publisher-side event source.
//!
//! [`EventSource`] is the event a publisher embeds and raises. The broker
//! attaches a forwarding callback to it when a publication is registered and
//! detaches that callback again when the channel closes. Handlers are stored
//! type-erased so a channel can forward into any argument type; the typed
//! wrapper keeps `raise` ergonomic for the publisher.
//!
//! The source never holds anything belonging to the broker alive: the
//! attached callbacks capture only a [`Weak`](std::sync::Weak) channel
//! handle, and the channel in turn records only a `Weak` of the source's
//! core for later detachment.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use crate::bus::Payload;

/// Erased handler callback attached to a source: `(sender, args)`.
pub(crate) type SourceCallback = Arc<dyn Fn(&Payload, &Payload) + Send + Sync>;

/// Identifies one attached handler so it can be detached later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken(u64);

struct HandlerSlot {
    token: HandlerToken,
    callback: SourceCallback,
}

/// Shared core of an event source: the erased handler list.
///
/// Split out from [`EventSource`] so publication bindings can hold a
/// `Weak<SourceCore>` for detachment without naming the argument type.
pub(crate) struct SourceCore {
    handlers: Mutex<Vec<HandlerSlot>>,
    next_token: AtomicU64,
}

impl SourceCore {
    fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
        }
    }

    /// Attaches a callback and returns the token that detaches it.
    pub(crate) fn attach(&self, callback: SourceCallback) -> HandlerToken {
        let token = HandlerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap()
            .push(HandlerSlot { token, callback });
        token
    }

    /// Detaches the callback registered under `token`. Unknown tokens are a
    /// no-op.
    pub(crate) fn detach(&self, token: HandlerToken) {
        self.handlers
            .lock()
            .unwrap()
            .retain(|slot| slot.token != token);
    }

    pub(crate) fn has_listeners(&self) -> bool {
        !self.handlers.lock().unwrap().is_empty()
    }

    /// Invokes every attached callback with `(sender, args)`.
    ///
    /// The handler list is snapshotted first so a callback that attaches or
    /// detaches handlers (directly or through the broker) cannot deadlock.
    fn raise(&self, sender: &Payload, args: &Payload) {
        let snapshot: Vec<SourceCallback> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|slot| Arc::clone(&slot.callback))
            .collect();
        for callback in snapshot {
            callback(sender, args);
        }
    }
}

/// A typed event owned by a publisher.
///
/// Raising the event fans out to whatever the broker has attached, usually
/// the broadcast entry point of one channel. With nothing attached, raising
/// is a cheap no-op.
///
/// # Example
///
/// ```rust,ignore
/// struct StockTicker {
///     price_changed: EventSource<PriceChange>,
/// }
///
/// impl StockTicker {
///     fn update(&self, change: PriceChange) {
///         self.price_changed.raise(change);
///     }
/// }
/// ```
pub struct EventSource<A> {
    core: Arc<SourceCore>,
    _args: PhantomData<fn(A)>,
}

impl<A: Any + Send + Sync> EventSource<A> {
    /// Creates an event source with no attached handlers.
    pub fn new() -> Self {
        Self {
            core: Arc::new(SourceCore::new()),
            _args: PhantomData,
        }
    }

    /// Raises the event with a unit sender.
    pub fn raise(&self, args: A) {
        let sender: Payload = Arc::new(());
        self.raise_from(sender, args);
    }

    /// Raises the event with an explicit sender payload.
    pub fn raise_from(&self, sender: Payload, args: A) {
        let args: Payload = Arc::new(args);
        self.core.raise(&sender, &args);
    }

    /// Returns `true` if any handler is currently attached.
    ///
    /// After the broker detaches its forwarding callback (channel closed or
    /// broker shut down) this reverts to `false`.
    pub fn has_listeners(&self) -> bool {
        self.core.has_listeners()
    }

    pub(crate) fn core(&self) -> &Arc<SourceCore> {
        &self.core
    }
}

impl<A: Any + Send + Sync> Default for EventSource<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_callback(hits: &Arc<AtomicUsize>) -> SourceCallback {
        let hits = Arc::clone(hits);
        Arc::new(move |_sender, _args| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn raise_invokes_attached_handlers() {
        let source = EventSource::<u32>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        source.core().attach(counting_callback(&hits));
        source.core().attach(counting_callback(&hits));

        source.raise(7);

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn raise_without_handlers_is_noop() {
        let source = EventSource::<u32>::new();
        source.raise(7);
        assert!(!source.has_listeners());
    }

    #[test]
    fn detach_removes_only_that_handler() {
        let source = EventSource::<u32>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let token = source.core().attach(counting_callback(&hits));
        source.core().attach(counting_callback(&hits));

        source.core().detach(token);
        source.raise(7);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn has_listeners_tracks_attach_and_detach() {
        let source = EventSource::<String>::new();
        assert!(!source.has_listeners());

        let token = source.core().attach(Arc::new(|_, _| {}));
        assert!(source.has_listeners());

        source.core().detach(token);
        assert!(!source.has_listeners());
    }

    #[test]
    fn handlers_receive_the_raised_arguments() {
        let source = EventSource::<String>::new();
        let seen = Arc::new(Mutex::new(None));

        let seen_clone = Arc::clone(&seen);
        source.core().attach(Arc::new(move |_sender, args| {
            let text = args.downcast_ref::<String>().cloned();
            *seen_clone.lock().unwrap() = text;
        }));

        source.raise("hello".to_string());

        assert_eq!(seen.lock().unwrap().as_deref(), Some("hello"));
    }
}
