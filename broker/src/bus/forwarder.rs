//! Dispatch forwarder construction and memoization.
//!
//! Broadcasting must not pay a lookup-and-downcast tax per delivery, so the
//! cache builds one specialized forwarder per subscribing method and reuses
//! it for every later subscription and broadcast. A forwarder owns the whole
//! fast path: upgrade the weak target, downcast target and arguments to the
//! registered types, invoke.
//!
//! # Method identity
//!
//! The cache key is the [`TypeId`] of the handler's own type. A `fn` item
//! and a non-capturing closure each have a unique zero-sized type, which
//! makes the `TypeId` a precise method identity. A capturing closure (or a
//! `fn` pointer, whose type is shared across all functions of the same
//! signature) has no such identity and would poison the cache, so both are
//! rejected at registration with [`BrokerError::CapturingHandler`]. The
//! zero-size check is exactly that guard: captured state means a non-zero
//! size.
//!
//! # Locking
//!
//! Lookups are the hot path and take the read lock only. A miss upgrades to
//! the write lock and re-checks before building, so at most one forwarder is
//! ever built per method even when multiple channels race on first use.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::bus::{Payload, SubscriberHandle};
use crate::error::BrokerError;

/// A cached dispatch forwarder.
///
/// Invoked with the entry's weak handle, the sender, and the event
/// arguments; returns `false` exactly when the target was already
/// unreachable (the method is not invoked in that case).
pub(crate) type ForwarderFn =
    Arc<dyn Fn(&SubscriberHandle, &Payload, &Payload) -> bool + Send + Sync>;

/// Builds and memoizes dispatch forwarders, keyed by method identity.
pub struct ForwarderCache {
    forwarders: RwLock<HashMap<TypeId, ForwarderFn>>,
}

impl ForwarderCache {
    pub(crate) fn new() -> Self {
        Self {
            forwarders: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the forwarder for an instance method, building it on first
    /// use.
    ///
    /// The constructed forwarder upgrades the weak subscriber, downcasts it
    /// to `T` and the arguments to `A`, and invokes `method(target, sender,
    /// args)`. A dead target yields `false` without invocation.
    pub(crate) fn instance_forwarder<T, A, F>(&self, method: F) -> Result<ForwarderFn, BrokerError>
    where
        T: Any + Send + Sync,
        A: Any + Send + Sync,
        F: Fn(&T, &Payload, &A) + Send + Sync + 'static,
    {
        self.get_or_build::<F>(move || {
            Arc::new(move |handle: &SubscriberHandle, sender: &Payload, args: &Payload| {
                let weak = match handle {
                    SubscriberHandle::Instance(weak) => weak,
                    // Static entries are built by `static_forwarder`; an
                    // instance forwarder handed a static handle has nothing
                    // to do but is trivially "alive".
                    SubscriberHandle::Static => return true,
                };
                let Some(target) = weak.upgrade() else {
                    return false;
                };
                let Ok(target) = target.downcast::<T>() else {
                    log::warn!(
                        "subscriber is not a `{}`; skipping delivery",
                        type_name::<T>()
                    );
                    return true;
                };
                let Some(args) = args.downcast_ref::<A>() else {
                    log::warn!(
                        "event arguments are not `{}`; skipping delivery",
                        type_name::<A>()
                    );
                    return true;
                };
                method(target.as_ref(), sender, args);
                true
            })
        })
    }

    /// Returns the forwarder for a free function, building it on first use.
    ///
    /// Static forwarders have no target to resolve and always report alive.
    pub(crate) fn static_forwarder<A, F>(&self, handler: F) -> Result<ForwarderFn, BrokerError>
    where
        A: Any + Send + Sync,
        F: Fn(&Payload, &A) + Send + Sync + 'static,
    {
        self.get_or_build::<F>(move || {
            Arc::new(move |_handle: &SubscriberHandle, sender: &Payload, args: &Payload| {
                let Some(args) = args.downcast_ref::<A>() else {
                    log::warn!(
                        "event arguments are not `{}`; skipping delivery",
                        type_name::<A>()
                    );
                    return true;
                };
                handler(sender, args);
                true
            })
        })
    }

    /// Read-check, upgrade to the write lock, re-check, then guard and
    /// build. The capture guard runs inside the write section so a rejected
    /// handler is never cached.
    fn get_or_build<F: 'static>(
        &self,
        build: impl FnOnce() -> ForwarderFn,
    ) -> Result<ForwarderFn, BrokerError> {
        let key = TypeId::of::<F>();

        if let Some(existing) = self.forwarders.read().unwrap().get(&key) {
            return Ok(Arc::clone(existing));
        }

        let mut forwarders = self.forwarders.write().unwrap();
        if let Some(existing) = forwarders.get(&key) {
            return Ok(Arc::clone(existing));
        }

        guard_against_captures::<F>()?;

        let forwarder = build();
        forwarders.insert(key, Arc::clone(&forwarder));
        Ok(forwarder)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.forwarders.read().unwrap().len()
    }
}

/// Rejects handlers with captured state. Function items and non-capturing
/// closures are zero-sized; anything else carries state the cache key cannot
/// see.
fn guard_against_captures<F>() -> Result<(), BrokerError> {
    if std::mem::size_of::<F>() != 0 {
        return Err(BrokerError::CapturingHandler {
            handler: type_name::<F>(),
        });
    }
    Ok(())
}
