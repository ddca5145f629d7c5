//! Error types for broker registration.
//!
//! Only configuration mistakes surface as errors. A subscriber panicking
//! during current-thread delivery propagates to the publisher's call site
//! like any direct method call; panics on background or owning-thread
//! delivery are confined to the delivery thread and logged. A dead weak
//! target is not an error at all: it is reported through the forwarder's
//! liveness result and cleaned up by the next sweep.

use thiserror::Error;

/// Errors raised while registering publications or subscriptions.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The handler captures state (or is an opaque function pointer), so it
    /// has no stable method identity and cannot be memoized in the forwarder
    /// cache. Subscribe with a plain `fn` item or a non-capturing closure.
    #[error("handler `{handler}` captures state; subscription handlers must be plain functions")]
    CapturingHandler {
        /// Type name of the offending handler.
        handler: &'static str,
    },
}
