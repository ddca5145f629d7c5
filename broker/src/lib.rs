//! Weak-reference publish/subscribe message broker.
//!
//! `weakbus` routes named events between independently-owned objects without
//! either side holding a strong reference to the other. Publishers and
//! subscribers are registered against named channels; the broker only keeps
//! [`Weak`](std::sync::Weak) handles to them, so dropping the last `Arc` to a
//! participant retires its bindings by normal ownership rules; no manual
//! unsubscription is required.
//!
//! # Architecture
//!
//! - [`MessageBroker`]: registry of named channels, created lazily on first
//!   lookup.
//! - [`Channel`]: owns the publication bindings and subscription entries for
//!   one topic; performs broadcast, thread-affinity delivery, enable/disable,
//!   and the lazy dead-entry sweep.
//! - [`ForwarderCache`](bus::forwarder::ForwarderCache): builds and memoizes
//!   one fast dispatch path per subscribing method.
//! - [`DeliveryDispatcher`](deliver::DeliveryDispatcher): executes a bound
//!   invocation on the calling thread, a background worker pool, or the
//!   thread that owns the subscriber.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weakbus::{DeliveryThread, EventSource, MessageBroker, Payload};
//!
//! struct Ping { count: u32 }
//!
//! struct Publisher { pinged: EventSource<Ping> }
//! struct Subscriber { /* ... */ }
//!
//! fn on_ping(sub: &Subscriber, _sender: &Payload, args: &Ping) {
//!     println!("ping {}", args.count);
//! }
//!
//! let broker = MessageBroker::new();
//! let publisher = Arc::new(Publisher { pinged: EventSource::new() });
//! let subscriber = Arc::new(Subscriber { /* ... */ });
//!
//! let channel = "message://Publisher/Pinged";
//! broker.register_publication(channel, &publisher, &publisher.pinged);
//! broker.register_subscription(channel, &subscriber, on_ping, DeliveryThread::Current)?;
//!
//! publisher.pinged.raise(Ping { count: 1 });
//! # Ok::<(), weakbus::BrokerError>(())
//! ```

pub mod bus;
pub mod deliver;
pub mod error;

pub use bus::{BrokerConfig, Channel, EventSource, HandlerToken, MessageBroker, Payload};
pub use deliver::{DeliveryContext, DeliveryThread};
pub use error::BrokerError;
