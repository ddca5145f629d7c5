//! Benchmark fixtures for weakbus.
//!
//! Provides mock publishers and subscribers shared by the criterion
//! benchmarks.
//!
//! ```bash
//! cargo bench -p weakbus_bench
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use weakbus::{EventSource, Payload};

/// Event payload used by the benchmarks.
pub struct TickArgs {
    pub sequence: u64,
    pub note: String,
}

/// A publisher with a single benchmark event.
pub struct BenchPublisher {
    pub ticked: EventSource<TickArgs>,
}

impl BenchPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ticked: EventSource::new(),
        })
    }
}

/// A subscriber that counts deliveries.
pub struct BenchSubscriber {
    pub received: AtomicUsize,
}

impl BenchSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            received: AtomicUsize::new(0),
        })
    }
}

/// Subscribing method bound in the benchmarks.
pub fn on_tick(sub: &BenchSubscriber, _sender: &Payload, _args: &TickArgs) {
    sub.received.fetch_add(1, Ordering::Relaxed);
}
