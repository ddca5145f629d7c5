//! Captured owning-thread execution contexts.
//!
//! Owning-thread delivery needs a way to say "run this on the thread that
//! created the subscriber" without hard-coding any particular UI framework.
//! A thread that wants to own deliveries installs a [`DeliveryContext`] and
//! periodically calls [`pump()`](DeliveryContext::pump) from its own loop.
//! While the context is installed, subscriptions registered from that thread
//! with `DeliveryThread::Owning` capture a [`ContextHandle`]; delivery then
//! marshals the invocation onto the owning thread and blocks the broadcaster
//! until the pump has run it (synchronous hand-off).
//!
//! Threads without an installed context capture nothing, and such
//! subscriptions fall back to synchronous current-thread delivery.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crossbeam::channel::{Receiver, Sender, bounded, unbounded};

/// A marshalled invocation plus the ack the broadcaster is blocked on.
/// The job returns the forwarder's "target alive" result.
pub(crate) struct ContextJob {
    run: Box<dyn FnOnce() -> bool + Send>,
    done: Sender<bool>,
}

thread_local! {
    static CURRENT: RefCell<Option<Sender<ContextJob>>> = const { RefCell::new(None) };
}

/// The owning side of a delivery context, held by the thread that pumps it.
///
/// Installing a context registers this thread as the owning thread for
/// subscriptions it registers afterwards. Dropping the context uninstalls
/// it; handles captured earlier go dead and their deliveries fall back to
/// the broadcasting thread.
///
/// # Example
///
/// ```rust,ignore
/// let context = DeliveryContext::install();
/// broker.register_subscription(channel, &subscriber, on_message, DeliveryThread::Owning)?;
/// loop {
///     context.pump();
///     // ... the rest of this thread's loop
/// }
/// ```
pub struct DeliveryContext {
    sender: Sender<ContextJob>,
    receiver: Receiver<ContextJob>,
}

impl DeliveryContext {
    /// Installs a delivery context on the calling thread, replacing any
    /// previously installed one.
    pub fn install() -> Self {
        let (sender, receiver) = unbounded();
        CURRENT.with(|current| {
            *current.borrow_mut() = Some(sender.clone());
        });
        DeliveryContext { sender, receiver }
    }

    /// Runs every delivery currently queued for this thread and returns how
    /// many ran. Does not block waiting for new ones.
    ///
    /// A panicking handler is confined here: the fault is logged and the
    /// blocked broadcaster is still released.
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            let alive = match catch_unwind(AssertUnwindSafe(job.run)) {
                Ok(alive) => alive,
                Err(_) => {
                    log::error!("subscriber panicked during owning-thread delivery");
                    true
                }
            };
            let _ = job.done.send(alive);
            ran += 1;
        }
        ran
    }
}

impl Drop for DeliveryContext {
    fn drop(&mut self) {
        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            // Only uninstall if we are still the installed context.
            if let Some(installed) = current.as_ref() {
                if installed.same_channel(&self.sender) {
                    *current = None;
                }
            }
        });
    }
}

/// Cheap cloneable handle to an installed [`DeliveryContext`], captured by a
/// subscription entry at registration time.
#[derive(Clone)]
pub(crate) struct ContextHandle {
    sender: Sender<ContextJob>,
}

impl ContextHandle {
    /// Captures the calling thread's installed context, if any.
    pub(crate) fn capture() -> Option<Self> {
        CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .map(|sender| ContextHandle {
                    sender: sender.clone(),
                })
        })
    }

    /// Whether the calling thread is the owning thread of this handle.
    /// Delivering to ourselves must run inline or the hand-off would
    /// deadlock against our own pump.
    pub(crate) fn is_owning_thread(&self) -> bool {
        CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .is_some_and(|installed| installed.same_channel(&self.sender))
        })
    }

    /// Marshals `job` onto the owning thread and blocks until the pump has
    /// run it. Returns `None` when the context is dead (its
    /// [`DeliveryContext`] was dropped), in which case the caller should
    /// deliver inline instead.
    pub(crate) fn send_wait(&self, job: Box<dyn FnOnce() -> bool + Send>) -> Option<bool> {
        let (done, ack) = bounded(1);
        if self.sender.send(ContextJob { run: job, done }).is_err() {
            return None;
        }
        ack.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn capture_without_installed_context_is_none() {
        thread::spawn(|| {
            assert!(ContextHandle::capture().is_none());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn pump_runs_marshalled_jobs_on_the_owning_thread() {
        let context = DeliveryContext::install();
        let handle = ContextHandle::capture().unwrap();
        let owner = thread::current().id();

        let delivered_on = Arc::new(std::sync::Mutex::new(None));
        let delivered_clone = Arc::clone(&delivered_on);

        let broadcaster = thread::spawn(move || {
            handle.send_wait(Box::new(move || {
                *delivered_clone.lock().unwrap() = Some(thread::current().id());
                true
            }))
        });

        // Pump until the job arrives.
        while context.pump() == 0 {
            thread::yield_now();
        }

        assert_eq!(broadcaster.join().unwrap(), Some(true));
        assert_eq!(*delivered_on.lock().unwrap(), Some(owner));
    }

    #[test]
    fn send_wait_to_dropped_context_reports_dead() {
        let handle = {
            let _context = DeliveryContext::install();
            ContextHandle::capture().unwrap()
        };
        // _context dropped; the queue is disconnected.
        assert!(handle.send_wait(Box::new(|| true)).is_none());
    }

    #[test]
    fn pump_confines_handler_panics_and_releases_the_broadcaster() {
        let context = DeliveryContext::install();
        let handle = ContextHandle::capture().unwrap();

        let broadcaster = thread::spawn(move || handle.send_wait(Box::new(|| panic!("fault"))));

        while context.pump() == 0 {
            thread::yield_now();
        }

        // The broadcaster is released with a conservative "alive".
        assert_eq!(broadcaster.join().unwrap(), Some(true));
    }

    #[test]
    fn same_thread_detection() {
        let _context = DeliveryContext::install();
        let handle = ContextHandle::capture().unwrap();
        assert!(handle.is_owning_thread());

        let handle_clone = handle.clone();
        thread::spawn(move || {
            assert!(!handle_clone.is_owning_thread());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn pump_counts_pending_jobs() {
        let context = DeliveryContext::install();
        let handle = ContextHandle::capture().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        let mut broadcasters = Vec::new();
        for _ in 0..3 {
            let handle = handle.clone();
            let ran = Arc::clone(&ran);
            broadcasters.push(thread::spawn(move || {
                handle.send_wait(Box::new(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                    true
                }))
            }));
        }

        let mut total = 0;
        while total < 3 {
            total += context.pump();
            thread::yield_now();
        }

        for b in broadcasters {
            assert_eq!(b.join().unwrap(), Some(true));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }
}
