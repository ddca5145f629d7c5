//! Policy-driven execution of bound invocations.
//!
//! One dispatcher is shared by every channel of a broker. Synchronous
//! deliveries report the forwarder's "target alive" result back to the
//! broadcast loop; asynchronous deliveries cannot, so they report `true`
//! and leave reclamation to the sweep, which checks the stored weak handle
//! itself.

use crate::bus::Payload;
use crate::bus::entry::SubscriptionEntry;
use crate::deliver::DeliveryThread;
use crate::deliver::pool::WorkerPool;

/// Executes subscription deliveries according to their thread-affinity
/// policy.
pub struct DeliveryDispatcher {
    pool: WorkerPool,
}

impl DeliveryDispatcher {
    pub(crate) fn new(background_workers: usize) -> Self {
        Self {
            pool: WorkerPool::new(background_workers),
        }
    }

    /// Delivers `(sender, args)` to one subscription entry.
    ///
    /// Returns `false` only when a synchronous delivery found the target
    /// already dead.
    pub(crate) fn deliver(
        &self,
        entry: &SubscriptionEntry,
        sender: &Payload,
        args: &Payload,
    ) -> bool {
        match entry.thread {
            DeliveryThread::Current => (entry.forwarder)(&entry.handle, sender, args),

            DeliveryThread::Background => {
                let forwarder = entry.forwarder.clone();
                let handle = entry.handle.clone();
                let sender = sender.clone();
                let args = args.clone();
                self.pool.execute(move || {
                    forwarder(&handle, &sender, &args);
                });
                true
            }

            DeliveryThread::Owning => {
                let Some(context) = &entry.context else {
                    // No context captured at subscription time.
                    return (entry.forwarder)(&entry.handle, sender, args);
                };
                if context.is_owning_thread() {
                    // Broadcasting from the owning thread itself; marshalling
                    // would deadlock against our own pump.
                    return (entry.forwarder)(&entry.handle, sender, args);
                }

                let forwarder = entry.forwarder.clone();
                let handle = entry.handle.clone();
                let sender_clone = sender.clone();
                let args_clone = args.clone();
                let marshalled = context.send_wait(Box::new(move || {
                    forwarder(&handle, &sender_clone, &args_clone)
                }));

                match marshalled {
                    Some(alive) => alive,
                    None => {
                        // The owning thread dropped its context; fall back to
                        // the broadcasting thread.
                        log::trace!("owning-thread context is gone; delivering inline");
                        (entry.forwarder)(&entry.handle, sender, args)
                    }
                }
            }
        }
    }
}
