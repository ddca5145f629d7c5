//! Background delivery worker pool.
//!
//! Background-policy deliveries are fire-and-forget: `broadcast` hands the
//! bound invocation to the pool and returns. Workers pull jobs off a shared
//! crossbeam channel in FIFO order; completion order across workers is
//! non-deterministic. A panicking handler takes down neither its worker nor
//! the publisher: the fault is caught and logged at the pool boundary.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;

use crossbeam::channel::{Receiver, Sender, unbounded};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Deliver(Job),
    Shutdown,
}

/// Fixed-size pool of delivery worker threads.
pub(crate) struct WorkerPool {
    sender: Sender<Message>,
    workers: Vec<Worker>,
}

struct Worker {
    id: usize,
    handle: Option<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a pool with `size` worker threads (at least one).
    pub(crate) fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = unbounded();
        let workers = (0..size).map(|id| Worker::new(id, receiver.clone())).collect();
        WorkerPool { sender, workers }
    }

    /// Enqueues a delivery job. Jobs run in FIFO order; there is no
    /// completion signal.
    pub(crate) fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Message::Deliver(Box::new(job))).is_err() {
            log::warn!("delivery pool is shut down; dropping background delivery");
        }
    }

    #[cfg(test)]
    pub(crate) fn size(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    /// Graceful shutdown: one shutdown message per worker, then join.
    /// Already-queued deliveries finish first.
    fn drop(&mut self) {
        for _ in &self.workers {
            let _ = self.sender.send(Message::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    log::error!("delivery worker {} did not shut down cleanly", worker.id);
                }
            }
        }
    }
}

impl Worker {
    fn new(id: usize, receiver: Receiver<Message>) -> Self {
        let handle = thread::spawn(move || {
            while let Ok(message) = receiver.recv() {
                match message {
                    Message::Deliver(job) => {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            log::error!(
                                "subscriber panicked during background delivery (worker {id})"
                            );
                        }
                    }
                    Message::Shutdown => break,
                }
            }
        });

        Worker {
            id,
            handle: Some(handle),
        }
    }
}
