//! A bounded, multi-worker queue that delivers requests to a handler in
//! batches rather than one at a time.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

/// A fixed-size worker pool draining a bounded queue in batches.
///
/// Overflow policy is drop: [`Self::push`] returns `false` immediately
/// rather than blocking the producer when the queue is full, mirroring the
/// source's stance that a caller whose push is dropped must recover via
/// some other path (typically: the waiter eventually observes completion
/// through a later successful fetch, or the operation is abandoned).
pub struct BatchQueueProcessor<T: Send + 'static> {
    sender: Sender<Option<T>>,
    workers: Vec<JoinHandle<()>>,
    num_workers: usize,
}

impl<T: Send + 'static> BatchQueueProcessor<T> {
    /// Build a processor with `capacity` queue slots and `num_workers`
    /// worker threads, each draining up to `max_batch` items per wakeup
    /// before calling `handler(batch, worker_index)`.
    pub fn new<F>(capacity: usize, num_workers: usize, max_batch: usize, handler: F) -> Self
    where
        F: Fn(Vec<T>, usize) + Send + Sync + 'static,
    {
        assert!(num_workers > 0, "BatchQueueProcessor needs at least one worker");
        assert!(max_batch > 0, "max_batch must be positive");

        let (sender, receiver): (Sender<Option<T>>, Receiver<Option<T>>) = bounded(capacity);
        let handler = Arc::new(handler);

        let workers = (0..num_workers)
            .map(|idx| {
                let receiver = receiver.clone();
                let handler = handler.clone();
                thread::spawn(move || Self::worker_loop(receiver, handler, max_batch, idx))
            })
            .collect();

        Self {
            sender,
            workers,
            num_workers,
        }
    }

    fn worker_loop(
        receiver: Receiver<Option<T>>,
        handler: Arc<dyn Fn(Vec<T>, usize) + Send + Sync>,
        max_batch: usize,
        worker_index: usize,
    ) {
        loop {
            let first = match receiver.recv() {
                Ok(Some(item)) => item,
                Ok(None) => return, // shutdown sentinel
                Err(_) => return,   // sender dropped
            };

            let mut batch = Vec::with_capacity(max_batch);
            batch.push(first);
            let mut saw_sentinel = false;
            while batch.len() < max_batch {
                match receiver.try_recv() {
                    Ok(Some(item)) => batch.push(item),
                    Ok(None) => {
                        saw_sentinel = true;
                        break;
                    }
                    Err(_) => break,
                }
            }
            handler(batch, worker_index);
            if saw_sentinel {
                return;
            }
        }
    }

    /// Enqueue `item`. Returns `false` if the queue is full or has been shut
    /// down; the item is dropped in that case.
    pub fn push(&self, item: T) -> bool {
        self.sender.try_send(Some(item)).is_ok()
    }

    /// Stop accepting new work, drain remaining batches, and join every
    /// worker thread. Consumes `self`: once shut down, a processor cannot be
    /// restarted.
    pub fn shutdown(self) {
        for _ in 0..self.num_workers {
            // A full queue during shutdown would mean a worker is already
            // exiting without having drained its sentinel; best effort is
            // sufficient since workers also exit on sender-drop.
            let _ = self.sender.send(None);
        }
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn batches_are_delivered_and_drained() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let processor = BatchQueueProcessor::new(16, 1, 4, move |batch: Vec<i32>, _idx| {
            received_clone.lock().unwrap().extend(batch);
        });

        for i in 0..10 {
            assert!(processor.push(i));
        }
        processor.shutdown();

        let mut got = received.lock().unwrap().clone();
        got.sort_unstable();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn overflow_is_dropped_not_blocked() {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let processor = BatchQueueProcessor::new(1, 1, 1, move |_batch: Vec<i32>, _idx| {
            // Block the single worker so the queue stays full.
            let _ = gate_rx.recv_timeout(Duration::from_secs(5));
        });
        assert!(processor.push(1));
        // Give the worker a moment to pick up the first item so the queue
        // is genuinely empty-but-busy, then fill the single slot.
        thread_sleep_short();
        assert!(processor.push(2));
        assert!(!processor.push(3), "third push should have been dropped");
        drop(gate_tx);
        processor.shutdown();
    }

    fn thread_sleep_short() {
        std::thread::sleep(Duration::from_millis(20));
    }
}
