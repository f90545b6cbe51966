//! Bounded, drop-oldest queue with a dedicated drain thread.
//!
//! Used for outgoing property announcements (playback status, current
//! track, volume, ...). Producers never block: when the queue is full the
//! oldest entry is evicted, so for rapidly changing properties the last
//! write wins.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

struct Shared<T> {
    queue: Mutex<Inner<T>>,
    ready: Condvar,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct PropertyQueue<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    capacity: usize,
    drain: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> PropertyQueue<T> {
    /// Start the drain thread. `sink` sees items in FIFO order.
    pub fn spawn(capacity: usize, mut sink: impl FnMut(T) + Send + 'static) -> Self {
        let capacity = capacity.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            ready: Condvar::new(),
        });

        let worker = shared.clone();
        let drain = thread::Builder::new()
            .name("reprise-notify".to_string())
            .spawn(move || {
                loop {
                    let item = {
                        let mut q = worker.queue.lock().unwrap_or_else(|e| e.into_inner());
                        loop {
                            if let Some(item) = q.items.pop_front() {
                                break Some(item);
                            }
                            if q.closed {
                                break None;
                            }
                            q = worker.ready.wait(q).unwrap_or_else(|e| e.into_inner());
                        }
                    };
                    match item {
                        Some(item) => sink(item),
                        None => return,
                    }
                }
            });

        let drain = match drain {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "failed to start notification thread");
                None
            }
        };

        Self {
            shared,
            capacity,
            drain,
        }
    }

    /// Enqueue without blocking. Returns the evicted item when full.
    pub fn push(&self, item: T) -> Option<T> {
        let mut q = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
        if q.closed {
            return Some(item);
        }
        let evicted = if q.items.len() >= self.capacity {
            q.items.pop_front()
        } else {
            None
        };
        q.items.push_back(item);
        drop(q);
        self.shared.ready.notify_one();
        evicted
    }

    pub fn len(&self) -> usize {
        self.shared
            .queue
            .lock()
            .map(|q| q.items.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver what is queued, then stop and join the drain thread.
    pub fn close(&mut self) {
        {
            let mut q = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
            q.closed = true;
        }
        self.shared.ready.notify_all();
        if let Some(handle) = self.drain.take() {
            let _ = handle.join();
        }
    }
}

impl<T: Send + 'static> Drop for PropertyQueue<T> {
    fn drop(&mut self) {
        self.close();
    }
}
