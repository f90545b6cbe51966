//! Task queue feeding the single consumer loop.
//!
//! Background actors (the transport listener, probe workers, file loaders)
//! never touch engine state themselves. They post closures through a
//! [`Mailbox`]; the consumer owns the matching [`Inbox`] and runs the
//! closures against its state in posting order.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

pub type Task<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Posting side. Cheap to clone and safe to move across threads.
pub struct Mailbox<C> {
    tx: Sender<Task<C>>,
}

impl<C> Clone for Mailbox<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C> fmt::Debug for Mailbox<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mailbox")
    }
}

impl<C> Mailbox<C> {
    /// Queue `task` for the consumer. Returns `false` once the consumer is gone.
    pub fn post(&self, task: impl FnOnce(&mut C) + Send + 'static) -> bool {
        self.tx.send(Box::new(task)).is_ok()
    }
}

/// The consumer side has been dropped by every poster.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Closed;

/// Consuming side, owned by the loop that owns `C`.
pub struct Inbox<C> {
    rx: Receiver<Task<C>>,
}

impl<C> Inbox<C> {
    /// Run everything already queued without blocking.
    pub fn run_pending(&self, ctx: &mut C) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(ctx);
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for a task, then drain whatever else is queued.
    /// `Ok(false)` means the wait timed out with nothing to do.
    pub fn run_once(&self, ctx: &mut C, timeout: Duration) -> Result<bool, Closed> {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => {
                task(ctx);
                self.run_pending(ctx);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(Closed),
        }
    }
}

pub fn mailbox<C>() -> (Mailbox<C>, Inbox<C>) {
    let (tx, rx) = mpsc::channel();
    (Mailbox { tx }, Inbox { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn tasks_run_in_posting_order_on_the_consumer() {
        let (mb, inbox) = mailbox::<Vec<u32>>();
        let poster = mb.clone();
        let handle = thread::spawn(move || {
            for i in 0..100 {
                assert!(poster.post(move |v: &mut Vec<u32>| v.push(i)));
            }
        });
        handle.join().unwrap();

        let mut seen = Vec::new();
        assert_eq!(inbox.run_pending(&mut seen), 100);
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn run_once_times_out_then_reports_closed() {
        let (mb, inbox) = mailbox::<u32>();
        let mut n = 0;
        assert_eq!(inbox.run_once(&mut n, Duration::from_millis(10)), Ok(false));

        mb.post(|n| *n += 1);
        mb.post(|n| *n += 1);
        assert_eq!(inbox.run_once(&mut n, Duration::from_millis(10)), Ok(true));
        assert_eq!(n, 2);

        drop(mb);
        assert_eq!(inbox.run_once(&mut n, Duration::from_millis(10)), Err(Closed));
    }

    #[test]
    fn post_fails_after_consumer_drops() {
        let (mb, inbox) = mailbox::<()>();
        drop(inbox);
        assert!(!mb.post(|_| {}));
    }
}
