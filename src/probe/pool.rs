use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, error, warn};

use crate::mailbox::Mailbox;
use crate::state::TrackInfo;

use super::Prober;

type Done<C> = Box<dyn FnOnce(&mut C, TrackInfo) + Send + 'static>;

/// One file to probe. The track data is a private copy; the completion runs
/// on the consumer loop with the merged result.
pub struct ProbeJob<C> {
    track: TrackInfo,
    force: bool,
    done: Done<C>,
}

impl<C> ProbeJob<C> {
    pub fn new(
        track: TrackInfo,
        force: bool,
        done: impl FnOnce(&mut C, TrackInfo) + Send + 'static,
    ) -> Self {
        Self {
            track,
            force,
            done: Box::new(done),
        }
    }

    pub fn track(&self) -> &TrackInfo {
        &self.track
    }

    fn needs_probe(&self) -> bool {
        self.force || !self.track.is_probed()
    }
}

/// Pool lifecycle. Only this is behind the mutex; jobs travel through the
/// channel.
struct Lifecycle<C> {
    tx: Option<Sender<ProbeJob<C>>>,
    in_flight: usize,
    workers: usize,
}

struct Inner<C> {
    prober: Arc<dyn Prober>,
    mailbox: Mailbox<C>,
    max_workers: usize,
    lifecycle: Mutex<Lifecycle<C>>,
    idle: Condvar,
}

impl<C> Inner<C> {
    fn lock(&self) -> MutexGuard<'_, Lifecycle<C>> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One job is fully handled. The last one drops the queue's sender so
    /// the workers run dry and exit.
    fn finish_one(&self) {
        self.finish(1);
    }

    fn finish(&self, n: usize) {
        let mut lc = self.lock();
        lc.in_flight = lc.in_flight.saturating_sub(n);
        if lc.in_flight == 0 {
            lc.tx = None;
            self.idle.notify_all();
        }
    }
}

/// Worker pool that spins up on submission and back down to zero once every
/// submitted job has been handled.
pub struct ProbePool<C: 'static> {
    inner: Arc<Inner<C>>,
}

impl<C: 'static> Clone for ProbePool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: 'static> ProbePool<C> {
    pub fn new(prober: Arc<dyn Prober>, mailbox: Mailbox<C>, max_workers: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                prober,
                mailbox,
                max_workers: max_workers.max(1),
                lifecycle: Mutex::new(Lifecycle {
                    tx: None,
                    in_flight: 0,
                    workers: 0,
                }),
                idle: Condvar::new(),
            }),
        }
    }

    /// Queue jobs without blocking. Tracks that are already probed are
    /// skipped unless the job is forced. Returns how many jobs were queued.
    pub fn submit(&self, jobs: impl IntoIterator<Item = ProbeJob<C>>) -> usize {
        let jobs: Vec<ProbeJob<C>> = jobs.into_iter().filter(ProbeJob::needs_probe).collect();
        if jobs.is_empty() {
            return 0;
        }
        let count = jobs.len();

        let tx = {
            let mut lc = self.inner.lock();
            lc.in_flight += count;
            match &lc.tx {
                Some(tx) => tx.clone(),
                None => self.spin_up(&mut lc),
            }
        };

        let mut jobs = jobs.into_iter();
        while let Some(job) = jobs.next() {
            match tx.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(job)) => {
                    let backlog: Vec<ProbeJob<C>> =
                        std::iter::once(job).chain(jobs.by_ref()).collect();
                    self.dispatch(tx, backlog);
                    break;
                }
                Err(TrySendError::Disconnected(_)) => {
                    error!("probe workers are gone; dropping job");
                    self.inner.finish_one();
                }
            }
        }
        debug!(count, "probe jobs submitted");
        count
    }

    fn spin_up(&self, lc: &mut Lifecycle<C>) -> Sender<ProbeJob<C>> {
        let (tx, rx) = crossbeam_channel::bounded(self.inner.max_workers + 1);
        for n in 0..self.inner.max_workers {
            let rx = rx.clone();
            let inner = self.inner.clone();
            let spawned = thread::Builder::new()
                .name(format!("reprise-probe-{n}"))
                .spawn(move || work(inner, rx));
            match spawned {
                Ok(_) => lc.workers += 1,
                Err(e) => error!(error = %e, "failed to start probe worker"),
            }
        }
        debug!(workers = lc.workers, "probe pool started");
        lc.tx = Some(tx.clone());
        tx
    }

    /// Feed the jobs that did not fit from a background thread so the
    /// caller never blocks on a full queue.
    fn dispatch(&self, tx: Sender<ProbeJob<C>>, backlog: Vec<ProbeJob<C>>) {
        let lost = backlog.len();
        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name("reprise-probe-dispatch".to_string())
            .spawn(move || {
                for job in backlog {
                    if tx.send(job).is_err() {
                        error!("probe workers are gone; dropping job");
                        inner.finish_one();
                    }
                }
            });
        if let Err(e) = spawned {
            // The backlog went down with the closure; account for it.
            error!(error = %e, lost, "failed to start probe dispatcher");
            self.inner.finish(lost);
        }
    }

    /// Jobs submitted and not yet handled.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// Worker threads currently alive.
    pub fn active_workers(&self) -> usize {
        self.inner.lock().workers
    }

    /// Block until no job is in flight and every worker has exited.
    /// Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut lc = self.inner.lock();
        while lc.in_flight > 0 || lc.workers > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            lc = match self.inner.idle.wait_timeout(lc, deadline - now) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        true
    }
}

fn work<C: 'static>(inner: Arc<Inner<C>>, rx: Receiver<ProbeJob<C>>) {
    while let Ok(job) = rx.recv() {
        let ProbeJob {
            mut track, done, ..
        } = job;

        let outcome = catch_unwind(AssertUnwindSafe(|| inner.prober.probe(&track.path)));
        match outcome {
            Ok(Ok(report)) => {
                track.apply_probe(report);
                if !inner.mailbox.post(move |ctx| done(ctx, track)) {
                    debug!("consumer gone; discarding probe result");
                }
            }
            Ok(Err(e)) => {
                warn!(path = %track.path.display(), error = %e, "probe failed");
            }
            Err(_) => {
                error!(path = %track.path.display(), "prober panicked");
            }
        }
        inner.finish_one();
    }

    let mut lc = inner.lock();
    lc.workers = lc.workers.saturating_sub(1);
    if lc.workers == 0 {
        inner.idle.notify_all();
    }
}
