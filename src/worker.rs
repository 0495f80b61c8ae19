//! The worker ties scraping, deduplication, durable buffering and upload
//! together.
//!
//! Two cycles run on independent timers:
//!
//!  * The scrape cycle asks the `Scraper` for every target's exposition text,
//!    parses it and folds each reading into the `LiveTable`. Readings that
//!    change a series push the previous value out; all values pushed out in
//!    one cycle are stored as a single batch.
//!  * The upload cycle reads every batch stored since the last upload, chains
//!    the live snapshot after it and hands the lot to the `Uploader`. The
//!    live table is emptied and the cursor moves to "now" whatever the
//!    uploader made of it. Only a failed read of the store holds the cursor
//!    back.
//!
//! Each cycle is guarded against overlapping with itself: a tick that finds
//! its cycle still running is skipped. The two cycles do overlap with one
//! another and share only the live table, behind a single lock.

use chrono::{DateTime, Utc};
use live::{LiveTable, Observation};
use metric::Metric;
use protocols::prometheus::text;
use serde_json;
use sink::Uploader;
use source::Scraper;
use std::cell::Cell;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use storage::{Batch, Batches, FileStorage};
use thread::{self, Reentrancy, Shutdown};
use time::{self, Clock};

/// What a single scrape cycle did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScrapeReport {
    /// Targets the scraper reported on.
    pub targets: usize,
    /// Targets whose scrape failed.
    pub failed_targets: usize,
    /// Readings parsed across all targets.
    pub parsed: usize,
    /// Previously live readings pushed out by a changed value.
    pub superseded: usize,
    /// True if a batch was durably stored this cycle.
    pub persisted: bool,
}

/// What a single upload cycle did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UploadReport {
    /// Stored batches offered to the uploader.
    pub batches: usize,
    /// Live readings offered to the uploader.
    pub live: usize,
    /// Metrics the uploader actually pulled from the sequence.
    pub uploaded: usize,
}

/// The scrape and upload scheduler.
///
/// Cloning a `Worker` yields another handle on the same state.
pub struct Worker<S, U> {
    inner: Arc<Inner<S, U>>,
}

impl<S, U> Clone for Worker<S, U> {
    fn clone(&self) -> Worker<S, U> {
        Worker {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S, U> {
    scraper: Mutex<S>,
    uploader: Mutex<U>,
    storage: FileStorage,
    clock: Arc<dyn Clock>,
    live: Mutex<LiveTable>,
    last_upload: Mutex<DateTime<Utc>>,
    scraping: Reentrancy,
    uploading: Reentrancy,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<S, U> Worker<S, U>
where
    S: Scraper + Send + 'static,
    U: Uploader + Send + 'static,
{
    /// Create a new `Worker`. Nothing runs until `start` is called or a
    /// cycle is driven by hand.
    pub fn new(
        scraper: S,
        storage: FileStorage,
        uploader: U,
        clock: Arc<dyn Clock>,
    ) -> Worker<S, U> {
        Worker {
            inner: Arc::new(Inner {
                scraper: Mutex::new(scraper),
                uploader: Mutex::new(uploader),
                storage: storage,
                clock: clock,
                live: Mutex::new(LiveTable::new()),
                last_upload: Mutex::new(time::epoch()),
                scraping: Reentrancy::new(),
                uploading: Reentrancy::new(),
            }),
        }
    }

    /// Run one scrape cycle now. Returns `None` without doing anything if a
    /// scrape cycle is already running.
    pub fn scrape(&self) -> Option<ScrapeReport> {
        let _entered = self.inner.scraping.try_enter()?;
        Some(self.inner.scrape_cycle())
    }

    /// Run one upload cycle now. Returns `None` without doing anything if an
    /// upload cycle is already running.
    pub fn upload(&self) -> Option<UploadReport> {
        let _entered = self.inner.uploading.try_enter()?;
        Some(self.inner.upload_cycle())
    }

    /// Start both cycles on their own timers.
    ///
    /// The first scrape fires `scrape_interval` after start, the first upload
    /// `upload_interval` after start. Once `shutdown` triggers, no new cycle
    /// is started, in-flight cycles run to completion and the returned handle
    /// finishes.
    ///
    /// If the timer threads cannot be spawned `shutdown` is triggered, so any
    /// timer already running winds down, and the error is returned.
    pub fn start(
        &self,
        scrape_interval: Duration,
        upload_interval: Duration,
        shutdown: Shutdown,
    ) -> io::Result<JoinHandle<()>> {
        info!(
            "[worker] starting: scrape every {:?}, upload every {:?}",
            scrape_interval, upload_interval
        );
        let scrape_timer = {
            let worker = self.clone();
            let shutdown = shutdown.clone();
            thread::spawn("scrape-timer", move || {
                let guard = worker.inner.scraping.clone();
                schedule("scrape", scrape_interval, &shutdown, &guard, move || {
                    worker.inner.scrape_cycle();
                })
            })
        };
        let scrape_timer = match scrape_timer {
            Ok(handle) => handle,
            Err(e) => {
                shutdown.trigger();
                return Err(e);
            }
        };
        let upload_timer = {
            let worker = self.clone();
            let shutdown = shutdown.clone();
            thread::spawn("upload-timer", move || {
                let guard = worker.inner.uploading.clone();
                schedule("upload", upload_interval, &shutdown, &guard, move || {
                    worker.inner.upload_cycle();
                })
            })
        };
        let upload_timer = match upload_timer {
            Ok(handle) => handle,
            Err(e) => {
                shutdown.trigger();
                let _ = scrape_timer.join();
                return Err(e);
            }
        };
        thread::spawn("worker", move || {
            if scrape_timer.join().is_err() {
                error!("[worker] scrape timer panicked");
            }
            if upload_timer.join().is_err() {
                error!("[worker] upload timer panicked");
            }
            info!("[worker] stopped");
        })
    }
}

/// Fire `job` every `interval` until `shutdown` triggers.
///
/// Each tick spawns the job on its own thread, so a slow job never delays
/// the timer. A tick that finds `guard` held skips. On shutdown the last
/// spawned job is joined before returning.
fn schedule<F>(
    cycle: &'static str,
    interval: Duration,
    shutdown: &Shutdown,
    guard: &Reentrancy,
    job: F,
) where
    F: Fn() + Clone + Send + 'static,
{
    let mut in_flight: Option<JoinHandle<()>> = None;
    let mut next = match Instant::now().checked_add(interval) {
        Some(next) => next,
        None => {
            error!(
                "[worker] {} interval {:?} is out of range, timer not started",
                cycle, interval
            );
            return;
        }
    };
    while !shutdown.wait_until(next) {
        let now = Instant::now();
        next = match next.checked_add(interval) {
            Some(following) if following >= now => following,
            // Fell behind by more than a whole interval. Don't fire a burst
            // of catch-up ticks.
            _ => match now.checked_add(interval) {
                Some(following) => following,
                None => {
                    error!("[worker] {} interval {:?} is out of range", cycle, interval);
                    break;
                }
            },
        };
        let entered = match guard.try_enter() {
            Some(entered) => entered,
            None => {
                warn!("[worker] {} cycle still running, skipping tick", cycle);
                continue;
            }
        };
        if let Some(previous) = in_flight.take() {
            join_cycle(cycle, previous);
        }
        let job = job.clone();
        match thread::spawn(cycle, move || {
            let _entered = entered;
            job();
        }) {
            Ok(handle) => in_flight = Some(handle),
            Err(e) => error!("[worker] could not spawn {} cycle: {}", cycle, e),
        }
    }
    if let Some(last) = in_flight.take() {
        join_cycle(cycle, last);
    }
    debug!("[worker] {} timer stopped", cycle);
}

fn join_cycle(cycle: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("[worker] {} cycle panicked", cycle);
    }
}

fn decode(key: &DateTime<Utc>, batch: &Batch) -> Vec<Metric> {
    let payload = match batch.load() {
        Ok(payload) => payload,
        Err(e) => {
            error!("[worker] could not load batch {}: {}", key, e);
            return Vec::new();
        }
    };
    match serde_json::from_slice(&payload) {
        Ok(metrics) => metrics,
        Err(e) => {
            error!("[worker] could not decode batch {}: {}", key, e);
            Vec::new()
        }
    }
}

impl<S, U> Inner<S, U>
where
    S: Scraper,
    U: Uploader,
{
    fn scrape_cycle(&self) -> ScrapeReport {
        let start = Instant::now();
        let mut report = ScrapeReport::default();

        let scrapes = match lock(&self.scraper).scrape() {
            Ok(scrapes) => scrapes,
            Err(e) => {
                error!("[worker] scrape failed, no data this cycle: {}", e);
                return report;
            }
        };

        let mut superseded = Vec::new();
        for scrape in scrapes {
            report.targets += 1;
            let body = match scrape.body {
                Ok(body) => body,
                Err(e) => {
                    warn!("[worker] could not scrape {}: {}", scrape.target, e);
                    report.failed_targets += 1;
                    continue;
                }
            };
            let metrics = text::parse(self.clock.now(), &body);
            trace!("[worker] parsed {} metrics from {}", metrics.len(), scrape.target);
            report.parsed += metrics.len();

            let mut live = lock(&self.live);
            for metric in metrics {
                if let Observation::Superseded(previous) = live.observe(metric) {
                    superseded.push(previous);
                }
            }
        }

        report.superseded = superseded.len();
        if !superseded.is_empty() {
            match serde_json::to_vec(&superseded) {
                Ok(payload) => match self.storage.write(&payload) {
                    Ok(key) => {
                        report.persisted = true;
                        debug!(
                            "[worker] stored {} superseded metrics as batch {}",
                            superseded.len(),
                            key
                        );
                    }
                    Err(e) => error!(
                        "[worker] lost {} superseded metrics, could not store batch: {}",
                        superseded.len(),
                        e
                    ),
                },
                Err(e) => error!(
                    "[worker] lost {} superseded metrics, could not encode batch: {}",
                    superseded.len(),
                    e
                ),
            }
        }

        info!(
            "[worker] scraped {} targets ({} failed), {} metrics, {} superseded",
            report.targets, report.failed_targets, report.parsed, report.superseded
        );
        debug!("[worker] scrape cycle took {} ns", time::elapsed_ns(start));
        report
    }

    fn upload_cycle(&self) -> UploadReport {
        let start = Instant::now();
        let since = *lock(&self.last_upload);

        let (batches, read_ok) = match self.storage.read(since) {
            Ok(batches) => (batches, true),
            Err(e) => {
                error!("[worker] could not read stored batches since {}: {}", since, e);
                (Batches::new(), false)
            }
        };
        let snapshot = lock(&self.live).drain();

        let uploaded = Cell::new(0);
        let mut report = UploadReport {
            batches: batches.len(),
            live: snapshot.len(),
            uploaded: 0,
        };
        {
            let mut metrics = batches
                .into_iter()
                .flat_map(|(key, batch)| decode(&key, &batch))
                .chain(snapshot)
                .inspect(|_| uploaded.set(uploaded.get() + 1));
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                lock(&self.uploader).upload(&mut metrics)
            }));
            if outcome.is_err() {
                error!("[worker] uploader panicked, upload cycle abandoned");
            }
        }
        report.uploaded = uploaded.get();

        if read_ok {
            *lock(&self.last_upload) = self.clock.now();
        } else {
            warn!("[worker] store unreadable, holding upload cursor at {}", since);
        }

        info!(
            "[worker] uploaded {} metrics from {} stored batches and {} live series",
            report.uploaded, report.batches, report.live
        );
        debug!("[worker] upload cycle took {} ns", time::elapsed_ns(start));
        report
    }
}
