extern crate chan_signal;
extern crate chrono;
extern crate fern;
#[macro_use]
extern crate log;
extern crate metrics_collector;

use chrono::Utc;
use metrics_collector::config::{self, Args, SinkKind};
use metrics_collector::sink::{self, Uploader};
use metrics_collector::source;
use metrics_collector::storage::FileStorage;
use metrics_collector::thread::{self, Shutdown};
use metrics_collector::time::{Clock, SystemClock};
use metrics_collector::worker::Worker;
use std::process;
use std::sync::Arc;
use std::time::Duration;

fn retain(
    storage: FileStorage,
    clock: Arc<dyn Clock>,
    retention: u64,
    every: Duration,
    shutdown: Shutdown,
) {
    let retention = chrono::Duration::seconds(retention as i64);
    while !shutdown.wait_timeout(every) {
        let keep_after = clock.now() - retention;
        match storage.prune(keep_after) {
            Ok(0) => trace!("[retention] nothing older than {}", keep_after),
            Ok(pruned) => info!("[retention] pruned {} batches older than {}", pruned, keep_after),
            Err(e) => error!("[retention] could not prune: {}", e),
        }
    }
}

fn run<U>(args: &Args, uploader: U)
where
    U: Uploader + Send + 'static,
{
    let signal =
        chan_signal::notify(&[chan_signal::Signal::INT, chan_signal::Signal::TERM]);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = FileStorage::new(&args.data_directory, Arc::clone(&clock));
    let scraper = match source::Http::new(args.http()) {
        Ok(scraper) => scraper,
        Err(e) => {
            error!("could not build scraper: {}", e);
            process::exit(1);
        }
    };
    info!(
        "scraping {} endpoints, storing batches in {}",
        args.endpoints.len(),
        storage.root().display()
    );

    let shutdown = Shutdown::new();
    let upload_interval = Duration::from_secs(args.upload_interval);

    let retention = args.retention.map(|retention| {
        let storage = storage.clone();
        let clock = Arc::clone(&clock);
        let shutdown = shutdown.clone();
        thread::spawn("retention", move || {
            retain(storage, clock, retention, upload_interval, shutdown)
        })
    });

    let worker = Worker::new(scraper, storage, uploader, clock);
    let handle = worker.start(
        Duration::from_secs(args.scrape_interval),
        upload_interval,
        shutdown.clone(),
    );

    match handle {
        Ok(handle) => {
            let sig = signal.recv();
            info!("received {:?}, shutting down", sig);
            shutdown.trigger();
            if handle.join().is_err() {
                error!("worker panicked during shutdown");
            }
        }
        Err(e) => {
            error!("could not start worker: {}", e);
            shutdown.trigger();
        }
    }

    match retention {
        Some(Ok(handle)) => {
            if handle.join().is_err() {
                error!("retention loop panicked");
            }
        }
        Some(Err(e)) => error!("could not start retention loop: {}", e),
        None => {}
    }
}

fn main() {
    let args = match config::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("metrics-collector: {}", e);
            process::exit(1);
        }
    };

    let level = match args.verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}][{}] {}",
                record.target(),
                record.line().unwrap_or(0),
                Utc::now().to_rfc3339(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
        .expect("could not set up logging");

    info!("metrics-collector - {}", args.version);

    match args.sink {
        SinkKind::Console => run(&args, sink::Console::new()),
        SinkKind::Null => run(&args, sink::Null::new()),
    }

    info!("metrics-collector stopped");
}
