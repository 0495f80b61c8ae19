//! Sources of exposition text.
//!
//! A `Scraper` is asked once per scrape cycle for the current output of every
//! target it knows about. The scrape cycle parses whatever comes back; a
//! target that failed contributes nothing to that cycle.

use std::error;
use std::fmt;
use std::io;

mod http;

pub use self::http::{Http, HttpConfig};

/// The result of scraping one target.
#[derive(Debug)]
pub struct Scrape {
    /// The target's configured name.
    pub target: String,
    /// The raw exposition text, or why it could not be had.
    pub body: Result<String, ScrapeError>,
}

impl Scrape {
    /// A successful scrape of `target`.
    pub fn ok<S>(target: S, body: S) -> Scrape
    where
        S: Into<String>,
    {
        Scrape {
            target: target.into(),
            body: Ok(body.into()),
        }
    }

    /// A failed scrape of `target`.
    pub fn failed<S>(target: S, err: ScrapeError) -> Scrape
    where
        S: Into<String>,
    {
        Scrape {
            target: target.into(),
            body: Err(err),
        }
    }
}

/// The ways a scrape may go wrong.
#[derive(Debug)]
pub enum ScrapeError {
    /// The target could not be reached or did not answer in time.
    Unreachable(String),
    /// The target answered with a non-success HTTP status.
    Status(u16),
    /// The target's response body could not be read.
    Body(String),
    /// Local I/O failed.
    Io(io::Error),
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ScrapeError::Unreachable(ref e) => write!(f, "target unreachable: {}", e),
            ScrapeError::Status(code) => write!(f, "target answered with status {}", code),
            ScrapeError::Body(ref e) => write!(f, "could not read response body: {}", e),
            ScrapeError::Io(ref e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl error::Error for ScrapeError {}

impl From<io::Error> for ScrapeError {
    fn from(e: io::Error) -> ScrapeError {
        ScrapeError::Io(e)
    }
}

/// A collaborator that fetches exposition text from every monitored target.
pub trait Scraper {
    /// Scrape every target once.
    ///
    /// Per-target failures are reported inside the returned `Scrape`s. An
    /// `Err` means the whole call failed and the cycle has no data.
    fn scrape(&mut self) -> Result<Vec<Scrape>, ScrapeError>;
}
