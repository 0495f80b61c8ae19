//! metrics-collector scrapes Prometheus text exposition endpoints on a fixed
//! interval and forwards what it sees to an uploader on a slower one.
//!
//! Between uploads it keeps only what changed. Every series has one live
//! reading in memory; a scrape that repeats the live value is dropped, a
//! scrape that changes it pushes the old value into a durable, file-backed
//! batch store. An upload drains the live table and replays every batch
//! stored since the previous upload. Steady series therefore cost one record
//! per upload interval, no matter how often they are scraped.
//!
//! The moving parts:
//!
//!  * `source`: fetches exposition text from the monitored targets.
//!  * `protocols::prometheus::text`: turns that text into `metric::Metric`s.
//!  * `live`: the in-memory deduplication table.
//!  * `storage`: the durable batch store.
//!  * `sink`: where uploads go.
//!  * `worker`: schedules scrape and upload cycles over the above.
#![allow(unknown_lints)]
#![deny(trivial_numeric_casts, missing_docs, unstable_features, unused_import_braces)]
extern crate chrono;
extern crate clap;
extern crate regex;
extern crate reqwest;
extern crate seahash;
extern crate serde;
extern crate serde_json;
extern crate toml;

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate serde_derive;

#[cfg(test)]
extern crate quickcheck;

pub mod config;
pub mod live;
pub mod metric;
pub mod protocols;
pub mod sink;
pub mod source;
pub mod storage;
pub mod thread;
pub mod time;
pub mod worker;
