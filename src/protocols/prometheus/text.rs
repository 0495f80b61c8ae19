//! The prometheus text exposition parser. Defined loosely here:
//! https://prometheus.io/docs/instrumenting/exposition_formats/#text-format-details
//!
//! Only the flat sample lines are understood. A sample line is a metric name,
//! an optional brace-enclosed list of `key="value"` tags and, after
//! whitespace, a value token running to the end of the line. `HELP` and
//! `TYPE` lines are comments like any other `#` line. Anything that does not
//! fit is dropped without complaint: scrape output is noisy and a bad line is
//! not worth failing a whole target over.

use chrono::{DateTime, Utc};
use metric::{Metric, TagMap};
use regex::Regex;

/// The namespace stamped onto every `Metric` this parser produces.
pub const NAMESPACE: &str = "prometheus";

lazy_static! {
    static ref LINE: Regex = Regex::new(
        r#"^(?P<name>[^#{}\s]+)(?:\{(?P<tags>[^=",]+="(?:[^"\\]|\\.)*"(?:,[^=",]+="(?:[^"\\]|\\.)*")*)\})?\s+(?P<value>.+)$"#
    ).expect("sample line pattern must compile");
    static ref TAG: Regex = Regex::new(
        r#"(?P<key>[^=",]+)="(?P<value>(?:[^"\\]|\\.)*)""#
    ).expect("tag pattern must compile");
}

/// Parse a prometheus text blob
///
/// Every sample line of `source` becomes one `Metric` stamped with
/// `timestamp`, in source line order. Comment lines and lines that do not
/// match the sample grammar produce nothing.
///
/// # Examples
///
/// ```
/// extern crate chrono;
/// extern crate metrics_collector;
///
/// use chrono::Utc;
/// use metrics_collector::protocols::prometheus::text;
///
/// let res = text::parse(Utc::now(), "# HELP up is up\nup{job=\"agent\"} 1\n");
/// assert_eq!(res.len(), 1);
/// assert_eq!(res[0].name, "up");
/// assert_eq!(res[0].value, "1");
/// assert_eq!(res[0].tags, r#"{"job":"agent"}"#);
/// ```
pub fn parse(timestamp: DateTime<Utc>, source: &str) -> Vec<Metric> {
    let mut res = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if let Some(metric) = parse_line(timestamp, line) {
            res.push(metric);
        }
    }
    res
}

fn parse_line(timestamp: DateTime<Utc>, line: &str) -> Option<Metric> {
    let caps = LINE.captures(line)?;
    let name = caps.name("name")?.as_str();
    let value = caps.name("value")?.as_str();
    let tags: TagMap = match caps.name("tags") {
        Some(block) => TAG.captures_iter(block.as_str())
            .filter_map(|tag| match (tag.name("key"), tag.name("value")) {
                (Some(k), Some(v)) => Some((k.as_str().to_string(), v.as_str().to_string())),
                _ => None,
            })
            .collect(),
        None => TagMap::default(),
    };
    Some(Metric::new(timestamp, NAMESPACE, name, value, &tags))
}
