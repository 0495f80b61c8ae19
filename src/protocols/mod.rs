//! The input protocols that the collector must parse. These modules are used
//! by the scrape cycle to turn raw target output into `Metric`s.

pub mod prometheus;
