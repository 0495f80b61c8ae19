//! Upload destinations.
//!
//! An `Uploader` receives, once per upload cycle, the consolidated sequence
//! of metrics: durable batches first, then the live snapshot. Delivery is
//! the uploader's business. It must log and swallow its own failures; the
//! upload cycle moves on regardless.

use metric::Metric;

mod console;
mod null;

pub use self::console::Console;
pub use self::null::Null;

/// A collaborator that ships metrics somewhere.
pub trait Uploader {
    /// Ship every metric the iterator yields.
    ///
    /// The iterator is lazy: stored batches are read from disk only as it is
    /// advanced, so implementations should stream rather than collect when
    /// they can.
    fn upload(&mut self, metrics: &mut dyn Iterator<Item = Metric>);
}
