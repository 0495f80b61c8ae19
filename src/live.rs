//! The live table is the collector's in-memory deduplication state.
//!
//! It holds, per series, the most recent reading not yet durably committed.
//! A reading that repeats the live value is dropped, a reading that changes
//! it pushes the previous value out for persistence. An upload drains the
//! whole table.

use metric::{Metric, SeriesKey};
use seahash::SeaHasher;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

/// A `HashMap` keyed with the seahash hasher.
pub type HashMapSea<K, V> = HashMap<K, V, BuildHasherDefault<SeaHasher>>;

/// The outcome of observing one reading.
#[derive(Debug, PartialEq)]
pub enum Observation {
    /// First sighting of the series. The reading is now live.
    New,
    /// The reading carries the live value. Nothing changed.
    Repeat,
    /// The reading changed the value. The previously live reading is handed
    /// back; it is no longer held anywhere else.
    Superseded(Metric),
}

/// LiveTable stores the latest unpersisted reading per series.
#[derive(Debug, Default)]
pub struct LiveTable {
    series: HashMapSea<SeriesKey, Metric>,
}

impl LiveTable {
    /// Create an empty `LiveTable`.
    pub fn new() -> LiveTable {
        LiveTable::default()
    }

    /// Fold a freshly parsed reading into the table.
    ///
    /// # Examples
    ///
    /// ```
    /// extern crate chrono;
    /// extern crate metrics_collector;
    ///
    /// use chrono::Utc;
    /// use metrics_collector::live::{LiveTable, Observation};
    /// use metrics_collector::metric::{Metric, TagMap};
    ///
    /// let mut live = LiveTable::new();
    /// let m = Metric::new(Utc::now(), "prometheus", "up", "1", &TagMap::default());
    ///
    /// assert_eq!(live.observe(m.clone()), Observation::New);
    /// assert_eq!(live.observe(m.clone()), Observation::Repeat);
    /// assert_eq!(live.observe(m.clone().value("0")), Observation::Superseded(m));
    /// assert_eq!(live.len(), 1);
    /// ```
    pub fn observe(&mut self, metric: Metric) -> Observation {
        match self.series.entry(metric.series_key()) {
            Entry::Vacant(slot) => {
                slot.insert(metric);
                Observation::New
            }
            Entry::Occupied(mut slot) => {
                if slot.get().same_value(&metric) {
                    Observation::Repeat
                } else {
                    Observation::Superseded(slot.insert(metric))
                }
            }
        }
    }

    /// Remove and return every live reading. The table is empty afterward.
    pub fn drain(&mut self) -> Vec<Metric> {
        self.series.drain().map(|(_, metric)| metric).collect()
    }

    /// The live reading of `key`, if any.
    pub fn get(&self, key: &SeriesKey) -> Option<&Metric> {
        self.series.get(key)
    }

    /// The number of live series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// True if no series is live.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
