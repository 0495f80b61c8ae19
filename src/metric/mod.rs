//! The metric model shared by the parser, the store and the uploaders.
//!
//! A `Metric` is one reading of one series at one point in time. The value is
//! kept as the literal text found in the exposition so that no float
//! formatting drift creeps in between the scrape and the sink.

use chrono::{DateTime, Utc};

mod tagmap;

/// The tags of a `Metric`, ordered as they were encountered.
pub type TagMap = self::tagmap::TagMap<String, String>;

/// One observed reading.
///
/// The serialized field names are those of the log-ingestion record the
/// uploaders ship, and are also the on-disk format of stored batches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    /// The instant the reading was parsed.
    #[serde(rename = "TimeGeneratedUtc")]
    pub timestamp: DateTime<Utc>,
    /// The format tag of the parser that produced this reading.
    #[serde(rename = "Namespace")]
    pub namespace: String,
    /// The metric name, verbatim from the source text.
    #[serde(rename = "Name")]
    pub name: String,
    /// The raw value literal, verbatim from the source text.
    #[serde(rename = "Value")]
    pub value: String,
    /// The tags as compact JSON, keys in encounter order.
    #[serde(rename = "Tags")]
    pub tags: String,
}

/// The valueless identity of a `Metric`.
///
/// Two readings belong to the same series exactly when their namespace, name
/// and serialized tags agree. Timestamp and value play no part. Since the tags
/// are serialized in encounter order, a target that emits the same tags in a
/// different order produces a different `SeriesKey`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    namespace: String,
    name: String,
    tags: String,
}

impl Metric {
    /// Create a new `Metric`.
    ///
    /// # Examples
    ///
    /// ```
    /// extern crate chrono;
    /// extern crate metrics_collector;
    ///
    /// use chrono::Utc;
    /// use metrics_collector::metric::{Metric, TagMap};
    ///
    /// let mut tags = TagMap::default();
    /// tags.insert("module".to_string(), "edgeHub".to_string());
    /// let m = Metric::new(Utc::now(), "prometheus", "queue_len", "12", &tags);
    /// assert_eq!(m.tags, r#"{"module":"edgeHub"}"#);
    /// ```
    pub fn new<S>(
        timestamp: DateTime<Utc>,
        namespace: S,
        name: S,
        value: S,
        tags: &TagMap,
    ) -> Metric
    where
        S: Into<String>,
    {
        Metric {
            timestamp: timestamp,
            namespace: namespace.into(),
            name: name.into(),
            value: value.into(),
            tags: tags.to_json(),
        }
    }

    /// Replace the value of this `Metric`, keeping everything else.
    pub fn value<S>(mut self, value: S) -> Metric
    where
        S: Into<String>,
    {
        self.value = value.into();
        self
    }

    /// Replace the timestamp of this `Metric`, keeping everything else.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Metric {
        self.timestamp = timestamp;
        self
    }

    /// Compute the series identity of this `Metric`.
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            tags: self.tags.clone(),
        }
    }

    /// True if `other` carries exactly the same value text.
    pub fn same_value(&self, other: &Metric) -> bool {
        self.value == other.value
    }
}
