//! The aggregation unit of siphon and its identity.
//!
//! A `Bucket` collects every value observed for one metric identity within
//! one time window. The identity, an `Id`, is what the store keys on.

use std::fmt;
use std::str::FromStr;

mod bucket;

pub use self::bucket::{Bucket, Summary};

/// The l2met metric types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Counts sum within a window. Sampled counts are extrapolated.
    Count,
    /// Point-in-time gauges. The last value in a window wins downstream.
    Sample,
    /// Timed measurements, summarized by percentile downstream.
    Measure,
}

impl Kind {
    /// The wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Kind::Count => "count",
            Kind::Sample => "sample",
            Kind::Measure => "measure",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = ();

    fn from_str(s: &str) -> Result<Kind, ()> {
        match s {
            "count" => Ok(Kind::Count),
            "sample" => Ok(Kind::Sample),
            "measure" => Ok(Kind::Measure),
            _ => Err(()),
        }
    }
}

/// The identity of a `Bucket`.
///
/// Two ids name the same aggregate when they share a window and their kind,
/// name and tag sequence are byte-identical. Tag order is significant and
/// duplicate keys are kept.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Id {
    /// Start of the window, in nanoseconds since the epoch.
    pub time: i64,
    /// The metric name, e.g. `db.query`.
    pub name: String,
    /// Tag pairs in the order they were encountered on the line.
    pub tags: Vec<(String, String)>,
    /// The metric type.
    pub kind: Kind,
}

impl Id {
    /// Create an id with no tags at `time`.
    pub fn new<S>(kind: Kind, name: S, time: i64) -> Id
    where
        S: Into<String>,
    {
        Id {
            time: time,
            name: name.into(),
            tags: Vec::new(),
            kind: kind,
        }
    }

    /// Append a tag pair.
    ///
    /// # Examples
    ///
    /// ```
    /// use siphon::metric::{Id, Kind};
    ///
    /// let id = Id::new(Kind::Count, "hits", 0).tag("host", "a").tag("az", "1");
    /// assert_eq!(id.tags[1], ("az".to_string(), "1".to_string()));
    /// ```
    pub fn tag<S>(mut self, key: S, val: S) -> Id
    where
        S: Into<String>,
    {
        self.tags.push((key.into(), val.into()));
        self
    }

    /// The window key and the derived key of this id.
    ///
    /// The derived key joins kind, name and the flattened tags, so
    /// `count#hits` tagged `host=a` becomes `count:hits:host,a`.
    ///
    /// # Examples
    ///
    /// ```
    /// use siphon::metric::{Id, Kind};
    ///
    /// let id = Id::new(Kind::Measure, "db.query", 10).tag("host", "a").tag("db", "main");
    /// assert_eq!((10, "measure:db.query:host,a,db,main".to_string()), id.keys());
    /// ```
    pub fn keys(&self) -> (i64, String) {
        let mut key = String::with_capacity(self.name.len() + 16);
        key.push_str(self.kind.as_str());
        key.push(':');
        key.push_str(&self.name);
        key.push(':');
        let mut first = true;
        for &(ref k, ref v) in &self.tags {
            if !first {
                key.push(',');
            }
            first = false;
            key.push_str(k);
            key.push(',');
            key.push_str(v);
        }
        (self.time, key)
    }
}
