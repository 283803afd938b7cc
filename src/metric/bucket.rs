use metric::{Id, Kind};
use std::cmp::Ordering;

/// Every value observed for one `Id`.
///
/// `sum` always equals the sum of `vals`. Buckets fresh out of the parser are
/// fragments; once handed to the store they are merged with any bucket
/// sharing their identity.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bucket {
    /// The bucket identity.
    pub id: Id,
    /// The units suffix of the raw value, e.g. `ms`. May be empty.
    pub units: String,
    /// Observed values, in arrival order.
    pub vals: Vec<f64>,
    /// Running sum of `vals`.
    pub sum: f64,
}

/// Aggregate statistics over the values of a `Bucket`.
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    /// Number of values.
    pub count: usize,
    /// Sum of the values.
    pub sum: f64,
    /// Smallest value.
    pub lower: f64,
    /// Largest value.
    pub upper: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// The most recently appended value.
    pub last: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 97th percentile.
    pub p97: f64,
    /// 99th percentile.
    pub p99: f64,
}

impl Bucket {
    /// Create an empty bucket.
    pub fn new(id: Id) -> Bucket {
        Bucket {
            id: id,
            units: String::new(),
            vals: Vec::new(),
            sum: 0.0,
        }
    }

    /// Set the units of the bucket.
    pub fn units<S>(mut self, units: S) -> Bucket
    where
        S: Into<String>,
    {
        self.units = units.into();
        self
    }

    /// The kind of the bucket's metric.
    pub fn kind(&self) -> Kind {
        self.id.kind
    }

    /// Add a value to the bucket.
    ///
    /// # Examples
    ///
    /// ```
    /// use siphon::metric::{Bucket, Id, Kind};
    ///
    /// let mut bkt = Bucket::new(Id::new(Kind::Count, "hits", 0));
    /// bkt.append(1.0);
    /// bkt.append(2.5);
    /// assert_eq!(vec![1.0, 2.5], bkt.vals);
    /// assert_eq!(3.5, bkt.sum);
    /// ```
    pub fn append(&mut self, v: f64) {
        self.sum += v;
        self.vals.push(v);
    }

    /// Absorb `other` into this bucket.
    ///
    /// The values of `other` follow ours and its sum is added to ours. The
    /// caller is responsible for `other` sharing our identity.
    pub fn merge(&mut self, other: Bucket) {
        self.sum += other.sum;
        self.vals.extend(other.vals);
    }

    /// Summarize the bucket, or `None` if it holds no values.
    ///
    /// Percentile `p` is the value at index `floor(len * p / 100)` of the
    /// sorted values.
    pub fn summary(&self) -> Option<Summary> {
        let last = match self.vals.last() {
            Some(v) => *v,
            None => return None,
        };
        let mut sorted = self.vals.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let count = sorted.len();
        Some(Summary {
            count: count,
            sum: self.sum,
            lower: sorted[0],
            upper: sorted[count - 1],
            mean: self.sum / count as f64,
            last: last,
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p97: percentile(&sorted, 97.0),
            p99: percentile(&sorted, 99.0),
        })
    }
}

fn percentile(sorted: &[f64], perc: f64) -> f64 {
    let pos = (sorted.len() as f64 * (perc / 100.0)).floor() as usize;
    sorted[pos.min(sorted.len() - 1)]
}
