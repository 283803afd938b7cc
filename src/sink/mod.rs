//! Sinks take swept buckets out of siphon.
//!
//! A sink receives every bucket detached by a scan or flush, in batches.
//! Delivery is at most once: a batch whose `insert` fails is not retried.

use metric::Bucket;
use serde_json;
use std::error;
use std::fmt;
use std::io;

mod console;
mod influxdb;
mod null;

pub use self::console::Console;
pub use self::influxdb::InfluxDB;
pub use self::null::Null;

/// Sink failures.
#[derive(Debug)]
pub enum Error {
    /// Writing to the destination failed.
    Io(io::Error),
    /// A bucket could not be encoded.
    Json(serde_json::Error),
    /// The destination could not be understood or resolved.
    Dsn(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "sink: {}", e),
            Error::Json(ref e) => write!(f, "sink: {}", e),
            Error::Dsn(ref s) => write!(f, "sink: bad destination {}", s),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Json(ref e) => Some(e),
            Error::Dsn(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Json(e)
    }
}

/// A destination for swept buckets.
pub trait Sink {
    /// Deliver a batch of buckets.
    fn insert(&mut self, bkts: Vec<Bucket>) -> Result<(), Error>;

    /// Release the destination. No inserts follow a close.
    fn close(&mut self) -> Result<(), Error>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn insert(&mut self, bkts: Vec<Bucket>) -> Result<(), Error> {
        (**self).insert(bkts)
    }

    fn close(&mut self) -> Result<(), Error> {
        (**self).close()
    }
}
