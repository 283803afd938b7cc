//! Sources move raw input into the store.
//!
//! The only source is the `Pipeline`, which parses newline-delimited logfmt
//! from any `Read` and hands the resulting buckets to a `Store`.

mod pipeline;
mod pool;

pub use self::pipeline::{Error, ParseOpts, Pipeline, Stats};
pub use self::pool::BufferPool;
