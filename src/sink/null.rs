use metric::Bucket;
use sink::{Error, Sink};

/// Null sink
///
/// This sink is intended for testing and demonstration. Every bucket it
/// receives is counted and deallocated.
#[derive(Debug, Default)]
pub struct Null {
    received: usize,
}

impl Null {
    /// Create a new Null sink
    pub fn new() -> Null {
        Null::default()
    }

    /// The number of buckets inserted so far.
    pub fn received(&self) -> usize {
        self.received
    }
}

impl Sink for Null {
    fn insert(&mut self, bkts: Vec<Bucket>) -> Result<(), Error> {
        self.received += bkts.len();
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        // do nothing
        Ok(())
    }
}
