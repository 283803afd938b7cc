use metric::{Bucket, Kind};
use serde_json;
use sink::{Error, Sink};
use std::io::Write;

/// Console sink
///
/// Writes one JSON object per bucket per line. Meant for eyeballing and for
/// piping into other tools.
pub struct Console<W: Write> {
    out: W,
}

#[derive(Serialize)]
struct Record<'a> {
    kind: Kind,
    name: &'a str,
    time: i64,
    tags: &'a [(String, String)],
    units: &'a str,
    vals: &'a [f64],
    sum: f64,
}

impl<'a> From<&'a Bucket> for Record<'a> {
    fn from(bkt: &'a Bucket) -> Record<'a> {
        Record {
            kind: bkt.id.kind,
            name: &bkt.id.name,
            time: bkt.id.time,
            tags: &bkt.id.tags,
            units: &bkt.units,
            vals: &bkt.vals,
            sum: bkt.sum,
        }
    }
}

impl<W: Write> Console<W> {
    /// Create a console sink writing to `out`.
    pub fn new(out: W) -> Console<W> {
        Console { out: out }
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for Console<W> {
    fn insert(&mut self, bkts: Vec<Bucket>) -> Result<(), Error> {
        for bkt in &bkts {
            serde_json::to_writer(&mut self.out, &Record::from(bkt))?;
            self.out.write_all(b"\n")?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.out.flush()?;
        Ok(())
    }
}
