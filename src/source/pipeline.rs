use protocols::l2met::Parser;
use source::BufferPool;
use std::error;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread;
use store::{self, Store};

/// Pipeline failures.
#[derive(Debug)]
pub enum Error {
    /// Reading the input failed.
    Io(io::Error),
    /// The store refused a chunk. Only the first such error of a run is kept.
    Store(store::Error),
    /// The worker stage went away before the input was drained.
    Disconnected,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "pipeline: read failed: {}", e),
            Error::Store(ref e) => write!(f, "pipeline: {}", e),
            Error::Disconnected => write!(f, "pipeline: worker disconnected"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Store(ref e) => Some(e),
            Error::Disconnected => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<store::Error> for Error {
    fn from(e: store::Error) -> Error {
        Error::Store(e)
    }
}

/// Tuning for one `Pipeline::run`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseOpts {
    /// Bytes accumulated before a buffer is handed to the worker.
    pub chunk_size: usize,
    /// Capacity of the queue between reader and worker. Chunks offered to a
    /// full queue are dropped.
    pub max_pending: usize,
}

impl Default for ParseOpts {
    fn default() -> ParseOpts {
        ParseOpts {
            chunk_size: 4096,
            max_pending: 16,
        }
    }
}

/// Running totals of a `Pipeline`, across every run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    /// Lines handed to the parser.
    pub lines: usize,
    /// Lines passed to the invalid callback.
    pub invalid: usize,
    /// Buckets the store reported as late.
    pub late: usize,
    /// Chunks dropped because the worker fell behind.
    pub drops: usize,
}

/// Moves newline-delimited input through the parser into a store.
///
/// Reading happens on the calling thread, parsing on a worker thread. The two
/// are joined by a bounded queue. When the worker falls behind the reader
/// sheds whole chunks rather than wait: losing input is preferred to stalling
/// whatever writes it.
pub struct Pipeline {
    parser: Parser,
    store: Arc<Store>,
    lines: AtomicUsize,
    invalid: AtomicUsize,
    late: AtomicUsize,
    drops: AtomicUsize,
}

impl Pipeline {
    /// Create a pipeline feeding `store`.
    pub fn new(parser: Parser, store: Arc<Store>) -> Pipeline {
        Pipeline {
            parser: parser,
            store: store,
            lines: AtomicUsize::new(0),
            invalid: AtomicUsize::new(0),
            late: AtomicUsize::new(0),
            drops: AtomicUsize::new(0),
        }
    }

    /// The counters so far.
    pub fn stats(&self) -> Stats {
        Stats {
            lines: self.lines.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            late: self.late.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
        }
    }

    /// Drain `source` into the store.
    ///
    /// Every line that fails to parse, or parses to no metrics, is handed to
    /// `invalid` as read, trailing newline included. Returns once the input
    /// is exhausted and everything queued has been parsed.
    ///
    /// A read error stops reading. It is returned after the worker drains,
    /// as is the first store error, which abandons only the chunk it hit.
    ///
    /// # Examples
    ///
    /// ```
    /// use siphon::protocols::l2met::Parser;
    /// use siphon::source::{ParseOpts, Pipeline};
    /// use siphon::store::Store;
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let res = Duration::from_secs(10);
    /// let store = Arc::new(Store::new(res));
    /// let pipeline = Pipeline::new(Parser::new(res), Arc::clone(&store));
    ///
    /// let input = &b"count#hits=1\nnot a metric\ncount#hits=2\n"[..];
    /// pipeline.run(input, ParseOpts::default(), |_line| {}).unwrap();
    ///
    /// assert_eq!(3, pipeline.stats().lines);
    /// assert_eq!(1, pipeline.stats().invalid);
    /// ```
    pub fn run<R, F>(&self, source: R, opts: ParseOpts, invalid: F) -> Result<(), Error>
    where
        R: Read,
        F: Fn(&[u8]) + Sync,
    {
        let pool = BufferPool::new(opts.chunk_size, opts.max_pending + 2);
        let (snd, rcv) = mpsc::sync_channel(opts.max_pending);
        let before = self.stats();

        let res = thread::scope(|scope| {
            let pool = &pool;
            let invalid = &invalid;
            let worker = scope.spawn(move || self.work(rcv, pool, invalid));
            let read = self.read(source, &opts, snd, pool);
            match worker.join() {
                Ok(stored) => read.and(stored),
                Err(_) => Err(Error::Disconnected),
            }
        });

        let after = self.stats();
        info!(
            "run complete: {} lines, {} invalid, {} late, {} dropped chunks",
            after.lines - before.lines,
            after.invalid - before.invalid,
            after.late - before.late,
            after.drops - before.drops
        );
        res
    }

    fn read<R>(
        &self,
        source: R,
        opts: &ParseOpts,
        queue: SyncSender<Vec<u8>>,
        pool: &BufferPool,
    ) -> Result<(), Error>
    where
        R: Read,
    {
        let mut reader = BufReader::new(source);
        let mut buf = pool.get();
        let mut dropped = 0;
        let mut res = Ok(());

        loop {
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if buf.len() >= opts.chunk_size {
                        let full = mem::replace(&mut buf, pool.get());
                        let offered =
                            self.offer(&queue, full, pool, opts.max_pending, &mut dropped);
                        if let Err(e) = offered {
                            pool.put(buf);
                            return Err(e);
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    res = Err(Error::Io(e));
                    break;
                }
            }
        }

        if buf.is_empty() {
            pool.put(buf);
        } else if queue.send(buf).is_err() {
            return Err(Error::Disconnected);
        }
        res
    }

    fn offer(
        &self,
        queue: &SyncSender<Vec<u8>>,
        buf: Vec<u8>,
        pool: &BufferPool,
        max_pending: usize,
        dropped: &mut usize,
    ) -> Result<(), Error> {
        match queue.try_send(buf) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(buf)) => {
                pool.put(buf);
                self.drops.fetch_add(1, Ordering::Relaxed);
                *dropped += 1;
                if warn_drop(*dropped, max_pending) {
                    warn!(
                        "worker is behind, {} chunks dropped this run",
                        *dropped
                    );
                }
                Ok(())
            }
            Err(TrySendError::Disconnected(buf)) => {
                pool.put(buf);
                Err(Error::Disconnected)
            }
        }
    }

    fn work<F>(&self, queue: Receiver<Vec<u8>>, pool: &BufferPool, invalid: &F) -> Result<(), Error>
    where
        F: Fn(&[u8]),
    {
        let mut res = Ok(());
        for chunk in queue.iter() {
            if let Err(e) = self.ingest(&chunk, invalid) {
                error!("abandoning chunk of {} bytes: {}", chunk.len(), e);
                if res.is_ok() {
                    res = Err(Error::Store(e));
                }
            }
            pool.put(chunk);
        }
        res
    }

    fn ingest<F>(&self, chunk: &[u8], invalid: &F) -> Result<(), store::Error>
    where
        F: Fn(&[u8]),
    {
        for line in chunk.split_inclusive(|c| *c == b'\n') {
            self.lines.fetch_add(1, Ordering::Relaxed);
            match self.parser.parse(line) {
                Ok(bkts) => {
                    if bkts.is_empty() {
                        self.reject(line, invalid);
                        continue;
                    }
                    let late = self.store.add(bkts)?;
                    if late > 0 {
                        self.late.fetch_add(late, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    trace!("{}", e);
                    self.reject(line, invalid);
                }
            }
        }
        Ok(())
    }

    fn reject<F>(&self, line: &[u8], invalid: &F)
    where
        F: Fn(&[u8]),
    {
        self.invalid.fetch_add(1, Ordering::Relaxed);
        invalid(line);
    }
}

/// Whether the `dropped`th drop of a run is worth a warning. That is the
/// first, then every `max_pending`th, or all of them with no queue at all.
fn warn_drop(dropped: usize, max_pending: usize) -> bool {
    dropped == 1 || max_pending == 0 || dropped % max_pending == 0
}
