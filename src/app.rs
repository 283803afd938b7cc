//! Ties a store to a sink.
//!
//! `Application` moves swept buckets from the store into the sink. The
//! `Scheduler` drives it on a fixed interval from a thread of its own.

use sink::{self, Sink};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use store::{Store, Sweep};

/// A store and the sink its buckets are bound for.
pub struct Application<S> {
    store: Arc<Store>,
    sink: Mutex<S>,
    closed: AtomicBool,
}

impl<S: Sink> Application<S> {
    /// Create an application shipping from `store` into `sink`.
    pub fn new(store: Arc<Store>, sink: S) -> Application<S> {
        Application {
            store: store,
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        }
    }

    /// The store buckets are swept from.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Ship every closed window. Returns the number of buckets shipped.
    ///
    /// Nothing is inserted when no window has closed, or once the sink has
    /// been closed by `flush`.
    pub fn scan(&self) -> Result<usize, sink::Error> {
        let mut sink = self.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Ok(0);
        }
        ship(&mut *sink, self.store.scan())
    }

    /// Ship every window, closed or not, then close the sink.
    ///
    /// Only the first call does anything. Later calls, from any thread,
    /// return `Ok(0)` and leave the closed sink alone.
    pub fn flush(&self) -> Result<usize, sink::Error> {
        let mut sink = self.lock();
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }
        let shipped = ship(&mut *sink, self.store.flush())?;
        sink.close()?;
        Ok(shipped)
    }

    fn lock(&self) -> MutexGuard<S> {
        self.sink.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// Sweeps are taken with the sink lock held so that a flush never overtakes a
// scan that has already detached windows.
fn ship<S: Sink>(sink: &mut S, sweep: Sweep) -> Result<usize, sink::Error> {
    let windows = sweep.windows();
    let bkts: Vec<_> = sweep.collect();
    let n = bkts.len();
    debug!("swept {} buckets from {} windows", n, windows);
    if n > 0 {
        sink.insert(bkts)?;
    }
    Ok(n)
}

/// Periodically scans an `Application` from a background thread.
///
/// The thread stops when `stop` is called or the scheduler is dropped.
pub struct Scheduler {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Scheduler {
    /// Scan `app` every `interval` until stopped.
    ///
    /// A failed scan is logged and its buckets are lost; the next scan goes
    /// ahead as usual.
    pub fn start<S>(app: Arc<Application<S>>, interval: Duration) -> io::Result<Scheduler>
    where
        S: Sink + Send + 'static,
    {
        let (snd, rcv) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("scheduler".into())
            .spawn(move || loop {
                match rcv.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = app.scan() {
                            error!("unable to ship scan: {}", e);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        trace!("scheduler stopping");
                        return;
                    }
                }
            })?;
        Ok(Scheduler {
            stop: Some(snd),
            handle: Some(handle),
        })
    }

    /// Stop scanning, waiting for an in-flight scan to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
