//! The store is the primary internal storage type.
//!
//! It maps each window to the buckets observed within it, keyed by their
//! derived key. Buckets sharing a window and key are merged on `add`. Closed
//! windows are detached by `scan`, every window by `flush`; both hand back a
//! `Sweep` which yields the detached buckets without holding the store lock.

use metric::Bucket;
use seahash::SeaHasher;
use std::collections::hash_map;
use std::collections::HashMap;
use std::error;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::iter;
use std::mem;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use std::vec;
use time;

/// A `HashMap` hashed with seahash.
pub type HashMapSea<K, V> = HashMap<K, V, BuildHasherDefault<SeaHasher>>;

type Window = HashMapSea<String, Bucket>;

/// Store failures.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A thread panicked while holding the store lock. The buckets it was
    /// adding may be half-merged.
    Poisoned,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Poisoned => write!(f, "store: lock poisoned"),
        }
    }
}

impl error::Error for Error {}

/// Concurrency-safe, windowed bucket storage.
pub struct Store {
    resolution: i64,
    windows: Mutex<HashMapSea<i64, Window>>,
}

impl Store {
    /// Create an empty store with windows `resolution` wide.
    ///
    /// A zero resolution is treated as one nanosecond.
    pub fn new(resolution: Duration) -> Store {
        Store {
            resolution: time::nanos(resolution).max(1),
            windows: Mutex::new(HashMapSea::default()),
        }
    }

    /// The window width, in nanoseconds.
    pub fn resolution(&self) -> i64 {
        self.resolution
    }

    /// Add buckets to the store, merging those whose window and key are
    /// already present.
    ///
    /// Returns the number of buckets that arrived after their window had
    /// closed. Late buckets are stored all the same and will go out with the
    /// next scan.
    ///
    /// # Examples
    ///
    /// ```
    /// use siphon::metric::{Bucket, Id, Kind};
    /// use siphon::store::Store;
    /// use std::time::Duration;
    ///
    /// let store = Store::new(Duration::from_secs(10));
    /// let mut bkt = Bucket::new(Id::new(Kind::Count, "hits", 0));
    /// bkt.append(1.0);
    ///
    /// // the epoch is long gone
    /// assert_eq!(Ok(2), store.add(vec![bkt.clone(), bkt]));
    /// assert_eq!(1, store.windows());
    /// ```
    pub fn add(&self, bkts: Vec<Bucket>) -> Result<usize, Error> {
        self.add_at(time::now(), bkts)
    }

    /// As `add`, judging lateness against `now`.
    pub fn add_at(&self, now: i64, bkts: Vec<Bucket>) -> Result<usize, Error> {
        let watermark = time::watermark(now, self.resolution);
        let mut late = 0;

        let mut windows = self.windows.lock().map_err(|_| Error::Poisoned)?;
        for bkt in bkts {
            let (ts, key) = bkt.id.keys();
            if ts <= watermark {
                late += 1;
            }
            match windows.entry(ts).or_insert_with(Window::default).entry(key) {
                hash_map::Entry::Occupied(mut e) => e.get_mut().merge(bkt),
                hash_map::Entry::Vacant(e) => {
                    e.insert(bkt);
                }
            }
        }
        Ok(late)
    }

    /// Detach every closed window.
    ///
    /// Windows at or before the watermark, one resolution and one second
    /// behind the current window, are removed and streamed. Open windows keep
    /// collecting.
    pub fn scan(&self) -> Sweep {
        self.scan_at(time::now())
    }

    /// As `scan`, computing the watermark from `now`.
    pub fn scan_at(&self, now: i64) -> Sweep {
        let watermark = time::watermark(now, self.resolution);
        let mut detached = Vec::new();
        {
            let mut windows = self.lock();
            let closed: Vec<i64> = windows
                .keys()
                .filter(|ts| **ts <= watermark)
                .cloned()
                .collect();
            for ts in closed {
                if let Some(window) = windows.remove(&ts) {
                    detached.push(window);
                }
            }
        }
        trace!("scan detached {} windows", detached.len());
        Sweep::new(detached)
    }

    /// Detach every window, open or closed.
    pub fn flush(&self) -> Sweep {
        let windows = mem::replace(&mut *self.lock(), HashMapSea::default());
        Sweep::new(windows.into_iter().map(|(_, w)| w).collect())
    }

    /// The number of windows currently held.
    pub fn windows(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no windows.
    pub fn is_empty(&self) -> bool {
        self.windows() == 0
    }

    /// Poison the store lock by panicking while holding it.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        ::std::thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = self.windows.lock();
                    panic!("poison the store");
                })
                .join();
        });
    }

    // Sweeping is a pure structural operation. A poisoned map is still a map
    // and handing its contents on beats losing them.
    fn lock(&self) -> MutexGuard<HashMapSea<i64, Window>> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn window_buckets(window: Window) -> hash_map::IntoValues<String, Bucket> {
    window.into_values()
}

/// The buckets detached by one `Store::scan` or `Store::flush`.
///
/// A `Sweep` owns what it yields; the store no longer knows about these
/// buckets. It ends after the last bucket.
pub struct Sweep {
    windows: usize,
    buckets: iter::FlatMap<
        vec::IntoIter<Window>,
        hash_map::IntoValues<String, Bucket>,
        fn(Window) -> hash_map::IntoValues<String, Bucket>,
    >,
}

impl Sweep {
    fn new(windows: Vec<Window>) -> Sweep {
        Sweep {
            windows: windows.len(),
            buckets: windows
                .into_iter()
                .flat_map(window_buckets as fn(Window) -> hash_map::IntoValues<String, Bucket>),
        }
    }

    /// The number of windows this sweep detached.
    pub fn windows(&self) -> usize {
        self.windows
    }
}

impl Iterator for Sweep {
    type Item = Bucket;

    fn next(&mut self) -> Option<Bucket> {
        self.buckets.next()
    }
}

impl fmt::Debug for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Sweep").field("windows", &self.windows).finish()
    }
}
