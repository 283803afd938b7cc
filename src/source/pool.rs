use std::sync::{Mutex, MutexGuard};

/// A bounded free list of byte buffers.
///
/// Buffers are drawn by the reader, filled, handed to the worker and given
/// back once parsed or dropped. At most `max_idle` buffers are retained;
/// anything given back beyond that is freed.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    buf_capacity: usize,
    max_idle: usize,
}

impl BufferPool {
    /// Create an empty pool whose fresh buffers have room for `buf_capacity`
    /// bytes.
    pub fn new(buf_capacity: usize, max_idle: usize) -> BufferPool {
        BufferPool {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            buf_capacity: buf_capacity,
            max_idle: max_idle,
        }
    }

    /// Draw an empty buffer, reusing an idle one if any.
    pub fn get(&self) -> Vec<u8> {
        match self.lock().pop() {
            Some(buf) => buf,
            None => Vec::with_capacity(self.buf_capacity),
        }
    }

    /// Give a buffer back.
    pub fn put(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.lock();
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }

    /// The number of idle buffers held.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<Vec<Vec<u8>>> {
        self.free.lock().unwrap_or_else(|e| e.into_inner())
    }
}
