use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::cancellation::{CancellationToken, Cancelled};

const RENT_POLL: Duration = Duration::from_millis(50);

/// Fixed pool of pre-allocated text buffers. The pool holds
/// `degree + 1` buffers of `buffer_size` capacity, allocated once; it is
/// the pipeline's only memory governor. Renting blocks until a buffer
/// comes back or the token is cancelled.
pub(crate) struct BufferPool {
    buffers: Mutex<Vec<String>>,
    available: Condvar,
    buffer_size: usize,
}

impl BufferPool {
    pub(crate) fn new(buffer_size: usize, degree: usize) -> BufferPool {
        let buffers = (0..degree + 1)
            .map(|_| String::with_capacity(buffer_size))
            .collect();
        BufferPool {
            buffers: Mutex::new(buffers),
            available: Condvar::new(),
            buffer_size,
        }
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub(crate) fn rent(&self, token: &CancellationToken) -> Result<String, anyhow::Error> {
        let mut buffers = self.buffers.lock().unwrap();
        loop {
            if token.is_cancelled() {
                return Err(anyhow::Error::new(Cancelled));
            }
            if let Some(buffer) = buffers.pop() {
                return Ok(buffer);
            }
            let (guard, _) = self.available.wait_timeout(buffers, RENT_POLL).unwrap();
            buffers = guard;
        }
    }

    /// Return a buffer to the pool. Buffers without backing capacity are
    /// silently ignored.
    pub(crate) fn give_back(&self, mut buffer: String) {
        if buffer.capacity() == 0 {
            return;
        }
        buffer.clear();
        self.buffers.lock().unwrap().push(buffer);
        self.available.notify_one();
    }
}

#[cfg(test)]
impl BufferPool {
    pub(crate) fn available(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }
}
