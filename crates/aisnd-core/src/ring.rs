//! Lock-free single-producer single-consumer byte ring for PCM data.
//!
//! The emulator side writes audio interface DMA buffers with [`Producer::write()`], the output
//! callback drains them with [`Consumer::read()`]. Both operations are partial: they transfer as
//! many bytes as currently fit or are available and never block.

use std::fmt;
use std::ptr::NonNull;
#[cfg(not(loom))]
use std::sync::atomic::AtomicUsize;
#[cfg(not(loom))]
use std::sync::atomic::Ordering::{Acquire, Release};
#[cfg(not(loom))]
use std::sync::Arc;

use crossbeam_utils::CachePadded;
#[cfg(loom)]
use loom::sync::atomic::AtomicUsize;
#[cfg(loom)]
use loom::sync::atomic::Ordering::{Acquire, Release};
#[cfg(loom)]
use loom::sync::Arc;

const INDEX_MASK: usize = usize::MAX / 2;

const CLOSED_MASK: usize = 1 << (usize::BITS - 1);

/// Creates a byte ring.
///
/// `capacity` must be a power of 2 between `1` and `usize::MAX / 2`.
pub fn buffer(capacity: usize) -> (Producer, Consumer) {
    let shared = Arc::new(Shared::new(capacity));

    let producer = Producer {
        shared: shared.clone(),
        closed: false,
        read_state: 0,
        write_idx: 0,
    };

    let consumer = Consumer {
        shared,
        closed: false,
        read_idx: 0,
        write_state: 0,
    };

    (producer, consumer)
}

struct Shared {
    data: NonNull<u8>,
    capacity: usize,
    /// Read index (lowest N-1 bits) and a flag (highest bit) signifying that the consumer is
    /// closed.
    read_state: CachePadded<AtomicUsize>,
    /// Write index (lowest N-1 bits) and a flag (highest bit) signifying that the producer is
    /// closed.
    write_state: CachePadded<AtomicUsize>,
}

// SAFETY: the producer only touches bytes in `[write_idx, read_idx + capacity)`, the consumer only
// touches `[read_idx, write_idx)`. Index updates are published with release/acquire pairs.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    fn new(capacity: usize) -> Shared {
        assert!(capacity > 0 && capacity <= INDEX_MASK && capacity.is_power_of_two());

        let data = Box::leak(vec![0u8; capacity].into_boxed_slice());

        Shared {
            data: NonNull::from(data).cast::<u8>(),
            capacity,
            read_state: CachePadded::new(AtomicUsize::new(0)),
            write_state: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// `capacity` is a power of two, using bitwise and instead of modulo.
    fn wrap(&self, idx: usize) -> usize {
        idx & (self.capacity - 1)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let slice = std::ptr::slice_from_raw_parts_mut(self.data.as_ptr(), self.capacity);
        // SAFETY: allocated in `Shared::new` as a boxed slice of exactly `capacity` bytes.
        drop(unsafe { Box::from_raw(slice) });
    }
}

/// Writing side of the ring.
pub struct Producer {
    shared: Arc<Shared>,
    closed: bool,
    read_state: usize,
    write_idx: usize,
}

impl Producer {
    /// Updates cached state, synchronizing with the consumer.
    pub fn refresh(&mut self) {
        // Using `Acquire` here to establish a happens-after relationship with `Consumer::read()`
        // and `Consumer::drop()`.
        self.read_state = self.shared.read_state.load(Acquire);
    }

    fn read_idx(&self) -> usize {
        self.read_state & INDEX_MASK
    }

    /// Returns `true` if the ring is closed on either side.
    ///
    /// Uses the cached state. To update, call [`Self::refresh()`].
    pub fn is_closed(&self) -> bool {
        self.closed || self.read_state & CLOSED_MASK == CLOSED_MASK
    }

    /// Number of bytes queued and not yet read.
    ///
    /// Uses the cached state. To update, call [`Self::refresh()`].
    pub fn len(&self) -> usize {
        self.write_idx.wrapping_sub(self.read_idx()) & INDEX_MASK
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Close the ring, waking up the consumer to the fact no more bytes will arrive.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;
        self.shared
            .write_state
            .store(self.write_idx | CLOSED_MASK, Release);
    }

    /// Writes as many bytes of `bytes` as there is room for, returning that count.
    ///
    /// Returns [`Closed`] if either side has been closed.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, Closed> {
        if self.closed {
            return Err(Closed);
        }

        if bytes.len() > self.capacity() - self.len() {
            self.refresh();
        }

        if self.is_closed() {
            return Err(Closed);
        }

        let count = bytes.len().min(self.capacity() - self.len());
        if count == 0 {
            return Ok(0);
        }

        let idx = self.shared.wrap(self.write_idx);
        let left_len = (self.capacity() - idx).min(count);
        let right_len = count - left_len;

        unsafe {
            // SAFETY: `idx + left_len <= capacity`, and no byte in this range is visible to the
            // consumer until `commit`.
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.shared.data.as_ptr().add(idx),
                left_len,
            );

            // SAFETY: `right_len < capacity`, same reasoning as above for the wrapped part.
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr().add(left_len),
                self.shared.data.as_ptr(),
                right_len,
            );
        }

        self.write_idx = self.write_idx.wrapping_add(count) & INDEX_MASK;

        // Using `Release` ordering to establish a happens-before relationship with
        // `Consumer::refresh()`.
        self.shared.write_state.store(self.write_idx, Release);

        Ok(count)
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Reading side of the ring.
pub struct Consumer {
    shared: Arc<Shared>,
    closed: bool,
    read_idx: usize,
    write_state: usize,
}

impl Consumer {
    /// Updates cached state, synchronizing with the producer.
    pub fn refresh(&mut self) {
        // Using `Acquire` here to establish a happens-after relationship with `Producer::write()`
        // and `Producer::drop()`.
        self.write_state = self.shared.write_state.load(Acquire);
    }

    fn write_idx(&self) -> usize {
        self.write_state & INDEX_MASK
    }

    /// Returns `true` if the ring is closed on either side.
    ///
    /// Uses the cached state. To update, call [`Self::refresh()`].
    pub fn is_closed(&self) -> bool {
        self.closed || self.write_state & CLOSED_MASK == CLOSED_MASK
    }

    /// Number of bytes ready to be read.
    ///
    /// Uses the cached state. To update, call [`Self::refresh()`].
    pub fn len(&self) -> usize {
        self.write_idx().wrapping_sub(self.read_idx) & INDEX_MASK
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;
        self.shared
            .read_state
            .store(self.read_idx | CLOSED_MASK, Release);
    }

    /// Reads up to `dst.len()` bytes, returning how many were copied into the front of `dst`.
    ///
    /// A short read means the producer has fallen behind (or is gone).
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        if self.len() < dst.len() {
            self.refresh();
        }

        let count = dst.len().min(self.len());
        if count == 0 {
            return 0;
        }

        let idx = self.shared.wrap(self.read_idx);
        let left_len = (self.capacity() - idx).min(count);
        let right_len = count - left_len;

        unsafe {
            // SAFETY: `idx + left_len <= capacity`, and these bytes were published by the producer
            // before the `write_state` we've loaded.
            std::ptr::copy_nonoverlapping(
                self.shared.data.as_ptr().add(idx),
                dst.as_mut_ptr(),
                left_len,
            );

            // SAFETY: same as above, for the part wrapping around to the start.
            std::ptr::copy_nonoverlapping(
                self.shared.data.as_ptr(),
                dst.as_mut_ptr().add(left_len),
                right_len,
            );
        }

        self.read_idx = self.read_idx.wrapping_add(count) & INDEX_MASK;

        // Using `Release` ordering to establish a happens-before relationship with
        // `Producer::refresh()`, so the producer never overwrites bytes still being copied.
        self.shared.read_state.store(self.read_idx, Release);

        count
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Error returned from [`Producer::write()`] once the ring has been closed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("ring buffer closed")]
pub struct Closed;

#[cfg(test)]
mod tests {
    #[cfg(not(loom))]
    use std::thread;

    #[cfg(loom)]
    use loom::thread;

    use super::*;

    #[test]
    #[cfg(not(loom))]
    fn partial_write_and_read() {
        let (mut producer, mut consumer) = buffer(8);

        assert_eq!(producer.write(&[1, 2, 3, 4, 5, 6]), Ok(6));
        assert_eq!(producer.write(&[7, 8, 9, 10]), Ok(2));
        assert!(producer.is_full());

        let mut buf = [0; 5];
        assert_eq!(consumer.read(&mut buf), 5);
        assert_eq!(buf, [1, 2, 3, 4, 5]);

        let mut buf = [0; 5];
        assert_eq!(consumer.read(&mut buf), 3);
        assert_eq!(buf, [6, 7, 8, 0, 0]);

        assert_eq!(consumer.read(&mut buf), 0);
        assert!(consumer.is_empty());
    }

    #[test]
    #[cfg(not(loom))]
    fn wrap_around() {
        let (mut producer, mut consumer) = buffer(4);

        let mut buf = [0; 3];
        assert_eq!(producer.write(&[1, 2, 3]), Ok(3));
        assert_eq!(consumer.read(&mut buf), 3);

        assert_eq!(producer.write(&[4, 5, 6, 7]), Ok(4));
        let mut buf = [0; 4];
        assert_eq!(consumer.read(&mut buf), 4);
        assert_eq!(buf, [4, 5, 6, 7]);
    }

    #[test]
    #[cfg(not(loom))]
    fn close_on_drop() {
        let (mut producer, mut consumer) = buffer(4);

        assert_eq!(producer.write(&[1, 2]), Ok(2));
        drop(producer);

        let mut buf = [0; 4];
        assert_eq!(consumer.read(&mut buf), 2);
        assert!(consumer.is_closed());

        let (mut producer, consumer) = buffer(4);
        drop(consumer);
        assert_eq!(producer.write(&[1, 2, 3, 4, 5]), Err(Closed));
    }

    #[test]
    #[cfg(not(loom))]
    fn empty_write() {
        let (mut producer, consumer) = buffer(4);
        assert_eq!(producer.write(&[]), Ok(0));
        assert_eq!(consumer.capacity(), 4);
    }

    fn do_parallel_transfer() {
        let (mut producer, mut consumer) = buffer(4);

        let expected: Vec<u8> = (0..7).collect();

        let data = expected.clone();
        let t1 = thread::spawn(move || {
            let mut rest = &data[..];
            while !rest.is_empty() {
                match producer.write(rest) {
                    Ok(n) => rest = &rest[n..],
                    Err(Closed) => panic!("couldn't write all bytes"),
                }
                thread::yield_now();
            }
        });

        let t2 = thread::spawn(move || {
            let mut received = Vec::new();
            let mut buf = [0; 3];
            loop {
                let n = consumer.read(&mut buf);
                received.extend_from_slice(&buf[..n]);
                if n == 0 {
                    if consumer.is_closed() && consumer.is_empty() {
                        break;
                    }
                    thread::yield_now();
                }
            }

            assert_eq!(received, expected);
        });

        t1.join().unwrap();
        t2.join().unwrap();
    }

    #[test]
    #[cfg(not(loom))]
    fn parallel_transfer() {
        do_parallel_transfer();
    }

    #[test]
    #[cfg(loom)]
    fn parallel_transfer() {
        loom::model(do_parallel_transfer);
    }
}
