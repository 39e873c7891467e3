//! Bounded buffer of wire samples between the hardware callback and the
//! network drain.
//!
//! The queue itself is lock-free; ordering between producer pushes, drains
//! and flushes is provided by the lock in [`crate::sample::pipeline`].

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::WireSample;

/// Bounded circular container of wire samples
pub struct SampleBuffer {
    queue: ArrayQueue<WireSample>,
    overflow_count: AtomicU64,
    underrun_count: AtomicUsize,
    flush_count: AtomicUsize,
}

impl SampleBuffer {
    /// Create a new buffer with the specified capacity in samples
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            overflow_count: AtomicU64::new(0),
            underrun_count: AtomicUsize::new(0),
            flush_count: AtomicUsize::new(0),
        }
    }

    /// Push samples until the buffer is full.
    /// Returns how many were stored; the rest are counted as overflow.
    pub fn put(&self, samples: &[WireSample]) -> usize {
        for (stored, sample) in samples.iter().enumerate() {
            if self.queue.push(*sample).is_err() {
                let dropped = (samples.len() - stored) as u64;
                self.overflow_count.fetch_add(dropped, Ordering::Relaxed);
                return stored;
            }
        }
        samples.len()
    }

    /// Pop up to `out.len()` samples into `out`
    pub fn get(&self, out: &mut [WireSample]) -> usize {
        for (taken, slot) in out.iter_mut().enumerate() {
            match self.queue.pop() {
                Some(sample) => *slot = sample,
                None => {
                    self.underrun_count.fetch_add(1, Ordering::Relaxed);
                    return taken;
                }
            }
        }
        out.len()
    }

    /// Number of samples ready to be read
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    /// Discard everything buffered. Returns the number of samples dropped.
    pub fn flush(&self) -> usize {
        let mut dropped = 0;
        while self.queue.pop().is_some() {
            dropped += 1;
        }
        self.flush_count.fetch_add(1, Ordering::Relaxed);
        dropped
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Samples dropped because the buffer was full
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    /// Number of flushes performed since creation
    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::Relaxed)
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.available() as f32 / self.capacity() as f32
    }
}

/// Thread-safe handle to a sample buffer
pub type SharedSampleBuffer = Arc<SampleBuffer>;

/// Create a new shared sample buffer
pub fn create_shared_buffer(capacity: usize) -> SharedSampleBuffer {
    Arc::new(SampleBuffer::new(capacity))
}
