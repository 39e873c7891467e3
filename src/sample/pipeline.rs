//! Ingestion path from the hardware callback into the shared sample buffer.
//!
//! One mutex serialises everything that touches the converter or the buffer
//! contents: the callback push, converter swaps, flushes and chunk drains.
//! The callback never waits on anything but that lock.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use super::buffer::SharedSampleBuffer;
use super::codec::SampleCodec;
use super::converter::RateConverter;
use super::{IqSample, WireSample};
use crate::device::SampleSink;

struct PipelineState {
    converter: RateConverter,
    codec: SampleCodec,
    scratch: Vec<WireSample>,
}

/// Shared producer/consumer endpoint around a [`SampleBuffer`](super::SampleBuffer)
pub struct SamplePipeline {
    state: Mutex<PipelineState>,
    buffer: SharedSampleBuffer,
    receiver_active: AtomicBool,
    ready: Notify,
    chunk_samples: usize,
    samples_in: AtomicU64,
    samples_out: AtomicU64,
}

impl SamplePipeline {
    pub fn new(buffer: SharedSampleBuffer, bit_depth: u8, chunk_samples: usize) -> Self {
        Self {
            state: Mutex::new(PipelineState {
                converter: RateConverter::Passthrough,
                codec: SampleCodec::new(bit_depth),
                scratch: Vec::with_capacity(chunk_samples),
            }),
            buffer,
            receiver_active: AtomicBool::new(false),
            ready: Notify::new(),
            chunk_samples: chunk_samples.max(1),
            samples_in: AtomicU64::new(0),
            samples_out: AtomicU64::new(0),
        }
    }

    pub fn shared(buffer: SharedSampleBuffer, bit_depth: u8, chunk_samples: usize) -> Arc<Self> {
        Arc::new(Self::new(buffer, bit_depth, chunk_samples))
    }

    pub fn buffer(&self) -> &SharedSampleBuffer {
        &self.buffer
    }

    /// Whether the receiver is currently streaming. Only the hardware worker
    /// changes this.
    pub fn is_active(&self) -> bool {
        self.receiver_active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.receiver_active.store(active, Ordering::Release);
    }

    /// Replace the rate converter. Buffered converter state is discarded.
    pub fn set_converter(&self, converter: RateConverter) {
        let mut state = self.state.lock();
        state.converter = converter;
    }

    pub fn set_codec(&self, codec: SampleCodec) {
        self.state.lock().codec = codec;
    }

    pub fn bit_depth(&self) -> u8 {
        self.state.lock().codec.bit_depth()
    }

    pub fn converter_is_passthrough(&self) -> bool {
        self.state.lock().converter.is_passthrough()
    }

    /// Convert and buffer one batch of hardware samples.
    ///
    /// The active flag is read under the lock, so a batch that waited out a
    /// stop and its flush is dropped rather than stored.
    pub fn push_samples(&self, samples: &[IqSample]) {
        let stored = {
            let mut state = self.state.lock();
            if !self.is_active() {
                return;
            }
            let PipelineState {
                converter,
                codec,
                scratch,
            } = &mut *state;
            scratch.clear();
            for sample in samples {
                if let Some(converted) = converter.process(*sample) {
                    scratch.push(codec.encode(converted));
                }
            }
            self.buffer.put(scratch)
        };

        self.samples_in.fetch_add(samples.len() as u64, Ordering::Relaxed);
        self.samples_out.fetch_add(stored as u64, Ordering::Relaxed);

        if self.buffer.available() >= self.chunk_samples {
            self.ready.notify_one();
        }
    }

    /// Discard all buffered samples
    pub fn flush(&self) -> usize {
        let _state = self.state.lock();
        self.buffer.flush()
    }

    /// Take exactly one chunk if at least that many samples are buffered
    pub fn drain_chunk(&self, out: &mut Vec<WireSample>) -> bool {
        let _state = self.state.lock();
        if self.buffer.available() < self.chunk_samples {
            return false;
        }
        out.clear();
        out.resize(self.chunk_samples, WireSample::new(0, 0));
        let taken = self.buffer.get(out);
        out.truncate(taken);
        true
    }

    pub fn chunk_samples(&self) -> usize {
        self.chunk_samples
    }

    /// Resolves after a push leaves at least one chunk buffered
    pub async fn chunk_ready(&self) {
        self.ready.notified().await
    }

    pub fn samples_in(&self) -> u64 {
        self.samples_in.load(Ordering::Relaxed)
    }

    /// Wire samples stored in the buffer since creation
    pub fn samples_buffered(&self) -> u64 {
        self.samples_out.load(Ordering::Relaxed)
    }
}

impl SampleSink for SamplePipeline {
    fn on_samples(&self, samples: &[IqSample], reset: bool) {
        if reset {
            return;
        }
        self.push_samples(samples);
    }
}
