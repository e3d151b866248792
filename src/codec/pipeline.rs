//! Epoch-tagged decode pipeline
//!
//! Hands ordered payloads to a [`DecodeBackend`] and hands back its outputs.
//! A backend must emit exactly one [`DecodeOutput`] per submitted chunk, in
//! submission order; the reorder buffer upstream relies on that ordering.
//!
//! Every submission carries the pipeline's current epoch. Starting a new
//! epoch (configure, flush) makes any output still in flight from the old
//! one stale, and [`DecodePipeline::try_next`] discards it.

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::audio::types::DecodedBuffer;
use crate::codec::header::OpusHead;
use crate::error::CodecError;

/// One compressed unit submitted for decoding
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedChunk {
    pub epoch: u64,
    pub sequence: u32,
    /// Presentation timestamp in microseconds
    pub timestamp_us: i64,
    pub data: Bytes,
}

/// Result of decoding one [`EncodedChunk`]
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutput {
    pub epoch: u64,
    pub sequence: u32,
    pub timestamp_us: i64,
    pub result: Result<DecodedBuffer, CodecError>,
}

impl DecodeOutput {
    pub fn for_chunk(chunk: &EncodedChunk, result: Result<DecodedBuffer, CodecError>) -> Self {
        Self {
            epoch: chunk.epoch,
            sequence: chunk.sequence,
            timestamp_us: chunk.timestamp_us,
            result,
        }
    }
}

/// An asynchronous decoder whose outputs preserve submission order
pub trait DecodeBackend {
    /// Apply the identification header; must precede the first `submit`
    fn configure(&mut self, head: &OpusHead) -> Result<(), CodecError>;

    /// Queue a chunk. Its output arrives later on the backend's sink.
    fn submit(&mut self, chunk: EncodedChunk) -> Result<(), CodecError>;

    /// Block until every chunk submitted so far has produced its output
    fn flush(&mut self) -> Result<(), CodecError>;

    /// Release the decoder. Later calls fail with [`CodecError::Closed`].
    fn close(&mut self);
}

/// Creates decode backends wired to an output sink
pub trait DecoderFactory {
    type Backend: DecodeBackend;

    /// Fails with [`CodecError::UnsupportedPlatform`] when decoding is not
    /// available at all
    fn create(&self, outputs: Sender<DecodeOutput>) -> Result<Self::Backend, CodecError>;
}

/// Pass-through from ordered payloads to a backend, plus the epoch filter
pub struct DecodePipeline<F: DecoderFactory> {
    factory: F,
    backend: Option<F::Backend>,
    epoch: u64,
    frame_duration_us: u64,
    outputs_tx: Sender<DecodeOutput>,
    outputs_rx: Receiver<DecodeOutput>,
    stale_discarded: u64,
}

impl<F: DecoderFactory> DecodePipeline<F> {
    /// Create the pipeline and its first backend, failing fast when the
    /// platform cannot decode
    pub fn new(factory: F, frame_duration_us: u64) -> Result<Self, CodecError> {
        let (outputs_tx, outputs_rx) = unbounded();
        let backend = factory.create(outputs_tx.clone())?;

        Ok(Self {
            factory,
            backend: Some(backend),
            epoch: 0,
            frame_duration_us,
            outputs_tx,
            outputs_rx,
            stale_discarded: 0,
        })
    }

    /// Presentation timestamp for `seq`: the hint when given, else
    /// `seq * frame_duration`, truncated to whole microseconds
    pub fn timestamp_for(&self, seq: u32, timestamp_hint: Option<f64>) -> i64 {
        match timestamp_hint {
            Some(hint) => hint.trunc() as i64,
            None => (seq as u64 * self.frame_duration_us) as i64,
        }
    }

    /// Release the current backend and configure a fresh one in a new epoch
    pub fn reconfigure(&mut self, head: &OpusHead) -> Result<(), CodecError> {
        if let Some(mut old) = self.backend.take() {
            old.close();
        }
        self.epoch += 1;

        let mut backend = self.factory.create(self.outputs_tx.clone())?;
        backend.configure(head)?;
        self.backend = Some(backend);
        Ok(())
    }

    /// Submit one payload tagged with the current epoch
    pub fn decode(
        &mut self,
        payload: Bytes,
        seq: u32,
        timestamp_hint: Option<f64>,
    ) -> Result<(), CodecError> {
        let timestamp_us = self.timestamp_for(seq, timestamp_hint);
        let backend = self.backend.as_mut().ok_or(CodecError::Closed)?;
        backend.submit(EncodedChunk {
            epoch: self.epoch,
            sequence: seq,
            timestamp_us,
            data: payload,
        })
    }

    /// Wait for the backend to emit everything submitted so far
    pub fn drain(&mut self) -> Result<(), CodecError> {
        match self.backend.as_mut() {
            Some(backend) => backend.flush(),
            None => Err(CodecError::Closed),
        }
    }

    /// Invalidate everything still in flight without touching the backend
    pub fn advance_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Next output of the current epoch, discarding stale ones on the way
    pub fn try_next(&mut self) -> Option<DecodeOutput> {
        while let Ok(output) = self.outputs_rx.try_recv() {
            if output.epoch == self.epoch {
                return Some(output);
            }
            self.stale_discarded += 1;
            tracing::debug!(
                "Discarding output for seq {} from stale epoch {} (current {})",
                output.sequence,
                output.epoch,
                self.epoch
            );
        }
        None
    }

    /// Release the backend permanently
    pub fn close(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn stale_discarded(&self) -> u64 {
        self.stale_discarded
    }
}

impl<F: DecoderFactory> Drop for DecodePipeline<F> {
    fn drop(&mut self) {
        self.close();
    }
}
