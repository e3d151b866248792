//! In-memory decode backend for deterministic tests

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::audio::types::DecodedBuffer;
use crate::codec::header::OpusHead;
use crate::codec::pipeline::{DecodeBackend, DecodeOutput, DecoderFactory, EncodedChunk};
use crate::error::CodecError;

/// Payloads starting with this byte fail to decode
pub const FAIL_BYTE: u8 = 0xEE;

/// Samples per decoded chunk: 20 ms at 24 kHz
pub const CHUNK_FRAMES: usize = 480;

#[derive(Default)]
struct ScriptState {
    unsupported: bool,
    /// Hold outputs until flushed or released instead of emitting on submit
    deferred: bool,
    pending: Vec<(Sender<DecodeOutput>, DecodeOutput)>,
    created: usize,
    configured: Vec<OpusHead>,
    closed: usize,
    flushed: usize,
    submitted: Vec<(u64, u32, i64)>,
}

/// Factory whose backends turn payload byte 0 into a constant mono chunk
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsupported() -> Self {
        let factory = Self::default();
        factory.state.lock().unsupported = true;
        factory
    }

    pub fn deferred() -> Self {
        let factory = Self::default();
        factory.state.lock().deferred = true;
        factory
    }

    /// Emit every held output, as late decoder callbacks would
    pub fn release_pending(&self) {
        let pending = std::mem::take(&mut self.state.lock().pending);
        for (tx, output) in pending {
            let _ = tx.send(output);
        }
    }

    pub fn created(&self) -> usize {
        self.state.lock().created
    }

    pub fn configured(&self) -> Vec<OpusHead> {
        self.state.lock().configured.clone()
    }

    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    pub fn flushed(&self) -> usize {
        self.state.lock().flushed
    }

    /// `(epoch, sequence, timestamp_us)` of every submission
    pub fn submitted(&self) -> Vec<(u64, u32, i64)> {
        self.state.lock().submitted.clone()
    }

    pub fn submitted_sequences(&self) -> Vec<u32> {
        self.state.lock().submitted.iter().map(|s| s.1).collect()
    }
}

/// Decoded chunk whose samples all equal `value`
pub fn chunk_of(value: u8) -> DecodedBuffer {
    DecodedBuffer::mono(vec![value as f32 / 255.0; CHUNK_FRAMES], 24_000)
}

pub struct ScriptedBackend {
    state: Arc<Mutex<ScriptState>>,
    outputs: Sender<DecodeOutput>,
    open: bool,
}

impl DecoderFactory for ScriptedFactory {
    type Backend = ScriptedBackend;

    fn create(&self, outputs: Sender<DecodeOutput>) -> Result<ScriptedBackend, CodecError> {
        let mut state = self.state.lock();
        if state.unsupported {
            return Err(CodecError::UnsupportedPlatform("no decoder in test".into()));
        }
        state.created += 1;
        Ok(ScriptedBackend {
            state: self.state.clone(),
            outputs,
            open: true,
        })
    }
}

impl DecodeBackend for ScriptedBackend {
    fn configure(&mut self, head: &OpusHead) -> Result<(), CodecError> {
        if !self.open {
            return Err(CodecError::Closed);
        }
        self.state.lock().configured.push(*head);
        Ok(())
    }

    fn submit(&mut self, chunk: EncodedChunk) -> Result<(), CodecError> {
        if !self.open {
            return Err(CodecError::Closed);
        }
        let result = match chunk.data.first() {
            Some(&FAIL_BYTE) => Err(CodecError::DecodingFailed("scripted failure".into())),
            Some(&value) => Ok(chunk_of(value)),
            None => Ok(chunk_of(0)),
        };
        let output = DecodeOutput::for_chunk(&chunk, result);

        let mut state = self.state.lock();
        state
            .submitted
            .push((chunk.epoch, chunk.sequence, chunk.timestamp_us));
        if state.deferred {
            state.pending.push((self.outputs.clone(), output));
        } else {
            let _ = self.outputs.send(output);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CodecError> {
        if !self.open {
            return Err(CodecError::Closed);
        }
        let pending = {
            let mut state = self.state.lock();
            state.flushed += 1;
            std::mem::take(&mut state.pending)
        };
        for (tx, output) in pending {
            let _ = tx.send(output);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.state.lock().closed += 1;
        }
    }
}
