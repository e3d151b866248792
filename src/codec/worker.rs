//! Threaded Opus decode capability
//!
//! Each backend owns one decoder thread fed by a FIFO job channel. Jobs are
//! handled strictly in arrival order, so outputs come back in submission
//! order. A flush is a job like any other: its acknowledgement is sent only
//! after every earlier decode has been emitted.

use crossbeam_channel::{bounded, unbounded, Sender};
use std::thread::{self, JoinHandle};

use crate::codec::decoder::OpusDecoder;
use crate::codec::header::OpusHead;
use crate::codec::pipeline::{DecodeBackend, DecodeOutput, DecoderFactory, EncodedChunk};
use crate::constants::{TARGET_CHANNELS, TARGET_SAMPLE_RATE};
use crate::error::CodecError;

enum Job {
    Configure(Box<OpusDecoder>),
    Decode(EncodedChunk),
    Flush(Sender<()>),
}

/// Creates [`OpusWorker`] backends
#[derive(Debug, Clone, Default)]
pub struct OpusWorkerFactory;

impl DecoderFactory for OpusWorkerFactory {
    type Backend = OpusWorker;

    fn create(&self, outputs: Sender<DecodeOutput>) -> Result<OpusWorker, CodecError> {
        // A decoder that cannot be built for the reference stream means
        // libopus is unusable here
        OpusDecoder::new(TARGET_SAMPLE_RATE, TARGET_CHANNELS)
            .map_err(|e| CodecError::UnsupportedPlatform(e.to_string()))?;
        OpusWorker::spawn(outputs)
    }
}

/// Opus decoding on a dedicated thread
pub struct OpusWorker {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl OpusWorker {
    pub fn spawn(outputs: Sender<DecodeOutput>) -> Result<Self, CodecError> {
        let (jobs_tx, jobs_rx) = unbounded::<Job>();

        let handle = thread::Builder::new()
            .name("opus-decode".to_string())
            .spawn(move || {
                let mut decoder: Option<Box<OpusDecoder>> = None;

                for job in jobs_rx.iter() {
                    match job {
                        Job::Configure(fresh) => decoder = Some(fresh),
                        Job::Decode(chunk) => {
                            let result = match decoder.as_mut() {
                                Some(decoder) => decoder.decode(&chunk.data),
                                None => Err(CodecError::DecoderInit(
                                    "decoder used before configure".into(),
                                )),
                            };
                            if outputs.send(DecodeOutput::for_chunk(&chunk, result)).is_err() {
                                break;
                            }
                        }
                        Job::Flush(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            })
            .map_err(|e| CodecError::UnsupportedPlatform(e.to_string()))?;

        Ok(Self {
            jobs: Some(jobs_tx),
            handle: Some(handle),
        })
    }

    fn send(&self, job: Job) -> Result<(), CodecError> {
        self.jobs
            .as_ref()
            .ok_or(CodecError::Closed)?
            .send(job)
            .map_err(|_| CodecError::Closed)
    }
}

impl DecodeBackend for OpusWorker {
    fn configure(&mut self, head: &OpusHead) -> Result<(), CodecError> {
        let decoder = OpusDecoder::from_head(head)?;
        self.send(Job::Configure(Box::new(decoder)))
    }

    fn submit(&mut self, chunk: EncodedChunk) -> Result<(), CodecError> {
        self.send(Job::Decode(chunk))
    }

    fn flush(&mut self) -> Result<(), CodecError> {
        let (ack_tx, ack_rx) = bounded(1);
        self.send(Job::Flush(ack_tx))?;
        ack_rx.recv().map_err(|_| CodecError::Closed)
    }

    fn close(&mut self) {
        // Dropping the sender ends the job loop once queued work is done
        self.jobs = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OpusWorker {
    fn drop(&mut self) {
        self.close();
    }
}
