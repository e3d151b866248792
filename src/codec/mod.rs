//! Opus codec layer
//!
//! Decoding of the downlink stream: the `OpusHead` identification header,
//! a synchronous decoder wrapper, a threaded decode capability with ordered
//! outputs, and the epoch-tagged pipeline in front of it. The encoder is
//! used to produce downlink packets for local loopback.

pub mod decoder;
pub mod encoder;
pub mod header;
pub mod pipeline;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use decoder::OpusDecoder;
pub use encoder::OpusEncoder;
pub use header::OpusHead;
pub use pipeline::{DecodeBackend, DecodeOutput, DecodePipeline, DecoderFactory, EncodedChunk};
pub use worker::{OpusWorker, OpusWorkerFactory};
