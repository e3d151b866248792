//! Wire formats: binary downlink frames and JSON envelopes

pub mod messages;
pub mod wire;

pub use messages::{InboundMessage, OutboundMessage};
pub use wire::{WireFrame, WIRE_HEADER_LEN, WIRE_MAGIC};
