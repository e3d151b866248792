//! Binary wire frames carrying downlink Opus packets
//!
//! ```text
//!  0      2      3      4          8                16          20
//!  ┌──────┬──────┬──────┬──────────┬────────────────┬───────────┬─────────────┐
//!  │magic │flags │ rsvd │ sequence │    reserved    │payload len│  payload    │
//!  │A1 51 │      │      │  u32 LE  │    8 bytes     │  u32 LE   │ len bytes   │
//!  └──────┴──────┴──────┴──────────┴────────────────┴───────────┴─────────────┘
//! ```
//!
//! Flag bit 0 marks the last frame of an utterance. A zero-length payload is
//! a separate end-of-decode-unit signal and may appear with or without it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

pub const WIRE_MAGIC: [u8; 2] = [0xA1, 0x51];
pub const WIRE_HEADER_LEN: usize = 20;

pub const FLAG_FINAL: u8 = 0x01;

const FLAGS_OFFSET: usize = 2;
const SEQUENCE_OFFSET: usize = 4;
const PAYLOAD_LEN_OFFSET: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub is_final: bool,
    pub sequence: u32,
    pub payload: Bytes,
}

impl WireFrame {
    pub fn new(sequence: u32, payload: Bytes, is_final: bool) -> Self {
        Self {
            is_final,
            sequence,
            payload,
        }
    }

    /// Empty-payload frame ending the current decode unit
    pub fn end_of_unit(sequence: u32, is_final: bool) -> Self {
        Self::new(sequence, Bytes::new(), is_final)
    }

    pub fn is_end_of_unit(&self) -> bool {
        self.payload.is_empty()
    }

    /// Parse a frame. Bytes past the announced payload are ignored.
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < WIRE_HEADER_LEN {
            return Err(ProtocolError::Malformed(format!(
                "header needs {} bytes, got {}",
                WIRE_HEADER_LEN,
                buf.len()
            )));
        }
        if buf[0..2] != WIRE_MAGIC {
            return Err(ProtocolError::Malformed(format!(
                "bad magic {:02X} {:02X}",
                buf[0], buf[1]
            )));
        }

        let flags = buf[FLAGS_OFFSET];
        let sequence = read_u32_le(buf, SEQUENCE_OFFSET);
        let payload_len = read_u32_le(buf, PAYLOAD_LEN_OFFSET) as usize;

        let needed = WIRE_HEADER_LEN.saturating_add(payload_len);
        if buf.len() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                actual: buf.len(),
            });
        }

        Ok(Self {
            is_final: flags & FLAG_FINAL != 0,
            sequence,
            payload: Bytes::copy_from_slice(&buf[WIRE_HEADER_LEN..needed]),
        })
    }

    /// Serialize with zeroed reserved fields
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(WIRE_HEADER_LEN + self.payload.len());
        out.put_slice(&WIRE_MAGIC);
        out.put_u8(if self.is_final { FLAG_FINAL } else { 0 });
        out.put_u8(0);
        out.put_u32_le(self.sequence);
        out.put_bytes(0, 8);
        out.put_u32_le(self.payload.len() as u32);
        out.put_slice(&self.payload);
        out.freeze()
    }
}

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}
