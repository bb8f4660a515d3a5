//! Wire Codecs
//!
//! How a channel's messages map onto bytes on the socket.
//!
//! - `Raw`: every read is handed over as-is; no message boundaries.
//! - `Framed`: length-prefixed frames with a CRC32 checksum, used by the
//!   messaging transport and optionally by the event-loop transport.
//!
//! # Frame Format
//!
//! ```text
//! +----------------+----------------+------------------------------------------+
//! | Length (4)     | Checksum (4)   | Payload (variable)                       |
//! | big-endian u32 | CRC32          | opaque bytes                             |
//! +----------------+----------------+------------------------------------------+
//! ```
//!
//! The Length field contains the size of the payload only.
//! The Checksum is the CRC32 hash of the payload.

use serde::{Deserialize, Serialize};

use crate::error::{EndpointError, Result};

/// Maximum frame payload size (10 MB)
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Frame header size: 4 bytes length + 4 bytes checksum
const HEADER_SIZE: usize = 8;

#[inline]
fn compute_checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Message boundary strategy for a channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Codec {
    /// Bytes pass through untouched
    #[default]
    Raw,
    /// Length-prefixed, checksummed frames
    Framed,
}

impl Codec {
    /// Encode one outbound message
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::Frame` if a framed payload exceeds `MAX_FRAME_SIZE`.
    pub fn encode(self, payload: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Raw => Ok(payload.to_vec()),
            Self::Framed => encode_frame(payload),
        }
    }

    /// Create a decoder for one inbound byte stream
    #[must_use]
    pub fn decoder(self) -> Decoder {
        Decoder {
            codec: self,
            frames: FrameDecoder::new(),
            pending: Vec::new(),
        }
    }
}

/// Encode a payload to a length-prefixed frame with CRC32 checksum
///
/// # Errors
///
/// Returns `EndpointError::Frame` if the payload exceeds `MAX_FRAME_SIZE`.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(EndpointError::Frame(format!(
            "Frame too large: {} bytes (max: {})",
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }

    let len = payload.len() as u32;
    let checksum = compute_checksum(payload);

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&checksum.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Stateful decoder for one inbound stream
#[derive(Debug)]
pub struct Decoder {
    codec: Codec,
    frames: FrameDecoder,
    pending: Vec<u8>,
}

impl Decoder {
    /// Append bytes read from the socket
    pub fn push(&mut self, data: &[u8]) {
        match self.codec {
            Codec::Raw => self.pending.extend_from_slice(data),
            Codec::Framed => self.frames.push(data),
        }
    }

    /// Next complete message, or `None` if more bytes are needed
    ///
    /// # Errors
    ///
    /// Returns a frame error or checksum mismatch for corrupt framed input.
    pub fn next_message(&mut self) -> Result<Option<Vec<u8>>> {
        match self.codec {
            Codec::Raw if self.pending.is_empty() => Ok(None),
            Codec::Raw => Ok(Some(std::mem::take(&mut self.pending))),
            Codec::Framed => self.frames.decode(),
        }
    }
}

/// Decoder state machine for streaming frame parsing
///
/// Buffers incoming bytes and yields complete payloads.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact once most of the buffer has been consumed
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Number of unconsumed bytes
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Try to decode the next frame
    ///
    /// Returns:
    /// - `Ok(Some(payload))` if a complete frame was decoded
    /// - `Ok(None)` if more data is needed
    /// - `Err(EndpointError::ChecksumMismatch)` if checksum verification fails
    /// - `Err(EndpointError::Frame)` if the declared length is too large
    pub fn decode(&mut self) -> Result<Option<Vec<u8>>> {
        let available = self.available();

        if available < HEADER_SIZE {
            return Ok(None);
        }

        let header = &self.buffer[self.read_pos..self.read_pos + HEADER_SIZE];
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_checksum = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        if len > MAX_FRAME_SIZE {
            return Err(EndpointError::Frame(format!(
                "Frame size {len} exceeds maximum {MAX_FRAME_SIZE}"
            )));
        }

        if available < HEADER_SIZE + len {
            return Ok(None);
        }

        let payload_start = self.read_pos + HEADER_SIZE;
        let payload_end = payload_start + len;
        let payload = &self.buffer[payload_start..payload_end];

        let actual_checksum = compute_checksum(payload);
        if actual_checksum != expected_checksum {
            return Err(EndpointError::ChecksumMismatch {
                expected: expected_checksum,
                actual: actual_checksum,
            });
        }

        let payload = payload.to_vec();
        self.read_pos = payload_end;
        Ok(Some(payload))
    }
}
