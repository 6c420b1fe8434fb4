//! Byte-at-a-time frame reassembly.
//!
//! Bytes arrive from the serial line one by one. The reassembler only starts
//! accumulating once it sees the SYN DLE STX preamble, which makes it recover
//! on its own from line noise or a partially received frame.

use crate::error::{Error, Result};
use crate::protocol::frame::{self, DLE, FrameScan, STX, SYN};
use log::{trace, warn};

/// Initial capacity and growth step of the accumulation buffer.
pub const GROW_INCREMENT: usize = 256;

/// Accumulates a candidate frame from a live byte stream.
///
/// The backing storage only grows. Consuming a frame resets the fill index
/// but keeps the allocation for the next frame.
#[derive(Debug)]
pub struct FrameReassembler {
    buffer: Vec<u8>,
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(GROW_INCREMENT),
        }
    }

    /// Number of bytes accumulated for the current candidate frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no candidate frame is being accumulated.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Allocated capacity of the accumulation buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Bytes accumulated so far.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop the current candidate frame, keeping the allocation.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Accept one byte from the transport.
    ///
    /// Bytes at positions 0..3 must match the preamble. A mismatch resets the
    /// accumulation; if the offending byte is SYN it opens a new candidate.
    pub fn push(&mut self, byte: u8) {
        let expected = match self.buffer.len() {
            0 => Some(SYN),
            1 => Some(DLE),
            2 => Some(STX),
            _ => None,
        };

        if let Some(expected) = expected {
            if byte != expected {
                if !self.buffer.is_empty() {
                    trace!("Preamble broken by 0x{byte:02X}, resynchronizing");
                }
                self.buffer.clear();
                if byte == SYN {
                    self.buffer.push(byte);
                }
                return;
            }
        }

        if self.buffer.len() == self.buffer.capacity() {
            self.buffer.reserve_exact(GROW_INCREMENT);
        }
        self.buffer.push(byte);
    }

    /// Check whether the accumulated bytes form a complete frame.
    pub fn scan(&self) -> FrameScan {
        frame::scan_frame(&self.buffer)
    }

    /// Push a byte and, if it completes a frame, decode and consume it.
    ///
    /// Returns `None` while a frame is still being accumulated. Corrupted
    /// frames are discarded and reported as `Some(Err(_))`.
    pub fn feed(&mut self, byte: u8) -> Option<Result<Vec<u8>>> {
        self.push(byte);

        match self.scan() {
            FrameScan::Incomplete => None,
            FrameScan::Complete(len) => {
                let decoded = frame::decode(&self.buffer[..len]);
                if let Err(e) = &decoded {
                    warn!("Discarding corrupted frame ({len} bytes): {e}");
                }
                self.buffer.clear();
                Some(decoded)
            },
            FrameScan::Malformed => {
                warn!(
                    "Discarding malformed frame after {} bytes",
                    self.buffer.len()
                );
                self.buffer.clear();
                Some(Err(Error::MalformedFrame("invalid escape sequence".into())))
            },
        }
    }
}
