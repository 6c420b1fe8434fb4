//! Bisync link-layer frame codec.
//!
//! ## Frame Format
//!
//! ```text
//! +-----+-----+-----+----------------------+-----+-----+--------+
//! | SYN | DLE | STX | payload (DLE doubled)| DLE | ETX | CRC16  |
//! +-----+-----+-----+----------------------+-----+-----+--------+
//! | 16  | 10  | 02  |       variable       | 10  | 03  | LE u16 |
//! +-----+-----+-----+----------------------+-----+-----+--------+
//! ```
//!
//! The checksum covers the unstuffed payload followed by ETX. The preamble
//! and the stuffed DLE duplicates are not part of it.

use crate::error::{Error, Result};
use crate::protocol::crc::crc16_update;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// Start of sequence.
pub const SYN: u8 = 0x16;
/// Data link escape.
pub const DLE: u8 = 0x10;
/// Start of text.
pub const STX: u8 = 0x02;
/// End of text.
pub const ETX: u8 = 0x03;

/// Bytes every frame starts with.
pub const PREAMBLE: [u8; 3] = [SYN, DLE, STX];

/// Length of the checksum trailer.
pub const CRC_LEN: usize = 2;

/// Preamble, DLE ETX terminator and checksum.
const FRAME_OVERHEAD: usize = PREAMBLE.len() + 2 + CRC_LEN;

/// Result of scanning an accumulating buffer for a frame boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameScan {
    /// More bytes are needed.
    Incomplete,
    /// A full frame occupies the first `n` bytes of the buffer.
    Complete(usize),
    /// The buffer can never become a valid frame.
    Malformed,
}

/// Running checksum over a payload and the ETX terminator.
pub fn checksum(payload: &[u8]) -> u16 {
    let crc = payload.iter().fold(0, |crc, &b| crc16_update(crc, b));
    crc16_update(crc, ETX)
}

/// Append one framed copy of `payload` to `out`.
///
/// Several frames may be appended to the same buffer back to back.
#[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
pub fn encode_into(out: &mut Vec<u8>, payload: &[u8]) {
    let stuffed = payload.iter().filter(|&&b| b == DLE).count();
    out.reserve(payload.len() + stuffed + FRAME_OVERHEAD);

    out.extend_from_slice(&PREAMBLE);
    for &b in payload {
        out.push(b);
        if b == DLE {
            out.push(DLE);
        }
    }
    out.push(DLE);
    out.push(ETX);
    out.write_u16::<LittleEndian>(checksum(payload)).unwrap();
}

/// Encode `payload` into a freshly allocated frame.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(&mut out, payload);
    out
}

/// Check whether `buf` holds a complete frame.
///
/// `buf` is expected to start at the preamble. Byte 3 is the declared header
/// length and sets a lower bound on the frame size. The terminator search
/// honours byte stuffing, so a doubled DLE is never mistaken for the start
/// of DLE ETX.
pub fn scan_frame(buf: &[u8]) -> FrameScan {
    if buf.len() < PREAMBLE.len() + 1 {
        return FrameScan::Incomplete;
    }

    let min_len = FRAME_OVERHEAD + 1 + usize::from(buf[PREAMBLE.len()]);
    if buf.len() < min_len {
        return FrameScan::Incomplete;
    }

    let mut i = PREAMBLE.len();
    while i + 1 < buf.len() {
        if buf[i] != DLE {
            i += 1;
            continue;
        }
        match buf[i + 1] {
            DLE => i += 2,
            ETX => {
                let end = i + 2 + CRC_LEN;
                return if buf.len() >= end {
                    FrameScan::Complete(end)
                } else {
                    FrameScan::Incomplete
                };
            },
            _ => return FrameScan::Malformed,
        }
    }

    FrameScan::Incomplete
}

/// Decode a complete frame into its unstuffed payload.
///
/// Verifies the preamble, the escape sequences and the checksum trailer.
pub fn decode(frame: &[u8]) -> Result<Vec<u8>> {
    if !frame.starts_with(&PREAMBLE) {
        return Err(Error::MalformedFrame("missing SYN DLE STX preamble".into()));
    }

    let mut payload = Vec::with_capacity(frame.len().saturating_sub(FRAME_OVERHEAD));
    let mut i = PREAMBLE.len();
    loop {
        match (frame.get(i), frame.get(i + 1)) {
            (Some(&DLE), Some(&DLE)) => {
                payload.push(DLE);
                i += 2;
            },
            (Some(&DLE), Some(&ETX)) => {
                i += 2;
                break;
            },
            (Some(&DLE), Some(&other)) => {
                return Err(Error::MalformedFrame(format!(
                    "unexpected byte 0x{other:02X} after DLE at offset {i}"
                )));
            },
            (Some(&b), _) if b != DLE => {
                payload.push(b);
                i += 1;
            },
            _ => return Err(Error::MalformedFrame("missing DLE ETX terminator".into())),
        }
    }

    let trailer = frame
        .get(i..i + CRC_LEN)
        .ok_or_else(|| Error::MalformedFrame("truncated checksum".into()))?;
    let expected = LittleEndian::read_u16(trailer);
    let actual = checksum(&payload);
    if expected != actual {
        return Err(Error::CrcMismatch { expected, actual });
    }

    Ok(payload)
}
