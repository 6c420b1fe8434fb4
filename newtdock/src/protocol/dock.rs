//! Dock link-layer frame types and Dock command messages.
//!
//! ## Payload Layout
//!
//! Offsets below are into the decoded payload, i.e. after the SYN DLE STX
//! preamble has been stripped and stuffed DLE bytes collapsed.
//!
//! ```text
//! +-----+------+-----+--------+--------+---------+-----------+--------+
//! | Len | Type | Seq | "newt" | "dock" | Command | Length BE |  Data  |
//! +-----+------+-----+--------+--------+---------+-----------+--------+
//! |  0  |  1   |  2  |  3..7  |  7..11 |  11..15 |   15..19  |  19..  |
//! +-----+------+-----+--------+--------+---------+-----------+--------+
//! ```
//!
//! Only link-transfer frames carry the Dock namespace and command fields.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// Offset of the header length byte.
pub const HEADER_LEN_OFFSET: usize = 0;
/// Offset of the layer type byte.
pub const TYPE_OFFSET: usize = 1;
/// Offset of the sequence number.
pub const SEQ_OFFSET: usize = 2;
/// Offset of the "newt" "dock" namespace.
pub const NAMESPACE_OFFSET: usize = 3;
/// Offset of the 4-character command code.
pub const COMMAND_OFFSET: usize = 11;
/// Offset of the big-endian length/value field.
pub const LENGTH_OFFSET: usize = 15;
/// Offset of the command data.
pub const DATA_OFFSET: usize = 19;

/// Namespace every Dock command is tagged with.
pub const DOCK_NAMESPACE: [u8; 8] = *b"newtdock";

/// Reply to a link request declaring the supported link parameters.
pub const LINK_REQUEST_REPLY: [u8; 24] = [
    23, 1, 2, 1, 6, 1, 0, 0, 0, 0, 255, 2, 1, 2, 3, 1, 1, 4, 2, 64, 0, 8, 1, 3,
];

/// Link-layer frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Link request, the peer opening a session (LR).
    LinkRequest = 1,
    /// Peer tearing the link down (LD).
    LinkDisconnect = 2,
    /// Data or Dock command transfer (LT).
    LinkTransfer = 4,
    /// Acknowledgment of a transfer frame (LA).
    LinkAck = 5,
    /// Link attention (LN).
    LinkAttention = 6,
    /// Link attention acknowledgment (LNA).
    LinkAttentionAck = 7,
}

impl TryFrom<u8> for FrameType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::LinkRequest),
            2 => Ok(Self::LinkDisconnect),
            4 => Ok(Self::LinkTransfer),
            5 => Ok(Self::LinkAck),
            6 => Ok(Self::LinkAttention),
            7 => Ok(Self::LinkAttentionAck),
            other => Err(Error::UnknownFrameType(other)),
        }
    }
}

/// Dock command codes understood or produced by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockCommand {
    /// Peer asks to dock (`rtdk`).
    RequestToDock,
    /// Session type declaration (`dock`).
    Dock,
    /// Peer name announcement (`name`).
    Name,
    /// Keepalive interval (`stim`).
    SetTimeout,
    /// Result of the previous request (`dres`).
    Result,
    /// Package load announcement (`lpkg`).
    LoadPackage,
    /// Disconnect request (`disc`).
    Disconnect,
    /// Any other command code.
    Other([u8; 4]),
}

impl DockCommand {
    /// Parse a 4-character command code.
    pub fn from_code(code: [u8; 4]) -> Self {
        match &code {
            b"rtdk" => Self::RequestToDock,
            b"dock" => Self::Dock,
            b"name" => Self::Name,
            b"stim" => Self::SetTimeout,
            b"dres" => Self::Result,
            b"lpkg" => Self::LoadPackage,
            b"disc" => Self::Disconnect,
            _ => Self::Other(code),
        }
    }

    /// The 4-character wire code.
    pub fn code(self) -> [u8; 4] {
        match self {
            Self::RequestToDock => *b"rtdk",
            Self::Dock => *b"dock",
            Self::Name => *b"name",
            Self::SetTimeout => *b"stim",
            Self::Result => *b"dres",
            Self::LoadPackage => *b"lpkg",
            Self::Disconnect => *b"disc",
            Self::Other(code) => code,
        }
    }
}

impl std::fmt::Display for DockCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.code() {
            if b.is_ascii_graphic() {
                write!(f, "{}", char::from(b))?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

/// A decoded inbound frame, classified by layer type.
#[derive(Debug, Clone)]
pub struct LinkFrame {
    kind: FrameType,
    payload: Vec<u8>,
}

impl LinkFrame {
    /// Classify a decoded payload.
    pub fn parse(payload: Vec<u8>) -> Result<Self> {
        let type_byte = *payload.get(TYPE_OFFSET).ok_or_else(|| {
            Error::MalformedFrame(format!("payload too short: {} bytes", payload.len()))
        })?;
        let kind = FrameType::try_from(type_byte)?;
        Ok(Self { kind, payload })
    }

    /// Layer type.
    pub fn kind(&self) -> FrameType {
        self.kind
    }

    /// Sequence number, zero when the frame is too short to carry one.
    pub fn seq(&self) -> u8 {
        self.payload.get(SEQ_OFFSET).copied().unwrap_or(0)
    }

    /// Raw decoded payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Interpret a link-transfer frame as a Dock command.
    ///
    /// Returns `None` for other layer types and for transfers outside the
    /// "newt" "dock" namespace.
    pub fn dock_request(&self) -> Option<DockRequest<'_>> {
        if self.kind != FrameType::LinkTransfer {
            return None;
        }
        DockRequest::parse(&self.payload)
    }
}

/// A Dock command carried by a link-transfer frame.
#[derive(Debug, Clone, Copy)]
pub struct DockRequest<'a> {
    /// Sequence number of the carrying frame.
    pub seq: u8,
    /// Command code.
    pub command: DockCommand,
    /// Length/value field, zero if absent.
    pub length: u32,
    /// Bytes following the length field.
    pub data: &'a [u8],
}

impl<'a> DockRequest<'a> {
    /// Parse a link-transfer payload.
    pub fn parse(payload: &'a [u8]) -> Option<Self> {
        let namespace = payload.get(NAMESPACE_OFFSET..COMMAND_OFFSET)?;
        if namespace != DOCK_NAMESPACE {
            return None;
        }

        let code: [u8; 4] = payload.get(COMMAND_OFFSET..LENGTH_OFFSET)?.try_into().ok()?;
        let length = payload
            .get(LENGTH_OFFSET..DATA_OFFSET)
            .map_or(0, BigEndian::read_u32);
        let data = payload.get(DATA_OFFSET..).unwrap_or_default();

        Some(Self {
            seq: payload[SEQ_OFFSET],
            command: DockCommand::from_code(code),
            length,
            data,
        })
    }

    /// First data word, read big-endian.
    ///
    /// `dres` carries its error code here.
    pub fn first_word(&self) -> Option<u32> {
        self.data.get(..4).map(BigEndian::read_u32)
    }
}

/// Build an acknowledgment payload for `seq`.
pub fn ack_payload(seq: u8) -> Vec<u8> {
    vec![0x03, FrameType::LinkAck as u8, seq, 0x01]
}

/// Build a data payload carrying one package chunk.
pub fn data_payload(seq: u8, chunk: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(3 + chunk.len());
    payload.push(0x02);
    payload.push(FrameType::LinkTransfer as u8);
    payload.push(seq);
    payload.extend_from_slice(chunk);
    payload
}

/// Dock command reply builder.
#[derive(Debug)]
pub struct DockMessage {
    command: DockCommand,
    seq: u8,
    length: u32,
    data: Vec<u8>,
}

impl DockMessage {
    /// Reply whose length field is the length of `data`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_data(command: DockCommand, seq: u8, data: &[u8]) -> Self {
        Self {
            command,
            seq,
            length: data.len() as u32,
            data: data.to_vec(),
        }
    }

    /// Reply that carries `value` in the length field and no data.
    pub fn with_value(command: DockCommand, seq: u8, value: u32) -> Self {
        Self {
            command,
            seq,
            length: value,
            data: Vec::new(),
        }
    }

    /// Reply with a 4-byte big-endian data word.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn with_word(command: DockCommand, seq: u8, word: u32) -> Self {
        let mut data = Vec::with_capacity(4);
        data.write_u32::<BigEndian>(word).unwrap();
        Self::with_data(command, seq, &data)
    }

    /// `disc` reply.
    pub fn disconnect(seq: u8) -> Self {
        Self::with_value(DockCommand::Disconnect, seq, 0)
    }

    /// Command code.
    pub fn command(&self) -> DockCommand {
        self.command
    }

    /// Build the unframed payload.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DATA_OFFSET + self.data.len());
        buf.push(0x02);
        buf.push(FrameType::LinkTransfer as u8);
        buf.push(self.seq);
        buf.extend_from_slice(&DOCK_NAMESPACE);
        buf.extend_from_slice(&self.command.code());
        buf.write_u32::<BigEndian>(self.length).unwrap();
        buf.extend_from_slice(&self.data);
        buf
    }
}
