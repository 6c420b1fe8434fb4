//! Dock session state machine.
//!
//! A [`DockSession`] consumes the raw bytes received over the serial link,
//! answers the peer's link and Dock requests, and streams an attached package
//! in 256-byte chunks once the peer asks for it.
//!
//! ## Install Exchange
//!
//! ```text
//! peer                                session
//!  | LR                                   |
//!  |------------------------------------->|  on_connected
//!  |                 LR reply (constant)  |
//!  |<-------------------------------------|
//!  | LT rtdk / name                       |
//!  |------------------------------------->|
//!  |                LA, LT dock / stim    |
//!  |<-------------------------------------|
//!  | LT dres (0)                          |
//!  |------------------------------------->|  transfer armed
//!  |                 LA, LT lpkg <size>   |
//!  |<-------------------------------------|
//!  | LA n                                 |
//!  |------------------------------------->|  on_install_progress
//!  |                 LA, LT chunk n+1     |
//!  |<-------------------------------------|
//!  |           ... until exhausted ...    |
//!  | LT dres (0)                          |
//!  |------------------------------------->|  package detached
//!  |                 LA, LT disc          |
//!  |<-------------------------------------|
//!  | LD                                   |
//!  |------------------------------------->|  on_disconnected
//! ```
//!
//! Every call runs to completion; the session never blocks except on reads
//! from the attached package.

use crate::error::Result;
use crate::package::{PackageRead, PackageSource};
use crate::protocol::dock::{
    self, DockCommand, DockMessage, DockRequest, FrameType, LINK_REQUEST_REPLY, LinkFrame,
};
use crate::protocol::frame;
use crate::protocol::reassembler::FrameReassembler;
use log::{debug, error, info, trace, warn};
use std::path::Path;

/// Session type announced in reply to `rtdk`: package install.
pub const SESSION_TYPE_LOAD_PACKAGE: u32 = 4;

/// Keepalive interval announced in reply to `name`, in seconds.
pub const DEFAULT_KEEPALIVE_SECS: u32 = 30;

/// Lifecycle notifications raised while bytes are processed.
///
/// All methods default to doing nothing.
pub trait DockEvents {
    /// The peer sent a link request.
    fn on_connected(&mut self) {}

    /// The peer tore the link down.
    fn on_disconnected(&mut self) {}

    /// A chunk was sent; `fraction` runs from 0.0 to 1.0.
    fn on_install_progress(&mut self, _fraction: f64) {}
}

impl DockEvents for () {}

impl<T: DockEvents + ?Sized> DockEvents for &mut T {
    fn on_connected(&mut self) {
        (**self).on_connected();
    }

    fn on_disconnected(&mut self) {
        (**self).on_disconnected();
    }

    fn on_install_progress(&mut self, fraction: f64) {
        (**self).on_install_progress(fraction);
    }
}

/// Values the session announces to the peer.
#[derive(Debug, Clone)]
pub struct DockConfig {
    /// Session type sent with the `dock` reply.
    pub session_type: u32,
    /// Keepalive interval sent with the `stim` reply.
    pub keepalive_secs: u32,
}

impl Default for DockConfig {
    fn default() -> Self {
        Self {
            session_type: SESSION_TYPE_LOAD_PACKAGE,
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
        }
    }
}

/// Link lifecycle as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No link request received yet.
    Waiting,
    /// Link request received.
    Connected,
    /// Peer sent a link disconnect.
    Disconnected,
}

/// Package transfer progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Idle,
    /// Sequence number of the last frame sent for this transfer.
    Active(u8),
}

/// Device-side Dock protocol engine.
pub struct DockSession<E: DockEvents = ()> {
    reassembler: FrameReassembler,
    output: Vec<u8>,
    package: Option<PackageSource>,
    transfer: Transfer,
    link: LinkState,
    config: DockConfig,
    events: E,
}

impl Default for DockSession<()> {
    fn default() -> Self {
        Self::new(())
    }
}

impl<E: DockEvents> DockSession<E> {
    /// Create a session reporting to `events`.
    pub fn new(events: E) -> Self {
        Self::with_config(events, DockConfig::default())
    }

    /// Create a session with custom announced values.
    pub fn with_config(events: E, config: DockConfig) -> Self {
        Self {
            reassembler: FrameReassembler::new(),
            output: Vec::new(),
            package: None,
            transfer: Transfer::Idle,
            link: LinkState::Waiting,
            config,
            events,
        }
    }

    /// Event handler.
    pub fn events(&self) -> &E {
        &self.events
    }

    /// Mutable event handler.
    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    /// Consume the session, returning its event handler.
    pub fn into_events(self) -> E {
        self.events
    }

    /// Current link lifecycle state.
    pub fn link_state(&self) -> LinkState {
        self.link
    }

    /// Sequence number of the last chunk sent, `None` when no transfer runs.
    pub fn transfer_sequence(&self) -> Option<u8> {
        match self.transfer {
            Transfer::Idle => None,
            Transfer::Active(seq) => Some(seq),
        }
    }

    /// Whether a package is attached.
    pub fn has_package(&self) -> bool {
        self.package.is_some()
    }

    /// Size of the attached package.
    pub fn package_size(&self) -> Option<u32> {
        self.package.as_ref().map(PackageSource::size)
    }

    /// Bytes waiting to be drained.
    pub fn pending_output(&self) -> &[u8] {
        &self.output
    }

    /// Take every frame produced since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Attach the package at `path`, replacing any attached one.
    ///
    /// On failure no package is attached.
    pub fn attach_package<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.close_package();
        let source = PackageSource::open(path)?;
        self.install(source);
        Ok(())
    }

    /// Attach an already open package source, replacing any attached one.
    pub fn attach_source<R: PackageRead + 'static>(&mut self, reader: R) -> Result<()> {
        self.close_package();
        let source = PackageSource::from_reader(reader)?;
        self.install(source);
        Ok(())
    }

    fn install(&mut self, source: PackageSource) {
        info!("Package attached ({} bytes)", source.size());
        self.package = Some(source);
    }

    /// Detach the package, abandoning any transfer.
    pub fn close_package(&mut self) {
        if self.package.take().is_some() {
            debug!("Package detached");
        }
        self.transfer = Transfer::Idle;
    }

    /// Restart the attached package from offset 0, abandoning any transfer.
    pub fn rewind_package(&mut self) {
        let Some(package) = self.package.as_mut() else {
            return;
        };
        match package.rewind() {
            Ok(()) => self.transfer = Transfer::Idle,
            Err(e) => {
                error!("Failed to rewind package: {e}");
                self.close_package();
            },
        }
    }

    /// Drop any partially received frame and any undrained output.
    pub fn reset(&mut self) {
        self.reassembler.clear();
        self.output.clear();
    }

    /// Feed a run of bytes in transport order.
    pub fn receive(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.receive_byte(b);
        }
    }

    /// Feed one byte from the transport.
    ///
    /// Completing a frame dispatches it, which may fire callbacks and queue
    /// outgoing frames.
    pub fn receive_byte(&mut self, byte: u8) {
        match self.reassembler.feed(byte) {
            None => {},
            Some(Ok(payload)) => self.dispatch(payload),
            Some(Err(e)) => debug!("Frame dropped: {e}"),
        }
    }

    fn push_frame(&mut self, payload: &[u8]) {
        trace!("TX payload: {payload:02X?}");
        frame::encode_into(&mut self.output, payload);
    }

    fn dispatch(&mut self, payload: Vec<u8>) {
        trace!("RX payload: {payload:02X?}");

        let frame = match LinkFrame::parse(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Ignoring frame: {e}");
                return;
            },
        };

        match frame.kind() {
            FrameType::LinkRequest => self.handle_link_request(),
            FrameType::LinkTransfer => match frame.dock_request() {
                Some(request) => self.handle_dock_request(&request),
                None => debug!("Ignoring transfer outside the dock namespace"),
            },
            FrameType::LinkAck => {
                if self.transfer != Transfer::Idle {
                    self.send_next_chunk(frame.seq());
                }
            },
            FrameType::LinkDisconnect => self.handle_link_disconnect(),
            kind @ (FrameType::LinkAttention | FrameType::LinkAttentionAck) => {
                debug!("Ignoring {kind:?} frame");
            },
        }
    }

    fn handle_link_request(&mut self) {
        info!("Link request received");
        self.link = LinkState::Connected;
        self.events.on_connected();
        self.rewind_package();
        self.push_frame(&LINK_REQUEST_REPLY);
    }

    fn handle_link_disconnect(&mut self) {
        info!("Link disconnected by peer");
        self.link = LinkState::Disconnected;
        self.events.on_disconnected();
        self.close_package();
    }

    fn handle_dock_request(&mut self, request: &DockRequest<'_>) {
        debug!("Dock command '{}' (seq {})", request.command, request.seq);
        self.push_frame(&dock::ack_payload(request.seq));

        match request.command {
            DockCommand::RequestToDock => {
                let reply = DockMessage::with_word(
                    DockCommand::Dock,
                    request.seq,
                    self.config.session_type,
                );
                self.push_frame(&reply.build());
            },
            DockCommand::Name => {
                let reply = DockMessage::with_word(
                    DockCommand::SetTimeout,
                    request.seq,
                    self.config.keepalive_secs,
                );
                self.push_frame(&reply.build());
            },
            DockCommand::Result => self.handle_result(request),
            other => debug!("No reply for dock command '{other}'"),
        }
    }

    fn handle_result(&mut self, request: &DockRequest<'_>) {
        let Some(code) = request.first_word() else {
            warn!("Result without an error code (seq {})", request.seq);
            return;
        };
        if code != 0 {
            // The peer disconnects on its own after reporting an error.
            warn!("Peer reported error code 0x{code:08X}");
            return;
        }

        let Some(size) = self.package_size() else {
            debug!("No package attached, disconnecting");
            self.push_frame(&DockMessage::disconnect(request.seq).build());
            return;
        };

        match self.transfer {
            Transfer::Active(seq) => {
                info!("Package transfer finished");
                self.push_frame(&DockMessage::disconnect(seq.wrapping_add(1)).build());
                self.close_package();
            },
            Transfer::Idle => {
                info!("Starting package transfer ({size} bytes)");
                let reply = DockMessage::with_value(DockCommand::LoadPackage, request.seq, size);
                self.push_frame(&reply.build());
                self.transfer = Transfer::Active(request.seq);
                if size == 0 {
                    // Nothing to stream; the lpkg reply already carries it all.
                    self.events.on_install_progress(1.0);
                }
            },
        }
    }

    fn send_next_chunk(&mut self, ack_seq: u8) {
        let Transfer::Active(mut seq) = self.transfer else {
            return;
        };
        self.push_frame(&dock::ack_payload(seq));

        let Some(package) = self.package.as_mut() else {
            return;
        };

        let mut resend = false;
        if ack_seq.wrapping_add(1) == seq {
            match package.rewind_last_chunk() {
                Ok(rewound) => resend = rewound,
                Err(e) => {
                    error!("Failed to rewind for retransmission: {e}");
                    self.close_package();
                    return;
                },
            }
        }

        if resend {
            debug!("Resending chunk {seq}");
        } else {
            if package.is_exhausted() {
                trace!("Package exhausted, waiting for result");
                return;
            }
            seq = seq.wrapping_add(1);
        }

        let chunk = match package.next_chunk() {
            Ok(chunk) => chunk,
            Err(e) => {
                error!("Failed to read package: {e}");
                self.close_package();
                return;
            },
        };
        let fraction = package.progress(&chunk);

        trace!(
            "Chunk {seq}: offset {} ({} bytes, {} padded)",
            chunk.start,
            chunk.read_len,
            chunk.data.len()
        );
        self.push_frame(&dock::data_payload(seq, &chunk.data));
        self.transfer = Transfer::Active(seq);
        self.events.on_install_progress(fraction);
    }
}
