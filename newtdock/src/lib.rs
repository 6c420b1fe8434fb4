//! # newtdock
//!
//! Device-side Dock protocol engine for installing packages on Newton
//! devices over a serial docking link.
//!
//! This crate provides:
//!
//! - Bisync link-layer framing (SYN DLE STX preamble, DLE stuffing,
//!   CRC-16 trailer)
//! - Byte-at-a-time frame reassembly with automatic resynchronization
//! - The Dock session state machine (handshake, Dock commands, chunked
//!   package streaming with retransmission)
//! - A transport pump tying a session to any `Read + Write` port
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via `serialport`
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use newtdock::{DockEvents, DockLink, DockSession};
//!
//! struct Progress;
//!
//! impl DockEvents for Progress {
//!     fn on_install_progress(&mut self, fraction: f64) {
//!         println!("{:.0}%", fraction * 100.0);
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = DockSession::new(Progress);
//!     session.attach_package("Hello.pkg")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let config = newtdock::SerialConfig::new("/dev/ttyUSB0", 38400);
//!         let mut port = newtdock::port::open_serial(&config)?;
//!         DockLink::new(&mut port).run(&mut session)?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod error;
pub mod link;
pub mod package;
pub mod port;
pub mod protocol;
pub mod session;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
pub use {
    error::{Error, Result},
    link::{DockLink, LinkConfig, LinkOutcome},
    package::{CHUNK_SIZE, Chunk, PackageRead, PackageSource},
    port::{PortInfo, SerialConfig},
    session::{DockConfig, DockEvents, DockSession, LinkState},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        assert!(!is_interrupted_requested());
    }
}
