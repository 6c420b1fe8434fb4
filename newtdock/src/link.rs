//! Transport pump between a byte port and a [`DockSession`].
//!
//! The session itself never touches I/O. [`DockLink`] reads from any
//! `Read + Write` port (a serial port, a socket, an in-memory mock), feeds the
//! session, and writes back whatever it produced.

use crate::error::{Error, Result};
use crate::session::{DockEvents, DockSession, LinkState};
use log::{debug, trace};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Size of each read from the port.
const READ_BUFFER_SIZE: usize = 512;

/// Pump configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Give up when nothing arrives for this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(90)),
        }
    }
}

/// Why the pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The peer sent a link disconnect.
    Disconnected,
    /// The port reached end of stream.
    Closed,
}

/// Drives a session from a port until the peer goes away.
pub struct DockLink<'a, P: Read + Write> {
    port: &'a mut P,
    config: LinkConfig,
}

impl<'a, P: Read + Write> DockLink<'a, P> {
    /// Create a pump with the default configuration.
    pub fn new(port: &'a mut P) -> Self {
        Self {
            port,
            config: LinkConfig::default(),
        }
    }

    /// Create a pump with a custom configuration.
    pub fn with_config(port: &'a mut P, config: LinkConfig) -> Self {
        Self { port, config }
    }

    /// Write everything the session has queued.
    fn flush_output<E: DockEvents>(&mut self, session: &mut DockSession<E>) -> Result<()> {
        let output = session.take_output();
        if output.is_empty() {
            return Ok(());
        }
        trace!("TX {} bytes", output.len());
        self.port.write_all(&output)?;
        self.port.flush()?;
        Ok(())
    }

    /// Run until the peer disconnects or the port closes.
    pub fn run<E: DockEvents>(&mut self, session: &mut DockSession<E>) -> Result<LinkOutcome> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut last_rx = Instant::now();

        // Anything queued before the pump started goes out first.
        self.flush_output(session)?;

        loop {
            if crate::is_interrupted_requested() {
                return Err(Error::Cancelled("interrupted by user".into()));
            }

            match self.port.read(&mut buf) {
                Ok(0) => {
                    debug!("Port closed");
                    return Ok(LinkOutcome::Closed);
                },
                Ok(n) => {
                    trace!("RX {n} bytes");
                    last_rx = Instant::now();
                    session.receive(&buf[..n]);
                    self.flush_output(session)?;

                    if session.link_state() == LinkState::Disconnected {
                        return Ok(LinkOutcome::Disconnected);
                    }
                },
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    if let Some(limit) = self.config.idle_timeout {
                        if last_rx.elapsed() >= limit {
                            return Err(Error::Timeout(format!(
                                "no data from peer for {}s",
                                limit.as_secs()
                            )));
                        }
                    }
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}
