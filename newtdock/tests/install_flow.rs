//! End-to-end install over an in-memory serial port.

use byteorder::{BigEndian, ByteOrder};
use newtdock::protocol::dock::{self, DockCommand, DockMessage, LINK_REQUEST_REPLY};
use newtdock::protocol::{FrameScan, decode, encode, scan_frame};
use newtdock::{DockEvents, DockLink, DockSession, LinkOutcome, LinkState};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Serial port double fed with a scripted peer conversation.
struct ScriptedPort {
    incoming: VecDeque<u8>,
    outgoing: Vec<u8>,
}

impl ScriptedPort {
    fn new(script: &[Vec<u8>]) -> Self {
        Self {
            incoming: script.iter().flatten().copied().collect(),
            outgoing: Vec::new(),
        }
    }
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.incoming.is_empty() {
            return Err(std::io::Error::new(ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.incoming.len());
        for (slot, b) in buf.iter_mut().zip(self.incoming.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

impl Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.outgoing.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Events {
    connected: usize,
    disconnected: usize,
    progress: Vec<f64>,
}

impl DockEvents for Events {
    fn on_connected(&mut self) {
        self.connected += 1;
    }

    fn on_disconnected(&mut self) {
        self.disconnected += 1;
    }

    fn on_install_progress(&mut self, fraction: f64) {
        self.progress.push(fraction);
    }
}

fn request(seq: u8, command: &[u8; 4], data: &[u8]) -> Vec<u8> {
    encode(&DockMessage::with_data(DockCommand::from_code(*command), seq, data).build())
}

fn payloads(mut bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let FrameScan::Complete(len) = scan_frame(bytes) {
        out.push(decode(&bytes[..len]).expect("session output must decode"));
        bytes = &bytes[len..];
    }
    assert!(bytes.is_empty(), "undecodable trailing output");
    out
}

#[test]
fn install_streams_package_and_disconnects() {
    init_logging();

    let package: Vec<u8> = (0..1001u32).map(|i| (i * 7 % 256) as u8).collect();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&package).unwrap();
    file.flush().unwrap();

    let link_request = LINK_REQUEST_REPLY.to_vec();
    let mut script = vec![
        encode(&link_request),
        request(1, b"rtdk", &[]),
        request(2, b"name", b"MessagePad\0"),
        request(3, b"dres", &[0, 0, 0, 0]),
    ];
    // Ack the lpkg reply, then chunks 4..=7, then one ack after the last.
    for seq in 3..=7 {
        script.push(encode(&dock::ack_payload(seq)));
    }
    script.push(request(8, b"dres", &[0, 0, 0, 0]));
    script.push(encode(&[0x02, 0x02, 0x00]));

    let mut port = ScriptedPort::new(&script);
    let mut session = DockSession::new(Events::default());
    session.attach_package(file.path()).unwrap();

    let outcome = DockLink::new(&mut port).run(&mut session).unwrap();
    assert_eq!(outcome, LinkOutcome::Disconnected);
    assert_eq!(session.link_state(), LinkState::Disconnected);
    assert!(!session.has_package());

    let events = session.into_events();
    assert_eq!(events.connected, 1);
    assert_eq!(events.disconnected, 1);
    assert_eq!(events.progress.len(), 4);
    assert!((events.progress[3] - 1.0).abs() < f64::EPSILON);

    let out = payloads(&port.outgoing);
    assert_eq!(out[0], LINK_REQUEST_REPLY);

    let lpkg = out
        .iter()
        .find(|p| p.len() >= 15 && &p[11..15] == b"lpkg")
        .expect("lpkg reply");
    assert_eq!(BigEndian::read_u32(&lpkg[15..19]), 1001);

    let chunks: Vec<&Vec<u8>> = out
        .iter()
        .filter(|p| p[1] == 0x04 && (p.len() < 11 || &p[3..11] != b"newtdock"))
        .collect();
    let lengths: Vec<usize> = chunks.iter().map(|c| c.len() - 3).collect();
    assert_eq!(lengths, vec![256, 256, 256, 236]);
    let seqs: Vec<u8> = chunks.iter().map(|c| c[2]).collect();
    assert_eq!(seqs, vec![4, 5, 6, 7]);

    let streamed: Vec<u8> = chunks.iter().flat_map(|c| c[3..].to_vec()).collect();
    assert_eq!(&streamed[..1001], &package[..]);

    let disc = out.last().unwrap();
    assert_eq!(&disc[11..15], b"disc");
    assert_eq!(disc[2], 8);
}

#[test]
fn noisy_line_still_connects() {
    init_logging();

    let mut noisy = vec![0xFF, 0x16, 0x00, 0x10, 0x02];
    noisy.extend_from_slice(&encode(&LINK_REQUEST_REPLY));
    let script = vec![noisy, encode(&[0x02, 0x02, 0x00])];

    let mut port = ScriptedPort::new(&script);
    let mut session = DockSession::new(Events::default());
    DockLink::new(&mut port).run(&mut session).unwrap();

    assert_eq!(session.events().connected, 1);
    assert_eq!(payloads(&port.outgoing), vec![LINK_REQUEST_REPLY.to_vec()]);
}
