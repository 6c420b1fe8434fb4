//! Link-layer framing and Dock-layer messages.

pub mod crc;
pub mod dock;
pub mod frame;
pub mod reassembler;

// Re-export common types
pub use dock::{DockCommand, DockMessage, DockRequest, FrameType, LinkFrame};
pub use frame::{FrameScan, decode, encode, encode_into, scan_frame};
pub use reassembler::FrameReassembler;
