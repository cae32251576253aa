//! Framing and wire types for the local presence IPC protocol.
//!
//! # Protocol Overview
//!
//! Every frame carries an 8-byte little-endian header followed by a JSON
//! payload:
//!
//! ```text
//! +---------------+---------------+------------------+
//! | opcode (i32)  | length (i32)  |  JSON payload    |
//! +---------------+---------------+------------------+
//! ```
//!
//! The client opens with a [`Handshake`] (opcode 0), waits for the `READY`
//! dispatch (opcode 1), then sends [`CommandEnvelope`]s such as
//! `SET_ACTIVITY` and periodic heartbeats (opcode 3). The peer may end the
//! session at any time with a close frame (opcode 5).
//!
//! # Example
//!
//! ```rust
//! use tunecord_protocol::{decode_header, encode, Handshake, Opcode};
//!
//! let bytes = encode(Opcode::Handshake, &Handshake::new("1234")).unwrap();
//! let (opcode, len) = decode_header(&bytes).unwrap();
//! assert_eq!(opcode, Opcode::Handshake);
//! assert_eq!(len, bytes.len() - 8);
//! ```

mod activity;
mod error;
mod framing;
mod types;

pub use activity::{
    Activity, ActivityType, Assets, Button, SetActivityArgs, Timestamps, MAX_BUTTONS,
    MAX_BUTTON_LABEL_LEN, MAX_TEXT_LEN, MIN_TEXT_LEN, clamp_text,
};
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{
    decode_frame, decode_header, encode, Frame, FrameReader, FrameWriter, Opcode, HEADER_LEN,
};
pub use types::{
    CloseReason, Command, CommandEnvelope, ErrorData, Event, Handshake, InboundMessage, PeerUser,
    ReadyInfo,
};

/// Handshake protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum payload size accepted or produced (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
