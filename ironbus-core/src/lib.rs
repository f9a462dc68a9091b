//! # ironbus-core
//!
//! Session-oriented TCP transport for the IronBus industrial
//! communication stack.
//!
//! This crate contains:
//! - **Framing**: `FrameHeader` — the 32-byte wire header with its
//!   16-byte session token, plus the repeating-token content transform
//! - **Codec**: `FrameCodec` for framed TCP I/O via `tokio_util`
//! - **Network**: `Session` — the per-connection receive state machine,
//!   tolerant of arbitrary TCP fragmentation, with a serialized send path
//! - **Exchange**: synchronous request/response helpers with a watchdog
//!   deadline on the receive side
//! - **Protocol**: chunked, acknowledged stream transfer and file
//!   convenience wrappers with a JSON metadata handshake
//! - **Error**: `BusError` — typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod error;
pub mod exchange;
pub mod header;
pub mod message;
pub mod network;
pub mod protocol;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{Frame, FrameCodec, MAX_BODY_SIZE, encode_frame, mask_body};
pub use error::BusError;
pub use exchange::{
    EXCHANGE_TIMEOUT, HANDSHAKE_TIMEOUT, receive_bytes, receive_framed, receive_string,
    send_and_confirm, send_bytes_and_confirm, send_string_and_confirm,
};
pub use header::{FrameHeader, HEADER_SIZE, TOKEN_SIZE, Token, token_matches};
pub use message::{FILE_HEAD_ABSENT, FILE_HEAD_PRESENT, ProtocolCode};
pub use network::{Session, SessionHandler, SessionSender};
pub use protocol::{
    ACK_SIZE, CHUNK_SIZE, FileHead, ProgressReport, receive_file_and_confirm, receive_file_head,
    receive_stream, send_file_and_confirm, send_reader_and_confirm, send_stream,
};
