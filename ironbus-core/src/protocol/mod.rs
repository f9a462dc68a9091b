//! Bulk-transfer protocols layered on the framing core.
//!
//! `stream` implements the chunked, acknowledged lockstep transfer;
//! `file` composes it with the metadata handshake into the file
//! convenience wrappers.

pub mod file;
pub mod stream;

pub use file::{
    FileHead, receive_file_and_confirm, receive_file_head, send_file_and_confirm,
    send_reader_and_confirm,
};
pub use stream::{ACK_SIZE, CHUNK_SIZE, ProgressReport, receive_stream, send_stream};
