//! File transfer wrappers — metadata handshake plus lockstep stream.
//!
//! ## Wire protocol
//!
//! ```text
//! Sender ──[UserString, customer 1]──► Receiver   (FileHead JSON)
//! Sender ──[lockstep stream]─────────► Receiver   (FileSize bytes)
//! ```
//!
//! When the local file does not exist the sender transmits an empty
//! `UserString` frame with customer code 0 instead of a metadata
//! payload; both ends surface [`BusError::FileNotExist`] and no stream
//! chunks are exchanged.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::BusError;
use crate::exchange::{HANDSHAKE_TIMEOUT, receive_string, send_string_and_confirm};
use crate::header::Token;
use crate::message::{FILE_HEAD_ABSENT, FILE_HEAD_PRESENT};
use crate::protocol::stream::{ProgressReport, receive_stream, send_stream};

// ── FileHead ─────────────────────────────────────────────────────

/// File metadata exchanged before a transfer.
///
/// Serialized as a JSON object; the key names are the wire contract
/// and both ends must agree on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHead {
    /// File name on the receiving side.
    #[serde(rename = "FileName")]
    pub name: String,

    /// Total file size in bytes.
    #[serde(rename = "FileSize")]
    pub size: u64,

    /// Caller-defined tag travelling with the file.
    #[serde(rename = "FileTag", default)]
    pub tag: String,

    /// Who is uploading the file.
    #[serde(rename = "FileUpload", default)]
    pub uploader: String,
}

impl FileHead {
    pub fn to_json(&self) -> Result<String, BusError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, BusError> {
        Ok(serde_json::from_str(text)?)
    }
}

// ── Receive side ─────────────────────────────────────────────────

/// Receive the metadata frame that precedes a file transfer.
///
/// Customer code 0 is the remote's "file does not exist" signal; it
/// is surfaced as [`BusError::FileNotExist`] and no body transfer is
/// attempted.
pub async fn receive_file_head<S>(stream: &mut S, token: &Token) -> Result<FileHead, BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (customer, text) = receive_string(stream, token, Some(HANDSHAKE_TIMEOUT)).await?;
    if customer == FILE_HEAD_ABSENT {
        warn!("remote file does not exist, nothing to receive");
        return Err(BusError::FileNotExist("remote file".to_string()));
    }
    FileHead::from_json(&text)
}

/// Receive one file: metadata handshake, then the lockstep stream into
/// a freshly created file at `save_path`.
///
/// The file handle is a scoped local, so it is closed on every exit
/// path. On a local I/O failure the socket is shut down defensively.
pub async fn receive_file_and_confirm<S, F>(
    stream: &mut S,
    token: &Token,
    save_path: impl AsRef<Path>,
    report: F,
    mode: ProgressReport,
) -> Result<FileHead, BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(u64, u64),
{
    let head = receive_file_head(stream, token).await?;

    let mut file = match File::create(save_path.as_ref()).await {
        Ok(f) => f,
        Err(e) => {
            let _ = stream.shutdown().await;
            return Err(e.into());
        }
    };

    if let Err(e) = receive_stream(stream, &mut file, head.size, report, mode).await {
        let _ = stream.shutdown().await;
        return Err(e);
    }

    Ok(head)
}

// ── Send side ────────────────────────────────────────────────────

/// Send one local file: existence check, metadata handshake, then the
/// lockstep stream.
///
/// `remote_name` is the name the receiving side stores the file under.
pub async fn send_file_and_confirm<S, F>(
    stream: &mut S,
    token: &Token,
    local_path: impl AsRef<Path>,
    remote_name: &str,
    tag: &str,
    uploader: &str,
    report: F,
    mode: ProgressReport,
) -> Result<(), BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(u64, u64),
{
    let path = local_path.as_ref();
    let meta = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        _ => {
            // Tell the peer there is nothing coming, then end the
            // conversation.
            send_string_and_confirm(stream, FILE_HEAD_ABSENT, token, "").await?;
            let _ = stream.shutdown().await;
            warn!(path = %path.display(), "local file does not exist");
            return Err(BusError::FileNotExist(path.display().to_string()));
        }
    };

    let head = FileHead {
        name: remote_name.to_string(),
        size: meta.len(),
        tag: tag.to_string(),
        uploader: uploader.to_string(),
    };
    send_string_and_confirm(stream, FILE_HEAD_PRESENT, token, &head.to_json()?).await?;

    let mut file = match File::open(path).await {
        Ok(f) => f,
        Err(e) => {
            let _ = stream.shutdown().await;
            return Err(e.into());
        }
    };

    // File handle closed on drop, on every exit path below.
    if let Err(e) = send_stream(stream, &mut file, head.size, report, mode).await {
        let _ = stream.shutdown().await;
        return Err(e);
    }
    Ok(())
}

/// Send an arbitrary readable source with explicit metadata — the
/// generic sibling of [`send_file_and_confirm`] for payloads that are
/// not files on disk.
pub async fn send_reader_and_confirm<S, R, F>(
    stream: &mut S,
    token: &Token,
    source: &mut R,
    head: &FileHead,
    report: F,
    mode: ProgressReport,
) -> Result<(), BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    F: FnMut(u64, u64),
{
    send_string_and_confirm(stream, FILE_HEAD_PRESENT, token, &head.to_json()?).await?;
    send_stream(stream, source, head.size, report, mode).await
}

// ── Tests ────────────────────────────────────────────────────────
