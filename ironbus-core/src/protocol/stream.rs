//! Chunked, acknowledged stream transfer with lockstep backpressure.
//!
//! ## Wire protocol
//!
//! ```text
//! Sender ──[chunk, ≤1024 bytes]─────────────► Receiver
//! Sender ◄──[ack: cumulative u64 LE, 8 bytes]── Receiver
//! (repeat until total bytes moved)
//! ```
//!
//! Chunk `N+1` is never sent until the acknowledgment for chunk `N`
//! reports exactly the sender's cumulative byte count — the sender can
//! never have more than one unacknowledged chunk outstanding. A stray
//! or duplicate acknowledgment is skipped, not treated as an error.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::BusError;

/// Fixed chunk size for all stream transfers.
pub const CHUNK_SIZE: usize = 1024;

/// Size of one acknowledgment frame: a little-endian 64-bit
/// cumulative byte count.
pub const ACK_SIZE: usize = 8;

// ── Progress policy ──────────────────────────────────────────────

/// When the progress callback fires during a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressReport {
    /// Invoke the callback after every chunk.
    EveryChunk,
    /// Invoke the callback only when the whole-percentage value
    /// (`moved * 100 / total`) changes.
    WholePercent,
}

fn report_progress<F>(
    report: &mut F,
    mode: ProgressReport,
    last_percent: &mut u64,
    moved: u64,
    total: u64,
) where
    F: FnMut(u64, u64),
{
    match mode {
        ProgressReport::EveryChunk => report(moved, total),
        ProgressReport::WholePercent => {
            // Only called with total > 0 (the transfer loop is skipped
            // entirely for empty payloads).
            let percent = moved * 100 / total;
            if percent != *last_percent {
                *last_percent = percent;
                report(moved, total);
            }
        }
    }
}

// ── Acknowledgment frames ────────────────────────────────────────

/// Read one 8-byte acknowledgment frame.
pub async fn read_ack<S>(stream: &mut S) -> Result<u64, BusError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; ACK_SIZE];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(BusError::from_read)?;
    Ok(u64::from_le_bytes(buf))
}

/// Send one 8-byte acknowledgment frame.
pub async fn write_ack<S>(stream: &mut S, value: u64) -> Result<(), BusError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&value.to_le_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Keep reading acknowledgment frames until the cumulative count
/// matches `expected`.
async fn wait_for_ack<S>(stream: &mut S, expected: u64) -> Result<(), BusError>
where
    S: AsyncRead + Unpin,
{
    loop {
        let ack = read_ack(stream).await?;
        if ack == expected {
            return Ok(());
        }
        trace!(ack, expected, "skipping stale acknowledgment");
    }
}

// ── Sender side ──────────────────────────────────────────────────

/// Send `total` bytes from `source` over `stream` in acknowledged
/// 1024-byte chunks.
///
/// A short read from the local source is an error: the caller
/// promised `total` bytes. Failure at any read/send/ack step aborts
/// the loop and returns that step's error.
pub async fn send_stream<S, R, F>(
    stream: &mut S,
    source: &mut R,
    total: u64,
    mut report: F,
    mode: ProgressReport,
) -> Result<(), BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    F: FnMut(u64, u64),
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut sent: u64 = 0;
    let mut last_percent: u64 = 0;

    while sent < total {
        let take = std::cmp::min(CHUNK_SIZE as u64, total - sent) as usize;
        source.read_exact(&mut buf[..take]).await?;

        stream.write_all(&buf[..take]).await?;
        stream.flush().await?;
        sent += take as u64;

        wait_for_ack(stream, sent).await?;
        report_progress(&mut report, mode, &mut last_percent, sent, total);
    }

    Ok(())
}

// ── Receiver side ────────────────────────────────────────────────

/// Receive `total` bytes from `stream` into `sink`, acknowledging the
/// cumulative byte count after every chunk.
///
/// Short socket reads are re-issued until each chunk is complete.
pub async fn receive_stream<S, W, F>(
    stream: &mut S,
    sink: &mut W,
    total: u64,
    mut report: F,
    mode: ProgressReport,
) -> Result<(), BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(u64, u64),
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut received: u64 = 0;
    let mut last_percent: u64 = 0;

    while received < total {
        let take = std::cmp::min(CHUNK_SIZE as u64, total - received) as usize;
        stream
            .read_exact(&mut buf[..take])
            .await
            .map_err(BusError::from_read)?;

        sink.write_all(&buf[..take]).await?;
        received += take as u64;

        write_ack(stream, received).await?;
        report_progress(&mut report, mode, &mut last_percent, received, total);
    }

    sink.flush().await?;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
