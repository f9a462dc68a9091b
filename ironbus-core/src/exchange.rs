//! Request/response helpers for control exchanges.
//!
//! These drive a whole frame in one call — send-then-confirm, or
//! receive-and-validate — and are meant for short control handshakes
//! and file-header negotiation, not the bulk-transfer loop. The
//! receive path can be guarded by a watchdog deadline; `None` disables
//! it (the equivalent of a zero/negative timeout).
//!
//! The watchdog covers only the 32-byte header read. The moment the
//! header is in (or the read fails), the deadline is disarmed, so a
//! quick handshake followed by a slow body never trips it. On expiry
//! the socket is shut down exactly once and [`BusError::Timeout`] is
//! returned — there is no second closing path.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::codec::{encode_frame, mask_body};
use crate::error::BusError;
use crate::header::{FrameHeader, HEADER_SIZE, Token, token_matches};
use crate::message::ProtocolCode;

/// Default deadline for the control-handshake receive path.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for short string/bytes exchanges.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

// ── Send side ────────────────────────────────────────────────────

/// Encode one frame under `token` and send it whole.
pub async fn send_and_confirm<S>(
    stream: &mut S,
    protocol: u32,
    customer: u32,
    token: &Token,
    body: &[u8],
) -> Result<(), BusError>
where
    S: AsyncWrite + Unpin,
{
    let frame = encode_frame(protocol, customer, token, body)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Send an opaque byte payload as a `UserBytes` frame.
pub async fn send_bytes_and_confirm<S>(
    stream: &mut S,
    customer: u32,
    token: &Token,
    body: &[u8],
) -> Result<(), BusError>
where
    S: AsyncWrite + Unpin,
{
    send_and_confirm(stream, ProtocolCode::UserBytes as u32, customer, token, body).await
}

/// Send a UTF-8 string as a `UserString` frame.
pub async fn send_string_and_confirm<S>(
    stream: &mut S,
    customer: u32,
    token: &Token,
    text: &str,
) -> Result<(), BusError>
where
    S: AsyncWrite + Unpin,
{
    send_and_confirm(
        stream,
        ProtocolCode::UserString as u32,
        customer,
        token,
        text.as_bytes(),
    )
    .await
}

// ── Receive side ─────────────────────────────────────────────────

/// Receive one complete frame: exactly 32 header bytes, token check,
/// then exactly the declared body, with the content transform removed.
///
/// A token mismatch closes the socket — the input is untrusted.
pub async fn receive_framed<S>(
    stream: &mut S,
    token: &Token,
    watchdog: Option<Duration>,
) -> Result<(FrameHeader, Bytes), BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut head = [0u8; HEADER_SIZE];
    match watchdog {
        Some(deadline) => {
            match tokio::time::timeout(deadline, stream.read_exact(&mut head)).await {
                Ok(read) => {
                    read.map_err(BusError::from_read)?;
                }
                Err(_elapsed) => {
                    let _ = stream.shutdown().await;
                    return Err(BusError::Timeout(deadline));
                }
            }
        }
        None => {
            stream.read_exact(&mut head).await.map_err(BusError::from_read)?;
        }
    }

    if !token_matches(&head, token) {
        let _ = stream.shutdown().await;
        return Err(BusError::TokenRejected);
    }

    let header = FrameHeader::from_bytes(head)?;
    let mut body = BytesMut::zeroed(header.content_length());
    stream.read_exact(&mut body).await.map_err(BusError::from_read)?;
    mask_body(token, &mut body);
    Ok((header, body.freeze()))
}

/// Receive a frame and require the given protocol code.
///
/// A mismatch closes the socket and yields
/// [`BusError::UnexpectedProtocol`].
async fn expect_framed<S>(
    stream: &mut S,
    token: &Token,
    watchdog: Option<Duration>,
    expected: ProtocolCode,
) -> Result<(FrameHeader, Bytes), BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (header, body) = receive_framed(stream, token, watchdog).await?;
    let want = expected as u32;
    if header.protocol != want {
        warn!(expected = want, actual = header.protocol, "header validation failed");
        let _ = stream.shutdown().await;
        return Err(BusError::UnexpectedProtocol {
            expected: want,
            actual: header.protocol,
        });
    }
    Ok((header, body))
}

/// Receive a `UserBytes` frame; returns the customer code and body.
pub async fn receive_bytes<S>(
    stream: &mut S,
    token: &Token,
    watchdog: Option<Duration>,
) -> Result<(u32, Bytes), BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (header, body) = expect_framed(stream, token, watchdog, ProtocolCode::UserBytes).await?;
    Ok((header.customer, body))
}

/// Receive a `UserString` frame; returns the customer code and the
/// decoded UTF-8 text.
pub async fn receive_string<S>(
    stream: &mut S,
    token: &Token,
    watchdog: Option<Duration>,
) -> Result<(u32, String), BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (header, body) = expect_framed(stream, token, watchdog, ProtocolCode::UserString).await?;
    Ok((header.customer, String::from_utf8(body.to_vec())?))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Token {
        *b"exchange-token-0"
    }

    #[tokio::test]
    async fn string_exchange_roundtrip() {
        let (mut near, mut far) = tokio::io::duplex(4096);

        send_string_and_confirm(&mut near, 5, &token(), "status: ok")
            .await
            .unwrap();

        let (customer, text) = receive_string(&mut far, &token(), None).await.unwrap();
        assert_eq!(customer, 5);
        assert_eq!(text, "status: ok");
    }

    #[tokio::test]
    async fn bytes_exchange_roundtrip() {
        let (mut near, mut far) = tokio::io::duplex(4096);

        send_bytes_and_confirm(&mut near, 9, &token(), &[1, 2, 3, 4])
            .await
            .unwrap();

        let (customer, body) = receive_bytes(&mut far, &token(), None).await.unwrap();
        assert_eq!(customer, 9);
        assert_eq!(&body[..], &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn wrong_protocol_code_rejected() {
        let (mut near, mut far) = tokio::io::duplex(4096);

        send_bytes_and_confirm(&mut near, 0, &token(), b"not a string")
            .await
            .unwrap();

        let err = receive_string(&mut far, &token(), None).await.unwrap_err();
        assert!(matches!(err, BusError::UnexpectedProtocol { .. }));
    }

    #[tokio::test]
    async fn wrong_token_closes_and_errors() {
        let (mut near, mut far) = tokio::io::duplex(4096);

        let mut other = token();
        other[0] ^= 1;
        send_string_and_confirm(&mut near, 0, &other, "hello")
            .await
            .unwrap();

        let err = receive_string(&mut far, &token(), None).await.unwrap_err();
        assert!(matches!(err, BusError::TokenRejected));
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_fires_when_no_header_arrives() {
        let (mut near, _far) = tokio::io::duplex(4096);

        let deadline = Duration::from_secs(5);
        let err = receive_framed(&mut near, &token(), Some(deadline))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Timeout(d) if d == deadline));
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_does_not_fire_on_a_slow_but_timely_peer() {
        let (mut near, mut far) = tokio::io::duplex(4096);

        tokio::spawn(async move {
            // Arrive just under the deadline.
            tokio::time::sleep(Duration::from_secs(4)).await;
            send_string_and_confirm(&mut far, 1, &token(), "late but fine")
                .await
                .unwrap();
            far
        });

        let (customer, text) =
            receive_string(&mut near, &token(), Some(Duration::from_secs(5)))
                .await
                .unwrap();
        assert_eq!(customer, 1);
        assert_eq!(text, "late but fine");
    }

    #[tokio::test]
    async fn peer_close_maps_to_remote_closed() {
        let (mut near, far) = tokio::io::duplex(4096);
        drop(far);

        let err = receive_framed(&mut near, &token(), None).await.unwrap_err();
        assert!(matches!(err, BusError::RemoteClosed));
    }
}
