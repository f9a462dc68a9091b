//! Per-connection session state and the receive/send engines.
//!
//! One [`Session`] owns one accepted/connected stream. The receive
//! engine accumulates a fixed 32-byte header, then a variable body,
//! across however many partial reads the transport delivers, validates
//! the token, removes the content transform, and hands the decoded
//! frame to the [`SessionHandler`]. The send engine serializes
//! concurrent writers through a per-session exclusion gate and resumes
//! partial writes.
//!
//! ```text
//!  AwaitingHeader(n) ──32 bytes──► token check ──len=0──► dispatch ─┐
//!        ▲                             │                            │
//!        │                             └─len>0─► AwaitingBody(n) ───┤
//!        └────────────────────────────────────────────────────────◄┘
//! ```
//!
//! A zero-byte read in either state means the peer closed the
//! connection; the lifecycle collaborator is notified and the loop
//! stops. All of a session's buffers and counters are owned by that
//! session — nothing is shared across connections.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::codec::{Frame, encode_frame, mask_body};
use crate::error::BusError;
use crate::header::{FrameHeader, HEADER_SIZE, Token, token_matches};

// ── SessionHandler ───────────────────────────────────────────────

/// Collaborator seam for the receive engine.
///
/// `process` is invoked once per fully decoded, token-valid message.
/// The lifecycle and error callbacks default to no-ops so that simple
/// handlers only implement dispatch.
#[async_trait]
pub trait SessionHandler<S>: Send + Sync
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// A complete frame arrived: protocol code, customer code, and the
    /// body with the content transform already removed.
    async fn process(&self, sender: &SessionSender<S>, protocol: u32, customer: u32, body: Bytes);

    /// The peer shut down gracefully (zero-byte read), or the session
    /// was closed after a protocol violation.
    async fn on_remote_closed(&self, _sender: &SessionSender<S>) {}

    /// A non-disposed, non-graceful socket error stopped the receive
    /// loop. The collaborator decides whether to tear the session down.
    async fn on_receive_error(&self, _sender: &SessionSender<S>, _err: &BusError) {}
}

// ── SessionSender (send engine) ──────────────────────────────────

/// Clonable send handle for one session.
///
/// The internal mutex is the session's send exclusion gate: at most
/// one write is in flight per session, and competing callers queue on
/// the lock in whatever order the mutex provides. Writes that fail
/// because the socket is already gone are dropped silently — the
/// remote can no longer hear us.
pub struct SessionSender<S> {
    writer: Arc<Mutex<WriteHalf<S>>>,
    token: Token,
}

impl<S> Clone for SessionSender<S> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            token: self.token,
        }
    }
}

impl<S> SessionSender<S>
where
    S: AsyncWrite + Send + 'static,
{
    /// Encode and send one frame under the session token.
    pub async fn send(&self, protocol: u32, customer: u32, body: &[u8]) -> Result<(), BusError> {
        let frame = encode_frame(protocol, customer, &self.token, body)?;
        self.send_raw(&frame).await
    }

    /// Send a pre-encoded buffer, resuming on partial writes.
    ///
    /// Holds the exclusion gate for the whole buffer so two concurrent
    /// callers can never interleave bytes on the wire.
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<(), BusError> {
        let mut writer = self.writer.lock().await;
        match write_all_resuming(&mut *writer, bytes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = BusError::from(e);
                if err.is_disposed() {
                    debug!("write on disposed socket dropped");
                    Ok(())
                } else if err.is_peer_gone() {
                    debug!("write after peer close suppressed");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
        // gate released when the guard drops, on every path
    }

    /// Shut down the write side, forcing any in-flight reads on the
    /// peer to observe the close.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    /// The session's configured token.
    pub fn token(&self) -> &Token {
        &self.token
    }
}

/// Write the whole buffer, re-issuing writes for the remainder after
/// every partial completion.
async fn write_all_resuming<W: AsyncWrite + Unpin>(
    writer: &mut W,
    bytes: &[u8],
) -> std::io::Result<()> {
    let mut sent = 0;
    while sent < bytes.len() {
        let n = writer.write(&bytes[sent..]).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::WriteZero.into());
        }
        sent += n;
    }
    writer.flush().await
}

// ── Session (receive engine) ─────────────────────────────────────

/// Stateful wrapper around one connected stream: partial-receive
/// buffers, byte counters, the send gate, and the configured token.
pub struct Session<S> {
    reader: ReadHalf<S>,
    sender: SessionSender<S>,
    head: [u8; HEADER_SIZE],
    head_received: usize,
    content: BytesMut,
    content_received: usize,
    token: Token,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap an accepted/connected stream. The token is copied from the
    /// owning component and is immutable for the session's lifetime.
    pub fn new(stream: S, token: Token) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader,
            sender: SessionSender {
                writer: Arc::new(Mutex::new(writer)),
                token,
            },
            head: [0u8; HEADER_SIZE],
            head_received: 0,
            content: BytesMut::new(),
            content_received: 0,
            token,
        }
    }

    /// A clonable send handle sharing this session's exclusion gate.
    pub fn sender(&self) -> SessionSender<S> {
        self.sender.clone()
    }

    /// The session's configured token.
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Reset the partial-receive counters for the next message cycle.
    fn clear(&mut self) {
        self.head_received = 0;
        self.content_received = 0;
        self.content.clear();
    }

    /// Receive exactly one frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection (a
    /// zero-byte read, in either the header or the body phase).
    /// Tolerates any split of bytes across reads — no assumption that
    /// a header or body arrives whole.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, BusError> {
        self.clear();

        while self.head_received < HEADER_SIZE {
            let n = self.reader.read(&mut self.head[self.head_received..]).await?;
            if n == 0 {
                return Ok(None);
            }
            self.head_received += n;
        }

        if !token_matches(&self.head, &self.token) {
            return Err(BusError::TokenRejected);
        }

        // Content length always comes from the last 4 header bytes.
        let header = FrameHeader::from_bytes(self.head)?;
        let length = header.content_length();

        // Zero-length bodies short-circuit straight to dispatch.
        if length == 0 {
            return Ok(Some(Frame::new(header.protocol, header.customer, Bytes::new())));
        }

        self.content.resize(length, 0);
        while self.content_received < length {
            let n = self
                .reader
                .read(&mut self.content[self.content_received..])
                .await?;
            if n == 0 {
                return Ok(None);
            }
            self.content_received += n;
        }

        let mut body = self.content.split_to(length);
        mask_body(&self.token, &mut body);
        Ok(Some(Frame::new(header.protocol, header.customer, body.freeze())))
    }

    /// Drive the receive loop until the session terminates.
    ///
    /// Every fully received frame is dispatched and the engine re-arms
    /// for the next header. Termination policy:
    ///
    /// - zero-byte read → `on_remote_closed`, stop
    /// - token mismatch or malformed header → warn, close the session,
    ///   `on_remote_closed` (the lifecycle collaborator tears it down
    ///   through the same path as a graceful close), stop
    /// - disposed socket → stop silently (idempotent shutdown)
    /// - any other error → `on_receive_error`, stop; the collaborator
    ///   decides whether to reconnect
    pub async fn run<H>(&mut self, handler: &H)
    where
        H: SessionHandler<S>,
    {
        loop {
            match self.next_frame().await {
                Ok(Some(frame)) => {
                    handler
                        .process(&self.sender, frame.protocol, frame.customer, frame.body)
                        .await;
                }
                Ok(None) => {
                    debug!("remote closed the connection");
                    handler.on_remote_closed(&self.sender).await;
                    return;
                }
                Err(e @ (BusError::TokenRejected | BusError::InvalidHeader(_))) => {
                    warn!(error = %e, "protocol violation, closing session");
                    self.sender.close().await;
                    handler.on_remote_closed(&self.sender).await;
                    return;
                }
                Err(e) if e.is_disposed() => {
                    debug!("receive on disposed socket, stopping");
                    return;
                }
                Err(e) => {
                    handler.on_receive_error(&self.sender, &e).await;
                    return;
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;

    fn token() -> Token {
        *b"unit-test-token!"
    }

    struct CountingHandler {
        frames: std::sync::Mutex<Vec<(u32, u32, Vec<u8>)>>,
        closed: AtomicUsize,
        errors: AtomicUsize,
    }

    impl CountingHandler {
        fn new() -> Self {
            Self {
                frames: std::sync::Mutex::new(Vec::new()),
                closed: AtomicUsize::new(0),
                errors: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SessionHandler<DuplexStream> for CountingHandler {
        async fn process(
            &self,
            _sender: &SessionSender<DuplexStream>,
            protocol: u32,
            customer: u32,
            body: Bytes,
        ) {
            self.frames
                .lock()
                .unwrap()
                .push((protocol, customer, body.to_vec()));
        }

        async fn on_remote_closed(&self, _sender: &SessionSender<DuplexStream>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_receive_error(
            &self,
            _sender: &SessionSender<DuplexStream>,
            _err: &BusError,
        ) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn whole_frame_received() {
        let (near, far) = tokio::io::duplex(4096);
        let mut session = Session::new(near, token());

        let wire = encode_frame(1002, 3, &token(), b"payload").unwrap();
        let mut far = far;
        far.write_all(&wire).await.unwrap();

        let frame = session.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.protocol, 1002);
        assert_eq!(frame.customer, 3);
        assert_eq!(&frame.body[..], b"payload");
    }

    #[tokio::test]
    async fn partial_reads_yield_identical_frame() {
        let body: Vec<u8> = (0..=255u8).collect();
        let wire = encode_frame(1002, 42, &token(), &body).unwrap();

        // Feed the same message in 1-byte, 7-byte, and whole chunks.
        for step in [1usize, 7, wire.len()] {
            let (near, mut far) = tokio::io::duplex(16);
            let mut session = Session::new(near, token());

            let wire = wire.clone();
            let writer = tokio::spawn(async move {
                for piece in wire.chunks(step) {
                    far.write_all(piece).await.unwrap();
                    far.flush().await.unwrap();
                }
                far
            });

            let frame = session.next_frame().await.unwrap().unwrap();
            assert_eq!(frame.protocol, 1002);
            assert_eq!(frame.customer, 42);
            assert_eq!(&frame.body[..], &body[..]);
            drop(writer.await.unwrap());
        }
    }

    #[tokio::test]
    async fn zero_length_body_dispatches_immediately() {
        let (near, mut far) = tokio::io::duplex(4096);
        let mut session = Session::new(near, token());

        let wire = encode_frame(1001, 0, &token(), &[]).unwrap();
        far.write_all(&wire).await.unwrap();

        let frame = session.next_frame().await.unwrap().unwrap();
        assert!(frame.body.is_empty());
    }

    #[tokio::test]
    async fn token_mismatch_closes_without_dispatch() {
        let (near, mut far) = tokio::io::duplex(4096);
        let mut session = Session::new(near, token());

        let mut wrong = token();
        wrong[7] ^= 0x20;
        let wire = encode_frame(1002, 1, &wrong, b"garbage").unwrap();
        far.write_all(&wire).await.unwrap();

        let handler = CountingHandler::new();
        session.run(&handler).await;

        assert!(handler.frames.lock().unwrap().is_empty());
        assert_eq!(handler.closed.load(Ordering::SeqCst), 1);
        assert_eq!(handler.errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn graceful_close_notifies_collaborator() {
        let (near, far) = tokio::io::duplex(4096);
        let mut session = Session::new(near, token());
        drop(far);

        let handler = CountingHandler::new();
        session.run(&handler).await;
        assert_eq!(handler.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn back_to_back_frames_processed_in_order() {
        let (near, mut far) = tokio::io::duplex(4096);
        let mut session = Session::new(near, token());

        for i in 0..5u32 {
            let wire = encode_frame(1002, i, &token(), &i.to_le_bytes()).unwrap();
            far.write_all(&wire).await.unwrap();
        }
        drop(far);

        let handler = CountingHandler::new();
        session.run(&handler).await;

        let frames = handler.frames.lock().unwrap();
        assert_eq!(frames.len(), 5);
        for (i, (_, customer, body)) in frames.iter().enumerate() {
            assert_eq!(*customer, i as u32);
            assert_eq!(body[..], (i as u32).to_le_bytes()[..]);
        }
    }

    #[tokio::test]
    async fn concurrent_sends_never_interleave() {
        // A tiny duplex buffer forces many partial writes per frame.
        let (near, far) = tokio::io::duplex(16);
        let session = Session::new(near, token());

        let big_a = vec![0xAAu8; 8 * 1024];
        let big_b = vec![0xBBu8; 8 * 1024];

        let sender_a = session.sender();
        let sender_b = session.sender();
        let a = {
            let body = big_a.clone();
            tokio::spawn(async move { sender_a.send(1002, 1, &body).await })
        };
        let b = {
            let body = big_b.clone();
            tokio::spawn(async move { sender_b.send(1002, 2, &body).await })
        };

        // Drain the far end through a session to parse frames back out.
        let mut peer = Session::new(far, token());
        let first = peer.next_frame().await.unwrap().unwrap();
        let second = peer.next_frame().await.unwrap().unwrap();

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Whichever order the gate granted, each body must be intact.
        let mut got = [first, second];
        got.sort_by_key(|f| f.customer);
        assert_eq!(&got[0].body[..], &big_a[..]);
        assert_eq!(&got[1].body[..], &big_b[..]);
    }
}
