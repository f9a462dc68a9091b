//! The fixed 32-byte frame header.
//!
//! Wire layout (all integers little-endian):
//!
//! ```text
//! [0..4]    protocol code   u32
//! [4..8]    customer code   u32
//! [8..24]   token           [u8; 16]
//! [24..28]  reserved        u32  (round-trips unchanged)
//! [28..32]  content length  i32  (≥ 0)
//! ```

use crate::error::BusError;

/// Size of the frame header on the wire. Never changes.
pub const HEADER_SIZE: usize = 32;

/// Size of the shared token embedded in every header.
pub const TOKEN_SIZE: usize = 16;

/// The shared identity value carried in header bytes 8..24.
///
/// Not a cryptographic secret — an anti-garbage check that rejects
/// frames which do not belong to this protocol family.
pub type Token = [u8; TOKEN_SIZE];

/// Raw bytes of one encoded header.
pub type HeaderBytes = [u8; HEADER_SIZE];

/// One decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message kind (user-bytes, user-string, or caller-defined).
    pub protocol: u32,
    /// Caller-defined sub-type / correlation id.
    pub customer: u32,
    /// Shared identity value.
    pub token: Token,
    /// Unused by the transport; preserved across a round-trip.
    pub reserved: u32,
    /// Byte length of the body that follows.
    pub length: i32,
}

impl FrameHeader {
    pub fn new(protocol: u32, customer: u32, token: Token, length: i32) -> Self {
        Self {
            protocol,
            customer,
            token,
            reserved: 0,
            length,
        }
    }

    pub fn to_bytes(&self) -> HeaderBytes {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.protocol.to_le_bytes());
        buf[4..8].copy_from_slice(&self.customer.to_le_bytes());
        buf[8..24].copy_from_slice(&self.token);
        buf[24..28].copy_from_slice(&self.reserved.to_le_bytes());
        buf[28..32].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: HeaderBytes) -> Result<Self, BusError> {
        let mut token = [0u8; TOKEN_SIZE];
        token.copy_from_slice(&bytes[8..24]);

        let length = i32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]);
        if length < 0 {
            return Err(BusError::InvalidHeader("negative content length"));
        }

        Ok(Self {
            protocol: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            customer: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            token,
            reserved: u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
            length,
        })
    }

    /// Body length as a `usize`. Valid because `from_bytes` rejects
    /// negative lengths.
    pub fn content_length(&self) -> usize {
        self.length as usize
    }
}

/// Byte-equal comparison over the 16-byte token window of a raw header.
///
/// `head` must hold at least [`HEADER_SIZE`] bytes.
pub fn token_matches(head: &[u8], expected: &Token) -> bool {
    head.len() >= HEADER_SIZE && &head[8..24] == expected
}
