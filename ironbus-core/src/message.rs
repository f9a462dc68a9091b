//! Protocol code definitions.
//!
//! Uses proper enums with `TryFrom` — no panics on unknown values.
//! Arbitrary caller-defined codes travel as raw `u32`s; this enum only
//! names the codes the transport itself interprets.

use crate::error::BusError;
use std::fmt;

// ── ProtocolCode ─────────────────────────────────────────────────

/// Message kinds the transport core interprets.
///
/// Any other `u32` is a caller-defined code that is handed to the
/// dispatch callback untouched.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolCode {
    /// Body is a UTF-8 string.
    UserString = 1001,
    /// Body is an opaque byte payload.
    UserBytes = 1002,
}

impl TryFrom<u32> for ProtocolCode {
    type Error = BusError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1001 => Ok(ProtocolCode::UserString),
            1002 => Ok(ProtocolCode::UserBytes),
            _ => Err(BusError::UnknownVariant {
                type_name: "ProtocolCode",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for ProtocolCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolCode::UserString => write!(f, "UserString"),
            ProtocolCode::UserBytes => write!(f, "UserBytes"),
        }
    }
}

// ── File-head customer codes ─────────────────────────────────────

/// Customer code of the metadata frame when the requested file does
/// not exist on the sending side (body is empty).
pub const FILE_HEAD_ABSENT: u32 = 0;

/// Customer code of the metadata frame when the file exists and a
/// stream transfer follows.
pub const FILE_HEAD_PRESENT: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_code_roundtrip() {
        for code in [ProtocolCode::UserString, ProtocolCode::UserBytes] {
            assert_eq!(ProtocolCode::try_from(code as u32).unwrap(), code);
        }
    }

    #[test]
    fn protocol_code_invalid() {
        assert!(ProtocolCode::try_from(0xDEAD).is_err());
    }

    #[test]
    fn display_format() {
        assert_eq!(ProtocolCode::UserString.to_string(), "UserString");
        assert_eq!(ProtocolCode::UserBytes.to_string(), "UserBytes");
    }
}
