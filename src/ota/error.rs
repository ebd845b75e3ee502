//! Error kinds reported by the OTA receiver.

use std::fmt;

/// ATT error: the attribute value length is invalid.
pub const ATT_ERR_INVALID_ATTR_VALUE_LEN: u8 = 0x0D;

/// ATT error: the request was not completed for an unlikely reason.
pub const ATT_ERR_UNLIKELY: u8 = 0x0E;

/// Why a packet was rejected or a session was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Buffer too short for a header, or declared length disagrees with the
    /// bytes present.
    MalformedHeader,
    /// Declared length exceeds the transport payload ceiling, or the chunk
    /// would run past the declared image length.
    PayloadOverflow,
    /// First packet failed magic/version/length checks.
    SignatureInvalid,
    /// A transfer tried to start at a non-zero offset.
    OutOfOrderStart,
    /// Chunk offset is neither the expected one, the previous one, nor zero.
    SequenceGap,
    /// Non-zero offset arrived while no transfer is active.
    NoActiveSession,
    /// The storage collaborator failed to persist or discard bytes.
    WriteFailed,
}

impl ErrorKind {
    /// ATT application error code to hand back to the GATT client.
    pub fn att_error_code(&self) -> u8 {
        match self {
            Self::MalformedHeader | Self::PayloadOverflow => ATT_ERR_INVALID_ATTR_VALUE_LEN,
            _ => ATT_ERR_UNLIKELY,
        }
    }

    /// Short identifier for status strings and log records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedHeader => "malformed_header",
            Self::PayloadOverflow => "payload_overflow",
            Self::SignatureInvalid => "signature_invalid",
            Self::OutOfOrderStart => "out_of_order_start",
            Self::SequenceGap => "sequence_gap",
            Self::NoActiveSession => "no_active_session",
            Self::WriteFailed => "write_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedHeader => write!(f, "malformed packet header"),
            Self::PayloadOverflow => write!(f, "payload exceeds allowed length"),
            Self::SignatureInvalid => write!(f, "image signature or version rejected"),
            Self::OutOfOrderStart => write!(f, "transfer must start at offset 0"),
            Self::SequenceGap => write!(f, "gap in chunk sequence"),
            Self::NoActiveSession => write!(f, "no active transfer session"),
            Self::WriteFailed => write!(f, "storage write failed"),
        }
    }
}

impl std::error::Error for ErrorKind {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_att_error_codes() {
        assert_eq!(
            ErrorKind::MalformedHeader.att_error_code(),
            ATT_ERR_INVALID_ATTR_VALUE_LEN
        );
        assert_eq!(ErrorKind::SequenceGap.att_error_code(), ATT_ERR_UNLIKELY);
        assert_eq!(ErrorKind::SignatureInvalid.att_error_code(), ATT_ERR_UNLIKELY);
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::SequenceGap.to_string(), "gap in chunk sequence");
        assert_eq!(ErrorKind::NoActiveSession.as_str(), "no_active_session");
    }
}
