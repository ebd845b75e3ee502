//! Image metadata carried by the first chunk of a transfer.
//!
//! # Metadata Format
//!
//! The payload of the offset-0 chunk starts with an 8-byte header:
//! ```text
//! [magic: u16 LE][version: u16 LE][total_length: u32 LE][image data...]
//! ```
//!
//! `total_length` counts image data bytes only. The metadata itself is not
//! part of the image and is never handed to the chunk writer.

use super::error::ErrorKind;
use crate::config::OtaConfig;

/// Size of the metadata header at the start of the first chunk.
pub const METADATA_SIZE: usize = 8;

/// Default image magic (matches the OTA characteristic short UUID).
pub const DEFAULT_MAGIC: u16 = 0x0A0A;

/// Parsed image metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Signature constant identifying an OTA image.
    pub magic: u16,
    /// Firmware version of the image.
    pub version: u16,
    /// Declared image length in bytes.
    pub total_length: u32,
}

impl ImageHeader {
    /// Parse metadata from the start of a first-chunk payload.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < METADATA_SIZE {
            return None;
        }
        Some(Self {
            magic: u16::from_le_bytes([payload[0], payload[1]]),
            version: u16::from_le_bytes([payload[2], payload[3]]),
            total_length: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
        })
    }

    /// Serialize metadata to its 8-byte wire form.
    pub fn to_bytes(&self) -> [u8; METADATA_SIZE] {
        let mut bytes = [0u8; METADATA_SIZE];
        bytes[0..2].copy_from_slice(&self.magic.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.total_length.to_le_bytes());
        bytes
    }
}

/// Validates the first chunk of a candidate transfer before anything is
/// written to storage. Fails closed.
#[derive(Debug, Clone)]
pub struct ImageValidator {
    magic: u16,
    min_version: u16,
    max_version: u16,
}

impl ImageValidator {
    /// Create a validator accepting `magic` and versions in
    /// `min_version..=max_version`.
    pub fn new(magic: u16, min_version: u16, max_version: u16) -> Self {
        Self {
            magic,
            min_version,
            max_version,
        }
    }

    /// Create a validator from the receiver configuration.
    pub fn from_config(config: &OtaConfig) -> Self {
        Self::new(config.magic, config.min_version, config.max_version)
    }

    /// Check a first-chunk payload.
    ///
    /// Checks, in order: metadata present, magic, version range, then a
    /// non-empty image whose first data bytes fit inside it. Any failure is
    /// `SignatureInvalid`.
    pub fn validate(&self, payload: &[u8]) -> Result<ImageHeader, ErrorKind> {
        let header = ImageHeader::parse(payload).ok_or(ErrorKind::SignatureInvalid)?;

        if header.magic != self.magic {
            log::debug!("Image magic mismatch: {:#06x}", header.magic);
            return Err(ErrorKind::SignatureInvalid);
        }
        if header.version < self.min_version || header.version > self.max_version {
            log::debug!(
                "Image version {} outside {}..={}",
                header.version,
                self.min_version,
                self.max_version
            );
            return Err(ErrorKind::SignatureInvalid);
        }

        let data_len = (payload.len() - METADATA_SIZE) as u64;
        if header.total_length == 0 || data_len == 0 || data_len > header.total_length as u64 {
            log::debug!(
                "Image length rejected: total={} first_chunk_data={}",
                header.total_length,
                data_len
            );
            return Err(ErrorKind::SignatureInvalid);
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_payload(magic: u16, version: u16, total: u32, data: &[u8]) -> Vec<u8> {
        let mut payload = ImageHeader {
            magic,
            version,
            total_length: total,
        }
        .to_bytes()
        .to_vec();
        payload.extend_from_slice(data);
        payload
    }

    fn validator() -> ImageValidator {
        ImageValidator::new(DEFAULT_MAGIC, 1, 5)
    }

    #[test]
    fn test_parse_layout() {
        let header = ImageHeader::parse(&[0x0A, 0x0A, 0x02, 0x00, 24, 0, 0, 0]).unwrap();
        assert_eq!(header.magic, 0x0A0A);
        assert_eq!(header.version, 2);
        assert_eq!(header.total_length, 24);
    }

    #[test]
    fn test_valid_first_chunk() {
        let payload = first_payload(DEFAULT_MAGIC, 3, 24, &[1, 2, 3, 4]);
        let header = validator().validate(&payload).unwrap();
        assert_eq!(header.total_length, 24);
        assert_eq!(header.version, 3);
    }

    #[test]
    fn test_short_read_rejected() {
        assert_eq!(
            validator().validate(&[0x0A, 0x0A, 1, 0]),
            Err(ErrorKind::SignatureInvalid)
        );
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let payload = first_payload(0xBEEF, 3, 24, &[1]);
        assert_eq!(validator().validate(&payload), Err(ErrorKind::SignatureInvalid));
    }

    #[test]
    fn test_version_range_bounds() {
        let v = validator();
        assert!(v.validate(&first_payload(DEFAULT_MAGIC, 1, 8, &[1])).is_ok());
        assert!(v.validate(&first_payload(DEFAULT_MAGIC, 5, 8, &[1])).is_ok());
        assert_eq!(
            v.validate(&first_payload(DEFAULT_MAGIC, 0, 8, &[1])),
            Err(ErrorKind::SignatureInvalid)
        );
        assert_eq!(
            v.validate(&first_payload(DEFAULT_MAGIC, 6, 8, &[1])),
            Err(ErrorKind::SignatureInvalid)
        );
    }

    #[test]
    fn test_length_sanity() {
        let v = validator();
        // Empty image
        assert!(v.validate(&first_payload(DEFAULT_MAGIC, 1, 0, &[1])).is_err());
        // Metadata only, no data bytes
        assert!(v.validate(&first_payload(DEFAULT_MAGIC, 1, 8, &[])).is_err());
        // First chunk carries more data than the whole image
        assert!(v.validate(&first_payload(DEFAULT_MAGIC, 1, 2, &[1, 2, 3])).is_err());
        // First chunk carries exactly the whole image
        assert!(v.validate(&first_payload(DEFAULT_MAGIC, 1, 3, &[1, 2, 3])).is_ok());
    }
}
