//! Sender-side image chunking.
//!
//! Splits an image into OTA wire packets for a given MTU. The first packet
//! carries the image metadata followed by as many data bytes as still fit;
//! every later packet carries pure image data.
//!
//! # Example
//!
//! ```
//! use ota_rs_esp32::config::OtaConfig;
//! use ota_rs_esp32::ota::{Chunker, MemoryWriter, Status, TransferSession};
//!
//! let config = OtaConfig::default();
//! let image: Vec<u8> = (0..100).collect();
//! let packets = Chunker::new(&config).chunk(&image, 1).unwrap();
//!
//! let mut session = TransferSession::new(MemoryWriter::new(), &config);
//! let mut status = Status::Accepted;
//! for packet in &packets {
//!     status = session.on_write(packet);
//! }
//! assert_eq!(status, Status::AcceptedFinal);
//! assert_eq!(session.writer().image(), &image[..]);
//! ```

use super::image::{ImageHeader, METADATA_SIZE};
use super::packet::{PacketHeader, HEADER_SIZE};
use crate::config::OtaConfig;
use std::fmt;

/// Errors that can occur while chunking an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Image is empty.
    EmptyImage,
    /// Image does not fit the 32-bit length field.
    ImageTooLarge(usize),
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyImage => write!(f, "cannot chunk empty image"),
            Self::ImageTooLarge(len) => write!(f, "image too large: {} bytes", len),
        }
    }
}

impl std::error::Error for ChunkError {}

/// Splits images into OTA packets.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_payload: usize,
    magic: u16,
}

impl Chunker {
    /// Create a chunker matching a receiver configuration.
    ///
    /// The configuration is assumed to be validated; see
    /// [`OtaConfig::validate`].
    pub fn new(config: &OtaConfig) -> Self {
        Self {
            max_payload: config.max_payload(),
            magic: config.magic,
        }
    }

    /// Number of packets needed for an image of `len` bytes.
    pub fn packet_count(&self, len: usize) -> usize {
        let first_data = self.max_payload - METADATA_SIZE;
        if len <= first_data {
            1
        } else {
            1 + (len - first_data).div_ceil(self.max_payload)
        }
    }

    /// Split `image` into wire packets, tagging it with `version`.
    pub fn chunk(&self, image: &[u8], version: u16) -> Result<Vec<Vec<u8>>, ChunkError> {
        if image.is_empty() {
            return Err(ChunkError::EmptyImage);
        }
        let total_length =
            u32::try_from(image.len()).map_err(|_| ChunkError::ImageTooLarge(image.len()))?;

        let metadata = ImageHeader {
            magic: self.magic,
            version,
            total_length,
        };

        let mut packets = Vec::with_capacity(self.packet_count(image.len()));

        let first_data = image.len().min(self.max_payload - METADATA_SIZE);
        let mut first = Vec::with_capacity(HEADER_SIZE + METADATA_SIZE + first_data);
        first.extend_from_slice(&header_bytes(0, METADATA_SIZE + first_data));
        first.extend_from_slice(&metadata.to_bytes());
        first.extend_from_slice(&image[..first_data]);
        packets.push(first);

        let mut offset = first_data;
        while offset < image.len() {
            let len = (image.len() - offset).min(self.max_payload);
            let mut packet = Vec::with_capacity(HEADER_SIZE + len);
            packet.extend_from_slice(&header_bytes(offset, len));
            packet.extend_from_slice(&image[offset..offset + len]);
            packets.push(packet);
            offset += len;
        }

        Ok(packets)
    }
}

// Offsets and lengths fit u32: the image length was checked in `chunk`.
fn header_bytes(offset: usize, length: usize) -> [u8; HEADER_SIZE] {
    PacketHeader {
        offset: offset as u32,
        length: length as u32,
    }
    .to_bytes()
}
