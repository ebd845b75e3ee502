//! OTA chunk wire format.
//!
//! Every GATT write to the OTA characteristic carries one chunk:
//!
//! ```text
//! [offset: u32 LE][length: u32 LE][payload: length bytes]
//! ```
//!
//! `offset` addresses image data, `length` must match the payload bytes that
//! are actually present. With the default 20-byte BLE write ceiling the
//! payload is at most 12 bytes.
//!
//! # Example
//!
//! ```
//! use ota_rs_esp32::ota::{decode, PacketHeader, HEADER_SIZE};
//!
//! let mut buf = [0u8; HEADER_SIZE + 3];
//! PacketHeader { offset: 4, length: 3 }.encode(&mut buf).unwrap();
//! buf[HEADER_SIZE..].copy_from_slice(&[7, 8, 9]);
//!
//! let packet = decode(&buf, 12).unwrap();
//! assert_eq!(packet.header.offset, 4);
//! assert_eq!(packet.payload, &[7, 8, 9]);
//! ```

use super::error::ErrorKind;

/// Header size in bytes (offset + length).
pub const HEADER_SIZE: usize = 8;

/// Decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    /// Byte offset of this chunk within the image.
    pub offset: u32,
    /// Number of payload bytes following the header.
    pub length: u32,
}

impl PacketHeader {
    /// Parse the header fields from the first 8 bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, ErrorKind> {
        if buf.len() < HEADER_SIZE {
            return Err(ErrorKind::MalformedHeader);
        }
        Ok(Self {
            offset: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            length: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// Serialize the header to its 8-byte wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.offset.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }

    /// Write the header into the first 8 bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        if buf.len() < HEADER_SIZE {
            return Err(ErrorKind::MalformedHeader);
        }
        buf[..HEADER_SIZE].copy_from_slice(&self.to_bytes());
        Ok(())
    }
}

/// One decoded chunk, borrowing its payload from the incoming buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    /// Chunk header.
    pub header: PacketHeader,
    /// Payload bytes (exactly `header.length` of them).
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// True if this chunk claims to start a transfer.
    #[inline]
    pub fn is_first(&self) -> bool {
        self.header.offset == 0
    }

    /// Serialize header and payload back into wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(self.payload);
        bytes
    }
}

/// Decode a raw GATT write into a packet.
///
/// Fails with `MalformedHeader` if the buffer cannot hold a header, if the
/// declared length disagrees with the bytes present, or if the chunk is
/// empty. Fails with `PayloadOverflow` if the declared length exceeds
/// `max_payload`.
pub fn decode(buf: &[u8], max_payload: usize) -> Result<Packet<'_>, ErrorKind> {
    let header = PacketHeader::parse(buf)?;
    let declared = header.length as usize;

    if declared > max_payload {
        return Err(ErrorKind::PayloadOverflow);
    }
    if declared != buf.len() - HEADER_SIZE || declared == 0 {
        return Err(ErrorKind::MalformedHeader);
    }

    Ok(Packet {
        header,
        payload: &buf[HEADER_SIZE..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(offset: u32, length: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        PacketHeader { offset, length }.encode(&mut buf).unwrap();
        buf.extend_from_slice(payload);
        buf
    }

    // ==================== Header Tests ====================

    #[test]
    fn test_header_little_endian() {
        let header = PacketHeader::parse(&[0x04, 0x03, 0x02, 0x01, 0x0C, 0, 0, 0]).unwrap();
        assert_eq!(header.offset, 0x0102_0304);
        assert_eq!(header.length, 12);
    }

    #[test]
    fn test_header_encode_buffer_too_small() {
        let mut small = [0u8; 7];
        assert_eq!(
            PacketHeader { offset: 0, length: 0 }.encode(&mut small),
            Err(ErrorKind::MalformedHeader)
        );
    }

    // ==================== Decode Tests ====================

    #[test]
    fn test_decode_valid_packet() {
        let buf = raw(16, 3, &[1, 2, 3]);
        let packet = decode(&buf, 12).unwrap();
        assert_eq!(packet.header.offset, 16);
        assert_eq!(packet.payload, &[1, 2, 3]);
        assert!(!packet.is_first());
        assert_eq!(packet.to_bytes(), buf);
    }

    #[test]
    fn test_decode_payload_is_a_view() {
        let buf = raw(0, 2, &[9, 9]);
        let packet = decode(&buf, 12).unwrap();
        assert!(std::ptr::eq(packet.payload.as_ptr(), buf[HEADER_SIZE..].as_ptr()));
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(decode(&[], 12), Err(ErrorKind::MalformedHeader));
        assert_eq!(decode(&[0; 7], 12), Err(ErrorKind::MalformedHeader));
    }

    #[test]
    fn test_decode_length_beyond_buffer() {
        let buf = raw(0, 5, &[1, 2, 3]);
        assert_eq!(decode(&buf, 12), Err(ErrorKind::MalformedHeader));
    }

    #[test]
    fn test_decode_trailing_bytes_rejected() {
        // No implicit truncation: extra bytes after the declared payload
        let buf = raw(0, 2, &[1, 2, 3]);
        assert_eq!(decode(&buf, 12), Err(ErrorKind::MalformedHeader));
    }

    #[test]
    fn test_decode_empty_payload_rejected() {
        let buf = raw(4, 0, &[]);
        assert_eq!(decode(&buf, 12), Err(ErrorKind::MalformedHeader));
    }

    #[test]
    fn test_decode_payload_overflow() {
        let buf = raw(0, 13, &[0; 13]);
        assert_eq!(decode(&buf, 12), Err(ErrorKind::PayloadOverflow));

        // Huge declared length is an overflow, not an arithmetic hazard
        let buf = raw(0, u32::MAX, &[0; 4]);
        assert_eq!(decode(&buf, 12), Err(ErrorKind::PayloadOverflow));
    }

    #[test]
    fn test_decode_max_payload_exact() {
        let buf = raw(0, 12, &[0xAB; 12]);
        assert_eq!(decode(&buf, 12).unwrap().payload.len(), 12);
    }
}
