//! Storage capability used by the transfer session.
//!
//! The session never touches a storage medium directly. It hands validated
//! image bytes to a [`ChunkWriter`] and asks it to [`invalidate`] whatever a
//! failed or superseded session left behind.
//!
//! [`invalidate`]: ChunkWriter::invalidate

use std::fmt;

/// Identifier of one transfer attempt, incremented on every session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Storage failure reported by a chunk writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailed {
    /// Image offset the failed operation targeted (0 for invalidation).
    pub offset: u32,
    /// Backend-specific description.
    pub reason: String,
}

impl WriteFailed {
    /// Create a new write failure.
    pub fn new(offset: u32, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for WriteFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write failed at offset {}: {}", self.offset, self.reason)
    }
}

impl std::error::Error for WriteFailed {}

/// Sink that durably stores image bytes.
///
/// `write` may be called again with identical bytes at the same offset when
/// the sender retransmits. `invalidate` must be cheap: it marks the pending
/// slot dirty rather than erasing it.
pub trait ChunkWriter {
    /// Store `bytes` at image `offset`.
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), WriteFailed>;

    /// Discard everything written for `session`.
    fn invalidate(&mut self, session: SessionId) -> Result<(), WriteFailed>;

    /// Called once the last byte of `session` has been written.
    fn finalize(&mut self, _session: SessionId, _total_length: u32) -> Result<(), WriteFailed> {
        Ok(())
    }
}

impl<W: ChunkWriter + ?Sized> ChunkWriter for &mut W {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), WriteFailed> {
        (**self).write(offset, bytes)
    }

    fn invalidate(&mut self, session: SessionId) -> Result<(), WriteFailed> {
        (**self).invalidate(session)
    }

    fn finalize(&mut self, session: SessionId, total_length: u32) -> Result<(), WriteFailed> {
        (**self).finalize(session, total_length)
    }
}

/// Operation recorded by [`MemoryWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterOp {
    /// Bytes stored at an offset.
    Write { offset: u32, len: usize },
    /// Session discarded.
    Invalidate(SessionId),
    /// Session finished.
    Finalize(SessionId),
}

/// RAM-backed chunk writer.
///
/// Keeps the image in a `Vec` and records every operation, which makes it the
/// reference sink for host testing. `max_len` bounds the slot like a flash
/// partition would.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    image: Vec<u8>,
    ops: Vec<WriterOp>,
    max_len: Option<usize>,
    valid: bool,
}

impl MemoryWriter {
    /// Create an unbounded writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer whose slot holds at most `max_len` bytes.
    pub fn with_capacity_limit(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    /// Current slot contents.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// True once a session has been finalized and not invalidated since.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// All operations in the order they happened.
    pub fn ops(&self) -> &[WriterOp] {
        &self.ops
    }

    /// Number of `write` calls.
    pub fn write_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, WriterOp::Write { .. }))
            .count()
    }

    /// Sessions that were invalidated, in order.
    pub fn invalidated(&self) -> Vec<SessionId> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                WriterOp::Invalidate(id) => Some(*id),
                _ => None,
            })
            .collect()
    }
}

impl ChunkWriter for MemoryWriter {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), WriteFailed> {
        let start = offset as usize;
        let end = start + bytes.len();
        if let Some(max) = self.max_len {
            if end > max {
                return Err(WriteFailed::new(
                    offset,
                    format!("slot full ({} > {} bytes)", end, max),
                ));
            }
        }
        if self.image.len() < end {
            self.image.resize(end, 0);
        }
        self.image[start..end].copy_from_slice(bytes);
        self.valid = false;
        self.ops.push(WriterOp::Write {
            offset,
            len: bytes.len(),
        });
        Ok(())
    }

    fn invalidate(&mut self, session: SessionId) -> Result<(), WriteFailed> {
        self.image.clear();
        self.valid = false;
        self.ops.push(WriterOp::Invalidate(session));
        Ok(())
    }

    fn finalize(&mut self, session: SessionId, total_length: u32) -> Result<(), WriteFailed> {
        if self.image.len() != total_length as usize {
            return Err(WriteFailed::new(
                0,
                format!(
                    "slot holds {} bytes, expected {}",
                    self.image.len(),
                    total_length
                ),
            ));
        }
        self.valid = true;
        self.ops.push(WriterOp::Finalize(session));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_writer_writes_at_offset() {
        let mut writer = MemoryWriter::new();
        writer.write(4, &[5, 6]).unwrap();
        writer.write(0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(writer.image(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(writer.write_count(), 2);
    }

    #[test]
    fn test_memory_writer_rewrite_same_bytes() {
        let mut writer = MemoryWriter::new();
        writer.write(0, &[1, 2]).unwrap();
        writer.write(0, &[1, 2]).unwrap();
        assert_eq!(writer.image(), &[1, 2]);
    }

    #[test]
    fn test_memory_writer_invalidate() {
        let mut writer = MemoryWriter::new();
        writer.write(0, &[1, 2]).unwrap();
        writer.finalize(SessionId(1), 2).unwrap();
        assert!(writer.is_valid());

        writer.invalidate(SessionId(1)).unwrap();
        assert!(writer.image().is_empty());
        assert!(!writer.is_valid());
        assert_eq!(writer.invalidated(), vec![SessionId(1)]);
    }

    #[test]
    fn test_memory_writer_capacity_limit() {
        let mut writer = MemoryWriter::with_capacity_limit(4);
        assert!(writer.write(0, &[1, 2, 3, 4]).is_ok());
        let err = writer.write(4, &[5]).unwrap_err();
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn test_memory_writer_finalize_length_mismatch() {
        let mut writer = MemoryWriter::new();
        writer.write(0, &[1, 2]).unwrap();
        assert!(writer.finalize(SessionId(3), 5).is_err());
        assert!(!writer.is_valid());
    }

    #[test]
    fn test_write_failed_display() {
        let err = WriteFailed::new(16, "flash busy");
        assert_eq!(err.to_string(), "write failed at offset 16: flash busy");
    }
}
