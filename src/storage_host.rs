//! File-backed image storage for host (development) builds.
//!
//! Chunks land in a staging file next to the target path; only a finalized
//! session is renamed into place. The staging file is truncated when a
//! session writes its first chunk, and an image already at the target path
//! is only removed when this writer finalized it. Uses
//! `~/.ota-rs-esp32/firmware.bin` by default.
//!
//! # Usage
//!
//! ```ignore
//! use ota_rs_esp32::config::OtaConfig;
//! use ota_rs_esp32::ota::TransferSession;
//! use ota_rs_esp32::storage_host::FileChunkWriter;
//!
//! let writer = FileChunkWriter::at_default_path()?;
//! let mut session = TransferSession::new(writer, &OtaConfig::default());
//! ```

use crate::ota::{ChunkWriter, SessionId, WriteFailed};
use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Get the default image file path.
///
/// Returns `~/.ota-rs-esp32/firmware.bin`
pub fn default_image_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home)
        .join(".ota-rs-esp32")
        .join("firmware.bin"))
}

/// Chunk writer that reconstructs the image into a file.
#[derive(Debug)]
pub struct FileChunkWriter {
    path: PathBuf,
    staging: PathBuf,
    file: Option<File>,
    /// Session whose image this writer renamed into place.
    finalized: Option<SessionId>,
}

impl FileChunkWriter {
    /// Create a writer targeting `path`, creating parent directories.
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let staging = path.with_extension("part");
        Ok(Self {
            path,
            staging,
            file: None,
            finalized: None,
        })
    }

    /// Create a writer targeting [`default_image_path`].
    pub fn at_default_path() -> io::Result<Self> {
        Self::new(default_image_path()?)
    }

    /// Path of the finalized image.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path chunks are written to before finalization.
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    /// Open handle to the staging file, truncating leftovers from a
    /// previous run on first use.
    fn staging_file(&mut self) -> io::Result<&mut File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&self.staging)?,
        };
        Ok(self.file.insert(file))
    }

    fn write_at(&mut self, offset: u32, bytes: &[u8]) -> io::Result<()> {
        let file = self.staging_file()?;
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(bytes)
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl ChunkWriter for FileChunkWriter {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), WriteFailed> {
        self.write_at(offset, bytes)
            .map_err(|e| WriteFailed::new(offset, e.to_string()))
    }

    fn invalidate(&mut self, session: SessionId) -> Result<(), WriteFailed> {
        self.file = None;
        remove_if_exists(&self.staging).map_err(|e| WriteFailed::new(0, e.to_string()))?;

        if self.finalized == Some(session) {
            remove_if_exists(&self.path).map_err(|e| WriteFailed::new(0, e.to_string()))?;
            self.finalized = None;
            debug!("Session {} invalidated: {:?} removed", session, self.path);
        } else {
            debug!("Session {} invalidated: staging cleared", session);
        }
        Ok(())
    }

    fn finalize(&mut self, session: SessionId, total_length: u32) -> Result<(), WriteFailed> {
        let fail = |e: io::Error| WriteFailed::new(total_length, e.to_string());

        let file = self.staging_file().map_err(fail)?;
        file.sync_all().map_err(fail)?;
        self.file = None;

        // Verify by reading back the staged length before publishing
        let staged = fs::metadata(&self.staging).map_err(fail)?.len();
        if staged != total_length as u64 {
            return Err(WriteFailed::new(
                total_length,
                format!("staged {} bytes, expected {}", staged, total_length),
            ));
        }

        fs::rename(&self.staging, &self.path).map_err(fail)?;
        self.finalized = Some(session);
        info!("Session {} image saved to {:?}", session, self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OtaConfig;
    use crate::ota::{Chunker, Status, TransferSession};
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Counter to ensure unique test files even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_image_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir()
            .join(format!("ota-test-{}-{}", pid, id))
            .join("firmware.bin")
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_out_of_order_offsets_land_in_place() {
        let path = unique_image_path();
        let mut writer = FileChunkWriter::new(&path).expect("Failed to create writer");

        writer.write(4, &[5, 6, 7, 8]).unwrap();
        writer.write(0, &[1, 2, 3, 4]).unwrap();
        writer.finalize(SessionId(1), 8).unwrap();

        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!writer.staging_path().exists());

        cleanup(&path);
    }

    #[test]
    fn test_finalize_length_mismatch() {
        let path = unique_image_path();
        let mut writer = FileChunkWriter::new(&path).expect("Failed to create writer");

        writer.write(0, &[1, 2, 3]).unwrap();
        assert!(writer.finalize(SessionId(1), 10).is_err());
        assert!(!path.exists());

        cleanup(&path);
    }

    #[test]
    fn test_invalidate_removes_image() {
        let path = unique_image_path();
        let mut writer = FileChunkWriter::new(&path).expect("Failed to create writer");

        writer.write(0, &[1, 2]).unwrap();
        writer.finalize(SessionId(1), 2).unwrap();
        assert!(path.exists());

        writer.invalidate(SessionId(1)).unwrap();
        assert!(!path.exists());

        // Invalidating twice is harmless
        writer.invalidate(SessionId(1)).unwrap();

        cleanup(&path);
    }

    #[test]
    fn test_leftover_staging_file_is_truncated() {
        let path = unique_image_path();
        let mut writer = FileChunkWriter::new(&path).expect("Failed to create writer");
        fs::write(writer.staging_path(), vec![0xEE; 4096]).unwrap();

        writer.write(0, &[1, 2, 3]).unwrap();
        writer.finalize(SessionId(1), 3).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);

        cleanup(&path);
    }

    #[test]
    fn test_invalidate_keeps_image_it_did_not_write() {
        let path = unique_image_path();
        let mut writer = FileChunkWriter::new(&path).expect("Failed to create writer");
        fs::write(&path, [9, 9, 9]).unwrap();

        writer.write(0, &[1, 2]).unwrap();
        writer.invalidate(SessionId(1)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![9, 9, 9]);
        assert!(!writer.staging_path().exists());

        // A finalized image is only removed by its own session
        writer.write(0, &[4, 5]).unwrap();
        writer.finalize(SessionId(2), 2).unwrap();
        writer.invalidate(SessionId(3)).unwrap();
        assert!(path.exists());
        writer.invalidate(SessionId(2)).unwrap();
        assert!(!path.exists());

        cleanup(&path);
    }

    #[test]
    fn test_aborted_transfer_keeps_previous_image() {
        let path = unique_image_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"previous image").unwrap();

        let config = OtaConfig::default();
        let image: Vec<u8> = (0..100).collect();
        let packets = Chunker::new(&config).chunk(&image, 1).unwrap();

        let writer = FileChunkWriter::new(&path).expect("Failed to create writer");
        let mut session = TransferSession::new(writer, &config);
        assert_eq!(session.on_write(&packets[0]), Status::Accepted);
        assert!(matches!(session.on_write(&packets[2]), Status::Aborted(_)));

        assert_eq!(fs::read(&path).unwrap(), b"previous image".to_vec());

        cleanup(&path);
    }

    #[test]
    fn test_session_reconstructs_file() {
        let path = unique_image_path();
        let config = OtaConfig::default();
        let image: Vec<u8> = (0..=255).cycle().take(700).collect();

        let writer = FileChunkWriter::new(&path).expect("Failed to create writer");
        let mut session = TransferSession::new(writer, &config);
        let mut status = Status::Accepted;
        for packet in Chunker::new(&config).chunk(&image, 1).unwrap() {
            status = session.on_write(&packet);
        }

        assert_eq!(status, Status::AcceptedFinal);
        assert_eq!(fs::read(&path).unwrap(), image);

        cleanup(&path);
    }
}
