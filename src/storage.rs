//! OTA partition storage for ESP32 builds.
//!
//! Writes image chunks into the next OTA application partition through the
//! ESP-IDF OTA API. The partition is opened lazily on the first write of a
//! session; invalidating a session aborts the pending update, and
//! invalidating a finalized one points the bootloader back at the running
//! firmware.
//!
//! # Usage
//!
//! ```ignore
//! use ota_rs_esp32::storage::EspOtaWriter;
//!
//! let writer = EspOtaWriter::new();
//! let mut session = TransferSession::new(writer, &config);
//! ```

use crate::ota::{ChunkWriter, SessionId, WriteFailed};
use esp_idf_sys::{esp, esp_ota_handle_t, esp_partition_t, EspError};
use log::{debug, info, warn};
use std::ffi::c_void;

/// Chunk writer over the inactive OTA partition.
#[derive(Debug, Default)]
pub struct EspOtaWriter {
    /// Open OTA handle for the session being written.
    handle: Option<esp_ota_handle_t>,
    /// Session whose image is currently set as boot partition.
    finalized: Option<SessionId>,
}

impl EspOtaWriter {
    /// Create a writer; nothing is touched until the first chunk arrives.
    pub fn new() -> Self {
        Self::default()
    }

    fn update_partition() -> Result<*const esp_partition_t, WriteFailed> {
        // SAFETY: a null start returns a pointer into the static partition table
        let partition =
            unsafe { esp_idf_sys::esp_ota_get_next_update_partition(std::ptr::null()) };
        if partition.is_null() {
            return Err(WriteFailed::new(0, "no OTA update partition"));
        }
        Ok(partition)
    }

    fn begin(&mut self) -> Result<esp_ota_handle_t, WriteFailed> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }

        let partition = Self::update_partition()?;
        let mut handle: esp_ota_handle_t = 0;
        // SAFETY: partition comes from the partition table, handle is a valid out pointer
        esp!(unsafe {
            esp_idf_sys::esp_ota_begin(
                partition,
                esp_idf_sys::OTA_SIZE_UNKNOWN as usize,
                &mut handle,
            )
        })
        .map_err(|e| esp_failure(0, e))?;

        info!("OTA partition opened for writing");
        self.handle = Some(handle);
        Ok(handle)
    }

    fn restore_boot_partition(&self) -> Result<(), EspError> {
        // SAFETY: the running partition pointer is valid for the program lifetime
        esp!(unsafe {
            esp_idf_sys::esp_ota_set_boot_partition(esp_idf_sys::esp_ota_get_running_partition())
        })
    }
}

fn esp_failure(offset: u32, e: EspError) -> WriteFailed {
    WriteFailed::new(offset, format!("{:?}", e))
}

impl ChunkWriter for EspOtaWriter {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), WriteFailed> {
        let handle = self.begin()?;
        // SAFETY: bytes is a live slice for the duration of the call
        esp!(unsafe {
            esp_idf_sys::esp_ota_write_with_offset(
                handle,
                bytes.as_ptr() as *const c_void,
                bytes.len(),
                offset,
            )
        })
        .map_err(|e| esp_failure(offset, e))
    }

    fn invalidate(&mut self, session: SessionId) -> Result<(), WriteFailed> {
        if let Some(handle) = self.handle.take() {
            // SAFETY: handle was returned by esp_ota_begin and not yet ended
            esp!(unsafe { esp_idf_sys::esp_ota_abort(handle) }).map_err(|e| esp_failure(0, e))?;
            debug!("Session {} OTA update aborted", session);
        }

        if self.finalized.take().is_some() {
            self.restore_boot_partition()
                .map_err(|e| esp_failure(0, e))?;
            warn!("Session {} image discarded, boot partition restored", session);
        }
        Ok(())
    }

    fn finalize(&mut self, session: SessionId, total_length: u32) -> Result<(), WriteFailed> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| WriteFailed::new(total_length, "no OTA update in progress"))?;

        // SAFETY: handle was returned by esp_ota_begin; esp_ota_end frees it
        esp!(unsafe { esp_idf_sys::esp_ota_end(handle) })
            .map_err(|e| esp_failure(total_length, e))?;

        let partition = Self::update_partition()?;
        // SAFETY: partition comes from the partition table
        esp!(unsafe { esp_idf_sys::esp_ota_set_boot_partition(partition) })
            .map_err(|e| esp_failure(total_length, e))?;

        self.finalized = Some(session);
        info!(
            "Session {} image verified ({} bytes), set as boot partition",
            session, total_length
        );
        Ok(())
    }
}
