//! BLE GATT service for OTA image transfer.
//!
//! # GATT Service Structure
//!
//! ```text
//! Service: OTA (00001905-0000-2000-9000-0f0e0d0c0b0a)
//! └── Image (Read, Write) - chunk writes in, progress string out
//! ```
//!
//! Each write carries one `[offset][length][payload]` chunk. The write
//! response carries an ATT error code when the chunk is rejected:
//! `0x0D` (invalid attribute value length) for malformed or oversized
//! chunks, `0x0E` (unlikely error) for everything else. Reading the
//! characteristic returns the session state, e.g. `in_progress:16/24`.
//!
//! # Security Considerations
//!
//! Images are accepted from any connected client whose first chunk carries
//! the configured magic and an allowed version. Deployments that need more
//! should enable BLE pairing and verify the image signature at boot.

use crate::config::OtaConfig;
use crate::ota::{ChunkWriter, SessionState, Status, TransferSession, TransferStats};
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{
    uuid128, BLEAdvertisementData, BLEDevice, BLEError, BLEServer, NimbleProperties,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// UUID for the OTA service.
pub const OTA_SERVICE_UUID: BleUuid = uuid128!("00001905-0000-2000-9000-0f0e0d0c0b0a");

/// UUID for the OTA image characteristic.
pub const OTA_CHAR_UUID: BleUuid = uuid128!("00000a0a-0000-2000-9000-0f0e0d0c0b0a");

/// BLE advertisement name.
const DEVICE_NAME: &str = "OTA-Receiver";

/// BLE GATT service feeding chunk writes into a transfer session.
pub struct OtaService<W> {
    session: Arc<Mutex<TransferSession<W>>>,
    stats: Arc<TransferStats>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<W: ChunkWriter + Send + 'static> OtaService<W> {
    /// Create and register the OTA BLE service.
    pub fn new(server: &mut BLEServer, writer: W, config: &OtaConfig) -> Self {
        let stats = Arc::new(TransferStats::new());
        let session = Arc::new(Mutex::new(
            TransferSession::new(writer, config).with_stats(Arc::clone(&stats)),
        ));

        let service = server.create_service(OTA_SERVICE_UUID);
        let image_char = service.lock().create_characteristic(
            OTA_CHAR_UUID,
            NimbleProperties::READ | NimbleProperties::WRITE,
        );

        let read_session = Arc::clone(&session);
        image_char.lock().on_read(move |char, _conn| {
            let session = lock(&read_session);
            char.set_value(session.state().to_ble_string().as_bytes());
        });

        let write_session = Arc::clone(&session);
        image_char.lock().on_write(move |args| {
            let status = lock(&write_session).on_write(args.recv_data());
            if let Status::Rejected(kind) | Status::Aborted(kind) = status {
                log::debug!("Responding to rejected chunk with ATT error: {}", kind);
                args.reject_with_error_code(status.att_error_code());
            }
        });

        Self { session, stats }
    }

    /// Start BLE advertising.
    pub fn start_advertising() -> Result<(), BLEError> {
        let device = BLEDevice::take();
        let advertising = device.get_advertising();

        advertising.lock().set_data(
            BLEAdvertisementData::new()
                .name(DEVICE_NAME)
                .add_service_uuid(OTA_SERVICE_UUID),
        )?;
        advertising.lock().start()?;
        Ok(())
    }

    /// Session state string, as returned to BLE readers.
    pub fn status_string(&self) -> String {
        lock(&self.session).state().to_ble_string()
    }

    /// True once the last transfer completed.
    pub fn is_complete(&self) -> bool {
        matches!(lock(&self.session).state(), SessionState::Complete { .. })
    }

    /// Shared decision counters.
    pub fn stats(&self) -> Arc<TransferStats> {
        Arc::clone(&self.stats)
    }
}
