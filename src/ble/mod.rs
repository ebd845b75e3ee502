//! BLE interface components.
//!
//! This module contains the GATT service that carries OTA chunks from a
//! phone or host into the transfer session.

#[cfg(feature = "esp32")]
mod ota_service;

#[cfg(feature = "esp32")]
pub use ota_service::{OtaService, OTA_CHAR_UUID, OTA_SERVICE_UUID};
