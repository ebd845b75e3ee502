//! BLE OTA receiver library for ESP32.
//!
//! This library contains platform-independent components that can be tested
//! on the host machine without ESP32 hardware: chunk decoding, image
//! validation and the transfer state machine. Storage backends and the GATT
//! service plug in through [`ota::ChunkWriter`].

pub mod ble;
pub mod config;
pub mod ota;
#[cfg(feature = "esp32")]
pub mod storage;
pub mod storage_host;

// Re-export commonly used items
pub use config::{ConfigError, OtaConfig};
pub use ota::{
    decode, ChunkWriter, Chunker, ErrorKind, MemoryWriter, Packet, PacketHeader, SessionId,
    SessionState, Status, TransferSession, TransferStats, WriteFailed,
};
pub use storage_host::FileChunkWriter;
