//! BLE OTA chunk reassembly and validation.
//!
//! This module contains the platform-independent core of the OTA receiver:
//! decoding GATT writes into chunks, validating the image metadata carried by
//! the first chunk, and driving the transfer state machine that hands image
//! bytes to a storage backend.
//!
//! # Components
//!
//! - [`packet`] - chunk wire format
//! - [`image`] - image metadata and signature checks
//! - [`session`] - transfer state machine
//! - [`writer`] - storage capability ([`ChunkWriter`])
//! - [`policy`] - what to do when a packet is rejected
//! - [`chunker`] - sender-side splitting, used by the host tool and tests
//!
//! All of it runs on the host; the ESP32 GATT service in [`crate::ble`] is a
//! thin transport over [`TransferSession::on_write`].

pub mod chunker;
pub mod error;
pub mod image;
pub mod packet;
pub mod policy;
pub mod session;
pub mod stats;
pub mod writer;

pub use chunker::{ChunkError, Chunker};
pub use error::{ErrorKind, ATT_ERR_INVALID_ATTR_VALUE_LEN, ATT_ERR_UNLIKELY};
pub use image::{ImageHeader, ImageValidator, DEFAULT_MAGIC, METADATA_SIZE};
pub use packet::{decode, Packet, PacketHeader, HEADER_SIZE};
pub use policy::{Action, Failure, LenientPolicy, Phase, RecoveryPolicy, Stage, StrictPolicy};
pub use session::{ActiveTransfer, SessionState, Status, TransferSession, ValidationResult};
pub use stats::{StatsSnapshot, TransferStats};
pub use writer::{ChunkWriter, MemoryWriter, SessionId, WriteFailed, WriterOp};
