//! Receiver configuration management.
//!
//! # Components
//!
//! - [`ota`] - MTU, image magic and accepted version range (host-testable)
//!
//! Values come from defaults or the environment; the BLE service takes a
//! validated [`OtaConfig`] at construction and never changes it afterwards.

mod ota;

pub use ota::{ConfigError, OtaConfig, DEFAULT_MTU, MAX_MTU, MIN_MTU};
