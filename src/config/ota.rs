//! OTA receiver configuration.
//!
//! Platform-independent and testable on the host.
//!
//! # Example
//!
//! ```
//! use ota_rs_esp32::config::OtaConfig;
//!
//! let config = OtaConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.max_payload(), 12);
//! ```

use crate::ota::{DEFAULT_MAGIC, HEADER_SIZE, METADATA_SIZE};
use std::fmt;

/// Default BLE attribute write size (ATT MTU 23 minus the 3-byte opcode/handle).
pub const DEFAULT_MTU: usize = 20;

/// Largest attribute value BLE allows.
pub const MAX_MTU: usize = 512;

/// Smallest MTU that fits header, image metadata and one data byte.
pub const MIN_MTU: usize = HEADER_SIZE + METADATA_SIZE + 1;

/// Receiver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtaConfig {
    /// Maximum bytes per GATT write, header included.
    pub mtu: usize,
    /// Expected image magic.
    pub magic: u16,
    /// Lowest accepted image version.
    pub min_version: u16,
    /// Highest accepted image version.
    pub max_version: u16,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            magic: DEFAULT_MAGIC,
            min_version: 1,
            max_version: u16::MAX,
        }
    }
}

impl OtaConfig {
    /// Create a validated configuration with the default magic and version
    /// range.
    pub fn with_mtu(mtu: usize) -> Result<Self, ConfigError> {
        let config = Self {
            mtu,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Maximum payload bytes per chunk.
    pub fn max_payload(&self) -> usize {
        self.mtu.saturating_sub(HEADER_SIZE)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mtu < MIN_MTU {
            return Err(ConfigError::MtuTooSmall {
                mtu: self.mtu,
                min: MIN_MTU,
            });
        }
        if self.mtu > MAX_MTU {
            return Err(ConfigError::MtuTooLarge {
                mtu: self.mtu,
                max: MAX_MTU,
            });
        }
        if self.min_version > self.max_version {
            return Err(ConfigError::VersionRange {
                min: self.min_version,
                max: self.max_version,
            });
        }
        Ok(())
    }

    /// Build a configuration from `OTA_MTU`, `OTA_MAGIC`, `OTA_MIN_VERSION`
    /// and `OTA_MAX_VERSION`, falling back to defaults for unset variables.
    ///
    /// `OTA_MAGIC` accepts decimal or `0x`-prefixed hex.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            mtu: parse_var(&lookup, "OTA_MTU")?.unwrap_or(defaults.mtu),
            magic: parse_var(&lookup, "OTA_MAGIC")?.unwrap_or(defaults.magic),
            min_version: parse_var(&lookup, "OTA_MIN_VERSION")?.unwrap_or(defaults.min_version),
            max_version: parse_var(&lookup, "OTA_MAX_VERSION")?.unwrap_or(defaults.max_version),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: TryFrom<u64>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed
        .ok()
        .and_then(|v| T::try_from(v).ok())
        .map(Some)
        .ok_or(ConfigError::InvalidValue { key, value: raw })
}

/// Errors that can occur while building a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// MTU cannot fit header, metadata and one data byte.
    MtuTooSmall { mtu: usize, min: usize },
    /// MTU exceeds the BLE attribute ceiling.
    MtuTooLarge { mtu: usize, max: usize },
    /// Minimum version is above maximum version.
    VersionRange { min: u16, max: u16 },
    /// Environment variable could not be parsed.
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MtuTooSmall { mtu, min } => {
                write!(f, "MTU too small: {} bytes (min {})", mtu, min)
            }
            Self::MtuTooLarge { mtu, max } => {
                write!(f, "MTU too large: {} bytes (max {})", mtu, max)
            }
            Self::VersionRange { min, max } => {
                write!(f, "invalid version range: {}..={}", min, max)
            }
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value for {}: {:?}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = OtaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mtu, 20);
        assert_eq!(config.max_payload(), 12);
        assert_eq!(config.magic, DEFAULT_MAGIC);
    }

    #[test]
    fn test_mtu_bounds() {
        assert!(matches!(
            OtaConfig::with_mtu(MIN_MTU - 1),
            Err(ConfigError::MtuTooSmall { .. })
        ));
        assert!(OtaConfig::with_mtu(MIN_MTU).is_ok());
        assert!(OtaConfig::with_mtu(MAX_MTU).is_ok());
        assert!(matches!(
            OtaConfig::with_mtu(MAX_MTU + 1),
            Err(ConfigError::MtuTooLarge { .. })
        ));
    }

    #[test]
    fn test_inverted_version_range() {
        let config = OtaConfig {
            min_version: 5,
            max_version: 2,
            ..OtaConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::VersionRange { min: 5, max: 2 })
        );
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = OtaConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, OtaConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = OtaConfig::from_lookup(lookup(&[
            ("OTA_MTU", "244"),
            ("OTA_MAGIC", "0xBEEF"),
            ("OTA_MIN_VERSION", "3"),
            ("OTA_MAX_VERSION", " 9 "),
        ]))
        .unwrap();
        assert_eq!(config.mtu, 244);
        assert_eq!(config.magic, 0xBEEF);
        assert_eq!(config.min_version, 3);
        assert_eq!(config.max_version, 9);
    }

    #[test]
    fn test_from_lookup_invalid_values() {
        let result = OtaConfig::from_lookup(lookup(&[("OTA_MAGIC", "0x1FFFF")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "OTA_MAGIC", .. })
        ));

        let result = OtaConfig::from_lookup(lookup(&[("OTA_MTU", "twenty")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let result = OtaConfig::from_lookup(lookup(&[("OTA_MTU", "8")]));
        assert!(matches!(result, Err(ConfigError::MtuTooSmall { .. })));
    }
}
