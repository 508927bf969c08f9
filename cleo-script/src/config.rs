use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} = {value} is above the limit of {max}")]
    TooManySlots {
        field: &'static str,
        value: u32,
        max: u32,
    },
}

/// Largest variable table the host will allocate. Instruction operands
/// address slots with 16 bits.
pub const MAX_SLOTS: u32 = 0x1_0000;

/// Host-side settings, read from a TOML file. Every field is optional.
///
/// ```toml
/// response_timeout_ms = 2000
/// global_slots = 16384
/// local_slots = 40
/// trace_bytecode = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a script thread waits for the control thread to answer.
    pub response_timeout_ms: u64,
    pub global_slots: u32,
    pub local_slots: u32,
    /// Dump every assembled instruction at trace level.
    pub trace_bytecode: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 2000,
            global_slots: 0x4000,
            local_slots: 40,
            trace_bytecode: false,
        }
    }
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path)?;
        Self::from_toml(&src)
    }

    pub fn from_toml(src: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("global_slots", self.global_slots),
            ("local_slots", self.local_slots),
        ] {
            if value > MAX_SLOTS {
                return Err(ConfigError::TooManySlots {
                    field,
                    value,
                    max: MAX_SLOTS,
                });
            }
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}
