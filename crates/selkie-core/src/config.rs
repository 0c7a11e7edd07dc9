//! Configuration for the comms vat
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::IDENTIFIER_BASE_MAX;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration fixed at vat construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommsConfig {
    /// Starting offset for self-allocated identifiers and the outbound
    /// sequence counter. Distinct bases across vat incarnations keep
    /// freshly minted ids from colliding with a previous incarnation's.
    #[serde(default)]
    pub identifier_base: u64,

    /// When false, the sequence-number field of outbound wire messages is
    /// emitted empty and the transport's own ordering guarantee is trusted
    /// exclusively.
    #[serde(default = "default_send_explicit_seq_nums")]
    pub send_explicit_seq_nums: bool,
}

fn default_send_explicit_seq_nums() -> bool {
    true
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            identifier_base: 0,
            send_explicit_seq_nums: default_send_explicit_seq_nums(),
        }
    }
}

impl CommsConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.identifier_base > IDENTIFIER_BASE_MAX {
            return Err(Error::InvalidConfiguration {
                field: "identifier_base".into(),
                reason: format!(
                    "{} exceeds limit {}",
                    self.identifier_base, IDENTIFIER_BASE_MAX
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CommsConfig::default();
        assert_eq!(config.identifier_base, 0);
        assert!(config.send_explicit_seq_nums);
        config.validate().unwrap();
    }

    #[test]
    fn test_identifier_base_limit() {
        let config = CommsConfig {
            identifier_base: IDENTIFIER_BASE_MAX + 1,
            send_explicit_seq_nums: true,
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: CommsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.identifier_base, 0);
        assert!(config.send_explicit_seq_nums);
    }
}
