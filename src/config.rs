//! Engine configuration.
//!
//! There is no idle-session timeout to configure here: unlike a desktop
//! wallet's vault, the device-bound engine stays unlocked until an explicit
//! `lock()` or a wipe, matching the original firmware's single global
//! `unlocked` flag. `StorageConfig` instead carries the knobs a host
//! actually needs to supply at `init` time.

/// Configuration for a `StorageCore` instance.
///
/// Use the builder pattern:
/// ```
/// use keyvault_core::StorageConfig;
///
/// let config = StorageConfig::new().with_max_appid(0x3f);
/// ```
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Highest application id the host will ever register (low six bits of
    /// the record key's APP byte; the top two bits are the PUBLIC/WRITE
    /// flags and are never part of an appid).
    pub max_appid: u8,
}

impl StorageConfig {
    pub fn new() -> Self {
        Self { max_appid: 0x3f }
    }

    pub fn with_max_appid(mut self, max_appid: u8) -> Self {
        self.max_appid = max_appid & 0x3f;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.max_appid, 0x3f);
    }

    #[test]
    fn max_appid_is_masked_to_six_bits() {
        let config = StorageConfig::new().with_max_appid(0xff);
        assert_eq!(config.max_appid, 0x3f);
    }
}
