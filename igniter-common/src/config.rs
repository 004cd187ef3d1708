//! Node runtime configuration
//!
//! Firmware typically uses [`NodeConfig::DEFAULT`], or builds a config in a `const`. On hosts with
//! the `std` feature, a config can also be loaded from a TOML file. All fields are optional in the
//! file, and missing fields take their default value:
//!
//! ```toml
//! node_id = 5
//! bitrate_kbps = 500
//! dwell_ms = 3000
//!
//! [protocol]
//! nmt_control = 0x2011
//! first_heartbeat_ms = 500
//! sdo_server_timeout_ms = 1000
//! sdo_client_timeout_ms = 500
//! sdo_client_block_transfer = false
//! ```

use core::time::Duration;

use crate::{constants::defaults, nmt::NmtControl, node_id::NodeId};

/// Protocol parameters provided to the stack during initialization
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(
    feature = "std",
    derive(serde::Deserialize),
    serde(deny_unknown_fields, default)
)]
pub struct ProtocolParams {
    /// NMT control flags
    pub nmt_control: NmtControl,
    /// Optional index of an object to receive the stack status bits
    pub status_bits: Option<u16>,
    /// Delay before the first heartbeat
    pub first_heartbeat_ms: u16,
    /// SDO server timeout
    pub sdo_server_timeout_ms: u16,
    /// SDO client timeout
    pub sdo_client_timeout_ms: u16,
    /// Allow the SDO client to use block transfers
    pub sdo_client_block_transfer: bool,
}

impl ProtocolParams {
    /// Default protocol parameters
    pub const DEFAULT: Self = Self {
        nmt_control: NmtControl::DEFAULT,
        status_bits: None,
        first_heartbeat_ms: defaults::FIRST_HEARTBEAT_MS,
        sdo_server_timeout_ms: defaults::SDO_SERVER_TIMEOUT_MS,
        sdo_client_timeout_ms: defaults::SDO_CLIENT_TIMEOUT_MS,
        sdo_client_block_transfer: false,
    };
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Configuration of a node runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(
    feature = "std",
    derive(serde::Deserialize),
    serde(deny_unknown_fields, default)
)]
pub struct NodeConfig {
    /// The node ID passed to the stack
    pub node_id: NodeId,
    /// CAN bit rate in kbit/s
    pub bitrate_kbps: u16,
    /// Protocol initialization parameters
    pub protocol: ProtocolParams,
    /// Period of the interrupt driven process data cadence, in microseconds
    pub fast_period_us: u32,
    /// Period of the cooperative full stack cadence, in microseconds
    pub full_period_us: u32,
    /// Period of the latency report, in milliseconds
    pub report_period_ms: u32,
    /// Dwell of each actuation phase, in milliseconds
    pub dwell_ms: u32,
}

impl NodeConfig {
    /// Default node configuration
    pub const DEFAULT: Self = Self {
        node_id: NodeId::Configured(defaults::NODE_ID),
        bitrate_kbps: defaults::BITRATE_KBPS,
        protocol: ProtocolParams::DEFAULT,
        fast_period_us: defaults::FAST_PERIOD.as_micros() as u32,
        full_period_us: defaults::FULL_PERIOD.as_micros() as u32,
        report_period_ms: defaults::REPORT_PERIOD.as_millis() as u32,
        dwell_ms: defaults::DWELL.as_millis() as u32,
    };

    /// Period of the fast cadence
    pub fn fast_period(&self) -> Duration {
        Duration::from_micros(self.fast_period_us as u64)
    }

    /// Period of the full stack cadence
    pub fn full_period(&self) -> Duration {
        Duration::from_micros(self.full_period_us as u64)
    }

    /// Period of the latency report
    pub fn report_period(&self) -> Duration {
        Duration::from_millis(self.report_period_ms as u64)
    }

    /// Dwell of each actuation phase
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms as u64)
    }

    /// Check the config for values the runtime cannot operate with
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.fast_period_us == 0 || self.full_period_us == 0 || self.report_period_ms == 0 {
            return Err("cadence periods must be non-zero");
        }
        if self.bitrate_kbps == 0 {
            return Err("bitrate_kbps must be non-zero");
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(feature = "std")]
mod load {
    use std::path::Path;

    use snafu::{ResultExt, Snafu};

    use super::NodeConfig;

    /// Error loading a [`NodeConfig`]
    #[derive(Debug, Snafu)]
    pub enum LoadError {
        /// The file could not be read
        #[snafu(display("Error reading {path}: {source}"))]
        Io {
            /// The path which failed to read
            path: String,
            /// The underlying IO error
            source: std::io::Error,
        },
        /// The TOML could not be parsed
        #[snafu(display("Error parsing node config: {source}"))]
        Parse {
            /// The underlying parse error
            source: toml::de::Error,
        },
        /// The values parsed, but cannot be used
        #[snafu(display("Invalid node config: {message}"))]
        Invalid {
            /// Description of the problem
            message: &'static str,
        },
    }

    impl NodeConfig {
        /// Load a config from a TOML string
        pub fn load_from_str(s: &str) -> Result<Self, LoadError> {
            let config: NodeConfig = toml::from_str(s).context(ParseSnafu)?;
            config
                .validate()
                .map_err(|message| InvalidSnafu { message }.build())?;
            Ok(config)
        }

        /// Load a config from a TOML file
        pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
            let path = path.as_ref();
            let s = std::fs::read_to_string(path).context(IoSnafu {
                path: path.display().to_string(),
            })?;
            Self::load_from_str(&s)
        }
    }
}

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub use load::LoadError;

#[cfg(all(test, feature = "std"))]
mod test {
    use super::*;
    use assertables::assert_contains;

    #[test]
    fn test_empty_config_is_default() {
        let cfg = NodeConfig::load_from_str("").unwrap();
        assert_eq!(NodeConfig::DEFAULT, cfg);
        assert_eq!(Duration::from_secs(3), cfg.dwell());
        assert_eq!(Duration::from_millis(1), cfg.fast_period());
        assert_eq!(NodeId::Configured(5), cfg.node_id);
    }

    #[test]
    fn test_partial_config() {
        const CFG: &str = r#"
            node_id = 12
            bitrate_kbps = 250

            [protocol]
            nmt_control = 0x2111
            sdo_client_block_transfer = true
        "#;
        let cfg = NodeConfig::load_from_str(CFG).unwrap();
        assert_eq!(NodeId::Configured(12), cfg.node_id);
        assert_eq!(250, cfg.bitrate_kbps);
        assert!(cfg
            .protocol
            .nmt_control
            .contains(NmtControl::STARTUP_TO_OPERATIONAL));
        assert!(cfg.protocol.sdo_client_block_transfer);
        // Untouched values keep their default
        assert_eq!(500, cfg.protocol.first_heartbeat_ms);
        assert_eq!(3000, cfg.dwell_ms);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = NodeConfig::load_from_str("node_id = 0").unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));

        let err = NodeConfig::load_from_str("unknown_field = 1").unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));

        let err = NodeConfig::load_from_str("full_period_us = 0").unwrap_err();
        assert_contains!(err.to_string(), "non-zero");
    }
}
