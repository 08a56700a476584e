use thiserror::Error;

use crate::protocol::ptp::PtpParseError;
use crate::types::PortIdx;

/// Configuration inconsistencies detected at startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Generated `Follow_Up` length disagrees with the configured sub-TLVs
    #[error("Follow_Up length mismatch on port {port}: configured {configured}, computed {computed}")]
    FollowUpLengthMismatch {
        /// Master port
        port: PortIdx,
        /// Generated length
        configured: u16,
        /// Length implied by the sub-TLV configuration
        computed: u16,
    },

    /// More Offset sub-TLVs than a `Follow_Up` can carry
    #[error("port {port} configures {count} offset sub-TLVs, at most {max} allowed")]
    TooManyOfsSubTlvs {
        /// Master port
        port: PortIdx,
        /// Configured count
        count: usize,
        /// Upper bound
        max: usize,
    },

    /// Main-function period of zero
    #[error("main function period must be non-zero")]
    InvalidMainFunctionPeriod,

    /// A port refers to a switch time sync instance that does not exist
    #[error("unknown switch time sync instance {index}")]
    UnknownSwtTimeSync {
        /// Referenced index
        index: usize,
    },

    /// Relay path without master ports
    #[error("site sync on slave port {slave_port} has no master ports")]
    SiteSyncWithoutMasterPorts {
        /// Slave port
        slave_port: PortIdx,
    },

    /// Rate measurement needs at least one buffer and one cycle
    #[error("rate measurement needs at least one buffer and one cycle")]
    InvalidRateMeasurement,

    /// Rate ratio bounds do not form a range around 1.0
    #[error("invalid rate ratio bounds [{min}, {max}]")]
    InvalidRateRatioBounds {
        /// Lower bound
        min: String,
        /// Upper bound
        max: String,
    },

    /// Announce interval of zero cycles
    #[error("announce interval on port {port} must be non-zero")]
    InvalidAnnounceInterval {
        /// Master port
        port: PortIdx,
    },
}

/// Errors reported by the time synchronization core
#[derive(Debug, Error)]
pub enum EthTSynError {
    /// Startup configuration check failed
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Received frame could not be decoded
    #[error("frame parse error: {0}")]
    Parse(#[from] PtpParseError),
}

impl EthTSynError {
    /// Whether the error only affects a single received frame
    #[must_use]
    pub fn is_frame_local(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// Result type for time synchronization operations
pub type Result<T> = std::result::Result<T, EthTSynError>;
