//! # ethtsyn
//!
//! A gPTP (IEEE 802.1AS) time synchronization core in the style of the
//! AUTOSAR `EthTSyn` module.
//!
//! ## Features
//!
//! - Sync/`Follow_Up` and Announce transmission on time master ports
//! - AUTOSAR `Follow_Up` sub-TLVs with CRC-8H2F integrity protection
//! - Site synchronization: transparent relay through a switch
//! - Switch clock steering with drift rate measurement
//!
//! ## Example
//!
//! ```rust
//! use ethtsyn::testing::{MockEthIf, MockTimeBase};
//! use ethtsyn::{EthTSyn, EthTSynConfig, GlobalTimestamp, MasterPortConfig};
//!
//! # fn main() -> Result<(), ethtsyn::EthTSynError> {
//! let mut port = MasterPortConfig::new(1, 0, 0x0011_22FF_FE33_4455);
//! port.always_as_capable = true;
//! let config = EthTSynConfig::builder().master_port(port).build();
//! let time_base = MockTimeBase::synchronized(GlobalTimestamp::new(1_000, 0), 0);
//!
//! let mut core = EthTSyn::new(config, time_base, MockEthIf::new())?;
//! core.main_function();
//! assert_eq!(core.eth().sent.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Facade**: [`EthTSyn`] - owns collaborators and every state machine
//! - **State machines**: [`master`], [`site_sync`], [`swt_sync`]
//! - **Low-level**: [`protocol`] wire format and timestamps, [`crc`]

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Configuration types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod core;
pub mod crc;
pub(crate) mod exclusive;
pub mod interfaces;
pub mod master;
pub mod protocol;
pub mod site_sync;
pub mod swt_sync;

// Re-exports
pub use crate::core::{EthTSyn, EthTSynStatistics, SiteSyncRelay, SyncStateCallback};
pub use error::{ConfigError, EthTSynError, Result};
pub use interfaces::{EthIf, NoSwitch, SwitchMgmt, TimeBase};
pub use protocol::ptp::{GlobalTimestamp, TimeDiff, VirtualLocalTime};
pub use swt_sync::SyncState;
pub use types::{
    EthTSynConfig, MasterPortConfig, MessageCompliance, ResidenceTime, SiteSyncConfig,
    SwtTimeSyncConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        EthIf, EthTSyn, EthTSynConfig, EthTSynError, GlobalTimestamp, MasterPortConfig,
        SiteSyncConfig, SwitchMgmt, SwtTimeSyncConfig, SyncState, TimeBase,
    };
}
