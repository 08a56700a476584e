//! Switch time synchronization: steers a switch clock toward the grandmaster
//! from Sync samples of the master send path or a relayed slave port.
//!
//! ```text
//!  SyncSample ──> SwtTimeSyncSm ──> RateMeas ──> CorrVals
//!                      │                              │
//!                      └── set_correction_time <──────┘ (+ cascaded slaves)
//! ```

pub mod rate_meas;
pub mod time_sync_sm;


pub use rate_meas::{CorrAction, CorrVals, RateMeas, RateMeasState, clamp_rate_ratio};
pub use time_sync_sm::{SwtTimeSyncSm, SwtTimeSyncState};

use std::fmt;

use crate::protocol::ptp::timestamp::GlobalTimestamp;

/// One Sync event as seen by a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSample {
    /// Sequence id of the Sync.
    pub sequence_id: u16,
    /// Grandmaster time at the switch ingress (origin plus path delays).
    pub origin: GlobalTimestamp,
    /// Switch clock at the ingress of the Sync.
    pub ingress: GlobalTimestamp,
}

/// Externally visible synchronization state of a switch clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum SyncState {
    /// No sample processed yet.
    #[default]
    NeverSync,
    /// Within the precision limit.
    Sync,
    /// Out of sync.
    Unsync,
    /// No sample within the sync event timeout.
    Uncertain,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NeverSync => "NEVERSYNC",
            Self::Sync => "SYNC",
            Self::Unsync => "UNSYNC",
            Self::Uncertain => "UNCERTAIN",
        };
        f.write_str(name)
    }
}
