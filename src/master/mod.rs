//! Time master transmission path.
//!
//! Each configured master port owns a [`SyncSendSm`] (which in turn drives
//! the port's [`PortSyncSendSm`]) and optionally an [`AnnounceSendSm`]:
//!
//! ```text
//! time base ──> SyncSendSm ──> PortSyncSendSm ──> EthIf
//!                 │   ^              │
//!                 │   └── egress ts ─┘ (EgressTsSlot, driver context)
//!                 └─> SyncSendTx (Follow_Up + AUTOSAR sub-TLVs)
//! ```

pub mod announce;
pub mod port_sync_send;
pub mod sync_send;
pub mod sync_send_tx;

#[cfg(test)]
mod tests;

pub use announce::{AnnounceSendSm, AnnounceState};
pub use port_sync_send::{EgressTsSlot, PortSyncSendSm, PortSyncSendState};
pub use sync_send::{FollowUpSent, SyncSendSm, SyncSendState};

use crate::crc::CrcHndl;
use crate::interfaces::{EthIf, TimeBase};
use crate::types::{MasterPortConfig, MessageCompliance};

/// Transmission counters of a master port, incremented on success only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasterStatistics {
    /// Sync messages sent.
    pub sync_tx: u32,
    /// `Follow_Up` messages sent.
    pub follow_up_tx: u32,
    /// Announce messages sent.
    pub announce_tx: u32,
}

/// Collaborators and capabilities a master port cycle works with.
pub struct TxEnv<'a, T, E> {
    /// Synchronized time base.
    pub time_base: &'a T,
    /// Ethernet interface.
    pub eth: &'a mut E,
    /// CRC capability.
    pub crc: CrcHndl,
    /// Message compliance mode.
    pub compliance: MessageCompliance,
}

/// All transmission state of one master port.
#[derive(Debug)]
pub struct MasterPort {
    sync: SyncSendSm,
    announce: Option<AnnounceSendSm>,
    stats: MasterStatistics,
}

impl MasterPort {
    /// Create the port's state machines.
    #[must_use]
    pub fn new(cfg: &MasterPortConfig) -> Self {
        Self {
            sync: SyncSendSm::new(cfg),
            announce: cfg.announce.map(|_| AnnounceSendSm::new()),
            stats: MasterStatistics::default(),
        }
    }

    /// Sync/`Follow_Up` state machine.
    #[must_use]
    pub fn sync(&self) -> &SyncSendSm {
        &self.sync
    }

    /// Mutable Sync/`Follow_Up` state machine.
    pub fn sync_mut(&mut self) -> &mut SyncSendSm {
        &mut self.sync
    }

    /// Announce state machine, if configured.
    #[must_use]
    pub fn announce(&self) -> Option<&AnnounceSendSm> {
        self.announce.as_ref()
    }

    /// Transmission counters.
    #[must_use]
    pub fn statistics(&self) -> MasterStatistics {
        self.stats
    }

    /// Run one main-function cycle: Announce first, then Sync/`Follow_Up`.
    /// A pending reset returns both state machines to initializing.
    pub fn main_function<T: TimeBase, E: EthIf>(
        &mut self,
        cfg: &MasterPortConfig,
        env: &mut TxEnv<'_, T, E>,
    ) -> Option<FollowUpSent> {
        if self.sync.reset_pending() {
            if let Some(announce) = self.announce.as_mut() {
                announce.reset();
            }
        }
        if let (Some(announce), Some(announce_cfg)) = (self.announce.as_mut(), cfg.announce.as_ref())
        {
            let as_capable = self.sync.port_sm().as_capable();
            announce.main_function(cfg, announce_cfg, env.eth, as_capable, &mut self.stats);
        }
        self.sync.main_function(cfg, env, &mut self.stats)
    }
}
