use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::interfaces::EthIf;
use crate::protocol::ptp::message::layout;
use crate::protocol::ptp::timestamp::GlobalTimestamp;
use crate::types::PortIdx;

/// Single-slot egress timestamp mailbox.
///
/// Written from the driver's transmit confirmation, read by the owning
/// [`PortSyncSendSm`]. A newer timestamp overwrites an unread one.
#[derive(Debug, Default)]
pub struct EgressTsSlot {
    slot: Mutex<Option<GlobalTimestamp>>,
}

impl EgressTsSlot {
    /// Store an egress timestamp (last write wins).
    pub fn provide(&self, ts: GlobalTimestamp) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(ts);
    }

    /// Take the stored timestamp, leaving the slot empty.
    pub fn take(&self) -> Option<GlobalTimestamp> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Drop any stored timestamp.
    pub fn clear(&self) {
        let _ = self.take();
    }
}

/// State of the per-port Sync/`Follow_Up` transmission sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSyncSendState {
    /// Idle, ready for the next Sync.
    WaitTxSync,
    /// Sync sent, egress timestamp outstanding.
    WaitSyncEgrTs,
    /// Egress timestamp consumed, `Follow_Up` may be sent.
    WaitTxFup,
    /// `Follow_Up` transmission in progress.
    TxFup,
}

/// Buffer handling and asCapable gate of one master port.
#[derive(Debug)]
pub struct PortSyncSendSm {
    port: PortIdx,
    state: PortSyncSendState,
    as_capable: bool,
    egress: Arc<EgressTsSlot>,
}

impl PortSyncSendSm {
    /// Create the sequence for `port`.
    #[must_use]
    pub fn new(port: PortIdx, as_capable: bool) -> Self {
        Self {
            port,
            state: PortSyncSendState::WaitTxSync,
            as_capable,
            egress: Arc::new(EgressTsSlot::default()),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PortSyncSendState {
        self.state
    }

    /// Ethernet port.
    #[must_use]
    pub fn port(&self) -> PortIdx {
        self.port
    }

    /// Whether the port completed peer delay qualification.
    #[must_use]
    pub fn as_capable(&self) -> bool {
        self.as_capable
    }

    /// Update the asCapable qualification.
    pub fn set_as_capable(&mut self, as_capable: bool) {
        self.as_capable = as_capable;
    }

    /// Mailbox for the driver's egress timestamp.
    #[must_use]
    pub fn egress_slot(&self) -> Arc<EgressTsSlot> {
        Arc::clone(&self.egress)
    }

    /// Deliver the egress timestamp of the last Sync.
    pub fn provide_sync_egr_ts(&self, ts: GlobalTimestamp) {
        self.egress.provide(ts);
    }

    /// Consume the egress timestamp if one arrived for the outstanding Sync.
    pub fn get_sync_egr_ts(&mut self) -> Option<GlobalTimestamp> {
        if self.state != PortSyncSendState::WaitSyncEgrTs {
            return None;
        }
        let ts = self.egress.take()?;
        self.state = PortSyncSendState::WaitTxFup;
        Some(ts)
    }

    /// Whether frames may be sent on the port.
    pub fn can_transmit<E: EthIf>(&self, eth: &E) -> bool {
        self.as_capable && eth.is_link_active(self.port)
    }

    /// Send a Sync frame built by `build`, requesting an egress timestamp.
    pub fn tx_sync<E: EthIf>(&mut self, eth: &mut E, build: impl FnOnce(&mut [u8])) -> bool {
        if !self.can_transmit(eth) {
            return false;
        }
        let Some(mut buffer) = eth.acquire_tx_buffer(self.port, layout::SYNC_LEN) else {
            trace!(port = self.port, "no tx buffer for Sync");
            return false;
        };
        build(&mut buffer.data[..layout::SYNC_LEN]);
        self.egress.clear();
        if eth.transmit(self.port, buffer, layout::SYNC_LEN, true) {
            self.state = PortSyncSendState::WaitSyncEgrTs;
            true
        } else {
            trace!(port = self.port, "Sync transmission failed");
            false
        }
    }

    /// Send a `Follow_Up` of at most `max_len` bytes; `write` serializes it
    /// and returns the actual length, or `None` to drop it.
    pub fn tx_fup<E: EthIf>(
        &mut self,
        eth: &mut E,
        max_len: usize,
        write: impl FnOnce(&mut [u8]) -> Option<usize>,
    ) -> bool {
        if !self.can_transmit(eth) {
            return false;
        }
        let Some(mut buffer) = eth.acquire_tx_buffer(self.port, max_len) else {
            trace!(port = self.port, "no tx buffer for Follow_Up");
            return false;
        };
        self.state = PortSyncSendState::TxFup;
        let Some(len) = write(&mut buffer.data[..max_len]) else {
            eth.release_tx_buffer(self.port, buffer);
            self.cancel();
            return false;
        };
        if eth.transmit(self.port, buffer, len, false) {
            self.state = PortSyncSendState::WaitTxSync;
            true
        } else {
            trace!(port = self.port, "Follow_Up transmission failed");
            self.state = PortSyncSendState::WaitTxFup;
            false
        }
    }

    /// Abandon the current cycle.
    pub fn cancel(&mut self) {
        self.state = PortSyncSendState::WaitTxSync;
        self.egress.clear();
    }
}
