use tracing::{debug, trace};

use super::MasterStatistics;
use crate::interfaces::EthIf;
use crate::protocol::ptp::message::{
    MsgHeader, PtpMessageType, PtpPortIdentity, layout, write_announce_body,
};
use crate::types::{AnnounceConfig, MasterPortConfig};

/// State of a master port's Announce transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceState {
    /// Waiting for the link.
    Initializing,
    /// Announce due.
    TxAnnounce,
    /// Counting down to the next Announce.
    WaitTxAnnounce,
}

/// Periodic Announce of a time-aware system that is not grandmaster capable.
#[derive(Debug)]
pub struct AnnounceSendSm {
    state: AnnounceState,
    sequence_id: u16,
    tx_interval_cnt: u16,
}

impl Default for AnnounceSendSm {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnounceSendSm {
    /// Create the state machine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AnnounceState::Initializing,
            sequence_id: 0,
            tx_interval_cnt: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AnnounceState {
        self.state
    }

    /// Sequence id of the next Announce.
    #[must_use]
    pub fn sequence_id(&self) -> u16 {
        self.sequence_id
    }

    /// Back to initializing.
    pub fn reset(&mut self) {
        self.state = AnnounceState::Initializing;
    }

    /// Run one main-function cycle. `as_capable` gates transmission.
    pub fn main_function<E: EthIf>(
        &mut self,
        cfg: &MasterPortConfig,
        announce: &AnnounceConfig,
        eth: &mut E,
        as_capable: bool,
        stats: &mut MasterStatistics,
    ) {
        match self.state {
            AnnounceState::Initializing => {
                if !eth.is_link_active(cfg.port) {
                    return;
                }
                debug!(port = cfg.port, "announce initialized");
                self.state = AnnounceState::TxAnnounce;
            }
            AnnounceState::WaitTxAnnounce => {
                self.tx_interval_cnt = self.tx_interval_cnt.saturating_sub(1);
                if self.tx_interval_cnt == 0 {
                    self.state = AnnounceState::TxAnnounce;
                }
            }
            AnnounceState::TxAnnounce => {}
        }

        if self.state == AnnounceState::TxAnnounce
            && as_capable
            && eth.is_link_active(cfg.port)
            && self.tx_announce(cfg, announce, eth)
        {
            stats.announce_tx = stats.announce_tx.wrapping_add(1);
            self.sequence_id = self.sequence_id.wrapping_add(1);
            self.tx_interval_cnt = announce.interval_cycles.max(1);
            self.state = AnnounceState::WaitTxAnnounce;
        }
    }

    fn tx_announce<E: EthIf>(
        &self,
        cfg: &MasterPortConfig,
        announce: &AnnounceConfig,
        eth: &mut E,
    ) -> bool {
        let Some(mut buffer) = eth.acquire_tx_buffer(cfg.port, layout::ANNOUNCE_LEN) else {
            trace!(port = cfg.port, "no tx buffer for Announce");
            return false;
        };
        let mut header = MsgHeader::new(
            PtpMessageType::Announce,
            PtpPortIdentity::new(cfg.clock_identity, cfg.port_number),
            self.sequence_id,
        );
        header.domain_number = cfg.domain_number;
        header.log_message_interval = announce.log_message_interval;
        let frame = &mut buffer.data[..layout::ANNOUNCE_LEN];
        header.encode_into(frame);
        write_announce_body(frame, cfg.clock_identity);

        let sent = eth.transmit(cfg.port, buffer, layout::ANNOUNCE_LEN, false);
        trace!(port = cfg.port, sequence_id = self.sequence_id, sent, "Announce");
        sent
    }
}
