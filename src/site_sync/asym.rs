use tracing::{debug, trace, warn};

use super::sync_tx::{SiteSyncSyncTx, TxRetry};
use super::{RelayEnv, RelayedFollowUp, RelayedSync, RxOutcome, SiteSyncStatistics};
use crate::crc::CrcHndl;
use crate::error::Result;
use crate::interfaces::{EthIf, SwitchMgmt};
use crate::protocol::ptp::message::MsgHeader;
use crate::protocol::ptp::timestamp::{GlobalTimestamp, TimeDiff, ts_minus_ts};
use crate::swt_sync::SyncSample;
use crate::types::{ResidenceTime, SiteSyncConfig};

/// State of an asymmetric relay path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsymSiteSyncState {
    /// Waiting for a Sync.
    WaitSync,
    /// Residence times captured, waiting for the `Follow_Up`.
    WaitFup,
    /// Forwarding the buffered `Follow_Up`.
    FwdFup,
}

/// Relay for switches that forward Sync in hardware.
///
/// Only the `Follow_Up` is relayed in software; the per-port residence times
/// are taken from the switch when the Sync is received.
#[derive(Debug)]
pub struct AsymSiteSyncSyncSm {
    state: AsymSiteSyncState,
    sync_header: Option<MsgHeader>,
    ingress: Option<GlobalTimestamp>,
    residences: Vec<Option<TimeDiff>>,
    fup: Option<RelayedFollowUp>,
    tx: SiteSyncSyncTx,
    stats: SiteSyncStatistics,
}

impl AsymSiteSyncSyncSm {
    /// Create the relay for `cfg`.
    #[must_use]
    pub fn new(cfg: &SiteSyncConfig) -> Self {
        Self {
            state: AsymSiteSyncState::WaitSync,
            sync_header: None,
            ingress: None,
            residences: vec![None; cfg.master_ports.len()],
            fup: None,
            tx: SiteSyncSyncTx::new(cfg.master_ports.len()),
            stats: SiteSyncStatistics::default(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AsymSiteSyncState {
        self.state
    }

    /// Residence time captured for master port `idx`.
    #[must_use]
    pub fn residence(&self, idx: usize) -> Option<TimeDiff> {
        self.residences.get(idx).copied().flatten()
    }

    /// Per-port forwarding state.
    #[must_use]
    pub fn tx(&self) -> &SiteSyncSyncTx {
        &self.tx
    }

    /// Relay counters.
    #[must_use]
    pub fn statistics(&self) -> SiteSyncStatistics {
        self.stats
    }

    /// Abandon any message in progress.
    pub fn reset(&mut self) {
        self.state = AsymSiteSyncState::WaitSync;
        self.sync_header = None;
        self.ingress = None;
        self.residences.fill(None);
        self.fup = None;
        self.tx.reset();
    }

    /// Sync received on the slave port; captures the residence time of
    /// every master port.
    pub fn rx_sync<S: SwitchMgmt>(
        &mut self,
        cfg: &SiteSyncConfig,
        frame: &[u8],
        switch: &S,
        residence_time: ResidenceTime,
    ) -> Result<()> {
        let RxOutcome::Accepted(sync) = RelayedSync::receive(cfg, frame)? else {
            return Ok(());
        };
        let seq = sync.header.sequence_id;
        if self.state != AsymSiteSyncState::WaitSync {
            warn!(
                port = cfg.slave_port,
                sequence_id = seq,
                state = ?self.state,
                "Sync received before previous Follow_Up was relayed, abandoning it"
            );
        }
        self.reset();

        let ingress = switch.ingress_timestamp(cfg.switch, cfg.slave_port, seq);
        for (slot, master) in self.residences.iter_mut().zip(&cfg.master_ports) {
            *slot = match residence_time {
                ResidenceTime::Fixed { nanoseconds } => TimeDiff::try_from(nanoseconds).ok(),
                ResidenceTime::Calculated => switch
                    .is_egress_ts_ready(cfg.switch, master.port, seq)
                    .then(|| switch.egress_timestamp(cfg.switch, master.port, seq))
                    .flatten()
                    .zip(ingress)
                    .and_then(|(egress, ingress)| ts_minus_ts(&egress, &ingress)),
            };
            if slot.is_none() {
                warn!(
                    port = master.port,
                    sequence_id = seq,
                    "no residence time, Follow_Up will not be relayed on this port"
                );
            }
        }
        trace!(port = cfg.slave_port, sequence_id = seq, "Sync residence times captured");
        self.ingress = ingress;
        self.sync_header = Some(sync.header);
        self.state = AsymSiteSyncState::WaitFup;
        self.stats.sync_fwd = self.stats.sync_fwd.wrapping_add(1);
        Ok(())
    }

    /// `Follow_Up` received on the slave port; it is buffered and relayed
    /// by the next [`Self::main_function`].
    pub fn rx_follow_up(&mut self, cfg: &SiteSyncConfig, frame: &[u8], crc: CrcHndl) {
        let fup = match RelayedFollowUp::receive(cfg, frame, crc) {
            RxOutcome::Accepted(fup) => fup,
            RxOutcome::ForeignDomain => return,
            RxOutcome::Dropped => {
                self.stats.follow_up_dropped = self.stats.follow_up_dropped.wrapping_add(1);
                if self.state == AsymSiteSyncState::WaitFup {
                    self.reset();
                }
                return;
            }
        };
        let expected = self.sync_header.map(|h| h.sequence_id);
        if self.state != AsymSiteSyncState::WaitFup || expected != Some(fup.header.sequence_id) {
            trace!(
                port = cfg.slave_port,
                sequence_id = fup.header.sequence_id,
                ?expected,
                "unexpected Follow_Up ignored"
            );
            return;
        }
        self.tx.start_fup_with_residences(&self.residences);
        self.fup = Some(fup);
        self.state = AsymSiteSyncState::FwdFup;
        debug!(port = cfg.slave_port, sequence_id = expected, "Follow_Up buffered");
    }

    /// Run one main-function cycle. Returns the sample of a relayed pair.
    pub fn main_function<E: EthIf, S: SwitchMgmt>(
        &mut self,
        cfg: &SiteSyncConfig,
        env: &mut RelayEnv<'_, E, S>,
    ) -> Option<SyncSample> {
        if self.state != AsymSiteSyncState::FwdFup {
            return None;
        }
        let fup = self.fup.as_ref()?;
        if self.tx.tx_fup(cfg, env, fup, self.ingress) == TxRetry::Pending {
            return None;
        }
        if self.tx.any_fup_sent() {
            self.stats.follow_up_fwd = self.stats.follow_up_fwd.wrapping_add(1);
        }
        let sample = self
            .ingress
            .zip(fup.origin_at_ingress(env.slave_pdelay_ns))
            .map(|(ingress, origin)| SyncSample {
                sequence_id: fup.header.sequence_id,
                origin,
                ingress,
            });
        self.reset();
        sample
    }
}
