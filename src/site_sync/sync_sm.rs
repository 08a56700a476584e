use tracing::{debug, trace, warn};

use super::sync_tx::{SiteSyncSyncTx, TxRetry};
use super::{RelayEnv, RelayedFollowUp, RelayedSync, RxOutcome, SiteSyncStatistics};
use crate::crc::CrcHndl;
use crate::error::Result;
use crate::interfaces::{EthIf, SwitchMgmt};
use crate::protocol::ptp::message::layout;
use crate::protocol::ptp::timestamp::{GlobalTimestamp, ts_minus_ts, ts_plus_timediff};
use crate::protocol::ptp::wire;
use crate::swt_sync::SyncSample;
use crate::types::{ResidenceTime, SiteSyncConfig};

/// State of a symmetric relay path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteSyncState {
    /// Waiting for a Sync.
    WaitSync,
    /// Forwarding the Sync.
    TxSync,
    /// Sync forwarded, waiting for its `Follow_Up`.
    WaitFup,
    /// Forwarding the `Follow_Up`.
    TxFup,
    /// A real Sync arrived while synthesizing.
    RcvdSyncAfterTimeout,
}

/// Source of the relayed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Received messages are forwarded.
    Regular,
    /// Sync reception timed out; messages are synthesized from the last
    /// valid pair.
    Cyclic,
}

/// Last pair that was forwarded completely, the anchor for synthesis.
#[derive(Debug, Clone)]
struct ValidPair {
    sync: RelayedSync,
    fup: RelayedFollowUp,
    ingress: GlobalTimestamp,
}

/// Relay of one slave port's Sync/`Follow_Up` stream to its master ports.
#[derive(Debug)]
pub struct SiteSyncSyncSm {
    state: SiteSyncState,
    mode: OperationMode,
    sync: Option<RelayedSync>,
    fup: Option<RelayedFollowUp>,
    ingress: Option<GlobalTimestamp>,
    last_valid: Option<ValidPair>,
    rx_timeout_cnt: u16,
    cyclic_cnt: u32,
    tx: SiteSyncSyncTx,
    stats: SiteSyncStatistics,
}

impl SiteSyncSyncSm {
    /// Create the relay for `cfg`.
    #[must_use]
    pub fn new(cfg: &SiteSyncConfig) -> Self {
        Self {
            state: SiteSyncState::WaitSync,
            mode: OperationMode::Regular,
            sync: None,
            fup: None,
            ingress: None,
            last_valid: None,
            rx_timeout_cnt: 0,
            cyclic_cnt: 0,
            tx: SiteSyncSyncTx::new(cfg.master_ports.len()),
            stats: SiteSyncStatistics::default(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SiteSyncState {
        self.state
    }

    /// Current operation mode.
    #[must_use]
    pub fn mode(&self) -> OperationMode {
        self.mode
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

    /// Abandon any message in progress and wait for the next Sync.
    pub fn reset(&mut self) {
        self.state = SiteSyncState::WaitSync;
        self.mode = OperationMode::Regular;
        self.sync = None;
        self.fup = None;
        self.ingress = None;
        self.rx_timeout_cnt = 0;
        self.tx.reset();
    }

    /// Sync received on the slave port.
    pub fn rx_sync<S: SwitchMgmt>(
        &mut self,
        cfg: &SiteSyncConfig,
        frame: &[u8],
        switch: &S,
    ) -> Result<()> {
        let RxOutcome::Accepted(sync) = RelayedSync::receive(cfg, frame)? else {
            return Ok(());
        };
        let seq = sync.header.sequence_id;
        self.rx_timeout_cnt = 0;

        if self.mode == OperationMode::Cyclic {
            debug!(port = cfg.slave_port, sequence_id = seq, "Sync received, leaving cyclic mode");
            self.tx.reset();
            self.state = SiteSyncState::RcvdSyncAfterTimeout;
        } else {
            if self.state != SiteSyncState::WaitSync {
                warn!(
                    port = cfg.slave_port,
                    sequence_id = seq,
                    state = ?self.state,
                    "Sync received before previous relay completed, abandoning it"
                );
                self.tx.reset();
            }
            self.state = SiteSyncState::TxSync;
        }
        trace!(port = cfg.slave_port, sequence_id = seq, "Sync received");
        self.ingress = switch.ingress_timestamp(cfg.switch, cfg.slave_port, seq);
        self.sync = Some(sync);
        self.fup = None;
        Ok(())
    }

    /// `Follow_Up` received on the slave port.
    pub fn rx_follow_up(&mut self, cfg: &SiteSyncConfig, frame: &[u8], crc: CrcHndl) {
        let fup = match RelayedFollowUp::receive(cfg, frame, crc) {
            RxOutcome::Accepted(fup) => fup,
            RxOutcome::ForeignDomain => return,
            RxOutcome::Dropped => {
                self.stats.follow_up_dropped = self.stats.follow_up_dropped.wrapping_add(1);
                if self.state == SiteSyncState::WaitFup {
                    self.tx.reset();
                    self.state = SiteSyncState::WaitSync;
                }
                return;
            }
        };
        let expected = self.sync.as_ref().map(|s| s.header.sequence_id);
        let waiting = matches!(
            self.state,
            SiteSyncState::TxSync | SiteSyncState::WaitFup | SiteSyncState::RcvdSyncAfterTimeout
        );
        if !waiting || self.fup.is_some() || expected != Some(fup.header.sequence_id) {
            trace!(
                port = cfg.slave_port,
                sequence_id = fup.header.sequence_id,
                ?expected,
                state = ?self.state,
                "unexpected Follow_Up ignored"
            );
            return;
        }
        self.fup = Some(fup);
        if self.state == SiteSyncState::WaitFup {
            self.state = SiteSyncState::TxFup;
            self.tx.start_fup();
        }
    }

    /// Run one main-function cycle. Returns the sample of a completely
    /// relayed received pair.
    pub fn main_function<E: EthIf, S: SwitchMgmt>(
        &mut self,
        cfg: &SiteSyncConfig,
        env: &mut RelayEnv<'_, E, S>,
    ) -> Option<SyncSample> {
        self.check_rx_timeout(cfg, env);

        if self.state == SiteSyncState::RcvdSyncAfterTimeout {
            self.mode = OperationMode::Regular;
            self.state = SiteSyncState::TxSync;
        }
        if self.state == SiteSyncState::WaitSync && self.mode == OperationMode::Cyclic {
            self.cyclic_cnt = self.cyclic_cnt.saturating_sub(1);
            if self.cyclic_cnt == 0 {
                self.synthesize(cfg, env);
            }
        }
        if self.state == SiteSyncState::TxSync {
            self.process_tx_sync(cfg, env);
        }
        if self.state == SiteSyncState::TxFup {
            return self.process_tx_fup(cfg, env);
        }
        None
    }

    fn check_rx_timeout<E, S>(&mut self, cfg: &SiteSyncConfig, env: &RelayEnv<'_, E, S>) {
        if cfg.sync_rx_timeout_cycles == 0
            || env.config.residence_time != ResidenceTime::Calculated
            || self.mode == OperationMode::Cyclic
        {
            return;
        }
        self.rx_timeout_cnt = self.rx_timeout_cnt.saturating_add(1);
        if self.rx_timeout_cnt >= cfg.sync_rx_timeout_cycles
            && self.state == SiteSyncState::WaitSync
            && self.last_valid.is_some()
        {
            debug!(port = cfg.slave_port, "Sync reception timed out, entering cyclic mode");
            self.mode = OperationMode::Cyclic;
            self.cyclic_cnt = 1;
        }
    }

    fn process_tx_sync<E: EthIf, S: SwitchMgmt>(
        &mut self,
        cfg: &SiteSyncConfig,
        env: &mut RelayEnv<'_, E, S>,
    ) {
        let Some(sync) = self.sync.as_ref() else {
            self.state = SiteSyncState::WaitSync;
            return;
        };
        if self.tx.is_idle() {
            self.tx.start_sync();
        }
        match self.tx.tx_sync(cfg, env.eth, sync) {
            TxRetry::Pending => return,
            TxRetry::Finished => {}
            TxRetry::RetryExpired => {
                if !self.tx.any_sync_sent() {
                    self.tx.reset();
                    self.state = SiteSyncState::WaitSync;
                    return;
                }
            }
        }
        self.stats.sync_fwd = self.stats.sync_fwd.wrapping_add(1);
        if self.fup.is_some() {
            self.state = SiteSyncState::TxFup;
            self.tx.start_fup();
        } else {
            self.state = SiteSyncState::WaitFup;
        }
    }

    fn process_tx_fup<E: EthIf, S: SwitchMgmt>(
        &mut self,
        cfg: &SiteSyncConfig,
        env: &mut RelayEnv<'_, E, S>,
    ) -> Option<SyncSample> {
        let fup = self.fup.as_ref()?;
        let seq = fup.header.sequence_id;
        if self.ingress.is_none() {
            self.ingress = env.switch.ingress_timestamp(cfg.switch, cfg.slave_port, seq);
        }
        if self.tx.tx_fup(cfg, env, fup, self.ingress) == TxRetry::Pending {
            return None;
        }

        if self.tx.any_fup_sent() {
            self.stats.follow_up_fwd = self.stats.follow_up_fwd.wrapping_add(1);
        }
        self.tx.reset();
        self.state = SiteSyncState::WaitSync;
        let sync = self.sync.take()?;
        let fup = self.fup.take()?;
        let ingress = self.ingress.take()?;
        let sample = if fup.synthetic {
            None
        } else {
            fup.origin_at_ingress(env.slave_pdelay_ns)
                .map(|origin| SyncSample {
                    sequence_id: seq,
                    origin,
                    ingress,
                })
        };
        self.last_valid = Some(ValidPair { sync, fup, ingress });
        sample
    }

    /// Build the next Sync/`Follow_Up` from the last valid pair, advanced by
    /// the switch time elapsed since its ingress.
    fn synthesize<E, S: SwitchMgmt>(&mut self, cfg: &SiteSyncConfig, env: &RelayEnv<'_, E, S>) {
        let Some(last) = self.last_valid.as_ref() else {
            return;
        };
        let Some(now) = env.switch.current_time(cfg.switch) else {
            trace!(port = cfg.slave_port, "switch time unavailable, synthesis skipped");
            return;
        };
        let Some(pot) = ts_minus_ts(&now, &last.ingress)
            .filter(|elapsed| *elapsed >= 0)
            .and_then(|elapsed| ts_plus_timediff(&last.fup.pot, elapsed))
        else {
            warn!(port = cfg.slave_port, "switch time not after last ingress, synthesis skipped");
            return;
        };
        let seq = last.sync.header.sequence_id.wrapping_add(1);

        let mut sync = last.sync.clone();
        sync.header.sequence_id = seq;
        wire::put_u16(&mut sync.frame, layout::HDR_SEQ_ID, seq);

        let mut fup = last.fup.clone();
        fup.header.sequence_id = seq;
        fup.pot = pot;
        fup.synthetic = true;
        wire::put_u16(&mut fup.frame, layout::HDR_SEQ_ID, seq);
        pot.encode_into(&mut fup.frame, layout::FUP_POT);

        debug!(port = cfg.slave_port, sequence_id = seq, %pot, "Sync/Follow_Up synthesized");
        let log_interval = sync.header.log_message_interval;
        self.cyclic_cnt = env.config.log_interval_to_cycles(log_interval);
        self.sync = Some(sync);
        self.fup = Some(fup);
        self.ingress = Some(now);
        self.state = SiteSyncState::TxSync;
        self.stats.synthesized = self.stats.synthesized.wrapping_add(1);
    }
}
