use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace, warn};

use super::port_sync_send::PortSyncSendSm;
use super::sync_send_tx::{self, FollowUpParams};
use super::{MasterStatistics, TxEnv};
use crate::exclusive::with_exclusive_area;
use crate::interfaces::{EthIf, TimeBase, TimeTuple};
use crate::protocol::ptp::message::{MsgHeader, PtpMessageType, PtpPortIdentity, write_sync_body};
use crate::protocol::ptp::timestamp::{
    GlobalTimestamp, TimeDiff, VirtualLocalTime, ts_minus_ts, ts_plus_timediff, ts_to_vlt,
    vlt_minus_vlt,
};
use crate::types::MasterPortConfig;

/// State of a master port's Sync/`Follow_Up` cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSendState {
    /// Waiting for global time and link.
    Initializing,
    /// Next cycle sends a Sync on the regular interval.
    TxCyclicSync,
    /// Next cycle sends a Sync for a time base update.
    TxImmediateSync,
    /// Sync sent, waiting for its egress timestamp.
    WaitSyncEgrTs,
    /// Correction known, `Follow_Up` pending.
    TxFup,
    /// Cycle complete.
    WaitTxSync,
}

/// A `Follow_Up` that left the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpSent {
    /// Sequence id shared by the Sync and `Follow_Up`.
    pub sequence_id: u16,
    /// Precise origin timestamp plus correction: the global time at Sync egress.
    pub origin: GlobalTimestamp,
}

/// Sync/`Follow_Up` transmission of one master port.
#[derive(Debug)]
pub struct SyncSendSm {
    state: SyncSendState,
    port: PortSyncSendSm,
    tx_interval_cnt: u16,
    sequence_id: u16,
    tx_sequence_id: u16,
    last_update_counter: Option<u8>,
    sync_tx_info: Option<TimeTuple>,
    correction_ns: u64,
    reset: Arc<AtomicBool>,
}

impl SyncSendSm {
    /// Create the state machine for `cfg`.
    #[must_use]
    pub fn new(cfg: &MasterPortConfig) -> Self {
        Self {
            state: SyncSendState::Initializing,
            port: PortSyncSendSm::new(cfg.port, cfg.always_as_capable),
            tx_interval_cnt: 0,
            sequence_id: 0,
            tx_sequence_id: 0,
            last_update_counter: None,
            sync_tx_info: None,
            correction_ns: 0,
            reset: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SyncSendState {
        self.state
    }

    /// Sequence id of the next Sync.
    #[must_use]
    pub fn sequence_id(&self) -> u16 {
        self.sequence_id
    }

    /// Per-port transmission sequence.
    #[must_use]
    pub fn port_sm(&self) -> &PortSyncSendSm {
        &self.port
    }

    /// Mutable per-port transmission sequence.
    pub fn port_sm_mut(&mut self) -> &mut PortSyncSendSm {
        &mut self.port
    }

    /// Flag that returns the state machine to initializing on its next cycle.
    #[must_use]
    pub fn reset_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.reset)
    }

    /// Whether a reset is waiting for the next cycle.
    #[must_use]
    pub fn reset_pending(&self) -> bool {
        self.reset.load(Ordering::Acquire)
    }

    /// Run one main-function cycle.
    pub fn main_function<T: TimeBase, E: EthIf>(
        &mut self,
        cfg: &MasterPortConfig,
        env: &mut TxEnv<'_, T, E>,
        stats: &mut MasterStatistics,
    ) -> Option<FollowUpSent> {
        if self.reset.swap(false, Ordering::AcqRel) {
            debug!(port = cfg.port, "sync send reset");
            self.port.cancel();
            self.state = SyncSendState::Initializing;
        }

        if self.state == SyncSendState::Initializing {
            if !env.time_base.time_base_status(cfg.time_base).is_global_time_base()
                || !env.eth.is_link_active(cfg.port)
            {
                return None;
            }
            self.last_update_counter = Some(env.time_base.update_counter(cfg.time_base));
            self.state = if cfg.sync_interval_cycles == 0 {
                SyncSendState::TxImmediateSync
            } else {
                SyncSendState::TxCyclicSync
            };
            debug!(port = cfg.port, state = ?self.state, "sync send initialized");
        } else {
            self.advance_timers(cfg, env.time_base);
        }

        if matches!(
            self.state,
            SyncSendState::TxCyclicSync | SyncSendState::TxImmediateSync
        ) {
            self.tx_sync(cfg, env, stats);
        }
        if self.state == SyncSendState::WaitSyncEgrTs {
            self.process_egress_ts(cfg, env);
        }
        if self.state == SyncSendState::TxFup {
            return self.tx_fup(cfg, env, stats);
        }
        None
    }

    /// Immediate trigger and interval countdown.
    fn advance_timers<T: TimeBase>(&mut self, cfg: &MasterPortConfig, time_base: &T) {
        let counter = time_base.update_counter(cfg.time_base);
        let updated = self.last_update_counter.is_some_and(|last| last != counter);
        self.last_update_counter = Some(counter);

        if updated && (cfg.immediate_time_sync || cfg.sync_interval_cycles == 0) {
            if self.state != SyncSendState::WaitTxSync {
                debug!(port = cfg.port, state = ?self.state, "immediate Sync cancels cycle");
            }
            self.port.cancel();
            self.state = SyncSendState::TxImmediateSync;
            return;
        }

        if cfg.sync_interval_cycles == 0 {
            return;
        }
        self.tx_interval_cnt = self.tx_interval_cnt.saturating_sub(1);
        if self.tx_interval_cnt == 0 && self.state != SyncSendState::TxImmediateSync {
            if matches!(
                self.state,
                SyncSendState::WaitSyncEgrTs | SyncSendState::TxFup
            ) {
                warn!(
                    port = cfg.port,
                    sequence_id = self.tx_sequence_id,
                    state = ?self.state,
                    "sync interval expired, abandoning Follow_Up"
                );
                self.port.cancel();
            }
            self.state = SyncSendState::TxCyclicSync;
        }
    }

    fn tx_sync<T: TimeBase, E: EthIf>(
        &mut self,
        cfg: &MasterPortConfig,
        env: &mut TxEnv<'_, T, E>,
        stats: &mut MasterStatistics,
    ) {
        let Some(tuple) = env.time_base.current_time_tuple(cfg.time_base) else {
            return;
        };
        let mut header = MsgHeader::new(
            PtpMessageType::Sync,
            PtpPortIdentity::new(cfg.clock_identity, cfg.port_number),
            self.sequence_id,
        );
        header.domain_number = cfg.domain_number;
        header.log_message_interval = cfg.log_sync_interval;

        let sent = self.port.tx_sync(env.eth, |buf| {
            header.encode_into(buf);
            write_sync_body(buf);
        });
        if !sent {
            return;
        }

        trace!(port = cfg.port, sequence_id = self.sequence_id, "Sync sent");
        self.tx_interval_cnt = if self.state == SyncSendState::TxImmediateSync {
            cfg.cyclic_msg_resume_cycles.max(1)
        } else {
            cfg.sync_interval_cycles
        };
        self.sync_tx_info = Some(tuple);
        self.tx_sequence_id = self.sequence_id;
        self.sequence_id = self.sequence_id.wrapping_add(1);
        stats.sync_tx = stats.sync_tx.wrapping_add(1);
        self.state = SyncSendState::WaitSyncEgrTs;
    }

    fn process_egress_ts<T: TimeBase, E: EthIf>(
        &mut self,
        cfg: &MasterPortConfig,
        env: &TxEnv<'_, T, E>,
    ) {
        let Some(egress) = self.port.get_sync_egr_ts() else {
            return;
        };
        let correction = self.sync_tx_info.and_then(|info| {
            self.egress_correction(cfg, env, &egress, &info.virtual_local_time)
        });
        match correction.and_then(|c| u64::try_from(c).ok()) {
            Some(c) if MsgHeader::correction_fits(c) => {
                self.correction_ns = c;
                self.state = SyncSendState::TxFup;
            }
            _ => {
                warn!(
                    port = cfg.port,
                    sequence_id = self.tx_sequence_id,
                    ?correction,
                    "no valid Sync correction, Follow_Up suppressed"
                );
                self.port.cancel();
                self.state = SyncSendState::WaitTxSync;
            }
        }
    }

    /// Time from capturing the time tuple to Sync egress, in nanoseconds.
    fn egress_correction<T: TimeBase, E: EthIf>(
        &self,
        cfg: &MasterPortConfig,
        env: &TxEnv<'_, T, E>,
        egress: &GlobalTimestamp,
        captured: &VirtualLocalTime,
    ) -> Option<TimeDiff> {
        let egress_vlt = if cfg.hw_timestamp_independent_clock {
            let (hw_now, vlt_now) = with_exclusive_area(|| {
                (
                    env.eth.current_time(cfg.port),
                    env.time_base.current_virtual_local_time(cfg.time_base),
                )
            });
            let elapsed = ts_minus_ts(&hw_now?, egress)?;
            let vlt_now = vlt_now?.as_nanos();
            if elapsed < 0 || elapsed.unsigned_abs() > vlt_now {
                return None;
            }
            VirtualLocalTime::from_nanos(vlt_now - elapsed.unsigned_abs())
        } else {
            ts_to_vlt(egress)?
        };
        vlt_minus_vlt(&egress_vlt, captured)
    }

    fn tx_fup<T: TimeBase, E: EthIf>(
        &mut self,
        cfg: &MasterPortConfig,
        env: &mut TxEnv<'_, T, E>,
        stats: &mut MasterStatistics,
    ) -> Option<FollowUpSent> {
        let info = self.sync_tx_info?;
        let mut header = MsgHeader::new(
            PtpMessageType::FollowUp,
            PtpPortIdentity::new(cfg.clock_identity, cfg.port_number),
            self.tx_sequence_id,
        );
        header.domain_number = cfg.domain_number;
        header.log_message_interval = cfg.log_sync_interval;
        header.correction_ns = self.correction_ns;

        let params = FollowUpParams {
            header,
            sync_tx_info: &info,
        };
        let max_len = sync_send_tx::follow_up_length(cfg, env.compliance, env.crc);
        let (time_base, crc, compliance) = (env.time_base, env.crc, env.compliance);
        let sent = self.port.tx_fup(env.eth, max_len, |buf| {
            Some(sync_send_tx::write_follow_up(
                buf, &params, cfg, time_base, crc, compliance,
            ))
        });
        if !sent {
            return None;
        }

        trace!(
            port = cfg.port,
            sequence_id = self.tx_sequence_id,
            correction_ns = self.correction_ns,
            "Follow_Up sent"
        );
        stats.follow_up_tx = stats.follow_up_tx.wrapping_add(1);
        self.state = SyncSendState::WaitTxSync;
        let correction = TimeDiff::try_from(self.correction_ns).ok()?;
        Some(FollowUpSent {
            sequence_id: self.tx_sequence_id,
            origin: ts_plus_timediff(&info.global_time, correction)?,
        })
    }
}
