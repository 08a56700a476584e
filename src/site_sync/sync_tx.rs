use tracing::{debug, trace, warn};

use super::{RelayEnv, RelayedFollowUp, RelayedSync, tlv};
use crate::crc;
use crate::interfaces::{EthIf, SwitchMgmt};
use crate::protocol::ptp::message::{PtpPortIdentity, layout};
use crate::protocol::ptp::timestamp::{GlobalTimestamp, TimeDiff, ts_minus_ts};
use crate::protocol::ptp::wire;
use crate::types::{ResidenceTime, SiteSyncConfig, SiteSyncMasterPort};

/// Sync forwarding progress of one master port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFwdState {
    /// Nothing to forward.
    None,
    /// Not yet sent.
    Pending,
    /// Sent.
    Finished,
}

/// `Follow_Up` forwarding progress of one master port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FupFwdState {
    /// Nothing to forward.
    None,
    /// Waiting for the residence time of the port.
    CalcSyncFwdDelay,
    /// Correction known, not yet sent.
    Pending,
    /// Sent, or skipped because the correction would overflow.
    Finished,
}

/// Outcome of one forwarding attempt over all ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxRetry {
    /// Every port is done.
    Finished,
    /// Some ports remain; try again next cycle.
    Pending,
    /// Retries used up; remaining ports abandoned.
    RetryExpired,
}

/// Whether `correction + residence + pdelay` is a valid forwarded correction.
///
/// A negative residence time or a sum above `2^48 - 1` is invalid.
#[must_use]
pub fn is_sync_fwd_delay_valid(correction_ns: u64, residence_ns: TimeDiff, pdelay_ns: u64) -> bool {
    if residence_ns < 0 {
        return false;
    }
    let sum = i128::from(correction_ns) + i128::from(residence_ns) + i128::from(pdelay_ns);
    sum <= i128::from(wire::U48_MAX)
}

#[derive(Debug, Clone, Copy)]
struct PortFwd {
    sync: SyncFwdState,
    fup: FupFwdState,
    residence: Option<TimeDiff>,
    correction: u64,
}

impl PortFwd {
    const IDLE: Self = Self {
        sync: SyncFwdState::None,
        fup: FupFwdState::None,
        residence: None,
        correction: 0,
    };
}

/// Per-master-port forwarding of one relayed Sync/`Follow_Up` pair.
#[derive(Debug, Clone)]
pub struct SiteSyncSyncTx {
    ports: Vec<PortFwd>,
    retry_cnt: u8,
}

impl SiteSyncSyncTx {
    /// Forwarding state for `num_ports` master ports.
    #[must_use]
    pub fn new(num_ports: usize) -> Self {
        Self {
            ports: vec![PortFwd::IDLE; num_ports],
            retry_cnt: 0,
        }
    }

    /// Whether no forwarding is in progress.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.ports
            .iter()
            .all(|p| p.sync == SyncFwdState::None && p.fup == FupFwdState::None)
    }

    /// Sync state of master port `idx`.
    #[must_use]
    pub fn sync_fwd_state(&self, idx: usize) -> Option<SyncFwdState> {
        self.ports.get(idx).map(|p| p.sync)
    }

    /// `Follow_Up` state of master port `idx`.
    #[must_use]
    pub fn fup_fwd_state(&self, idx: usize) -> Option<FupFwdState> {
        self.ports.get(idx).map(|p| p.fup)
    }

    /// Retries used for the message in progress.
    #[must_use]
    pub fn retry_count(&self) -> u8 {
        self.retry_cnt
    }

    /// Back to idle.
    pub fn reset(&mut self) {
        self.ports.fill(PortFwd::IDLE);
        self.retry_cnt = 0;
    }

    /// Begin forwarding a Sync to every port.
    pub fn start_sync(&mut self) {
        for port in &mut self.ports {
            *port = PortFwd {
                sync: SyncFwdState::Pending,
                ..PortFwd::IDLE
            };
        }
        self.retry_cnt = 0;
    }

    /// Begin forwarding a `Follow_Up` to every port whose Sync went out.
    pub fn start_fup(&mut self) {
        for port in &mut self.ports {
            port.fup = if port.sync == SyncFwdState::Finished {
                FupFwdState::CalcSyncFwdDelay
            } else {
                FupFwdState::None
            };
        }
        self.retry_cnt = 0;
    }

    /// Begin forwarding a `Follow_Up` whose Sync the switch forwarded in
    /// hardware, with residence times already known per port.
    pub fn start_fup_with_residences(&mut self, residences: &[Option<TimeDiff>]) {
        for (port, residence) in self.ports.iter_mut().zip(residences) {
            *port = match residence {
                Some(r) => PortFwd {
                    sync: SyncFwdState::Finished,
                    fup: FupFwdState::CalcSyncFwdDelay,
                    residence: Some(*r),
                    correction: 0,
                },
                None => PortFwd::IDLE,
            };
        }
        self.retry_cnt = 0;
    }

    /// Count one attempt. `all_done` reports whether every port finished.
    pub fn hndl_msg_tx_retry(&mut self, all_done: bool, num_fwd_retries: u8) -> TxRetry {
        if all_done {
            TxRetry::Finished
        } else if self.retry_cnt < num_fwd_retries {
            self.retry_cnt += 1;
            TxRetry::Pending
        } else {
            TxRetry::RetryExpired
        }
    }

    /// Send the Sync to every pending port.
    pub fn tx_sync<E: EthIf>(
        &mut self,
        cfg: &SiteSyncConfig,
        eth: &mut E,
        sync: &RelayedSync,
    ) -> TxRetry {
        for (port, master) in self.ports.iter_mut().zip(&cfg.master_ports) {
            if port.sync != SyncFwdState::Pending {
                continue;
            }
            if transmit_copy(cfg, eth, master, &sync.frame, |_| {}) {
                port.sync = SyncFwdState::Finished;
            }
        }
        let all_done = self.ports.iter().all(|p| p.sync != SyncFwdState::Pending);
        let result = self.hndl_msg_tx_retry(all_done, cfg.num_fwd_retries);
        if result == TxRetry::RetryExpired {
            warn!(
                port = cfg.slave_port,
                sequence_id = sync.header.sequence_id,
                "Sync forward retries exhausted"
            );
            for port in &mut self.ports {
                if port.sync == SyncFwdState::Pending {
                    port.sync = SyncFwdState::None;
                }
            }
        }
        result
    }

    /// Whether the Sync reached at least one port.
    #[must_use]
    pub fn any_sync_sent(&self) -> bool {
        self.ports.iter().any(|p| p.sync == SyncFwdState::Finished)
    }

    /// Whether the `Follow_Up` reached at least one port.
    #[must_use]
    pub fn any_fup_sent(&self) -> bool {
        self.ports
            .iter()
            .any(|p| p.fup == FupFwdState::Finished && p.residence.is_some())
    }

    /// Compute pending corrections and send the `Follow_Up` to every ready
    /// port. `ingress` is the slave port ingress time of the Sync.
    pub fn tx_fup<E: EthIf, S: SwitchMgmt>(
        &mut self,
        cfg: &SiteSyncConfig,
        env: &mut RelayEnv<'_, E, S>,
        fup: &RelayedFollowUp,
        ingress: Option<GlobalTimestamp>,
    ) -> TxRetry {
        let seq = fup.header.sequence_id;
        for (port, master) in self.ports.iter_mut().zip(&cfg.master_ports) {
            if port.fup == FupFwdState::CalcSyncFwdDelay {
                calc_sync_fwd_delay(cfg, env, master, seq, ingress, fup, port);
            }
        }

        let data_id = crc::data_id(&cfg.data_id_list, seq);
        for (port, master) in self.ports.iter_mut().zip(&cfg.master_ports) {
            if port.fup != FupFwdState::Pending {
                continue;
            }
            let correction = port.correction;
            let recompute = fup.synthetic
                || correction != fup.header.correction_ns
                || !cfg.keep_src_port_identity;
            let crc = env.crc;
            let sent = transmit_copy(cfg, env.eth, master, &fup.frame, |buf| {
                wire::put_u48(buf, layout::HDR_CORRECTION, correction);
                if let Some(rx) = &fup.time_tlv {
                    tlv::update_time_tlv(buf, rx, recompute, crc, data_id);
                }
            });
            if sent {
                trace!(port = master.port, sequence_id = seq, correction, "Follow_Up forwarded");
                port.fup = FupFwdState::Finished;
            }
        }

        let all_done = self
            .ports
            .iter()
            .all(|p| matches!(p.fup, FupFwdState::None | FupFwdState::Finished));
        let result = self.hndl_msg_tx_retry(all_done, cfg.num_fwd_retries);
        if result == TxRetry::RetryExpired {
            warn!(
                port = cfg.slave_port,
                sequence_id = seq,
                "Follow_Up forward retries exhausted"
            );
        }
        result
    }
}

/// Resolve the residence time of one port and derive its new correction.
fn calc_sync_fwd_delay<E, S: SwitchMgmt>(
    cfg: &SiteSyncConfig,
    env: &RelayEnv<'_, E, S>,
    master: &SiteSyncMasterPort,
    seq: u16,
    ingress: Option<GlobalTimestamp>,
    fup: &RelayedFollowUp,
    port: &mut PortFwd,
) {
    if port.residence.is_none() {
        port.residence = match env.config.residence_time {
            ResidenceTime::Fixed { nanoseconds } => TimeDiff::try_from(nanoseconds).ok(),
            ResidenceTime::Calculated => {
                let egress = env
                    .switch
                    .is_egress_ts_ready(cfg.switch, master.port, seq)
                    .then(|| env.switch.egress_timestamp(cfg.switch, master.port, seq))
                    .flatten();
                egress.zip(ingress).and_then(|(e, i)| ts_minus_ts(&e, &i))
            }
        };
    }
    let Some(residence) = port.residence else {
        trace!(port = master.port, sequence_id = seq, "residence time not yet available");
        return;
    };
    let original = fup.header.correction_ns;
    if !is_sync_fwd_delay_valid(original, residence, env.slave_pdelay_ns) {
        warn!(
            port = master.port,
            sequence_id = seq,
            residence,
            "forwarded correction out of range, Follow_Up not forwarded"
        );
        port.residence = None;
        port.fup = FupFwdState::Finished;
        return;
    }
    // Range checked above.
    port.correction = original + residence.unsigned_abs() + env.slave_pdelay_ns;
    debug!(
        port = master.port,
        sequence_id = seq,
        residence,
        correction = port.correction,
        "forward delay computed"
    );
    port.fup = FupFwdState::Pending;
}

/// Copy `frame` into a fresh buffer, replace the source port identity if
/// configured, apply `edit` and send it on `master`.
fn transmit_copy<E: EthIf>(
    cfg: &SiteSyncConfig,
    eth: &mut E,
    master: &SiteSyncMasterPort,
    frame: &[u8],
    edit: impl FnOnce(&mut [u8]),
) -> bool {
    if !eth.is_link_active(master.port) {
        return false;
    }
    let len = frame.len();
    let Some(mut buffer) = eth.acquire_tx_buffer(master.port, len) else {
        trace!(port = master.port, "no tx buffer for relay");
        return false;
    };
    let buf = &mut buffer.data[..len];
    buf.copy_from_slice(frame);
    if !cfg.keep_src_port_identity {
        PtpPortIdentity::new(master.clock_identity, master.port_number)
            .encode_into(buf, layout::HDR_CLOCK_ID);
    }
    edit(buf);
    eth.transmit(master.port, buffer, len, false)
}
