//! Site synchronization: transparent relay of a slave port's Sync/`Follow_Up`
//! stream through a switch to its master ports.
//!
//! ```text
//!  slave port ──Sync──> SiteSyncSyncSm ──> SiteSyncSyncTx ──> master ports
//!             ──FUP───>   (+ residence + pdelay, CRC fix-up)
//! ```
//!
//! The symmetric variant ([`SiteSyncSyncSm`]) forwards both messages in
//! software and measures the residence time from switch timestamps. The
//! asymmetric variant ([`AsymSiteSyncSyncSm`]) relies on the switch to
//! forward Sync in hardware and only relays the `Follow_Up`.

pub mod asym;
pub mod sync_sm;
pub mod sync_tx;
pub mod tlv;

#[cfg(test)]
mod tests;

pub use asym::{AsymSiteSyncState, AsymSiteSyncSyncSm};
pub use sync_sm::{OperationMode, SiteSyncState, SiteSyncSyncSm};
pub use sync_tx::{FupFwdState, SiteSyncSyncTx, SyncFwdState, TxRetry, is_sync_fwd_delay_valid};
pub use tlv::TimeTlvRx;

use tracing::{trace, warn};

use crate::crc::{self, CrcHndl};
use crate::error::Result;
use crate::protocol::ptp::message::{ArSubTlvIter, FollowUpMsg, MsgHeader, SyncMsg};
use crate::protocol::ptp::timestamp::{GlobalTimestamp, ts_plus_utimediff};
use crate::types::{EthTSynConfig, SiteSyncConfig};

/// Relay counters, incremented per message (not per port).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteSyncStatistics {
    /// Sync messages forwarded to at least one port.
    pub sync_fwd: u32,
    /// `Follow_Up` messages forwarded to at least one port.
    pub follow_up_fwd: u32,
    /// `Follow_Up` messages rejected by the sub-TLV check.
    pub follow_up_dropped: u32,
    /// Sync/`Follow_Up` pairs synthesized in cyclic mode.
    pub synthesized: u32,
}

/// Collaborators of one relay cycle.
pub struct RelayEnv<'a, E, S> {
    /// Ethernet interface.
    pub eth: &'a mut E,
    /// Switch management.
    pub switch: &'a S,
    /// CRC capability.
    pub crc: CrcHndl,
    /// Core configuration (residence time model, main-function period).
    pub config: &'a EthTSynConfig,
    /// Measured peer delay of the slave port in nanoseconds.
    pub slave_pdelay_ns: u64,
}

/// Result of checking a received frame against a relay path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxOutcome<T> {
    /// The frame belongs to the path.
    Accepted(T),
    /// The frame carries another domain number.
    ForeignDomain,
    /// A sub-TLV failed the configured CRC policy.
    Dropped,
}

/// A received Sync, kept verbatim for forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedSync {
    /// Frame bytes (declared length).
    pub frame: Vec<u8>,
    /// Decoded header.
    pub header: MsgHeader,
}

impl RelayedSync {
    /// Parse a Sync for the relay path of `cfg`.
    pub fn receive(cfg: &SiteSyncConfig, frame: &[u8]) -> Result<RxOutcome<Self>> {
        let header = SyncMsg::decode(frame)?.header;
        if header.domain_number != cfg.domain_number {
            trace!(
                port = cfg.slave_port,
                domain = header.domain_number,
                "Sync of foreign domain ignored"
            );
            return Ok(RxOutcome::ForeignDomain);
        }
        Ok(RxOutcome::Accepted(Self {
            frame: frame[..usize::from(header.message_length)].to_vec(),
            header,
        }))
    }
}

/// A received (or synthesized) `Follow_Up`, kept verbatim for forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedFollowUp {
    /// Frame bytes (declared length).
    pub frame: Vec<u8>,
    /// Decoded header.
    pub header: MsgHeader,
    /// Precise origin timestamp.
    pub pot: GlobalTimestamp,
    /// Time-secured sub-TLV and the validity of its received CRCs.
    pub time_tlv: Option<TimeTlvRx>,
    /// Built from the last valid pair instead of received.
    pub synthetic: bool,
}

impl RelayedFollowUp {
    /// Parse a `Follow_Up` for the relay path of `cfg` and check its
    /// sub-TLVs against the path's CRC policy. Malformed or oversized frames
    /// are [`RxOutcome::Dropped`] like a failed CRC check.
    #[must_use]
    pub fn receive(cfg: &SiteSyncConfig, frame: &[u8], crc: CrcHndl) -> RxOutcome<Self> {
        let msg = match FollowUpMsg::decode(frame) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(port = cfg.slave_port, %err, "malformed Follow_Up dropped");
                return RxOutcome::Dropped;
            }
        };
        let header = msg.header;
        if header.domain_number != cfg.domain_number {
            trace!(
                port = cfg.slave_port,
                domain = header.domain_number,
                "Follow_Up of foreign domain ignored"
            );
            return RxOutcome::ForeignDomain;
        }
        let frame = &frame[..usize::from(header.message_length)];
        let data_id = crc::data_id(&cfg.data_id_list, header.sequence_id);
        if let Some(tlv) = ArSubTlvIter::new(frame)
            .find(|tlv| !crc.check_sub_tlv_crc_state(frame, tlv, cfg.rx_crc_validated, data_id))
        {
            warn!(
                port = cfg.slave_port,
                sequence_id = header.sequence_id,
                tlv_type = tlv.tlv_type,
                "Follow_Up sub-TLV failed CRC check, dropped"
            );
            return RxOutcome::Dropped;
        }
        RxOutcome::Accepted(Self {
            frame: frame.to_vec(),
            header,
            pot: msg.precise_origin_timestamp,
            time_tlv: tlv::capture_time_tlv(frame, crc, data_id),
            synthetic: false,
        })
    }

    /// Global time at the slave port ingress: origin plus upstream
    /// correction plus link delay.
    #[must_use]
    pub fn origin_at_ingress(&self, slave_pdelay_ns: u64) -> Option<GlobalTimestamp> {
        let delay = self.header.correction_ns.checked_add(slave_pdelay_ns)?;
        ts_plus_utimediff(&self.pot, delay)
    }
}
