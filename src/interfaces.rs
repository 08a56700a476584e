//! Collaborators the time synchronization core drives.
//!
//! The core never touches hardware directly. It queries the synchronized time
//! base, transmits through an Ethernet interface and, on switches, reads
//! ingress/egress timestamps and steers the switch clock through these
//! traits. Implementations are supplied by the integrator; [`crate::testing`]
//! provides in-memory mocks.

use bytes::BytesMut;

use crate::protocol::ptp::timestamp::{GlobalTimestamp, TimeDiff, VirtualLocalTime};
use crate::types::{PortIdx, SwitchIdx, TimeBaseId};

/// Status bits of a synchronized time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TimeBaseStatus(pub u8);

impl TimeBaseStatus {
    /// No synchronization event within the timeout.
    pub const TIMEOUT: u8 = 0x01;
    /// Synchronized to a gateway rather than the grandmaster.
    pub const SYNC_TO_GATEWAY: u8 = 0x04;
    /// Global time has been set at least once.
    pub const GLOBAL_TIME_BASE: u8 = 0x08;
    /// Last update jumped into the future.
    pub const TIMELEAP_FUTURE: u8 = 0x10;
    /// Last update jumped into the past.
    pub const TIMELEAP_PAST: u8 = 0x20;

    /// Whether `bit` is set.
    #[must_use]
    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    /// Whether the time base carries global time.
    #[must_use]
    pub fn is_global_time_base(self) -> bool {
        self.contains(Self::GLOBAL_TIME_BASE)
    }
}

/// User data attached to a time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct UserData {
    /// Number of valid bytes (0..=3).
    pub length: u8,
    /// Bytes 0..2.
    pub bytes: [u8; 3],
}

/// Global time and virtual local time sampled together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeTuple {
    /// Synchronized time.
    pub global_time: GlobalTimestamp,
    /// Free-running local counter at the same instant.
    pub virtual_local_time: VirtualLocalTime,
    /// Time base status at the same instant.
    pub status: TimeBaseStatus,
    /// User data at the same instant.
    pub user_data: UserData,
}

/// Offset time base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffsetTime {
    /// Offset to the underlying synchronized time base.
    pub offset: GlobalTimestamp,
    /// Status of the offset time base.
    pub status: TimeBaseStatus,
    /// User data of the offset time base.
    pub user_data: UserData,
}

/// Synchronized time base provider.
pub trait TimeBase {
    /// Global time, virtual local time, status and user data sampled atomically.
    fn current_time_tuple(&self, time_base: TimeBaseId) -> Option<TimeTuple>;

    /// Current status.
    fn time_base_status(&self, time_base: TimeBaseId) -> TimeBaseStatus;

    /// Counter incremented on every discontinuous update of the time base.
    fn update_counter(&self, time_base: TimeBaseId) -> u8;

    /// Value of an offset time base.
    fn offset(&self, time_base: TimeBaseId) -> Option<OffsetTime>;

    /// Current virtual local time.
    fn current_virtual_local_time(&self, time_base: TimeBaseId) -> Option<VirtualLocalTime>;
}

/// A transmit buffer lent by the Ethernet interface.
///
/// A buffer must be handed back through [`EthIf::transmit`] or
/// [`EthIf::release_tx_buffer`].
#[derive(Debug)]
pub struct TxBuffer {
    /// Driver buffer index.
    pub index: u8,
    /// Frame payload, at least the requested length.
    pub data: BytesMut,
}

impl TxBuffer {
    /// A zeroed buffer of `len` bytes.
    #[must_use]
    pub fn zeroed(index: u8, len: usize) -> Self {
        Self {
            index,
            data: BytesMut::zeroed(len),
        }
    }
}

/// Ethernet interface.
pub trait EthIf {
    /// Whether the port's link is up.
    fn is_link_active(&self, port: PortIdx) -> bool;

    /// Borrow a transmit buffer of at least `len` bytes.
    fn acquire_tx_buffer(&mut self, port: PortIdx, len: usize) -> Option<TxBuffer>;

    /// Send the first `len` bytes of `buffer`. With `egress_ts` the driver
    /// later reports the egress timestamp through
    /// [`crate::EthTSyn::tx_confirmation`]. The buffer is returned to the
    /// driver whether or not transmission succeeds.
    fn transmit(&mut self, port: PortIdx, buffer: TxBuffer, len: usize, egress_ts: bool) -> bool;

    /// Return an unused buffer.
    fn release_tx_buffer(&mut self, port: PortIdx, buffer: TxBuffer);

    /// Current time of the port's hardware clock.
    fn current_time(&self, port: PortIdx) -> Option<GlobalTimestamp>;
}

/// Switch management.
pub trait SwitchMgmt {
    /// Whether the egress timestamp of frame `sequence_id` on `port` is available.
    fn is_egress_ts_ready(&self, switch: SwitchIdx, port: PortIdx, sequence_id: u16) -> bool;

    /// Egress timestamp of Sync `sequence_id` on `port`.
    fn egress_timestamp(
        &self,
        switch: SwitchIdx,
        port: PortIdx,
        sequence_id: u16,
    ) -> Option<GlobalTimestamp>;

    /// Ingress timestamp of Sync `sequence_id` on `port`.
    fn ingress_timestamp(
        &self,
        switch: SwitchIdx,
        port: PortIdx,
        sequence_id: u16,
    ) -> Option<GlobalTimestamp>;

    /// Current time of the switch clock.
    fn current_time(&self, switch: SwitchIdx) -> Option<GlobalTimestamp>;

    /// Step the switch clock by `offset` and/or set its rate ratio.
    fn set_correction_time(
        &mut self,
        switch: SwitchIdx,
        offset: Option<TimeDiff>,
        rate_ratio: Option<f64>,
    ) -> bool;
}

/// Switch management for hosts without a switch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSwitch;

impl SwitchMgmt for NoSwitch {
    fn is_egress_ts_ready(&self, _switch: SwitchIdx, _port: PortIdx, _sequence_id: u16) -> bool {
        false
    }

    fn egress_timestamp(
        &self,
        _switch: SwitchIdx,
        _port: PortIdx,
        _sequence_id: u16,
    ) -> Option<GlobalTimestamp> {
        None
    }

    fn ingress_timestamp(
        &self,
        _switch: SwitchIdx,
        _port: PortIdx,
        _sequence_id: u16,
    ) -> Option<GlobalTimestamp> {
        None
    }

    fn current_time(&self, _switch: SwitchIdx) -> Option<GlobalTimestamp> {
        None
    }

    fn set_correction_time(
        &mut self,
        _switch: SwitchIdx,
        _offset: Option<TimeDiff>,
        _rate_ratio: Option<f64>,
    ) -> bool {
        false
    }
}
