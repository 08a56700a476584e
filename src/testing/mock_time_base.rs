//! Mock synchronized time base
//!
//! Keeps global time and virtual local time in lock step so tests can move
//! time forward deterministically.

use std::collections::HashMap;

use crate::interfaces::{OffsetTime, TimeBase, TimeBaseStatus, TimeTuple, UserData};
use crate::protocol::ptp::timestamp::{GlobalTimestamp, VirtualLocalTime, ts_plus_utimediff};
use crate::types::TimeBaseId;

/// Mock time base; every id maps to the same clock
#[derive(Debug, Clone, Default)]
pub struct MockTimeBase {
    /// Current global time
    pub global_time: GlobalTimestamp,
    /// Current virtual local time in nanoseconds
    pub virtual_local_time: u64,
    /// Status bits
    pub status: TimeBaseStatus,
    /// Update counter
    pub update_counter: u8,
    /// User data
    pub user_data: UserData,
    /// Offset time bases by id
    pub offsets: HashMap<TimeBaseId, OffsetTime>,
}

impl MockTimeBase {
    /// A time base carrying global time `global` with local counter `vlt_ns`
    #[must_use]
    pub fn synchronized(global: GlobalTimestamp, vlt_ns: u64) -> Self {
        Self {
            global_time: global,
            virtual_local_time: vlt_ns,
            status: TimeBaseStatus(TimeBaseStatus::GLOBAL_TIME_BASE),
            ..Self::default()
        }
    }

    /// Move both clocks forward
    pub fn advance(&mut self, nanos: u64) {
        if let Some(next) = ts_plus_utimediff(&self.global_time, nanos) {
            self.global_time = next;
        }
        self.virtual_local_time = self.virtual_local_time.wrapping_add(nanos);
    }

    /// Signal a discontinuous time base update
    pub fn bump_update_counter(&mut self) {
        self.update_counter = self.update_counter.wrapping_add(1);
    }
}

impl TimeBase for MockTimeBase {
    fn current_time_tuple(&self, _time_base: TimeBaseId) -> Option<TimeTuple> {
        Some(TimeTuple {
            global_time: self.global_time,
            virtual_local_time: VirtualLocalTime::from_nanos(self.virtual_local_time),
            status: self.status,
            user_data: self.user_data,
        })
    }

    fn time_base_status(&self, _time_base: TimeBaseId) -> TimeBaseStatus {
        self.status
    }

    fn update_counter(&self, _time_base: TimeBaseId) -> u8 {
        self.update_counter
    }

    fn offset(&self, time_base: TimeBaseId) -> Option<OffsetTime> {
        self.offsets.get(&time_base).copied()
    }

    fn current_virtual_local_time(&self, _time_base: TimeBaseId) -> Option<VirtualLocalTime> {
        Some(VirtualLocalTime::from_nanos(self.virtual_local_time))
    }
}
