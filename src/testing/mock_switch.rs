//! Mock switch management
//!
//! Timestamps are keyed by port and sequence id; the switch index is
//! recorded but otherwise ignored.

use std::collections::{HashMap, HashSet};

use crate::interfaces::SwitchMgmt;
use crate::protocol::ptp::timestamp::{GlobalTimestamp, TimeDiff};
use crate::types::{PortIdx, SwitchIdx};

/// A call to [`SwitchMgmt::set_correction_time`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionCall {
    /// Target switch
    pub switch: SwitchIdx,
    /// Offset step
    pub offset: Option<TimeDiff>,
    /// Rate ratio
    pub rate_ratio: Option<f64>,
}

/// Mock switch management
#[derive(Debug, Clone)]
pub struct MockSwitch {
    /// Ingress timestamps by (port, sequence id)
    pub ingress: HashMap<(PortIdx, u16), GlobalTimestamp>,
    /// Egress timestamps by (port, sequence id)
    pub egress: HashMap<(PortIdx, u16), GlobalTimestamp>,
    /// Egress timestamps recorded but not yet reported ready
    pub held_egress: HashSet<(PortIdx, u16)>,
    /// Switch clock reading
    pub now: Option<GlobalTimestamp>,
    /// Every correction request
    pub corrections: Vec<CorrectionCall>,
    /// Result of correction requests
    pub accept_corrections: bool,
}

impl Default for MockSwitch {
    fn default() -> Self {
        Self {
            ingress: HashMap::new(),
            egress: HashMap::new(),
            held_egress: HashSet::new(),
            now: None,
            corrections: Vec::new(),
            accept_corrections: true,
        }
    }
}

impl MockSwitch {
    /// Create a switch without timestamps
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the ingress timestamp of a frame
    pub fn set_ingress(&mut self, port: PortIdx, sequence_id: u16, ts: GlobalTimestamp) {
        self.ingress.insert((port, sequence_id), ts);
    }

    /// Record the egress timestamp of a frame
    pub fn set_egress(&mut self, port: PortIdx, sequence_id: u16, ts: GlobalTimestamp) {
        self.egress.insert((port, sequence_id), ts);
    }

    /// Report the egress timestamp of a frame as not ready until released
    pub fn hold_egress(&mut self, port: PortIdx, sequence_id: u16) {
        self.held_egress.insert((port, sequence_id));
    }

    /// Report a held egress timestamp as ready
    pub fn release_egress(&mut self, port: PortIdx, sequence_id: u16) {
        self.held_egress.remove(&(port, sequence_id));
    }
}

impl SwitchMgmt for MockSwitch {
    fn is_egress_ts_ready(&self, _switch: SwitchIdx, port: PortIdx, sequence_id: u16) -> bool {
        self.egress.contains_key(&(port, sequence_id))
            && !self.held_egress.contains(&(port, sequence_id))
    }

    fn egress_timestamp(
        &self,
        _switch: SwitchIdx,
        port: PortIdx,
        sequence_id: u16,
    ) -> Option<GlobalTimestamp> {
        self.egress.get(&(port, sequence_id)).copied()
    }

    fn ingress_timestamp(
        &self,
        _switch: SwitchIdx,
        port: PortIdx,
        sequence_id: u16,
    ) -> Option<GlobalTimestamp> {
        self.ingress.get(&(port, sequence_id)).copied()
    }

    fn current_time(&self, _switch: SwitchIdx) -> Option<GlobalTimestamp> {
        self.now
    }

    fn set_correction_time(
        &mut self,
        switch: SwitchIdx,
        offset: Option<TimeDiff>,
        rate_ratio: Option<f64>,
    ) -> bool {
        self.corrections.push(CorrectionCall {
            switch,
            offset,
            rate_ratio,
        });
        self.accept_corrections
    }
}
