use tracing::{debug, info, trace, warn};

use super::rate_meas::{CorrVals, RateMeas};
use super::{SyncSample, SyncState};
use crate::interfaces::SwitchMgmt;
use crate::types::SwtTimeSyncConfig;

/// Sample availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwtTimeSyncState {
    /// Waiting for a sample.
    WaitTs,
    /// A sample awaits processing.
    TsReady,
}

/// Closed-loop correction of one switch clock.
#[derive(Debug, Clone)]
pub struct SwtTimeSyncSm {
    state: SwtTimeSyncState,
    sample: Option<SyncSample>,
    timeout_cnt: u16,
    armed: bool,
    sync_state: SyncState,
    rate_meas: RateMeas,
    last_vals: Option<CorrVals>,
}

impl SwtTimeSyncSm {
    /// Create the state machine for `cfg`.
    #[must_use]
    pub fn new(cfg: &SwtTimeSyncConfig) -> Self {
        Self {
            state: SwtTimeSyncState::WaitTs,
            sample: None,
            timeout_cnt: 0,
            armed: false,
            sync_state: SyncState::NeverSync,
            rate_meas: RateMeas::new(cfg),
            last_vals: None,
        }
    }

    /// Sample availability.
    #[must_use]
    pub fn state(&self) -> SwtTimeSyncState {
        self.state
    }

    /// Externally visible synchronization state.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    /// Drift estimator.
    #[must_use]
    pub fn rate_meas(&self) -> &RateMeas {
        &self.rate_meas
    }

    /// Correction values of the last processed sample.
    #[must_use]
    pub fn last_corr_vals(&self) -> Option<CorrVals> {
        self.last_vals
    }

    /// Hand over a Sync sample; a sample not yet processed is replaced.
    pub fn provide_sample(&mut self, sample: SyncSample) {
        self.sample = Some(sample);
        self.state = SwtTimeSyncState::TsReady;
    }

    /// Discard the pending sample and all measurements.
    pub fn reset(&mut self) {
        self.state = SwtTimeSyncState::WaitTs;
        self.sample = None;
        self.timeout_cnt = 0;
        self.rate_meas.reset();
    }

    /// Run one main-function cycle. Returns the new synchronization state
    /// when it changed.
    pub fn main_function<S: SwitchMgmt>(
        &mut self,
        cfg: &SwtTimeSyncConfig,
        switch: &mut S,
    ) -> Option<SyncState> {
        let new_state = match self.sample.take() {
            Some(sample) => {
                self.state = SwtTimeSyncState::WaitTs;
                self.timeout_cnt = 0;
                self.armed = true;
                self.process_sample(cfg, switch, sample)
            }
            None => self.check_timeout(cfg),
        }?;
        if new_state == self.sync_state {
            return None;
        }
        info!(switch = cfg.switch, from = %self.sync_state, to = %new_state, "switch sync state changed");
        self.sync_state = new_state;
        Some(new_state)
    }

    fn process_sample<S: SwitchMgmt>(
        &mut self,
        cfg: &SwtTimeSyncConfig,
        switch: &mut S,
        sample: SyncSample,
    ) -> Option<SyncState> {
        self.rate_meas.add_sample(sample);
        let vals = self.rate_meas.get_sync_state_and_corr_vals(cfg)?;
        self.last_vals = Some(vals);
        if vals.offset.is_none() && vals.rate_ratio.is_none() {
            return Some(vals.state);
        }

        if switch.set_correction_time(cfg.switch, vals.offset, vals.rate_ratio) {
            self.rate_meas.correction_applied(vals.offset, vals.rate_ratio);
            debug!(
                switch = cfg.switch,
                sequence_id = sample.sequence_id,
                offset = ?vals.offset,
                rate_ratio = ?vals.rate_ratio,
                "switch clock corrected"
            );
            if let Some(rate) = vals.rate_ratio {
                for &slave in &cfg.cascade_slaves {
                    if !switch.set_correction_time(slave, None, Some(rate)) {
                        warn!(switch = slave, rate, "cascaded rate ratio rejected");
                    }
                }
            }
        } else {
            warn!(switch = cfg.switch, sequence_id = sample.sequence_id, "switch rejected clock correction");
        }
        Some(vals.state)
    }

    fn check_timeout(&mut self, cfg: &SwtTimeSyncConfig) -> Option<SyncState> {
        if !self.armed || cfg.sync_event_timeout_cycles == 0 {
            return None;
        }
        self.timeout_cnt = self.timeout_cnt.saturating_add(1);
        if self.timeout_cnt < cfg.sync_event_timeout_cycles {
            return None;
        }
        trace!(switch = cfg.switch, "sync event timeout");
        self.armed = false;
        self.timeout_cnt = 0;
        self.rate_meas.reset();
        Some(SyncState::Uncertain)
    }
}
