use tracing::{debug, trace, warn};

use super::{SyncSample, SyncState};
use crate::protocol::ptp::timestamp::{TimeDiff, ts_minus_ts};
use crate::types::SwtTimeSyncConfig;

/// Sample collection progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateMeasState {
    /// No sample.
    WaitFirstTs,
    /// One sample; offset known, rate not yet.
    WaitSecondTs,
    /// Two samples; a rate pair can be formed.
    TsReady,
}

/// How the switch clock is to be corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrAction {
    /// Step the clock by the offset only.
    Offset,
    /// Step the clock and set the grandmaster rate ratio.
    OffsetAndGmRate,
    /// Steer the rate ratio only, with an offset term.
    RateRegulator,
}

/// Result of one measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrVals {
    /// Synchronization verdict after hysteresis.
    pub state: SyncState,
    /// Chosen correction.
    pub action: CorrAction,
    /// Raw offset, grandmaster minus switch, in nanoseconds.
    pub raw_offset: TimeDiff,
    /// Offset step to apply.
    pub offset: Option<TimeDiff>,
    /// Rate ratio to apply, already clamped.
    pub rate_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct RateBuffer {
    active: bool,
    master_sum: f64,
    swt_sum: f64,
    cycles: u8,
}

impl RateBuffer {
    const EMPTY_ACTIVE: Self = Self {
        active: true,
        master_sum: 0.0,
        swt_sum: 0.0,
        cycles: 0,
    };
}

/// Grandmaster drift estimator and sync state classifier of one switch.
///
/// Every sample pair with consecutive sequence ids adds its master and
/// switch time differences to all active accumulation buffers, and a fresh
/// buffer is started from the pair alone. The buffer accumulated longest
/// yields the rate estimate. A buffer that reached `rate_meas_max_cycles`
/// restarts, so the windows overlap at different lengths and track a drift
/// that changes over time.
#[derive(Debug, Clone)]
pub struct RateMeas {
    state: RateMeasState,
    prev: Option<SyncSample>,
    cur: Option<SyncSample>,
    buffers: Vec<RateBuffer>,
    out_of_sync_cnt: u8,
    sync_reached: bool,
    verdict: SyncState,
    sync_cycle_cnt: u16,
    offset_rate: f64,
    applied_rate_ratio: f64,
    pending_offset: TimeDiff,
}

impl RateMeas {
    /// An estimator with `cfg.rate_meas_buffers` buffers (at least one).
    #[must_use]
    pub fn new(cfg: &SwtTimeSyncConfig) -> Self {
        let count = usize::from(cfg.rate_meas_buffers.max(1));
        let mut meas = Self {
            state: RateMeasState::WaitFirstTs,
            prev: None,
            cur: None,
            buffers: vec![RateBuffer::default(); count],
            out_of_sync_cnt: 0,
            sync_reached: false,
            verdict: SyncState::NeverSync,
            sync_cycle_cnt: 0,
            offset_rate: 0.0,
            applied_rate_ratio: 1.0,
            pending_offset: 0,
        };
        meas.reset_buffers();
        meas
    }

    /// Sample collection progress.
    #[must_use]
    pub fn state(&self) -> RateMeasState {
        self.state
    }

    /// Whether the switch was within the precision limit at least once.
    #[must_use]
    pub fn sync_reached(&self) -> bool {
        self.sync_reached
    }

    /// Rate ratio last confirmed by the switch.
    #[must_use]
    pub fn applied_rate_ratio(&self) -> f64 {
        self.applied_rate_ratio
    }

    /// Consecutive out-of-precision samples.
    #[must_use]
    pub fn out_of_sync_count(&self) -> u8 {
        self.out_of_sync_cnt
    }

    /// Number of active accumulation buffers.
    #[must_use]
    pub fn active_buffers(&self) -> usize {
        self.buffers.iter().filter(|b| b.active).count()
    }

    /// Forget all samples and measurements.
    ///
    /// The sticky sync-reached flag and the applied rate ratio survive; a
    /// verdict other than `NeverSync` becomes `Uncertain`.
    pub fn reset(&mut self) {
        self.state = RateMeasState::WaitFirstTs;
        self.prev = None;
        self.cur = None;
        self.out_of_sync_cnt = 0;
        self.sync_cycle_cnt = 0;
        self.offset_rate = 0.0;
        self.pending_offset = 0;
        if self.verdict != SyncState::NeverSync {
            self.verdict = SyncState::Uncertain;
        }
        self.reset_buffers();
    }

    fn reset_buffers(&mut self) {
        self.buffers.fill(RateBuffer::default());
        if let Some(first) = self.buffers.first_mut() {
            *first = RateBuffer::EMPTY_ACTIVE;
        }
    }

    /// Take the next sample.
    pub fn add_sample(&mut self, sample: SyncSample) {
        self.prev = self.cur.replace(sample);
        self.state = if self.prev.is_some() {
            RateMeasState::TsReady
        } else {
            RateMeasState::WaitSecondTs
        };
    }

    /// Classify the latest sample and derive the correction values.
    ///
    /// Returns `None` before the first sample or when the offset does not
    /// fit a [`TimeDiff`].
    pub fn get_sync_state_and_corr_vals(&mut self, cfg: &SwtTimeSyncConfig) -> Option<CorrVals> {
        let cur = self.cur?;
        let Some(offset) = ts_minus_ts(&cur.origin, &cur.ingress) else {
            warn!(switch = cfg.switch, sequence_id = cur.sequence_id, "offset out of range, sample ignored");
            return None;
        };
        let magnitude = offset.unsigned_abs();
        let jump = cfg.offset_jump_threshold_ns != 0 && magnitude >= cfg.offset_jump_threshold_ns;

        let state = if jump {
            self.out_of_sync_cnt = cfg.out_of_sync_count_max;
            SyncState::Unsync
        } else if magnitude < cfg.sync_precision_limit_ns {
            self.out_of_sync_cnt = 0;
            SyncState::Sync
        } else {
            self.out_of_sync_cnt = self.out_of_sync_cnt.saturating_add(1);
            if self.out_of_sync_cnt >= cfg.out_of_sync_count_max {
                SyncState::Unsync
            } else {
                self.verdict
            }
        };

        let sync_lost = self.verdict == SyncState::Sync && state != SyncState::Sync;
        if sync_lost {
            debug!(switch = cfg.switch, offset, "switch clock lost sync");
            self.sync_cycle_cnt = 0;
            self.reset_buffers();
        }
        let gm_rate = if jump || sync_lost {
            self.pending_offset = 0;
            None
        } else {
            self.measure(cfg)
        };

        let action = if jump {
            CorrAction::Offset
        } else if state == SyncState::Sync && !self.sync_reached && cfg.use_initial_offset_correction
        {
            CorrAction::OffsetAndGmRate
        } else {
            CorrAction::RateRegulator
        };
        if state == SyncState::Sync {
            self.sync_reached = true;
        }

        let rate_ratio = match action {
            CorrAction::Offset => None,
            CorrAction::OffsetAndGmRate => gm_rate.map(|r| clamp_rate_ratio(cfg, r)),
            CorrAction::RateRegulator => {
                let gm = gm_rate.unwrap_or(self.applied_rate_ratio);
                let term = self.offset_correction_term(cfg, offset, state == SyncState::Sync);
                Some(clamp_rate_ratio(cfg, gm + term))
            }
        };
        let offset_step = match action {
            CorrAction::Offset | CorrAction::OffsetAndGmRate => Some(offset),
            CorrAction::RateRegulator => None,
        };

        trace!(
            switch = cfg.switch,
            sequence_id = cur.sequence_id,
            offset,
            %state,
            ?action,
            ?rate_ratio,
            "rate measurement"
        );
        self.verdict = state;
        Some(CorrVals {
            state,
            action,
            raw_offset: offset,
            offset: offset_step,
            rate_ratio,
        })
    }

    /// The switch accepted `offset` and/or `rate_ratio`.
    ///
    /// Accumulated switch time is rescaled to the new rate, and the offset
    /// step is removed from the next switch time difference.
    pub fn correction_applied(&mut self, offset: Option<TimeDiff>, rate_ratio: Option<f64>) {
        if let Some(rate) = rate_ratio {
            if self.applied_rate_ratio > 0.0 {
                let scale = rate / self.applied_rate_ratio;
                for buffer in self.buffers.iter_mut().filter(|b| b.active) {
                    buffer.swt_sum *= scale;
                }
            }
            self.applied_rate_ratio = rate;
        }
        if let Some(offset) = offset {
            self.pending_offset = self.pending_offset.saturating_add(offset);
        }
    }

    /// Accumulate the current pair and return the absolute grandmaster rate
    /// ratio estimate.
    #[allow(clippy::cast_precision_loss, reason = "nanosecond spans well below 2^52")]
    fn measure(&mut self, cfg: &SwtTimeSyncConfig) -> Option<f64> {
        let (Some(prev), Some(cur)) = (self.prev, self.cur) else {
            return None;
        };
        let pending = std::mem::take(&mut self.pending_offset);
        if cur.sequence_id != prev.sequence_id.wrapping_add(1) {
            trace!(
                switch = cfg.switch,
                previous = prev.sequence_id,
                current = cur.sequence_id,
                "sequence gap, rate pair skipped"
            );
            return self.estimate();
        }
        let master_diff = ts_minus_ts(&cur.origin, &prev.origin)?;
        let swt_diff = ts_minus_ts(&cur.ingress, &prev.ingress)?.saturating_sub(pending);
        if master_diff <= 0 || swt_diff <= 0 {
            warn!(switch = cfg.switch, master_diff, swt_diff, "non-monotonic samples, rate buffers reset");
            self.reset_buffers();
            return None;
        }
        let (master_diff, swt_diff) = (master_diff as f64, swt_diff as f64);

        for buffer in self.buffers.iter_mut().filter(|b| b.active) {
            if buffer.cycles >= cfg.rate_meas_max_cycles {
                *buffer = RateBuffer::EMPTY_ACTIVE;
            }
            buffer.master_sum += master_diff;
            buffer.swt_sum += swt_diff;
            buffer.cycles = buffer.cycles.saturating_add(1);
        }
        if !self.buffers.iter().any(|b| b.active && b.cycles == 1) {
            if let Some(buffer) = self.buffers.iter_mut().find(|b| !b.active) {
                *buffer = RateBuffer {
                    active: true,
                    master_sum: master_diff,
                    swt_sum: swt_diff,
                    cycles: 1,
                };
            }
        }
        self.estimate()
    }

    fn estimate(&mut self) -> Option<f64> {
        let longest = self
            .buffers
            .iter()
            .filter(|b| b.active && b.cycles > 0 && b.swt_sum > 0.0)
            .max_by_key(|b| b.cycles)?;
        let rate = self.applied_rate_ratio * longest.master_sum / longest.swt_sum;
        if rate.is_finite() && rate > 0.0 {
            Some(rate)
        } else {
            warn!(rate, "rate ratio calculation failed, rate buffers reset");
            self.reset_buffers();
            None
        }
    }

    /// Rate term that removes `offset` over `offset_corr_cycles` Sync
    /// intervals. The term is fixed for a window; the window counter only
    /// runs while in sync.
    #[allow(clippy::cast_precision_loss, reason = "nanosecond offsets well below 2^52")]
    fn offset_correction_term(&mut self, cfg: &SwtTimeSyncConfig, offset: TimeDiff, in_sync: bool) -> f64 {
        if cfg.offset_corr_cycles == 0 {
            return 0.0;
        }
        if self.sync_cycle_cnt == 0 {
            let window_ns = f64::from(cfg.offset_corr_cycles) * cfg.sync_interval.as_secs_f64() * 1e9;
            self.offset_rate = if window_ns > 0.0 {
                offset as f64 / window_ns
            } else {
                0.0
            };
        }
        if in_sync {
            self.sync_cycle_cnt = (self.sync_cycle_cnt + 1) % cfg.offset_corr_cycles;
        }
        self.offset_rate
    }
}

/// Limit `rate` to the configured bounds.
#[must_use]
pub fn clamp_rate_ratio(cfg: &SwtTimeSyncConfig, rate: f64) -> f64 {
    rate.max(cfg.rate_ratio_min).min(cfg.rate_ratio_max)
}
