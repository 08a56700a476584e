//! The `EthTSyn` facade.
//!
//! Owns the collaborators and one state machine per configured master port,
//! relay path and switch time sync instance. A scheduler calls
//! [`EthTSyn::main_function`] once per configured period; received frames
//! and driver notifications enter through the remaining methods.
//!
//! ```text
//! main_function:  master ports ──FollowUpSent──┐
//!                 relay paths  ──SyncSample────┼──> switch time sync ──> callback
//! ```


use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::crc::CrcHndl;
use crate::error::{ConfigError, Result};
use crate::interfaces::{EthIf, NoSwitch, SwitchMgmt, TimeBase};
use crate::master::{EgressTsSlot, MasterPort, MasterStatistics, TxEnv, sync_send_tx};
use crate::protocol::ptp::timestamp::GlobalTimestamp;
use crate::site_sync::{AsymSiteSyncSyncSm, RelayEnv, SiteSyncStatistics, SiteSyncSyncSm};
use crate::swt_sync::{SwtTimeSyncSm, SyncSample, SyncState};
use crate::types::{EthTSynConfig, PortIdx, SiteSyncConfig};

/// Called with the switch time sync index and its new state.
pub type SyncStateCallback = Box<dyn FnMut(usize, SyncState) + Send>;

/// The relay state machine of one site sync path.
#[derive(Debug)]
pub enum SiteSyncRelay {
    /// Sync and `Follow_Up` relayed in software.
    Symmetric(SiteSyncSyncSm),
    /// Sync forwarded by the switch, `Follow_Up` relayed in software.
    Asymmetric(AsymSiteSyncSyncSm),
}

impl SiteSyncRelay {
    fn new(cfg: &SiteSyncConfig) -> Self {
        if cfg.asymmetric {
            Self::Asymmetric(AsymSiteSyncSyncSm::new(cfg))
        } else {
            Self::Symmetric(SiteSyncSyncSm::new(cfg))
        }
    }

    /// Relay counters.
    #[must_use]
    pub fn statistics(&self) -> SiteSyncStatistics {
        match self {
            Self::Symmetric(sm) => sm.statistics(),
            Self::Asymmetric(sm) => sm.statistics(),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Symmetric(sm) => sm.reset(),
            Self::Asymmetric(sm) => sm.reset(),
        }
    }

    fn main_function<E: EthIf, S: SwitchMgmt>(
        &mut self,
        cfg: &SiteSyncConfig,
        env: &mut RelayEnv<'_, E, S>,
    ) -> Option<SyncSample> {
        match self {
            Self::Symmetric(sm) => sm.main_function(cfg, env),
            Self::Asymmetric(sm) => sm.main_function(cfg, env),
        }
    }
}

/// Snapshot of every transmission and relay counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EthTSynStatistics {
    /// Per master port, in configuration order.
    pub master_ports: Vec<(PortIdx, MasterStatistics)>,
    /// Per relay path, in configuration order.
    pub site_sync: Vec<SiteSyncStatistics>,
}

/// Startup consistency check of a whole configuration.
pub fn verify_cfg(config: &EthTSynConfig) -> std::result::Result<(), ConfigError> {
    if config.main_function_period.is_zero() {
        return Err(ConfigError::InvalidMainFunctionPeriod);
    }
    let crc = CrcHndl::new(config.crc_support);
    let swt_count = config.swt_time_sync.len();
    let check_swt = |index: Option<usize>| match index {
        Some(index) if index >= swt_count => Err(ConfigError::UnknownSwtTimeSync { index }),
        _ => Ok(()),
    };

    for port in &config.master_ports {
        sync_send_tx::verify_cfg(port, config.message_compliance, crc)?;
        if port.announce.is_some_and(|a| a.interval_cycles == 0) {
            return Err(ConfigError::InvalidAnnounceInterval { port: port.port });
        }
        check_swt(port.swt_time_sync)?;
    }
    for path in &config.site_sync {
        if path.master_ports.is_empty() {
            return Err(ConfigError::SiteSyncWithoutMasterPorts {
                slave_port: path.slave_port,
            });
        }
        check_swt(path.swt_time_sync)?;
    }
    for swt in &config.swt_time_sync {
        if swt.rate_meas_buffers == 0 || swt.rate_meas_max_cycles == 0 || swt.offset_corr_cycles == 0 {
            return Err(ConfigError::InvalidRateMeasurement);
        }
        let (min, max) = (swt.rate_ratio_min, swt.rate_ratio_max);
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min <= 1.0 && max >= 1.0) {
            return Err(ConfigError::InvalidRateRatioBounds {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
    }
    Ok(())
}

/// gPTP time synchronization core.
///
/// `T` supplies the synchronized time base, `E` the Ethernet interface and
/// `S` the switch management ([`NoSwitch`] on hosts without a switch).
pub struct EthTSyn<T, E, S = NoSwitch> {
    config: EthTSynConfig,
    crc: CrcHndl,
    time_base: T,
    eth: E,
    switch: S,
    masters: Vec<MasterPort>,
    relays: Vec<SiteSyncRelay>,
    swt: Vec<SwtTimeSyncSm>,
    pdelay: HashMap<PortIdx, u64>,
    callback: Option<SyncStateCallback>,
}

impl<T: TimeBase, E: EthIf> EthTSyn<T, E, NoSwitch> {
    /// Create a core without switch management.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EthTSynError::Config`] if the configuration is
    /// inconsistent.
    pub fn new(config: EthTSynConfig, time_base: T, eth: E) -> Result<Self> {
        Self::with_switch(config, time_base, eth, NoSwitch)
    }
}

impl<T: TimeBase, E: EthIf, S: SwitchMgmt> EthTSyn<T, E, S> {
    /// Create a core driving the given switch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EthTSynError::Config`] if the configuration is
    /// inconsistent.
    pub fn with_switch(config: EthTSynConfig, time_base: T, eth: E, switch: S) -> Result<Self> {
        verify_cfg(&config)?;
        let masters = config.master_ports.iter().map(MasterPort::new).collect();
        let relays = config.site_sync.iter().map(SiteSyncRelay::new).collect();
        let swt = config.swt_time_sync.iter().map(SwtTimeSyncSm::new).collect();
        debug!(
            master_ports = config.master_ports.len(),
            site_sync = config.site_sync.len(),
            swt_time_sync = config.swt_time_sync.len(),
            "EthTSyn initialized"
        );
        Ok(Self {
            crc: CrcHndl::new(config.crc_support),
            config,
            time_base,
            eth,
            switch,
            masters,
            relays,
            swt,
            pdelay: HashMap::new(),
            callback: None,
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EthTSynConfig {
        &self.config
    }

    /// Synchronized time base.
    #[must_use]
    pub fn time_base(&self) -> &T {
        &self.time_base
    }

    /// Mutable synchronized time base.
    pub fn time_base_mut(&mut self) -> &mut T {
        &mut self.time_base
    }

    /// Ethernet interface.
    #[must_use]
    pub fn eth(&self) -> &E {
        &self.eth
    }

    /// Mutable Ethernet interface.
    pub fn eth_mut(&mut self) -> &mut E {
        &mut self.eth
    }

    /// Switch management.
    #[must_use]
    pub fn switch(&self) -> &S {
        &self.switch
    }

    /// Mutable switch management.
    pub fn switch_mut(&mut self) -> &mut S {
        &mut self.switch
    }

    /// State of the master port on `port`.
    #[must_use]
    pub fn master_port(&self, port: PortIdx) -> Option<&MasterPort> {
        self.master_index(port).map(|idx| &self.masters[idx])
    }

    /// Relay path `idx` in configuration order.
    #[must_use]
    pub fn site_sync(&self, idx: usize) -> Option<&SiteSyncRelay> {
        self.relays.get(idx)
    }

    /// Switch time sync instance `idx` in configuration order.
    #[must_use]
    pub fn swt_time_sync(&self, idx: usize) -> Option<&SwtTimeSyncSm> {
        self.swt.get(idx)
    }

    /// Synchronization state of switch time sync instance `idx`.
    #[must_use]
    pub fn sync_state(&self, idx: usize) -> Option<SyncState> {
        self.swt.get(idx).map(SwtTimeSyncSm::sync_state)
    }

    /// Every transmission and relay counter.
    #[must_use]
    pub fn statistics(&self) -> EthTSynStatistics {
        EthTSynStatistics {
            master_ports: self
                .masters
                .iter()
                .zip(&self.config.master_ports)
                .map(|(m, cfg)| (cfg.port, m.statistics()))
                .collect(),
            site_sync: self.relays.iter().map(SiteSyncRelay::statistics).collect(),
        }
    }

    /// Register the callback invoked when a switch time sync state changes.
    pub fn register_sync_state_callback(
        &mut self,
        callback: impl FnMut(usize, SyncState) + Send + 'static,
    ) {
        self.callback = Some(Box::new(callback));
    }

    /// Update the asCapable qualification of a master port. Returns `false`
    /// for an unknown port.
    pub fn set_as_capable(&mut self, port: PortIdx, as_capable: bool) -> bool {
        let Some(idx) = self.master_index(port) else {
            return false;
        };
        self.masters[idx].sync_mut().port_sm_mut().set_as_capable(as_capable);
        true
    }

    /// Record the measured peer delay of a port.
    pub fn set_pdelay(&mut self, port: PortIdx, pdelay_ns: u64) {
        self.pdelay.insert(port, pdelay_ns);
    }

    /// Deliver the egress timestamp of the last Sync sent on `port`.
    pub fn tx_confirmation(&self, port: PortIdx, egress: GlobalTimestamp) {
        match self.master_index(port) {
            Some(idx) => self.masters[idx].sync().port_sm().provide_sync_egr_ts(egress),
            None => trace!(port, "egress timestamp for unknown master port ignored"),
        }
    }

    /// Egress timestamp mailbox of a master port, for delivery from driver
    /// context.
    #[must_use]
    pub fn sync_egress_slot(&self, port: PortIdx) -> Option<Arc<EgressTsSlot>> {
        self.master_port(port).map(|m| m.sync().port_sm().egress_slot())
    }

    /// Flag that resets a master port's Sync and Announce transmission on
    /// the next cycle, for use from another context.
    #[must_use]
    pub fn reset_flag(&self, port: PortIdx) -> Option<Arc<AtomicBool>> {
        self.master_port(port).map(|m| m.sync().reset_flag())
    }

    /// Reset the Sync and Announce transmission of a master port on its next
    /// cycle and abandon any relay receiving on it. Returns `false` if the port is
    /// neither.
    pub fn request_reset(&mut self, port: PortIdx) -> bool {
        let mut known = false;
        if let Some(idx) = self.master_index(port) {
            self.masters[idx].sync().reset_flag().store(true, Ordering::Release);
            known = true;
        }
        for (relay, cfg) in self.relays.iter_mut().zip(&self.config.site_sync) {
            if cfg.slave_port == port {
                relay.reset();
                known = true;
            }
        }
        if known {
            debug!(port, "reset requested");
        }
        known
    }

    /// Sync received on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EthTSynError::Parse`] if the frame is malformed.
    pub fn rx_sync(&mut self, port: PortIdx, frame: &[u8]) -> Result<()> {
        let residence_time = self.config.residence_time;
        for (relay, cfg) in self.relays.iter_mut().zip(&self.config.site_sync) {
            if cfg.slave_port != port {
                continue;
            }
            match relay {
                SiteSyncRelay::Symmetric(sm) => sm.rx_sync(cfg, frame, &self.switch)?,
                SiteSyncRelay::Asymmetric(sm) => {
                    sm.rx_sync(cfg, frame, &self.switch, residence_time)?;
                }
            }
        }
        Ok(())
    }

    /// `Follow_Up` received on `port`. An asymmetric relay forwards it
    /// immediately. Malformed frames are dropped and counted in
    /// [`SiteSyncStatistics::follow_up_dropped`].
    pub fn rx_follow_up(&mut self, port: PortIdx, frame: &[u8]) {
        let mut env = RelayEnv {
            eth: &mut self.eth,
            switch: &self.switch,
            crc: self.crc,
            config: &self.config,
            slave_pdelay_ns: self.pdelay.get(&port).copied().unwrap_or(0),
        };
        for (relay, cfg) in self.relays.iter_mut().zip(&self.config.site_sync) {
            if cfg.slave_port != port {
                continue;
            }
            let sample = match relay {
                SiteSyncRelay::Symmetric(sm) => {
                    sm.rx_follow_up(cfg, frame, self.crc);
                    None
                }
                SiteSyncRelay::Asymmetric(sm) => {
                    sm.rx_follow_up(cfg, frame, self.crc);
                    sm.main_function(cfg, &mut env)
                }
            };
            if let (Some(sample), Some(swt)) = (sample, cfg.swt_time_sync) {
                provide_sample(&mut self.swt, swt, sample);
            }
        }
    }

    /// Run one main-function cycle: master ports, then relay paths, then
    /// switch time sync.
    pub fn main_function(&mut self) {
        let mut tx = TxEnv {
            time_base: &self.time_base,
            eth: &mut self.eth,
            crc: self.crc,
            compliance: self.config.message_compliance,
        };
        for (master, cfg) in self.masters.iter_mut().zip(&self.config.master_ports) {
            let Some(sent) = master.main_function(cfg, &mut tx) else {
                continue;
            };
            let Some(idx) = cfg.swt_time_sync else {
                continue;
            };
            let Some(switch) = self.config.swt_time_sync.get(idx).map(|s| s.switch) else {
                continue;
            };
            match self.switch.ingress_timestamp(switch, cfg.port, sent.sequence_id) {
                Some(ingress) => provide_sample(
                    &mut self.swt,
                    idx,
                    SyncSample {
                        sequence_id: sent.sequence_id,
                        origin: sent.origin,
                        ingress,
                    },
                ),
                None => trace!(
                    port = cfg.port,
                    sequence_id = sent.sequence_id,
                    "no switch ingress timestamp for own Sync"
                ),
            }
        }

        for (relay, cfg) in self.relays.iter_mut().zip(&self.config.site_sync) {
            let mut env = RelayEnv {
                eth: &mut self.eth,
                switch: &self.switch,
                crc: self.crc,
                config: &self.config,
                slave_pdelay_ns: self.pdelay.get(&cfg.slave_port).copied().unwrap_or(0),
            };
            if let (Some(sample), Some(swt)) = (relay.main_function(cfg, &mut env), cfg.swt_time_sync) {
                provide_sample(&mut self.swt, swt, sample);
            }
        }

        for (idx, (sm, cfg)) in self.swt.iter_mut().zip(&self.config.swt_time_sync).enumerate() {
            let Some(state) = sm.main_function(cfg, &mut self.switch) else {
                continue;
            };
            if let Some(callback) = self.callback.as_mut() {
                callback(idx, state);
            }
        }
    }

    fn master_index(&self, port: PortIdx) -> Option<usize> {
        self.config.master_ports.iter().position(|m| m.port == port)
    }
}

fn provide_sample(swt: &mut [SwtTimeSyncSm], idx: usize, sample: SyncSample) {
    if let Some(sm) = swt.get_mut(idx) {
        sm.provide_sample(sample);
    }
}
