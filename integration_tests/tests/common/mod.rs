//! Common test utilities and fixtures
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use ethtsyn::interfaces::NoSwitch;
use ethtsyn::protocol::ptp::message::PtpMessageType;
use ethtsyn::testing::{MockEthIf, MockSwitch, MockTimeBase, SentFrame};
use ethtsyn::types::SiteSyncMasterPort;
use ethtsyn::{
    EthTSyn, EthTSynConfig, GlobalTimestamp, MasterPortConfig, SiteSyncConfig, SwtTimeSyncConfig,
    SyncState,
};
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialize test logging (call once per test module)
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env().add_directive("ethtsyn=debug".parse().unwrap());
        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

pub type Grandmaster = EthTSyn<MockTimeBase, MockEthIf, NoSwitch>;
pub type Bridge = EthTSyn<MockTimeBase, MockEthIf, MockSwitch>;

/// Grandmaster port towards the first bridge.
pub const GM_PORT: u16 = 1;
/// Bridge port facing the grandmaster.
pub const UPLINK: u16 = 1;
/// Bridge port facing the next hop.
pub const DOWNLINK: u16 = 2;

pub const CYCLE_NS: u64 = 1_000_000;
pub const GM_EGRESS_DELAY: u64 = 600;

/// Grandmaster time when the line starts up.
pub fn gm_start() -> GlobalTimestamp {
    GlobalTimestamp::new(1_000, 0)
}

/// Link and clock properties of one bridge.
#[derive(Debug, Clone, Copy)]
pub struct HopParams {
    /// Peer delay of the uplink.
    pub pdelay_ns: u64,
    /// Time the Sync spends in the switch.
    pub residence_ns: u64,
    /// Switch clock minus grandmaster time.
    pub clock_offset_ns: i128,
}

pub struct Hop {
    pub core: Bridge,
    pub params: HopParams,
    pub states: Arc<Mutex<Vec<(usize, SyncState)>>>,
}

/// A grandmaster followed by a line of bridges.
pub struct Chain {
    pub gm: Grandmaster,
    pub hops: Vec<Hop>,
    /// Grandmaster time at each Sync's capture.
    origins: HashMap<u16, GlobalTimestamp>,
    /// What the last bridge sent downstream.
    pub tail: Vec<SentFrame>,
}

fn grandmaster(sync_interval_cycles: u16) -> Grandmaster {
    let mut port = MasterPortConfig::new(GM_PORT, 0, 0x0011_22FF_FE00_0001);
    port.always_as_capable = true;
    port.sync_interval_cycles = sync_interval_cycles;
    let config = EthTSynConfig::builder().master_port(port).build();
    let time_base = MockTimeBase::synchronized(gm_start(), 0);
    EthTSyn::new(config, time_base, MockEthIf::new()).unwrap()
}

pub fn swt_cfg() -> SwtTimeSyncConfig {
    SwtTimeSyncConfig {
        sync_precision_limit_ns: 1_000,
        sync_event_timeout_cycles: 20,
        ..SwtTimeSyncConfig::default()
    }
}

fn bridge(index: usize, params: HopParams) -> Hop {
    let relay = SiteSyncConfig {
        slave_port: UPLINK,
        master_ports: vec![SiteSyncMasterPort {
            port: DOWNLINK,
            clock_identity: 0x00AA_00FF_FE00_0000 + u64::try_from(index).unwrap(),
            port_number: 1,
        }],
        keep_src_port_identity: false,
        swt_time_sync: Some(0),
        ..SiteSyncConfig::default()
    };
    let config = EthTSynConfig::builder()
        .site_sync(relay)
        .swt_time_sync(swt_cfg())
        .build();
    let time_base = MockTimeBase::synchronized(GlobalTimestamp::new(0, 0), 0);
    let mut core =
        EthTSyn::with_switch(config, time_base, MockEthIf::new(), MockSwitch::new()).unwrap();
    core.set_pdelay(UPLINK, params.pdelay_ns);

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    core.register_sync_state_callback(move |idx, state| sink.lock().unwrap().push((idx, state)));
    Hop {
        core,
        params,
        states,
    }
}

fn at(base: GlobalTimestamp, nanos: i128) -> GlobalTimestamp {
    GlobalTimestamp::from_nanos(base.to_nanos() + nanos).unwrap()
}

impl Chain {
    pub fn new(sync_interval_cycles: u16, hops: &[HopParams]) -> Self {
        Self {
            gm: grandmaster(sync_interval_cycles),
            hops: hops.iter().enumerate().map(|(i, p)| bridge(i, *p)).collect(),
            origins: HashMap::new(),
            tail: Vec::new(),
        }
    }

    /// Grandmaster time at which Sync `seq` reaches the uplink of `hop`.
    pub fn arrival(&self, hop: usize, seq: u16) -> Option<GlobalTimestamp> {
        let origin = *self.origins.get(&seq)?;
        let path: u64 = self.hops[..hop]
            .iter()
            .map(|h| h.params.pdelay_ns + h.params.residence_ns)
            .sum::<u64>()
            + self.hops[hop].params.pdelay_ns;
        Some(at(origin, i128::from(GM_EGRESS_DELAY + path)))
    }

    /// Expected `Follow_Up` correction leaving `hop`.
    pub fn correction_after(&self, hop: usize) -> u64 {
        GM_EGRESS_DELAY
            + self.hops[..=hop]
                .iter()
                .map(|h| h.params.pdelay_ns + h.params.residence_ns)
                .sum::<u64>()
    }

    /// One cycle on every node, frames travelling the whole line.
    pub fn cycle(&mut self) {
        let global = self.gm.time_base().global_time;
        let vlt = self.gm.time_base().virtual_local_time;
        self.gm.main_function();
        let mut frames = self.gm.eth_mut().take_sent();
        if let Some(sync) = frames
            .iter()
            .find(|f| f.message_type() == Some(PtpMessageType::Sync))
        {
            let seq = sync.header().unwrap().sequence_id;
            self.origins.insert(seq, global);
            let egress = GlobalTimestamp::from_nanos(i128::from(vlt + GM_EGRESS_DELAY)).unwrap();
            self.gm.tx_confirmation(GM_PORT, egress);
        }
        self.gm.time_base_mut().advance(CYCLE_NS);

        for hop in 0..self.hops.len() {
            frames = self.deliver(hop, &frames);
        }
        self.tail = frames;
    }

    /// Cycles in which the grandmaster stays silent.
    pub fn silent_cycle(&mut self) {
        let mut frames = Vec::new();
        for hop in 0..self.hops.len() {
            frames = self.deliver(hop, &frames);
        }
        self.tail = frames;
    }

    fn deliver(&mut self, hop: usize, frames: &[SentFrame]) -> Vec<SentFrame> {
        for frame in frames {
            match frame.message_type() {
                Some(PtpMessageType::Sync) => {
                    let seq = frame.header().unwrap().sequence_id;
                    if let Some(arrival) = self.arrival(hop, seq) {
                        let params = self.hops[hop].params;
                        let ingress = at(arrival, params.clock_offset_ns);
                        let switch = self.hops[hop].core.switch_mut();
                        switch.set_ingress(UPLINK, seq, ingress);
                        switch.set_egress(DOWNLINK, seq, at(ingress, i128::from(params.residence_ns)));
                    }
                    self.hops[hop].core.rx_sync(UPLINK, &frame.data).unwrap();
                }
                Some(PtpMessageType::FollowUp) => {
                    self.hops[hop].core.rx_follow_up(UPLINK, &frame.data);
                }
                _ => {}
            }
        }
        let core = &mut self.hops[hop].core;
        core.main_function();
        core.eth_mut().take_sent()
    }
}
