//! Integration tests for a grandmaster feeding a bridge.
//!
//! An upstream core transmits on its master port; every frame it sends is
//! received on the slave port of a second core that relays the stream and
//! steers its switch clock.

mod common;

use std::sync::{Arc, Mutex};

use ethtsyn::crc::{self, CrcHndl};
use ethtsyn::interfaces::NoSwitch;
use ethtsyn::protocol::ptp::message::{ArSubTlvIter, FollowUpMsg, PtpMessageType};
use ethtsyn::testing::{MockEthIf, MockSwitch, MockTimeBase, SentFrame};
use ethtsyn::types::{RxCrcValidated, SiteSyncMasterPort, TimeSecuredFlags};
use ethtsyn::{
    EthTSyn, EthTSynConfig, GlobalTimestamp, MasterPortConfig, SiteSyncConfig, SwtTimeSyncConfig,
    SyncState,
};

use common::{at, grandmaster_time, init_logging, master_cycle};

const GM_PORT: u16 = 1;
const SLAVE: u16 = 4;
const RELAY_A: u16 = 5;
const RELAY_B: u16 = 6;

const CYCLE_NS: u64 = 1_000_000;
const EGRESS_DELAY: u64 = 800;
const PDELAY: u64 = 250;
const RESIDENCE_A: i128 = 2_000;
const RESIDENCE_B: i128 = 2_500;

type Upstream = EthTSyn<MockTimeBase, MockEthIf, NoSwitch>;
type Bridge = EthTSyn<MockTimeBase, MockEthIf, MockSwitch>;

fn data_ids() -> [u8; 16] {
    std::array::from_fn(|i| 0x30 + u8::try_from(i).unwrap())
}

fn upstream() -> Upstream {
    let mut port = MasterPortConfig::new(GM_PORT, 0, 0x0011_22FF_FE33_4455);
    port.always_as_capable = true;
    port.sync_interval_cycles = 2;
    port.data_id_list = data_ids();
    port.ar_sub_tlvs.time = Some(TimeSecuredFlags::ALL);
    let config = EthTSynConfig::builder().master_port(port).build();
    EthTSyn::new(config, grandmaster_time(), MockEthIf::new()).unwrap()
}

fn bridge(swt: SwtTimeSyncConfig) -> Bridge {
    let relay = SiteSyncConfig {
        slave_port: SLAVE,
        master_ports: [RELAY_A, RELAY_B]
            .into_iter()
            .map(|port| SiteSyncMasterPort {
                port,
                ..SiteSyncMasterPort::default()
            })
            .collect(),
        rx_crc_validated: RxCrcValidated::Validated,
        data_id_list: data_ids(),
        swt_time_sync: Some(0),
        ..SiteSyncConfig::default()
    };
    let config = EthTSynConfig::builder()
        .site_sync(relay)
        .swt_time_sync(swt)
        .build();
    let time_base = MockTimeBase::synchronized(GlobalTimestamp::new(0, 0), 0);
    let mut core =
        EthTSyn::with_switch(config, time_base, MockEthIf::new(), MockSwitch::new()).unwrap();
    core.set_pdelay(SLAVE, PDELAY);
    core
}

fn swt_cfg() -> SwtTimeSyncConfig {
    SwtTimeSyncConfig {
        sync_precision_limit_ns: 1_000,
        out_of_sync_count_max: 3,
        offset_jump_threshold_ns: 0,
        ..SwtTimeSyncConfig::default()
    }
}

fn record_states(core: &mut Bridge) -> Arc<Mutex<Vec<(usize, SyncState)>>> {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    core.register_sync_state_callback(move |idx, state| sink.lock().unwrap().push((idx, state)));
    states
}

/// Run one cycle on both cores. The switch sees each Sync so that the
/// grandmaster time at ingress leads the switch clock by `offset_ns`.
/// Returns what the bridge sent downstream.
fn linked_cycle(upstream: &mut Upstream, bridge: &mut Bridge, offset_ns: i128) -> Vec<SentFrame> {
    let (sent, sync) = master_cycle(upstream, GM_PORT, EGRESS_DELAY, CYCLE_NS);
    for frame in &sent {
        match frame.message_type() {
            Some(PtpMessageType::Sync) => {
                let Some(sync) = sync else { continue };
                let seq = sync.sequence_id;
                let ingress = at(sync.global, i128::from(EGRESS_DELAY + PDELAY) - offset_ns);
                let switch = bridge.switch_mut();
                switch.set_ingress(SLAVE, seq, ingress);
                switch.set_egress(RELAY_A, seq, at(ingress, RESIDENCE_A));
                switch.set_egress(RELAY_B, seq, at(ingress, RESIDENCE_B));
                bridge.rx_sync(SLAVE, &frame.data).unwrap();
            }
            Some(PtpMessageType::FollowUp) => bridge.rx_follow_up(SLAVE, &frame.data),
            _ => {}
        }
    }
    bridge.main_function();
    bridge.eth_mut().take_sent()
}

// ===== Relay =====

#[test]
fn test_bridge_relays_grandmaster_stream() {
    init_logging();
    let mut gm = upstream();
    let mut bridge = bridge(swt_cfg());
    let states = record_states(&mut bridge);

    let mut downstream = Vec::new();
    for _ in 0..8 {
        downstream.extend(linked_cycle(&mut gm, &mut bridge, -30));
    }

    let syncs: Vec<_> = downstream
        .iter()
        .filter(|f| f.message_type() == Some(PtpMessageType::Sync))
        .map(|f| (f.port, f.header().unwrap().sequence_id))
        .collect();
    assert_eq!(
        &syncs[..4],
        &[(RELAY_A, 0), (RELAY_B, 0), (RELAY_A, 1), (RELAY_B, 1)]
    );

    let fups: Vec<_> = downstream
        .iter()
        .filter(|f| f.message_type() == Some(PtpMessageType::FollowUp))
        .collect();
    assert!(fups.len() >= 4);
    for frame in &fups[..2] {
        let fup = FollowUpMsg::decode(&frame.data).unwrap();
        let residence = if frame.port == RELAY_A {
            RESIDENCE_A
        } else {
            RESIDENCE_B
        };
        let expected = i128::from(EGRESS_DELAY) + residence + i128::from(PDELAY);
        assert_eq!(i128::from(fup.header.correction_ns), expected);
        assert_eq!(fup.precise_origin_timestamp, GlobalTimestamp::new(1_000, 0));
    }

    assert_eq!(*states.lock().unwrap(), vec![(0, SyncState::Sync)]);
    assert_eq!(bridge.switch().corrections[0].offset, Some(-30));
    assert!(bridge.statistics().site_sync[0].follow_up_fwd >= 2);
}

#[test]
fn test_relayed_time_crc_recomputed() {
    init_logging();
    let mut gm = upstream();
    let mut bridge = bridge(swt_cfg());
    let receiver = CrcHndl::new(true);

    let mut checked = 0;
    for _ in 0..10 {
        for frame in linked_cycle(&mut gm, &mut bridge, 0) {
            if frame.message_type() != Some(PtpMessageType::FollowUp) {
                continue;
            }
            let seq = frame.header().unwrap().sequence_id;
            let data_id = crc::data_id(&data_ids(), seq);
            let tlvs: Vec<_> = ArSubTlvIter::new(&frame.data).collect();
            assert_eq!(tlvs.len(), 1);
            assert_eq!(receiver.time_crc_state(&frame.data, &tlvs[0], data_id), (true, true));
            assert!(receiver.check_sub_tlv_crc_state(
                &frame.data,
                &tlvs[0],
                RxCrcValidated::Validated,
                data_id
            ));
            checked += 1;
        }
    }
    assert!(checked >= 6);
}

// ===== Switch clock =====

#[test]
fn test_bridge_loses_sync_after_consecutive_bad_samples() {
    init_logging();
    let mut gm = upstream();
    let mut bridge = bridge(swt_cfg());
    let states = record_states(&mut bridge);

    // Two Sync/Follow_Up pairs within the precision limit.
    for _ in 0..4 {
        linked_cycle(&mut gm, &mut bridge, 20);
    }
    assert_eq!(bridge.sync_state(0), Some(SyncState::Sync));

    // Two bad samples are tolerated, the third flips the state.
    for _ in 0..4 {
        linked_cycle(&mut gm, &mut bridge, 5_000);
    }
    assert_eq!(bridge.sync_state(0), Some(SyncState::Sync));
    for _ in 0..2 {
        linked_cycle(&mut gm, &mut bridge, 5_000);
    }
    assert_eq!(bridge.sync_state(0), Some(SyncState::Unsync));
    assert_eq!(
        *states.lock().unwrap(),
        vec![(0, SyncState::Sync), (0, SyncState::Unsync)]
    );
}
