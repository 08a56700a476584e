use crate::master::{AnnounceSendSm, AnnounceState, MasterStatistics};
use crate::protocol::ptp::message::{MsgHeader, PtpMessageType, layout};
use crate::protocol::ptp::wire;
use crate::testing::MockEthIf;
use crate::types::{AnnounceConfig, MasterPortConfig};

const CLOCK: u64 = 0x1122_33FF_FE44_5566;

fn cfg() -> MasterPortConfig {
    let mut cfg = MasterPortConfig::new(4, 0, CLOCK);
    cfg.domain_number = 2;
    cfg.announce = Some(AnnounceConfig {
        interval_cycles: 3,
        log_message_interval: 1,
    });
    cfg
}

fn run(
    sm: &mut AnnounceSendSm,
    eth: &mut MockEthIf,
    as_capable: bool,
    stats: &mut MasterStatistics,
    cycles: usize,
) {
    let cfg = cfg();
    let announce = cfg.announce.unwrap();
    for _ in 0..cycles {
        sm.main_function(&cfg, &announce, eth, as_capable, stats);
    }
}

// ===== Cadence =====

#[test]
fn test_first_announce_on_link_up() {
    let mut sm = AnnounceSendSm::new();
    let mut eth = MockEthIf::new();
    let mut stats = MasterStatistics::default();
    run(&mut sm, &mut eth, true, &mut stats, 1);
    assert_eq!(eth.sent.len(), 1);
    assert_eq!(sm.state(), AnnounceState::WaitTxAnnounce);
    assert_eq!(stats.announce_tx, 1);
}

#[test]
fn test_announce_interval() {
    let mut sm = AnnounceSendSm::new();
    let mut eth = MockEthIf::new();
    let mut stats = MasterStatistics::default();
    run(&mut sm, &mut eth, true, &mut stats, 7);
    // Cycles 1, 4 and 7.
    let seqs: Vec<u16> = eth
        .sent
        .iter()
        .map(|f| f.header().unwrap().sequence_id)
        .collect();
    assert_eq!(seqs, vec![0, 1, 2]);
    assert_eq!(sm.sequence_id(), 3);
}

#[test]
fn test_waits_for_link() {
    let mut sm = AnnounceSendSm::new();
    let mut eth = MockEthIf::new();
    eth.set_link(4, false);
    let mut stats = MasterStatistics::default();
    run(&mut sm, &mut eth, true, &mut stats, 3);
    assert_eq!(sm.state(), AnnounceState::Initializing);
    assert!(eth.sent.is_empty());
}

#[test]
fn test_not_as_capable_holds_announce() {
    let mut sm = AnnounceSendSm::new();
    let mut eth = MockEthIf::new();
    let mut stats = MasterStatistics::default();
    run(&mut sm, &mut eth, false, &mut stats, 3);
    assert_eq!(sm.state(), AnnounceState::TxAnnounce);
    assert!(eth.sent.is_empty());

    run(&mut sm, &mut eth, true, &mut stats, 1);
    assert_eq!(eth.sent.len(), 1);
}

#[test]
fn test_failed_announce_retried() {
    let mut sm = AnnounceSendSm::new();
    let mut eth = MockEthIf::new();
    eth.set_failing(4, true);
    let mut stats = MasterStatistics::default();
    run(&mut sm, &mut eth, true, &mut stats, 2);
    assert_eq!(stats.announce_tx, 0);
    assert_eq!(sm.sequence_id(), 0);

    eth.set_failing(4, false);
    run(&mut sm, &mut eth, true, &mut stats, 1);
    assert_eq!(stats.announce_tx, 1);
}

#[test]
fn test_reset_returns_to_initializing() {
    let mut sm = AnnounceSendSm::new();
    let mut eth = MockEthIf::new();
    let mut stats = MasterStatistics::default();
    run(&mut sm, &mut eth, true, &mut stats, 1);
    sm.reset();
    assert_eq!(sm.state(), AnnounceState::Initializing);
    run(&mut sm, &mut eth, true, &mut stats, 1);
    assert_eq!(eth.sent.len(), 2);
}

// ===== Frame content =====

#[test]
fn test_announce_fields() {
    let mut sm = AnnounceSendSm::new();
    let mut eth = MockEthIf::new();
    let mut stats = MasterStatistics::default();
    run(&mut sm, &mut eth, true, &mut stats, 1);

    let frame = &eth.sent[0].data;
    assert_eq!(frame.len(), layout::ANNOUNCE_LEN);
    let header = MsgHeader::decode(frame).unwrap();
    assert_eq!(header.message_type, PtpMessageType::Announce);
    assert_eq!(header.message_length, 76);
    assert_eq!(header.domain_number, 2);
    assert_eq!(header.log_message_interval, 1);
    assert_eq!(header.source_port_identity.clock_identity, CLOCK);

    assert_eq!(frame[layout::ANN_PRIORITY1], 255);
    assert_eq!(frame[layout::ANN_CLOCK_CLASS], 248);
    assert_eq!(frame[layout::ANN_CLOCK_ACCURACY], 0xFE);
    assert_eq!(wire::get_u16(frame, layout::ANN_LOG_VARIANCE), 0x4100);
    assert_eq!(frame[layout::ANN_PRIORITY2], 255);
    assert_eq!(wire::get_u64(frame, layout::ANN_GM_IDENTITY), CLOCK);
    assert_eq!(wire::get_u16(frame, layout::ANN_STEPS_REMOVED), 0);
    assert_eq!(frame[layout::ANN_TIME_SOURCE], 0xA0);
    assert_eq!(wire::get_u16(frame, layout::ANN_PATH_TRACE_TYPE_OFS), 0x0008);
    assert_eq!(wire::get_u16(frame, layout::ANN_PATH_TRACE_LENGTH_OFS), 8);
    assert_eq!(wire::get_u64(frame, layout::ANN_PATH_TRACE_SEQ), CLOCK);
}
