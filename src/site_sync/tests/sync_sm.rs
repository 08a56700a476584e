use std::time::Duration;

use super::harness::*;
use crate::crc::CrcHndl;
use crate::protocol::ptp::message::{ArSubTlvIter, PtpMessageType, PtpPortIdentity};
use crate::protocol::ptp::timestamp::GlobalTimestamp;
use crate::site_sync::{OperationMode, SiteSyncState, SiteSyncSyncSm};
use crate::testing::{follow_up_frame, sync_frame, test_header};
use crate::types::{ResidenceTime, RxCrcValidated, SiteSyncConfig, TimeSecuredFlags};

const SEQ: u16 = 5;

fn relay_with(cfg: SiteSyncConfig) -> (Relay, SiteSyncSyncSm) {
    let sm = SiteSyncSyncSm::new(&cfg);
    (Relay::new(cfg), sm)
}

fn receive_pair(relay: &mut Relay, sm: &mut SiteSyncSyncSm, seq: u16) {
    relay.stamp(seq);
    sm.rx_sync(&relay.cfg, &sync_bytes(seq), &relay.switch).unwrap();
    sm.rx_follow_up(&relay.cfg, &fup_bytes(seq, None), relay.crc);
}

// ===== Regular relay =====

#[test]
fn test_sync_forwarded_to_all_masters() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.stamp(SEQ);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    assert_eq!(sm.state(), SiteSyncState::TxSync);

    assert_eq!(relay.cycle(&mut sm), None);
    let ports: Vec<_> = relay.syncs().iter().map(|f| f.port).collect();
    assert_eq!(ports, vec![MASTER_A, MASTER_B]);
    assert_eq!(sm.state(), SiteSyncState::WaitFup);
    assert_eq!(sm.statistics().sync_fwd, 1);
}

#[test]
fn test_follow_up_relayed_with_correction() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.stamp(SEQ);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    relay.cycle(&mut sm);
    sm.rx_follow_up(&relay.cfg, &fup_bytes(SEQ, None), relay.crc);
    assert_eq!(sm.state(), SiteSyncState::TxFup);

    let sample = relay.cycle(&mut sm).unwrap();
    let corrections: Vec<_> = relay.follow_ups().iter().map(|f| correction_of(f)).collect();
    assert_eq!(
        corrections,
        vec![
            UPSTREAM_CORRECTION + RESIDENCE_A + PDELAY,
            UPSTREAM_CORRECTION + RESIDENCE_B + PDELAY,
        ]
    );
    assert!(relay.follow_ups().iter().all(|f| pot_of(f) == pot()));
    assert_eq!(sm.state(), SiteSyncState::WaitSync);
    assert_eq!(sm.statistics().follow_up_fwd, 1);

    assert_eq!(sample.sequence_id, SEQ);
    assert_eq!(sample.ingress, ingress_time());
    assert_eq!(sample.origin, at(pot(), UPSTREAM_CORRECTION + PDELAY));
}

#[test]
fn test_pair_relayed_in_one_cycle() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    receive_pair(&mut relay, &mut sm, SEQ);
    assert!(relay.cycle(&mut sm).is_some());
    assert_eq!(relay.syncs().len(), 2);
    assert_eq!(relay.follow_ups().len(), 2);
    // Sync precedes Follow_Up on every port.
    let order: Vec<_> = relay.eth.sent.iter().map(|f| f.message_type().unwrap()).collect();
    assert_eq!(
        order,
        vec![
            PtpMessageType::Sync,
            PtpMessageType::Sync,
            PtpMessageType::FollowUp,
            PtpMessageType::FollowUp,
        ]
    );
}

#[test]
fn test_follow_up_wrong_sequence_ignored() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.stamp(SEQ);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    relay.cycle(&mut sm);
    sm.rx_follow_up(&relay.cfg, &fup_bytes(SEQ + 1, None), relay.crc);
    assert_eq!(sm.state(), SiteSyncState::WaitFup);
    relay.cycle(&mut sm);
    assert!(relay.follow_ups().is_empty());
}

#[test]
fn test_follow_up_without_sync_ignored() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    sm.rx_follow_up(&relay.cfg, &fup_bytes(SEQ, None), relay.crc);
    assert_eq!(sm.state(), SiteSyncState::WaitSync);
    relay.cycle(&mut sm);
    assert!(relay.eth.sent.is_empty());
}

#[test]
fn test_new_sync_abandons_previous() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.stamp(SEQ);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    relay.cycle(&mut sm);

    receive_pair(&mut relay, &mut sm, SEQ + 1);
    relay.cycle(&mut sm);
    let seqs: Vec<_> = relay
        .follow_ups()
        .iter()
        .map(|f| f.header().unwrap().sequence_id)
        .collect();
    assert_eq!(seqs, vec![SEQ + 1, SEQ + 1]);
}

#[test]
fn test_foreign_domain_ignored() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    let mut header = test_header(PtpMessageType::Sync, SEQ);
    header.domain_number = 7;
    sm.rx_sync(&relay.cfg, &sync_frame(&header), &relay.switch).unwrap();
    assert_eq!(sm.state(), SiteSyncState::WaitSync);
    relay.cycle(&mut sm);
    assert!(relay.eth.sent.is_empty());
}

#[test]
fn test_foreign_domain_follow_up_keeps_relay() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.stamp(SEQ);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    relay.cycle(&mut sm);

    let mut header = test_header(PtpMessageType::FollowUp, SEQ);
    header.domain_number = 7;
    sm.rx_follow_up(&relay.cfg, &follow_up_frame(&header, &pot(), None), relay.crc);
    assert_eq!(sm.state(), SiteSyncState::WaitFup);

    sm.rx_follow_up(&relay.cfg, &fup_bytes(SEQ, None), relay.crc);
    assert!(relay.cycle(&mut sm).is_some());
}

#[test]
fn test_malformed_frame_is_error() {
    let (relay, mut sm) = relay_with(site_cfg());
    let err = sm.rx_sync(&relay.cfg, &[0u8; 10], &relay.switch).unwrap_err();
    assert!(err.is_frame_local());
    assert_eq!(sm.state(), SiteSyncState::WaitSync);
}

#[test]
fn test_src_port_identity_replaced_on_both() {
    let (mut relay, mut sm) = relay_with(SiteSyncConfig {
        keep_src_port_identity: false,
        ..site_cfg()
    });
    receive_pair(&mut relay, &mut sm, SEQ);
    relay.cycle(&mut sm);
    for frame in &relay.eth.sent {
        let id = frame.header().unwrap().source_port_identity;
        assert_eq!(id.clock_identity, RELAY_CLOCK);
        assert_ne!(id, PtpPortIdentity::new(crate::testing::TEST_CLOCK_IDENTITY, 1));
    }
}

// ===== Retry =====

#[test]
fn test_fup_abandoned_without_egress_ts() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.stamp_ingress(SEQ);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    sm.rx_follow_up(&relay.cfg, &fup_bytes(SEQ, None), relay.crc);

    // One attempt plus two retries.
    for _ in 0..2 {
        assert_eq!(relay.cycle(&mut sm), None);
        assert_eq!(sm.state(), SiteSyncState::TxFup);
    }
    relay.cycle(&mut sm);
    assert_eq!(sm.state(), SiteSyncState::WaitSync);
    assert!(sm.tx().is_idle());
    assert!(relay.follow_ups().is_empty());
    assert_eq!(sm.statistics().follow_up_fwd, 0);
}

#[test]
fn test_sync_retry_expired_everywhere_resets() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.eth.set_failing(MASTER_A, true);
    relay.eth.set_failing(MASTER_B, true);
    receive_pair(&mut relay, &mut sm, SEQ);
    for _ in 0..3 {
        relay.cycle(&mut sm);
    }
    assert_eq!(sm.state(), SiteSyncState::WaitSync);
    assert!(sm.tx().is_idle());
    assert_eq!(relay.eth.failed, 6);
    assert_eq!(sm.statistics().sync_fwd, 0);
}

#[test]
fn test_fup_skips_port_without_sync() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.eth.set_failing(MASTER_B, true);
    receive_pair(&mut relay, &mut sm, SEQ);
    for _ in 0..3 {
        relay.cycle(&mut sm);
    }
    relay.eth.set_failing(MASTER_B, false);
    relay.cycle(&mut sm);
    let ports: Vec<_> = relay.follow_ups().iter().map(|f| f.port).collect();
    assert_eq!(ports, vec![MASTER_A]);
}

// ===== Sub-TLV CRC =====

#[test]
fn test_invalid_crc_dropped_when_validated() {
    let (mut relay, mut sm) = relay_with(SiteSyncConfig {
        rx_crc_validated: RxCrcValidated::Validated,
        ..site_cfg()
    });
    relay.stamp(SEQ);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    relay.cycle(&mut sm);

    let mut frame = fup_bytes(SEQ, Some((TimeSecuredFlags::ALL, 0)));
    let crc_ofs = ArSubTlvIter::new(&frame).next().unwrap().payload_offset() + 1;
    frame[crc_ofs] ^= 0x10;
    sm.rx_follow_up(&relay.cfg, &frame, relay.crc);

    assert_eq!(sm.statistics().follow_up_dropped, 1);
    assert_eq!(sm.state(), SiteSyncState::WaitSync);
    relay.cycle(&mut sm);
    assert!(relay.follow_ups().is_empty());
}

#[test]
fn test_valid_crc_accepted_when_validated() {
    let (mut relay, mut sm) = relay_with(SiteSyncConfig {
        rx_crc_validated: RxCrcValidated::Validated,
        ..site_cfg()
    });
    relay.stamp(SEQ);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    sm.rx_follow_up(&relay.cfg, &fup_bytes(SEQ, Some((TimeSecuredFlags::ALL, 0))), relay.crc);
    assert!(relay.cycle(&mut sm).is_some());
    assert_eq!(relay.follow_ups().len(), 2);
}

#[test]
fn test_changed_correction_recomputes_crc() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.stamp(SEQ);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    sm.rx_follow_up(&relay.cfg, &fup_bytes(SEQ, Some((TimeSecuredFlags::ALL, 0))), relay.crc);
    relay.cycle(&mut sm);

    let crc = CrcHndl::new(true);
    for frame in relay.follow_ups() {
        let tlv = ArSubTlvIter::new(&frame.data).next().unwrap();
        assert_eq!(crc.time_crc_state(&frame.data, &tlv, 0), (true, true));
    }
}

#[test]
fn test_unchanged_correction_forwards_crc() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.core.residence_time = ResidenceTime::Fixed { nanoseconds: 0 };
    relay.pdelay = 0;
    let received = fup_bytes(SEQ, Some((TimeSecuredFlags::ALL, 0)));
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    sm.rx_follow_up(&relay.cfg, &received, relay.crc);
    relay.cycle(&mut sm);

    assert_eq!(relay.follow_ups().len(), 2);
    assert!(relay.follow_ups().iter().all(|f| f.data == received));
}

#[test]
fn test_ignored_policy_forwards_invalid_crc_incremented() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.stamp(SEQ);
    let mut frame = fup_bytes(SEQ, Some((TimeSecuredFlags::ALL, 0)));
    let crc0_ofs = ArSubTlvIter::new(&frame).next().unwrap().payload_offset() + 1;
    frame[crc0_ofs] ^= 0x10;
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    sm.rx_follow_up(&relay.cfg, &frame, relay.crc);
    relay.cycle(&mut sm);

    let crc = CrcHndl::new(true);
    for sent in relay.follow_ups() {
        let tlv = ArSubTlvIter::new(&sent.data).next().unwrap();
        assert_eq!(crc.time_crc_state(&sent.data, &tlv, 0), (false, true));
    }
}

// ===== Cyclic mode =====

const TIMEOUT_CYCLES: u16 = 3;
const SYNTH_STEP_NS: u64 = 250_000_000;

/// Egress stamps of a synthesized Sync sent at switch time `now`.
fn stamp_synthesized(relay: &mut Relay, seq: u16, now: GlobalTimestamp) {
    relay.switch.now = Some(now);
    relay.switch.set_egress(MASTER_A, seq, at(now, RESIDENCE_A));
    relay.switch.set_egress(MASTER_B, seq, at(now, RESIDENCE_B));
}

/// Relay with a timed-out slave port after one valid pair; the switch clock
/// reads 250 ms after the last ingress.
fn timed_out_relay() -> (Relay, SiteSyncSyncSm) {
    let (mut relay, mut sm) = relay_with(SiteSyncConfig {
        sync_rx_timeout_cycles: TIMEOUT_CYCLES,
        ..site_cfg()
    });
    // 2^-3 s at 25 ms per cycle.
    relay.core.main_function_period = Duration::from_millis(25);
    stamp_synthesized(&mut relay, SEQ + 1, at(ingress_time(), SYNTH_STEP_NS));
    receive_pair(&mut relay, &mut sm, SEQ);
    relay.cycle(&mut sm);
    relay.eth.sent.clear();
    (relay, sm)
}

#[test]
fn test_cyclic_mode_after_timeout() {
    let (mut relay, mut sm) = timed_out_relay();
    relay.cycle(&mut sm);
    assert_eq!(sm.mode(), OperationMode::Regular);
    assert!(relay.eth.sent.is_empty());

    relay.cycle(&mut sm);
    assert_eq!(sm.mode(), OperationMode::Cyclic);
    assert_eq!(sm.statistics().synthesized, 1);
}

#[test]
fn test_synthesized_pair() {
    let (mut relay, mut sm) = timed_out_relay();
    relay.cycle(&mut sm);
    // Synthesized pairs feed no sample.
    assert_eq!(relay.cycle(&mut sm), None);

    let syncs = relay.syncs();
    assert_eq!(syncs.len(), 2);
    assert!(syncs.iter().all(|f| f.header().unwrap().sequence_id == SEQ + 1));

    let fups = relay.follow_ups();
    assert_eq!(fups.len(), 2);
    let expected_pot = at(pot(), SYNTH_STEP_NS);
    for f in &fups {
        assert_eq!(f.header().unwrap().sequence_id, SEQ + 1);
        assert_eq!(pot_of(f), expected_pot);
    }
    assert_eq!(correction_of(fups[0]), UPSTREAM_CORRECTION + RESIDENCE_A + PDELAY);
}

#[test]
fn test_synthesis_interval() {
    let (mut relay, mut sm) = timed_out_relay();
    relay.cycle(&mut sm);
    relay.cycle(&mut sm);
    assert_eq!(sm.statistics().synthesized, 1);

    stamp_synthesized(&mut relay, SEQ + 2, at(ingress_time(), 2 * SYNTH_STEP_NS));
    for _ in 0..4 {
        relay.cycle(&mut sm);
    }
    assert_eq!(sm.statistics().synthesized, 1);
    relay.cycle(&mut sm);
    assert_eq!(sm.statistics().synthesized, 2);
}

#[test]
fn test_real_sync_ends_cyclic_mode() {
    let (mut relay, mut sm) = timed_out_relay();
    relay.cycle(&mut sm);
    relay.cycle(&mut sm);
    assert_eq!(sm.mode(), OperationMode::Cyclic);

    relay.stamp(SEQ + 9);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ + 9), &relay.switch).unwrap();
    assert_eq!(sm.state(), SiteSyncState::RcvdSyncAfterTimeout);
    sm.rx_follow_up(&relay.cfg, &fup_bytes(SEQ + 9, None), relay.crc);

    let sample = relay.cycle(&mut sm).unwrap();
    assert_eq!(sample.sequence_id, SEQ + 9);
    assert_eq!(sm.mode(), OperationMode::Regular);
    assert_eq!(sm.state(), SiteSyncState::WaitSync);
}

#[test]
fn test_no_cyclic_mode_with_fixed_residence() {
    let (mut relay, mut sm) = relay_with(SiteSyncConfig {
        sync_rx_timeout_cycles: TIMEOUT_CYCLES,
        ..site_cfg()
    });
    relay.core.residence_time = ResidenceTime::Fixed { nanoseconds: 1_000 };
    relay.switch.now = Some(at(ingress_time(), SYNTH_STEP_NS));
    receive_pair(&mut relay, &mut sm, SEQ);
    for _ in 0..20 {
        relay.cycle(&mut sm);
    }
    assert_eq!(sm.mode(), OperationMode::Regular);
    assert_eq!(sm.statistics().synthesized, 0);
}

#[test]
fn test_no_cyclic_mode_without_valid_pair() {
    let (mut relay, mut sm) = relay_with(SiteSyncConfig {
        sync_rx_timeout_cycles: TIMEOUT_CYCLES,
        ..site_cfg()
    });
    relay.switch.now = Some(GlobalTimestamp::new(100, 0));
    for _ in 0..20 {
        relay.cycle(&mut sm);
    }
    assert_eq!(sm.mode(), OperationMode::Regular);
}

#[test]
fn test_reset() {
    let (mut relay, mut sm) = timed_out_relay();
    relay.cycle(&mut sm);
    relay.cycle(&mut sm);
    sm.reset();
    assert_eq!(sm.state(), SiteSyncState::WaitSync);
    assert_eq!(sm.mode(), OperationMode::Regular);
    assert!(sm.tx().is_idle());
}

// ===== Malformed Follow_Up =====

#[test]
fn test_oversized_follow_up_dropped() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.stamp(SEQ);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    relay.cycle(&mut sm);
    assert_eq!(sm.state(), SiteSyncState::WaitFup);

    sm.rx_follow_up(&relay.cfg, &oversized_fup_bytes(SEQ), relay.crc);
    assert_eq!(sm.state(), SiteSyncState::WaitSync);
    assert_eq!(sm.statistics().follow_up_dropped, 1);
    assert!(sm.tx().is_idle());

    assert_eq!(relay.cycle(&mut sm), None);
    assert!(relay.follow_ups().is_empty());
}

#[test]
fn test_truncated_follow_up_dropped() {
    let (mut relay, mut sm) = relay_with(site_cfg());
    relay.stamp(SEQ);
    sm.rx_sync(&relay.cfg, &sync_bytes(SEQ), &relay.switch).unwrap();
    relay.cycle(&mut sm);

    sm.rx_follow_up(&relay.cfg, &truncated_fup_bytes(SEQ), relay.crc);
    assert_eq!(sm.state(), SiteSyncState::WaitSync);
    assert_eq!(sm.statistics().follow_up_dropped, 1);

    // The well-formed frame arriving late no longer matches a pending Sync.
    sm.rx_follow_up(&relay.cfg, &fup_bytes(SEQ, None), relay.crc);
    assert_eq!(relay.cycle(&mut sm), None);
    assert!(relay.follow_ups().is_empty());
    assert_eq!(sm.statistics().follow_up_fwd, 0);
}
