//! End-to-end tests: a grandmaster and a line of bridges exchanging real
//! frames through the public API.

mod common;

use ethtsyn::SyncState;
use ethtsyn::protocol::ptp::message::{FollowUpMsg, PtpMessageType};

use common::{Chain, HopParams, gm_start, init_logging};

fn two_hops() -> [HopParams; 2] {
    [
        HopParams {
            pdelay_ns: 250,
            residence_ns: 2_000,
            clock_offset_ns: 40,
        },
        HopParams {
            pdelay_ns: 180,
            residence_ns: 3_100,
            clock_offset_ns: -70,
        },
    ]
}

fn states(chain: &Chain, hop: usize) -> Vec<(usize, SyncState)> {
    chain.hops[hop].states.lock().unwrap().clone()
}

#[test]
fn test_two_hop_line_synchronizes() {
    init_logging();
    let mut chain = Chain::new(4, &two_hops());

    let mut follow_ups = Vec::new();
    for _ in 0..12 {
        chain.cycle();
        follow_ups.extend(
            chain
                .tail
                .iter()
                .filter(|f| f.message_type() == Some(PtpMessageType::FollowUp))
                .map(|f| FollowUpMsg::decode(&f.data).unwrap()),
        );
    }

    assert_eq!(follow_ups.len(), 3);
    let first = &follow_ups[0];
    assert_eq!(first.header.sequence_id, 0);
    assert_eq!(first.precise_origin_timestamp, gm_start());
    assert_eq!(first.header.correction_ns, chain.correction_after(1));
    assert_eq!(first.header.source_port_identity.clock_identity, 0x00AA_00FF_FE00_0001);

    for hop in 0..2 {
        assert_eq!(states(&chain, hop), vec![(0, SyncState::Sync)]);
    }
    assert_eq!(chain.hops[0].core.switch().corrections[0].offset, Some(-40));
    assert_eq!(chain.hops[1].core.switch().corrections[0].offset, Some(70));
}

#[test]
fn test_grandmaster_loss_reported_down_the_line() {
    init_logging();
    let mut chain = Chain::new(4, &two_hops());
    for _ in 0..8 {
        chain.cycle();
    }
    for _ in 0..25 {
        chain.silent_cycle();
        assert!(chain.tail.is_empty());
    }
    for hop in 0..2 {
        assert_eq!(
            states(&chain, hop),
            vec![(0, SyncState::Sync), (0, SyncState::Uncertain)]
        );
    }
}

#[test]
fn test_line_recovers_when_grandmaster_returns() {
    init_logging();
    let mut chain = Chain::new(4, &two_hops());
    for _ in 0..8 {
        chain.cycle();
    }
    for _ in 0..25 {
        chain.silent_cycle();
    }
    for _ in 0..8 {
        chain.cycle();
    }
    for hop in 0..2 {
        assert_eq!(
            states(&chain, hop),
            vec![
                (0, SyncState::Sync),
                (0, SyncState::Uncertain),
                (0, SyncState::Sync),
            ]
        );
        assert_eq!(chain.hops[hop].core.sync_state(0), Some(SyncState::Sync));
    }
}
