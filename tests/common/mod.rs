//! Common test utilities and fixtures
#![allow(dead_code)]

use std::sync::Once;

use ethtsyn::protocol::ptp::message::PtpMessageType;
use ethtsyn::testing::{MockEthIf, MockTimeBase, SentFrame};
use ethtsyn::{EthTSyn, GlobalTimestamp, SwitchMgmt};
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialize test logging (call once per test module)
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env().add_directive("ethtsyn=debug".parse().unwrap());
        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// Start of the master's virtual local time.
pub const VLT_START: u64 = 5_000_000_000;

/// Time base of a grandmaster at 1000 s.
pub fn grandmaster_time() -> MockTimeBase {
    MockTimeBase::synchronized(GlobalTimestamp::new(1_000, 0), VLT_START)
}

/// A Sync sent by the master and the time tuple it was built from.
#[derive(Debug, Clone, Copy)]
pub struct CapturedSync {
    pub sequence_id: u16,
    pub global: GlobalTimestamp,
}

/// One master cycle: run the core, confirm any Sync `egress_delay` ns after
/// capture, then advance the clocks by `cycle_ns`. Returns the frames sent in
/// this cycle and the Sync capture, if a Sync went out.
pub fn master_cycle<S: SwitchMgmt>(
    core: &mut EthTSyn<MockTimeBase, MockEthIf, S>,
    port: u16,
    egress_delay: u64,
    cycle_ns: u64,
) -> (Vec<SentFrame>, Option<CapturedSync>) {
    let global = core.time_base().global_time;
    let vlt = core.time_base().virtual_local_time;
    core.main_function();
    let sent = core.eth_mut().take_sent();

    let captured = sent
        .iter()
        .find(|f| f.message_type() == Some(PtpMessageType::Sync))
        .and_then(|f| f.header())
        .map(|h| CapturedSync {
            sequence_id: h.sequence_id,
            global,
        });
    if captured.is_some() {
        let egress = GlobalTimestamp::from_nanos(i128::from(vlt + egress_delay)).unwrap();
        core.tx_confirmation(port, egress);
    }
    core.time_base_mut().advance(cycle_ns);
    (sent, captured)
}

/// Timestamp `nanos` after `base`.
pub fn at(base: GlobalTimestamp, nanos: i128) -> GlobalTimestamp {
    GlobalTimestamp::from_nanos(base.to_nanos() + nanos).unwrap()
}
