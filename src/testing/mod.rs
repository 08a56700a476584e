//! Test doubles for the collaborator traits and helpers that build received
//! frames.

pub mod mock_eth_if;
pub mod mock_switch;
pub mod mock_time_base;

pub use mock_eth_if::{MockEthIf, SentFrame};
pub use mock_switch::{CorrectionCall, MockSwitch};
pub use mock_time_base::MockTimeBase;

use crate::crc::CrcHndl;
use crate::protocol::ptp::message::{
    MsgHeader, PtpMessageType, PtpPortIdentity, layout, write_ar_tlv_header,
    write_follow_up_body, write_sync_body,
};
use crate::protocol::ptp::timestamp::GlobalTimestamp;
use crate::types::TimeSecuredFlags;

/// Clock identity used by [`test_header`].
pub const TEST_CLOCK_IDENTITY: u64 = 0x0011_22FF_FE33_4455;

/// Header as an upstream master would send it (logMessageInterval -3).
#[must_use]
pub fn test_header(message_type: PtpMessageType, sequence_id: u16) -> MsgHeader {
    let mut header = MsgHeader::new(
        message_type,
        PtpPortIdentity::new(TEST_CLOCK_IDENTITY, 1),
        sequence_id,
    );
    header.log_message_interval = -3;
    header
}

/// A Sync frame for `header`.
#[must_use]
pub fn sync_frame(header: &MsgHeader) -> Vec<u8> {
    let mut buf = vec![0u8; layout::SYNC_LEN];
    let mut header = *header;
    header.message_length = u16::try_from(layout::SYNC_LEN).unwrap_or(u16::MAX);
    header.encode_into(&mut buf);
    write_sync_body(&mut buf);
    buf
}

/// A `Follow_Up` frame, optionally carrying a Time-secured sub-TLV computed
/// with the given flags and `DataId`.
#[must_use]
pub fn follow_up_frame(
    header: &MsgHeader,
    pot: &GlobalTimestamp,
    time_tlv: Option<(TimeSecuredFlags, u8)>,
) -> Vec<u8> {
    let time_len = layout::SUB_TLV_HDR_LEN + usize::from(layout::SUB_TLV_TIME_LEN);
    let len = if time_tlv.is_some() {
        layout::AR_SUB_TLV_START + time_len
    } else {
        layout::FUP_LEN
    };
    let mut buf = vec![0u8; len];
    let mut header = *header;
    header.message_length = u16::try_from(len).unwrap_or(u16::MAX);
    header.encode_into(&mut buf);
    write_follow_up_body(&mut buf, pot);
    if let Some((flags, data_id)) = time_tlv {
        write_ar_tlv_header(&mut buf, u16::try_from(time_len).unwrap_or(u16::MAX));
        CrcHndl::new(true).write_time_tlv(&mut buf, layout::AR_SUB_TLV_START, flags, data_id);
    }
    buf
}
