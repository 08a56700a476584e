//! Time-secured sub-TLV handling of relayed `Follow_Up` messages.
//!
//! A relay changes header fields the Time CRCs may cover. The CRCs are
//! recomputed when the correction field changed, the source port identity
//! is replaced, or the message was synthesized; otherwise the received
//! values are forwarded. A CRC that was invalid on reception stays invalid
//! on forwarding: its forwarded value is incremented by one.

use crate::crc::CrcHndl;
use crate::protocol::ptp::message::{ArSubTlvIter, SubTlvType, layout};
use crate::protocol::ptp::wire;
use crate::types::TimeSecuredFlags;

/// Time-secured sub-TLV of a received `Follow_Up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeTlvRx {
    /// Offset of the sub-TLV type byte.
    pub offset: usize,
    /// Received `CRC_Time_0` matched the header.
    pub crc0_valid: bool,
    /// Received `CRC_Time_1` matched the header.
    pub crc1_valid: bool,
}

/// Locate the Time-secured sub-TLV of `frame` and check its CRCs.
///
/// Without CRC support the received CRCs cannot be checked and are treated
/// as valid.
#[must_use]
pub fn capture_time_tlv(frame: &[u8], crc: CrcHndl, data_id: u8) -> Option<TimeTlvRx> {
    let tlv = ArSubTlvIter::new(frame).find(|tlv| {
        tlv.tlv_type == SubTlvType::TimeSecured as u8 && tlv.length == layout::SUB_TLV_TIME_LEN
    })?;
    let (crc0_valid, crc1_valid) = if crc.is_supported() {
        crc.time_crc_state(frame, &tlv, data_id)
    } else {
        (true, true)
    };
    Some(TimeTlvRx {
        offset: tlv.offset,
        crc0_valid,
        crc1_valid,
    })
}

/// Rewrite the Time CRCs of a forwarded copy whose header is final.
pub fn update_time_tlv(
    buf: &mut [u8],
    rx: &TimeTlvRx,
    recompute: bool,
    crc: CrcHndl,
    data_id: u8,
) {
    let payload = rx.offset + layout::SUB_TLV_HDR_LEN;
    let (mut crc0, mut crc1) = if recompute && crc.is_supported() {
        let flags = TimeSecuredFlags(wire::get_u8(buf, payload));
        (
            crc.compute_time0_crc(buf, flags, data_id),
            crc.compute_time1_crc(buf, flags, data_id),
        )
    } else {
        (wire::get_u8(buf, payload + 1), wire::get_u8(buf, payload + 2))
    };
    if !rx.crc0_valid {
        crc0 = crc0.wrapping_add(1);
    }
    if !rx.crc1_valid {
        crc1 = crc1.wrapping_add(1);
    }
    wire::put_u8(buf, payload + 1, crc0);
    wire::put_u8(buf, payload + 2, crc1);
}
