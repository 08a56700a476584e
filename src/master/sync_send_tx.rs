//! `Follow_Up` serialization for master ports.
//!
//! The `Follow_Up` length of a port is fixed by its configuration, so the
//! generated length is checked once at startup by [`verify_cfg`]. At runtime
//! the header is written with that length first, then the body, then the
//! AUTOSAR sub-TLVs whose CRCs may cover the header.

use crate::crc::{self, CrcHndl};
use crate::error::ConfigError;
use crate::interfaces::{TimeBase, TimeBaseStatus, TimeTuple, UserData};
use crate::protocol::ptp::message::{
    MsgHeader, layout, write_ar_tlv_header, write_follow_up_body,
};
use crate::protocol::ptp::wire;
use crate::types::{MasterPortConfig, MessageCompliance};

const TIME_TLV_LEN: usize = layout::SUB_TLV_HDR_LEN + layout::SUB_TLV_TIME_LEN as usize;
const STATUS_TLV_LEN: usize = layout::SUB_TLV_HDR_LEN + layout::SUB_TLV_STATUS_LEN as usize;
const USER_DATA_TLV_LEN: usize =
    layout::SUB_TLV_HDR_LEN + layout::SUB_TLV_USER_DATA_LEN as usize;
const OFS_TLV_LEN: usize = layout::SUB_TLV_HDR_LEN + layout::SUB_TLV_OFS_LEN as usize;

/// Length of the `Follow_Up` a port transmits.
#[must_use]
pub fn follow_up_length(
    cfg: &MasterPortConfig,
    compliance: MessageCompliance,
    crc: CrcHndl,
) -> usize {
    if compliance == MessageCompliance::Strict {
        return layout::FUP_LEN;
    }
    let tlvs = &cfg.ar_sub_tlvs;
    let mut sub_tlvs = 0;
    if tlvs.time.is_some() && crc.is_supported() {
        sub_tlvs += TIME_TLV_LEN;
    }
    if tlvs.status.is_some() {
        sub_tlvs += STATUS_TLV_LEN;
    }
    if tlvs.user_data.is_some() {
        sub_tlvs += USER_DATA_TLV_LEN;
    }
    sub_tlvs += tlvs.ofs.len() * OFS_TLV_LEN;
    if sub_tlvs == 0 {
        layout::FUP_LEN
    } else {
        layout::AR_SUB_TLV_START + sub_tlvs
    }
}

/// Startup consistency check of a master port's `Follow_Up` configuration.
pub fn verify_cfg(
    cfg: &MasterPortConfig,
    compliance: MessageCompliance,
    crc: CrcHndl,
) -> Result<(), ConfigError> {
    if cfg.ar_sub_tlvs.ofs.len() > layout::MAX_OFS_SUB_TLVS {
        return Err(ConfigError::TooManyOfsSubTlvs {
            port: cfg.port,
            count: cfg.ar_sub_tlvs.ofs.len(),
            max: layout::MAX_OFS_SUB_TLVS,
        });
    }
    let computed = follow_up_length(cfg, compliance, crc);
    if let Some(configured) = cfg.follow_up_length {
        if usize::from(configured) != computed {
            return Err(ConfigError::FollowUpLengthMismatch {
                port: cfg.port,
                configured,
                computed: u16::try_from(computed).unwrap_or(u16::MAX),
            });
        }
    }
    Ok(())
}

/// Inputs of one `Follow_Up`.
#[derive(Debug, Clone, Copy)]
pub struct FollowUpParams<'a> {
    /// Header; the length is filled in during serialization.
    pub header: MsgHeader,
    /// Time base sample taken when the Sync was sent.
    pub sync_tx_info: &'a TimeTuple,
}

/// Serialize a `Follow_Up` into `buf` and return its length.
///
/// `buf` must hold at least [`follow_up_length`] bytes.
pub fn write_follow_up<T: TimeBase>(
    buf: &mut [u8],
    params: &FollowUpParams<'_>,
    cfg: &MasterPortConfig,
    time_base: &T,
    crc: CrcHndl,
    compliance: MessageCompliance,
) -> usize {
    let len = follow_up_length(cfg, compliance, crc);
    let mut header = params.header;
    header.message_length = u16::try_from(len).unwrap_or(u16::MAX);
    header.encode_into(buf);
    write_follow_up_body(buf, &params.sync_tx_info.global_time);

    if compliance == MessageCompliance::Strict {
        return len;
    }

    let tlvs = &cfg.ar_sub_tlvs;
    let data_id = crc::data_id(&cfg.data_id_list, header.sequence_id);
    let mut ofs = layout::AR_SUB_TLV_START;

    if let Some(flags) = tlvs.time {
        if crc.is_supported() {
            crc.write_time_tlv(buf, ofs, flags, data_id);
            ofs += TIME_TLV_LEN;
        }
    }
    if let Some(status_cfg) = tlvs.status {
        let payload = ofs + layout::SUB_TLV_HDR_LEN;
        wire::put_u8(buf, payload, status_byte(params.sync_tx_info.status));
        crc.status_tlv_crc_info(status_cfg, buf, ofs, data_id);
        ofs += STATUS_TLV_LEN;
    }
    if let Some(user_data_cfg) = tlvs.user_data {
        write_user_data(buf, ofs + layout::SUB_TLV_HDR_LEN, &params.sync_tx_info.user_data);
        crc.user_data_tlv_crc_info(user_data_cfg, buf, ofs, data_id);
        ofs += USER_DATA_TLV_LEN;
    }
    for ofs_cfg in &tlvs.ofs {
        let offset = time_base.offset(ofs_cfg.time_base).unwrap_or_default();
        let payload = ofs + layout::SUB_TLV_HDR_LEN;
        wire::put_u8(buf, payload, ofs_cfg.domain_number);
        wire::put_u16(buf, payload + 1, offset.offset.seconds_hi);
        wire::put_u32(buf, payload + 3, offset.offset.seconds);
        wire::put_u32(buf, payload + 7, offset.offset.nanoseconds);
        wire::put_u8(buf, payload + 11, status_byte(offset.status));
        write_user_data(buf, payload + 12, &offset.user_data);
        crc.ofs_tlv_crc_info(ofs_cfg.secured, buf, ofs, data_id);
        ofs += OFS_TLV_LEN;
    }

    if ofs > layout::AR_SUB_TLV_START {
        let sub_tlv_bytes = u16::try_from(ofs - layout::AR_SUB_TLV_START).unwrap_or(u16::MAX);
        write_ar_tlv_header(buf, sub_tlv_bytes);
    }
    debug_assert!(ofs == len || (ofs == layout::AR_SUB_TLV_START && len == layout::FUP_LEN));
    len
}

/// Sub-TLV status byte: bit 0 is the sync-to-gateway flag.
fn status_byte(status: TimeBaseStatus) -> u8 {
    u8::from(status.contains(TimeBaseStatus::SYNC_TO_GATEWAY))
}

fn write_user_data(buf: &mut [u8], offset: usize, user_data: &UserData) {
    wire::put_u8(buf, offset, user_data.length);
    buf[offset + 1..offset + 4].copy_from_slice(&user_data.bytes);
}
