//! Sub-TLV integrity protection (AUTOSAR CRC-8H2F).
//!
//! The AUTOSAR `Follow_Up` extension secures four sub-TLV kinds with an
//! 8-bit CRC. Each CRC covers a kind-specific byte sequence followed by one
//! `DataId` byte chosen from a per-port list by `sequenceId % 16`.
//!
//! The Time sub-TLV carries two CRCs over a configurable selection of header
//! fields:
//!
//! | CRC        | Flag  | Field                   |
//! |------------|-------|-------------------------|
//! | `CRC_Time_0` | 0x02  | domainNumber            |
//! | `CRC_Time_0` | 0x08  | sourcePortIdentity      |
//! | `CRC_Time_0` | 0x20  | preciseOriginTimestamp  |
//! | `CRC_Time_1` | 0x01  | messageLength           |
//! | `CRC_Time_1` | 0x04  | correctionField         |
//! | `CRC_Time_1` | 0x10  | sequenceId              |
//!
//! CRC support is a capability of [`CrcHndl`] chosen at construction. Without
//! it, secured sub-TLVs can never be validated and are therefore discarded
//! whenever validation would be required, and transmitted sub-TLVs are always
//! emitted in their not-secured form.

use crc::{CRC_8_AUTOSAR, Crc, Digest};

use crate::protocol::ptp::message::{SubTlvRef, SubTlvType, layout};
use crate::protocol::ptp::wire;
use crate::types::{DataIdList, RxCrcValidated, SubTlvConfig, TimeSecuredFlags};


/// CRC-8H2F: polynomial 0x2F, init 0xFF, xor-out 0xFF, not reflected.
const CRC8H2F: Crc<u8> = Crc::<u8>::new(&CRC_8_AUTOSAR);

/// CRC-8H2F with the AUTOSAR `Crc_CalculateCRC8H2F` call convention.
///
/// With `first_call` the start value is ignored. Otherwise `start_value` must
/// be the result of the previous call; the computation then continues over
/// `data` as if both blocks had been processed at once.
#[must_use]
pub fn crc8h2f(data: &[u8], start_value: u8, first_call: bool) -> u8 {
    let mut digest = if first_call {
        CRC8H2F.digest()
    } else {
        CRC8H2F.digest_with_initial(start_value ^ CRC_8_AUTOSAR.xorout)
    };
    digest.update(data);
    digest.finalize()
}

/// `DataId` for `sequence_id`.
#[must_use]
pub fn data_id(list: &DataIdList, sequence_id: u16) -> u8 {
    list[usize::from(sequence_id) % list.len()]
}

/// Whether a sub-TLV type is protected by a CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecuredInfo {
    /// Secured variant.
    Secured,
    /// Not-secured variant.
    NotSecured,
    /// Type not known to this core.
    Unknown,
}

/// What to do with a received sub-TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationAction {
    /// Accept without checking.
    Accept,
    /// Recompute and compare the CRC.
    Validate,
    /// Reject the message.
    Discard,
}

/// Classify a sub-TLV by its type byte.
#[must_use]
pub fn tlv_crc_secured_info(tlv_type: u8) -> SecuredInfo {
    match SubTlvType::from_u8(tlv_type) {
        Some(
            SubTlvType::TimeSecured
            | SubTlvType::StatusSecured
            | SubTlvType::UserDataSecured
            | SubTlvType::OfsSecured,
        ) => SecuredInfo::Secured,
        Some(
            SubTlvType::StatusNotSecured
            | SubTlvType::UserDataNotSecured
            | SubTlvType::OfsNotSecured,
        ) => SecuredInfo::NotSecured,
        None => SecuredInfo::Unknown,
    }
}

/// CRC handling with the CRC capability fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcHndl {
    supported: bool,
}

impl CrcHndl {
    /// Create a handler; `supported` enables CRC computation and validation.
    #[must_use]
    pub fn new(supported: bool) -> Self {
        Self { supported }
    }

    /// Whether CRC support is available.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Receive policy for a sub-TLV of the given security class.
    #[must_use]
    pub fn validation_action(
        &self,
        rx_crc_validated: RxCrcValidated,
        info: SecuredInfo,
    ) -> ValidationAction {
        match (info, rx_crc_validated) {
            (SecuredInfo::Unknown, _)
            | (SecuredInfo::Secured, RxCrcValidated::Ignored)
            | (
                SecuredInfo::NotSecured,
                RxCrcValidated::NotValidated | RxCrcValidated::Ignored | RxCrcValidated::Optional,
            ) => ValidationAction::Accept,
            (SecuredInfo::Secured, RxCrcValidated::Validated | RxCrcValidated::Optional) => {
                if self.supported {
                    ValidationAction::Validate
                } else {
                    ValidationAction::Discard
                }
            }
            (SecuredInfo::Secured, RxCrcValidated::NotValidated)
            | (SecuredInfo::NotSecured, RxCrcValidated::Validated) => ValidationAction::Discard,
        }
    }

    /// `CRC_Time_0` of the `Follow_Up` in `msg`.
    #[must_use]
    pub fn compute_time0_crc(&self, msg: &[u8], flags: TimeSecuredFlags, data_id: u8) -> u8 {
        let mut digest = CRC8H2F.digest();
        digest.update(&[flags.0]);
        if flags.contains(TimeSecuredFlags::DOMAIN_NUMBER) {
            digest.update(&msg[layout::HDR_DOMAIN..=layout::HDR_DOMAIN]);
        }
        if flags.contains(TimeSecuredFlags::SRC_PORT_IDENTITY) {
            digest.update(&msg[layout::HDR_CLOCK_ID..layout::HDR_SEQ_ID]);
        }
        if flags.contains(TimeSecuredFlags::PRECISE_ORIGIN_TIMESTAMP) {
            digest.update(&msg[layout::FUP_POT..layout::FUP_TLV]);
        }
        finish(digest, data_id)
    }

    /// `CRC_Time_1` of the `Follow_Up` in `msg`.
    #[must_use]
    pub fn compute_time1_crc(&self, msg: &[u8], flags: TimeSecuredFlags, data_id: u8) -> u8 {
        let mut digest = CRC8H2F.digest();
        digest.update(&[flags.0]);
        if flags.contains(TimeSecuredFlags::MSG_LENGTH) {
            digest.update(&msg[layout::HDR_MSG_LENGTH..layout::HDR_DOMAIN]);
        }
        if flags.contains(TimeSecuredFlags::CORRECTION_FIELD) {
            digest.update(&msg[layout::HDR_CORRECTION..layout::HDR_CORRECTION + 8]);
        }
        if flags.contains(TimeSecuredFlags::SEQUENCE_ID) {
            digest.update(&msg[layout::HDR_SEQ_ID..layout::HDR_CONTROL]);
        }
        finish(digest, data_id)
    }

    /// CRC of a Status, `UserData` or Offset sub-TLV payload (without its CRC
    /// byte).
    #[must_use]
    pub fn compute_sub_tlv_crc(&self, payload: &[u8], data_id: u8) -> u8 {
        let mut digest = CRC8H2F.digest();
        digest.update(payload);
        finish(digest, data_id)
    }

    /// Whether the Time sub-TLV CRCs of `msg` match its header.
    ///
    /// Returns `(crc0_valid, crc1_valid)`.
    #[must_use]
    pub fn time_crc_state(&self, msg: &[u8], tlv: &SubTlvRef, data_id: u8) -> (bool, bool) {
        let payload = tlv.payload_offset();
        let flags = TimeSecuredFlags(wire::get_u8(msg, payload));
        (
            wire::get_u8(msg, payload + 1) == self.compute_time0_crc(msg, flags, data_id),
            wire::get_u8(msg, payload + 2) == self.compute_time1_crc(msg, flags, data_id),
        )
    }

    /// Receive-side decision for one sub-TLV of `msg`.
    #[must_use]
    pub fn check_sub_tlv_crc_state(
        &self,
        msg: &[u8],
        tlv: &SubTlvRef,
        rx_crc_validated: RxCrcValidated,
        data_id: u8,
    ) -> bool {
        let info = tlv_crc_secured_info(tlv.tlv_type);
        match self.validation_action(rx_crc_validated, info) {
            ValidationAction::Accept => true,
            ValidationAction::Discard => false,
            ValidationAction::Validate => {
                let Some(kind) = SubTlvType::from_u8(tlv.tlv_type) else {
                    return true;
                };
                if tlv.length != kind.payload_len() {
                    return false;
                }
                if kind == SubTlvType::TimeSecured {
                    let (crc0, crc1) = self.time_crc_state(msg, tlv, data_id);
                    crc0 && crc1
                } else {
                    let start = tlv.payload_offset();
                    let crc_ofs = start + usize::from(tlv.length) - 1;
                    wire::get_u8(msg, crc_ofs) == self.compute_sub_tlv_crc(&msg[start..crc_ofs], data_id)
                }
            }
        }
    }

    /// Write the type and CRC byte of a Status sub-TLV whose payload is
    /// already in place at `offset + 2`.
    pub fn status_tlv_crc_info(&self, cfg: SubTlvConfig, buf: &mut [u8], offset: usize, data_id: u8) {
        self.finish_sub_tlv(
            buf,
            offset,
            cfg.secured,
            (SubTlvType::StatusSecured, SubTlvType::StatusNotSecured),
            data_id,
        );
    }

    /// Write the type and CRC byte of a `UserData` sub-TLV whose payload is
    /// already in place at `offset + 2`.
    pub fn user_data_tlv_crc_info(
        &self,
        cfg: SubTlvConfig,
        buf: &mut [u8],
        offset: usize,
        data_id: u8,
    ) {
        self.finish_sub_tlv(
            buf,
            offset,
            cfg.secured,
            (SubTlvType::UserDataSecured, SubTlvType::UserDataNotSecured),
            data_id,
        );
    }

    /// Write the type and CRC byte of an Offset sub-TLV whose payload is
    /// already in place at `offset + 2`.
    pub fn ofs_tlv_crc_info(&self, secured: bool, buf: &mut [u8], offset: usize, data_id: u8) {
        self.finish_sub_tlv(
            buf,
            offset,
            secured,
            (SubTlvType::OfsSecured, SubTlvType::OfsNotSecured),
            data_id,
        );
    }

    /// Write a complete Time-secured sub-TLV at `offset`. The header and
    /// precise origin timestamp of `buf` must be final.
    pub fn write_time_tlv(
        &self,
        buf: &mut [u8],
        offset: usize,
        flags: TimeSecuredFlags,
        data_id: u8,
    ) {
        let crc0 = self.compute_time0_crc(buf, flags, data_id);
        let crc1 = self.compute_time1_crc(buf, flags, data_id);
        wire::put_u8(buf, offset, SubTlvType::TimeSecured as u8);
        wire::put_u8(buf, offset + 1, layout::SUB_TLV_TIME_LEN);
        wire::put_u8(buf, offset + 2, flags.0);
        wire::put_u8(buf, offset + 3, crc0);
        wire::put_u8(buf, offset + 4, crc1);
    }

    fn finish_sub_tlv(
        &self,
        buf: &mut [u8],
        offset: usize,
        secured: bool,
        (secured_type, plain_type): (SubTlvType, SubTlvType),
        data_id: u8,
    ) {
        let len = secured_type.payload_len();
        let start = offset + layout::SUB_TLV_HDR_LEN;
        let crc_ofs = start + usize::from(len) - 1;
        let (tlv_type, crc) = if secured && self.supported {
            (secured_type, self.compute_sub_tlv_crc(&buf[start..crc_ofs], data_id))
        } else {
            (plain_type, 0)
        };
        wire::put_u8(buf, offset, tlv_type as u8);
        wire::put_u8(buf, offset + 1, len);
        wire::put_u8(buf, crc_ofs, crc);
    }
}

fn finish(mut digest: Digest<'_, u8>, data_id: u8) -> u8 {
    digest.update(&[data_id]);
    digest.finalize()
}
