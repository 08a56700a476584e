//! gPTP message types, layout, parsing and encoding.
//!
//! Implements the IEEE 802.1AS message format carried by `EthTSyn`: the 34-byte
//! common header, the Sync, `Follow_Up` and Announce bodies, and the AUTOSAR
//! vendor TLV block that may trail a `Follow_Up`.
//!
//! Every field lives at a fixed byte offset (see [`layout`]). Encoders write
//! into caller-provided buffers whose length the caller has already
//! established; decoders validate the length first and return
//! [`PtpParseError`] on short or foreign frames.

use super::timestamp::GlobalTimestamp;
use super::wire;

/// Byte offsets and fixed values of the gPTP frame layout.
pub mod layout {
    /// Common header length.
    pub const HDR_LEN: usize = 34;
    /// transportSpecific (upper nibble) | messageType (lower nibble).
    pub const HDR_MSG_TYPE: usize = 0;
    /// versionPTP.
    pub const HDR_VERSION: usize = 1;
    /// messageLength.
    pub const HDR_MSG_LENGTH: usize = 2;
    /// domainNumber.
    pub const HDR_DOMAIN: usize = 4;
    /// flags.
    pub const HDR_FLAGS: usize = 6;
    /// correctionField (ns << 16).
    pub const HDR_CORRECTION: usize = 8;
    /// Sub-nanosecond part of the correction field.
    pub const HDR_CORRECTION_SUB_NS: usize = 14;
    /// sourcePortIdentity.clockIdentity.
    pub const HDR_CLOCK_ID: usize = 20;
    /// sourcePortIdentity.portNumber.
    pub const HDR_PORT_NUMBER: usize = 28;
    /// sequenceId.
    pub const HDR_SEQ_ID: usize = 30;
    /// control.
    pub const HDR_CONTROL: usize = 32;
    /// logMessageInterval.
    pub const HDR_LOG_MSG_INTERVAL: usize = 33;

    /// transportSpecific value for gPTP (802.1AS).
    pub const TRANSPORT_SPECIFIC: u8 = 1;
    /// versionPTP.
    pub const PTP_VERSION: u8 = 2;

    /// Sync message length (header + 10 reserved bytes).
    pub const SYNC_LEN: usize = 44;
    /// Sync flags: twoStepFlag | ptpTimescale.
    pub const SYNC_FLAGS: u16 = 0x0208;

    /// `Follow_Up` preciseOriginTimestamp.
    pub const FUP_POT: usize = 34;
    /// `Follow_Up` information TLV start.
    pub const FUP_TLV: usize = 44;
    /// `Follow_Up` information TLV: tlvType.
    pub const FUP_TLV_TYPE_OFS: usize = 44;
    /// `Follow_Up` information TLV: lengthField.
    pub const FUP_TLV_LENGTH_OFS: usize = 46;
    /// `Follow_Up` information TLV: organizationId.
    pub const FUP_TLV_ORG_ID_OFS: usize = 48;
    /// `Follow_Up` information TLV: organizationSubType.
    pub const FUP_TLV_ORG_SUBTYPE_OFS: usize = 51;
    /// `Follow_Up` information TLV: cumulativeScaledRateOffset.
    pub const FUP_TLV_RATE_OFFSET_OFS: usize = 54;
    /// `Follow_Up` information TLV: gmTimeBaseIndicator.
    pub const FUP_TLV_GM_TB_INDICATOR_OFS: usize = 58;
    /// `Follow_Up` information TLV: lastGmPhaseChange (12 bytes).
    pub const FUP_TLV_LAST_GM_PHASE_CHANGE_OFS: usize = 60;
    /// `Follow_Up` information TLV: scaledLastGmFreqChange.
    pub const FUP_TLV_GM_FREQ_CHANGE_OFS: usize = 72;
    /// Organization extension TLV type.
    pub const TLV_TYPE_ORG_EXTENSION: u16 = 0x0003;
    /// `Follow_Up` information TLV lengthField value.
    pub const FUP_TLV_LENGTH: u16 = 28;
    /// IEEE 802.1 organization id.
    pub const FUP_TLV_ORG_ID: u32 = 0x0080_C2;
    /// `Follow_Up` information TLV organizationSubType.
    pub const FUP_TLV_ORG_SUBTYPE: u32 = 1;
    /// `Follow_Up` flags: ptpTimescale.
    pub const FUP_FLAGS: u16 = 0x0008;
    /// `Follow_Up` length without vendor TLVs.
    pub const FUP_LEN: usize = 76;

    /// AUTOSAR TLV header start.
    pub const AR_TLV_HDR: usize = 76;
    /// AUTOSAR TLV header: lengthField.
    pub const AR_TLV_LENGTH_OFS: usize = 78;
    /// AUTOSAR TLV header: organizationId.
    pub const AR_TLV_ORG_ID_OFS: usize = 80;
    /// AUTOSAR TLV header: organizationSubType.
    pub const AR_TLV_ORG_SUBTYPE_OFS: usize = 83;
    /// AUTOSAR TLV header length.
    pub const AR_TLV_HDR_LEN: usize = 10;
    /// Bytes of the AUTOSAR TLV counted by its lengthField before the sub-TLVs.
    pub const AR_TLV_LENGTH_BASE: u16 = 6;
    /// AUTOSAR organization id.
    pub const AR_TLV_ORG_ID: u32 = 0x1A_75FB;
    /// AUTOSAR organization subtype.
    pub const AR_TLV_ORG_SUBTYPE: u32 = 0x60_5676;
    /// First AUTOSAR sub-TLV.
    pub const AR_SUB_TLV_START: usize = 86;

    /// Sub-TLV abstract header: type, length.
    pub const SUB_TLV_HDR_LEN: usize = 2;
    /// Time-secured sub-TLV payload length.
    pub const SUB_TLV_TIME_LEN: u8 = 3;
    /// Status sub-TLV payload length.
    pub const SUB_TLV_STATUS_LEN: u8 = 2;
    /// `UserData` sub-TLV payload length.
    pub const SUB_TLV_USER_DATA_LEN: u8 = 5;
    /// Offset sub-TLV payload length.
    pub const SUB_TLV_OFS_LEN: u8 = 17;
    /// Maximum number of Offset sub-TLVs per `Follow_Up`.
    pub const MAX_OFS_SUB_TLVS: usize = 4;
    /// Largest `Follow_Up` the core produces or relays.
    pub const FUP_MAX_LEN: usize = AR_SUB_TLV_START
        + (SUB_TLV_HDR_LEN + SUB_TLV_TIME_LEN as usize)
        + (SUB_TLV_HDR_LEN + SUB_TLV_STATUS_LEN as usize)
        + (SUB_TLV_HDR_LEN + SUB_TLV_USER_DATA_LEN as usize)
        + MAX_OFS_SUB_TLVS * (SUB_TLV_HDR_LEN + SUB_TLV_OFS_LEN as usize);

    /// Announce message length.
    pub const ANNOUNCE_LEN: usize = 76;
    /// Announce flags: ptpTimescale.
    pub const ANNOUNCE_FLAGS: u16 = 0x0008;
    /// Announce: currentUtcOffset.
    pub const ANN_UTC_OFFSET: usize = 44;
    /// Announce: grandmasterPriority1.
    pub const ANN_PRIORITY1: usize = 47;
    /// Announce: clockClass.
    pub const ANN_CLOCK_CLASS: usize = 48;
    /// Announce: clockAccuracy.
    pub const ANN_CLOCK_ACCURACY: usize = 49;
    /// Announce: offsetScaledLogVariance.
    pub const ANN_LOG_VARIANCE: usize = 50;
    /// Announce: grandmasterPriority2.
    pub const ANN_PRIORITY2: usize = 52;
    /// Announce: grandmasterIdentity.
    pub const ANN_GM_IDENTITY: usize = 53;
    /// Announce: stepsRemoved.
    pub const ANN_STEPS_REMOVED: usize = 61;
    /// Announce: timeSource.
    pub const ANN_TIME_SOURCE: usize = 63;
    /// Announce: path trace TLV type.
    pub const ANN_PATH_TRACE_TYPE_OFS: usize = 64;
    /// Announce: path trace TLV length.
    pub const ANN_PATH_TRACE_LENGTH_OFS: usize = 66;
    /// Announce: path trace sequence (one clock identity).
    pub const ANN_PATH_TRACE_SEQ: usize = 68;
    /// Path trace TLV type.
    pub const TLV_TYPE_PATH_TRACE: u16 = 0x0008;
    /// Path trace TLV length for a single hop.
    pub const PATH_TRACE_LENGTH: u16 = 8;
    /// Not grandmaster capable.
    pub const ANN_PRIORITY1_VALUE: u8 = 255;
    /// clockClass for a non-grandmaster-capable time-aware system.
    pub const ANN_CLOCK_CLASS_VALUE: u8 = 248;
    /// clockAccuracy unknown.
    pub const ANN_CLOCK_ACCURACY_VALUE: u8 = 0xFE;
    /// offsetScaledLogVariance.
    pub const ANN_LOG_VARIANCE_VALUE: u16 = 0x4100;
    /// grandmasterPriority2.
    pub const ANN_PRIORITY2_VALUE: u8 = 255;
    /// timeSource: internal oscillator.
    pub const ANN_TIME_SOURCE_VALUE: u8 = 0xA0;

    /// `Pdelay_Req` message length.
    pub const PDELAY_REQ_LEN: usize = 54;
    /// `Pdelay_Resp` message length.
    pub const PDELAY_RESP_LEN: usize = 54;
    /// `Pdelay_Resp_Follow_Up` message length.
    pub const PDELAY_RESP_FUP_LEN: usize = 54;
}

/// gPTP message type identifiers (lower nibble of byte 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PtpMessageType {
    /// Sync (event).
    Sync = 0x00,
    /// Peer delay request (event).
    PdelayReq = 0x02,
    /// Peer delay response (event).
    PdelayResp = 0x03,
    /// Follow-up carrying the precise origin timestamp of a Sync.
    FollowUp = 0x08,
    /// Peer delay response follow-up.
    PdelayRespFollowUp = 0x0A,
    /// Announce.
    Announce = 0x0B,
}

impl PtpMessageType {
    /// Parse from the lower 4 bits of a byte.
    pub fn from_nibble(value: u8) -> Result<Self, PtpParseError> {
        match value & 0x0F {
            0x00 => Ok(Self::Sync),
            0x02 => Ok(Self::PdelayReq),
            0x03 => Ok(Self::PdelayResp),
            0x08 => Ok(Self::FollowUp),
            0x0A => Ok(Self::PdelayRespFollowUp),
            0x0B => Ok(Self::Announce),
            other => Err(PtpParseError::UnknownMessageType(other)),
        }
    }

    /// Whether this message type is an event message (requires timestamping).
    #[must_use]
    pub fn is_event(&self) -> bool {
        matches!(self, Self::Sync | Self::PdelayReq | Self::PdelayResp)
    }

    /// Value of the (deprecated) control field for this type.
    #[must_use]
    pub fn control(&self) -> u8 {
        match self {
            Self::Sync => 0x00,
            Self::FollowUp => 0x02,
            _ => 0x05,
        }
    }
}

impl std::fmt::Display for PtpMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "Sync"),
            Self::PdelayReq => write!(f, "Pdelay_Req"),
            Self::PdelayResp => write!(f, "Pdelay_Resp"),
            Self::FollowUp => write!(f, "Follow_Up"),
            Self::PdelayRespFollowUp => write!(f, "Pdelay_Resp_Follow_Up"),
            Self::Announce => write!(f, "Announce"),
        }
    }
}

/// PTP port identity: 8-byte clock ID + 2-byte port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PtpPortIdentity {
    /// 8-byte clock identity (typically derived from MAC address).
    pub clock_identity: u64,
    /// Port number (1-based).
    pub port_number: u16,
}

impl PtpPortIdentity {
    /// Wire size.
    pub const SIZE: usize = 10;

    /// Create a new port identity.
    #[must_use]
    pub fn new(clock_identity: u64, port_number: u16) -> Self {
        Self {
            clock_identity,
            port_number,
        }
    }

    /// Encode into `buf` at `offset`.
    pub fn encode_into(&self, buf: &mut [u8], offset: usize) {
        wire::put_u64(buf, offset, self.clock_identity);
        wire::put_u16(buf, offset + 8, self.port_number);
    }

    /// Decode from `buf` at `offset`.
    #[must_use]
    pub fn decode_from(buf: &[u8], offset: usize) -> Self {
        Self {
            clock_identity: wire::get_u64(buf, offset),
            port_number: wire::get_u16(buf, offset + 8),
        }
    }
}

/// gPTP common message header (34 bytes).
///
/// The correction field is kept in whole nanoseconds; on the wire it occupies
/// the upper 48 bits of the 8-byte field with a zero sub-nanosecond part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Message type.
    pub message_type: PtpMessageType,
    /// Total message length including header.
    pub message_length: u16,
    /// Domain number.
    pub domain_number: u8,
    /// Flags field.
    pub flags: u16,
    /// Correction in nanoseconds, at most `2^48 - 1`.
    pub correction_ns: u64,
    /// Source port identity.
    pub source_port_identity: PtpPortIdentity,
    /// Sequence ID.
    pub sequence_id: u16,
    /// Control field.
    pub control: u8,
    /// Log2 of the message interval in seconds.
    pub log_message_interval: i8,
}

impl MsgHeader {
    /// Header size in bytes.
    pub const SIZE: usize = layout::HDR_LEN;

    /// Create a header with the gPTP defaults for `message_type`.
    #[must_use]
    pub fn new(message_type: PtpMessageType, source: PtpPortIdentity, sequence_id: u16) -> Self {
        let (message_length, flags) = match message_type {
            PtpMessageType::Sync => (layout::SYNC_LEN, layout::SYNC_FLAGS),
            PtpMessageType::FollowUp => (layout::FUP_LEN, layout::FUP_FLAGS),
            PtpMessageType::Announce => (layout::ANNOUNCE_LEN, layout::ANNOUNCE_FLAGS),
            PtpMessageType::PdelayReq => (layout::PDELAY_REQ_LEN, 0),
            PtpMessageType::PdelayResp => (layout::PDELAY_RESP_LEN, 0x0200),
            PtpMessageType::PdelayRespFollowUp => (layout::PDELAY_RESP_FUP_LEN, 0),
        };
        Self {
            message_type,
            message_length: u16::try_from(message_length).unwrap_or(u16::MAX),
            domain_number: 0,
            flags,
            correction_ns: 0,
            source_port_identity: source,
            sequence_id,
            control: message_type.control(),
            log_message_interval: 0,
        }
    }

    /// Whether a correction value fits the 48-bit wire field.
    #[must_use]
    pub fn correction_fits(correction_ns: u64) -> bool {
        correction_ns <= wire::U48_MAX
    }

    /// Encode into the first 34 bytes of `buf`.
    ///
    /// `correction_ns` must already have been checked with
    /// [`Self::correction_fits`].
    pub fn encode_into(&self, buf: &mut [u8]) {
        wire::put_u8(
            buf,
            layout::HDR_MSG_TYPE,
            (layout::TRANSPORT_SPECIFIC << 4) | (self.message_type as u8 & 0x0F),
        );
        wire::put_u8(buf, layout::HDR_VERSION, layout::PTP_VERSION);
        wire::put_u16(buf, layout::HDR_MSG_LENGTH, self.message_length);
        wire::put_u8(buf, layout::HDR_DOMAIN, self.domain_number);
        wire::put_u8(buf, layout::HDR_DOMAIN + 1, 0);
        wire::put_u16(buf, layout::HDR_FLAGS, self.flags);
        wire::put_u48(buf, layout::HDR_CORRECTION, self.correction_ns);
        wire::put_u16(buf, layout::HDR_CORRECTION_SUB_NS, 0);
        wire::put_u32(buf, layout::HDR_CORRECTION + 8, 0);
        self.source_port_identity
            .encode_into(buf, layout::HDR_CLOCK_ID);
        wire::put_u16(buf, layout::HDR_SEQ_ID, self.sequence_id);
        wire::put_u8(buf, layout::HDR_CONTROL, self.control);
        wire::put_u8(
            buf,
            layout::HDR_LOG_MSG_INTERVAL,
            self.log_message_interval.to_be_bytes()[0],
        );
    }

    /// Decode a header from `buf`.
    ///
    /// The sub-nanosecond part of the correction field is discarded.
    pub fn decode(buf: &[u8]) -> Result<Self, PtpParseError> {
        if buf.len() < Self::SIZE {
            return Err(PtpParseError::TooShort {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }
        let message_type = PtpMessageType::from_nibble(wire::get_u8(buf, layout::HDR_MSG_TYPE))?;
        let log_message_interval =
            i8::from_be_bytes([wire::get_u8(buf, layout::HDR_LOG_MSG_INTERVAL)]);
        Ok(Self {
            message_type,
            message_length: wire::get_u16(buf, layout::HDR_MSG_LENGTH),
            domain_number: wire::get_u8(buf, layout::HDR_DOMAIN),
            flags: wire::get_u16(buf, layout::HDR_FLAGS),
            correction_ns: wire::get_u48(buf, layout::HDR_CORRECTION),
            source_port_identity: PtpPortIdentity::decode_from(buf, layout::HDR_CLOCK_ID),
            sequence_id: wire::get_u16(buf, layout::HDR_SEQ_ID),
            control: wire::get_u8(buf, layout::HDR_CONTROL),
            log_message_interval,
        })
    }

    /// Decode a header and require a specific message type and minimum length.
    ///
    /// The declared `messageLength` must cover the fixed body and fit in `buf`.
    pub fn decode_expecting(
        buf: &[u8],
        expected: PtpMessageType,
        min_len: usize,
    ) -> Result<Self, PtpParseError> {
        let header = Self::decode(buf)?;
        if header.message_type != expected {
            return Err(PtpParseError::UnexpectedMessageType {
                expected,
                found: header.message_type,
            });
        }
        let declared = usize::from(header.message_length);
        if declared < min_len || declared > buf.len() {
            return Err(PtpParseError::LengthMismatch {
                declared,
                have: buf.len(),
            });
        }
        Ok(header)
    }
}

/// A received Sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMsg {
    /// Header.
    pub header: MsgHeader,
}

impl SyncMsg {
    /// Parse a Sync frame.
    pub fn decode(buf: &[u8]) -> Result<Self, PtpParseError> {
        let header = MsgHeader::decode_expecting(buf, PtpMessageType::Sync, layout::SYNC_LEN)?;
        Ok(Self { header })
    }
}

/// A received `Follow_Up`, viewed over its wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpMsg {
    /// Header.
    pub header: MsgHeader,
    /// Precise origin timestamp.
    pub precise_origin_timestamp: GlobalTimestamp,
}

impl FollowUpMsg {
    /// Parse a `Follow_Up` frame.
    ///
    /// Frames longer than [`layout::FUP_MAX_LEN`] are rejected.
    pub fn decode(buf: &[u8]) -> Result<Self, PtpParseError> {
        let header =
            MsgHeader::decode_expecting(buf, PtpMessageType::FollowUp, layout::FUP_LEN)?;
        if usize::from(header.message_length) > layout::FUP_MAX_LEN {
            return Err(PtpParseError::TooLong {
                max: layout::FUP_MAX_LEN,
                have: usize::from(header.message_length),
            });
        }
        Ok(Self {
            header,
            precise_origin_timestamp: GlobalTimestamp::decode_from(buf, layout::FUP_POT),
        })
    }
}

/// Write the Sync body (10 reserved bytes).
pub fn write_sync_body(buf: &mut [u8]) {
    buf[layout::HDR_LEN..layout::SYNC_LEN].fill(0);
}

/// Write the fixed `Follow_Up` body: precise origin timestamp and the
/// 802.1AS `Follow_Up` information TLV (grandmaster fields all zero).
pub fn write_follow_up_body(buf: &mut [u8], pot: &GlobalTimestamp) {
    pot.encode_into(buf, layout::FUP_POT);
    wire::put_u16(buf, layout::FUP_TLV_TYPE_OFS, layout::TLV_TYPE_ORG_EXTENSION);
    wire::put_u16(buf, layout::FUP_TLV_LENGTH_OFS, layout::FUP_TLV_LENGTH);
    wire::put_u24(buf, layout::FUP_TLV_ORG_ID_OFS, layout::FUP_TLV_ORG_ID);
    wire::put_u24(buf, layout::FUP_TLV_ORG_SUBTYPE_OFS, layout::FUP_TLV_ORG_SUBTYPE);
    buf[layout::FUP_TLV_RATE_OFFSET_OFS..layout::FUP_LEN].fill(0);
}

/// Write the AUTOSAR TLV header for `sub_tlv_bytes` bytes of sub-TLVs.
pub fn write_ar_tlv_header(buf: &mut [u8], sub_tlv_bytes: u16) {
    wire::put_u16(buf, layout::AR_TLV_HDR, layout::TLV_TYPE_ORG_EXTENSION);
    wire::put_u16(
        buf,
        layout::AR_TLV_LENGTH_OFS,
        layout::AR_TLV_LENGTH_BASE + sub_tlv_bytes,
    );
    wire::put_u24(buf, layout::AR_TLV_ORG_ID_OFS, layout::AR_TLV_ORG_ID);
    wire::put_u24(buf, layout::AR_TLV_ORG_SUBTYPE_OFS, layout::AR_TLV_ORG_SUBTYPE);
}

/// Write the Announce body of a non-grandmaster-capable time-aware system
/// with a one-hop path trace carrying `clock_identity`.
pub fn write_announce_body(buf: &mut [u8], clock_identity: u64) {
    buf[layout::HDR_LEN..layout::ANNOUNCE_LEN].fill(0);
    wire::put_u8(buf, layout::ANN_PRIORITY1, layout::ANN_PRIORITY1_VALUE);
    wire::put_u8(buf, layout::ANN_CLOCK_CLASS, layout::ANN_CLOCK_CLASS_VALUE);
    wire::put_u8(buf, layout::ANN_CLOCK_ACCURACY, layout::ANN_CLOCK_ACCURACY_VALUE);
    wire::put_u16(buf, layout::ANN_LOG_VARIANCE, layout::ANN_LOG_VARIANCE_VALUE);
    wire::put_u8(buf, layout::ANN_PRIORITY2, layout::ANN_PRIORITY2_VALUE);
    wire::put_u64(buf, layout::ANN_GM_IDENTITY, clock_identity);
    wire::put_u16(buf, layout::ANN_STEPS_REMOVED, 0);
    wire::put_u8(buf, layout::ANN_TIME_SOURCE, layout::ANN_TIME_SOURCE_VALUE);
    wire::put_u16(buf, layout::ANN_PATH_TRACE_TYPE_OFS, layout::TLV_TYPE_PATH_TRACE);
    wire::put_u16(buf, layout::ANN_PATH_TRACE_LENGTH_OFS, layout::PATH_TRACE_LENGTH);
    wire::put_u64(buf, layout::ANN_PATH_TRACE_SEQ, clock_identity);
}

/// AUTOSAR sub-TLV type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SubTlvType {
    /// Time, secured by two CRCs.
    TimeSecured = 0x28,
    /// Status, secured.
    StatusSecured = 0x50,
    /// Status, not secured.
    StatusNotSecured = 0x51,
    /// User data, secured.
    UserDataSecured = 0x60,
    /// User data, not secured.
    UserDataNotSecured = 0x61,
    /// Offset time domain, secured.
    OfsSecured = 0x44,
    /// Offset time domain, not secured.
    OfsNotSecured = 0x34,
}

impl SubTlvType {
    /// Classify a type byte; `None` for types this core does not know.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x28 => Some(Self::TimeSecured),
            0x50 => Some(Self::StatusSecured),
            0x51 => Some(Self::StatusNotSecured),
            0x60 => Some(Self::UserDataSecured),
            0x61 => Some(Self::UserDataNotSecured),
            0x44 => Some(Self::OfsSecured),
            0x34 => Some(Self::OfsNotSecured),
            _ => None,
        }
    }

    /// Payload length carried in the sub-TLV length byte.
    #[must_use]
    pub fn payload_len(&self) -> u8 {
        match self {
            Self::TimeSecured => layout::SUB_TLV_TIME_LEN,
            Self::StatusSecured | Self::StatusNotSecured => layout::SUB_TLV_STATUS_LEN,
            Self::UserDataSecured | Self::UserDataNotSecured => layout::SUB_TLV_USER_DATA_LEN,
            Self::OfsSecured | Self::OfsNotSecured => layout::SUB_TLV_OFS_LEN,
        }
    }
}

/// Location of one sub-TLV inside a `Follow_Up` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubTlvRef {
    /// Offset of the type byte.
    pub offset: usize,
    /// Raw type byte.
    pub tlv_type: u8,
    /// Payload length.
    pub length: u8,
}

impl SubTlvRef {
    /// Offset of the first payload byte.
    #[must_use]
    pub fn payload_offset(&self) -> usize {
        self.offset + layout::SUB_TLV_HDR_LEN
    }

    /// Total bytes including the abstract header.
    #[must_use]
    pub fn total_len(&self) -> usize {
        layout::SUB_TLV_HDR_LEN + usize::from(self.length)
    }
}

/// Iterator over the AUTOSAR sub-TLVs of a `Follow_Up`.
///
/// Yields nothing if the frame has no (well-formed) AUTOSAR TLV header and
/// stops at the first truncated sub-TLV.
#[derive(Debug, Clone)]
pub struct ArSubTlvIter<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> ArSubTlvIter<'a> {
    /// Iterate the sub-TLVs of the `Follow_Up` in `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        let end = ar_sub_tlv_end(buf).unwrap_or(layout::AR_SUB_TLV_START);
        Self {
            buf,
            pos: layout::AR_SUB_TLV_START,
            end,
        }
    }
}

impl Iterator for ArSubTlvIter<'_> {
    type Item = SubTlvRef;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + layout::SUB_TLV_HDR_LEN > self.end {
            return None;
        }
        let tlv = SubTlvRef {
            offset: self.pos,
            tlv_type: wire::get_u8(self.buf, self.pos),
            length: wire::get_u8(self.buf, self.pos + 1),
        };
        if tlv.offset + tlv.total_len() > self.end {
            self.pos = self.end;
            return None;
        }
        self.pos += tlv.total_len();
        Some(tlv)
    }
}

/// End offset (exclusive) of the AUTOSAR sub-TLV area, if the frame carries a
/// valid AUTOSAR TLV header.
fn ar_sub_tlv_end(buf: &[u8]) -> Option<usize> {
    if buf.len() < layout::AR_SUB_TLV_START {
        return None;
    }
    let msg_len = usize::from(wire::get_u16(buf, layout::HDR_MSG_LENGTH)).min(buf.len());
    if msg_len < layout::AR_SUB_TLV_START
        || wire::get_u16(buf, layout::AR_TLV_HDR) != layout::TLV_TYPE_ORG_EXTENSION
        || wire::get_u24(buf, layout::AR_TLV_ORG_ID_OFS) != layout::AR_TLV_ORG_ID
        || wire::get_u24(buf, layout::AR_TLV_ORG_SUBTYPE_OFS) != layout::AR_TLV_ORG_SUBTYPE
    {
        return None;
    }
    let tlv_len = usize::from(wire::get_u16(buf, layout::AR_TLV_LENGTH_OFS));
    let end = layout::AR_TLV_ORG_ID_OFS + tlv_len;
    Some(end.min(msg_len))
}

/// Error type for PTP frame parsing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PtpParseError {
    /// Packet too short.
    #[error("packet too short: need {needed} bytes, have {have}")]
    TooShort {
        /// Minimum bytes needed.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },
    /// Packet exceeds the largest supported length.
    #[error("packet too long: at most {max} bytes, have {have}")]
    TooLong {
        /// Largest accepted length.
        max: usize,
        /// Declared length.
        have: usize,
    },
    /// Declared message length disagrees with the frame.
    #[error("messageLength {declared} invalid for a {have}-byte frame")]
    LengthMismatch {
        /// messageLength field.
        declared: usize,
        /// Frame length.
        have: usize,
    },
    /// Unknown message type.
    #[error("unknown PTP message type: 0x{0:02X}")]
    UnknownMessageType(u8),
    /// A valid message of the wrong type.
    #[error("expected {expected}, got {found}")]
    UnexpectedMessageType {
        /// Type the caller asked for.
        expected: PtpMessageType,
        /// Type on the wire.
        found: PtpMessageType,
    },
}
