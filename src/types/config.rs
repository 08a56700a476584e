use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ethernet interface port index as understood by [`crate::interfaces::EthIf`].
pub type PortIdx = u16;

/// Synchronized time base identifier as understood by [`crate::interfaces::TimeBase`].
pub type TimeBaseId = u16;

/// Switch index as understood by [`crate::interfaces::SwitchMgmt`].
pub type SwitchIdx = u8;

/// Per-port rotating `DataId` list mixed into every sub-TLV CRC.
pub type DataIdList = [u8; 16];

/// Message compliance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageCompliance {
    /// AUTOSAR vendor sub-TLVs are appended to `Follow_Up`.
    #[default]
    Relaxed,
    /// Plain IEEE 802.1AS frames only.
    Strict,
}

/// Receive-side CRC policy of a slave port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RxCrcValidated {
    /// Only secured sub-TLVs with a correct CRC are accepted.
    Validated,
    /// Secured sub-TLVs are not accepted.
    NotValidated,
    /// CRCs are not checked.
    #[default]
    Ignored,
    /// Secured sub-TLVs are checked, not-secured ones accepted.
    Optional,
}

/// Header fields covered by the Time-secured sub-TLV CRCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeSecuredFlags(pub u8);

impl TimeSecuredFlags {
    /// messageLength (CRC1).
    pub const MSG_LENGTH: u8 = 0x01;
    /// domainNumber (CRC0).
    pub const DOMAIN_NUMBER: u8 = 0x02;
    /// correctionField (CRC1).
    pub const CORRECTION_FIELD: u8 = 0x04;
    /// sourcePortIdentity (CRC0).
    pub const SRC_PORT_IDENTITY: u8 = 0x08;
    /// sequenceId (CRC1).
    pub const SEQUENCE_ID: u8 = 0x10;
    /// preciseOriginTimestamp (CRC0).
    pub const PRECISE_ORIGIN_TIMESTAMP: u8 = 0x20;
    /// Every field.
    pub const ALL: Self = Self(0x3F);

    /// Whether `flag` is selected.
    #[must_use]
    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// A Status or `UserData` sub-TLV switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubTlvConfig {
    /// Emit the secured variant (with CRC).
    pub secured: bool,
}

/// An Offset time domain sub-TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfsSubTlvConfig {
    /// Offset time base to read.
    pub time_base: TimeBaseId,
    /// Domain number written into the sub-TLV.
    pub domain_number: u8,
    /// Emit the secured variant (with CRC).
    pub secured: bool,
}

/// AUTOSAR sub-TLVs appended to transmitted `Follow_Up` messages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArSubTlvConfig {
    /// Time-secured sub-TLV with the fields its CRCs cover.
    pub time: Option<TimeSecuredFlags>,
    /// Status sub-TLV.
    pub status: Option<SubTlvConfig>,
    /// User data sub-TLV.
    pub user_data: Option<SubTlvConfig>,
    /// Offset time domain sub-TLVs, in transmission order.
    pub ofs: Vec<OfsSubTlvConfig>,
}

impl ArSubTlvConfig {
    /// Whether any sub-TLV is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.status.is_none() && self.user_data.is_none() && self.ofs.is_empty()
    }
}

/// Announce transmission of a master port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceConfig {
    /// Main-function cycles between two Announce messages (at least 1).
    pub interval_cycles: u16,
    /// logMessageInterval written into the header.
    pub log_message_interval: i8,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            interval_cycles: 100,
            log_message_interval: 0,
        }
    }
}

/// Time master port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterPortConfig {
    /// Ethernet port.
    pub port: PortIdx,
    /// Time base distributed on this port.
    pub time_base: TimeBaseId,
    /// gPTP domain number.
    pub domain_number: u8,
    /// sourcePortIdentity clock identity.
    pub clock_identity: u64,
    /// sourcePortIdentity port number.
    pub port_number: u16,
    /// Main-function cycles between two Sync messages; 0 sends Sync only on
    /// time base updates.
    pub sync_interval_cycles: u16,
    /// logMessageInterval written into Sync/`Follow_Up`.
    pub log_sync_interval: i8,
    /// Send a Sync immediately when the time base update counter changes.
    pub immediate_time_sync: bool,
    /// Countdown reload after an immediate Sync.
    pub cyclic_msg_resume_cycles: u16,
    /// Announce transmission, if any.
    pub announce: Option<AnnounceConfig>,
    /// Treat the port as asCapable without a peer delay measurement.
    pub always_as_capable: bool,
    /// Hardware timestamps come from a clock independent of the time base.
    pub hw_timestamp_independent_clock: bool,
    /// Sub-TLVs appended in relaxed compliance mode.
    pub ar_sub_tlvs: ArSubTlvConfig,
    /// `DataId` rotation for transmitted CRCs.
    pub data_id_list: DataIdList,
    /// Generated `Follow_Up` length checked at startup.
    pub follow_up_length: Option<u16>,
    /// Index of the switch time sync instance fed by this port.
    pub swt_time_sync: Option<usize>,
}

impl MasterPortConfig {
    /// A master port with default timing on `port` distributing `time_base`.
    #[must_use]
    pub fn new(port: PortIdx, time_base: TimeBaseId, clock_identity: u64) -> Self {
        Self {
            port,
            time_base,
            clock_identity,
            ..Self::default()
        }
    }
}

impl Default for MasterPortConfig {
    fn default() -> Self {
        Self {
            port: 0,
            time_base: 0,
            domain_number: 0,
            clock_identity: 0,
            port_number: 1,
            sync_interval_cycles: 125,
            log_sync_interval: -3,
            immediate_time_sync: false,
            cyclic_msg_resume_cycles: 125,
            announce: None,
            always_as_capable: false,
            hw_timestamp_independent_clock: false,
            ar_sub_tlvs: ArSubTlvConfig::default(),
            data_id_list: [0; 16],
            follow_up_length: None,
            swt_time_sync: None,
        }
    }
}

/// Switch residence time model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResidenceTime {
    /// Measured per port from switch ingress/egress timestamps.
    #[default]
    Calculated,
    /// A configured constant.
    Fixed {
        /// Residence time in nanoseconds.
        nanoseconds: u64,
    },
}

/// Master port of a site sync relay path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SiteSyncMasterPort {
    /// Ethernet port.
    pub port: PortIdx,
    /// sourcePortIdentity clock identity used when not keeping the received one.
    pub clock_identity: u64,
    /// sourcePortIdentity port number used when not keeping the received one.
    pub port_number: u16,
}

/// Transparent relay of one slave port's Sync/`Follow_Up` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSyncConfig {
    /// Receiving port.
    pub slave_port: PortIdx,
    /// Switch the ports belong to.
    pub switch: SwitchIdx,
    /// gPTP domain number.
    pub domain_number: u8,
    /// Ports the stream is relayed to.
    pub master_ports: Vec<SiteSyncMasterPort>,
    /// Forward the received sourcePortIdentity unchanged.
    pub keep_src_port_identity: bool,
    /// CRC policy for received `Follow_Up` sub-TLVs.
    pub rx_crc_validated: RxCrcValidated,
    /// `DataId` rotation of the stream.
    pub data_id_list: DataIdList,
    /// Additional forward attempts before a message is abandoned.
    pub num_fwd_retries: u8,
    /// Cycles without Sync before cyclic synthesis starts (calculated
    /// residence time only; 0 disables).
    pub sync_rx_timeout_cycles: u16,
    /// Switch forwards Sync in hardware with per-port egress timestamps.
    pub asymmetric: bool,
    /// Index of the switch time sync instance fed by this slave port.
    pub swt_time_sync: Option<usize>,
}

impl Default for SiteSyncConfig {
    fn default() -> Self {
        Self {
            slave_port: 0,
            switch: 0,
            domain_number: 0,
            master_ports: Vec::new(),
            keep_src_port_identity: true,
            rx_crc_validated: RxCrcValidated::default(),
            data_id_list: [0; 16],
            num_fwd_retries: 3,
            sync_rx_timeout_cycles: 0,
            asymmetric: false,
            swt_time_sync: None,
        }
    }
}

/// Switch clock steering from received or transmitted Sync samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwtTimeSyncConfig {
    /// Switch whose clock is steered.
    pub switch: SwitchIdx,
    /// Slave switches that receive the same rate ratio.
    pub cascade_slaves: Vec<SwitchIdx>,
    /// Cycles without a sample before the state becomes uncertain.
    pub sync_event_timeout_cycles: u16,
    /// |offset| at or above which a jump is corrected directly (0 disables).
    pub offset_jump_threshold_ns: u64,
    /// |offset| at or above which a sample counts as out of sync.
    pub sync_precision_limit_ns: u64,
    /// Consecutive out-of-sync samples before the state becomes unsync.
    pub out_of_sync_count_max: u8,
    /// Correct offset and rate together on the first sync.
    pub use_initial_offset_correction: bool,
    /// Sync cycles a residual offset is spread over.
    pub offset_corr_cycles: u16,
    /// Nominal Sync interval used for the offset correction term.
    pub sync_interval: Duration,
    /// Number of parallel rate accumulation buffers.
    pub rate_meas_buffers: u8,
    /// Cycles after which a rate accumulation buffer restarts.
    pub rate_meas_max_cycles: u8,
    /// Lower rate ratio bound.
    pub rate_ratio_min: f64,
    /// Upper rate ratio bound.
    pub rate_ratio_max: f64,
}

impl Default for SwtTimeSyncConfig {
    fn default() -> Self {
        Self {
            switch: 0,
            cascade_slaves: Vec::new(),
            sync_event_timeout_cycles: 1000,
            offset_jump_threshold_ns: 0,
            sync_precision_limit_ns: 1_000,
            out_of_sync_count_max: 3,
            use_initial_offset_correction: true,
            offset_corr_cycles: 8,
            sync_interval: Duration::from_millis(125),
            rate_meas_buffers: 4,
            rate_meas_max_cycles: 16,
            rate_ratio_min: 0.999_8,
            rate_ratio_max: 1.000_2,
        }
    }
}

/// Configuration of the whole time synchronization core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthTSynConfig {
    /// Period at which [`crate::EthTSyn::main_function`] is called (default: 1ms)
    pub main_function_period: Duration,

    /// Sub-TLV CRC support; when off secured sub-TLVs are never validated
    /// and transmitted as not secured
    pub crc_support: bool,

    /// Message compliance mode (default: relaxed)
    pub message_compliance: MessageCompliance,

    /// Switch residence time model (default: calculated)
    pub residence_time: ResidenceTime,

    /// Time master ports
    pub master_ports: Vec<MasterPortConfig>,

    /// Site sync relay paths
    pub site_sync: Vec<SiteSyncConfig>,

    /// Switch time sync instances
    pub swt_time_sync: Vec<SwtTimeSyncConfig>,
}

impl Default for EthTSynConfig {
    fn default() -> Self {
        Self {
            main_function_period: Duration::from_millis(1),
            crc_support: true,
            message_compliance: MessageCompliance::Relaxed,
            residence_time: ResidenceTime::Calculated,
            master_ports: Vec::new(),
            site_sync: Vec::new(),
            swt_time_sync: Vec::new(),
        }
    }
}

impl EthTSynConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> EthTSynConfigBuilder {
        EthTSynConfigBuilder::default()
    }

    /// Main-function cycles corresponding to a log2 message interval,
    /// rounded to nearest, at least 1.
    #[must_use]
    pub fn log_interval_to_cycles(&self, log_message_interval: i8) -> u32 {
        let interval = 2f64.powi(i32::from(log_message_interval));
        let period = self.main_function_period.as_secs_f64();
        if period <= 0.0 {
            return 1;
        }
        let cycles = (interval / period).round();
        if cycles < 1.0 {
            1
        } else if cycles >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "range checked above"
            )]
            let cycles = cycles as u32;
            cycles
        }
    }
}

/// Builder for `EthTSynConfig`
#[derive(Debug, Clone, Default)]
pub struct EthTSynConfigBuilder {
    config: EthTSynConfig,
}

impl EthTSynConfigBuilder {
    /// Set the main-function period
    #[must_use]
    pub fn main_function_period(mut self, period: Duration) -> Self {
        self.config.main_function_period = period;
        self
    }

    /// Enable or disable sub-TLV CRC support
    #[must_use]
    pub fn crc_support(mut self, enable: bool) -> Self {
        self.config.crc_support = enable;
        self
    }

    /// Set message compliance mode
    #[must_use]
    pub fn message_compliance(mut self, compliance: MessageCompliance) -> Self {
        self.config.message_compliance = compliance;
        self
    }

    /// Set the residence time model
    #[must_use]
    pub fn residence_time(mut self, residence_time: ResidenceTime) -> Self {
        self.config.residence_time = residence_time;
        self
    }

    /// Add a time master port
    #[must_use]
    pub fn master_port(mut self, port: MasterPortConfig) -> Self {
        self.config.master_ports.push(port);
        self
    }

    /// Add a site sync relay path
    #[must_use]
    pub fn site_sync(mut self, site_sync: SiteSyncConfig) -> Self {
        self.config.site_sync.push(site_sync);
        self
    }

    /// Add a switch time sync instance
    #[must_use]
    pub fn swt_time_sync(mut self, swt: SwtTimeSyncConfig) -> Self {
        self.config.swt_time_sync.push(swt);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> EthTSynConfig {
        self.config
    }
}
