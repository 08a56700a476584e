//! gPTP (IEEE 802.1AS) frames as exchanged by time-aware end stations and
//! bridges, including the AUTOSAR `Follow_Up` extension.
//!
//! ## Message flow
//!
//! ```text
//! Master                               Slave
//!   |--- Sync (egress t1) ---------------->|  ingress t2
//!   |--- Follow_Up (POT, correction) ----->|
//!   |      [AUTOSAR TLV: Time, Status,     |
//!   |       UserData, Offset sub-TLVs]     |
//! ```
//!
//! A time-aware bridge relays both messages, adding its residence time and
//! the upstream link delay to the correction field.

pub mod message;
pub mod timestamp;
pub mod wire;


// Re-exports for convenient access.
pub use message::{
    ArSubTlvIter, FollowUpMsg, MsgHeader, PtpMessageType, PtpParseError, PtpPortIdentity,
    SubTlvRef, SubTlvType, SyncMsg,
};
pub use timestamp::{GlobalTimestamp, TimeDiff, UTimeDiff, VirtualLocalTime};
