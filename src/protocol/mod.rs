//! Wire protocols

pub mod ptp;
