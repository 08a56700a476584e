//! gPTP timestamp representation and arithmetic.
//!
//! IEEE 802.1AS carries 80-bit timestamps: 48-bit seconds (split into a
//! 16-bit high word and a 32-bit low word) plus 32-bit nanoseconds. The
//! synchronized time base additionally exposes a free-running 64-bit
//! nanosecond counter, the virtual local time, which hardware timestamps are
//! translated into when both derive from the same clock.
//!
//! All arithmetic is exact integer nanoseconds. Operations that can leave the
//! representable range return `None` instead of wrapping.

use super::wire;

/// Signed nanosecond difference.
pub type TimeDiff = i64;

/// Unsigned nanosecond difference.
pub type UTimeDiff = u64;

/// Global (synchronized) timestamp as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GlobalTimestamp {
    /// Upper 16 bits of the 48-bit seconds field.
    pub seconds_hi: u16,
    /// Lower 32 bits of the 48-bit seconds field.
    pub seconds: u32,
    /// Nanoseconds within the current second (`0..999_999_999`).
    pub nanoseconds: u32,
}

impl GlobalTimestamp {
    /// Nanoseconds per second.
    pub const NANOS_PER_SEC: u32 = 1_000_000_000;

    /// Maximum seconds representable in 48 bits.
    pub const MAX_SECONDS_48BIT: u64 = (1u64 << 48) - 1;

    /// Wire size of an encoded timestamp.
    pub const WIRE_SIZE: usize = 10;

    /// Zero timestamp.
    pub const ZERO: Self = Self {
        seconds_hi: 0,
        seconds: 0,
        nanoseconds: 0,
    };

    /// Create a timestamp from 48-bit seconds and nanoseconds.
    ///
    /// Seconds are truncated to 48 bits, nanoseconds clamped to the valid range.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "seconds are split into their 16-bit and 32-bit wire words"
    )]
    pub fn new(seconds: u64, nanoseconds: u32) -> Self {
        let seconds = seconds & Self::MAX_SECONDS_48BIT;
        Self {
            seconds_hi: (seconds >> 32) as u16,
            seconds: seconds as u32,
            nanoseconds: nanoseconds.min(Self::NANOS_PER_SEC - 1),
        }
    }

    /// Full 48-bit seconds value.
    #[must_use]
    pub fn total_seconds(&self) -> u64 {
        (u64::from(self.seconds_hi) << 32) | u64::from(self.seconds)
    }

    /// Whether the nanoseconds field is normalized.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.nanoseconds < Self::NANOS_PER_SEC
    }

    /// Total nanoseconds since epoch.
    #[must_use]
    pub fn to_nanos(&self) -> i128 {
        i128::from(self.total_seconds()) * i128::from(Self::NANOS_PER_SEC)
            + i128::from(self.nanoseconds)
    }

    /// Create from total nanoseconds since epoch.
    ///
    /// Returns `None` for negative values or if the seconds do not fit 48 bits.
    #[must_use]
    pub fn from_nanos(nanos: i128) -> Option<Self> {
        if nanos < 0 {
            return None;
        }
        let seconds = u64::try_from(nanos / i128::from(Self::NANOS_PER_SEC)).ok()?;
        if seconds > Self::MAX_SECONDS_48BIT {
            return None;
        }
        let nanoseconds = u32::try_from(nanos % i128::from(Self::NANOS_PER_SEC)).ok()?;
        Some(Self::new(seconds, nanoseconds))
    }

    /// Encode as 6-byte seconds (BE) + 4-byte nanoseconds (BE).
    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        self.encode_into(&mut buf, 0);
        buf
    }

    /// Encode into `buf` at `offset`.
    pub fn encode_into(&self, buf: &mut [u8], offset: usize) {
        wire::put_u16(buf, offset, self.seconds_hi);
        wire::put_u32(buf, offset + 2, self.seconds);
        wire::put_u32(buf, offset + 6, self.nanoseconds);
    }

    /// Decode from `buf` at `offset`. The fields are taken as-is; use
    /// [`Self::is_valid`] before feeding the value into arithmetic.
    #[must_use]
    pub fn decode_from(buf: &[u8], offset: usize) -> Self {
        Self {
            seconds_hi: wire::get_u16(buf, offset),
            seconds: wire::get_u32(buf, offset + 2),
            nanoseconds: wire::get_u32(buf, offset + 6),
        }
    }
}

impl std::fmt::Display for GlobalTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.total_seconds(), self.nanoseconds)
    }
}

/// Free-running local nanosecond counter of the synchronized time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualLocalTime {
    /// Upper 32 bits.
    pub nanoseconds_hi: u32,
    /// Lower 32 bits.
    pub nanoseconds_lo: u32,
}

impl VirtualLocalTime {
    /// Create from a 64-bit nanosecond count.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "the counter is split into two 32-bit words"
    )]
    pub fn from_nanos(nanos: u64) -> Self {
        Self {
            nanoseconds_hi: (nanos >> 32) as u32,
            nanoseconds_lo: nanos as u32,
        }
    }

    /// 64-bit nanosecond count.
    #[must_use]
    pub fn as_nanos(&self) -> u64 {
        (u64::from(self.nanoseconds_hi) << 32) | u64::from(self.nanoseconds_lo)
    }
}

/// `a - b` in nanoseconds.
///
/// Fails if either timestamp is malformed or the difference does not fit
/// [`TimeDiff`].
#[must_use]
pub fn ts_minus_ts(a: &GlobalTimestamp, b: &GlobalTimestamp) -> Option<TimeDiff> {
    if !a.is_valid() || !b.is_valid() {
        return None;
    }
    TimeDiff::try_from(a.to_nanos() - b.to_nanos()).ok()
}

/// `ts + diff` for an unsigned nanosecond delta.
///
/// Fails if `ts` is malformed or the result overflows the 48-bit seconds field.
#[must_use]
pub fn ts_plus_utimediff(ts: &GlobalTimestamp, diff: UTimeDiff) -> Option<GlobalTimestamp> {
    if !ts.is_valid() {
        return None;
    }
    GlobalTimestamp::from_nanos(ts.to_nanos() + i128::from(diff))
}

/// `ts + diff` for a signed nanosecond delta.
///
/// Fails if `ts` is malformed, the result is negative, or it overflows the
/// 48-bit seconds field.
#[must_use]
pub fn ts_plus_timediff(ts: &GlobalTimestamp, diff: TimeDiff) -> Option<GlobalTimestamp> {
    if !ts.is_valid() {
        return None;
    }
    GlobalTimestamp::from_nanos(ts.to_nanos() + i128::from(diff))
}

/// Convert a (hardware) timestamp into the virtual-local-time domain.
///
/// Fails if the timestamp is malformed or exceeds the 64-bit counter.
#[must_use]
pub fn ts_to_vlt(ts: &GlobalTimestamp) -> Option<VirtualLocalTime> {
    if !ts.is_valid() {
        return None;
    }
    u64::try_from(ts.to_nanos())
        .ok()
        .map(VirtualLocalTime::from_nanos)
}

/// Convert a virtual local time into timestamp representation.
#[must_use]
pub fn vlt_to_ts(vlt: &VirtualLocalTime) -> GlobalTimestamp {
    let nanos = vlt.as_nanos();
    let per_sec = u64::from(GlobalTimestamp::NANOS_PER_SEC);
    // u64 nanoseconds span ~584 years, always inside 48-bit seconds.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "remainder of a division by 1e9 fits u32"
    )]
    let nanoseconds = (nanos % per_sec) as u32;
    GlobalTimestamp::new(nanos / per_sec, nanoseconds)
}

/// `a - b` for virtual local times.
#[must_use]
pub fn vlt_minus_vlt(a: &VirtualLocalTime, b: &VirtualLocalTime) -> Option<TimeDiff> {
    TimeDiff::try_from(i128::from(a.as_nanos()) - i128::from(b.as_nanos())).ok()
}
