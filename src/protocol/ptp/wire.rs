//! Big-endian field accessors for gPTP frames.
//!
//! Every message field is addressed by a fixed byte offset into the frame
//! buffer (see [`super::message::layout`]). The caller guarantees that
//! `offset + width <= buf.len()`; a violation is a programming error and
//! panics (with a descriptive message in debug builds).

use byteorder::{BigEndian, ByteOrder};

/// Largest value representable in a 48-bit field.
pub const U48_MAX: u64 = (1u64 << 48) - 1;

/// Largest value representable in a 24-bit field.
pub const U24_MAX: u32 = (1u32 << 24) - 1;

#[inline]
fn check(buf_len: usize, offset: usize, width: usize) {
    debug_assert!(
        offset + width <= buf_len,
        "wire access out of bounds: offset {offset} + {width} > {buf_len}"
    );
}

/// Read an 8-bit field.
#[inline]
#[must_use]
pub fn get_u8(buf: &[u8], offset: usize) -> u8 {
    check(buf.len(), offset, 1);
    buf[offset]
}

/// Read a 16-bit big-endian field.
#[inline]
#[must_use]
pub fn get_u16(buf: &[u8], offset: usize) -> u16 {
    check(buf.len(), offset, 2);
    BigEndian::read_u16(&buf[offset..offset + 2])
}

/// Read a 24-bit big-endian field.
#[inline]
#[must_use]
pub fn get_u24(buf: &[u8], offset: usize) -> u32 {
    check(buf.len(), offset, 3);
    BigEndian::read_u24(&buf[offset..offset + 3])
}

/// Read a 32-bit big-endian field.
#[inline]
#[must_use]
pub fn get_u32(buf: &[u8], offset: usize) -> u32 {
    check(buf.len(), offset, 4);
    BigEndian::read_u32(&buf[offset..offset + 4])
}

/// Read a 48-bit big-endian field.
#[inline]
#[must_use]
pub fn get_u48(buf: &[u8], offset: usize) -> u64 {
    check(buf.len(), offset, 6);
    BigEndian::read_u48(&buf[offset..offset + 6])
}

/// Read a 64-bit big-endian field.
#[inline]
#[must_use]
pub fn get_u64(buf: &[u8], offset: usize) -> u64 {
    check(buf.len(), offset, 8);
    BigEndian::read_u64(&buf[offset..offset + 8])
}

/// Write an 8-bit field.
#[inline]
pub fn put_u8(buf: &mut [u8], offset: usize, value: u8) {
    check(buf.len(), offset, 1);
    buf[offset] = value;
}

/// Write a 16-bit big-endian field.
#[inline]
pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    check(buf.len(), offset, 2);
    BigEndian::write_u16(&mut buf[offset..offset + 2], value);
}

/// Write a 24-bit big-endian field. `value` must fit in 24 bits.
#[inline]
pub fn put_u24(buf: &mut [u8], offset: usize, value: u32) {
    check(buf.len(), offset, 3);
    debug_assert!(value <= U24_MAX, "value {value:#x} exceeds 24 bits");
    BigEndian::write_u24(&mut buf[offset..offset + 3], value);
}

/// Write a 32-bit big-endian field.
#[inline]
pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    check(buf.len(), offset, 4);
    BigEndian::write_u32(&mut buf[offset..offset + 4], value);
}

/// Write a 48-bit big-endian field. `value` must fit in 48 bits.
#[inline]
pub fn put_u48(buf: &mut [u8], offset: usize, value: u64) {
    check(buf.len(), offset, 6);
    debug_assert!(value <= U48_MAX, "value {value:#x} exceeds 48 bits");
    BigEndian::write_u48(&mut buf[offset..offset + 6], value);
}

/// Write a 64-bit big-endian field.
#[inline]
pub fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    check(buf.len(), offset, 8);
    BigEndian::write_u64(&mut buf[offset..offset + 8], value);
}
