//! Low-level byte helpers shared by the parsers and the ES device.
//!
//! Wii structures are big-endian throughout. Stream readers read exactly the
//! bytes they promise or return an error; slice readers return
//! [`Error::UnexpectedEof`] when the field does not fit.

use std::io::Read;

use crate::{Error, Result};

/// Read a big-endian `u32`.
#[inline]
pub(crate) fn be_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

/// Read exactly `len` bytes into a `Vec`.
#[inline]
pub(crate) fn bytesv<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut b = vec![0u8; len];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Copy `N` bytes starting at `offset` out of `buf`.
#[inline]
pub(crate) fn array_at<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    let end = offset.checked_add(N).ok_or(Error::UnexpectedEof)?;
    let slice = buf.get(offset..end).ok_or(Error::UnexpectedEof)?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}

/// Big-endian `u16` at `offset`.
#[inline]
pub(crate) fn be_u16_at(buf: &[u8], offset: usize) -> Result<u16> {
    array_at(buf, offset).map(u16::from_be_bytes)
}

/// Big-endian `u32` at `offset`.
#[inline]
pub(crate) fn be_u32_at(buf: &[u8], offset: usize) -> Result<u32> {
    array_at(buf, offset).map(u32::from_be_bytes)
}

/// Big-endian `u64` at `offset`.
#[inline]
pub(crate) fn be_u64_at(buf: &[u8], offset: usize) -> Result<u64> {
    array_at(buf, offset).map(u64::from_be_bytes)
}

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// Whether `s` is one half of a title ID as it appears in NAND paths:
/// exactly eight hex digits.
pub(crate) fn is_title_id_part(s: &str) -> bool {
    s.len() == 8 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_readers_are_big_endian() {
        let buf = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(be_u16_at(&buf, 1).unwrap(), 0x0102);
        assert_eq!(be_u32_at(&buf, 0).unwrap(), 0x0001_0203);
        assert_eq!(be_u64_at(&buf, 1).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn slice_readers_reject_short_buffers() {
        let buf = [0u8; 3];
        assert!(matches!(be_u32_at(&buf, 0), Err(Error::UnexpectedEof)));
        assert!(matches!(be_u16_at(&buf, usize::MAX), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn alignment() {
        assert_eq!(align_up(0, 0x40), 0);
        assert_eq!(align_up(1, 0x40), 0x40);
        assert_eq!(align_up(0x40, 0x40), 0x40);
        assert_eq!(align_up(0x41, 32), 0x60);
    }

    #[test]
    fn title_id_parts() {
        assert!(is_title_id_part("00010001"));
        assert!(is_title_id_part("4a4f4b45"));
        assert!(!is_title_id_part("0001000"));
        assert!(!is_title_id_part("0001000g"));
        assert!(!is_title_id_part("00010001.tik"));
    }
}
