//! Low-level decoding primitives shared by all parsers.
//!
//! The stream readers either consume their full width or fail; parsers feed
//! them a [`crate::cursor::ByteCursor`], so an overrun surfaces as
//! [`crate::Error::UnexpectedEof`]. The `*_at` helpers peek at a fixed offset
//! without a cursor and return [`None`] past the end.

use std::io::Read;

use uuid::Uuid;

use crate::{Error, Result};

/// Pull exactly `N` bytes off the reader.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

#[inline]
pub(crate) fn u8<R: Read>(r: &mut R) -> Result<u8> {
    let [b] = bytesa(r)?;
    Ok(b)
}

#[inline]
pub(crate) fn le_u16<R: Read>(r: &mut R) -> Result<u16> {
    bytesa(r).map(u16::from_le_bytes)
}

/// 24-bit size field of FFS file and section headers.
#[inline]
pub(crate) fn le_u24<R: Read>(r: &mut R) -> Result<u32> {
    let [lo, mid, hi] = bytesa(r)?;
    Ok(u32::from_le_bytes([lo, mid, hi, 0]))
}

#[inline]
pub(crate) fn le_u32<R: Read>(r: &mut R) -> Result<u32> {
    bytesa(r).map(u32::from_le_bytes)
}

#[inline]
pub(crate) fn le_u64<R: Read>(r: &mut R) -> Result<u64> {
    bytesa(r).map(u64::from_le_bytes)
}

/// Read an EFI GUID (mixed-endian on disk).
#[inline]
pub(crate) fn guid<R: Read>(r: &mut R) -> Result<Uuid> {
    Ok(Uuid::from_bytes_le(bytesa::<16>(r)?))
}

/// Consume a signature, failing with [`Error::BadMagic`] if it differs.
#[inline]
pub(crate) fn magic<R: Read, const N: usize>(r: &mut R, expected: &[u8; N]) -> Result<()> {
    if bytesa::<N>(r)? == *expected {
        Ok(())
    } else {
        Err(Error::BadMagic)
    }
}

/// Read a GUID from `buf` at `offset` without a cursor.
#[inline]
pub(crate) fn guid_at(buf: &[u8], offset: usize) -> Option<Uuid> {
    let raw: [u8; 16] = buf.get(offset..offset.checked_add(16)?)?.try_into().ok()?;
    Some(Uuid::from_bytes_le(raw))
}

/// Read a little-endian `u16` from `buf` at `offset`.
#[inline]
pub(crate) fn u16_at(buf: &[u8], offset: usize) -> Option<u16> {
    let raw = buf.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

/// Read a little-endian `u32` from `buf` at `offset`.
#[inline]
pub(crate) fn u32_at(buf: &[u8], offset: usize) -> Option<u32> {
    let raw: [u8; 4] = buf.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

/// Read a little-endian `u64` from `buf` at `offset`.
#[inline]
pub(crate) fn u64_at(buf: &[u8], offset: usize) -> Option<u64> {
    let raw: [u8; 8] = buf.get(offset..offset.checked_add(8)?)?.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}

/// 8-bit wrapping sum of all bytes.
pub(crate) fn sum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// 16-bit wrapping sum of all little-endian words. A trailing odd byte is
/// ignored.
pub(crate) fn sum16(data: &[u8]) -> u16 {
    data.chunks_exact(2)
        .fold(0u16, |acc, w| acc.wrapping_add(u16::from_le_bytes([w[0], w[1]])))
}

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Returns the fill byte if every byte of `data` is the same erased value
/// (`0xFF` or `0x00`).
pub(crate) fn uniform_fill(data: &[u8]) -> Option<u8> {
    let first = *data.first()?;
    if (first == 0xFF || first == 0x00) && data.iter().all(|&b| b == first) {
        Some(first)
    } else {
        None
    }
}

/// Decode a null-terminated UCS-2 string, as stored in USER_INTERFACE and
/// VERSION sections.
pub(crate) fn ucs2_string(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|w| u16::from_le_bytes([w[0], w[1]]))
        .take_while(|&c| c != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Find the first occurrence of a non-empty `needle` at or after `from`.
pub(crate) fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_readers() {
        let mut r: &[u8] = &[0x01, 0x02, 0x03, 0x04, 0x05, b'_', b'F', b'V', b'H', b'x'];
        assert_eq!(u8(&mut r).unwrap(), 0x01);
        assert_eq!(le_u24(&mut r).unwrap(), 0x0004_0302);
        assert_eq!(u8(&mut r).unwrap(), 0x05);
        magic(&mut r, b"_FVH").unwrap();
        assert!(matches!(magic(&mut r, b"y"), Err(Error::BadMagic)));
        assert!(matches!(le_u16(&mut r), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn sums_wrap() {
        assert_eq!(sum8(&[0xFF, 0x02]), 0x01);
        assert_eq!(sum16(&[0xFF, 0xFF, 0x02, 0x00]), 0x0001);
        assert_eq!(sum16(&[0x01, 0x00, 0x07]), 0x0001);
    }

    #[test]
    fn align() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(24, 8), 24);
        assert_eq!(align_up(25, 4), 28);
    }

    #[test]
    fn uniform() {
        assert_eq!(uniform_fill(&[0xFF; 12]), Some(0xFF));
        assert_eq!(uniform_fill(&[0x00; 3]), Some(0x00));
        assert_eq!(uniform_fill(&[0xFF, 0x00]), None);
        assert_eq!(uniform_fill(&[0x5A; 4]), None);
        assert_eq!(uniform_fill(&[]), None);
    }

    #[test]
    fn ucs2() {
        let raw = [b'D', 0, b'x', 0, b'e', 0, 0, 0, b'?', 0];
        assert_eq!(ucs2_string(&raw), "Dxe");
    }

    #[test]
    fn finds_needle() {
        let hay = b"....._FVH..._FVH";
        assert_eq!(find_from(hay, b"_FVH", 0), Some(5));
        assert_eq!(find_from(hay, b"_FVH", 6), Some(12));
        assert_eq!(find_from(hay, b"_FVH", 13), None);
        assert_eq!(find_from(hay, b"_FVH", 100), None);
    }

    #[test]
    fn at_helpers_are_bounded() {
        let buf = [1u8, 0, 0, 0, 2, 0];
        assert_eq!(u32_at(&buf, 0), Some(1));
        assert_eq!(u16_at(&buf, 4), Some(2));
        assert_eq!(u32_at(&buf, 4), None);
        assert_eq!(u64_at(&buf, 0), None);
        assert_eq!(guid_at(&buf, 0), None);
        assert_eq!(u32_at(&buf, usize::MAX), None);
    }
}
