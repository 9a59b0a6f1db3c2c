//! Firmware volumes (`EFI_FIRMWARE_VOLUME_HEADER`).
//!
//! ## Layout
//! ```text
//! [0x00] ZeroVector          (16 bytes)
//! [0x10] FileSystemGuid      (16 bytes)
//! [0x20] FvLength            (u64 LE) - whole volume, header included
//! [0x28] Signature "_FVH"    (4 bytes)
//! [0x2C] Attributes          (u32 LE) - bit 11 is the erase polarity
//! [0x30] HeaderLength        (u16 LE)
//! [0x32] Checksum            (u16 LE) - 16-bit sum over the header is zero
//! [0x34] ExtHeaderOffset     (u16 LE) - 0 if absent
//! [0x36] Reserved            (1 byte)
//! [0x37] Revision            (1 byte)
//! [0x38] BlockMap            (NumBlocks u32, Length u32)… terminated by (0, 0)
//! ```
//!
//! ## Extended header (at ExtHeaderOffset)
//! ```text
//! [0x00] FvName              (16 bytes)
//! [0x10] ExtHeaderSize       (u32 LE)
//! ```
//!
//! Files start after the header (or the extended header), 8-byte aligned
//! relative to the volume start. See [`super::file`] for the body scan.

use bytes::Bytes;
use uuid::Uuid;

use super::{Context, file};
use crate::cursor::ByteCursor;
use crate::guids;
use crate::object::{Details, FirmwareObject, Validity};
use crate::utils::{
    align_up, bytesa, guid, guid_at, le_u16, le_u32, le_u64, magic, sum16, u8, u16_at, u32_at,
    u64_at,
};
use crate::{Error, Result};

/// Size of the fixed header, up to the block map.
pub const HEADER_LEN: usize = 0x38;
/// Offset of the `_FVH` signature.
pub const SIGNATURE_OFFSET: usize = 0x28;
pub const SIGNATURE: &[u8; 4] = b"_FVH";
/// `EFI_FVB2_ERASE_POLARITY`.
pub const ATTR_ERASE_POLARITY: u32 = 0x0000_0800;

/// One entry of the block map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMapEntry {
    pub num_blocks: u32,
    pub length: u32,
}

/// Decoded volume header.
#[derive(Debug, Clone)]
pub struct VolumeHeader {
    pub fs_guid: Uuid,
    pub fv_length: u64,
    pub attributes: u32,
    pub header_length: u16,
    pub checksum: u16,
    pub ext_header_offset: u16,
    pub revision: u8,
    pub block_map: Vec<BlockMapEntry>,
    /// Volume name from the extended header.
    pub fv_name: Option<Uuid>,
    /// Offset of the first file, relative to the volume start.
    pub files_offset: usize,
}

impl VolumeHeader {
    /// Erased flash reads as `0xFF` when set, `0x00` otherwise.
    pub fn erase_polarity(&self) -> bool {
        self.attributes & ATTR_ERASE_POLARITY != 0
    }

    pub fn erase_byte(&self) -> u8 {
        if self.erase_polarity() { 0xFF } else { 0x00 }
    }

    /// FFS revision for the file system GUID, if it is an FFS volume.
    pub fn ffs_version(&self) -> Option<u8> {
        match self.fs_guid {
            guids::FFS1 => Some(1),
            guids::FFS2 => Some(2),
            guids::FFS3 => Some(3),
            _ => None,
        }
    }

    /// Total size described by the block map.
    pub fn block_map_len(&self) -> u64 {
        self.block_map
            .iter()
            .map(|b| b.num_blocks as u64 * b.length as u64)
            .fold(0u64, u64::saturating_add)
    }

    /// Decode the header at the start of `r`.
    pub fn read(r: &mut ByteCursor) -> Result<Self> {
        let _zero_vector = bytesa::<16>(r)?;
        let fs_guid = guid(r)?;
        let fv_length = le_u64(r)?;
        magic(r, SIGNATURE)?;
        let attributes = le_u32(r)?;
        let header_length = le_u16(r)?;
        let checksum = le_u16(r)?;
        let ext_header_offset = le_u16(r)?;
        let _reserved = u8(r)?;
        let revision = u8(r)?;

        if (header_length as usize) < HEADER_LEN + 8 || header_length as u64 > fv_length {
            return Err(Error::MalformedHeader("volume header length"));
        }

        let mut block_map = Vec::new();
        loop {
            let num_blocks = le_u32(r)?;
            let length = le_u32(r)?;
            if num_blocks == 0 && length == 0 {
                break;
            }
            block_map.push(BlockMapEntry { num_blocks, length });
            if r.position() + 8 > header_length as usize {
                return Err(Error::MalformedHeader("unterminated block map"));
            }
        }

        let data = r.data();
        let mut fv_name = None;
        let mut files_offset = header_length as usize;
        if ext_header_offset != 0 {
            let ext = ext_header_offset as usize;
            if let (Some(name), Some(size)) = (guid_at(data, ext), u32_at(data, ext + 16)) {
                fv_name = Some(name);
                files_offset = ext.saturating_add(size as usize);
            }
        }

        Ok(Self {
            fs_guid,
            fv_length,
            attributes,
            header_length,
            checksum,
            ext_header_offset,
            revision,
            block_map,
            fv_name,
            files_offset: align_up(files_offset, 8),
        })
    }
}

/// Cheap signature check used by the format detector and volume search.
///
/// Accepts a buffer whose declared length exceeds the buffer; the parser
/// flags that as truncation.
pub fn probe(buf: &[u8]) -> bool {
    if buf.get(SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4) != Some(&SIGNATURE[..]) {
        return false;
    }
    let (Some(fv_length), Some(header_length)) = (u64_at(buf, 0x20), u16_at(buf, 0x30)) else {
        return false;
    };
    header_length as usize >= HEADER_LEN + 8
        && header_length % 2 == 0
        && header_length as u64 <= fv_length
}

/// [`probe`], and the volume's length covers the whole of `buf`. A buffer
/// with more data past the end of its first volume is a ROM image.
pub fn probe_image(buf: &[u8]) -> bool {
    probe(buf) && u64_at(buf, 0x20).is_some_and(|len| len >= buf.len() as u64)
}

/// Parse a volume at the start of `data`, located at `offset` within its
/// owning buffer.
///
/// Returns an error only if the header itself cannot be decoded. Everything
/// else - checksum, truncation, block map mismatch, unknown file system -
/// is recorded on the returned node.
pub fn parse(data: Bytes, offset: usize, ctx: &Context<'_>) -> Result<FirmwareObject> {
    let mut r = ByteCursor::new(data);
    let header = VolumeHeader::read(&mut r)?;

    let header_bytes = r.view(0, header.header_length as usize)?;
    let checksum_ok = sum16(&header_bytes) == 0;

    let fv_len = usize::try_from(header.fv_length).unwrap_or(usize::MAX);
    let (body, truncated) = r.view_clamped(0, fv_len);

    tracing::debug!(
        offset = format_args!("{:#x}", offset),
        length = format_args!("{:#x}", header.fv_length),
        fs = %header.fs_guid,
        "parsing firmware volume"
    );

    let files_offset = header.files_offset.min(body.len());
    let ffs_version = header.ffs_version();
    let block_map_len = header.block_map_len();
    let erase_polarity = header.erase_polarity();
    let fv_length = header.fv_length;

    let mut node = FirmwareObject::new(Details::Volume(header), offset, body.clone());
    if !checksum_ok {
        tracing::warn!(offset = format_args!("{:#x}", offset), "volume header checksum mismatch");
        node.flag(Validity::ChecksumMismatch);
    }
    if block_map_len != fv_length {
        tracing::warn!(
            offset = format_args!("{:#x}", offset),
            block_map = format_args!("{:#x}", block_map_len),
            "block map does not match volume length"
        );
        node.flag(Validity::Malformed);
    }
    if truncated {
        tracing::warn!(
            offset = format_args!("{:#x}", offset),
            available = format_args!("{:#x}", body.len()),
            "volume truncated"
        );
        node.flag(Validity::Truncated);
    }

    match ffs_version {
        Some(version) => {
            let fs = file::FileSystem {
                version,
                erase_polarity,
            };
            node.children = file::scan(&body, files_offset, offset, fs, ctx);
        }
        None => node.flag(Validity::UnsupportedSubformat),
    }

    Ok(node)
}
