//! FFS files (`EFI_FFS_FILE_HEADER` / `EFI_FFS_FILE_HEADER2`).
//!
//! ## Header (0x18 bytes, 0x20 for FFSv3 large files)
//! ```text
//! [0x00] Name                (16 bytes GUID)
//! [0x10] HeaderChecksum      (1 byte)  - 8-bit sum of the header is zero,
//!                                        with State and DataChecksum as 0
//! [0x11] DataChecksum        (1 byte)  - 0xAA unless attribute 0x40 is set
//! [0x12] Type                (1 byte)
//! [0x13] Attributes          (1 byte)
//! [0x14] Size                (u24 LE)  - header included
//! [0x17] State               (1 byte)  - bits inverted when erase polarity is 1
//! [0x18] ExtendedSize        (u64 LE)  - only with FFS_ATTRIB_LARGE_FILE
//! ```
//!
//! Files are laid out back to back from the start of the volume body, each
//! starting on an 8-byte boundary relative to the volume. Alignment gaps
//! and the trailing free space are captured as padding nodes.

use bytes::Bytes;
use uuid::Uuid;

use super::{Context, embedded_volumes, holds_volume, section};
use crate::cursor::ByteCursor;
use crate::object::{Details, FirmwareObject, ObjectKind, Validity};
use crate::utils::{align_up, guid, le_u24, le_u64, sum8, u8};

pub const HEADER_LEN: usize = 0x18;
pub const LARGE_HEADER_LEN: usize = 0x20;

pub const ATTR_LARGE_FILE: u8 = 0x01;
pub const ATTR_CHECKSUM: u8 = 0x40;

pub const STATE_HEADER_VALID: u8 = 0x02;
pub const STATE_DATA_VALID: u8 = 0x04;
pub const STATE_MARKED_FOR_UPDATE: u8 = 0x08;
pub const STATE_DELETED: u8 = 0x10;
pub const STATE_HEADER_INVALID: u8 = 0x20;

/// Fixed data checksum when the file is not checksummed (FFSv2/v3).
pub const FIXED_CHECKSUM: u8 = 0xAA;
/// Fixed data checksum for FFSv1 volumes.
pub const FIXED_CHECKSUM_V1: u8 = 0x5A;

/// FFS file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    All,
    Raw,
    Freeform,
    SecurityCore,
    PeiCore,
    DxeCore,
    Peim,
    Driver,
    CombinedPeimDriver,
    Application,
    Mm,
    FirmwareVolumeImage,
    CombinedMmDxe,
    MmCore,
    MmStandalone,
    MmCoreStandalone,
    Pad,
    /// OEM, debug and FFS-reserved types, and anything undefined.
    Unknown(u8),
}

impl From<u8> for FileType {
    fn from(v: u8) -> Self {
        match v {
            0x00 => Self::All,
            0x01 => Self::Raw,
            0x02 => Self::Freeform,
            0x03 => Self::SecurityCore,
            0x04 => Self::PeiCore,
            0x05 => Self::DxeCore,
            0x06 => Self::Peim,
            0x07 => Self::Driver,
            0x08 => Self::CombinedPeimDriver,
            0x09 => Self::Application,
            0x0A => Self::Mm,
            0x0B => Self::FirmwareVolumeImage,
            0x0C => Self::CombinedMmDxe,
            0x0D => Self::MmCore,
            0x0E => Self::MmStandalone,
            0x0F => Self::MmCoreStandalone,
            0xF0 => Self::Pad,
            x => Self::Unknown(x),
        }
    }
}

impl FileType {
    /// True if the file body is a stream of sections.
    pub fn has_sections(self) -> bool {
        !matches!(self, Self::All | Self::Raw | Self::Pad | Self::Unknown(_))
    }
}

/// Decoded file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub name: Uuid,
    pub header_checksum: u8,
    pub data_checksum: u8,
    pub file_type: FileType,
    pub attributes: u8,
    /// Declared size, header included.
    pub size: u64,
    /// State byte as stored (before polarity correction).
    pub state: u8,
    pub header_len: usize,
    /// Highest state bit set is DELETED or above.
    pub deleted: bool,
    /// Name from the file's USER_INTERFACE section.
    pub ui_name: Option<String>,
}

/// Volume properties that affect how files are decoded.
#[derive(Debug, Clone, Copy)]
pub struct FileSystem {
    pub version: u8,
    pub erase_polarity: bool,
}

impl FileSystem {
    fn erase_byte(self) -> u8 {
        if self.erase_polarity { 0xFF } else { 0x00 }
    }
}

/// Scan the body of a volume, `volume` being the whole volume and `start`
/// the offset of the first file. `base` is the volume's own offset.
pub fn scan(
    volume: &Bytes,
    start: usize,
    base: usize,
    fs: FileSystem,
    ctx: &Context<'_>,
) -> Vec<FirmwareObject> {
    let erase = fs.erase_byte();
    let end = volume.len();
    let mut children = Vec::new();
    let mut off = start;

    while off < end {
        let aligned = align_up(off, 8).min(end);
        if aligned > off {
            children.push(FirmwareObject::padding(base + off, volume.slice(off..aligned)));
            off = aligned;
            continue;
        }

        let remaining = end - off;
        let window = &volume[off..off + remaining.min(HEADER_LEN)];
        if remaining < HEADER_LEN || window.iter().all(|&b| b == erase) {
            tracing::trace!(
                offset = format_args!("{:#x}", base + off),
                bytes = remaining,
                "volume free space"
            );
            children.push(FirmwareObject::padding(base + off, volume.slice(off..end)));
            break;
        }

        let file = parse(volume.slice(off..), base + off, fs, ctx);
        off += file.size.max(1);
        children.push(file);
    }

    children
}

/// Parse one file at the start of `data`.
///
/// Never fails: the header is known to be at least [`HEADER_LEN`] bytes, and
/// every inconsistency becomes a flag. A file whose size field cannot be
/// trusted covers the rest of the volume so the scan stops there.
pub fn parse(data: Bytes, offset: usize, fs: FileSystem, ctx: &Context<'_>) -> FirmwareObject {
    let mut r = ByteCursor::new(data.clone());
    let header = match read_header(&mut r, fs) {
        Ok(h) => h,
        Err(_) => {
            let mut node = FirmwareObject::new(Details::RawBlob, offset, data);
            node.flag(Validity::Truncated);
            return node;
        }
    };

    let mut header = header;
    let header_len = header.header_len;
    let declared = header.size;
    let mut flags = Vec::new();

    let extent = if declared < header_len as u64 {
        flags.push(Validity::Malformed);
        data.len()
    } else if declared > data.len() as u64 {
        flags.push(Validity::Truncated);
        data.len()
    } else {
        declared as usize
    };

    let mut hdr = data[..header_len].to_vec();
    hdr[0x11] = 0;
    hdr[0x17] = 0;
    if sum8(&hdr) != 0 {
        flags.push(Validity::ChecksumMismatch);
    }

    let body = data.slice(header_len.min(extent)..extent);
    if header.attributes & ATTR_CHECKSUM != 0 {
        if sum8(&body).wrapping_add(header.data_checksum) != 0 {
            flags.push(Validity::ChecksumMismatch);
        }
    } else {
        let fixed = if fs.version == 1 { FIXED_CHECKSUM_V1 } else { FIXED_CHECKSUM };
        if header.data_checksum != fixed {
            flags.push(Validity::ChecksumMismatch);
        }
    }

    let state = if fs.erase_polarity { !header.state } else { header.state };
    let highest = if state == 0 { 0 } else { 0x80 >> state.leading_zeros() };
    let state_ok = (STATE_HEADER_VALID..STATE_DELETED).contains(&highest);
    header.deleted = highest >= STATE_DELETED;
    if header.deleted {
        flags.push(Validity::Deleted);
    } else if highest < STATE_HEADER_VALID {
        flags.push(Validity::Malformed);
    }
    let expand = state_ok && declared >= header_len as u64;

    tracing::debug!(
        offset = format_args!("{:#x}", offset),
        size = format_args!("{:#x}", declared),
        name = %header.name,
        file_type = ?header.file_type,
        "parsed FFS file"
    );

    let file_type = header.file_type;
    let mut node = FirmwareObject::new(Details::File(header), offset, data.slice(..extent));
    for flag in flags {
        node.flag(flag);
    }
    if !node.is_valid() {
        tracing::warn!(
            offset = format_args!("{:#x}", offset),
            validity = ?node.validity,
            "FFS file flagged"
        );
    }

    if !expand {
        return node;
    }

    let body_offset = offset + header_len;
    if file_type.has_sections() {
        node.children = section::scan(&body, body_offset, ctx);
        let ui = ui_name(&node.children);
        if let Details::File(h) = &mut node.details {
            h.ui_name = ui;
        }
    } else if file_type == FileType::Raw
        && holds_volume(&body, ctx)
    {
        match ctx.nested() {
            Some(inner) => match embedded_volumes(body, body_offset, &inner) {
                Ok(children) => node.children = children,
                Err(e) => tracing::warn!(error = %e, "nested volume in raw file unreadable"),
            },
            None => node.flag(Validity::RecursionLimitExceeded),
        }
    }

    node
}

fn read_header(r: &mut ByteCursor, fs: FileSystem) -> crate::Result<FileHeader> {
    let name = guid(r)?;
    let header_checksum = u8(r)?;
    let data_checksum = u8(r)?;
    let file_type = FileType::from(u8(r)?);
    let attributes = u8(r)?;
    let size24 = le_u24(r)?;
    let state = u8(r)?;

    let (size, header_len) = if fs.version == 3 && attributes & ATTR_LARGE_FILE != 0 {
        (le_u64(r)?, LARGE_HEADER_LEN)
    } else {
        (size24 as u64, HEADER_LEN)
    };

    Ok(FileHeader {
        name,
        header_checksum,
        data_checksum,
        file_type,
        attributes,
        size,
        state,
        header_len,
        deleted: false,
        ui_name: None,
    })
}

/// First USER_INTERFACE name among `sections`, looking inside encapsulations
/// but not inside nested volumes.
fn ui_name(sections: &[FirmwareObject]) -> Option<String> {
    sections.iter().find_map(|s| match s.kind() {
        ObjectKind::Section => s
            .name()
            .map(str::to_owned)
            .or_else(|| ui_name(&s.children)),
        _ => None,
    })
}
