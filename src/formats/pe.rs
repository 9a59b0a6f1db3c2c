//! PE32/PE32+ and TE executable images.
//!
//! Only the headers needed to identify the image are decoded; the node is a
//! leaf.
//!
//! ## PE
//! ```text
//! [0x00]       "MZ"
//! [0x3C]       e_lfanew            (u32 LE)
//! [lfanew]     "PE\0\0"
//! [lfanew+4]   Machine             (u16 LE)
//! [lfanew+6]   NumberOfSections    (u16 LE)
//! [lfanew+20]  SizeOfOptionalHeader (u16 LE)
//! [lfanew+24]  OptionalHeader      - Subsystem at +0x44
//! ```
//!
//! ## TE (`EFI_TE_IMAGE_HEADER`, 0x28 bytes)
//! ```text
//! [0x00] "VZ"
//! [0x02] Machine             (u16 LE)
//! [0x04] NumberOfSections    (1 byte)
//! [0x05] Subsystem           (1 byte)
//! [0x06] StrippedSize        (u16 LE)
//! ```

use bytes::Bytes;

use super::Context;
use crate::object::{Details, FirmwareObject};
use crate::utils::{u16_at, u32_at};
use crate::{Error, Result};

pub const DOS_MAGIC: &[u8; 2] = b"MZ";
pub const PE_MAGIC: &[u8; 4] = b"PE\0\0";
pub const TE_MAGIC: &[u8; 2] = b"VZ";
pub const TE_HEADER_LEN: usize = 0x28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutableFormat {
    Pe = 0,
    Te = 1,
}

#[derive(Debug, Clone)]
pub struct ExecutableHeader {
    pub format: ExecutableFormat,
    pub machine: u16,
    pub section_count: u16,
    pub subsystem: u16,
    /// Bytes removed from the front of the original PE image (TE only).
    pub stripped_size: u16,
}

impl ExecutableHeader {
    pub fn read(buf: &[u8]) -> Result<Self> {
        if buf.starts_with(TE_MAGIC) {
            if buf.len() < TE_HEADER_LEN {
                return Err(Error::UnexpectedEof);
            }
            return Ok(Self {
                format: ExecutableFormat::Te,
                machine: u16_at(buf, 2).ok_or(Error::UnexpectedEof)?,
                section_count: buf[4] as u16,
                subsystem: buf[5] as u16,
                stripped_size: u16_at(buf, 6).ok_or(Error::UnexpectedEof)?,
            });
        }
        if !buf.starts_with(DOS_MAGIC) {
            return Err(Error::BadMagic);
        }

        let lfanew = u32_at(buf, 0x3C).ok_or(Error::UnexpectedEof)? as usize;
        let coff = lfanew.checked_add(4).ok_or(Error::InvalidRange)?;
        if buf.get(lfanew..coff) != Some(&PE_MAGIC[..]) {
            return Err(Error::BadMagic);
        }
        let machine = u16_at(buf, coff).ok_or(Error::UnexpectedEof)?;
        let section_count = u16_at(buf, coff + 2).ok_or(Error::UnexpectedEof)?;
        let optional_len = u16_at(buf, coff + 16).ok_or(Error::UnexpectedEof)?;
        let subsystem = if optional_len as usize >= 0x46 {
            u16_at(buf, coff + 20 + 0x44).ok_or(Error::UnexpectedEof)?
        } else {
            0
        };

        Ok(Self {
            format: ExecutableFormat::Pe,
            machine,
            section_count,
            subsystem,
            stripped_size: 0,
        })
    }
}

pub fn probe(buf: &[u8]) -> bool {
    ExecutableHeader::read(buf).is_ok()
}

/// Parse a PE or TE image covering all of `data`.
pub fn parse(data: Bytes, offset: usize, _ctx: &Context<'_>) -> Result<FirmwareObject> {
    let header = ExecutableHeader::read(&data)?;
    tracing::debug!(
        offset = format_args!("{:#x}", offset),
        format = ?header.format,
        machine = format_args!("{:#06x}", header.machine),
        "parsed executable"
    );
    Ok(FirmwareObject::new(Details::Executable(header), offset, data))
}
