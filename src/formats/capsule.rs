//! Update capsules.
//!
//! ## `EFI_CAPSULE_HEADER`
//! ```text
//! [0x00] CapsuleGuid         (16 bytes)
//! [0x10] HeaderSize          (u32 LE)
//! [0x14] Flags               (u32 LE)
//! [0x18] CapsuleImageSize    (u32 LE) - header included
//! ```
//!
//! Toshiba capsules swap the last two fields (`FullSize`, then `Flags`). AMI
//! Aptio capsules append `RomImageOffset (u16)` and `RomLayoutOffset (u16)`
//! at 0x1C; the image starts at `RomImageOffset` when it is set.
//!
//! The capsule body is searched for firmware volumes (see
//! [`super::scan_volumes`]).

use bytes::Bytes;
use uuid::Uuid;

use super::{Context, scan_volumes};
use crate::cursor::ByteCursor;
use crate::guids;
use crate::object::{Details, FirmwareObject, Validity};
use crate::utils::{guid, le_u32, u16_at};
use crate::{Error, Result};

pub const HEADER_LEN: usize = 0x1C;
/// Fixed part of an AMI Aptio capsule header.
pub const APTIO_HEADER_LEN: usize = 0x20;

/// Capsule flavour, chosen by the capsule GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapsuleVariant {
    Efi,
    Fmp,
    Intel,
    Lenovo,
    Toshiba,
    Aptio { signed: bool },
}

impl CapsuleVariant {
    pub fn from_guid(guid: &Uuid) -> Option<Self> {
        Some(match *guid {
            guids::EFI_CAPSULE => Self::Efi,
            guids::FMP_CAPSULE => Self::Fmp,
            guids::INTEL_CAPSULE => Self::Intel,
            guids::LENOVO_CAPSULE | guids::LENOVO2_CAPSULE => Self::Lenovo,
            guids::TOSHIBA_CAPSULE => Self::Toshiba,
            guids::APTIO_SIGNED_CAPSULE => Self::Aptio { signed: true },
            guids::APTIO_UNSIGNED_CAPSULE => Self::Aptio { signed: false },
            _ => return None,
        })
    }
}

/// Decoded capsule header.
#[derive(Debug, Clone)]
pub struct CapsuleHeader {
    pub guid: Uuid,
    pub header_size: u32,
    pub flags: u32,
    pub image_size: u32,
    pub variant: CapsuleVariant,
    /// Offset of the payload, relative to the capsule start.
    pub body_offset: usize,
}

impl CapsuleHeader {
    pub fn read(r: &mut ByteCursor) -> Result<Self> {
        let guid = guid(r)?;
        let variant = CapsuleVariant::from_guid(&guid).ok_or(Error::BadMagic)?;
        let header_size = le_u32(r)?;
        let (flags, image_size) = match variant {
            CapsuleVariant::Toshiba => {
                let full_size = le_u32(r)?;
                (le_u32(r)?, full_size)
            }
            _ => {
                let flags = le_u32(r)?;
                (flags, le_u32(r)?)
            }
        };

        if (header_size as usize) < HEADER_LEN || header_size > image_size {
            return Err(Error::MalformedHeader("capsule header size"));
        }

        let mut body_offset = header_size as usize;
        if let CapsuleVariant::Aptio { .. } = variant {
            let rom_image_offset = u16_at(r.data(), HEADER_LEN).unwrap_or(0) as usize;
            if rom_image_offset >= APTIO_HEADER_LEN && rom_image_offset <= image_size as usize {
                body_offset = rom_image_offset;
            }
        }

        Ok(Self {
            guid,
            header_size,
            flags,
            image_size,
            variant,
            body_offset,
        })
    }
}

/// Signature check used by the format detector: a known capsule GUID and a
/// sane header size.
pub fn probe(buf: &[u8]) -> bool {
    let mut r = ByteCursor::new(Bytes::copy_from_slice(&buf[..buf.len().min(APTIO_HEADER_LEN)]));
    CapsuleHeader::read(&mut r).is_ok()
}

/// Parse a capsule at the start of `data`.
pub fn parse(data: Bytes, offset: usize, ctx: &Context<'_>) -> Result<FirmwareObject> {
    let mut r = ByteCursor::new(data);
    let header = CapsuleHeader::read(&mut r)?;
    let (image, truncated) = r.view_clamped(0, header.image_size as usize);

    tracing::debug!(
        offset = format_args!("{:#x}", offset),
        size = format_args!("{:#x}", header.image_size),
        variant = ?header.variant,
        "parsing capsule"
    );

    let body_offset = header.body_offset.min(image.len());
    let body = image.slice(body_offset..);
    let mut node = FirmwareObject::new(Details::Capsule(header), offset, image);
    if truncated {
        tracing::warn!(offset = format_args!("{:#x}", offset), "capsule truncated");
        node.flag(Validity::Truncated);
    }
    node.children = scan_volumes(&body, offset + body_offset, ctx);
    Ok(node)
}
