//! FFS sections (`EFI_COMMON_SECTION_HEADER` and friends).
//!
//! ## Common header (4 bytes, 8 with an extended size)
//! ```text
//! [0x00] Size                (u24 LE) - header included; 0xFFFFFF means
//!                                       the real size follows
//! [0x03] Type                (1 byte)
//! [0x04] ExtendedSize        (u32 LE) - only when Size is 0xFFFFFF
//! ```
//!
//! ## Encapsulation headers (after the common header)
//! ```text
//! COMPRESSION   [+0x00] UncompressedLength (u32 LE)
//!               [+0x04] CompressionType    (1 byte)
//! GUID_DEFINED  [+0x00] SectionDefinitionGuid (16 bytes)
//!               [+0x10] DataOffset         (u16 LE) - from section start
//!               [+0x12] Attributes         (u16 LE)
//! ```
//!
//! Sections inside a file or an encapsulation payload are packed back to
//! back, each starting on a 4-byte boundary relative to the stream start.
//! Encapsulation payloads are decoded through [`crate::compression::Codecs`]
//! and re-scanned as a section stream; FV image and RAW sections holding a
//! firmware volume re-enter the volume parser.

use bytes::Bytes;
use uuid::Uuid;

use super::{Context, embedded_volumes, holds_volume};
use crate::compression::{CodecError, CodecId, CodecInput};
use crate::cursor::ByteCursor;
use crate::object::{Details, FirmwareObject, Validity};
use crate::utils::{
    align_up, guid_at, le_u24, le_u32, u8, u16_at, u32_at, ucs2_string, uniform_fill,
};

pub const HEADER_LEN: usize = 4;
pub const EXTENDED_HEADER_LEN: usize = 8;
/// Size value announcing an extended header.
pub const EXTENDED_SIZE_MARKER: u32 = 0x00FF_FFFF;

/// `EFI_GUIDED_SECTION_PROCESSING_REQUIRED`.
pub const GUIDED_PROCESSING_REQUIRED: u16 = 0x01;
/// `EFI_GUIDED_SECTION_AUTH_STATUS_VALID`.
pub const GUIDED_AUTH_STATUS_VALID: u16 = 0x02;

/// Section type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Compression,
    GuidDefined,
    Disposable,
    Pe32,
    Pic,
    Te,
    DxeDepex,
    Version,
    UserInterface,
    Compatibility16,
    FirmwareVolumeImage,
    FreeformSubtypeGuid,
    Raw,
    PeiDepex,
    MmDepex,
    Unknown(u8),
}

impl From<u8> for SectionType {
    fn from(v: u8) -> Self {
        match v {
            0x01 => Self::Compression,
            0x02 => Self::GuidDefined,
            0x03 => Self::Disposable,
            0x10 => Self::Pe32,
            0x11 => Self::Pic,
            0x12 => Self::Te,
            0x13 => Self::DxeDepex,
            0x14 => Self::Version,
            0x15 => Self::UserInterface,
            0x16 => Self::Compatibility16,
            0x17 => Self::FirmwareVolumeImage,
            0x18 => Self::FreeformSubtypeGuid,
            0x19 => Self::Raw,
            0x1B => Self::PeiDepex,
            0x1C => Self::MmDepex,
            x => Self::Unknown(x),
        }
    }
}

impl SectionType {
    pub fn code(self) -> u8 {
        match self {
            Self::Compression => 0x01,
            Self::GuidDefined => 0x02,
            Self::Disposable => 0x03,
            Self::Pe32 => 0x10,
            Self::Pic => 0x11,
            Self::Te => 0x12,
            Self::DxeDepex => 0x13,
            Self::Version => 0x14,
            Self::UserInterface => 0x15,
            Self::Compatibility16 => 0x16,
            Self::FirmwareVolumeImage => 0x17,
            Self::FreeformSubtypeGuid => 0x18,
            Self::Raw => 0x19,
            Self::PeiDepex => 0x1B,
            Self::MmDepex => 0x1C,
            Self::Unknown(x) => x,
        }
    }

    /// True for sections whose payload is itself a section stream.
    pub fn is_encapsulation(self) -> bool {
        matches!(self, Self::Compression | Self::GuidDefined | Self::Disposable)
    }
}

/// Type-specific part of a section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionBody {
    Compression {
        uncompressed_length: u32,
        compression_type: u8,
    },
    GuidDefined {
        guid: Uuid,
        data_offset: u16,
        attributes: u16,
    },
    UserInterface {
        name: String,
    },
    Version {
        build_number: u16,
        version: String,
    },
    FreeformSubtype {
        guid: Uuid,
    },
    /// Opaque payload.
    Leaf,
}

/// Decoded section header.
#[derive(Debug, Clone)]
pub struct SectionHeader {
    pub section_type: SectionType,
    /// Declared size, header included.
    pub size: u64,
    /// Common header length (4 or 8).
    pub header_len: usize,
    pub body: SectionBody,
}

/// Scan a section stream. `base` is the stream's offset within its owning
/// buffer.
pub fn scan(stream: &Bytes, base: usize, ctx: &Context<'_>) -> Vec<FirmwareObject> {
    let end = stream.len();
    let mut children = Vec::new();
    let mut off = 0;

    while off < end {
        let aligned = align_up(off, 4).min(end);
        if aligned > off {
            children.push(FirmwareObject::padding(base + off, stream.slice(off..aligned)));
            off = aligned;
            continue;
        }

        let rest = &stream[off..];
        if rest.len() < HEADER_LEN || uniform_fill(rest) == Some(0xFF) {
            children.push(FirmwareObject::padding(base + off, stream.slice(off..)));
            break;
        }

        let section = parse(stream.slice(off..), base + off, ctx);
        off += section.size.max(1);
        children.push(section);
    }

    children
}

/// Parse one section at the start of `data`.
///
/// Never fails; a section whose size cannot be trusted covers the rest of
/// the stream.
pub fn parse(data: Bytes, offset: usize, ctx: &Context<'_>) -> FirmwareObject {
    let mut r = ByteCursor::new(data.clone());
    let (size, section_type, header_len) = match read_common(&mut r) {
        Ok(h) => h,
        Err(_) => {
            let mut node = FirmwareObject::new(Details::RawBlob, offset, data);
            node.flag(Validity::Truncated);
            return node;
        }
    };

    let mut flags = Vec::new();
    let extent = if size < header_len as u64 {
        flags.push(Validity::Malformed);
        data.len()
    } else if size > data.len() as u64 {
        flags.push(Validity::Truncated);
        data.len()
    } else {
        size as usize
    };
    let section = data.slice(..extent);

    let body = match decode_body(section_type, &section, header_len) {
        Some(body) => body,
        None => {
            flags.push(Validity::Malformed);
            SectionBody::Leaf
        }
    };

    tracing::debug!(
        offset = format_args!("{:#x}", offset),
        size = format_args!("{:#x}", size),
        section_type = ?section_type,
        "parsed section"
    );

    let header = SectionHeader {
        section_type,
        size,
        header_len,
        body,
    };
    let mut node = FirmwareObject::new(Details::Section(header), offset, section);
    for flag in flags {
        node.flag(flag);
    }
    if node.validity == Validity::Malformed {
        tracing::warn!(offset = format_args!("{:#x}", offset), "malformed section");
        return node;
    }

    expand(&mut node, ctx);
    node
}

fn read_common(r: &mut ByteCursor) -> crate::Result<(u64, SectionType, usize)> {
    let size24 = le_u24(r)?;
    let section_type = SectionType::from(u8(r)?);
    if size24 == EXTENDED_SIZE_MARKER {
        Ok((le_u32(r)? as u64, section_type, EXTENDED_HEADER_LEN))
    } else {
        Ok((size24 as u64, section_type, HEADER_LEN))
    }
}

/// Decode the type-specific header. [`None`] if it does not fit.
fn decode_body(
    section_type: SectionType,
    section: &[u8],
    header_len: usize,
) -> Option<SectionBody> {
    let h = header_len;
    let body = match section_type {
        SectionType::Compression => SectionBody::Compression {
            uncompressed_length: u32_at(section, h)?,
            compression_type: *section.get(h + 4)?,
        },
        SectionType::GuidDefined => {
            let guid = guid_at(section, h)?;
            let data_offset = u16_at(section, h + 16)?;
            let attributes = u16_at(section, h + 18)?;
            if (data_offset as usize) < h + 20 || data_offset as usize > section.len() {
                return None;
            }
            SectionBody::GuidDefined {
                guid,
                data_offset,
                attributes,
            }
        }
        SectionType::UserInterface => SectionBody::UserInterface {
            name: ucs2_string(section.get(h..)?),
        },
        SectionType::Version => SectionBody::Version {
            build_number: u16_at(section, h)?,
            version: ucs2_string(section.get(h + 2..)?),
        },
        SectionType::FreeformSubtypeGuid => SectionBody::FreeformSubtype {
            guid: guid_at(section, h)?,
        },
        _ => SectionBody::Leaf,
    };
    Some(body)
}

/// Parse the children of an encapsulation, FV image or RAW section.
fn expand(node: &mut FirmwareObject, ctx: &Context<'_>) {
    let Details::Section(header) = &node.details else {
        return;
    };
    let section_type = header.section_type;
    let header_len = header.header_len;
    let body = header.body.clone();
    let data = node.data().clone();
    let offset = node.offset;

    match body {
        SectionBody::Compression {
            uncompressed_length,
            compression_type,
        } => {
            let payload = data.slice((header_len + 5).min(data.len())..);
            let input = CodecInput {
                preamble: &[],
                payload,
                expected_len: Some(uncompressed_length as usize),
                max_len: ctx.config().max_decoded_len,
            };
            decode_into(node, CodecId::Type(compression_type), &input, ctx);
            if let Some(decoded) = node.decoded() {
                if decoded.len() != uncompressed_length as usize {
                    tracing::warn!(
                        offset = format_args!("{:#x}", offset),
                        expected = uncompressed_length,
                        actual = decoded.len(),
                        "decompressed length mismatch"
                    );
                    node.flag(Validity::Malformed);
                }
            }
        }
        SectionBody::GuidDefined {
            guid,
            data_offset,
            attributes,
        } => {
            let id = CodecId::Guid(guid);
            let start = header_len + 20;
            let data_offset = data_offset as usize;
            if !ctx.codecs().contains(id) && attributes & GUIDED_PROCESSING_REQUIRED == 0 {
                // Not encoded: the payload is a plain section stream.
                scan_direct(node, data.slice(data_offset..), offset + data_offset, ctx);
                return;
            }
            let input = CodecInput {
                preamble: &data[start..data_offset],
                payload: data.slice(data_offset..),
                expected_len: None,
                max_len: ctx.config().max_decoded_len,
            };
            decode_into(node, id, &input, ctx);
        }
        SectionBody::Leaf if section_type == SectionType::Disposable => {
            let payload = data.slice(header_len..);
            scan_direct(node, payload, offset + header_len, ctx);
        }
        SectionBody::Leaf
            if matches!(
                section_type,
                SectionType::FirmwareVolumeImage | SectionType::Raw
            ) =>
        {
            let payload = data.slice(header_len..);
            if !holds_volume(&payload, ctx) {
                if section_type == SectionType::FirmwareVolumeImage {
                    node.flag(Validity::UnsupportedSubformat);
                }
                return;
            }
            let Some(inner) = ctx.nested() else {
                node.flag(Validity::RecursionLimitExceeded);
                return;
            };
            match embedded_volumes(payload, offset + header_len, &inner) {
                Ok(children) => node.children = children,
                Err(e) => {
                    tracing::warn!(error = %e, "nested volume unreadable");
                    node.flag(Validity::Malformed);
                }
            }
        }
        _ => {}
    }
}

/// Re-scan a payload that needs no decoding.
fn scan_direct(node: &mut FirmwareObject, payload: Bytes, base: usize, ctx: &Context<'_>) {
    match ctx.nested() {
        Some(inner) => node.children = scan(&payload, base, &inner),
        None => node.flag(Validity::RecursionLimitExceeded),
    }
}

/// Decode an encapsulated payload and scan the result. Children are
/// relative to the decoded buffer, which the node keeps.
fn decode_into(node: &mut FirmwareObject, id: CodecId, input: &CodecInput<'_>, ctx: &Context<'_>) {
    let Some(inner) = ctx.nested() else {
        tracing::warn!(
            offset = format_args!("{:#x}", node.offset),
            depth = ctx.depth(),
            "nesting limit reached"
        );
        node.flag(Validity::RecursionLimitExceeded);
        return;
    };
    match ctx.codecs().decode(id, input) {
        Ok(decoded) => {
            if !decoded.checksum_valid {
                node.flag(Validity::ChecksumMismatch);
            }
            node.children = scan(&decoded.data, 0, &inner);
            node.set_decoded(decoded.data);
        }
        Err(CodecError::Unsupported(id)) => {
            tracing::warn!(
                offset = format_args!("{:#x}", node.offset),
                codec = %id,
                "no codec registered"
            );
            node.flag(Validity::UnsupportedSubformat);
        }
        Err(e) => {
            tracing::warn!(
                offset = format_args!("{:#x}", node.offset),
                codec = %id,
                error = %e,
                "payload could not be decoded"
            );
            node.flag(Validity::Malformed);
        }
    }
}
