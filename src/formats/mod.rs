//! Structural parsers for firmware image formats.
//!
//! Each submodule targets one container. All parsers follow the same
//! conventions:
//!
//! * **Zero-copy** - input is a [`bytes::Bytes`] view and every node keeps a
//!   sub-view of it. Only decoded encapsulation payloads allocate.
//! * **Best effort** - a root parser returns an error only when its own
//!   header cannot be decoded. Problems further down are recorded on the node
//!   as a [`crate::object::Validity`] and parsing carries on with siblings.
//! * **Offsets** - `offset` arguments locate the parsed data within its
//!   owning buffer; every node reports offsets in that frame.
//! * **Bounded nesting** - recursion into encapsulations and nested volumes
//!   goes through [`Context::nested`], which stops at
//!   [`crate::ParserConfig::max_depth`].
//!
//! ## Format overview
//!
//! | Module      | Format | Description |
//! |-------------|--------|-------------|
//! | [`capsule`] | UEFI capsule | Update wrapper (EFI, FMP, Aptio, Toshiba…) holding volumes |
//! | [`volume`]  | Firmware volume | `_FVH` volume with block map, holds FFS files |
//! | [`file`]    | FFS file | GUID-named file holding sections |
//! | [`section`] | FFS section | Leaf or encapsulation (compressed, GUID-defined) section |
//! | [`flash`]   | Flash descriptor | Intel SPI image split into regions |
//! | [`pe`]      | PE / TE | Executable image, headers only |
//! | [`rom`]     | BIOS ROM | Any buffer holding volumes at arbitrary offsets |

pub mod capsule;
pub mod file;
pub mod flash;
pub mod pe;
pub mod rom;
pub mod section;
pub mod volume;

use bytes::Bytes;

use crate::ParserConfig;
use crate::compression::Codecs;
use crate::Result;
use crate::detect::{Detector, FormatTag};
use crate::object::{Details, FirmwareObject};
use crate::utils::{find_from, uniform_fill};

/// Parse-wide settings plus the current nesting depth.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    config: &'a ParserConfig,
    depth: usize,
}

impl<'a> Context<'a> {
    /// Context for a root object (depth 0).
    pub fn new(config: &'a ParserConfig) -> Self {
        Self { config, depth: 0 }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Context one level down, or [`None`] once the configured maximum
    /// nesting depth would be exceeded.
    pub fn nested(&self) -> Option<Context<'a>> {
        let depth = self.depth + 1;
        (depth <= self.config.max_depth).then_some(Self {
            config: self.config,
            depth,
        })
    }

    pub fn config(&self) -> &'a ParserConfig {
        self.config
    }

    pub fn codecs(&self) -> &'a Codecs {
        &self.config.codecs
    }

    pub fn detector(&self) -> &'a Detector {
        &self.config.detector
    }
}

/// Offset of the first plausible volume header in `buf`, if any.
pub fn find_volume(buf: &[u8], from: usize) -> Option<usize> {
    let mut search = from.checked_add(volume::SIGNATURE_OFFSET)?;
    while let Some(sig) = find_from(buf, volume::SIGNATURE, search) {
        let start = sig - volume::SIGNATURE_OFFSET;
        if volume::probe(&buf[start..]) {
            return Some(start);
        }
        search = sig + 1;
    }
    None
}

/// Search `data` for firmware volumes, wherever they start.
///
/// Volumes become children in offset order. Gaps between them are kept:
/// uniformly erased gaps as padding, anything else as a raw blob. `base` is
/// the offset of `data` within its owning buffer.
pub fn scan_volumes(data: &Bytes, base: usize, ctx: &Context<'_>) -> Vec<FirmwareObject> {
    let mut children = Vec::new();
    let mut pos = 0;
    let mut from = 0;

    while let Some(start) = find_volume(data, from) {
        match volume::parse(data.slice(start..), base + start, ctx) {
            Ok(v) => {
                if start > pos {
                    children.push(gap(data.slice(pos..start), base + pos));
                }
                pos = start + v.size.max(1);
                from = pos;
                children.push(v);
            }
            Err(e) => {
                tracing::debug!(
                    offset = format_args!("{:#x}", base + start),
                    error = %e,
                    "volume signature without a usable header"
                );
                from = start + 1;
            }
        }
    }
    if pos < data.len() {
        children.push(gap(data.slice(pos..), base + pos));
    }

    children
}

/// True if `payload` starts with a volume, whether or not more data follows
/// it.
pub fn holds_volume(payload: &[u8], ctx: &Context<'_>) -> bool {
    match ctx.detector().detect(payload) {
        Some(FormatTag::FirmwareVolume) => true,
        Some(FormatTag::BiosRom) => volume::probe(payload),
        _ => false,
    }
}

/// Children of a payload starting with a volume: that volume, then the
/// volumes and gaps after it.
pub fn embedded_volumes(
    payload: Bytes,
    base: usize,
    ctx: &Context<'_>,
) -> Result<Vec<FirmwareObject>> {
    let first = volume::parse(payload.clone(), base, ctx)?;
    let end = first.size.max(1).min(payload.len());
    let mut children = vec![first];
    if end < payload.len() {
        children.extend(scan_volumes(&payload.slice(end..), base + end, ctx));
    }
    Ok(children)
}

fn gap(data: Bytes, offset: usize) -> FirmwareObject {
    if uniform_fill(&data).is_some() {
        tracing::trace!(offset = format_args!("{:#x}", offset), bytes = data.len(), "padding");
        FirmwareObject::padding(offset, data)
    } else {
        FirmwareObject::new(Details::RawBlob, offset, data)
    }
}
