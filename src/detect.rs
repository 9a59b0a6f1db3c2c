//! Content-based format detection.
//!
//! A [`Detector`] is an ordered list of [`FormatEntry`] values, each pairing
//! a cheap signature check with the root parser for that format. Detection
//! returns the first entry whose probe accepts the buffer; file names and
//! extensions are never consulted.
//!
//! ## Standard priority
//!
//! | # | Format | Signature |
//! |---|--------|-----------|
//! | 1 | [`FormatTag::Capsule`] | known capsule GUID at 0 with a sane header size |
//! | 2 | [`FormatTag::FirmwareVolume`] | `_FVH` at 0x28, volume length covering the buffer |
//! | 3 | [`FormatTag::FlashDescriptor`] | `0x0FF0A55A` at 0x10 |
//! | 4 | [`FormatTag::PeImage`] | `MZ` + `PE\0\0`, or `VZ` |
//! | 5 | [`FormatTag::BiosRom`] | a volume header anywhere in the buffer |
//!
//! Full GUID matches come before magic numbers, and the catch-all search for
//! embedded volumes comes last. A capsule whose payload starts with a volume
//! is therefore a capsule. A buffer holding a volume followed by anything
//! else (more volumes, padding) is a ROM, so nothing past the first volume is
//! left out of the tree.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::formats::{Context, capsule, flash, pe, rom, volume};
use crate::object::FirmwareObject;
use crate::{Error, Result};

/// Buffers shorter than this match no format.
pub const MIN_HEADER_LEN: usize = 0x1C;

/// Closed set of recognised root formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FormatTag {
    #[serde(rename = "uefi_capsule")]
    Capsule,
    #[serde(rename = "uefi_volume")]
    FirmwareVolume,
    #[serde(rename = "flash_descriptor")]
    FlashDescriptor,
    #[serde(rename = "pe_image")]
    PeImage,
    #[serde(rename = "bios_rom")]
    BiosRom,
}

impl FormatTag {
    pub const ALL: [FormatTag; 5] = [
        Self::Capsule,
        Self::FirmwareVolume,
        Self::FlashDescriptor,
        Self::PeImage,
        Self::BiosRom,
    ];

    /// Stable name, as used in fixture files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Capsule => "uefi_capsule",
            Self::FirmwareVolume => "uefi_volume",
            Self::FlashDescriptor => "flash_descriptor",
            Self::PeImage => "pe_image",
            Self::BiosRom => "bios_rom",
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(Error::UnrecognizedFormat)
    }
}

/// Signature check over the leading bytes of a buffer.
pub type ProbeFn = fn(&[u8]) -> bool;
/// Root parser for a detected buffer.
pub type ParseFn = fn(Bytes, &Context<'_>) -> Result<FirmwareObject>;

/// One registered format.
#[derive(Clone, Copy)]
pub struct FormatEntry {
    pub tag: FormatTag,
    pub probe: ProbeFn,
    pub parse: ParseFn,
}

impl fmt::Debug for FormatEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatEntry").field("tag", &self.tag).finish_non_exhaustive()
    }
}

/// Ordered registry of format signatures.
#[derive(Debug, Clone)]
pub struct Detector {
    entries: Vec<FormatEntry>,
}

impl Detector {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// All built-in formats in the standard priority order (see module
    /// docs).
    pub fn standard() -> Self {
        Self::empty()
            .with(FormatEntry {
                tag: FormatTag::Capsule,
                probe: capsule::probe,
                parse: |data, ctx| capsule::parse(data, 0, ctx),
            })
            .with(FormatEntry {
                tag: FormatTag::FirmwareVolume,
                probe: volume::probe_image,
                parse: |data, ctx| volume::parse(data, 0, ctx),
            })
            .with(FormatEntry {
                tag: FormatTag::FlashDescriptor,
                probe: flash::probe,
                parse: |data, ctx| flash::parse(data, 0, ctx),
            })
            .with(FormatEntry {
                tag: FormatTag::PeImage,
                probe: pe::probe,
                parse: |data, ctx| pe::parse(data, 0, ctx),
            })
            .with(FormatEntry {
                tag: FormatTag::BiosRom,
                probe: rom::probe,
                parse: |data, ctx| rom::parse(data, 0, ctx),
            })
    }

    /// Append an entry at the lowest priority.
    pub fn push(&mut self, entry: FormatEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Builder-style [`Detector::push`].
    pub fn with(mut self, entry: FormatEntry) -> Self {
        self.push(entry);
        self
    }

    /// First format whose signature matches `buf`.
    pub fn detect(&self, buf: &[u8]) -> Option<FormatTag> {
        if buf.len() < MIN_HEADER_LEN {
            return None;
        }
        let tag = self.entries.iter().find(|e| (e.probe)(buf)).map(|e| e.tag);
        tracing::trace!(len = buf.len(), format = ?tag, "format detection");
        tag
    }

    /// Registered entry for `tag`.
    pub fn entry(&self, tag: FormatTag) -> Option<&FormatEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    pub fn entries(&self) -> &[FormatEntry] {
        &self.entries
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::standard()
    }
}

/// Detect with the standard registry.
pub fn detect(buf: &[u8]) -> Option<FormatTag> {
    Detector::standard().detect(buf)
}
