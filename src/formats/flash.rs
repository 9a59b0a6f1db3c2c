//! Intel flash descriptor images (full SPI flash dumps).
//!
//! ## Descriptor
//! ```text
//! [0x00] Reserved / ReservedVector (16 bytes)
//! [0x10] Signature           (u32 LE) = 0x0FF0A55A
//! [0x14] FLMAP0              (u32 LE) - bits 0..8  FCBA >> 4
//!                                       bits 16..24 FRBA >> 4
//!                                       bits 24..27 number of regions
//! [0x18] FLMAP1              (u32 LE)
//! [0x1C] FLMAP2              (u32 LE)
//! ```
//! The earliest descriptors have no reserved vector: the signature sits at
//! 0x00 and the maps follow it. Base addresses are always relative to the
//! start of flash.
//!
//! ## Region section (at FRBA)
//! ```text
//! FLREG[n]                   (u32 LE) - bits 0..15  base  >> 12
//!                                       bits 16..31 limit >> 12
//! ```
//! A region is unused when its base lies past its limit or its entry reads
//! as erased flash. Regions are listed in their fixed index order; the tree
//! lists them by base address with the gaps between them captured as
//! padding. The BIOS region is searched for firmware volumes.

use bytes::Bytes;

use super::{Context, scan_volumes};
use crate::object::{Details, FirmwareObject, Validity};
use crate::utils::u32_at;
use crate::{Error, Result};

pub const SIGNATURE_OFFSET: usize = 0x10;
pub const LEGACY_SIGNATURE_OFFSET: usize = 0x00;
pub const SIGNATURE: u32 = 0x0FF0_A55A;
/// Size of the descriptor region in every known layout.
pub const DESCRIPTOR_LEN: usize = 0x1000;
pub const MAX_REGIONS: usize = 9;

/// Flash region, numbered by its FLREG index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RegionType {
    Descriptor = 0,
    Bios = 1,
    Me = 2,
    Gbe = 3,
    Pdr = 4,
    DevExp1 = 5,
    Bios2 = 6,
    Microcode = 7,
    Ec = 8,
}

impl RegionType {
    const ALL: [RegionType; MAX_REGIONS] = [
        Self::Descriptor,
        Self::Bios,
        Self::Me,
        Self::Gbe,
        Self::Pdr,
        Self::DevExp1,
        Self::Bios2,
        Self::Microcode,
        Self::Ec,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

/// Decoded descriptor map.
#[derive(Debug, Clone)]
pub struct DescriptorHeader {
    /// Where the signature was found.
    pub signature_offset: usize,
    pub flmap0: u32,
    pub flmap1: u32,
    pub flmap2: u32,
    /// Flash component section base.
    pub component_base: usize,
    /// Flash region section base.
    pub region_base: usize,
    /// NR field of FLMAP0: index of the last FLREG slot in use. 0 when the
    /// field is not filled in, in which case every slot is read.
    pub region_count: u8,
}

impl DescriptorHeader {
    pub fn read(buf: &[u8]) -> Result<Self> {
        let sig = signature_offset(buf).ok_or(Error::BadMagic)?;
        let flmap0 = u32_at(buf, sig + 4).ok_or(Error::UnexpectedEof)?;
        let flmap1 = u32_at(buf, sig + 8).ok_or(Error::UnexpectedEof)?;
        let flmap2 = u32_at(buf, sig + 12).ok_or(Error::UnexpectedEof)?;
        let region_base = (((flmap0 >> 16) & 0xFF) as usize) << 4;
        if region_base == 0 || region_base >= DESCRIPTOR_LEN {
            return Err(Error::MalformedHeader("flash region base"));
        }
        Ok(Self {
            signature_offset: sig,
            flmap0,
            flmap1,
            flmap2,
            component_base: ((flmap0 & 0xFF) as usize) << 4,
            region_base,
            region_count: ((flmap0 >> 24) & 0x07) as u8,
        })
    }
}

/// One used flash region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHeader {
    pub region: RegionType,
    /// First byte of the region.
    pub base: usize,
    /// Last byte of the region (inclusive).
    pub limit: usize,
}

impl RegionHeader {
    fn decode(region: RegionType, flreg: u32) -> Option<Self> {
        if flreg == u32::MAX {
            return None;
        }
        let base = ((flreg & 0x7FFF) as usize) << 12;
        let limit = ((((flreg >> 16) & 0x7FFF) as usize) << 12) | 0xFFF;
        (base < limit).then_some(Self { region, base, limit })
    }

    /// Declared size in bytes.
    pub fn size(&self) -> usize {
        self.limit - self.base + 1
    }
}

/// Offset of the descriptor signature, current layout first.
pub fn signature_offset(buf: &[u8]) -> Option<usize> {
    [SIGNATURE_OFFSET, LEGACY_SIGNATURE_OFFSET]
        .into_iter()
        .find(|&off| u32_at(buf, off) == Some(SIGNATURE))
}

pub fn probe(buf: &[u8]) -> bool {
    signature_offset(buf).is_some()
}

/// Decode the used regions of a descriptor, ordered by base address.
pub fn regions(buf: &[u8], header: &DescriptorHeader) -> Vec<RegionHeader> {
    let slots = match header.region_count {
        0 => MAX_REGIONS,
        n => n as usize + 1,
    };
    let mut regions: Vec<RegionHeader> = RegionType::ALL
        .iter()
        .take(slots)
        .filter_map(|&region| {
            let flreg = u32_at(buf, header.region_base + 4 * region.index() as usize)?;
            RegionHeader::decode(region, flreg)
        })
        .collect();
    regions.sort_by_key(|r| (r.base, r.region));
    regions
}

/// Parse a full flash image starting with a descriptor.
pub fn parse(data: Bytes, offset: usize, ctx: &Context<'_>) -> Result<FirmwareObject> {
    let header = DescriptorHeader::read(&data)?;
    let regions = regions(&data, &header);

    tracing::debug!(
        offset = format_args!("{:#x}", offset),
        regions = regions.len(),
        "parsing flash descriptor"
    );

    let mut node = FirmwareObject::new(Details::FlashDescriptor(header), offset, data.clone());
    let end = data.len();
    let mut pos = 0;
    for region in regions {
        if region.base < pos {
            tracing::warn!(
                region = ?region.region,
                base = format_args!("{:#x}", region.base),
                "overlapping flash region skipped"
            );
            node.flag(Validity::Malformed);
            continue;
        }
        if region.base >= end {
            tracing::warn!(region = ?region.region, "flash region outside image");
            node.flag(Validity::Truncated);
            continue;
        }
        if region.base > pos {
            node.children
                .push(FirmwareObject::padding(offset + pos, data.slice(pos..region.base)));
        }

        let stop = (region.limit + 1).min(end);
        let body = data.slice(region.base..stop);
        let mut child =
            FirmwareObject::new(Details::Region(region), offset + region.base, body.clone());
        if stop <= region.limit {
            node.flag(Validity::Truncated);
            child.flag(Validity::Truncated);
        }
        if matches!(region.region, RegionType::Bios | RegionType::Bios2) {
            child.children = scan_volumes(&body, offset + region.base, ctx);
        }
        node.children.push(child);
        pos = stop;
    }
    if pos < end {
        node.children.push(FirmwareObject::padding(offset + pos, data.slice(pos..)));
    }

    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParserConfig;
    use crate::object::{Identifier, ObjectKind};

    fn flreg(base: usize, limit: usize) -> u32 {
        ((base >> 12) as u32) | (((limit >> 12) as u32) << 16)
    }

    /// 16 KiB image: descriptor at 0, ME at 0x1000, BIOS at 0x3000.
    fn image() -> Vec<u8> {
        let mut buf = vec![0xFF; 0x4000];
        buf[0x10..0x14].copy_from_slice(&SIGNATURE.to_le_bytes());
        buf[0x14..0x18].copy_from_slice(&0x0204_0003u32.to_le_bytes());
        let regions = [
            flreg(0, 0x0FFF),
            flreg(0x3000, 0x3FFF),
            flreg(0x1000, 0x1FFF),
            0x0000_7FFF,
        ];
        for (i, r) in regions.iter().enumerate() {
            buf[0x40 + 4 * i..0x44 + 4 * i].copy_from_slice(&r.to_le_bytes());
        }
        for i in regions.len()..MAX_REGIONS {
            buf[0x40 + 4 * i..0x44 + 4 * i].copy_from_slice(&0x0000_7FFFu32.to_le_bytes());
        }
        buf
    }

    #[test]
    fn regions_sorted_with_gaps() {
        let buf = image();
        let config = ParserConfig::default();
        let root = parse(Bytes::from(buf), 0, &Context::new(&config)).unwrap();
        assert!(root.is_valid());

        let layout: Vec<(ObjectKind, usize, usize)> = root
            .children
            .iter()
            .map(|c| (c.kind(), c.offset, c.size))
            .collect();
        assert_eq!(
            layout,
            vec![
                (ObjectKind::Region, 0, 0x1000),
                (ObjectKind::Region, 0x1000, 0x1000),
                (ObjectKind::Padding, 0x2000, 0x1000),
                (ObjectKind::Region, 0x3000, 0x1000),
            ]
        );
        assert_eq!(root.children[1].identifier(), Identifier::Type(2));
        assert_eq!(root.children[3].identifier(), Identifier::Type(1));
    }

    #[test]
    fn header_fields() {
        let h = DescriptorHeader::read(&image()).unwrap();
        assert_eq!(h.component_base, 0x30);
        assert_eq!(h.region_base, 0x40);
        assert_eq!(h.region_count, 2);
        assert!(probe(&image()));
        assert!(!probe(&[0u8; 0x20]));
    }

    #[test]
    fn legacy_signature_at_zero() {
        let mut buf = vec![0xFF; 0x2000];
        buf[..4].copy_from_slice(&SIGNATURE.to_le_bytes());
        buf[4..8].copy_from_slice(&0x0004_0003u32.to_le_bytes());
        buf[0x40..0x44].copy_from_slice(&flreg(0, 0x0FFF).to_le_bytes());
        buf[0x44..0x48].copy_from_slice(&flreg(0x1000, 0x1FFF).to_le_bytes());
        let h = DescriptorHeader::read(&buf).unwrap();
        assert_eq!(h.signature_offset, LEGACY_SIGNATURE_OFFSET);
        assert_eq!(h.region_base, 0x40);

        let config = ParserConfig::default();
        let root = parse(Bytes::from(buf), 0, &Context::new(&config)).unwrap();
        assert!(root.is_valid());
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[1].offset, 0x1000);
    }

    #[test]
    fn region_past_end_is_truncated() {
        let mut buf = image();
        buf.truncate(0x3800);
        let config = ParserConfig::default();
        let root = parse(Bytes::from(buf), 0, &Context::new(&config)).unwrap();
        assert_eq!(root.validity, Validity::Truncated);
        let bios = root.children.last().unwrap();
        assert_eq!(bios.validity, Validity::Truncated);
        assert_eq!(bios.size, 0x800);
    }

    #[test]
    fn slots_past_region_count_are_ignored() {
        let mut buf = image();
        buf[0x14..0x18].copy_from_slice(&0x0104_0003u32.to_le_bytes());
        // Slot 2 now lies past NR and overlaps the descriptor region.
        buf[0x48..0x4C].copy_from_slice(&flreg(0, 0x1FFF).to_le_bytes());
        let h = DescriptorHeader::read(&buf).unwrap();
        assert_eq!(h.region_count, 1);
        assert_eq!(regions(&buf, &h).len(), 2);

        let config = ParserConfig::default();
        let root = parse(Bytes::from(buf), 0, &Context::new(&config)).unwrap();
        assert!(root.is_valid());
        let kinds: Vec<ObjectKind> = root.children.iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![ObjectKind::Region, ObjectKind::Padding, ObjectKind::Region]
        );
    }

    #[test]
    fn region_index_round_trip() {
        assert_eq!(RegionType::from_index(8), Some(RegionType::Ec));
        assert_eq!(RegionType::from_index(9), None);
        assert_eq!(RegionType::Bios.index(), 1);
    }
}
