//! The parsed object tree.
//!
//! Every structural element found in an image - capsule, volume, file,
//! section, flash region, or an explicitly captured gap - is a
//! [`FirmwareObject`]. Nodes share a common base record (extent, validity,
//! children) and carry their format-specific header in [`Details`].
//!
//! Ownership is strictly top-down: a node owns its children. The `parent`
//! field is a [`NodeId`], which is only an identity handle; resolve it with
//! [`FirmwareObject::find`] on the root.

use std::fmt;

use bytes::Bytes;
use uuid::Uuid;

use crate::formats::capsule::CapsuleHeader;
use crate::formats::file::FileHeader;
use crate::formats::flash::{DescriptorHeader, RegionHeader};
use crate::formats::pe::ExecutableHeader;
use crate::formats::section::{SectionBody, SectionHeader};
use crate::formats::volume::VolumeHeader;
use crate::iter::{Objects, iterate};

/// Pre-order position of a node within its tree. The root is `NodeId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub usize);

/// Outcome of validating a node's own header, checksum and sub-format.
///
/// Variants are ordered by severity; when several problems apply to one node
/// the most severe one is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Validity {
    #[default]
    Valid,
    /// A header or data checksum did not verify. Parsing continued.
    ChecksumMismatch,
    /// Header fields are inconsistent (e.g. a size smaller than the header).
    Malformed,
    /// The FFS state byte marks the file deleted or its header invalid.
    Deleted,
    /// No handler is registered for the compression type or GUID.
    UnsupportedSubformat,
    /// The declared extent runs past the enclosing buffer.
    Truncated,
    /// The nesting limit was reached; children were not parsed.
    RecursionLimitExceeded,
}

impl Validity {
    pub fn is_valid(self) -> bool {
        self == Validity::Valid
    }
}

/// Variant tag of a [`FirmwareObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Volume,
    File,
    Section,
    Capsule,
    Padding,
    RawBlob,
    FlashDescriptor,
    Region,
    Executable,
}

/// Format-specific key of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identifier {
    Guid(Uuid),
    Type(u8),
    None,
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Guid(g) => write!(f, "{g:X}"),
            Identifier::Type(t) => write!(f, "{t:#04x}"),
            Identifier::None => f.write_str("-"),
        }
    }
}

/// Per-variant decoded header.
#[derive(Debug, Clone)]
pub enum Details {
    Volume(VolumeHeader),
    File(FileHeader),
    Section(SectionHeader),
    Capsule(CapsuleHeader),
    /// Gap between siblings. `fill` is the erased byte if the gap is uniform.
    Padding { fill: Option<u8> },
    RawBlob,
    FlashDescriptor(DescriptorHeader),
    Region(RegionHeader),
    Executable(ExecutableHeader),
}

/// A single node of the parsed tree.
#[derive(Debug, Clone)]
pub struct FirmwareObject {
    /// Pre-order identity, assigned once the tree is complete.
    pub id: NodeId,
    /// Identity of the parent node; [`None`] for the root.
    pub parent: Option<NodeId>,
    /// Byte offset within the owning buffer. Children of an encapsulation
    /// section that decoded its payload are relative to that payload.
    pub offset: usize,
    /// Size of the extent actually covered (clamped to the buffer).
    pub size: usize,
    pub details: Details,
    pub validity: Validity,
    /// Children in offset order.
    pub children: Vec<FirmwareObject>,
    data: Bytes,
    decoded: Option<Bytes>,
}

impl FirmwareObject {
    /// Create a leaf covering `data`, located at `offset` in its owning
    /// buffer.
    pub fn new(details: Details, offset: usize, data: Bytes) -> Self {
        Self {
            id: NodeId::default(),
            parent: None,
            offset,
            size: data.len(),
            details,
            validity: Validity::Valid,
            children: Vec::new(),
            data,
            decoded: None,
        }
    }

    /// Create a padding node for a gap, recording the fill byte when uniform.
    pub fn padding(offset: usize, data: Bytes) -> Self {
        let fill = crate::utils::uniform_fill(&data);
        Self::new(Details::Padding { fill }, offset, data)
    }

    /// Record a validation problem. The most severe flag wins.
    pub fn flag(&mut self, validity: Validity) {
        self.validity = self.validity.max(validity);
    }

    pub fn kind(&self) -> ObjectKind {
        match self.details {
            Details::Volume(_) => ObjectKind::Volume,
            Details::File(_) => ObjectKind::File,
            Details::Section(_) => ObjectKind::Section,
            Details::Capsule(_) => ObjectKind::Capsule,
            Details::Padding { .. } => ObjectKind::Padding,
            Details::RawBlob => ObjectKind::RawBlob,
            Details::FlashDescriptor(_) => ObjectKind::FlashDescriptor,
            Details::Region(_) => ObjectKind::Region,
            Details::Executable(_) => ObjectKind::Executable,
        }
    }

    /// GUID for volumes, files, capsules and GUID-defined sections; the type
    /// code for other sections and regions.
    pub fn identifier(&self) -> Identifier {
        match &self.details {
            Details::Volume(v) => Identifier::Guid(v.fs_guid),
            Details::File(f) => Identifier::Guid(f.name),
            Details::Capsule(c) => Identifier::Guid(c.guid),
            Details::Section(s) => match s.body {
                SectionBody::GuidDefined { guid, .. } => Identifier::Guid(guid),
                _ => Identifier::Type(s.section_type.code()),
            },
            Details::Region(r) => Identifier::Type(r.region.index()),
            Details::Executable(e) => Identifier::Type(e.format as u8),
            Details::Padding { .. } | Details::RawBlob | Details::FlashDescriptor(_) => {
                Identifier::None
            }
        }
    }

    /// Size the header claims, which may exceed [`FirmwareObject::size`] for
    /// truncated nodes.
    pub fn declared_size(&self) -> u64 {
        match &self.details {
            Details::Volume(v) => v.fv_length,
            Details::File(f) => f.size,
            Details::Section(s) => s.size,
            Details::Capsule(c) => c.image_size as u64,
            _ => self.size as u64,
        }
    }

    /// Display name: the UI name of a file, or the name of a well-known GUID.
    pub fn name(&self) -> Option<&str> {
        match &self.details {
            Details::File(f) => f.ui_name.as_deref(),
            Details::Section(s) => match &s.body {
                SectionBody::UserInterface { name } => Some(name),
                _ => None,
            },
            _ => match self.identifier() {
                Identifier::Guid(g) => crate::guids::name(&g),
                _ => None,
            },
        }
    }

    /// The bytes covered by this node (header included).
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Decoded payload owned by an encapsulation section.
    pub fn decoded(&self) -> Option<&Bytes> {
        self.decoded.as_ref()
    }

    pub(crate) fn set_decoded(&mut self, decoded: Bytes) {
        self.decoded = Some(decoded);
    }

    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }

    /// Pre-order traversal starting at this node.
    pub fn iter(&self) -> Objects<'_> {
        iterate(self)
    }

    /// Number of nodes in this subtree, this node included.
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Resolve a [`NodeId`] within this subtree.
    pub fn find(&self, id: NodeId) -> Option<&FirmwareObject> {
        let mut node = self;
        if id < node.id {
            return None;
        }
        // Ids are pre-order, so the wanted node lives under the last child
        // whose id does not exceed it.
        while node.id != id {
            let idx = node.children.partition_point(|c| c.id <= id);
            node = node.children.get(idx.checked_sub(1)?)?;
        }
        Some(node)
    }

    /// Parent of `node`, looked up from this (root) node.
    pub fn parent_of(&self, node: &FirmwareObject) -> Option<&FirmwareObject> {
        self.find(node.parent?)
    }

    /// Assign pre-order ids and parent links to the whole tree.
    pub(crate) fn finalize(&mut self) {
        fn walk(node: &mut FirmwareObject, parent: Option<NodeId>, next: &mut usize) {
            node.id = NodeId(*next);
            node.parent = parent;
            *next += 1;
            let id = node.id;
            for child in &mut node.children {
                walk(child, Some(id), next);
            }
        }
        let mut next = 0;
        walk(self, None, &mut next);
    }
}
