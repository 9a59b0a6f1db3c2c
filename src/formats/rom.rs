//! Plain BIOS ROM images: a buffer with no outer container holding firmware
//! volumes back to back, possibly after vendor headers, boot blocks or
//! padding. A lone volume that fills the whole buffer is detected as a
//! volume instead.

use bytes::Bytes;

use super::{Context, find_volume, scan_volumes};
use crate::Result;
use crate::object::{Details, FirmwareObject};

/// True if a plausible volume header appears anywhere in `buf`.
pub fn probe(buf: &[u8]) -> bool {
    find_volume(buf, 0).is_some()
}

/// Parse a ROM image. The root is a raw blob covering all of `data`.
pub fn parse(data: Bytes, offset: usize, ctx: &Context<'_>) -> Result<FirmwareObject> {
    tracing::debug!(
        offset = format_args!("{:#x}", offset),
        size = format_args!("{:#x}", data.len()),
        "scanning ROM image for volumes"
    );
    let children = scan_volumes(&data, offset, ctx);
    let mut node = FirmwareObject::new(Details::RawBlob, offset, data);
    node.children = children;
    Ok(node)
}
