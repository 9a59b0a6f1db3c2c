//! CRC32 GUID-defined sections.
//!
//! The section is not encoded at all: a little-endian CRC32 of the payload
//! sits in the preamble, right after the GUID-defined section header. The
//! payload is returned as-is (zero-copy); a CRC mismatch is reported through
//! [`Decoded::checksum_valid`] so the section is flagged but still parsed.

use super::{CodecError, CodecInput, Decoded};

/// Verify the CRC32 preamble and pass the payload through.
pub fn decode(input: &CodecInput<'_>) -> Result<Decoded, CodecError> {
    let stored = input
        .preamble
        .get(..4)
        .ok_or(CodecError::Corrupt("missing CRC32 value"))?;
    let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
    let computed = crc32fast::hash(&input.payload);
    if stored != computed {
        tracing::warn!(
            stored = format_args!("{:#010x}", stored),
            computed = format_args!("{:#010x}", computed),
            "CRC32 section checksum mismatch"
        );
    }
    Ok(Decoded {
        data: input.payload.clone(),
        checksum_valid: stored == computed,
    })
}
