//! LZMA GUID-defined sections (requires the `compression` feature).
//!
//! EDK2's `LzmaCustomDecompress` stores a classic LZMA-alone stream: five
//! bytes of properties, a little-endian `u64` uncompressed size, then the
//! compressed data. [`xz2`]'s LZMA-alone decoder reads this layout directly.

#![cfg(feature = "compression")]

use std::io::Read;

use xz2::read::XzDecoder;
use xz2::stream::Stream;

use super::{CodecError, CodecInput, Decoded};

/// Upper bound on the pre-allocation taken from the stream header.
const MAX_PREALLOC: usize = 64 << 20;

/// Decompress an LZMA-alone buffer into at most `max_len` bytes.
pub fn decompress_lzma(data: &[u8], max_len: usize) -> Result<Vec<u8>, CodecError> {
    if data.len() < 13 {
        return Err(CodecError::Corrupt("LZMA header too short"));
    }
    let declared = u64::from_le_bytes([
        data[5], data[6], data[7], data[8], data[9], data[10], data[11], data[12],
    ]);
    let capacity = usize::try_from(declared)
        .unwrap_or(0)
        .min(MAX_PREALLOC)
        .min(max_len);

    let stream =
        Stream::new_lzma_decoder(u64::MAX).map_err(|_| CodecError::Corrupt("LZMA decoder init"))?;
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
    let mut out = Vec::with_capacity(capacity);
    XzDecoder::new_stream(data, stream)
        .take(limit)
        .read_to_end(&mut out)
        .map_err(|_| CodecError::Corrupt("LZMA stream"))?;
    if out.len() > max_len {
        return Err(CodecError::TooLarge(max_len));
    }
    Ok(out)
}

/// Decoder registered for [`crate::guids::LZMA_CUSTOM_DECOMPRESS`].
pub fn decode(input: &CodecInput<'_>) -> Result<Decoded, CodecError> {
    let out = decompress_lzma(&input.payload, input.max_len)?;
    tracing::debug!(
        compressed = input.payload.len(),
        decompressed = out.len(),
        "decompressed LZMA section"
    );
    Ok(Decoded::verified(out))
}

#[cfg(test)]
mod tests {
    use xz2::read::XzEncoder;
    use xz2::stream::LzmaOptions;

    use super::*;

    fn compress(data: &[u8]) -> Vec<u8> {
        let opts = LzmaOptions::new_preset(6).unwrap();
        let stream = Stream::new_lzma_encoder(&opts).unwrap();
        let mut out = Vec::new();
        XzEncoder::new_stream(data, stream)
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn decodes_lzma_alone() {
        let plain: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let packed = compress(&plain);
        assert!(packed.len() < plain.len());
        assert_eq!(decompress_lzma(&packed, plain.len()).unwrap(), plain);
    }

    #[test]
    fn stops_at_output_limit() {
        let packed = compress(&vec![0u8; 0x10000]);
        assert!(matches!(
            decompress_lzma(&packed, 0x1000),
            Err(CodecError::TooLarge(0x1000))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(decompress_lzma(&[0u8; 4], usize::MAX).is_err());
        assert!(decompress_lzma(&[0xFFu8; 64], usize::MAX).is_err());
    }
}
