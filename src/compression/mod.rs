//! Compression adapter: a registry from codec identifiers to decode
//! functions.
//!
//! Encapsulation sections name their encoding either by a numeric
//! compression type (COMPRESSION sections) or by a GUID (GUID-defined
//! sections). [`Codecs`] maps both to a [`DecodeFn`]. A missing entry is an
//! ordinary outcome reported as [`CodecError::Unsupported`]; the section
//! parser turns it into a flagged node.
//!
//! ## Built-in codecs
//!
//! | Id | Codec | Notes |
//! |----|-------|-------|
//! | type `0x00` | not compressed | zero-copy passthrough |
//! | GUID `FC1BCDB0-…` | [`crc32`] | verifies the CRC32 preamble, zero-copy |
//! | GUID `EE4E5898-…` | [`lzma`] | LZMA-alone stream, requires the `compression` feature |
//!
//! EFI/Tiano standard compression (type `0x01`) is not built in; register a
//! decoder with [`Codecs::register`] to enable it.

pub mod crc32;
#[cfg(feature = "compression")]
pub mod lzma;

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::guids;

/// `EFI_NOT_COMPRESSED`.
pub const NOT_COMPRESSED: u8 = 0x00;
/// `EFI_STANDARD_COMPRESSION` (Tiano/EFI 1.1 algorithm).
pub const STANDARD_COMPRESSION: u8 = 0x01;

/// Key under which a decoder is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// Compression type byte of a COMPRESSION section.
    Type(u8),
    /// Definition GUID of a GUID-defined section.
    Guid(Uuid),
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecId::Type(t) => write!(f, "compression type {t:#04x}"),
            CodecId::Guid(g) => write!(f, "GUID {g:X}"),
        }
    }
}

/// Input handed to a decoder.
#[derive(Debug, Clone)]
pub struct CodecInput<'a> {
    /// Bytes between the fixed section header and the payload (e.g. the CRC
    /// of a CRC32 section). Empty for COMPRESSION sections.
    pub preamble: &'a [u8],
    /// Encoded payload.
    pub payload: Bytes,
    /// Decoded length announced by the section header, if any.
    pub expected_len: Option<usize>,
    /// Largest output the decoder may produce.
    pub max_len: usize,
}

/// Decoder output.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub data: Bytes,
    /// `false` when an integrity check embedded in the encoding failed but a
    /// payload could still be produced.
    pub checksum_valid: bool,
}

impl Decoded {
    pub fn verified(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            checksum_valid: true,
        }
    }
}

/// Failures of the compression adapter.
#[derive(Debug, Error)]
pub enum CodecError {
    /// No decoder registered for this identifier.
    #[error("no codec registered for {0}")]
    Unsupported(CodecId),
    /// The payload could not be decoded.
    #[error("corrupt payload: {0}")]
    Corrupt(&'static str),
    /// The decoded output would exceed [`CodecInput::max_len`].
    #[error("decoded output exceeds {0:#x} bytes")]
    TooLarge(usize),
}

/// Signature of a decode function.
pub type DecodeFn = fn(&CodecInput<'_>) -> Result<Decoded, CodecError>;

#[derive(Clone, Copy)]
struct Entry {
    name: &'static str,
    decode: DecodeFn,
}

/// Registry of decoders, passed to the parser through
/// [`crate::ParserConfig`].
#[derive(Clone)]
pub struct Codecs {
    entries: HashMap<CodecId, Entry>,
}

impl Codecs {
    /// A registry with no decoders at all.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The built-in decoders (see module docs).
    pub fn standard() -> Self {
        let mut codecs = Self::empty();
        codecs.register(CodecId::Type(NOT_COMPRESSED), "none", passthrough);
        codecs.register(
            CodecId::Guid(guids::CRC32_GUIDED_SECTION),
            "crc32",
            crc32::decode,
        );
        #[cfg(feature = "compression")]
        codecs.register(
            CodecId::Guid(guids::LZMA_CUSTOM_DECOMPRESS),
            "lzma",
            lzma::decode,
        );
        codecs
    }

    /// Register (or replace) the decoder for `id`.
    pub fn register(&mut self, id: CodecId, name: &'static str, decode: DecodeFn) -> &mut Self {
        self.entries.insert(id, Entry { name, decode });
        self
    }

    /// Builder-style [`Codecs::register`].
    pub fn with(mut self, id: CodecId, name: &'static str, decode: DecodeFn) -> Self {
        self.register(id, name, decode);
        self
    }

    /// Remove the decoder for `id`, returning whether one was registered.
    pub fn unregister(&mut self, id: CodecId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: CodecId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Registered name of the decoder for `id`.
    pub fn name(&self, id: CodecId) -> Option<&'static str> {
        self.entries.get(&id).map(|e| e.name)
    }

    /// Decode `input` with the decoder registered for `id`.
    ///
    /// Output longer than [`CodecInput::max_len`] is rejected even when the
    /// decoder itself does not check it.
    pub fn decode(&self, id: CodecId, input: &CodecInput<'_>) -> Result<Decoded, CodecError> {
        let entry = self.entries.get(&id).ok_or(CodecError::Unsupported(id))?;
        if input.expected_len.is_some_and(|n| n > input.max_len) {
            return Err(CodecError::TooLarge(input.max_len));
        }
        let decoded = (entry.decode)(input)?;
        if decoded.data.len() > input.max_len {
            return Err(CodecError::TooLarge(input.max_len));
        }
        Ok(decoded)
    }
}

impl Default for Codecs {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for Codecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(id, e)| (id, e.name)))
            .finish()
    }
}

/// Decoder for `EFI_NOT_COMPRESSED`: the payload is the stream.
pub fn passthrough(input: &CodecInput<'_>) -> Result<Decoded, CodecError> {
    Ok(Decoded::verified(input.payload.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(payload: &'static [u8]) -> CodecInput<'static> {
        CodecInput {
            preamble: &[],
            payload: Bytes::from_static(payload),
            expected_len: None,
            max_len: 0x100,
        }
    }

    #[test]
    fn unknown_id_is_unsupported() {
        let codecs = Codecs::standard();
        let err = codecs
            .decode(CodecId::Type(0x42), &input(b"abc"))
            .unwrap_err();
        assert!(matches!(err, CodecError::Unsupported(CodecId::Type(0x42))));
        assert!(!codecs.contains(CodecId::Type(STANDARD_COMPRESSION)));
    }

    #[test]
    fn passthrough_is_zero_copy() {
        let codecs = Codecs::standard();
        let payload = Bytes::from_static(b"payload");
        let out = codecs
            .decode(
                CodecId::Type(NOT_COMPRESSED),
                &CodecInput {
                    preamble: &[],
                    payload: payload.clone(),
                    expected_len: Some(7),
                    max_len: 7,
                },
            )
            .unwrap();
        assert_eq!(out.data, payload);
        assert_eq!(out.data.as_ptr(), payload.as_ptr());
        assert!(out.checksum_valid);
    }

    #[test]
    fn registry_is_substitutable() {
        fn reverse(input: &CodecInput<'_>) -> Result<Decoded, CodecError> {
            let mut v = input.payload.to_vec();
            v.reverse();
            Ok(Decoded::verified(v))
        }

        let codecs = Codecs::empty().with(CodecId::Type(STANDARD_COMPRESSION), "rev", reverse);
        assert_eq!(codecs.name(CodecId::Type(STANDARD_COMPRESSION)), Some("rev"));
        let out = codecs
            .decode(CodecId::Type(STANDARD_COMPRESSION), &input(b"abc"))
            .unwrap();
        assert_eq!(&out.data[..], b"cba");
        assert!(codecs.decode(CodecId::Type(NOT_COMPRESSED), &input(b"x")).is_err());

        let mut codecs = codecs;
        assert!(codecs.unregister(CodecId::Type(STANDARD_COMPRESSION)));
        assert!(!codecs.unregister(CodecId::Type(STANDARD_COMPRESSION)));
    }

    #[test]
    fn output_is_capped() {
        fn inflate(_: &CodecInput<'_>) -> Result<Decoded, CodecError> {
            Ok(Decoded::verified(vec![0u8; 0x1000]))
        }

        let codecs = Codecs::empty().with(CodecId::Type(STANDARD_COMPRESSION), "inflate", inflate);
        let err = codecs
            .decode(CodecId::Type(STANDARD_COMPRESSION), &input(b"x"))
            .unwrap_err();
        assert!(matches!(err, CodecError::TooLarge(0x100)));

        let announced = CodecInput {
            expected_len: Some(0x101),
            ..input(b"abc")
        };
        let err = Codecs::standard()
            .decode(CodecId::Type(NOT_COMPRESSED), &announced)
            .unwrap_err();
        assert!(matches!(err, CodecError::TooLarge(0x100)));
    }
}
