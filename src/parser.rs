//! The top-level dispatcher.
//!
//! [`AutoParser`] owns one input buffer. [`AutoParser::format`] runs the
//! detector once and caches the answer; [`AutoParser::parse`] then hands the
//! buffer to the root parser registered for that format.
//!
//! ```text
//! Unparsed --format() = Some--> Detected --parse() Ok--> Parsed
//!     |                             |
//!     +--format() = None--> Failed <+--parse() Err
//! ```

use std::cell::{Cell, OnceCell};

use bytes::Bytes;

use crate::compression::Codecs;
use crate::detect::{Detector, FormatTag};
use crate::formats::Context;
use crate::object::FirmwareObject;
use crate::{Error, Result};

/// Default limit on nested encapsulations and volumes.
pub const DEFAULT_MAX_DEPTH: usize = 32;
/// Default cap on the output of a single decoded section (64 MiB).
pub const DEFAULT_MAX_DECODED_LEN: usize = 64 << 20;

/// Parse-wide settings.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Maximum nesting of encapsulation sections and embedded volumes below
    /// the root. The node at the limit is flagged and not expanded.
    pub max_depth: usize,
    /// Largest payload one encapsulation section may decode to. Sections
    /// that would go past it are flagged and not expanded.
    pub max_decoded_len: usize,
    /// Decoders for compressed and GUID-defined sections.
    pub codecs: Codecs,
    /// Format registry used for the root and for embedded volumes.
    pub detector: Detector,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_decoded_len: DEFAULT_MAX_DECODED_LEN,
            codecs: Codecs::standard(),
            detector: Detector::standard(),
        }
    }
}

impl ParserConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_decoded_len(mut self, max_decoded_len: usize) -> Self {
        self.max_decoded_len = max_decoded_len;
        self
    }

    pub fn with_codecs(mut self, codecs: Codecs) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.detector = detector;
        self
    }
}

/// Lifecycle of an [`AutoParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Unparsed,
    Detected,
    Parsed,
    Failed,
}

/// Detect-then-parse driver for a single buffer.
#[derive(Debug)]
pub struct AutoParser {
    data: Bytes,
    config: ParserConfig,
    format: OnceCell<Option<FormatTag>>,
    state: Cell<ParserState>,
}

impl AutoParser {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_config(data, ParserConfig::default())
    }

    pub fn with_config(data: impl Into<Bytes>, config: ParserConfig) -> Self {
        Self {
            data: data.into(),
            config,
            format: OnceCell::new(),
            state: Cell::new(ParserState::Unparsed),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn state(&self) -> ParserState {
        self.state.get()
    }

    /// Detected format of the buffer. Detection runs once; later calls
    /// return the cached result.
    pub fn format(&self) -> Option<FormatTag> {
        *self.format.get_or_init(|| {
            let tag = self.config.detector.detect(&self.data);
            self.state.set(if tag.is_some() {
                ParserState::Detected
            } else {
                ParserState::Failed
            });
            tracing::debug!(len = self.data.len(), format = ?tag, "detected format");
            tag
        })
    }

    /// Parse the buffer as the detected format.
    ///
    /// Requires a prior call to [`AutoParser::format`] and may succeed at
    /// most once. Fails if the root header cannot be decoded or the root's
    /// declared extent runs past the buffer.
    pub fn parse(&mut self) -> Result<FirmwareObject> {
        let tag = match (self.state.get(), self.format.get()) {
            (ParserState::Unparsed, _) => return Err(Error::NotDetected),
            (ParserState::Failed, Some(None)) => return Err(Error::UnrecognizedFormat),
            (ParserState::Detected, Some(Some(tag))) => *tag,
            (state, _) => return Err(Error::InvalidState(state)),
        };

        let result = self.parse_as(tag);
        self.state.set(if result.is_ok() {
            ParserState::Parsed
        } else {
            ParserState::Failed
        });
        result
    }

    fn parse_as(&self, tag: FormatTag) -> Result<FirmwareObject> {
        let entry = self
            .config
            .detector
            .entry(tag)
            .ok_or(Error::UnrecognizedFormat)?;
        let ctx = Context::new(&self.config);
        let mut root = (entry.parse)(self.data.clone(), &ctx)?;

        let declared = root.declared_size();
        if declared > root.size as u64 {
            tracing::warn!(
                format = %tag,
                needed = format_args!("{:#x}", declared),
                available = format_args!("{:#x}", self.data.len()),
                "root object truncated"
            );
            return Err(Error::Truncated {
                needed: declared,
                available: self.data.len() as u64,
            });
        }

        root.finalize();
        tracing::debug!(format = %tag, objects = root.count(), "parsed image");
        Ok(root)
    }
}

/// Detect and parse `data` with the default configuration.
pub fn parse(data: impl Into<Bytes>) -> Result<FirmwareObject> {
    let mut parser = AutoParser::new(data);
    parser.format().ok_or(Error::UnrecognizedFormat)?;
    parser.parse()
}
