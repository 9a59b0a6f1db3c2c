//! Conformance fixtures: which sample directories must decode as which
//! format, and how many objects individual samples are expected to yield.
//!
//! ```json
//! {
//!   "types":   { "uefi_capsule": "samples/capsules", "bios_rom": "samples/roms" },
//!   "objects": { "samples/roms/board.bin": 1843 }
//! }
//! ```
//!
//! Object counts are a regression oracle only: [`check_sample`] reports a
//! mismatch, it does not judge it.
//!
//! [`check_sample`]: Fixtures::check_sample

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::detect::FormatTag;
use crate::parser::AutoParser;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixtures {
    /// Format name (see [`FormatTag::as_str`]) to sample directory.
    #[serde(default)]
    pub types: BTreeMap<String, PathBuf>,
    /// Sample path to expected `flatten(iterate(root))` length.
    #[serde(default)]
    pub objects: BTreeMap<PathBuf, usize>,
}

/// Outcome of checking one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleReport {
    pub path: PathBuf,
    pub expected_format: Option<FormatTag>,
    pub detected_format: Option<FormatTag>,
    pub expected_count: Option<usize>,
    /// Flattened object count, if the sample parsed.
    pub count: Option<usize>,
    /// Parse error message, if parsing failed.
    pub error: Option<String>,
}

impl SampleReport {
    /// True unless a format was expected and a different one was detected.
    pub fn format_matches(&self) -> bool {
        self.expected_format
            .is_none_or(|t| self.detected_format == Some(t))
    }

    /// True unless a count was expected and a different one was produced.
    pub fn count_matches(&self) -> bool {
        self.expected_count.is_none_or(|n| self.count == Some(n))
    }
}

impl Fixtures {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Format expected for a sample, from the directory it lives in. Names
    /// that are not format names are ignored.
    pub fn expected_format(&self, sample: &Path) -> Option<FormatTag> {
        self.types
            .iter()
            .filter(|(_, dir)| sample.starts_with(dir))
            .find_map(|(name, _)| name.parse().ok())
    }

    pub fn expected_count(&self, sample: &Path) -> Option<usize> {
        self.objects.get(sample).copied()
    }

    /// Detect and parse `data` (the contents of `sample`) and compare with
    /// the fixture expectations.
    pub fn check_sample(&self, sample: &Path, data: impl Into<Bytes>) -> SampleReport {
        let mut parser = AutoParser::new(data);
        let detected_format = parser.format();
        let (count, error) = match detected_format.map(|_| parser.parse()) {
            Some(Ok(root)) => (Some(root.count()), None),
            Some(Err(e)) => (None, Some(e.to_string())),
            None => (None, None),
        };

        let report = SampleReport {
            path: sample.to_path_buf(),
            expected_format: self.expected_format(sample),
            detected_format,
            expected_count: self.expected_count(sample),
            count,
            error,
        };
        if !report.count_matches() {
            tracing::warn!(
                path = %sample.display(),
                expected = ?report.expected_count,
                actual = ?report.count,
                "object count differs from fixture"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "types": { "bios_rom": "samples/rom", "not_a_format": "samples/misc" },
        "objects": { "samples/rom/a.bin": 12 }
    }"#;

    #[test]
    fn loads_mappings() {
        let f = Fixtures::from_json(JSON).unwrap();
        assert_eq!(
            f.expected_format(Path::new("samples/rom/a.bin")),
            Some(FormatTag::BiosRom)
        );
        assert_eq!(f.expected_format(Path::new("samples/misc/x.bin")), None);
        assert_eq!(f.expected_count(Path::new("samples/rom/a.bin")), Some(12));
        assert!(Fixtures::from_json("{}").unwrap().types.is_empty());
        assert!(Fixtures::from_json("[").is_err());
    }

    #[test]
    fn unrecognized_sample_is_reported() {
        let f = Fixtures::from_json(JSON).unwrap();
        let r = f.check_sample(Path::new("samples/rom/a.bin"), vec![0u8; 16]);
        assert_eq!(r.detected_format, None);
        assert!(!r.format_matches());
        assert!(!r.count_matches());
        assert_eq!(r.count, None);
        assert_eq!(r.error, None);
    }
}
