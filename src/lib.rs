//! **fwkit** - a defensive parser for UEFI firmware images.
//!
//! Raw buffers (SPI flash dumps, BIOS ROMs, update capsules, bare firmware
//! volumes) are detected by content and decoded into a tree of
//! [`FirmwareObject`] nodes: volumes hold files, files hold sections, and
//! sections may wrap compressed streams or further volumes. Corrupt or
//! unsupported pieces are kept in the tree and flagged with a
//! [`Validity`] instead of aborting the parse.
//!
//! ```no_run
//! let image = std::fs::read("bios.bin")?;
//! let mut parser = fwkit::AutoParser::new(image);
//! if parser.format().is_some() {
//!     let root = parser.parse()?;
//!     for node in fwkit::iterate(&root) {
//!         println!("{:?} {:#x} {}", node.kind(), node.offset, node.identifier());
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Supported formats
//! | Module | Format |
//! |--------|--------|
//! | [`formats::capsule`] | UEFI capsule (EFI, FMP, AMI Aptio, Toshiba, Lenovo, Intel) |
//! | [`formats::volume`]  | Firmware volume (FFSv1/v2/v3) |
//! | [`formats::file`]    | FFS file |
//! | [`formats::section`] | FFS section, including compressed and GUID-defined encapsulations |
//! | [`formats::flash`]   | Intel flash descriptor image |
//! | [`formats::pe`]      | PE32/PE32+ and TE executable headers |
//! | [`formats::rom`]     | BIOS ROM with volumes at arbitrary offsets |
//!
//! # Features
//! * `compression` (default) - LZMA decoding of GUID-defined sections via
//!   `xz2`.

pub mod compression;
pub mod cursor;
pub mod detect;
pub mod error;
pub mod fixtures;
pub mod formats;
pub mod guids;
pub mod iter;
pub mod object;
pub mod parser;
pub(crate) mod utils;

pub use detect::{Detector, FormatTag, detect};
pub use error::{Error, Result};
pub use iter::{flatten, iterate};
pub use object::{FirmwareObject, Identifier, NodeId, ObjectKind, Validity};
pub use parser::{AutoParser, ParserConfig, ParserState, parse};
