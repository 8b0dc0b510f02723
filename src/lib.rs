//! # abc2jsx
//!
//! Converts the cameras, transforms and locators of an Alembic (.abc)
//! archive into an After Effects script (.jsx) that rebuilds them as
//! animated layers.
//!
//! ## Modules
//!
//! - [`util`] - Errors and transform math
//! - [`ogawa`] - Low-level Ogawa binary format reader
//! - [`core`] - Metadata and time sampling
//! - [`geom`] - Xform and Camera samples
//! - [`archive`] - Archive access used by the converter
//! - [`convert`] - Traversal, sampling and keyframe reduction
//! - [`export`] - Script backends and atomic output
//! - [`config`] / [`logging`] - Configuration file and tracing setup
//!
//! ## Example
//!
//! ```no_run
//! use abc2jsx::prelude::*;
//! use std::path::Path;
//!
//! let converter = Converter::new(ConverterConfig::load());
//! let outcome = converter.convert(
//!     Path::new("shot.abc"),
//!     Path::new("shot.jsx"),
//!     &ConvertOptions::default(),
//! );
//! if let Outcome::Success(report) = outcome {
//!     for skipped in &report.skipped {
//!         println!("skipped {}: {}", skipped.name, skipped.reason);
//!     }
//! }
//! ```

pub mod util;
pub mod ogawa;
pub mod core;
pub mod geom;
pub mod archive;
pub mod convert;
pub mod export;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use util::{Error, Result};
pub use convert::{ConvertOptions, Converter, Outcome};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result, RotationOrder};
    pub use crate::archive::{ArchiveAccessor, MemoryArchive, MemoryArchiveBuilder, OgawaArchive};
    pub use crate::config::ConverterConfig;
    pub use crate::convert::{
        CancellationToken, ConversionReport, ConvertOptions, Converter, Outcome, ProgressCallback,
    };
    pub use crate::export::{JsxBackend, ScriptBackend};
    pub use crate::geom::{CameraSample, XformSample};
}
