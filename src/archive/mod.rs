//! Scene archives as seen by the converter.
//!
//! - [`ArchiveAccessor`] - Hierarchy and per-time sampling
//! - [`OgawaArchive`] - Alembic `.abc` files
//! - [`MemoryArchive`] - Scenes built in code

mod memory;
mod ogawa;
mod traits;

pub use memory::{Animated, MemoryArchive, MemoryArchiveBuilder};
pub use ogawa::OgawaArchive;
pub use traits::*;
