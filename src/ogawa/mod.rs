//! Read-only access to the Ogawa binary container used by Alembic files.
//!
//! ## File Structure
//!
//! ```text
//! +------------------+
//! | Magic: "Ogawa"   |  5 bytes
//! +------------------+
//! | Frozen flag      |  1 byte (0x00 or 0xFF)
//! +------------------+
//! | Version          |  2 bytes (u16 LE)
//! +------------------+
//! | Root Group Pos   |  8 bytes (u64 LE)
//! +------------------+
//! | ... Data ...     |
//! +------------------+
//! ```
//!
//! A group is a child count followed by child offsets. An offset with the
//! most significant bit set points at data (a byte length and payload),
//! otherwise at another group.

mod format;
mod read_util;
mod reader;

pub use format::*;
pub use read_util::*;
pub use reader::*;

#[cfg(test)]
pub(crate) use reader::tests::ImageBuilder;
