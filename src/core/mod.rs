//! Core layer - metadata and time sampling shared by archive readers.
//!
//! - [`TimeSampling`] - Time sampling for animated properties
//! - [`MetaData`] - Key-value metadata storage

mod metadata;
mod time_sampling;

pub use metadata::MetaData;
pub use time_sampling::TimeSampling;
