//! Alembic geometry schemas read by the converter.
//!
//! - [`XformSample`] - Transform operations of an Xform object
//! - [`CameraSample`] - Lens and film-back of a Camera object

pub mod camera;
pub mod xform;

pub use camera::{CameraSample, CAMERA_SCHEMA};
pub use xform::{XformOp, XformOpType, XformSample, XFORM_SCHEMA};
