//! The capability a scene archive offers to the converter.

use crate::geom::{CameraSample, XformSample};
use crate::util::Result;

/// Opaque handle to an object inside one archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

/// Identity and schema of an archive object.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectDescription {
    pub name: String,
    /// Path from the archive root, e.g. `/rig/camera1`.
    pub full_name: String,
    /// Schema title, `None` for plain grouping objects.
    pub schema: Option<String>,
    /// Transform written as a locator by the exporting application.
    pub is_locator: bool,
}

/// Animated time span stored in an archive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArchiveTimeRange {
    pub start_seconds: f64,
    pub end_seconds: f64,
    /// Samples per second, when the archive records one.
    pub frame_rate: Option<f64>,
}

/// Read access to a scene hierarchy and its time samples.
///
/// Sampling at a time between stored samples returns the nearest stored
/// sample. Objects without a transform return an inheriting identity.
pub trait ArchiveAccessor: Send + Sync {
    /// Display name, usually the file name.
    fn name(&self) -> &str;

    /// The archive's top object. It is never converted itself.
    fn top(&self) -> ObjectId;

    fn describe(&self, id: ObjectId) -> Result<ObjectDescription>;

    /// Child objects in stored order.
    fn children(&self, id: ObjectId) -> Result<Vec<ObjectId>>;

    /// `None` for archives without animated samples.
    fn time_range(&self) -> Option<ArchiveTimeRange>;

    /// Local transform at `seconds`.
    fn xform_sample(&self, id: ObjectId, seconds: f64) -> Result<XformSample>;

    /// Lens values at `seconds`. Fails for objects that are not cameras.
    fn camera_sample(&self, id: ObjectId, seconds: f64) -> Result<CameraSample>;

    /// True when sampling from several threads at once does not serialize.
    fn supports_concurrent_reads(&self) -> bool {
        false
    }
}
