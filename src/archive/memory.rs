//! In-memory [`ArchiveAccessor`] for scenes assembled in code.
//!
//! ```
//! use abc2jsx::archive::{ArchiveAccessor, MemoryArchiveBuilder};
//! use abc2jsx::geom::{CameraSample, XformSample};
//!
//! let mut builder = MemoryArchiveBuilder::new("shot");
//! builder.frame_range(1, 48, 24.0);
//! let rig = builder.add_xform(builder.top(), "camera1", XformSample::identity());
//! builder.add_camera(rig, "cameraShape1", CameraSample::with_focal_length(35.0));
//! let archive = builder.build();
//! assert_eq!(archive.children(archive.top()).unwrap().len(), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use super::traits::*;
use crate::geom::{CameraSample, XformSample, CAMERA_SCHEMA, XFORM_SCHEMA};
use crate::util::{Error, Result};

type SampleFn<T> = Arc<dyn Fn(f64) -> Result<T> + Send + Sync>;

/// A value that is either constant or a function of time in seconds.
#[derive(Clone)]
pub enum Animated<T> {
    Constant(T),
    Function(SampleFn<T>),
}

impl<T: Clone> Animated<T> {
    /// Value computed from the time in seconds.
    pub fn from_fn(f: impl Fn(f64) -> T + Send + Sync + 'static) -> Self {
        Self::Function(Arc::new(move |t| Ok(f(t))))
    }

    /// Value computed from the time in seconds, possibly failing.
    pub fn try_from_fn(f: impl Fn(f64) -> Result<T> + Send + Sync + 'static) -> Self {
        Self::Function(Arc::new(f))
    }

    pub fn at(&self, seconds: f64) -> Result<T> {
        match self {
            Self::Constant(v) => Ok(v.clone()),
            Self::Function(f) => f(seconds),
        }
    }
}

impl<T> From<T> for Animated<T> {
    fn from(value: T) -> Self {
        Self::Constant(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Animated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

enum MemoryKind {
    Group,
    Xform(Animated<XformSample>),
    Camera(Animated<CameraSample>),
    Broken(String),
}

struct MemoryObject {
    name: String,
    full_name: String,
    schema: Option<String>,
    is_locator: bool,
    kind: MemoryKind,
    children: Vec<ObjectId>,
}

/// Scene hierarchy held in memory.
pub struct MemoryArchive {
    name: String,
    objects: Vec<MemoryObject>,
    range: Option<ArchiveTimeRange>,
}

/// Builder for [`MemoryArchive`].
pub struct MemoryArchiveBuilder {
    archive: MemoryArchive,
}

impl MemoryArchiveBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let top = MemoryObject {
            name: "ABC".to_string(),
            full_name: "/".to_string(),
            schema: None,
            is_locator: false,
            kind: MemoryKind::Group,
            children: Vec::new(),
        };
        Self {
            archive: MemoryArchive {
                name: name.into(),
                objects: vec![top],
                range: None,
            },
        }
    }

    /// The top object, parent of everything added at the root.
    pub fn top(&self) -> ObjectId {
        ObjectId(0)
    }

    /// Animated frame range, inclusive, at `frame_rate` frames per second.
    pub fn frame_range(&mut self, start_frame: i64, end_frame: i64, frame_rate: f64) -> &mut Self {
        self.archive.range = Some(ArchiveTimeRange {
            start_seconds: start_frame as f64 / frame_rate,
            end_seconds: end_frame as f64 / frame_rate,
            frame_rate: Some(frame_rate),
        });
        self
    }

    /// Animated time span without a recorded frame rate.
    pub fn time_range(&mut self, start_seconds: f64, end_seconds: f64) -> &mut Self {
        self.archive.range = Some(ArchiveTimeRange {
            start_seconds,
            end_seconds,
            frame_rate: None,
        });
        self
    }

    /// Plain grouping object without a schema.
    pub fn add_group(&mut self, parent: ObjectId, name: &str) -> ObjectId {
        self.push(parent, name, None, false, MemoryKind::Group)
    }

    pub fn add_xform(&mut self, parent: ObjectId, name: &str, sample: impl Into<Animated<XformSample>>) -> ObjectId {
        let kind = MemoryKind::Xform(sample.into());
        self.push(parent, name, Some(XFORM_SCHEMA), false, kind)
    }

    pub fn add_locator(&mut self, parent: ObjectId, name: &str, sample: impl Into<Animated<XformSample>>) -> ObjectId {
        let kind = MemoryKind::Xform(sample.into());
        self.push(parent, name, Some(XFORM_SCHEMA), true, kind)
    }

    /// Camera shape. Its own transform is the identity.
    pub fn add_camera(&mut self, parent: ObjectId, name: &str, lens: impl Into<Animated<CameraSample>>) -> ObjectId {
        let kind = MemoryKind::Camera(lens.into());
        self.push(parent, name, Some(CAMERA_SCHEMA), false, kind)
    }

    /// Object with a schema the converter does not handle, e.g. a mesh.
    pub fn add_unsupported(&mut self, parent: ObjectId, name: &str, schema: &str) -> ObjectId {
        self.push(parent, name, Some(schema), false, MemoryKind::Group)
    }

    /// Object whose samples cannot be read.
    pub fn add_broken(&mut self, parent: ObjectId, name: &str, schema: &str, reason: &str) -> ObjectId {
        let kind = MemoryKind::Broken(reason.to_string());
        self.push(parent, name, Some(schema), false, kind)
    }

    fn push(&mut self, parent: ObjectId, name: &str, schema: Option<&str>, is_locator: bool, kind: MemoryKind) -> ObjectId {
        let objects = &mut self.archive.objects;
        let parent_path = &objects[parent.0].full_name;
        let full_name = if parent_path == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent_path, name)
        };
        let id = ObjectId(objects.len());
        objects.push(MemoryObject {
            name: name.to_string(),
            full_name,
            schema: schema.map(str::to_owned),
            is_locator,
            kind,
            children: Vec::new(),
        });
        objects[parent.0].children.push(id);
        id
    }

    pub fn build(self) -> MemoryArchive {
        self.archive
    }
}

impl MemoryArchive {
    fn object(&self, id: ObjectId) -> Result<&MemoryObject> {
        self.objects
            .get(id.0)
            .ok_or_else(|| Error::invalid(format!("unknown object id {}", id.0)))
    }
}

impl ArchiveAccessor for MemoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn top(&self) -> ObjectId {
        ObjectId(0)
    }

    fn describe(&self, id: ObjectId) -> Result<ObjectDescription> {
        let object = self.object(id)?;
        Ok(ObjectDescription {
            name: object.name.clone(),
            full_name: object.full_name.clone(),
            schema: object.schema.clone(),
            is_locator: object.is_locator,
        })
    }

    fn children(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        Ok(self.object(id)?.children.clone())
    }

    fn time_range(&self) -> Option<ArchiveTimeRange> {
        self.range
    }

    fn xform_sample(&self, id: ObjectId, seconds: f64) -> Result<XformSample> {
        let object = self.object(id)?;
        match &object.kind {
            MemoryKind::Xform(sample) => sample.at(seconds),
            MemoryKind::Broken(reason) => Err(Error::schema(&object.full_name, reason)),
            MemoryKind::Group | MemoryKind::Camera(_) => Ok(XformSample::identity()),
        }
    }

    fn camera_sample(&self, id: ObjectId, seconds: f64) -> Result<CameraSample> {
        let object = self.object(id)?;
        match &object.kind {
            MemoryKind::Camera(lens) => lens.at(seconds),
            MemoryKind::Broken(reason) => Err(Error::schema(&object.full_name, reason)),
            _ => Err(Error::schema(&object.full_name, "not a camera")),
        }
    }

    fn supports_concurrent_reads(&self) -> bool {
        true
    }
}
