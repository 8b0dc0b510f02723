//! Script output.
//!
//! A [`ScriptBackend`] renders an [`ExportScene`] into one script grammar;
//! [`write_script`] drives a backend into an atomically written file.

mod atomic;
mod jsx;

pub use atomic::write_atomic;
pub use jsx::{format_number, js_string, JsxBackend};

use std::io::{self, Write};
use std::path::Path;

use crate::convert::context::{RunContext, SAMPLE_END};
use crate::convert::{OutputObject, TimeGrid};
use crate::util::{Error, Result};

/// Everything a backend needs to render one script.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportScene {
    pub composition_name: String,
    pub grid: TimeGrid,
    /// Layers in traversal order.
    pub objects: Vec<OutputObject>,
    pub width: u32,
    pub height: u32,
    pub pixel_aspect: f64,
    /// Factor from the stored aperture unit to millimeters.
    pub aperture_to_mm: f64,
    /// Archive the scene was read from.
    pub source_name: String,
    /// Generator name and version for the script header.
    pub generator: String,
}

impl ExportScene {
    pub fn keyframe_count(&self) -> usize {
        self.objects.iter().map(OutputObject::keyframe_count).sum()
    }
}

/// A target script grammar.
pub trait ScriptBackend: Send + Sync {
    fn name(&self) -> &str;

    /// File extension without the dot.
    fn extension(&self) -> &str;

    /// Composition setup and shared helpers.
    fn write_header(&self, scene: &ExportScene, out: &mut dyn Write) -> io::Result<()>;

    /// One layer and its keyframes.
    fn write_object(&self, scene: &ExportScene, object: &OutputObject, out: &mut dyn Write) -> io::Result<()>;

    fn write_footer(&self, scene: &ExportScene, out: &mut dyn Write) -> io::Result<()>;

    /// Render the whole script.
    fn render(&self, scene: &ExportScene, out: &mut dyn Write) -> io::Result<()> {
        self.write_header(scene, out)?;
        for object in &scene.objects {
            self.write_object(scene, object, out)?;
        }
        self.write_footer(scene, out)
    }
}

/// Render `scene` with `backend` into `path`.
///
/// Cancellation is checked between objects; a cancelled or failed run
/// leaves no file at `path`.
pub fn write_script(backend: &dyn ScriptBackend, scene: &ExportScene, path: &Path, ctx: &RunContext) -> Result<()> {
    let _span = tracing::info_span!("emit", backend = backend.name(), path = %path.display()).entered();
    let io_err = |e: io::Error| Error::write(path, e);

    write_atomic(path, |out| {
        backend.write_header(scene, out).map_err(io_err)?;
        let total = scene.objects.len();
        for (done, object) in scene.objects.iter().enumerate() {
            ctx.checkpoint()?;
            backend.write_object(scene, object, out).map_err(io_err)?;
            ctx.report_step(SAMPLE_END, 1.0, done + 1, total, &format!("wrote {}", object.target_name));
        }
        ctx.checkpoint()?;
        backend.write_footer(scene, out).map_err(io_err)
    })?;

    ctx.report(1.0, "done");
    tracing::info!(path = %path.display(), layers = scene.objects.len(), "script written");
    Ok(())
}
