//! Conversion pipeline.
//!
//! - [`SceneWalker`] - Classify the archive hierarchy into a [`SceneGraph`]
//! - [`TransformResolver`] - World matrices and continuous Euler angles
//! - [`PropertySampler`] - Per-frame tracks of every emitted node
//! - [`reduce`] / [`build_outputs`] - Keyframe reduction
//! - [`Converter`] - Runs the stages and writes the script

pub mod context;
pub mod reducer;
pub mod resolver;
pub mod sampler;
pub mod time_grid;
pub mod walker;

pub use context::{CancellationToken, ProgressCallback, RunContext};
pub use reducer::{build_outputs, reduce, AnimatedProperty, Channel, Keyframe, OutputObject, Value};
pub use resolver::{TransformResolver, WorldSample};
pub use sampler::{LensTrack, NodeTrack, PropertySampler, Sampling};
pub use time_grid::TimeGrid;
pub use walker::{NodeIndex, NodeKind, SceneGraph, SceneNode, SceneWalker, SkippedObject};

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::archive::{ArchiveAccessor, OgawaArchive};
use crate::config::ConverterConfig;
use crate::export::{write_script, ExportScene, JsxBackend, ScriptBackend};
use crate::util::{Error, Result};

/// Name used when the archive name has no file stem.
pub const DEFAULT_COMPOSITION_NAME: &str = "Scene";

/// Per-run caller options.
#[derive(Clone, Default)]
pub struct ConvertOptions {
    /// Defaults to the input file stem.
    pub composition_name: Option<String>,
    /// Replaces the archive frame rate; frames are re-derived from it.
    pub frame_rate: Option<f64>,
    /// Frame count from the start frame.
    pub duration: Option<u32>,
    pub progress: Option<ProgressCallback>,
    pub cancel: CancellationToken,
}

impl fmt::Debug for ConvertOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertOptions")
            .field("composition_name", &self.composition_name)
            .field("frame_rate", &self.frame_rate)
            .field("duration", &self.duration)
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Summary of a successful run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConversionReport {
    pub composition_name: String,
    pub output: PathBuf,
    pub grid: TimeGrid,
    pub layers: usize,
    pub keyframes: usize,
    /// Objects left out, with the reason.
    pub skipped: Vec<SkippedObject>,
}

/// Terminal result of [`Converter::convert`].
#[derive(Debug)]
pub enum Outcome {
    Success(ConversionReport),
    InputNotFound(PathBuf),
    FormatError(String),
    WriteError(String),
    Cancelled,
}

impl Outcome {
    /// Map a pipeline error onto the caller-facing outcomes.
    pub fn from_error(err: Error) -> Self {
        match err {
            Error::FileNotFound(path) => Self::InputNotFound(path),
            Error::Write { .. } => Self::WriteError(err.to_string()),
            Error::Cancelled => Self::Cancelled,
            other => Self::FormatError(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn report(&self) -> Option<&ConversionReport> {
        match self {
            Self::Success(report) => Some(report),
            _ => None,
        }
    }
}

impl From<Result<ConversionReport>> for Outcome {
    fn from(result: Result<ConversionReport>) -> Self {
        match result {
            Ok(report) => Self::Success(report),
            Err(err) => Self::from_error(err),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(r) => write!(
                f,
                "wrote {} ({} layers, {} keyframes, {} skipped)",
                r.output.display(),
                r.layers,
                r.keyframes,
                r.skipped.len()
            ),
            Self::InputNotFound(path) => write!(f, "input not found: {}", path.display()),
            Self::FormatError(msg) => write!(f, "cannot convert: {}", msg),
            Self::WriteError(msg) => f.write_str(msg),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Classified hierarchy and frame range of an archive.
#[derive(Clone, Debug)]
pub struct SceneSummary {
    pub grid: TimeGrid,
    pub graph: SceneGraph,
}

/// Runs the conversion pipeline.
pub struct Converter {
    config: ConverterConfig,
    backend: Box<dyn ScriptBackend>,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(ConverterConfig::default())
    }
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Self {
        Self::with_backend(config, Box::new(JsxBackend))
    }

    pub fn with_backend(config: ConverterConfig, backend: Box<dyn ScriptBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn ScriptBackend {
        self.backend.as_ref()
    }

    /// Convert the archive at `input` into a script at `output`.
    pub fn convert(&self, input: &Path, output: &Path, options: &ConvertOptions) -> Outcome {
        let result = time_grid::validate_overrides(options.frame_rate, options.duration)
            .and_then(|()| OgawaArchive::open(input))
            .and_then(|archive| self.run(&archive, output, options));
        log_outcome(result.into())
    }

    /// Convert any archive into a script at `output`.
    pub fn convert_archive(&self, archive: &dyn ArchiveAccessor, output: &Path, options: &ConvertOptions) -> Outcome {
        log_outcome(self.run(archive, output, options).into())
    }

    /// Frame range and classified hierarchy without sampling.
    pub fn scan(&self, archive: &dyn ArchiveAccessor, options: &ConvertOptions) -> Result<SceneSummary> {
        let ctx = RunContext::new(options.cancel.clone(), options.progress.clone());
        self.scan_with(archive, options, &ctx)
    }

    fn scan_with(&self, archive: &dyn ArchiveAccessor, options: &ConvertOptions, ctx: &RunContext) -> Result<SceneSummary> {
        let grid = TimeGrid::resolve(
            archive.time_range(),
            self.config.composition.frame_rate,
            options.frame_rate,
            options.duration,
        )?;
        let graph = SceneWalker::new(archive, grid.seconds(grid.start_frame))
            .collapse_camera_transforms(self.config.collapse_camera_transforms)
            .walk(ctx)?;
        Ok(SceneSummary { grid, graph })
    }

    fn run(&self, archive: &dyn ArchiveAccessor, output: &Path, options: &ConvertOptions) -> Result<ConversionReport> {
        let _span = tracing::info_span!("convert", archive = %archive.name()).entered();
        let ctx = RunContext::new(options.cancel.clone(), options.progress.clone());

        let SceneSummary { grid, graph } = self.scan_with(archive, options, &ctx)?;
        info!(
            start = grid.start_frame,
            end = grid.end_frame,
            fps = grid.frame_rate,
            nodes = graph.nodes.len(),
            "scene scanned"
        );
        if graph.emitted().next().is_none() {
            warn!("no cameras, transforms or locators to convert");
        }

        let Sampling { tracks, dropped } = PropertySampler::new(archive, &graph, grid, &self.config).sample(&ctx)?;
        let objects = build_outputs(&graph, &tracks, &self.config);

        let composition_name = options
            .composition_name
            .clone()
            .unwrap_or_else(|| default_composition_name(archive.name()));
        let scene = ExportScene {
            composition_name,
            grid,
            objects,
            width: self.config.composition.width,
            height: self.config.composition.height,
            pixel_aspect: self.config.composition.pixel_aspect,
            aperture_to_mm: self.config.aperture_units.to_mm(),
            source_name: archive.name().to_string(),
            generator: generator(),
        };
        write_script(self.backend.as_ref(), &scene, output, &ctx)?;

        Ok(ConversionReport {
            layers: scene.objects.len(),
            keyframes: scene.keyframe_count(),
            composition_name: scene.composition_name,
            output: output.to_path_buf(),
            grid,
            skipped: graph.skipped.into_iter().chain(dropped).collect(),
        })
    }
}

fn log_outcome(outcome: Outcome) -> Outcome {
    match &outcome {
        Outcome::Success(report) => info!(
            layers = report.layers,
            keyframes = report.keyframes,
            skipped = report.skipped.len(),
            "conversion finished"
        ),
        Outcome::Cancelled => info!("conversion cancelled"),
        other => warn!("conversion failed: {}", other),
    }
    outcome
}

/// File stem of an archive name, or [`DEFAULT_COMPOSITION_NAME`].
pub fn default_composition_name(archive_name: &str) -> String {
    Path::new(archive_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_COMPOSITION_NAME.to_string())
}

fn generator() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
