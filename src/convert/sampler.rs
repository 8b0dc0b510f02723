//! Per-frame sampling of every emitted node.

use rayon::prelude::*;
use tracing::{debug, warn};

use super::context::{RunContext, SAMPLE_END, WALK_END};
use super::resolver::{TransformResolver, WorldSample};
use super::time_grid::TimeGrid;
use super::walker::{NodeIndex, NodeKind, SceneGraph, SkippedObject};
use crate::archive::ArchiveAccessor;
use crate::config::ConverterConfig;
use crate::geom::CameraSample;
use crate::util::{DVec3, Error, Result};

/// Raw per-frame values of one node, in grid order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeTrack {
    pub node: NodeIndex,
    pub frames: Vec<i64>,
    pub translation: Vec<DVec3>,
    /// Degrees, continuity corrected.
    pub rotation: Vec<DVec3>,
    /// Percent.
    pub scale: Vec<DVec3>,
    pub lens: Option<LensTrack>,
}

/// Camera values as stored in the archive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LensTrack {
    pub focal_length: Vec<f64>,
    pub horizontal_aperture: Vec<f64>,
    pub vertical_aperture: Vec<f64>,
}

impl NodeTrack {
    fn new(node: NodeIndex, kind: NodeKind, capacity: usize) -> Self {
        let lens = (kind == NodeKind::Camera).then(|| LensTrack {
            focal_length: Vec::with_capacity(capacity),
            horizontal_aperture: Vec::with_capacity(capacity),
            vertical_aperture: Vec::with_capacity(capacity),
        });
        Self {
            node,
            frames: Vec::with_capacity(capacity),
            translation: Vec::with_capacity(capacity),
            rotation: Vec::with_capacity(capacity),
            scale: Vec::with_capacity(capacity),
            lens,
        }
    }

    /// Rotation expected at the next frame, extrapolated from the last two.
    fn predicted_rotation(&self) -> Option<DVec3> {
        match self.rotation.as_slice() {
            [.., before, last] => Some(*last * 2.0 - *before),
            [last] => Some(*last),
            [] => None,
        }
    }

    fn push(&mut self, sample: NodeFrame, unit_scale: f64) {
        self.frames.push(sample.world.frame);
        self.translation.push(sample.world.translation * unit_scale);
        self.rotation.push(sample.world.rotation);
        self.scale.push(sample.world.scale * 100.0);
        if let (Some(lens), Some(camera)) = (self.lens.as_mut(), sample.camera) {
            lens.focal_length.push(camera.focal_length);
            lens.horizontal_aperture.push(camera.horizontal_aperture);
            lens.vertical_aperture.push(camera.vertical_aperture);
        }
    }
}

/// Result of [`PropertySampler::sample`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sampling {
    /// Tracks of the nodes sampled on every frame, in traversal order.
    pub tracks: Vec<NodeTrack>,
    /// Nodes dropped because a later sample could not be read.
    pub dropped: Vec<SkippedObject>,
}

/// One node at one frame.
struct NodeFrame {
    world: WorldSample,
    camera: Option<CameraSample>,
}

/// Samples every emitted node at every frame of the grid.
pub struct PropertySampler<'a> {
    archive: &'a dyn ArchiveAccessor,
    graph: &'a SceneGraph,
    grid: TimeGrid,
    config: &'a ConverterConfig,
    resolver: TransformResolver<'a>,
}

impl<'a> PropertySampler<'a> {
    pub fn new(archive: &'a dyn ArchiveAccessor, graph: &'a SceneGraph, grid: TimeGrid, config: &'a ConverterConfig) -> Self {
        Self {
            archive,
            graph,
            grid,
            config,
            resolver: TransformResolver::new(archive, graph, grid, config.rotation_order),
        }
    }

    /// Tracks of the emitted nodes, in traversal order.
    ///
    /// Cancellation is checked before every frame. A node whose sample
    /// cannot be read at some frame is dropped and reported; structural
    /// failures and non-finite values abort the run.
    pub fn sample(&self, ctx: &RunContext) -> Result<Sampling> {
        let _span = tracing::info_span!("sample", frames = self.grid.frame_count()).entered();

        let capacity = self.grid.frame_count();
        let mut tracks: Vec<NodeTrack> = self
            .graph
            .emitted()
            .map(|(index, node)| NodeTrack::new(index, node.kind, capacity))
            .collect();
        let mut dropped = Vec::new();

        let pool = self.worker_pool();
        let total = self.grid.frame_count();

        for (done, frame) in self.grid.frames().enumerate() {
            ctx.checkpoint()?;

            let samples: Vec<Result<NodeFrame>> = match &pool {
                Some(pool) => pool.install(|| {
                    tracks
                        .par_iter()
                        .map(|track| self.sample_node(track.node, frame, track.predicted_rotation()))
                        .collect()
                }),
                None => tracks
                    .iter()
                    .map(|track| self.sample_node(track.node, frame, track.predicted_rotation()))
                    .collect(),
            };

            let mut kept = Vec::with_capacity(tracks.len());
            for (mut track, sample) in tracks.drain(..).zip(samples) {
                match sample {
                    Ok(sample) => {
                        track.push(sample, self.config.unit_scale);
                        kept.push(track);
                    }
                    Err(e) if e.is_schema() => {
                        let name = self.graph.nodes[track.node].full_name.clone();
                        warn!(object = %name, frame, "dropping object: {}", e);
                        dropped.push(SkippedObject {
                            name,
                            reason: format!("frame {}: {}", frame, e),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            tracks = kept;

            self.resolver.evict_frame(frame);
            ctx.report_step(WALK_END, SAMPLE_END, done + 1, total, &format!("frame {}", frame));
        }

        debug!(nodes = tracks.len(), dropped = dropped.len(), frames = total, "sampled");
        Ok(Sampling { tracks, dropped })
    }

    /// Worker pool when parallel sampling is enabled and the archive allows it.
    fn worker_pool(&self) -> Option<rayon::ThreadPool> {
        if !self.config.parallel {
            return None;
        }
        if !self.archive.supports_concurrent_reads() {
            debug!("archive serializes reads, sampling sequentially");
            return None;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!("cannot start worker pool, sampling sequentially: {}", e);
                None
            }
        }
    }

    fn sample_node(&self, node: NodeIndex, frame: i64, reference: Option<DVec3>) -> Result<NodeFrame> {
        let entry = &self.graph.nodes[node];
        let fail = |reason: String| Error::invalid(format!("{} at frame {}: {}", entry.full_name, frame, reason));
        // Schema errors stay schema errors so the caller can drop just this node.
        let wrap = |e: Error| if e.is_schema() { e } else { fail(e.to_string()) };

        let world = self.resolver.world_sample(node, frame, reference).map_err(wrap)?;
        if !(world.translation.is_finite() && world.rotation.is_finite() && world.scale.is_finite()) {
            return Err(fail("non-finite transform".into()));
        }

        let camera = if entry.kind == NodeKind::Camera {
            let lens = self
                .archive
                .camera_sample(entry.object, self.grid.seconds(frame))
                .map_err(wrap)?;
            if !lens.is_finite() {
                return Err(fail("non-finite camera values".into()));
            }
            Some(lens)
        } else {
            None
        };

        Ok(NodeFrame { world, camera })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{Animated, MemoryArchive, MemoryArchiveBuilder};
    use crate::convert::walker::SceneWalker;
    use crate::convert::CancellationToken;
    use crate::geom::XformSample;

    fn archive() -> MemoryArchive {
        let mut b = MemoryArchiveBuilder::new("scene");
        b.frame_range(0, 9, 24.0);
        let rig = b.add_xform(
            b.top(),
            "camera1",
            Animated::from_fn(|t| XformSample::from_trs(DVec3::new(t * 24.0, 0.0, 0.0), DVec3::ZERO, DVec3::ONE)),
        );
        b.add_camera(rig, "cameraShape1", Animated::from_fn(|t| CameraSample::with_focal_length(35.0 + t * 24.0)));
        for i in 0..4 {
            b.add_locator(
                b.top(),
                &format!("loc{}", i),
                XformSample::from_trs(DVec3::splat(i as f64), DVec3::ZERO, DVec3::splat(0.5)),
            );
        }
        b.build()
    }

    fn run(archive: &MemoryArchive, config: &ConverterConfig) -> Result<Sampling> {
        let ctx = RunContext::detached();
        let graph = SceneWalker::new(archive, 0.0).walk(&ctx)?;
        let grid = TimeGrid::new(0, 9, 24.0)?;
        PropertySampler::new(archive, &graph, grid, config).sample(&ctx)
    }

    #[test]
    fn test_tracks_follow_the_grid() {
        let mut config = ConverterConfig::default();
        config.unit_scale = 2.0;
        let tracks = run(&archive(), &config).unwrap().tracks;

        // Folded camera plus four locators.
        assert_eq!(tracks.len(), 5);
        let camera = &tracks[0];
        assert_eq!(camera.frames, (0..=9).collect::<Vec<_>>());
        assert!((camera.translation[3].x - 6.0).abs() < 1e-9);
        let lens = camera.lens.as_ref().unwrap();
        assert!((lens.focal_length[9] - 44.0).abs() < 1e-9);
        assert!((lens.horizontal_aperture[0] - 3.6).abs() < 1e-12);

        assert!(tracks[1].lens.is_none());
        assert!((tracks[1].scale[0] - DVec3::splat(50.0)).length() < 1e-9);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let archive = archive();
        let sequential = run(&archive, &ConverterConfig::default()).unwrap();
        let mut config = ConverterConfig::default();
        config.parallel = true;
        config.threads = 3;
        let parallel = run(&archive, &config).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_unreadable_sample_drops_object() {
        let mut b = MemoryArchiveBuilder::new("scene");
        b.frame_range(0, 9, 24.0);
        let flaky = b.add_xform(
            b.top(),
            "flaky",
            Animated::try_from_fn(|t| {
                if t > 0.1 {
                    Err(Error::schema("/flaky", "sample missing"))
                } else {
                    Ok(XformSample::identity())
                }
            }),
        );
        b.add_locator(flaky, "child", XformSample::identity());
        let mut detached = XformSample::identity();
        detached.inherits = false;
        b.add_xform(flaky, "detached", detached);
        b.add_locator(b.top(), "steady", XformSample::identity());

        let sampling = run(&b.build(), &ConverterConfig::default()).unwrap();
        let names: Vec<_> = sampling.dropped.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["/flaky", "/flaky/child"]);
        assert!(sampling.dropped[0].reason.starts_with("frame 3: "), "{}", sampling.dropped[0].reason);
        assert!(sampling.dropped[0].reason.contains("sample missing"));

        // The non-inheriting child and the sibling keep every frame.
        assert_eq!(sampling.tracks.len(), 2);
        assert!(sampling.tracks.iter().all(|t| t.frames.len() == 10));
    }

    #[test]
    fn test_structural_failure_is_format_error() {
        let mut b = MemoryArchiveBuilder::new("scene");
        b.frame_range(0, 9, 24.0);
        b.add_xform(
            b.top(),
            "corrupt",
            Animated::try_from_fn(|t| {
                if t > 0.1 {
                    Err(Error::invalid("child offset past end of stream"))
                } else {
                    Ok(XformSample::identity())
                }
            }),
        );
        let err = run(&b.build(), &ConverterConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidStructure(_)));
        assert!(err.to_string().contains("/corrupt at frame 3"));
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let mut b = MemoryArchiveBuilder::new("scene");
        b.add_xform(
            b.top(),
            "nan",
            Animated::from_fn(|t| XformSample::from_trs(DVec3::new(if t > 0.0 { f64::NAN } else { 0.0 }, 0.0, 0.0), DVec3::ZERO, DVec3::ONE)),
        );
        let err = run(&b.build(), &ConverterConfig::default()).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_cancel_stops_sampling() {
        let archive = archive();
        let graph = SceneWalker::new(&archive, 0.0).walk(&RunContext::detached()).unwrap();
        let grid = TimeGrid::new(0, 9, 24.0).unwrap();
        let config = ConverterConfig::default();

        let token = CancellationToken::new();
        let trigger = token.clone();
        let ctx = RunContext::new(
            token,
            Some(std::sync::Arc::new(move |fraction: f64, _: &str| {
                if fraction > 0.3 {
                    trigger.cancel();
                }
            })),
        );
        let result = PropertySampler::new(&archive, &graph, grid, &config).sample(&ctx);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
