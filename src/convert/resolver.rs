//! World-space transform resolution.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::time_grid::TimeGrid;
use super::walker::{NodeIndex, SceneGraph};
use crate::archive::ArchiveAccessor;
use crate::util::{decompose_affine, DMat4, DVec3, Error, Result, RotationOrder};

/// Resolved pose of one node at one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldSample {
    pub node: NodeIndex,
    pub frame: i64,
    pub translation: DVec3,
    /// Euler angles in degrees, in the resolver's rotation order.
    pub rotation: DVec3,
    pub scale: DVec3,
}

/// Composes local samples up the hierarchy, memoized per (node, frame).
pub struct TransformResolver<'a> {
    archive: &'a dyn ArchiveAccessor,
    graph: &'a SceneGraph,
    grid: TimeGrid,
    order: RotationOrder,
    cache: RwLock<HashMap<(NodeIndex, i64), DMat4>>,
}

impl<'a> TransformResolver<'a> {
    pub fn new(archive: &'a dyn ArchiveAccessor, graph: &'a SceneGraph, grid: TimeGrid, order: RotationOrder) -> Self {
        Self {
            archive,
            graph,
            grid,
            order,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Local-to-world matrix of `node` at `frame`.
    ///
    /// The parent is resolved first unless the node's sample does not
    /// inherit.
    pub fn world_matrix(&self, node: NodeIndex, frame: i64) -> Result<DMat4> {
        if let Some(m) = self.cache.read().get(&(node, frame)) {
            return Ok(*m);
        }

        let entry = self
            .graph
            .nodes
            .get(node)
            .ok_or_else(|| Error::invalid(format!("unknown scene node {}", node)))?;
        let sample = self.archive.xform_sample(entry.object, self.grid.seconds(frame))?;
        let local = sample.matrix();
        let world = match entry.parent {
            Some(parent) if sample.inherits => self.world_matrix(parent, frame)? * local,
            _ => local,
        };

        self.cache.write().insert((node, frame), world);
        Ok(world)
    }

    /// World pose of `node` at `frame`.
    ///
    /// `reference` is the rotation expected at this frame, usually
    /// extrapolated from the frames before it; the returned angles are the
    /// equivalent representation nearest to it. Without a reference the raw
    /// decomposition is used.
    pub fn world_sample(&self, node: NodeIndex, frame: i64, reference: Option<DVec3>) -> Result<WorldSample> {
        let parts = decompose_affine(&self.world_matrix(node, frame)?);
        let rotation = match reference {
            Some(reference) => self.order.decompose_towards(&parts.rotation, reference),
            None => self.order.decompose(&parts.rotation),
        };
        Ok(WorldSample {
            node,
            frame,
            translation: parts.translation,
            rotation,
            scale: parts.scale,
        })
    }

    /// Drop memoized matrices of a finished frame.
    pub fn evict_frame(&self, frame: i64) {
        self.cache.write().retain(|&(_, f), _| f != frame);
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}
