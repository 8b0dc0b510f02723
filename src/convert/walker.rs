//! Archive traversal and node classification.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use super::context::{RunContext, WALK_END};
use crate::archive::{ArchiveAccessor, ObjectDescription, ObjectId};
use crate::geom::{CAMERA_SCHEMA, XFORM_SCHEMA};
use crate::util::{Error, Result};

/// Position of a node in [`SceneGraph::nodes`].
pub type NodeIndex = usize;

/// What a scene object converts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Camera,
    TransformNull,
    Locator,
    Unsupported,
}

impl NodeKind {
    /// Classify an object from its schema.
    pub fn classify(desc: &ObjectDescription) -> Self {
        match desc.schema.as_deref() {
            Some(CAMERA_SCHEMA) => Self::Camera,
            Some(XFORM_SCHEMA) if desc.is_locator => Self::Locator,
            Some(XFORM_SCHEMA) => Self::TransformNull,
            _ => Self::Unsupported,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::TransformNull => "transform",
            Self::Locator => "locator",
            Self::Unsupported => "unsupported",
        }
    }
}

/// A convertible archive object.
#[derive(Clone, Debug)]
pub struct SceneNode {
    /// Name used for the layer before collision suffixes.
    pub name: String,
    pub full_name: String,
    /// Unique layer name; empty for nodes that are not emitted.
    pub target_name: String,
    pub kind: NodeKind,
    /// Nearest retained ancestor.
    pub parent: Option<NodeIndex>,
    pub object: ObjectId,
    /// False for a transform folded into its camera.
    pub emitted: bool,
}

/// An archive object left out of the conversion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedObject {
    pub name: String,
    pub reason: String,
}

/// Retained nodes in pre-order, parents before children.
#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    pub nodes: Vec<SceneNode>,
    pub skipped: Vec<SkippedObject>,
}

impl SceneGraph {
    /// Nodes that become layers, in traversal order.
    pub fn emitted(&self) -> impl Iterator<Item = (NodeIndex, &SceneNode)> {
        self.nodes.iter().enumerate().filter(|(_, n)| n.emitted)
    }

    fn child_count(&self, index: NodeIndex) -> usize {
        self.nodes.iter().filter(|n| n.parent == Some(index)).count()
    }
}

/// Walks an archive hierarchy into a [`SceneGraph`].
pub struct SceneWalker<'a> {
    archive: &'a dyn ArchiveAccessor,
    probe_seconds: f64,
    collapse_camera_transforms: bool,
}

impl<'a> SceneWalker<'a> {
    /// `probe_seconds` is the time every candidate is test-sampled at.
    pub fn new(archive: &'a dyn ArchiveAccessor, probe_seconds: f64) -> Self {
        Self {
            archive,
            probe_seconds,
            collapse_camera_transforms: true,
        }
    }

    pub fn collapse_camera_transforms(mut self, enabled: bool) -> Self {
        self.collapse_camera_transforms = enabled;
        self
    }

    /// Traverse from the archive's top object.
    ///
    /// Only an unreadable top object is an error; any other object that
    /// cannot be read is recorded in [`SceneGraph::skipped`].
    pub fn walk(&self, ctx: &RunContext) -> Result<SceneGraph> {
        let _span = tracing::info_span!("walk", archive = %self.archive.name()).entered();
        ctx.checkpoint()?;

        let top = self.archive.top();
        let top_children = self
            .archive
            .children(top)
            .map_err(|e| Error::invalid(format!("cannot read archive root: {}", e)))?;

        let mut graph = SceneGraph::default();
        // (object, nearest retained ancestor); reversed so pops come out in stored order
        let mut stack: Vec<(ObjectId, Option<NodeIndex>)> =
            top_children.into_iter().rev().map(|id| (id, None)).collect();

        while let Some((id, parent)) = stack.pop() {
            let retained = self.visit(&mut graph, id, parent);
            let attach = retained.or(parent);

            match self.archive.children(id) {
                Ok(children) => stack.extend(children.into_iter().rev().map(|c| (c, attach))),
                Err(e) => self.skip(&mut graph, object_label(self.archive, id), format!("children unreadable: {}", e)),
            }
        }

        if self.collapse_camera_transforms {
            fold_cameras(&mut graph);
        }
        assign_target_names(&mut graph);

        debug!(
            nodes = graph.nodes.len(),
            skipped = graph.skipped.len(),
            "walked hierarchy"
        );
        ctx.report(WALK_END, "scanned hierarchy");
        Ok(graph)
    }

    /// Classify and probe one object; returns its index when retained.
    fn visit(&self, graph: &mut SceneGraph, id: ObjectId, parent: Option<NodeIndex>) -> Option<NodeIndex> {
        let desc = match self.archive.describe(id) {
            Ok(desc) => desc,
            Err(e) => {
                self.skip(graph, format!("#{}", id.0), e.to_string());
                return None;
            }
        };

        let kind = NodeKind::classify(&desc);
        if kind == NodeKind::Unsupported {
            let reason = match &desc.schema {
                Some(schema) => format!("unsupported schema {}", schema),
                None => "no schema".to_string(),
            };
            self.skip(graph, desc.full_name, reason);
            return None;
        }

        if let Err(e) = self.probe(id, kind) {
            self.skip(graph, desc.full_name, e.to_string());
            return None;
        }

        graph.nodes.push(SceneNode {
            name: desc.name,
            full_name: desc.full_name,
            target_name: String::new(),
            kind,
            parent,
            object: id,
            emitted: true,
        });
        Some(graph.nodes.len() - 1)
    }

    fn probe(&self, id: ObjectId, kind: NodeKind) -> Result<()> {
        self.archive.xform_sample(id, self.probe_seconds)?;
        if kind == NodeKind::Camera {
            self.archive.camera_sample(id, self.probe_seconds)?;
        }
        Ok(())
    }

    fn skip(&self, graph: &mut SceneGraph, name: String, reason: String) {
        warn!(object = %name, %reason, "skipping object");
        graph.skipped.push(SkippedObject { name, reason });
    }
}

fn object_label(archive: &dyn ArchiveAccessor, id: ObjectId) -> String {
    archive
        .describe(id)
        .map(|d| d.full_name)
        .unwrap_or_else(|_| format!("#{}", id.0))
}

/// A camera that is the only retained child of a transform takes the
/// transform's name; the transform stays for resolution but is not emitted.
fn fold_cameras(graph: &mut SceneGraph) {
    for index in 0..graph.nodes.len() {
        if graph.nodes[index].kind != NodeKind::Camera {
            continue;
        }
        let Some(parent) = graph.nodes[index].parent else {
            continue;
        };
        if graph.nodes[parent].kind != NodeKind::TransformNull || graph.child_count(parent) != 1 {
            continue;
        }
        let name = graph.nodes[parent].name.clone();
        graph.nodes[parent].emitted = false;
        graph.nodes[index].name = name;
    }
}

/// Give every emitted node a unique name, suffixing `_2`, `_3`, ... in order.
fn assign_target_names(graph: &mut SceneGraph) {
    let mut used = HashSet::new();
    for node in graph.nodes.iter_mut().filter(|n| n.emitted) {
        let mut candidate = node.name.clone();
        let mut suffix = 2;
        while used.contains(&candidate) {
            candidate = format!("{}_{}", node.name, suffix);
            suffix += 1;
        }
        used.insert(candidate.clone());
        node.target_name = candidate;
    }
}
