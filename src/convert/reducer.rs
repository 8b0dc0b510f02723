//! Keyframe reduction and the output object model.

use serde::Serialize;

use super::sampler::NodeTrack;
use super::walker::{NodeKind, SceneGraph};
use crate::config::{ConverterConfig, Tolerances};
use crate::util::DVec3;

/// Animatable layer property, in emission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Channel {
    Position,
    Scale,
    XRotation,
    YRotation,
    ZRotation,
    HorizontalAperture,
    VerticalAperture,
    FocalLength,
}

impl Channel {
    /// Property name in the target application.
    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "Position",
            Self::Scale => "Scale",
            Self::XRotation => "X Rotation",
            Self::YRotation => "Y Rotation",
            Self::ZRotation => "Z Rotation",
            Self::HorizontalAperture => "Horizontal Aperture",
            Self::VerticalAperture => "Vertical Aperture",
            Self::FocalLength => "Focal Length",
        }
    }

    /// Lens channels are camera options, not layer transform properties.
    pub fn is_lens(self) -> bool {
        matches!(self, Self::HorizontalAperture | Self::VerticalAperture | Self::FocalLength)
    }
}

/// Keyframe value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(DVec3),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe<T> {
    pub frame: i64,
    pub value: T,
}

/// Retained keyframes of one channel, frames strictly increasing.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimatedProperty {
    pub channel: Channel,
    pub keyframes: Vec<Keyframe<Value>>,
}

/// A layer of the emitted script.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputObject {
    pub target_name: String,
    pub kind: NodeKind,
    pub properties: Vec<AnimatedProperty>,
}

impl OutputObject {
    pub fn keyframe_count(&self) -> usize {
        self.properties.iter().map(|p| p.keyframes.len()).sum()
    }

    pub fn property(&self, channel: Channel) -> Option<&AnimatedProperty> {
        self.properties.iter().find(|p| p.channel == channel)
    }
}

/// Reduce a sampled channel to its keyframes.
///
/// The first and last samples are always kept. An interior sample is kept
/// when `differs(last_kept, sample)`. With `keep_hold_ends`, the sample
/// right before each kept change is kept as well.
pub fn reduce<T: Copy>(frames: &[i64], values: &[T], differs: impl Fn(&T, &T) -> bool, keep_hold_ends: bool) -> Vec<Keyframe<T>> {
    let n = frames.len().min(values.len());
    if n == 0 {
        return Vec::new();
    }

    let key = |i: usize| Keyframe {
        frame: frames[i],
        value: values[i],
    };
    let mut kept = vec![key(0)];
    let mut last = 0;

    for i in 1..n {
        let is_end = i == n - 1;
        if !is_end && !differs(&values[last], &values[i]) {
            continue;
        }
        if keep_hold_ends && i - 1 > last && (is_end || differs(&values[last], &values[i])) {
            kept.push(key(i - 1));
        }
        kept.push(key(i));
        last = i;
    }
    kept
}

fn scalar_differs(eps: f64) -> impl Fn(&f64, &f64) -> bool {
    move |a, b| (a - b).abs() > eps
}

fn vector_differs(eps: f64) -> impl Fn(&DVec3, &DVec3) -> bool {
    move |a, b| (*a - *b).abs().max_element() > eps
}

fn scalar_property(channel: Channel, frames: &[i64], values: &[f64], eps: f64, hold: bool) -> AnimatedProperty {
    let keyframes = reduce(frames, values, scalar_differs(eps), hold)
        .into_iter()
        .map(|k| Keyframe {
            frame: k.frame,
            value: Value::Scalar(k.value),
        })
        .collect();
    AnimatedProperty { channel, keyframes }
}

fn vector_property(channel: Channel, frames: &[i64], values: &[DVec3], eps: f64, hold: bool) -> AnimatedProperty {
    let keyframes = reduce(frames, values, vector_differs(eps), hold)
        .into_iter()
        .map(|k| Keyframe {
            frame: k.frame,
            value: Value::Vector(k.value),
        })
        .collect();
    AnimatedProperty { channel, keyframes }
}

/// Reduce every channel of one node.
///
/// Cameras carry no scale channel.
pub fn reduce_track(track: &NodeTrack, kind: NodeKind, tolerances: &Tolerances, hold: bool) -> Vec<AnimatedProperty> {
    let frames = &track.frames;
    let mut properties = vec![vector_property(Channel::Position, frames, &track.translation, tolerances.position, hold)];
    if kind != NodeKind::Camera {
        properties.push(vector_property(Channel::Scale, frames, &track.scale, tolerances.scale, hold));
    }

    let axis = |pick: fn(&DVec3) -> f64| track.rotation.iter().map(pick).collect::<Vec<_>>();
    properties.push(scalar_property(Channel::XRotation, frames, &axis(|v| v.x), tolerances.rotation, hold));
    properties.push(scalar_property(Channel::YRotation, frames, &axis(|v| v.y), tolerances.rotation, hold));
    properties.push(scalar_property(Channel::ZRotation, frames, &axis(|v| v.z), tolerances.rotation, hold));

    if let Some(lens) = &track.lens {
        let eps = tolerances.camera;
        properties.push(scalar_property(Channel::HorizontalAperture, frames, &lens.horizontal_aperture, eps, hold));
        properties.push(scalar_property(Channel::VerticalAperture, frames, &lens.vertical_aperture, eps, hold));
        properties.push(scalar_property(Channel::FocalLength, frames, &lens.focal_length, eps, hold));
    }
    properties
}

/// Output objects for all sampled tracks, in traversal order.
pub fn build_outputs(graph: &SceneGraph, tracks: &[NodeTrack], config: &ConverterConfig) -> Vec<OutputObject> {
    let _span = tracing::info_span!("reduce", tracks = tracks.len()).entered();
    tracks
        .iter()
        .map(|track| {
            let node = &graph.nodes[track.node];
            OutputObject {
                target_name: node.target_name.clone(),
                kind: node.kind,
                properties: reduce_track(track, node.kind, &config.tolerances, config.keep_hold_ends),
            }
        })
        .collect()
}
