//! Xform (transform) samples.
//!
//! An Xform stores an ordered list of operations (`.ops`, one code per op)
//! and a flat list of doubles (`.vals`) that the operations consume in order.

use smallvec::SmallVec;

use crate::util::{DMat4, DVec3, Error, Result};

/// Xform schema identifier.
pub const XFORM_SCHEMA: &str = "AbcGeom_Xform_v3";

/// Transform operation type, the upper nibble of an op code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XformOpType {
    Scale,
    Translate,
    /// Axis and angle
    Rotate,
    Matrix,
    RotateX,
    RotateY,
    RotateZ,
}

impl XformOpType {
    /// Decode an op code. The lower nibble is an authoring hint and is ignored.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code >> 4 {
            0 => Self::Scale,
            1 => Self::Translate,
            2 => Self::Rotate,
            3 => Self::Matrix,
            4 => Self::RotateX,
            5 => Self::RotateY,
            6 => Self::RotateZ,
            _ => return None,
        })
    }

    /// Number of doubles consumed from `.vals`.
    pub const fn num_values(self) -> usize {
        match self {
            Self::Scale | Self::Translate => 3,
            Self::Rotate => 4,
            Self::Matrix => 16,
            Self::RotateX | Self::RotateY | Self::RotateZ => 1,
        }
    }
}

/// A single transform operation. Angles are in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum XformOp {
    Scale(DVec3),
    Translate(DVec3),
    Rotate { axis: DVec3, degrees: f64 },
    RotateX(f64),
    RotateY(f64),
    RotateZ(f64),
    Matrix(DMat4),
}

impl XformOp {
    fn from_values(op_type: XformOpType, v: &[f64]) -> Self {
        match op_type {
            XformOpType::Scale => Self::Scale(DVec3::new(v[0], v[1], v[2])),
            XformOpType::Translate => Self::Translate(DVec3::new(v[0], v[1], v[2])),
            XformOpType::Rotate => Self::Rotate {
                axis: DVec3::new(v[0], v[1], v[2]),
                degrees: v[3],
            },
            XformOpType::RotateX => Self::RotateX(v[0]),
            XformOpType::RotateY => Self::RotateY(v[0]),
            XformOpType::RotateZ => Self::RotateZ(v[0]),
            XformOpType::Matrix => {
                // Stored row-major for row vectors; read as columns this is
                // the column-vector matrix, translation in v[12..15].
                let mut cols = [0.0; 16];
                cols.copy_from_slice(&v[..16]);
                Self::Matrix(DMat4::from_cols_array(&cols))
            }
        }
    }

    /// Column-vector matrix of this operation.
    pub fn matrix(&self) -> DMat4 {
        match *self {
            Self::Scale(s) => DMat4::from_scale(s),
            Self::Translate(t) => DMat4::from_translation(t),
            Self::Rotate { axis, degrees } => {
                let axis = axis.normalize_or_zero();
                if axis == DVec3::ZERO {
                    DMat4::IDENTITY
                } else {
                    DMat4::from_axis_angle(axis, degrees.to_radians())
                }
            }
            Self::RotateX(a) => DMat4::from_rotation_x(a.to_radians()),
            Self::RotateY(a) => DMat4::from_rotation_y(a.to_radians()),
            Self::RotateZ(a) => DMat4::from_rotation_z(a.to_radians()),
            Self::Matrix(m) => m,
        }
    }
}

/// Local transform of an object at one time.
#[derive(Clone, Debug, PartialEq)]
pub struct XformSample {
    /// Transform operations in order.
    pub ops: SmallVec<[XformOp; 4]>,
    /// Whether this xform composes with its parent.
    pub inherits: bool,
}

impl Default for XformSample {
    fn default() -> Self {
        Self {
            ops: SmallVec::new(),
            inherits: true,
        }
    }
}

impl XformSample {
    /// Identity transform that inherits its parent.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Single translate/rotate/scale sample, applied scale first.
    pub fn from_trs(translation: DVec3, rotation_degrees: DVec3, scale: DVec3) -> Self {
        let mut sample = Self::identity();
        sample.ops.push(XformOp::Translate(translation));
        sample.ops.push(XformOp::RotateZ(rotation_degrees.z));
        sample.ops.push(XformOp::RotateY(rotation_degrees.y));
        sample.ops.push(XformOp::RotateX(rotation_degrees.x));
        sample.ops.push(XformOp::Scale(scale));
        sample
    }

    /// Decode `.ops` codes against the `.vals` doubles.
    pub fn decode(codes: &[u8], vals: &[f64], inherits: bool) -> Result<Self> {
        let mut ops = SmallVec::with_capacity(codes.len());
        let mut rest = vals;
        for &code in codes {
            let op_type = XformOpType::from_code(code)
                .ok_or_else(|| Error::invalid(format!("unknown xform op code 0x{:02x}", code)))?;
            let n = op_type.num_values();
            if rest.len() < n {
                return Err(Error::invalid(format!(
                    "xform op {:?} needs {} values, {} left",
                    op_type,
                    n,
                    rest.len()
                )));
            }
            let (head, tail) = rest.split_at(n);
            ops.push(XformOp::from_values(op_type, head));
            rest = tail;
        }
        Ok(Self { ops, inherits })
    }

    /// Compose the operations into the local-to-parent matrix.
    pub fn matrix(&self) -> DMat4 {
        self.ops
            .iter()
            .fold(DMat4::IDENTITY, |result, op| result * op.matrix())
    }
}
