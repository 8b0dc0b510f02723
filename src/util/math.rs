//! Math type re-exports and transform decomposition.
//!
//! All scene math runs in double precision on `glam`'s `D*` types. The
//! column-vector convention applies throughout: `world = parent * local`.
//!
//! Euler angles are always stored as a [`DVec3`] whose `x`, `y` and `z`
//! components are the angles about the X, Y and Z axes, in degrees. The
//! [`RotationOrder`] only decides how those three rotations are chained.

pub use glam::{DMat3, DMat4, DQuat, DVec3};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chrono type - time value (seconds).
pub type Chrono = f64;

/// Below this the Euler decomposition treats the middle axis as locked.
const GIMBAL_EPSILON: f64 = 1e-9;

/// Below this a basis column is treated as collapsed.
const SCALE_EPSILON: f64 = 1e-12;

/// Order in which the three axis rotations are applied.
///
/// `Xyz` applies X first, then Y, then Z, i.e. `R = Rz * Ry * Rx`. This is the
/// order used by After Effects' separate X/Y/Z rotation properties and by
/// Maya's default `xyz` rotate order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationOrder {
    #[default]
    Xyz,
    Xzy,
    Yxz,
    Yzx,
    Zxy,
    Zyx,
}

impl RotationOrder {
    /// All supported orders.
    pub const ALL: [RotationOrder; 6] = [
        Self::Xyz,
        Self::Xzy,
        Self::Yxz,
        Self::Yzx,
        Self::Zxy,
        Self::Zyx,
    ];

    /// Axis indices in application order (0 = X, 1 = Y, 2 = Z).
    pub const fn axes(self) -> [usize; 3] {
        match self {
            Self::Xyz => [0, 1, 2],
            Self::Xzy => [0, 2, 1],
            Self::Yxz => [1, 0, 2],
            Self::Yzx => [1, 2, 0],
            Self::Zxy => [2, 0, 1],
            Self::Zyx => [2, 1, 0],
        }
    }

    /// Odd orders are the ones whose second axis is not the cyclic successor of the first.
    #[inline]
    fn is_odd(self) -> bool {
        let [i, j, _] = self.axes();
        j != (i + 1) % 3
    }

    /// Build a rotation matrix from Euler angles in degrees.
    pub fn compose(self, degrees: DVec3) -> DMat3 {
        let [i, j, k] = self.axes();
        axis_rotation(k, degrees[k]) * axis_rotation(j, degrees[j]) * axis_rotation(i, degrees[i])
    }

    /// Extract Euler angles (degrees) from an orthonormal rotation matrix.
    ///
    /// The middle angle is returned in [-90, 90]; the outer angles in
    /// (-180, 180]. At gimbal lock the third angle is zero.
    pub fn decompose(self, m: &DMat3) -> DVec3 {
        let [i, j, k] = self.axes();
        let at = |row: usize, col: usize| m.col(col)[row];

        let cy = self.middle_cosine(m);
        let (a, b, c) = if cy > GIMBAL_EPSILON {
            (
                at(k, j).atan2(at(k, k)),
                (-at(k, i)).atan2(cy),
                at(j, i).atan2(at(i, i)),
            )
        } else {
            ((-at(j, k)).atan2(at(j, j)), (-at(k, i)).atan2(cy), 0.0)
        };
        let sign = if self.is_odd() { -1.0 } else { 1.0 };

        let mut out = DVec3::ZERO;
        out[i] = (sign * a).to_degrees();
        out[j] = (sign * b).to_degrees();
        out[k] = (sign * c).to_degrees();
        out
    }

    /// Cosine of the middle angle of `m`.
    fn middle_cosine(self, m: &DMat3) -> f64 {
        let [i, j, _] = self.axes();
        m.col(i)[i].hypot(m.col(i)[j])
    }

    /// The other Euler triple describing the same rotation:
    /// outer angles +180, middle angle mirrored about 90.
    pub fn flip(self, degrees: DVec3) -> DVec3 {
        let [i, j, k] = self.axes();
        let mut out = degrees;
        out[i] += 180.0;
        out[j] = 180.0 - degrees[j];
        out[k] += 180.0;
        out
    }

    /// Pick the representation of `raw` closest to `previous`.
    ///
    /// Candidates are `raw` and its flip, each with every component shifted
    /// by whole turns towards `previous`.
    pub fn closest_to(self, raw: DVec3, previous: DVec3) -> DVec3 {
        let direct = unwrap_towards(raw, previous);
        let flipped = unwrap_towards(self.flip(raw), previous);
        if direct.distance_squared(previous) <= flipped.distance_squared(previous) {
            direct
        } else {
            flipped
        }
    }

    /// Euler angles of `m` nearest to `reference`.
    ///
    /// Away from gimbal lock this is [`closest_to`](Self::closest_to) on the
    /// raw decomposition. At lock only the sum or difference of the outer
    /// angles is fixed by `m`; the pair on that line nearest to `reference`
    /// is returned.
    pub fn decompose_towards(self, m: &DMat3, reference: DVec3) -> DVec3 {
        let raw = self.decompose(m);
        if self.middle_cosine(m) > GIMBAL_EPSILON {
            return self.closest_to(raw, reference);
        }

        let [i, j, k] = self.axes();
        let mut out = unwrap_towards(raw, reference);
        let middle = out[j];
        // First angle that reproduces `m` once the other two are fixed.
        let solve_first = |third: f64| {
            let rest = axis_rotation(j, middle).transpose() * axis_rotation(k, third).transpose() * *m;
            let (p, q) = ((i + 1) % 3, (i + 2) % 3);
            rest.col(p)[q].atan2(rest.col(p)[p]).to_degrees()
        };

        // Along the lock line the first angle moves by +-1 per degree of the third.
        let first = unwrap_angle(solve_first(reference[k]), reference[i]);
        let slope = unwrap_angle(solve_first(reference[k] + 1.0) - first, 0.0).signum();
        let offset = first - reference[i];

        out[k] = reference[k] - slope * offset / 2.0;
        out[i] = unwrap_angle(solve_first(out[k]), reference[i]);
        out
    }

    /// Lowercase name as used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xyz => "xyz",
            Self::Xzy => "xzy",
            Self::Yxz => "yxz",
            Self::Yzx => "yzx",
            Self::Zxy => "zxy",
            Self::Zyx => "zyx",
        }
    }
}

impl fmt::Display for RotationOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rotation about a principal axis.
fn axis_rotation(axis: usize, degrees: f64) -> DMat3 {
    let radians = degrees.to_radians();
    match axis {
        0 => DMat3::from_rotation_x(radians),
        1 => DMat3::from_rotation_y(radians),
        _ => DMat3::from_rotation_z(radians),
    }
}

/// Shift each angle by whole turns so it lands within 180 degrees of `target`.
pub fn unwrap_towards(angles: DVec3, target: DVec3) -> DVec3 {
    let turns = ((target - angles) / 360.0).round();
    angles + turns * 360.0
}

fn unwrap_angle(angle: f64, target: f64) -> f64 {
    angle + ((target - angle) / 360.0).round() * 360.0
}

/// Translation, rotation and scale of an affine matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decomposed {
    pub translation: DVec3,
    /// Orthonormal rotation basis.
    pub rotation: DMat3,
    pub scale: DVec3,
}

/// Split an affine transform into translation, rotation and scale.
///
/// Shear is discarded by Gram-Schmidt orthonormalization of the basis. A
/// mirrored basis (negative determinant) is reported as a negative X scale.
pub fn decompose_affine(m: &DMat4) -> Decomposed {
    let translation = m.w_axis.truncate();
    let mut x = m.x_axis.truncate();
    let y = m.y_axis.truncate();
    let z = m.z_axis.truncate();

    let mut scale = DVec3::new(x.length(), y.length(), z.length());
    if x.dot(y.cross(z)) < 0.0 {
        scale.x = -scale.x;
        x = -x;
    }

    let x_axis = normalize_or(x, DVec3::X);
    let y_axis = normalize_or(y - x_axis * x_axis.dot(y), DVec3::Y);
    let z_axis = x_axis.cross(y_axis);

    Decomposed {
        translation,
        rotation: DMat3::from_cols(x_axis, y_axis, z_axis),
        scale,
    }
}

fn normalize_or(v: DVec3, fallback: DVec3) -> DVec3 {
    let len = v.length();
    if len > SCALE_EPSILON {
        v / len
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_mat3_eq(a: &DMat3, b: &DMat3) {
        let (a, b) = (a.to_cols_array(), b.to_cols_array());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_xyz_matches_chained_axes() {
        let m = RotationOrder::Xyz.compose(DVec3::new(30.0, 0.0, 0.0));
        assert_mat3_eq(&m, &DMat3::from_rotation_x(30f64.to_radians()));

        let angles = DVec3::new(10.0, 20.0, 30.0);
        let expected = DMat3::from_rotation_z(30f64.to_radians())
            * DMat3::from_rotation_y(20f64.to_radians())
            * DMat3::from_rotation_x(10f64.to_radians());
        assert_mat3_eq(&RotationOrder::Xyz.compose(angles), &expected);
    }

    #[test]
    fn test_decompose_round_trip_all_orders() {
        let angles = DVec3::new(37.0, -52.0, 121.0);
        for order in RotationOrder::ALL {
            let m = order.compose(angles);
            let back = order.decompose(&m);
            assert_mat3_eq(&order.compose(back), &m);
        }
    }

    #[test]
    fn test_decompose_recovers_angles_in_range() {
        for order in RotationOrder::ALL {
            let [i, j, k] = order.axes();
            let mut angles = DVec3::ZERO;
            angles[i] = 25.0;
            angles[j] = -40.0;
            angles[k] = 75.0;
            let back = order.decompose(&order.compose(angles));
            assert!((back - angles).abs().max_element() < 1e-9, "{order}: {back:?}");
        }
    }

    #[test]
    fn test_flip_is_same_rotation() {
        let angles = DVec3::new(12.0, 64.0, -33.0);
        for order in RotationOrder::ALL {
            let flipped = order.flip(angles);
            assert_mat3_eq(&order.compose(flipped), &order.compose(angles));
        }
    }

    #[test]
    fn test_gimbal_lock_decomposes() {
        let m = RotationOrder::Xyz.compose(DVec3::new(20.0, 90.0, 0.0));
        let back = RotationOrder::Xyz.decompose(&m);
        assert!((back.y - 90.0).abs() < 1e-6);
        assert_mat3_eq(&RotationOrder::Xyz.compose(back), &m);
    }

    fn locked_angles(order: RotationOrder, first: f64, middle: f64, third: f64) -> DVec3 {
        let [i, j, k] = order.axes();
        let mut angles = DVec3::ZERO;
        angles[i] = first;
        angles[j] = middle;
        angles[k] = third;
        angles
    }

    #[test]
    fn test_decompose_towards_at_lock_keeps_reference() {
        for order in RotationOrder::ALL {
            for middle in [90.0, -90.0] {
                let angles = locked_angles(order, 40.0, middle, 10.0);
                let m = order.compose(angles);
                let back = order.decompose_towards(&m, angles);
                assert!((back - angles).abs().max_element() < 1e-6, "{order} {middle}: {back:?}");
            }
        }
    }

    #[test]
    fn test_decompose_towards_at_lock_splits_the_difference() {
        for order in RotationOrder::ALL {
            let m = order.compose(locked_angles(order, 40.0, 90.0, 10.0));
            let reference = locked_angles(order, 36.0, 88.0, 14.0);
            let back = order.decompose_towards(&m, reference);
            assert_mat3_eq(&order.compose(back), &m);
            assert!((back - reference).abs().max_element() <= 4.0 + 1e-6, "{order}: {back:?}");
        }
    }

    #[test]
    fn test_decompose_towards_unwraps_away_from_lock() {
        let order = RotationOrder::Xyz;
        let m = order.compose(DVec3::new(10.0, 20.0, 30.0));
        let back = order.decompose_towards(&m, DVec3::new(370.0, 20.0, -330.0));
        assert!((back - DVec3::new(370.0, 20.0, -330.0)).abs().max_element() < 1e-6, "{back:?}");
    }

    #[test]
    fn test_closest_to_unwraps_full_turns() {
        let previous = DVec3::new(0.0, 0.0, 179.0);
        let raw = DVec3::new(0.0, 0.0, -179.0);
        let chosen = RotationOrder::Xyz.closest_to(raw, previous);
        assert!((chosen.z - 181.0).abs() < 1e-9);
    }

    #[test]
    fn test_closest_to_prefers_flip_past_ninety() {
        // Y at 100 degrees decomposes to (180, 80, 180); the flip gives (0, 100, 0).
        let order = RotationOrder::Xyz;
        let raw = order.decompose(&order.compose(DVec3::new(0.0, 100.0, 0.0)));
        let chosen = order.closest_to(raw, DVec3::new(0.0, 90.0, 0.0));
        assert!((chosen - DVec3::new(0.0, 100.0, 0.0)).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_decompose_affine() {
        let m = DMat4::from_scale_rotation_translation(
            DVec3::new(2.0, 3.0, 4.0),
            DQuat::from_rotation_z(0.5),
            DVec3::new(1.0, -2.0, 5.0),
        );
        let d = decompose_affine(&m);
        assert!((d.translation - DVec3::new(1.0, -2.0, 5.0)).length() < 1e-12);
        assert!((d.scale - DVec3::new(2.0, 3.0, 4.0)).length() < 1e-12);
        assert_mat3_eq(&d.rotation, &DMat3::from_rotation_z(0.5));
    }

    #[test]
    fn test_decompose_mirrored() {
        let m = DMat4::from_scale(DVec3::new(-1.0, 1.0, 1.0));
        let d = decompose_affine(&m);
        assert_eq!(d.scale, DVec3::new(-1.0, 1.0, 1.0));
        assert_mat3_eq(&d.rotation, &DMat3::IDENTITY);
    }

    #[test]
    fn test_rotation_order_serde() {
        let json = serde_json::to_string(&RotationOrder::Zxy).unwrap();
        assert_eq!(json, "\"zxy\"");
        let back: RotationOrder = serde_json::from_str("\"yzx\"").unwrap();
        assert_eq!(back, RotationOrder::Yzx);
    }
}
