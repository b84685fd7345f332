//! Fixed linear remapping between coordinate conventions.
//!
//! A [`CoordinateTransform`] is built from the images of the source unit axes, plus a uniform
//! scale. The basis may contain a reflection, in which case triangle winding must be reversed
//! and rotations are re-expressed by conjugation instead of plain multiplication.

use glam::{Mat3, Quat, Vec3, Vec4};

use crate::transform::DecomposedTransform;

const INCHES_PER_METER: f32 = 1.0 / 0.0254;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    basis: Mat3,
    inverse_basis: Mat3,
    scale: f32,
}

impl Default for CoordinateTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl CoordinateTransform {
    /// `unit_x`, `unit_y` and `unit_z` are where the source +X, +Y and +Z axes end up.
    pub fn from_axes(unit_x: Vec3, unit_y: Vec3, unit_z: Vec3) -> Self {
        let basis = Mat3::from_cols(unit_x, unit_y, unit_z);
        Self {
            basis,
            inverse_basis: basis.inverse(),
            scale: 1.0,
        }
    }

    pub fn identity() -> Self {
        Self::from_axes(Vec3::X, Vec3::Y, Vec3::Z)
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Z-up right-handed (X forward, Y left) to Z-up left-handed (X and Y swapped).
    pub fn source_to_z_up_left_handed() -> Self {
        Self::from_axes(Vec3::Y, Vec3::X, Vec3::Z)
    }

    /// Z-up right-handed (X forward) to Y-up right-handed (-Z forward).
    pub fn source_to_y_up() -> Self {
        Self::from_axes(Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y)
    }

    /// Collision-engine space (meters, Y down the up axis) to the model descriptor's space (inches).
    pub fn ivp_to_source() -> Self {
        Self::from_axes(Vec3::X, Vec3::NEG_Z, Vec3::Y).with_scale(INCHES_PER_METER)
    }

    /// Applies `self` first, then `next`.
    pub fn then(&self, next: &CoordinateTransform) -> CoordinateTransform {
        let basis = next.basis * self.basis;
        CoordinateTransform {
            basis,
            inverse_basis: basis.inverse(),
            scale: self.scale * next.scale,
        }
    }

    pub fn basis(&self) -> Mat3 {
        self.basis
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn determinant(&self) -> f32 {
        self.basis.determinant()
    }

    pub fn reverses_winding(&self) -> bool {
        self.determinant() < 0.0
    }

    pub fn position(&self, position: Vec3) -> Vec3 {
        self.basis * position * self.scale
    }

    pub fn direction(&self, direction: Vec3) -> Vec3 {
        (self.basis * direction).normalize_or_zero()
    }

    /// Tangent direction is remapped; handedness flips with a reflecting basis.
    pub fn tangent(&self, tangent: Vec4) -> Vec4 {
        let direction = self.direction(tangent.truncate());
        let sign = if self.reverses_winding() { -1.0 } else { 1.0 };
        direction.extend(tangent.w * sign)
    }

    pub fn rotation(&self, rotation: Quat) -> Quat {
        let matrix = self.basis * Mat3::from_quat(rotation) * self.inverse_basis;
        Quat::from_mat3(&matrix).normalize()
    }

    /// Moves a transform expressed in one convention's component space into the other's.
    /// Scale is carried over unchanged.
    pub fn transform(&self, transform: &DecomposedTransform) -> DecomposedTransform {
        DecomposedTransform {
            translation: self.position(transform.translation),
            rotation: self.rotation(transform.rotation),
            scale: transform.scale,
        }
    }
}
