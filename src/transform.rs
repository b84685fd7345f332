use glam::{Mat4, Quat, Vec3};

/// Translation, rotation and scale of a bone relative to some parent space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecomposedTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for DecomposedTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<DecomposedTransform> for Mat4 {
    fn from(value: DecomposedTransform) -> Self {
        Mat4::from_translation(value.translation)
            * Mat4::from_quat(value.rotation)
            * Mat4::from_scale(value.scale)
    }
}

impl From<Mat4> for DecomposedTransform {
    fn from(value: Mat4) -> Self {
        let (scale, rotation, translation) = value.to_scale_rotation_translation();
        DecomposedTransform {
            translation,
            rotation: rotation.normalize(),
            scale,
        }
    }
}

impl DecomposedTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Places `self`, expressed relative to `parent`, into the parent's space.
    pub fn then(&self, parent: &DecomposedTransform) -> DecomposedTransform {
        (Mat4::from(*parent) * Mat4::from(*self)).into()
    }

    /// Expresses `self` relative to `parent`. Inverse of [`DecomposedTransform::then`].
    pub fn relative_to(&self, parent: &DecomposedTransform) -> DecomposedTransform {
        (Mat4::from(*parent).inverse() * Mat4::from(*self)).into()
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * (self.scale * point)
    }

    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        (self.rotation.inverse() * (point - self.translation)) / self.scale
    }

    pub fn abs_diff_eq(&self, other: &DecomposedTransform, max_abs_diff: f32) -> bool {
        let same_rotation = self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
            || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff);
        same_rotation
            && self.translation.abs_diff_eq(other.translation, max_abs_diff)
            && self.scale.abs_diff_eq(other.scale, max_abs_diff)
    }
}

#[cfg(test)]
mod test {
    use glam::{Quat, Vec3};

    use super::DecomposedTransform;

    #[test]
    fn relative_undoes_then() {
        let parent = DecomposedTransform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_z(0.7) * Quat::from_rotation_x(-0.3),
        );
        let child = DecomposedTransform::new(Vec3::new(-4.0, 0.5, 2.0), Quat::from_rotation_y(1.1));
        let component = child.then(&parent);
        assert!(component.relative_to(&parent).abs_diff_eq(&child, 1e-5));
    }

    #[test]
    fn point_round_trip() {
        let transform =
            DecomposedTransform::new(Vec3::new(0.0, 5.0, 0.0), Quat::from_rotation_x(0.4));
        let point = Vec3::new(1.0, -2.0, 3.0);
        let back = transform.inverse_transform_point(transform.transform_point(point));
        assert!(back.abs_diff_eq(point, 1e-5));
    }
}
