//! Bone hierarchy with bind pose.
//!
//! Bones are stored parent-before-child: every bone's parent index is strictly less than its
//! own index, which lets every pass below walk the hierarchy with a plain index-ordered loop.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use glam::Mat4;

use crate::{coord::CoordinateTransform, transform::DecomposedTransform};

const SYNTHETIC_ROOT_NAME: &str = "root";

#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub local: DecomposedTransform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkeletonError {
    BadParent { bone: usize, name: String, parent: i64 },
    PoseLength { expected: usize, actual: usize },
}

impl Display for SkeletonError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SkeletonError::BadParent { bone, name, parent } => write!(
                f,
                "Bone {} ({:?}) has parent {}, parents must come before their children",
                bone, name, parent
            ),
            SkeletonError::PoseLength { expected, actual } => write!(
                f,
                "Pose has {} transforms, but skeleton has {} bones",
                actual, expected
            ),
        }
    }
}

impl Error for SkeletonError {}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    bones: Vec<Bone>,
    synthetic_root: bool,
}

impl Skeleton {
    /// Validates the parent ordering and inserts a synthetic root at index 0 when more than one
    /// bone has no parent. Original bone `i` then lives at `i + 1`.
    pub fn build(bones: Vec<Bone>) -> Result<Self, SkeletonError> {
        for (index, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= index {
                    return Err(SkeletonError::BadParent {
                        bone: index,
                        name: bone.name.clone(),
                        parent: parent as i64,
                    });
                }
            }
        }

        let roots = bones.iter().filter(|bone| bone.parent.is_none()).count();
        if roots <= 1 {
            return Ok(Self {
                bones,
                synthetic_root: false,
            });
        }

        let root_name = unique_name(&bones, SYNTHETIC_ROOT_NAME);
        log::debug!(
            "Skeleton has {} root bones, inserting synthetic root {:?}",
            roots,
            root_name
        );
        let mut shifted = Vec::with_capacity(bones.len() + 1);
        shifted.push(Bone {
            name: root_name,
            parent: None,
            local: DecomposedTransform::IDENTITY,
        });
        shifted.extend(bones.into_iter().map(|bone| Bone {
            parent: Some(bone.parent.map_or(0, |parent| parent + 1)),
            ..bone
        }));
        Ok(Self {
            bones: shifted,
            synthetic_root: true,
        })
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn has_synthetic_root(&self) -> bool {
        self.synthetic_root
    }

    /// Added to every bone index read from a source file.
    pub fn index_offset(&self) -> usize {
        usize::from(self.synthetic_root)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|bone| bone.name == name)
    }

    pub fn bind_pose(&self) -> Vec<DecomposedTransform> {
        self.bones.iter().map(|bone| bone.local).collect()
    }

    pub fn component_transforms(&self) -> Vec<DecomposedTransform> {
        self.compose_unchecked(&self.bind_pose())
    }

    /// Turns a local pose into component space, parent before child.
    pub fn compose(
        &self,
        locals: &[DecomposedTransform],
    ) -> Result<Vec<DecomposedTransform>, SkeletonError> {
        self.check_length(locals.len())?;
        Ok(self.compose_unchecked(locals))
    }

    /// Re-derives local transforms from component-space ones.
    pub fn decompose(
        &self,
        components: &[DecomposedTransform],
    ) -> Result<Vec<DecomposedTransform>, SkeletonError> {
        self.check_length(components.len())?;
        Ok(self.decompose_unchecked(components))
    }

    /// Re-expresses a full local pose under another coordinate convention.
    ///
    /// Local transforms cannot be converted one by one: a reflecting basis does not commute
    /// with the hierarchy, so the pose goes through component space first.
    pub fn convert_pose(
        &self,
        locals: &[DecomposedTransform],
        coord: &CoordinateTransform,
    ) -> Result<Vec<DecomposedTransform>, SkeletonError> {
        self.check_length(locals.len())?;
        let converted: Vec<_> = self
            .compose_unchecked(locals)
            .iter()
            .map(|component| coord.transform(component))
            .collect();
        Ok(self.decompose_unchecked(&converted))
    }

    /// Same topology, bind pose converted by `coord`.
    pub fn transformed(&self, coord: &CoordinateTransform) -> Skeleton {
        let converted: Vec<_> = self
            .component_transforms()
            .iter()
            .map(|component| coord.transform(component))
            .collect();
        let locals = self.decompose_unchecked(&converted);
        Skeleton {
            bones: self
                .bones
                .iter()
                .zip(locals)
                .map(|(bone, local)| Bone {
                    name: bone.name.clone(),
                    parent: bone.parent,
                    local,
                })
                .collect(),
            synthetic_root: self.synthetic_root,
        }
    }

    fn check_length(&self, actual: usize) -> Result<(), SkeletonError> {
        if actual == self.bones.len() {
            Ok(())
        } else {
            Err(SkeletonError::PoseLength {
                expected: self.bones.len(),
                actual,
            })
        }
    }

    fn compose_unchecked(&self, locals: &[DecomposedTransform]) -> Vec<DecomposedTransform> {
        let mut matrices: Vec<Mat4> = Vec::with_capacity(locals.len());
        for (bone, local) in self.bones.iter().zip(locals) {
            let local = Mat4::from(*local);
            let component = match bone.parent {
                Some(parent) => matrices[parent] * local,
                None => local,
            };
            matrices.push(component);
        }
        matrices.into_iter().map(DecomposedTransform::from).collect()
    }

    fn decompose_unchecked(&self, components: &[DecomposedTransform]) -> Vec<DecomposedTransform> {
        self.bones
            .iter()
            .zip(components)
            .map(|(bone, component)| match bone.parent {
                Some(parent) => component.relative_to(&components[parent]),
                None => *component,
            })
            .collect()
    }
}

fn unique_name(bones: &[Bone], base: &str) -> String {
    let taken = |name: &str| bones.iter().any(|bone| bone.name == name);
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|suffix| format!("{}_{}", base, suffix))
        .find(|name| !taken(name))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod test {
    use glam::{Quat, Vec3};

    use super::{Bone, Skeleton, SkeletonError};
    use crate::{coord::CoordinateTransform, transform::DecomposedTransform};

    fn bone(name: &str, parent: Option<usize>, translation: Vec3, rotation: Quat) -> Bone {
        Bone {
            name: name.to_string(),
            parent,
            local: DecomposedTransform::new(translation, rotation),
        }
    }

    fn chain() -> Vec<Bone> {
        vec![
            bone("pelvis", None, Vec3::new(0.0, 0.0, 40.0), Quat::from_rotation_z(0.3)),
            bone("spine", Some(0), Vec3::new(5.0, 0.0, 0.0), Quat::from_rotation_y(-0.4)),
            bone("head", Some(1), Vec3::new(10.0, 1.0, 0.0), Quat::from_rotation_x(0.9)),
            bone("prop", None, Vec3::new(3.0, -2.0, 1.0), Quat::from_rotation_y(1.2)),
        ]
    }

    #[test]
    fn three_roots_get_one_synthetic_root() {
        let bones = vec![
            bone("a", None, Vec3::X, Quat::IDENTITY),
            bone("b", None, Vec3::Y, Quat::IDENTITY),
            bone("c", None, Vec3::Z, Quat::IDENTITY),
        ];
        let skeleton = Skeleton::build(bones).unwrap();
        assert_eq!(skeleton.len(), 4);
        assert!(skeleton.has_synthetic_root());
        assert_eq!(skeleton.index_offset(), 1);
        assert_eq!(skeleton.bones()[0].name, "root");
        assert_eq!(skeleton.bones()[0].parent, None);
        for bone in &skeleton.bones()[1..] {
            assert_eq!(bone.parent, Some(0));
        }
        let roots = skeleton.bones().iter().filter(|bone| bone.parent.is_none());
        assert_eq!(roots.count(), 1);
    }

    #[test]
    fn single_root_is_kept() {
        let skeleton = Skeleton::build(chain()[..3].to_vec()).unwrap();
        assert_eq!(skeleton.len(), 3);
        assert!(!skeleton.has_synthetic_root());
        assert_eq!(skeleton.index_offset(), 0);
    }

    #[test]
    fn parents_precede_children_after_shift() {
        let skeleton = Skeleton::build(chain()).unwrap();
        for (index, bone) in skeleton.bones().iter().enumerate() {
            if let Some(parent) = bone.parent {
                assert!(parent < index);
            }
        }
        assert_eq!(skeleton.bones()[3].parent, Some(2));
        assert_eq!(skeleton.bones()[4].parent, Some(0));
    }

    #[test]
    fn synthetic_root_name_avoids_clash() {
        let bones = vec![
            bone("root", None, Vec3::ZERO, Quat::IDENTITY),
            bone("other", None, Vec3::ZERO, Quat::IDENTITY),
        ];
        let skeleton = Skeleton::build(bones).unwrap();
        assert_eq!(skeleton.bones()[0].name, "root_1");
    }

    #[test]
    fn forward_parent_is_rejected() {
        let bones = vec![
            bone("a", Some(1), Vec3::ZERO, Quat::IDENTITY),
            bone("b", None, Vec3::ZERO, Quat::IDENTITY),
        ];
        assert!(matches!(
            Skeleton::build(bones),
            Err(SkeletonError::BadParent { bone: 0, parent: 1, .. })
        ));
    }

    #[test]
    fn converted_pose_recomposes_to_converted_components() {
        let skeleton = Skeleton::build(chain()).unwrap();
        for coord in [
            CoordinateTransform::source_to_z_up_left_handed(),
            CoordinateTransform::source_to_y_up().with_scale(0.0254),
        ] {
            let direct: Vec<_> = skeleton
                .component_transforms()
                .iter()
                .map(|component| coord.transform(component))
                .collect();
            let locals = skeleton.convert_pose(&skeleton.bind_pose(), &coord).unwrap();
            let recomposed = skeleton.compose(&locals).unwrap();
            for (expected, actual) in direct.iter().zip(&recomposed) {
                assert!(expected.abs_diff_eq(actual, 1e-3));
            }
        }
    }

    #[test]
    fn transformed_keeps_topology() {
        let skeleton = Skeleton::build(chain()).unwrap();
        let converted = skeleton.transformed(&CoordinateTransform::source_to_z_up_left_handed());
        assert_eq!(converted.len(), skeleton.len());
        for (a, b) in skeleton.bones().iter().zip(converted.bones()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.parent, b.parent);
        }
    }

    #[test]
    fn pose_length_is_checked() {
        let skeleton = Skeleton::build(chain()).unwrap();
        assert_eq!(
            skeleton.compose(&[DecomposedTransform::IDENTITY]),
            Err(SkeletonError::PoseLength {
                expected: 5,
                actual: 1
            })
        );
    }
}
