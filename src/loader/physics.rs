//! Collision solids and ragdoll constraints.

use std::collections::HashMap;

use glam::Vec3;

use super::format::phy::{PhyFile, PhySection, PhySolid as RawSolid};
use crate::{
    coord::CoordinateTransform,
    error::{CrossReferenceError, CrossReferenceKind, FileKind, ImportError, Location},
    keyvalues::KeyValue,
    physics::{AngularLimit, ConvexHull, Constraint, PhysSolid},
    skeleton::Skeleton,
    transform::DecomposedTransform,
};

/// Text block sections that carry nothing this library outputs.
const IGNORED_SECTIONS: [&str; 4] = ["editparams", "collisionrules", "animatedfriction", "break"];

pub(crate) struct CollisionDecoder<'a> {
    source_components: Vec<DecomposedTransform>,
    destination_components: Vec<DecomposedTransform>,
    /// Bones in the model descriptor, before any synthetic root.
    bone_count: usize,
    bone_offset: usize,
    collision: &'a CoordinateTransform,
    coord: &'a CoordinateTransform,
}

impl<'a> CollisionDecoder<'a> {
    /// `source` is the model's own skeleton, `destination` the same skeleton after `coord`.
    pub fn new(
        source: &Skeleton,
        destination: &Skeleton,
        collision: &'a CoordinateTransform,
        coord: &'a CoordinateTransform,
    ) -> Self {
        Self {
            source_components: source.component_transforms(),
            destination_components: destination.component_transforms(),
            bone_count: source.len() - source.index_offset(),
            bone_offset: source.index_offset(),
            collision,
            coord,
        }
    }

    pub fn decode(
        &self,
        phy: &PhyFile,
        rejected: &mut Vec<ImportError>,
    ) -> (Vec<PhysSolid>, Vec<Constraint>) {
        let mut solids = Vec::with_capacity(phy.solids.len());
        for (index, solid) in phy.solids.iter().enumerate() {
            match self.solid(index, solid) {
                Ok(solid) => solids.push(solid),
                Err(error) => {
                    log::error!("Skipping collision solid {}: {}", index, error);
                    rejected.push(error.into());
                }
            }
        }

        let text = phy.text.trim();
        if text.is_empty() {
            return (solids, Vec::new());
        }
        let document = match KeyValue::parse(text) {
            Ok(document) => document,
            Err(error) => {
                log::error!("Bad collision text block: {}", error);
                rejected.push(ImportError::KeyValues {
                    file: FileKind::Collision,
                    error,
                });
                return (solids, Vec::new());
            }
        };

        let mut constraints = Vec::new();
        for (key, value) in document.items() {
            match key.to_ascii_lowercase().as_str() {
                "solid" => apply_solid_text(&mut solids, value),
                "ragdollconstraint" => match constraint(value, &solids, phy.solids.len()) {
                    Ok(Some(constraint)) => constraints.push(constraint),
                    Ok(None) => log::warn!("Ragdoll constraint without parent or child"),
                    Err(error) => {
                        log::error!("Skipping ragdoll constraint: {}", error);
                        rejected.push(error.into());
                    }
                },
                key if IGNORED_SECTIONS.contains(&key) => {}
                key => log::warn!("Unknown collision text section {:?}", key),
            }
        }
        (solids, constraints)
    }

    fn solid(&self, index: usize, solid: &RawSolid) -> Result<PhysSolid, CrossReferenceError> {
        let hulls = solid
            .sections
            .iter()
            .map(|section| self.hull(index, section))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PhysSolid {
            index,
            name: format!("solid{}", index),
            surface_prop: None,
            mass: None,
            hulls,
        })
    }

    /// Moves section vertices into the destination convention, compacting them on first use.
    /// Vertices merge only when their converted coordinates are bit-for-bit equal.
    fn hull(&self, index: usize, section: &PhySection) -> Result<ConvexHull, CrossReferenceError> {
        let bone = if section.bone_index > 0 {
            let bone = (section.bone_index - 1) as usize;
            if bone >= self.bone_count {
                return Err(CrossReferenceError {
                    file: FileKind::Collision,
                    location: Location::solid(index),
                    kind: CrossReferenceKind::BoneIndex,
                    expected: self.bone_count as i64,
                    actual: bone as i64,
                });
            }
            Some(bone + self.bone_offset)
        } else {
            None
        };

        let mut vertices: Vec<Vec3> = Vec::new();
        let mut by_bits: HashMap<[u32; 3], u32> = HashMap::new();
        let mut by_source: HashMap<u16, u32> = HashMap::new();
        let mut faces = Vec::with_capacity(section.triangles.len());
        let reverse = self.collision.then(self.coord).reverses_winding();
        for triangle in &section.triangles {
            let mut face = [0u32; 3];
            for (slot, source) in face.iter_mut().zip(triangle) {
                *slot = match by_source.get(source) {
                    Some(compact) => *compact,
                    None => {
                        let [x, y, z, _] = section.vertices[usize::from(*source)].0;
                        let position = self.convert(bone, Vec3::new(x, y, z));
                        let bits = position.to_array().map(f32::to_bits);
                        let compact = *by_bits.entry(bits).or_insert_with(|| {
                            vertices.push(position);
                            vertices.len() as u32 - 1
                        });
                        by_source.insert(*source, compact);
                        compact
                    }
                };
            }
            if reverse {
                face.reverse();
            }
            faces.push(face);
        }
        Ok(ConvexHull {
            bone,
            vertices,
            faces,
        })
    }

    /// Bone-local collision space to destination bone-local space: into the source convention,
    /// up to component space, across conventions, then down to the destination bone.
    fn convert(&self, bone: Option<usize>, position: Vec3) -> Vec3 {
        let local = self.collision.position(position);
        match bone {
            Some(bone) => {
                let component = self.source_components[bone].transform_point(local);
                self.destination_components[bone]
                    .inverse_transform_point(self.coord.position(component))
            }
            None => self.coord.position(local),
        }
    }
}

fn apply_solid_text(solids: &mut [PhysSolid], value: &KeyValue) {
    let Some(index) = value
        .get("index")
        .and_then(KeyValue::as_i32)
        .and_then(|index| usize::try_from(index).ok())
    else {
        log::warn!("Collision solid entry without an index");
        return;
    };
    let Some(solid) = solids.iter_mut().find(|solid| solid.index == index) else {
        log::warn!("Collision text names solid {}, which was not decoded", index);
        return;
    };
    if let Some(name) = value.get("name").and_then(KeyValue::as_str) {
        solid.name = name.to_string();
    }
    solid.surface_prop = value
        .get("surfaceprop")
        .and_then(KeyValue::as_str)
        .map(str::to_string);
    solid.mass = value.get("mass").and_then(KeyValue::as_f32);
}

/// Both ends must name solids that were decoded; a dropped solid fails its constraints too.
fn constraint(
    value: &KeyValue,
    solids: &[PhysSolid],
    solid_count: usize,
) -> Result<Option<Constraint>, CrossReferenceError> {
    let solid = |key: &str| -> Result<Option<usize>, CrossReferenceError> {
        let Some(index) = value.get(key).and_then(KeyValue::as_i32) else {
            return Ok(None);
        };
        match usize::try_from(index) {
            Ok(index) if solids.iter().any(|solid| solid.index == index) => Ok(Some(index)),
            _ => Err(CrossReferenceError {
                file: FileKind::Collision,
                location: Location::default(),
                kind: CrossReferenceKind::SolidIndex,
                expected: solid_count as i64,
                actual: i64::from(index),
            }),
        }
    };
    let (Some(parent), Some(child)) = (solid("parent")?, solid("child")?) else {
        return Ok(None);
    };
    let limit = |axis: char| {
        let number = |suffix: &str| {
            value
                .get(&format!("{}{}", axis, suffix))
                .and_then(KeyValue::as_f32)
                .unwrap_or_default()
        };
        AngularLimit {
            min: number("min"),
            max: number("max"),
            friction: number("friction"),
        }
    };
    Ok(Some(Constraint {
        parent,
        child,
        limits: [limit('x'), limit('y'), limit('z')],
    }))
}

#[cfg(test)]
mod test {
    use glam::{Quat, Vec3};

    use super::CollisionDecoder;
    use crate::{
        coord::CoordinateTransform,
        error::{CrossReferenceKind, ImportError},
        loader::format::phy::{PhyFile, PhyHeader, PhySection, PhySolid, PhyVertex},
        skeleton::{Bone, Skeleton},
        transform::DecomposedTransform,
    };

    fn skeleton() -> Skeleton {
        Skeleton::build(vec![Bone {
            name: String::from("pelvis"),
            parent: None,
            local: DecomposedTransform::new(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY),
        }])
        .unwrap()
    }

    fn phy(bone_index: i32, text: &str) -> PhyFile {
        let vertex = |x: f32, y: f32, z: f32| PhyVertex([x, y, z, 0.0]);
        PhyFile {
            header: PhyHeader {
                size: 16,
                id: 0,
                solid_count: 1,
                checksum: 0,
            },
            solids: vec![PhySolid {
                compact: true,
                sections: vec![PhySection {
                    bone_index,
                    triangles: vec![[0, 1, 2], [2, 1, 3]],
                    vertices: vec![
                        vertex(1.0, 2.0, 3.0),
                        vertex(0.0, 0.0, 0.0),
                        vertex(0.0, 1.0, 0.0),
                        vertex(1.0, 2.0, 3.0),
                    ],
                }],
            }],
            text: String::from(text),
        }
    }

    #[test]
    fn identical_vertices_are_merged() {
        let skeleton = skeleton();
        let identity = CoordinateTransform::identity();
        let decoder = CollisionDecoder::new(&skeleton, &skeleton, &identity, &identity);
        let mut rejected = Vec::new();
        let (solids, constraints) = decoder.decode(&phy(0, ""), &mut rejected);
        assert!(rejected.is_empty() && constraints.is_empty());
        let hull = &solids[0].hulls[0];
        assert_eq!(hull.bone, None);
        assert_eq!(hull.vertices.len(), 3);
        assert_eq!(hull.faces, vec![[0, 1, 2], [2, 1, 0]]);
    }

    #[test]
    fn bone_bound_vertices_follow_the_bone() {
        let source = skeleton();
        let mirror = CoordinateTransform::source_to_z_up_left_handed();
        let destination = source.transformed(&mirror);
        let identity = CoordinateTransform::identity();
        let decoder = CollisionDecoder::new(&source, &destination, &identity, &mirror);
        let (solids, _) = decoder.decode(&phy(1, ""), &mut Vec::new());
        let hull = &solids[0].hulls[0];
        assert_eq!(hull.bone, Some(0));
        // (1, 2, 3) on a bone at x = 10 is (11, 2, 3); mirrored (2, 11, 3); bone now at y = 10.
        assert!(hull.vertices[0].abs_diff_eq(Vec3::new(2.0, 1.0, 3.0), 1e-4));
        assert_eq!(hull.faces[0], [2, 1, 0]);
    }

    #[test]
    fn text_names_solids_and_builds_constraints() {
        let text = r#"
            solid { "index" "0" "name" "pelvis" "surfaceprop" "flesh" "mass" "12.5" }
            ragdollconstraint { "parent" "0" "child" "0" "xmin" "-30" "xmax" "30" "zfriction" "1" }
            ragdollconstraint { "parent" "0" "child" "4" }
            editparams { "totalmass" "100" }
        "#;
        let skeleton = skeleton();
        let identity = CoordinateTransform::identity();
        let decoder = CollisionDecoder::new(&skeleton, &skeleton, &identity, &identity);
        let mut rejected = Vec::new();
        let (solids, constraints) = decoder.decode(&phy(1, text), &mut rejected);
        assert_eq!(solids[0].name, "pelvis");
        assert_eq!(solids[0].surface_prop.as_deref(), Some("flesh"));
        assert_eq!(solids[0].mass, Some(12.5));
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].limits[0].min, -30.0);
        assert_eq!(constraints[0].limits[0].max, 30.0);
        assert_eq!(constraints[0].limits[2].friction, 1.0);
        assert!(constraints[0].limits[1].is_locked());
        assert!(matches!(
            rejected.as_slice(),
            [ImportError::CrossReference(error)] if error.kind == CrossReferenceKind::SolidIndex
        ));
    }

    #[test]
    fn constraint_on_dropped_solid_is_rejected() {
        let mut file = phy(1, r#"ragdollconstraint { "parent" "0" "child" "1" }"#);
        let mut broken = file.solids[0].clone();
        broken.sections[0].bone_index = 9;
        file.solids.push(broken);
        file.header.solid_count = 2;

        let skeleton = skeleton();
        let identity = CoordinateTransform::identity();
        let decoder = CollisionDecoder::new(&skeleton, &skeleton, &identity, &identity);
        let mut rejected = Vec::new();
        let (solids, constraints) = decoder.decode(&file, &mut rejected);
        assert_eq!(solids.len(), 1);
        assert!(constraints.is_empty());
        assert!(matches!(
            rejected.as_slice(),
            [ImportError::CrossReference(bone), ImportError::CrossReference(solid)]
                if bone.kind == CrossReferenceKind::BoneIndex
                    && solid.kind == CrossReferenceKind::SolidIndex
                    && solid.actual == 1
        ));
    }

    #[test]
    fn section_bound_past_skeleton_drops_solid() {
        let skeleton = skeleton();
        let identity = CoordinateTransform::identity();
        let decoder = CollisionDecoder::new(&skeleton, &skeleton, &identity, &identity);
        let mut rejected = Vec::new();
        let (solids, _) = decoder.decode(&phy(5, ""), &mut rejected);
        assert!(solids.is_empty());
        assert_eq!(rejected.len(), 1);
    }
}
