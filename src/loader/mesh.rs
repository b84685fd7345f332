//! Builds sectioned LOD meshes from the hardware strips and the vertex data.
//!
//! Three index spaces are involved and kept apart: strip indices point into a strip group's
//! vertex table, whose entries point at mesh-local vertices, which in turn sit at
//! `accumulated model vertices + mesh vertex offset + local index` in the LOD's vertex pool.
//! Output vertices are never shared between triangles.

use std::collections::{BTreeMap, HashMap};

use glam::{Vec3, Vec4};

use super::format::{
    mdl::{MdlBodyPart, MdlModel},
    vtx::{VtxFile, VtxModel, VtxStrip, VtxStripGroup},
    vvd::{VvdFile, VvdTangent, VvdVertex},
};
use crate::{
    coord::CoordinateTransform,
    error::{CrossReferenceError, CrossReferenceKind, FileKind, Location},
    mesh::{
        Bodygroup, BodygroupChoice, MaterialSlot, MeshAsset, MeshLod, MeshSection,
        MeshSectionAttributes, Skin,
    },
};

/// The parts of the model descriptor the mesh is built from.
pub(crate) struct MeshInput<'a> {
    pub body_parts: &'a [MdlBodyPart],
    pub textures: &'a [String],
    pub texture_dirs: &'a [String],
    /// `skin_families[family][reference]`; family 0 is the default assignment.
    pub skin_families: &'a [Vec<i16>],
    /// Bones of the model descriptor, before any synthetic root.
    pub bone_count: usize,
    pub bone_offset: usize,
}

type LodPool = Vec<(VvdVertex, VvdTangent)>;

/// Triangles of one model for one LOD, keyed by material.
type StagedLod = BTreeMap<usize, (MeshSectionAttributes, Vec<u32>)>;

struct LodBuilder {
    switch_point: f32,
    sections: Vec<MeshSection>,
    by_material: HashMap<usize, usize>,
}

impl LodBuilder {
    /// Appends staged triangles, returning the sections they landed in. A material seen for the
    /// first time opens a section named after `name_prefix`; later models reuse it unchanged.
    fn commit(&mut self, staged: StagedLod, name_prefix: &str, materials: &[MaterialSlot]) -> Vec<usize> {
        let mut touched = Vec::new();
        for (material, (attributes, indices)) in staged {
            let section = match self.by_material.get(&material) {
                Some(section) => *section,
                None => {
                    let base = format!("{}_{}", name_prefix, materials[material].name);
                    let name = unique_section_name(&self.sections, base);
                    self.sections.push(MeshSection {
                        name,
                        material,
                        attributes: MeshSectionAttributes::default(),
                        indices: Vec::new(),
                    });
                    self.by_material.insert(material, self.sections.len() - 1);
                    self.sections.len() - 1
                }
            };
            let target = &mut self.sections[section];
            let start = target.attributes.len() as u32;
            target.indices.extend(indices.iter().map(|index| start + index));
            append(&mut target.attributes, attributes);
            touched.push(section);
        }
        touched
    }
}

fn append(target: &mut MeshSectionAttributes, source: MeshSectionAttributes) {
    target.position.extend(source.position);
    target.normal.extend(source.normal);
    target.tangent.extend(source.tangent);
    target.tex_coord.extend(source.tex_coord);
    target.joints.extend(source.joints);
    target.weights.extend(source.weights);
}

fn unique_section_name(sections: &[MeshSection], base: String) -> String {
    let taken = |name: &str| sections.iter().any(|section| section.name == name);
    if !taken(&base) {
        return base;
    }
    (1..)
        .map(|suffix| format!("{}_{}", base, suffix))
        .find(|name| !taken(name))
        .unwrap_or(base)
}

pub(crate) struct MeshAssembler<'a> {
    input: MeshInput<'a>,
    vtx: &'a VtxFile,
    vvd: &'a VvdFile,
    coord: &'a CoordinateTransform,
    max_lods: Option<usize>,
}

impl<'a> MeshAssembler<'a> {
    pub fn new(
        input: MeshInput<'a>,
        vtx: &'a VtxFile,
        vvd: &'a VvdFile,
        coord: &'a CoordinateTransform,
        max_lods: Option<usize>,
    ) -> Self {
        Self {
            input,
            vtx,
            vvd,
            coord,
            max_lods,
        }
    }

    /// Builds the mesh. Body part or LOD count disagreements between the files fail the whole
    /// mesh; any other cross-reference failure only drops the model it occurs in and is
    /// returned alongside the mesh.
    pub fn assemble(&self) -> Result<(MeshAsset, Vec<CrossReferenceError>), CrossReferenceError> {
        let input = &self.input;
        if input.body_parts.len() != self.vtx.body_parts.len() {
            return Err(CrossReferenceError {
                file: FileKind::HardwareMesh,
                location: Location::default(),
                kind: CrossReferenceKind::BodyPartCount,
                expected: input.body_parts.len() as i64,
                actual: self.vtx.body_parts.len() as i64,
            });
        }
        let lod_count = self.vtx.header.lod_count.max(0) as usize;
        if self.vvd.lod_count() != lod_count {
            return Err(CrossReferenceError {
                file: FileKind::VertexData,
                location: Location::default(),
                kind: CrossReferenceKind::LodCount,
                expected: lod_count as i64,
                actual: self.vvd.lod_count() as i64,
            });
        }
        let lod_count = self.max_lods.map_or(lod_count, |max| lod_count.min(max));

        let pools = (0..lod_count)
            .map(|lod| {
                self.vvd.lod_vertices(lod).ok_or_else(|| CrossReferenceError {
                    file: FileKind::VertexData,
                    location: Location::default().with_lod(lod),
                    kind: CrossReferenceKind::VertexIndex,
                    expected: self.vvd.vertices.len() as i64,
                    actual: self
                        .vvd
                        .fixups
                        .iter()
                        .map(|fixup| i64::from(fixup.source_vertex) + i64::from(fixup.vertex_count))
                        .max()
                        .unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<LodPool>, _>>()?;

        let materials = self.materials();
        let mut lods: Vec<LodBuilder> = (0..lod_count)
            .map(|lod| LodBuilder {
                switch_point: self.switch_point(lod),
                sections: Vec::new(),
                by_material: HashMap::new(),
            })
            .collect();
        let mut errors = Vec::new();
        let mut bodygroups = Vec::with_capacity(input.body_parts.len());
        let mut accumulated = 0usize;

        for (part_index, (part, vtx_part)) in input
            .body_parts
            .iter()
            .zip(&self.vtx.body_parts)
            .enumerate()
        {
            let mut choices: Vec<BodygroupChoice> = part
                .models
                .iter()
                .map(|model| BodygroupChoice {
                    name: if model.name.is_empty() {
                        String::from("blank")
                    } else {
                        model.name.clone()
                    },
                    sections: Vec::new(),
                })
                .collect();

            if part.models.len() != vtx_part.models.len() {
                let error = CrossReferenceError {
                    file: FileKind::HardwareMesh,
                    location: Location::body_part(part_index),
                    kind: CrossReferenceKind::ModelCount,
                    expected: part.models.len() as i64,
                    actual: vtx_part.models.len() as i64,
                };
                log::error!("Skipping body part {:?}: {}", part.name, error);
                errors.push(error);
                accumulated += part.models.iter().map(|model| model.vertex_count).sum::<usize>();
                bodygroups.push(Bodygroup {
                    name: part.name.clone(),
                    choices,
                });
                continue;
            }

            for (model_index, (model, vtx_model)) in part.models.iter().zip(&vtx_part.models).enumerate() {
                let location = Location::body_part(part_index).with_model(model_index);
                match self.stage_model(model, vtx_model, accumulated, &pools, location) {
                    Ok(staged) => {
                        let prefix = format!("{}_{}", part.name, model_index);
                        for (lod, staged) in staged.into_iter().enumerate() {
                            let touched = lods[lod].commit(staged, &prefix, &materials);
                            if lod == 0 {
                                choices[model_index].sections = touched;
                            }
                        }
                    }
                    Err(error) => {
                        log::error!("Skipping model {:?}: {}", model.name, error);
                        errors.push(error);
                    }
                }
                accumulated += model.vertex_count;
            }
            bodygroups.push(Bodygroup {
                name: part.name.clone(),
                choices,
            });
        }

        let asset = MeshAsset {
            lods: lods
                .into_iter()
                .map(|lod| MeshLod {
                    switch_point: lod.switch_point,
                    sections: lod.sections,
                })
                .collect(),
            skins: self.skins(materials.len()),
            materials,
            bodygroups,
        };
        Ok((asset, errors))
    }

    fn switch_point(&self, lod: usize) -> f32 {
        self.vtx
            .body_parts
            .iter()
            .flat_map(|part| &part.models)
            .find_map(|model| model.lods.get(lod))
            .map_or(0.0, |lod| lod.switch_point)
    }

    fn materials(&self) -> Vec<MaterialSlot> {
        self.input
            .textures
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let name = if name.is_empty() {
                    log::warn!("Material {} has no name", index);
                    format!("material_{}", index)
                } else {
                    name.clone()
                };
                MaterialSlot {
                    name,
                    search_paths: self.input.texture_dirs.to_vec(),
                }
            })
            .collect()
    }

    /// Every family after the first becomes a skin listing where it differs from the first.
    fn skins(&self, material_count: usize) -> Vec<Skin> {
        let Some((default, families)) = self.input.skin_families.split_first() else {
            return Vec::new();
        };
        let material = |value: i16| usize::try_from(value).ok().filter(|index| *index < material_count);
        families
            .iter()
            .enumerate()
            .map(|(index, family)| {
                let mut overrides: Vec<(usize, usize)> = Vec::new();
                for (from, to) in default.iter().zip(family) {
                    if from == to {
                        continue;
                    }
                    if let (Some(from), Some(to)) = (material(*from), material(*to)) {
                        if !overrides.contains(&(from, to)) {
                            overrides.push((from, to));
                        }
                    }
                }
                Skin {
                    name: format!("skin{}", index + 1),
                    overrides,
                }
            })
            .collect()
    }

    /// Material a mesh's reference resolves to under the default skin.
    fn resolve_material(&self, reference: i32) -> Option<usize> {
        let reference = usize::try_from(reference).ok()?;
        let material = match self.input.skin_families.first() {
            Some(default) => usize::try_from(*default.get(reference)?).ok()?,
            None => reference,
        };
        (material < self.input.textures.len()).then_some(material)
    }

    fn stage_model(
        &self,
        model: &MdlModel,
        vtx_model: &VtxModel,
        accumulated: usize,
        pools: &[LodPool],
        location: Location,
    ) -> Result<Vec<StagedLod>, CrossReferenceError> {
        if vtx_model.lods.len() < pools.len() {
            return Err(CrossReferenceError {
                file: FileKind::HardwareMesh,
                location,
                kind: CrossReferenceKind::LodCount,
                expected: pools.len() as i64,
                actual: vtx_model.lods.len() as i64,
            });
        }
        let mut degenerate = 0usize;
        let mut staged_lods = Vec::with_capacity(pools.len());
        for (lod_index, (vtx_lod, pool)) in vtx_model.lods.iter().zip(pools).enumerate() {
            let location = location.with_lod(lod_index);
            if vtx_lod.meshes.len() != model.meshes.len() {
                return Err(CrossReferenceError {
                    file: FileKind::HardwareMesh,
                    location,
                    kind: CrossReferenceKind::MeshCount,
                    expected: model.meshes.len() as i64,
                    actual: vtx_lod.meshes.len() as i64,
                });
            }
            let mut staged = StagedLod::new();
            for (mesh_index, (mesh, vtx_mesh)) in model.meshes.iter().zip(&vtx_lod.meshes).enumerate() {
                let location = location.with_mesh(mesh_index);
                let material = self.resolve_material(mesh.material).ok_or(CrossReferenceError {
                    file: FileKind::Model,
                    location,
                    kind: CrossReferenceKind::MaterialIndex,
                    expected: self.input.textures.len() as i64,
                    actual: i64::from(mesh.material),
                })?;
                let mesh_base = accumulated as i64 + i64::from(mesh.vertex_offset);
                let (attributes, indices) = staged.entry(material).or_default();
                for group in &vtx_mesh.strip_groups {
                    for strip in &group.strips {
                        for triangle in strip_triangles(group, strip, location)? {
                            let mut corners = [0usize; 3];
                            for (corner, strip_index) in corners.iter_mut().zip(triangle) {
                                let vertex = group.vertices.get(strip_index).ok_or(CrossReferenceError {
                                    file: FileKind::HardwareMesh,
                                    location,
                                    kind: CrossReferenceKind::StripIndex,
                                    expected: group.vertices.len() as i64,
                                    actual: strip_index as i64,
                                })?;
                                let coarse = mesh_base + i64::from(vertex.original_vertex);
                                *corner = usize::try_from(coarse)
                                    .ok()
                                    .filter(|coarse| *coarse < pool.len())
                                    .ok_or(CrossReferenceError {
                                        file: FileKind::VertexData,
                                        location,
                                        kind: CrossReferenceKind::VertexIndex,
                                        expected: pool.len() as i64,
                                        actual: coarse,
                                    })?;
                            }
                            let [a, b, c] = corners;
                            if a == b || b == c || a == c {
                                degenerate += 1;
                                continue;
                            }
                            self.emit_triangle(attributes, indices, pool, corners, location)?;
                        }
                    }
                }
            }
            staged.retain(|_, (attributes, _)| !attributes.is_empty());
            staged_lods.push(staged);
        }
        if degenerate > 0 {
            log::warn!(
                "Skipped {} degenerate triangles in model {:?}",
                degenerate,
                model.name
            );
        }
        Ok(staged_lods)
    }

    fn emit_triangle(
        &self,
        attributes: &mut MeshSectionAttributes,
        indices: &mut Vec<u32>,
        pool: &LodPool,
        corners: [usize; 3],
        location: Location,
    ) -> Result<(), CrossReferenceError> {
        let base = attributes.len() as u32;
        for coarse in corners {
            let (vertex, VvdTangent(tangent)) = &pool[coarse];
            let mut joints = [0u16; 4];
            let mut weights = [0f32; 4];
            let influences = usize::from(vertex.bone_count).min(vertex.bones.len());
            for slot in 0..influences {
                let bone = usize::try_from(vertex.bones[slot])
                    .ok()
                    .filter(|bone| *bone < self.input.bone_count)
                    .ok_or(CrossReferenceError {
                        file: FileKind::VertexData,
                        location,
                        kind: CrossReferenceKind::BoneIndex,
                        expected: self.input.bone_count as i64,
                        actual: i64::from(vertex.bones[slot]),
                    })?;
                joints[slot] = (bone + self.input.bone_offset) as u16;
                weights[slot] = vertex.weights[slot];
            }
            attributes
                .position
                .push(self.coord.position(Vec3::from_array(vertex.position)).to_array());
            attributes
                .normal
                .push(self.coord.direction(Vec3::from_array(vertex.normal)).to_array());
            attributes
                .tangent
                .push(self.coord.tangent(Vec4::from_array(*tangent)).to_array());
            attributes.tex_coord.push(vertex.tex_coord);
            attributes.joints.push(joints);
            attributes.weights.push(weights);
        }
        if self.coord.reverses_winding() {
            indices.extend([base + 2, base + 1, base]);
        } else {
            indices.extend([base, base + 1, base + 2]);
        }
        Ok(())
    }
}

/// Strip-group index triples of one strip. Strips flagged as triangle strips are unrolled with
/// alternating winding; everything else is a plain list.
fn strip_triangles(
    group: &VtxStripGroup,
    strip: &VtxStrip,
    location: Location,
) -> Result<Vec<[usize; 3]>, CrossReferenceError> {
    let start = usize::try_from(strip.index_offset).ok();
    let count = usize::try_from(strip.index_count).ok();
    let indices = start
        .zip(count)
        .and_then(|(start, count)| group.indices.get(start..start.checked_add(count)?))
        .ok_or(CrossReferenceError {
            file: FileKind::HardwareMesh,
            location,
            kind: CrossReferenceKind::StripIndex,
            expected: group.indices.len() as i64,
            actual: i64::from(strip.index_offset) + i64::from(strip.index_count),
        })?;
    let indices: Vec<usize> = indices.iter().map(|index| usize::from(*index)).collect();
    if strip.flags.triangle_strip() && !strip.flags.triangle_list() {
        Ok(indices
            .windows(3)
            .enumerate()
            .map(|(index, window)| {
                if index % 2 == 0 {
                    [window[0], window[1], window[2]]
                } else {
                    [window[1], window[0], window[2]]
                }
            })
            .collect())
    } else {
        Ok(indices
            .chunks_exact(3)
            .map(|triangle| [triangle[0], triangle[1], triangle[2]])
            .collect())
    }
}
