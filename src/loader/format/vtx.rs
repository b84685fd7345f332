#![allow(unused)]

use binrw::{prelude::*, BinResult};
use modular_bitfield::prelude::*;

use super::{count, offset, read_at, read_table, FixedSize};

pub const VTX_VERSION: i32 = 7;

#[derive(Debug, Clone, BinRead)]
pub struct VtxHeader {
    pub version: i32,
    pub vertex_cache_size: i32,
    pub max_bones_per_strip: u16,
    pub max_bones_per_triangle: u16,
    pub max_bones_per_vertex: i32,
    pub checksum: i32,
    pub lod_count: i32,
    pub material_replacement_offset: i32,
    pub body_part_count: i32,
    pub body_part_offset: i32,
}

impl VtxHeader {
    pub const SIZE: usize = 36;
}

#[derive(Debug, Clone, BinRead)]
struct VtxBodyPartHeader {
    model_count: i32,
    model_offset: i32,
}

impl FixedSize for VtxBodyPartHeader {
    const SIZE: u64 = 8;
}

#[derive(Debug, Clone, BinRead)]
struct VtxModelHeader {
    lod_count: i32,
    lod_offset: i32,
}

impl FixedSize for VtxModelHeader {
    const SIZE: u64 = 8;
}

#[derive(Debug, Clone, BinRead)]
struct VtxLodHeader {
    mesh_count: i32,
    mesh_offset: i32,
    switch_point: f32,
}

impl FixedSize for VtxLodHeader {
    const SIZE: u64 = 12;
}

#[derive(Debug, Clone, BinRead)]
struct VtxMeshHeader {
    strip_group_count: i32,
    strip_group_offset: i32,
    flags: u8,
}

impl FixedSize for VtxMeshHeader {
    const SIZE: u64 = 9;
}

#[derive(Debug, Clone, BinRead)]
struct VtxStripGroupHeader {
    vertex_count: i32,
    vertex_offset: i32,
    index_count: i32,
    index_offset: i32,
    strip_count: i32,
    strip_offset: i32,
    flags: u8,
}

impl FixedSize for VtxStripGroupHeader {
    const SIZE: u64 = 25;
}

#[bitfield]
#[derive(Debug, Clone, Copy, BinRead)]
#[br(map = Self::from_bytes)]
pub struct VtxStripFlags {
    pub triangle_list: bool,
    pub triangle_strip: bool,
    #[skip]
    __: B6,
}

#[derive(Debug, Clone, BinRead)]
pub struct VtxStrip {
    pub index_count: i32,
    pub index_offset: i32,
    pub vertex_count: i32,
    pub vertex_offset: i32,
    pub bone_count: i16,
    pub flags: VtxStripFlags,
    pub bone_state_change_count: i32,
    pub bone_state_change_offset: i32,
}

impl FixedSize for VtxStrip {
    const SIZE: u64 = 27;
}

/// One entry of a strip group's vertex table, pointing back at a mesh-local vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
pub struct VtxVertex {
    pub bone_weight_index: [u8; 3],
    pub bone_count: u8,
    pub original_vertex: u16,
    pub bone_id: [i8; 3],
}

impl FixedSize for VtxVertex {
    const SIZE: u64 = 9;
}

#[derive(Debug, Clone)]
pub struct VtxStripGroup {
    pub flags: u8,
    pub vertices: Vec<VtxVertex>,
    pub indices: Vec<u16>,
    pub strips: Vec<VtxStrip>,
}

#[derive(Debug, Clone)]
pub struct VtxMesh {
    pub flags: u8,
    pub strip_groups: Vec<VtxStripGroup>,
}

#[derive(Debug, Clone)]
pub struct VtxLod {
    pub switch_point: f32,
    pub meshes: Vec<VtxMesh>,
}

#[derive(Debug, Clone)]
pub struct VtxModel {
    pub lods: Vec<VtxLod>,
}

#[derive(Debug, Clone)]
pub struct VtxBodyPart {
    pub models: Vec<VtxModel>,
}

/// The hardware mesh file: body part, model, LOD, mesh, strip group and strip tables.
///
/// Every offset in this file is relative to the record that holds it.
#[derive(Debug, Clone)]
pub struct VtxFile {
    pub header: VtxHeader,
    pub body_parts: Vec<VtxBodyPart>,
}

/// Reads the table a `(count, offset)` pair in the record at `base` points at, yielding each
/// record with its own absolute position.
fn child_table<T>(data: &[u8], base: u64, table_count: i32, table_offset: i32, what: &str) -> BinResult<Vec<(u64, T)>>
where
    T: FixedSize + for<'a> BinRead<Args<'a> = ()>,
{
    let table = offset(base, table_offset)?;
    let records = read_table::<T>(data, table, count(table_count, base, what)?)?;
    Ok(records
        .into_iter()
        .enumerate()
        .map(|(index, record)| (table + index as u64 * T::SIZE, record))
        .collect())
}

impl VtxFile {
    pub fn parse(data: &[u8]) -> BinResult<Self> {
        let header: VtxHeader = read_at(data, 0)?;
        let body_parts = child_table::<VtxBodyPartHeader>(
            data,
            0,
            header.body_part_count,
            header.body_part_offset,
            "body part",
        )?
        .into_iter()
        .map(|(base, part)| {
            let models = child_table::<VtxModelHeader>(
                data,
                base,
                part.model_count,
                part.model_offset,
                "model",
            )?
            .into_iter()
            .map(|(base, model)| Self::parse_model(data, base, &model))
            .collect::<BinResult<Vec<_>>>()?;
            Ok(VtxBodyPart { models })
        })
        .collect::<BinResult<Vec<_>>>()?;
        Ok(Self { header, body_parts })
    }

    fn parse_model(data: &[u8], base: u64, model: &VtxModelHeader) -> BinResult<VtxModel> {
        let lods = child_table::<VtxLodHeader>(data, base, model.lod_count, model.lod_offset, "LOD")?
            .into_iter()
            .map(|(base, lod)| {
                let meshes = child_table::<VtxMeshHeader>(
                    data,
                    base,
                    lod.mesh_count,
                    lod.mesh_offset,
                    "mesh",
                )?
                .into_iter()
                .map(|(base, mesh)| {
                    let strip_groups = child_table::<VtxStripGroupHeader>(
                        data,
                        base,
                        mesh.strip_group_count,
                        mesh.strip_group_offset,
                        "strip group",
                    )?
                    .into_iter()
                    .map(|(base, group)| Self::parse_strip_group(data, base, &group))
                    .collect::<BinResult<Vec<_>>>()?;
                    Ok(VtxMesh {
                        flags: mesh.flags,
                        strip_groups,
                    })
                })
                .collect::<BinResult<Vec<_>>>()?;
                Ok(VtxLod {
                    switch_point: lod.switch_point,
                    meshes,
                })
            })
            .collect::<BinResult<Vec<_>>>()?;
        Ok(VtxModel { lods })
    }

    fn parse_strip_group(
        data: &[u8],
        base: u64,
        group: &VtxStripGroupHeader,
    ) -> BinResult<VtxStripGroup> {
        let vertices = read_table(
            data,
            offset(base, group.vertex_offset)?,
            count(group.vertex_count, base, "strip group vertex")?,
        )?;
        let indices = read_table(
            data,
            offset(base, group.index_offset)?,
            count(group.index_count, base, "strip group index")?,
        )?;
        let strips = read_table(
            data,
            offset(base, group.strip_offset)?,
            count(group.strip_count, base, "strip")?,
        )?;
        Ok(VtxStripGroup {
            flags: group.flags,
            vertices,
            indices,
            strips,
        })
    }
}
