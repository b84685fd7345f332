#![allow(unused)]

use binrw::{prelude::*, BinResult};

use super::{count, offset, read_at, read_table, FixedSize};

pub const VVD_MAGIC: [u8; 4] = *b"IDSV";
pub const VVD_VERSION: i32 = 4;
pub const MAX_LODS: usize = 8;
pub const MAX_BONES_PER_VERTEX: usize = 3;

#[derive(Debug, Clone, BinRead)]
pub struct VvdHeader {
    pub id: [u8; 4],
    pub version: i32,
    pub checksum: i32,
    pub lod_count: i32,
    pub lod_vertex_counts: [i32; MAX_LODS],
    pub fixup_count: i32,
    pub fixup_offset: i32,
    pub vertex_offset: i32,
    pub tangent_offset: i32,
}

impl VvdHeader {
    pub const SIZE: usize = 64;
}

/// Copies a run of root-LOD vertices into the order of every LOD at or below `lod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
pub struct VvdFixup {
    pub lod: i32,
    pub source_vertex: i32,
    pub vertex_count: i32,
}

impl FixedSize for VvdFixup {
    const SIZE: u64 = 12;
}

#[derive(Debug, Clone, Copy, PartialEq, BinRead)]
pub struct VvdVertex {
    pub weights: [f32; MAX_BONES_PER_VERTEX],
    pub bones: [i8; MAX_BONES_PER_VERTEX],
    pub bone_count: u8,
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl FixedSize for VvdVertex {
    const SIZE: u64 = 48;
}

#[derive(Debug, Clone, Copy, PartialEq, BinRead)]
pub struct VvdTangent(pub [f32; 4]);

impl FixedSize for VvdTangent {
    const SIZE: u64 = 16;
}

/// The vertex data file: one flat vertex pool shared by every LOD.
#[derive(Debug, Clone)]
pub struct VvdFile {
    pub header: VvdHeader,
    pub fixups: Vec<VvdFixup>,
    pub vertices: Vec<VvdVertex>,
    pub tangents: Vec<VvdTangent>,
}

impl VvdFile {
    pub fn parse(data: &[u8]) -> BinResult<Self> {
        let header: VvdHeader = read_at(data, 0)?;
        let fixups = read_table(
            data,
            offset(0, header.fixup_offset)?,
            count(header.fixup_count, 0, "fixup")?,
        )?;
        let vertex_count = count(header.lod_vertex_counts[0], 0, "vertex")?;
        let vertices = read_table(data, offset(0, header.vertex_offset)?, vertex_count)?;
        let tangents = if header.tangent_offset > 0 {
            read_table(data, offset(0, header.tangent_offset)?, vertex_count)?
        } else {
            Vec::new()
        };
        Ok(Self {
            header,
            fixups,
            vertices,
            tangents,
        })
    }

    pub fn lod_count(&self) -> usize {
        self.header.lod_count.max(0) as usize
    }

    /// The vertex order one LOD's meshes index into, with tangents alongside.
    ///
    /// Without fixups every LOD uses the pool as stored. A fixup that points outside the pool
    /// yields `None`.
    pub fn lod_vertices(&self, lod: usize) -> Option<Vec<(VvdVertex, VvdTangent)>> {
        let tangent = |index: usize| {
            self.tangents
                .get(index)
                .copied()
                .unwrap_or(VvdTangent([1.0, 0.0, 0.0, 1.0]))
        };
        if self.fixups.is_empty() {
            return Some(
                self.vertices
                    .iter()
                    .enumerate()
                    .map(|(index, vertex)| (*vertex, tangent(index)))
                    .collect(),
            );
        }
        let mut ordered = Vec::new();
        for fixup in self.fixups.iter().filter(|fixup| fixup.lod >= lod as i32) {
            let start = usize::try_from(fixup.source_vertex).ok()?;
            let end = start.checked_add(usize::try_from(fixup.vertex_count).ok()?)?;
            let vertices = self.vertices.get(start..end)?;
            ordered.extend(
                vertices
                    .iter()
                    .enumerate()
                    .map(|(offset, vertex)| (*vertex, tangent(start + offset))),
            );
        }
        Some(ordered)
    }
}
