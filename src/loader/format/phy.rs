#![allow(unused)]

use binrw::{prelude::*, BinResult};

use super::{bad_data, count, read_at, read_table, FixedSize};

pub const PHY_HEADER_SIZE: i32 = 16;
pub const COMPACT_SURFACE_TAG: [u8; 4] = *b"VPHY";

#[derive(Debug, Clone, BinRead)]
pub struct PhyHeader {
    pub size: i32,
    pub id: i32,
    pub solid_count: i32,
    pub checksum: i32,
}

/// Surface header of current files, tagged `VPHY`. `size` counts the bytes after itself.
#[derive(Debug, Clone, BinRead)]
pub struct CompactSurfaceHeader {
    pub size: i32,
    pub tag: [u8; 4],
    pub version: i16,
    pub model_type: i16,
    pub surface_size: i32,
    pub drag_axis_areas: [f32; 3],
    pub axis_map_size: i32,
    pub dummy: [i32; 12],
}

impl CompactSurfaceHeader {
    pub const SIZE: u64 = 80;
}

#[derive(Debug, Clone, BinRead)]
pub struct LegacySurfaceHeader {
    pub size: i32,
    pub mass_center: [f32; 3],
    pub rotation_inertia: [f32; 3],
    pub upper_limit_radius: f32,
    pub packed_size: i32,
    pub ledge_tree_root: i32,
    pub dummy: [i32; 3],
}

impl LegacySurfaceHeader {
    pub const SIZE: u64 = 52;
}

#[derive(Debug, Clone, BinRead)]
struct PhySectionHeader {
    vertex_data_offset: i32,
    bone_index: i32,
    flags: i32,
    triangle_count: i32,
}

impl FixedSize for PhySectionHeader {
    const SIZE: u64 = 16;
}

#[derive(Debug, Clone, Copy, BinRead)]
struct PhyTriangle {
    index: u8,
    unknown0: u8,
    unknown1: u16,
    #[br(map = |corners: [[u16; 2]; 3]| corners.map(|[index, _]| index))]
    vertices: [u16; 3],
}

impl FixedSize for PhyTriangle {
    const SIZE: u64 = 16;
}

#[derive(Debug, Clone, Copy, PartialEq, BinRead)]
pub struct PhyVertex(pub [f32; 4]);

impl FixedSize for PhyVertex {
    const SIZE: u64 = 16;
}

/// One convex piece: triangles indexing into `vertices`, the prefix of the solid's shared
/// vertex pool this section uses.
#[derive(Debug, Clone)]
pub struct PhySection {
    pub bone_index: i32,
    pub triangles: Vec<[u16; 3]>,
    pub vertices: Vec<PhyVertex>,
}

#[derive(Debug, Clone)]
pub struct PhySolid {
    pub compact: bool,
    pub sections: Vec<PhySection>,
}

/// The collision file: a header, size-prefixed solids, then a text block.
#[derive(Debug, Clone)]
pub struct PhyFile {
    pub header: PhyHeader,
    pub solids: Vec<PhySolid>,
    pub text: String,
}

impl PhyFile {
    pub fn parse(data: &[u8]) -> BinResult<Self> {
        let header: PhyHeader = read_at(data, 0)?;
        let solid_count = count(header.solid_count, 0, "solid")?;
        let mut position = header.size.max(0) as u64;
        let mut solids = Vec::with_capacity(solid_count.min(256));
        for _ in 0..solid_count {
            let size: i32 = read_at(data, position)?;
            let end = position + 4 + count(size, position, "solid byte")? as u64;
            if end > data.len() as u64 {
                return Err(bad_data(
                    position,
                    format!("Solid of {} bytes runs past the end of the file", size),
                ));
            }
            solids.push(Self::parse_solid(data, position, end)?);
            position = end;
        }
        let text = data
            .get(position as usize..)
            .map(|bytes| String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string())
            .unwrap_or_default();
        Ok(Self {
            header,
            solids,
            text,
        })
    }

    fn parse_solid(data: &[u8], start: u64, end: u64) -> BinResult<PhySolid> {
        let tag: [u8; 4] = read_at(data, start + 4)?;
        let compact = tag == COMPACT_SURFACE_TAG;
        let mut position = if compact {
            start + CompactSurfaceHeader::SIZE
        } else {
            start + LegacySurfaceHeader::SIZE
        };

        // Sections run up to the vertex pool the first one points at.
        let mut pool_start = end;
        let mut sections = Vec::new();
        while position + PhySectionHeader::SIZE <= pool_start {
            let section: PhySectionHeader = read_at(data, position)?;
            let pool = super::offset(position, section.vertex_data_offset)?;
            if sections.is_empty() {
                if pool > end || pool < position + PhySectionHeader::SIZE {
                    return Err(bad_data(
                        position,
                        format!("Bad vertex pool offset {}", section.vertex_data_offset),
                    ));
                }
                pool_start = pool;
            }
            let triangle_count = count(section.triangle_count & 0xffff, position, "triangle")?;
            let triangles: Vec<PhyTriangle> =
                read_table(data, position + PhySectionHeader::SIZE, triangle_count)?;
            let triangles: Vec<[u16; 3]> =
                triangles.iter().map(|triangle| triangle.vertices).collect();
            let vertex_count = triangles
                .iter()
                .flatten()
                .map(|index| *index as usize + 1)
                .max()
                .unwrap_or(0);
            let vertices = read_table(data, pool, vertex_count)?;
            sections.push(PhySection {
                bone_index: section.bone_index,
                triangles,
                vertices,
            });
            position += PhySectionHeader::SIZE + triangle_count as u64 * PhyTriangle::SIZE;
        }
        Ok(PhySolid { compact, sections })
    }
}
