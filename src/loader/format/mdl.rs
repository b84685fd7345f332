#![allow(unused)]

use binrw::{prelude::*, BinResult};
use glam::{Quat, Vec3};

use super::{
    count, fixed_string, matrix3x4_to_transform, offset, read_at, read_string_at, read_table,
    FixedSize,
};
use crate::transform::DecomposedTransform;

pub const MODEL_MAGIC: [u8; 4] = *b"IDST";
pub const ANIMATION_BLOCK_MAGIC: [u8; 4] = *b"IDAG";

pub const ANIM_DESC_LOOPING: i32 = 0x0001;
pub const ANIM_DESC_DELTA: i32 = 0x0004;
pub const ANIM_DESC_ALL_ZEROS: i32 = 0x0020;

pub const SEQUENCE_LOOPING: i32 = 0x0001;

#[derive(Debug, Clone, BinRead)]
pub struct StudioHeader {
    pub id: [u8; 4],
    pub version: i32,
    pub checksum: i32,
    #[br(map = fixed_string::<64>)]
    pub name: String,
    pub length: i32,

    pub eye_position: [f32; 3],
    pub illum_position: [f32; 3],
    pub hull_min: [f32; 3],
    pub hull_max: [f32; 3],
    pub view_bb_min: [f32; 3],
    pub view_bb_max: [f32; 3],

    pub flags: i32,

    pub bone_count: i32,
    pub bone_offset: i32,
    pub bone_controller_count: i32,
    pub bone_controller_offset: i32,
    pub hitbox_set_count: i32,
    pub hitbox_set_offset: i32,
    pub local_anim_count: i32,
    pub local_anim_offset: i32,
    pub local_seq_count: i32,
    pub local_seq_offset: i32,
    pub activity_list_version: i32,
    pub events_indexed: i32,
    pub texture_count: i32,
    pub texture_offset: i32,
    pub texture_dir_count: i32,
    pub texture_dir_offset: i32,
    pub skin_reference_count: i32,
    pub skin_family_count: i32,
    pub skin_offset: i32,
    pub body_part_count: i32,
    pub body_part_offset: i32,
    pub attachment_count: i32,
    pub attachment_offset: i32,
    pub local_node_count: i32,
    pub local_node_offset: i32,
    pub local_node_name_offset: i32,
    pub flex_desc_count: i32,
    pub flex_desc_offset: i32,
    pub flex_controller_count: i32,
    pub flex_controller_offset: i32,
    pub flex_rule_count: i32,
    pub flex_rule_offset: i32,
    pub ik_chain_count: i32,
    pub ik_chain_offset: i32,
    pub mouth_count: i32,
    pub mouth_offset: i32,
    pub local_pose_param_count: i32,
    pub local_pose_param_offset: i32,
    pub surface_prop_offset: i32,
    pub key_value_offset: i32,
    pub key_value_size: i32,
    pub ik_lock_count: i32,
    pub ik_lock_offset: i32,
    pub mass: f32,
    pub contents: i32,
    pub include_model_count: i32,
    pub include_model_offset: i32,
    pub virtual_model: i32,
    pub anim_block_name_offset: i32,
    pub anim_block_count: i32,
    pub anim_block_offset: i32,
    pub anim_block_model: i32,
    pub bone_table_by_name_offset: i32,
    pub vertex_base: i32,
    pub index_base: i32,
    pub directional_light_dot: u8,
    pub root_lod: u8,
    #[br(pad_after = 1)]
    pub allowed_root_lods: u8,
    pub zero_frame_cache_index: i32,
    pub flex_controller_ui_count: i32,
    pub flex_controller_ui_offset: i32,
}

impl StudioHeader {
    /// Bytes covered by the fields above.
    pub const SIZE: usize = 392;
}

#[derive(Debug, Clone, BinRead)]
pub struct StudioBone {
    pub name_offset: i32,
    pub parent: i32,
    pub bone_controllers: [i32; 6],
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
    pub rotation: [f32; 3],
    pub position_scale: [f32; 3],
    pub rotation_scale: [f32; 3],
    pub pose_to_bone: [f32; 12],
    pub alignment: [f32; 4],
    pub flags: i32,
    pub procedural_type: i32,
    pub procedural_offset: i32,
    pub physics_bone: i32,
    pub surface_prop_offset: i32,
    pub contents: i32,
    pub unused: [i32; 8],
}

impl FixedSize for StudioBone {
    const SIZE: u64 = 216;
}

#[derive(Debug, Clone, BinRead)]
pub struct StudioTexture {
    pub name_offset: i32,
    pub flags: i32,
    pub used: i32,
    pub unused1: i32,
    pub material: i32,
    pub client_material: i32,
    pub unused: [i32; 10],
}

impl FixedSize for StudioTexture {
    const SIZE: u64 = 64;
}

#[derive(Debug, Clone, BinRead)]
pub struct StudioBodyPart {
    pub name_offset: i32,
    pub model_count: i32,
    pub base: i32,
    pub model_offset: i32,
}

impl FixedSize for StudioBodyPart {
    const SIZE: u64 = 16;
}

#[derive(Debug, Clone, BinRead)]
pub struct StudioModel {
    #[br(map = fixed_string::<64>)]
    pub name: String,
    pub kind: i32,
    pub bounding_radius: f32,
    pub mesh_count: i32,
    pub mesh_offset: i32,
    pub vertex_count: i32,
    pub vertex_offset: i32,
    pub tangent_offset: i32,
    pub attachment_count: i32,
    pub attachment_offset: i32,
    pub eyeball_count: i32,
    pub eyeball_offset: i32,
    pub vertex_data: [i32; 2],
    pub unused: [i32; 8],
}

impl FixedSize for StudioModel {
    const SIZE: u64 = 148;
}

#[derive(Debug, Clone, BinRead)]
pub struct StudioMesh {
    pub material: i32,
    pub model_offset: i32,
    pub vertex_count: i32,
    pub vertex_offset: i32,
    pub flex_count: i32,
    pub flex_offset: i32,
    pub material_type: i32,
    pub material_param: i32,
    pub mesh_id: i32,
    pub center: [f32; 3],
    pub vertex_data: i32,
    pub lod_vertex_counts: [i32; 8],
    pub unused: [i32; 8],
}

impl FixedSize for StudioMesh {
    const SIZE: u64 = 116;
}

#[derive(Debug, Clone, BinRead)]
pub struct StudioAttachment {
    pub name_offset: i32,
    pub flags: i32,
    pub bone: i32,
    pub local: [f32; 12],
    pub unused: [i32; 8],
}

impl FixedSize for StudioAttachment {
    const SIZE: u64 = 92;
}

#[derive(Debug, Clone, BinRead)]
pub struct StudioIncludeModel {
    pub label_offset: i32,
    pub name_offset: i32,
}

impl FixedSize for StudioIncludeModel {
    const SIZE: u64 = 8;
}

#[derive(Debug, Clone, BinRead)]
pub struct StudioAnimDesc {
    pub base: i32,
    pub name_offset: i32,
    pub fps: f32,
    pub flags: i32,
    pub frame_count: i32,
    pub movement_count: i32,
    pub movement_offset: i32,
    pub unused1: [i32; 6],
    pub anim_block: i32,
    pub anim_offset: i32,
    pub ik_rule_count: i32,
    pub ik_rule_offset: i32,
    pub anim_block_ik_rule_offset: i32,
    pub local_hierarchy_count: i32,
    pub local_hierarchy_offset: i32,
    pub section_offset: i32,
    pub section_frames: i32,
    pub zero_frame_span: i16,
    pub zero_frame_count: i16,
    pub zero_frame_offset: i32,
    pub zero_frame_stall_time: f32,
}

impl FixedSize for StudioAnimDesc {
    const SIZE: u64 = 100;
}

/// Where one section of a long clip is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
pub struct StudioAnimSection {
    pub block: i32,
    pub offset: i32,
}

impl FixedSize for StudioAnimSection {
    const SIZE: u64 = 8;
}

/// Byte range of one block inside the animation block file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
pub struct StudioAnimBlock {
    pub data_start: i32,
    pub data_end: i32,
}

impl FixedSize for StudioAnimBlock {
    const SIZE: u64 = 8;
}

/// Leading part of a sequence description; the rest is not needed.
#[derive(Debug, Clone, BinRead)]
pub struct StudioSeqDesc {
    pub base: i32,
    pub label_offset: i32,
    pub activity_name_offset: i32,
    pub flags: i32,
    pub activity: i32,
    pub activity_weight: i32,
    pub event_count: i32,
    pub event_offset: i32,
    pub bb_min: [f32; 3],
    pub bb_max: [f32; 3],
    pub blend_count: i32,
    pub anim_index_offset: i32,
    pub movement_offset: i32,
    pub group_size: [i32; 2],
}

impl FixedSize for StudioSeqDesc {
    const SIZE: u64 = 212;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdlBone {
    pub name: String,
    pub parent: i32,
    pub position: Vec3,
    pub quaternion: Quat,
    pub rotation: Vec3,
    pub position_scale: Vec3,
    pub rotation_scale: Vec3,
}

impl MdlBone {
    pub fn local(&self) -> DecomposedTransform {
        DecomposedTransform::new(self.position, self.quaternion)
    }
}

#[derive(Debug, Clone)]
pub struct MdlModel {
    pub name: String,
    pub vertex_count: usize,
    pub meshes: Vec<StudioMesh>,
}

#[derive(Debug, Clone)]
pub struct MdlBodyPart {
    pub name: String,
    pub base: i32,
    pub models: Vec<MdlModel>,
}

#[derive(Debug, Clone)]
pub struct MdlAttachment {
    pub name: String,
    pub bone: i32,
    pub local: DecomposedTransform,
}

#[derive(Debug, Clone)]
pub struct MdlAnimDesc {
    /// Absolute position of the description; block 0 offsets are relative to it.
    pub position: u64,
    pub name: String,
    pub fps: f32,
    pub flags: i32,
    pub frame_count: i32,
    pub anim_block: i32,
    pub anim_offset: i32,
    pub section_frames: i32,
    pub sections: Vec<StudioAnimSection>,
}

#[derive(Debug, Clone)]
pub struct MdlSequence {
    pub label: String,
    pub activity: String,
    pub flags: i32,
    pub animations: Vec<i16>,
}

#[derive(Debug, Clone)]
pub struct MdlIncludeModel {
    pub label: String,
    pub file_name: String,
}

/// The model descriptor with every table this library uses resolved.
#[derive(Debug, Clone)]
pub struct MdlFile {
    pub header: StudioHeader,
    pub bones: Vec<MdlBone>,
    pub textures: Vec<String>,
    pub texture_dirs: Vec<String>,
    /// `skin_families[family][reference]` is a texture index.
    pub skin_families: Vec<Vec<i16>>,
    pub body_parts: Vec<MdlBodyPart>,
    pub attachments: Vec<MdlAttachment>,
    pub animations: Vec<MdlAnimDesc>,
    pub sequences: Vec<MdlSequence>,
    pub anim_blocks: Vec<StudioAnimBlock>,
    pub anim_block_name: String,
    pub include_models: Vec<MdlIncludeModel>,
    pub surface_prop: String,
    pub key_values: Option<String>,
}

fn header_table<T>(data: &[u8], table_offset: i32, table_count: i32, what: &str) -> BinResult<Vec<T>>
where
    T: FixedSize + for<'a> BinRead<Args<'a> = ()>,
{
    let position = offset(0, table_offset)?;
    read_table(data, position, count(table_count, position, what)?)
}

fn optional_string(data: &[u8], base: u64, relative: i32) -> BinResult<String> {
    if relative == 0 {
        Ok(String::new())
    } else {
        read_string_at(data, offset(base, relative)?)
    }
}

impl MdlFile {
    pub fn parse(data: &[u8]) -> BinResult<Self> {
        let header: StudioHeader = read_at(data, 0)?;

        let bones = Self::parse_bones(data, &header)?;

        let textures = header_table::<StudioTexture>(
            data,
            header.texture_offset,
            header.texture_count,
            "texture",
        )?;
        let textures = textures
            .iter()
            .enumerate()
            .map(|(index, texture)| {
                let base = offset(0, header.texture_offset)? + index as u64 * StudioTexture::SIZE;
                optional_string(data, base, texture.name_offset)
            })
            .collect::<BinResult<Vec<_>>>()?;

        let dir_table = offset(0, header.texture_dir_offset)?;
        let dir_count = count(header.texture_dir_count, dir_table, "texture directory")?;
        let texture_dirs = (0..dir_count as u64)
            .map(|index| {
                let name_offset: i32 = read_at(data, dir_table + index * 4)?;
                optional_string(data, 0, name_offset)
            })
            .collect::<BinResult<Vec<_>>>()?;

        let skin_table = offset(0, header.skin_offset)?;
        let references = count(header.skin_reference_count, skin_table, "skin reference")?;
        let families = count(header.skin_family_count, skin_table, "skin family")?;
        let skin_families = (0..families as u64)
            .map(|family| {
                (0..references as u64)
                    .map(|reference| {
                        read_at::<i16>(data, skin_table + (family * references as u64 + reference) * 2)
                    })
                    .collect::<BinResult<Vec<_>>>()
            })
            .collect::<BinResult<Vec<_>>>()?;

        let body_parts = Self::parse_body_parts(data, &header)?;

        let attachments = header_table::<StudioAttachment>(
            data,
            header.attachment_offset,
            header.attachment_count,
            "attachment",
        )?
        .iter()
        .enumerate()
        .map(|(index, attachment)| {
            let base = offset(0, header.attachment_offset)? + index as u64 * StudioAttachment::SIZE;
            Ok(MdlAttachment {
                name: optional_string(data, base, attachment.name_offset)?,
                bone: attachment.bone,
                local: matrix3x4_to_transform(&attachment.local),
            })
        })
        .collect::<BinResult<Vec<_>>>()?;

        let animations = Self::parse_animations(data, &header)?;
        let sequences = Self::parse_sequences(data, &header)?;

        let anim_blocks = header_table::<StudioAnimBlock>(
            data,
            header.anim_block_offset,
            header.anim_block_count,
            "animation block",
        )?;
        let anim_block_name = optional_string(data, 0, header.anim_block_name_offset)?;

        let include_models = header_table::<StudioIncludeModel>(
            data,
            header.include_model_offset,
            header.include_model_count,
            "included model",
        )?
        .iter()
        .enumerate()
        .map(|(index, include)| {
            let base =
                offset(0, header.include_model_offset)? + index as u64 * StudioIncludeModel::SIZE;
            Ok(MdlIncludeModel {
                label: optional_string(data, base, include.label_offset)?,
                file_name: optional_string(data, base, include.name_offset)?,
            })
        })
        .collect::<BinResult<Vec<_>>>()?;

        let surface_prop = optional_string(data, 0, header.surface_prop_offset)?;

        let key_values = if header.key_value_size > 0 && header.key_value_offset > 0 {
            let start = offset(0, header.key_value_offset)? as usize;
            let end = start + header.key_value_size as usize;
            let bytes = data.get(start..end).ok_or_else(|| {
                super::bad_data(
                    start as u64,
                    format!("Key values ({} bytes) run past the end of the file", end - start),
                )
            })?;
            let text = String::from_utf8_lossy(bytes);
            Some(text.trim_end_matches('\0').to_string())
        } else {
            None
        };

        Ok(Self {
            header,
            bones,
            textures,
            texture_dirs,
            skin_families,
            body_parts,
            attachments,
            animations,
            sequences,
            anim_blocks,
            anim_block_name,
            include_models,
            surface_prop,
            key_values,
        })
    }

    fn parse_bones(data: &[u8], header: &StudioHeader) -> BinResult<Vec<MdlBone>> {
        let table = offset(0, header.bone_offset)?;
        header_table::<StudioBone>(data, header.bone_offset, header.bone_count, "bone")?
            .into_iter()
            .enumerate()
            .map(|(index, bone)| {
                let base = table + index as u64 * StudioBone::SIZE;
                let [x, y, z, w] = bone.quaternion;
                Ok(MdlBone {
                    name: optional_string(data, base, bone.name_offset)?,
                    parent: bone.parent,
                    position: Vec3::from_array(bone.position),
                    quaternion: Quat::from_xyzw(x, y, z, w).normalize(),
                    rotation: Vec3::from_array(bone.rotation),
                    position_scale: Vec3::from_array(bone.position_scale),
                    rotation_scale: Vec3::from_array(bone.rotation_scale),
                })
            })
            .collect()
    }

    fn parse_body_parts(data: &[u8], header: &StudioHeader) -> BinResult<Vec<MdlBodyPart>> {
        let table = offset(0, header.body_part_offset)?;
        let parts = header_table::<StudioBodyPart>(
            data,
            header.body_part_offset,
            header.body_part_count,
            "body part",
        )?;
        parts
            .into_iter()
            .enumerate()
            .map(|(index, part)| {
                let part_base = table + index as u64 * StudioBodyPart::SIZE;
                let model_table = offset(part_base, part.model_offset)?;
                let models: Vec<StudioModel> = read_table(
                    data,
                    model_table,
                    count(part.model_count, part_base, "model")?,
                )?;
                let models = models
                    .into_iter()
                    .enumerate()
                    .map(|(model_index, model)| {
                        let model_base = model_table + model_index as u64 * StudioModel::SIZE;
                        let mesh_table = offset(model_base, model.mesh_offset)?;
                        let meshes = read_table(
                            data,
                            mesh_table,
                            count(model.mesh_count, model_base, "mesh")?,
                        )?;
                        Ok(MdlModel {
                            name: model.name,
                            vertex_count: count(model.vertex_count, model_base, "vertex")?,
                            meshes,
                        })
                    })
                    .collect::<BinResult<Vec<_>>>()?;
                Ok(MdlBodyPart {
                    name: optional_string(data, part_base, part.name_offset)?,
                    base: part.base,
                    models,
                })
            })
            .collect()
    }

    fn parse_animations(data: &[u8], header: &StudioHeader) -> BinResult<Vec<MdlAnimDesc>> {
        let table = offset(0, header.local_anim_offset)?;
        header_table::<StudioAnimDesc>(
            data,
            header.local_anim_offset,
            header.local_anim_count,
            "animation",
        )?
        .into_iter()
        .enumerate()
        .map(|(index, desc)| {
            let position = table + index as u64 * StudioAnimDesc::SIZE;
            let sections = if desc.section_frames > 0 && desc.section_offset != 0 {
                let frames = desc.frame_count.max(0);
                // Long clips keep their last frame in a trailing section of its own.
                let section_count = if frames > desc.section_frames {
                    (frames / desc.section_frames + 2) as usize
                } else {
                    1
                };
                read_table(data, offset(position, desc.section_offset)?, section_count)?
            } else {
                Vec::new()
            };
            Ok(MdlAnimDesc {
                position,
                name: optional_string(data, position, desc.name_offset)?,
                fps: desc.fps,
                flags: desc.flags,
                frame_count: desc.frame_count,
                anim_block: desc.anim_block,
                anim_offset: desc.anim_offset,
                section_frames: desc.section_frames,
                sections,
            })
        })
        .collect()
    }

    fn parse_sequences(data: &[u8], header: &StudioHeader) -> BinResult<Vec<MdlSequence>> {
        let table = offset(0, header.local_seq_offset)?;
        header_table::<StudioSeqDesc>(
            data,
            header.local_seq_offset,
            header.local_seq_count,
            "sequence",
        )?
        .into_iter()
        .enumerate()
        .map(|(index, desc)| {
            let position = table + index as u64 * StudioSeqDesc::SIZE;
            let [width, height] = desc.group_size;
            let anim_count = count(width, position, "blend width")?
                * count(height, position, "blend height")?;
            let anim_table = offset(position, desc.anim_index_offset)?;
            let animations = (0..anim_count as u64)
                .map(|slot| read_at::<i16>(data, anim_table + slot * 2))
                .collect::<BinResult<Vec<_>>>()?;
            Ok(MdlSequence {
                label: optional_string(data, position, desc.label_offset)?,
                activity: optional_string(data, position, desc.activity_name_offset)?,
                flags: desc.flags,
                animations,
            })
        })
        .collect()
    }
}

/// File name of the animation block file, without parsing the rest of the model.
pub fn anim_block_name(data: &[u8]) -> BinResult<Option<String>> {
    let header: StudioHeader = read_at(data, 0)?;
    if header.anim_block_count <= 1 || header.anim_block_name_offset == 0 {
        return Ok(None);
    }
    let name = read_string_at(data, offset(0, header.anim_block_name_offset)?)?;
    Ok(Some(name).filter(|name| !name.is_empty()))
}
