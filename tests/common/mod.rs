//! Byte-exact fixture files for the import pipeline.
#![allow(dead_code)]

use std::{f32::consts::FRAC_1_SQRT_2, io::Cursor};

use binrw::BinWrite;
use glam::{EulerRot, Quat};
use half::f16;

pub const CHECKSUM: i32 = 0x1234_5678;

/// Little-endian writer with deferred, record-relative string offsets.
pub struct Writer {
    cursor: Cursor<Vec<u8>>,
    strings: Vec<(u64, u64, String)>,
}

impl Writer {
    pub fn new() -> Self {
        Self {
            cursor: Cursor::new(Vec::new()),
            strings: Vec::new(),
        }
    }

    pub fn position(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    pub fn put<T>(&mut self, value: T) -> &mut Self
    where
        T: for<'a> BinWrite<Args<'a> = ()>,
    {
        let end = self.position();
        self.cursor.set_position(end);
        value.write_le(&mut self.cursor).unwrap();
        self
    }

    pub fn put_at<T>(&mut self, position: u64, value: T) -> &mut Self
    where
        T: for<'a> BinWrite<Args<'a> = ()>,
    {
        self.cursor.set_position(position);
        value.write_le(&mut self.cursor).unwrap();
        self
    }

    pub fn zeros(&mut self, count: usize) -> u64 {
        let start = self.position();
        self.put(vec![0u8; count]);
        start
    }

    /// Writes `offset(string) - base` at `patch_at` once strings are flushed.
    pub fn defer_string(&mut self, patch_at: u64, base: u64, value: &str) {
        self.strings.push((patch_at, base, value.to_string()));
    }

    pub fn finish(mut self) -> Vec<u8> {
        for (patch_at, base, value) in std::mem::take(&mut self.strings) {
            let position = self.position();
            let mut bytes = value.into_bytes();
            bytes.push(0);
            self.put(bytes);
            self.put_at(patch_at, (position - base) as i32);
        }
        self.cursor.into_inner()
    }
}

pub struct FixtureBone {
    pub name: &'static str,
    pub parent: i32,
    pub position: [f32; 3],
    /// Euler angles in radians, x then y then z.
    pub rotation: [f32; 3],
}

impl FixtureBone {
    pub fn new(name: &'static str, parent: i32, position: [f32; 3]) -> Self {
        Self {
            name,
            parent,
            position,
            rotation: [0.0; 3],
        }
    }
}

pub struct FixturePart {
    pub name: &'static str,
    pub material: i32,
}

/// How the fixture's single clip is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureClip {
    /// In the model file: the last bone moves 10 units up over two frames.
    Runs,
    /// In the model file: raw values for both bones in a two-record chain.
    Raw,
    /// Three frames in sections of two, stored in the animation block file. The last bone turns
    /// about z by `500`, `900` (unowned) and `1000` rotation units.
    Sectioned,
}

impl FixtureClip {
    fn frames(self) -> i32 {
        match self {
            FixtureClip::Runs | FixtureClip::Raw => 2,
            FixtureClip::Sectioned => 3,
        }
    }
}

/// Rotation scale of every bone.
pub const ROTATION_SCALE: f32 = 0.001;
pub const SECTION_FRAMES: i32 = 2;
/// Switch point added per LOD level.
pub const LOD_SWITCH: f32 = 12.0;
/// Rotation of the first bone in the raw clip.
pub const RAW_ROOT_ROTATION: Quat = Quat::from_xyzw(0.0, 0.0, FRAC_1_SQRT_2, FRAC_1_SQRT_2);
pub const RAW_ROOT_POSITION: [f32; 3] = [1.0, 2.0, 3.0];
/// Rotation of the last bone in the raw clip.
pub const RAW_LAST_ROTATION: Quat = Quat::from_xyzw(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);

const ANIMATION_BLOCK_HEADER: usize = 12;

/// A small model: bones, one single-mesh model per body part, one clip, one sequence.
pub struct Fixture {
    pub version: i32,
    pub checksum: i32,
    pub bones: Vec<FixtureBone>,
    pub parts: Vec<FixturePart>,
    pub textures: Vec<&'static str>,
    /// Body parts the hardware mesh claims to have.
    pub vtx_body_parts: usize,
    /// Checksum written into the sibling files.
    pub sibling_checksum: i32,
    pub clip: FixtureClip,
    /// Overrides the frame count of the clip description.
    pub frame_count: Option<i32>,
    pub delta: bool,
    /// Animation block every section of a sectioned clip points at.
    pub section_block: i32,
    /// LODs of the hardware mesh, every model carrying all of them.
    pub lods: usize,
    pub vvd_lods: usize,
    /// Meshes are one four-index triangle strip instead of a three-index list.
    pub tristrip: bool,
    /// `(lod, source vertex, count)` fixups of the vertex data.
    pub fixups: Vec<[i32; 3]>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            version: 48,
            checksum: CHECKSUM,
            bones: vec![
                FixtureBone::new("root", -1, [0.0, 0.0, 0.0]),
                FixtureBone::new("arm", 0, [0.0, 0.0, 10.0]),
            ],
            parts: vec![
                FixturePart {
                    name: "body",
                    material: 0,
                },
                FixturePart {
                    name: "head",
                    material: 1,
                },
            ],
            textures: vec!["metal", "glass"],
            vtx_body_parts: 2,
            sibling_checksum: CHECKSUM,
            clip: FixtureClip::Runs,
            frame_count: None,
            delta: false,
            section_block: 1,
            lods: 1,
            vvd_lods: 1,
            tristrip: false,
            fixups: Vec::new(),
        }
    }
}

pub const VERTICES_PER_MODEL: usize = 4;

fn fixed_name(name: &str) -> [u8; 64] {
    let mut bytes = [0u8; 64];
    bytes[..name.len()].copy_from_slice(name.as_bytes());
    bytes
}

/// Inverse of the 48-bit quaternion decoding: 16, 16 and 15 bits plus the sign of w.
pub fn quaternion48(rotation: Quat) -> [u8; 6] {
    let axis = |value: f32, half: f64, max: u64| ((value as f64 * half + half).round() as u64).min(max);
    let bits = axis(rotation.x, 32768.0, 0xffff)
        | axis(rotation.y, 32768.0, 0xffff) << 16
        | axis(rotation.z, 16384.0, 0x7fff) << 32
        | u64::from(rotation.w < 0.0) << 47;
    let mut bytes = [0u8; 6];
    bytes.copy_from_slice(&bits.to_le_bytes()[..6]);
    bytes
}

/// Inverse of the 64-bit quaternion decoding: three 21-bit axes plus the sign of w.
pub fn quaternion64(rotation: Quat) -> [u8; 8] {
    let axis = |value: f32| ((value as f64 * 1048576.5 + 1048576.0).round() as u64).min(0x1f_ffff);
    let bits = axis(rotation.x)
        | axis(rotation.y) << 21
        | axis(rotation.z) << 42
        | u64::from(rotation.w < 0.0) << 63;
    bits.to_le_bytes()
}

pub fn vector48(value: [f32; 3]) -> [u16; 3] {
    value.map(|component| f16::from_f32(component).to_bits())
}

impl Fixture {
    fn last_bone(&self) -> u8 {
        self.bones.len() as u8 - 1
    }

    pub fn mdl(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.zeros(392);
        w.put_at(0, *b"IDST")
            .put_at(4, self.version)
            .put_at(8, self.checksum)
            .put_at(12, fixed_name("fixture/fixture.mdl"));

        // Bones
        let table = w.position();
        w.put_at(156, self.bones.len() as i32).put_at(160, table as i32);
        for bone in &self.bones {
            let record = w.zeros(216);
            let [x, y, z] = bone.rotation;
            w.defer_string(record, record, bone.name);
            w.put_at(record + 4, bone.parent)
                .put_at(record + 32, bone.position)
                .put_at(record + 44, Quat::from_euler(EulerRot::ZYX, z, y, x).to_array())
                .put_at(record + 60, bone.rotation)
                .put_at(record + 72, [1.0f32; 3])
                .put_at(record + 84, [ROTATION_SCALE; 3]);
        }

        // Textures, search paths and skin families
        let table = w.position();
        w.put_at(204, self.textures.len() as i32).put_at(208, table as i32);
        for texture in &self.textures {
            let record = w.zeros(64);
            w.defer_string(record, record, texture);
        }
        let table = w.position();
        w.put_at(212, 1i32).put_at(216, table as i32);
        let entry = w.zeros(4);
        w.defer_string(entry, 0, "models/fixture/");
        let table = w.position();
        w.put_at(220, 2i32).put_at(224, 2i32).put_at(228, table as i32);
        w.put([0i16, 1, 1, 1]);

        // Body parts, models, meshes
        let table = w.position();
        w.put_at(232, self.parts.len() as i32).put_at(236, table as i32);
        let parts: Vec<u64> = self.parts.iter().map(|_| w.zeros(16)).collect();
        for (part, record) in self.parts.iter().zip(parts) {
            w.defer_string(record, record, part.name);
            let model = w.position();
            w.put_at(record + 4, 1i32)
                .put_at(record + 8, 1i32)
                .put_at(record + 12, (model - record) as i32);
            w.zeros(148);
            w.put_at(model, fixed_name(&format!("{}_model", part.name)));
            let mesh = w.position();
            w.put_at(model + 72, 1i32)
                .put_at(model + 76, (mesh - model) as i32)
                .put_at(model + 80, VERTICES_PER_MODEL as i32);
            w.zeros(116);
            w.put_at(mesh, part.material)
                .put_at(mesh + 8, VERTICES_PER_MODEL as i32);
        }

        // Attachment on the last bone, one unit along x
        let record = w.position();
        w.put_at(240, 1i32).put_at(244, record as i32);
        w.zeros(92);
        w.defer_string(record, record, "muzzle");
        w.put_at(record + 8, self.bones.len() as i32 - 1).put_at(
            record + 12,
            [1.0f32, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        );

        self.write_clip(&mut w);

        // One sequence playing the clip
        let seq = w.position();
        w.put_at(188, 1i32).put_at(192, seq as i32);
        w.zeros(212);
        w.defer_string(seq + 4, seq, "idle");
        w.defer_string(seq + 8, seq, "ACT_IDLE");
        let anim_index = w.position();
        w.put_at(seq + 12, 1i32)
            .put_at(seq + 60, (anim_index - seq) as i32)
            .put_at(seq + 68, [1i32, 1]);
        w.put(0i16);

        w.defer_string(308, 0, "metal");
        let text = b"mdlkeyvalue { prop_data { \"base\" \"Wooden.Small\" } }";
        let key_values = w.position();
        w.put_at(312, key_values as i32).put_at(316, text.len() as i32);
        w.put(text.to_vec());

        let mut data = w.finish();
        let length = data.len() as i32;
        data[76..80].copy_from_slice(&length.to_le_bytes());
        data
    }

    /// One looping clip named "idle", stored the way `self.clip` says.
    fn write_clip(&self, w: &mut Writer) {
        let desc = w.position();
        w.put_at(180, 1i32).put_at(184, desc as i32);
        w.zeros(100);
        w.defer_string(desc + 4, desc, "@idle");
        let flags = if self.delta { 1i32 | 4 } else { 1 };
        w.put_at(desc + 8, 30.0f32)
            .put_at(desc + 12, flags)
            .put_at(desc + 16, self.frame_count.unwrap_or(self.clip.frames()));

        let data = w.position();
        match self.clip {
            FixtureClip::Runs => {
                w.put_at(desc + 56, (data - desc) as i32);
                w.put(self.last_bone())
                    .put(0x04u8)
                    .put(0i16)
                    .put([0i16, 0, 6])
                    .put([2u8, 2])
                    .put([0i16, 10]);
            }
            FixtureClip::Raw => {
                w.put_at(desc + 56, (data - desc) as i32);
                w.put(0u8)
                    .put(0x03u8)
                    .put(16i16)
                    .put(quaternion48(RAW_ROOT_ROTATION))
                    .put(vector48(RAW_ROOT_POSITION));
                w.put(self.last_bone())
                    .put(0x20u8)
                    .put(0i16)
                    .put(quaternion64(RAW_LAST_ROTATION));
            }
            FixtureClip::Sectioned => {
                w.put_at(desc + 80, (data - desc) as i32)
                    .put_at(desc + 84, SECTION_FRAMES);
                for offset in self.section_offsets() {
                    w.put(self.section_block).put(offset);
                }

                let name = w.position();
                w.put_at(348, name as i32);
                w.put(b"models/fixture.ani\0".to_vec());
                let table = w.position();
                w.put_at(352, 2i32).put_at(356, table as i32);
                w.put([0i32, 0])
                    .put(ANIMATION_BLOCK_HEADER as i32)
                    .put(self.ani().len() as i32);
            }
        }
    }

    /// Block-relative offsets of the three sections; the middle one owns no frames.
    fn section_offsets(&self) -> [i32; 3] {
        [0, 0, 18]
    }

    /// The animation block file holding the sectioned clip's records.
    pub fn ani(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put(*b"IDAG").put(48i32).put(0i32);
        // Section 0 owns frames 0 and 1; its run goes on into frame 2.
        w.put(self.last_bone())
            .put(0x08u8)
            .put(0i16)
            .put([0i16, 0, 6])
            .put([3u8, 3])
            .put([0i16, 500, 900]);
        // The trailing section owns the last frame alone.
        w.put(self.last_bone())
            .put(0x08u8)
            .put(0i16)
            .put([0i16, 0, 6])
            .put([1u8, 1])
            .put(1000i16);
        w.finish()
    }

    pub fn vtx(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.zeros(36);
        let parts = self.vtx_body_parts;
        w.put_at(0, 7i32)
            .put_at(4, 24i32)
            .put_at(8, 53u16)
            .put_at(10, 9u16)
            .put_at(12, 3i32)
            .put_at(16, self.sibling_checksum)
            .put_at(20, self.lods as i32)
            .put_at(28, parts as i32)
            .put_at(32, 36i32);
        let records: Vec<u64> = (0..parts).map(|_| w.zeros(8)).collect();
        for part in records {
            let model = w.zeros(8);
            w.put_at(part, 1i32).put_at(part + 4, (model - part) as i32);
            let lods: Vec<u64> = (0..self.lods).map(|_| w.zeros(12)).collect();
            w.put_at(model, self.lods as i32)
                .put_at(model + 4, (lods[0] - model) as i32);
            for (level, lod) in lods.into_iter().enumerate() {
                let mesh = w.zeros(9);
                w.put_at(lod, 1i32)
                    .put_at(lod + 4, (mesh - lod) as i32)
                    .put_at(lod + 8, level as f32 * LOD_SWITCH);
                let group = w.zeros(25);
                w.put_at(mesh, 1i32).put_at(mesh + 4, (group - mesh) as i32);
                self.strip_group(&mut w, group);
            }
        }
        w.finish()
    }

    fn strip_group(&self, w: &mut Writer, group: u64) {
        let vertices = w.position();
        for original in 0..VERTICES_PER_MODEL as u16 {
            w.put([0u8, 1, 2]).put(1u8).put(original).put([0i8, 0, 0]);
        }
        let (strip_indices, flags) = if self.tristrip {
            (vec![0u16, 1, 2, 3], 0x02u8)
        } else {
            (vec![0u16, 1, 2], 0x01u8)
        };
        let indices = w.position();
        w.put(strip_indices.clone());
        let strip = w.position();
        w.put(strip_indices.len() as i32)
            .put(0i32)
            .put(VERTICES_PER_MODEL as i32)
            .put(0i32)
            .put(1i16)
            .put(flags)
            .put(0i32)
            .put(0i32);
        w.put_at(group, VERTICES_PER_MODEL as i32)
            .put_at(group + 4, (vertices - group) as i32)
            .put_at(group + 8, strip_indices.len() as i32)
            .put_at(group + 12, (indices - group) as i32)
            .put_at(group + 16, 1i32)
            .put_at(group + 20, (strip - group) as i32);
    }

    /// Vertex `i` sits at `(i % VERTICES_PER_MODEL, i / VERTICES_PER_MODEL, 0)` in file order.
    pub fn vvd(&self) -> Vec<u8> {
        let mut w = Writer::new();
        let count = self.parts.len() * VERTICES_PER_MODEL;
        w.zeros(64);
        w.put_at(0, *b"IDSV")
            .put_at(4, 4i32)
            .put_at(8, self.sibling_checksum)
            .put_at(12, self.vvd_lods as i32);
        for lod in 0..self.vvd_lods {
            w.put_at(16 + 4 * lod as u64, count as i32);
        }
        let fixups = w.position();
        w.put_at(48, self.fixups.len() as i32)
            .put_at(52, fixups as i32);
        for fixup in &self.fixups {
            w.put(*fixup);
        }
        let vertices = w.position();
        w.put_at(56, vertices as i32);
        for index in 0..count {
            let corner = (index % VERTICES_PER_MODEL) as f32;
            w.put([1.0f32, 0.0, 0.0])
                .put([0i8, 0, 0])
                .put(1u8)
                .put([corner, (index / VERTICES_PER_MODEL) as f32, 0.0])
                .put([0.0f32, 0.0, 1.0])
                .put([corner * 0.5, 0.0]);
        }
        let tangents = w.position();
        w.put_at(60, tangents as i32);
        for _ in 0..count {
            w.put([1.0f32, 0.0, 0.0, 1.0]);
        }
        w.finish()
    }

    /// Two tetrahedra: solid 0 on the first bone, solid 1 on the last.
    pub fn phy(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put(16i32).put(0i32).put(2i32).put(self.sibling_checksum);
        for bone_index in [1i32, self.bones.len() as i32] {
            let solid = w.position();
            w.put(0i32)
                .put(*b"VPHY")
                .put(0x100i16)
                .put(0i16)
                .put(0i32)
                .put([0.0f32; 3])
                .put(0i32)
                .put([0i32; 12]);
            let section = w.position();
            let triangles: [[u16; 3]; 4] = [[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];
            let pool = section + 16 + 16 * triangles.len() as u64;
            w.put((pool - section) as i32)
                .put(bone_index)
                .put(0i32)
                .put(triangles.len() as i32);
            for (index, [a, b, c]) in triangles.into_iter().enumerate() {
                w.put(index as u8)
                    .put(0u8)
                    .put(0u16)
                    .put([a, 0u16, b, 0u16, c, 0u16]);
            }
            for vertex in [
                [0.0f32, 0.0, 0.0, 0.0],
                [0.1, 0.0, 0.0, 0.0],
                [0.0, 0.1, 0.0, 0.0],
                [0.0, 0.0, 0.1, 0.0],
            ] {
                w.put(vertex);
            }
            let end = w.position();
            w.put_at(solid, (end - solid - 4) as i32);
        }
        let text = "solid {\n\"index\" \"0\"\n\"name\" \"root\"\n\"surfaceprop\" \"metal\"\n\"mass\" \"5\"\n}\n\
                    solid {\n\"index\" \"1\"\n\"name\" \"arm\"\n}\n\
                    ragdollconstraint {\n\"parent\" \"0\"\n\"child\" \"1\"\n\"xmin\" \"-45\"\n\"xmax\" \"45\"\n}\n";
        w.put(text.as_bytes().to_vec()).put(0u8);
        w.finish()
    }
}
