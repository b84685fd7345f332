//! Bit-packed values found in per-bone animation records.

use binrw::prelude::*;
use glam::{Quat, Vec3};
use half::f16;
use modular_bitfield::prelude::*;

use crate::loader::format::FixedSize;

#[bitfield]
#[derive(Debug, Clone, Copy, BinRead)]
#[br(map = Self::from_bytes)]
pub struct AnimFlags {
    pub raw_position: bool,
    pub raw_rotation: bool,
    pub animated_position: bool,
    pub animated_rotation: bool,
    pub delta: bool,
    pub raw_rotation64: bool,
    #[skip]
    __: B2,
}

/// Header of one bone's record. `next` is relative to the header and 0 on the last record.
#[derive(Debug, Clone, Copy, BinRead)]
pub struct AnimRecordHeader {
    pub bone: u8,
    pub flags: AnimFlags,
    pub next: i16,
}

impl FixedSize for AnimRecordHeader {
    const SIZE: u64 = 4;
}

impl AnimRecordHeader {
    /// Byte offset of the position data from the start of the record.
    pub fn position_data_offset(&self) -> u64 {
        let flags = self.flags;
        Self::SIZE
            + u64::from(flags.raw_rotation()) * Quaternion48::SIZE
            + u64::from(flags.raw_rotation64()) * Quaternion64::SIZE
            + u64::from(flags.animated_rotation()) * ValuePointers::SIZE
    }
}

/// Per-axis offsets to value runs, relative to the start of these pointers. 0 marks an axis with
/// no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
pub struct ValuePointers(pub [i16; 3]);

impl FixedSize for ValuePointers {
    const SIZE: u64 = 6;
}

fn unit_w(x: f32, y: f32, z: f32, negative: bool) -> Quat {
    let w = (1.0 - x * x - y * y - z * z).max(0.0).sqrt();
    Quat::from_xyzw(x, y, z, if negative { -w } else { w }).normalize()
}

#[bitfield]
#[derive(Debug, Clone, Copy, BinRead)]
#[br(map = Self::from_bytes)]
pub struct Quaternion48 {
    pub x: B16,
    pub y: B16,
    pub z: B15,
    pub w_negative: bool,
}

impl FixedSize for Quaternion48 {
    const SIZE: u64 = 6;
}

impl Quaternion48 {
    pub fn decode(&self) -> Quat {
        unit_w(
            (f32::from(self.x()) - 32768.0) / 32768.0,
            (f32::from(self.y()) - 32768.0) / 32768.0,
            (f32::from(self.z()) - 16384.0) / 16384.0,
            self.w_negative(),
        )
    }
}

#[bitfield]
#[derive(Debug, Clone, Copy, BinRead)]
#[br(map = Self::from_bytes)]
pub struct Quaternion64 {
    pub x: B21,
    pub y: B21,
    pub z: B21,
    pub w_negative: bool,
}

impl FixedSize for Quaternion64 {
    const SIZE: u64 = 8;
}

impl Quaternion64 {
    pub fn decode(&self) -> Quat {
        let axis = |value: u32| (value as f32 - 1048576.0) / 1048576.5;
        unit_w(
            axis(self.x()),
            axis(self.y()),
            axis(self.z()),
            self.w_negative(),
        )
    }
}

/// Three half floats.
#[derive(Debug, Clone, Copy, PartialEq, BinRead)]
pub struct Vector48(pub [u16; 3]);

impl FixedSize for Vector48 {
    const SIZE: u64 = 6;
}

impl Vector48 {
    pub fn decode(&self) -> Vec3 {
        let component = |bits: u16| {
            let value = f16::from_bits(bits).to_f32();
            if value.is_nan() {
                0.0
            } else {
                value.clamp(f16::MIN.to_f32(), f16::MAX.to_f32())
            }
        };
        Vec3::new(
            component(self.0[0]),
            component(self.0[1]),
            component(self.0[2]),
        )
    }
}
