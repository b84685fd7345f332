use std::ops::RangeInclusive;

use crate::error::{FileKind, ValidationError};

use super::format::{
    mdl::{StudioHeader, ANIMATION_BLOCK_MAGIC, MODEL_MAGIC},
    phy::PHY_HEADER_SIZE,
    vtx::{VtxHeader, VTX_VERSION},
    vvd::{VvdHeader, VVD_MAGIC, VVD_VERSION},
};

/// Header constants one file must match before any of its structure is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCheck {
    pub file: FileKind,
    pub min_size: usize,
    pub magic: Option<[u8; 4]>,
    /// Name, position and accepted values of the version-like field.
    pub version: (&'static str, usize, RangeInclusive<i32>),
    /// Position of the checksum and the value it must have.
    pub checksum: Option<(usize, i32)>,
}

fn read_i32(data: &[u8], position: usize) -> Option<i32> {
    let bytes = data.get(position..position + 4)?;
    Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn describe_magic(magic: &[u8]) -> String {
    format!("{:?}", String::from_utf8_lossy(magic))
}

impl HeaderCheck {
    pub fn model() -> Self {
        Self {
            file: FileKind::Model,
            min_size: StudioHeader::SIZE,
            magic: Some(MODEL_MAGIC),
            version: ("version", 4, 44..=48),
            checksum: None,
        }
    }

    pub fn animation_blocks() -> Self {
        Self {
            file: FileKind::AnimationBlocks,
            min_size: 12,
            magic: Some(ANIMATION_BLOCK_MAGIC),
            version: ("version", 4, 44..=48),
            checksum: None,
        }
    }

    pub fn hardware_mesh(checksum: i32) -> Self {
        Self {
            file: FileKind::HardwareMesh,
            min_size: VtxHeader::SIZE,
            magic: None,
            version: ("version", 0, VTX_VERSION..=VTX_VERSION),
            checksum: Some((16, checksum)),
        }
    }

    pub fn vertex_data(checksum: i32) -> Self {
        Self {
            file: FileKind::VertexData,
            min_size: VvdHeader::SIZE,
            magic: Some(VVD_MAGIC),
            version: ("version", 4, VVD_VERSION..=VVD_VERSION),
            checksum: Some((8, checksum)),
        }
    }

    pub fn collision(checksum: i32) -> Self {
        Self {
            file: FileKind::Collision,
            min_size: PHY_HEADER_SIZE as usize,
            magic: None,
            version: ("header size", 0, PHY_HEADER_SIZE..=PHY_HEADER_SIZE),
            checksum: Some((12, checksum)),
        }
    }

    /// Checks size, magic, version and checksum in that order, stopping at the first mismatch.
    pub fn validate(&self, data: &[u8]) -> Result<(), ValidationError> {
        let fail = |field: &'static str, expected: String, actual: String| ValidationError {
            file: self.file,
            field,
            expected,
            actual,
        };
        if data.len() < self.min_size {
            return Err(fail(
                "file size",
                format!("at least {} bytes", self.min_size),
                format!("{} bytes", data.len()),
            ));
        }
        if let Some(magic) = self.magic {
            if data[..4] != magic {
                return Err(fail("magic", describe_magic(&magic), describe_magic(&data[..4])));
            }
        }
        let (field, position, versions) = &self.version;
        let version = read_i32(data, *position).unwrap_or_default();
        if !versions.contains(&version) {
            let expected = if versions.start() == versions.end() {
                versions.start().to_string()
            } else {
                format!("{} to {}", versions.start(), versions.end())
            };
            return Err(fail(field, expected, version.to_string()));
        }
        if let Some((position, expected)) = self.checksum {
            let actual = read_i32(data, position).unwrap_or_default();
            if actual != expected {
                return Err(fail("checksum", expected.to_string(), actual.to_string()));
            }
        }
        Ok(())
    }
}
