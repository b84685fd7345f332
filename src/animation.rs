use glam::{Quat, Vec3};

use crate::transform::DecomposedTransform;

/// Per-frame local transforms of one bone. Both tracks hold exactly `frame_count` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneTrack {
    pub bone: usize,
    pub translations: Vec<Vec3>,
    pub rotations: Vec<Quat>,
}

impl BoneTrack {
    pub fn sample(&self, frame: usize) -> Option<DecomposedTransform> {
        Some(DecomposedTransform::new(
            *self.translations.get(frame)?,
            *self.rotations.get(frame)?,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimClip {
    pub name: String,
    pub frame_count: usize,
    pub frame_rate: f32,
    pub looping: bool,
    /// Tracks are offsets from the bind pose rather than absolute poses.
    pub delta: bool,
    /// One track per skeleton bone, in bone order.
    pub tracks: Vec<BoneTrack>,
}

impl AnimClip {
    pub fn duration(&self) -> f32 {
        if self.frame_rate > 0.0 && self.frame_count > 1 {
            (self.frame_count - 1) as f32 / self.frame_rate
        } else {
            0.0
        }
    }

    /// Local pose of every bone at `frame`.
    pub fn pose(&self, frame: usize) -> Option<Vec<DecomposedTransform>> {
        self.tracks.iter().map(|track| track.sample(frame)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInfo {
    pub name: String,
    pub activity: String,
    pub looping: bool,
    /// Indices into the imported clips.
    pub clips: Vec<usize>,
}
