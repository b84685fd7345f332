//! Keyframe clip decoding.
//!
//! Each clip is a chain of per-bone records. A record holds, per channel, either one raw value
//! for the whole clip (or section) or three axes of run-compressed values. Long clips are split
//! into sections that can live in the animation block file.

pub mod packed;
pub mod runs;

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use glam::{EulerRot, Quat, Vec3};

use self::{
    packed::{AnimRecordHeader, Quaternion48, Quaternion64, ValuePointers, Vector48},
    runs::{expand, expand_prefix, read_runs, RunError},
};
use super::format::{
    bad_data,
    mdl::{
        MdlAnimDesc, MdlFile, ANIM_DESC_ALL_ZEROS, ANIM_DESC_DELTA, ANIM_DESC_LOOPING,
        SEQUENCE_LOOPING,
    },
    offset, read_at, FixedSize,
};
use crate::{
    animation::{AnimClip, BoneTrack, SequenceInfo},
    coord::CoordinateTransform,
    error::{CrossReferenceError, CrossReferenceKind, FileKind, ImportError, Location},
    skeleton::{Skeleton, SkeletonError},
    transform::DecomposedTransform,
};

/// Marks the end of a record chain in place of a bone index.
const NO_BONE: u8 = 255;

/// Frames covered by one run, which takes at least four bytes of data.
const FRAMES_PER_RUN: usize = u8::MAX as usize;

/// Upper bound on decoded `frames * bones` for a single clip.
const MAX_CLIP_SAMPLES: usize = 1 << 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Rotation,
    Position,
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Rotation => write!(f, "rotation"),
            Channel::Position => write!(f, "position"),
        }
    }
}

#[derive(Debug)]
pub enum AnimationError {
    Runs {
        bone: usize,
        channel: Channel,
        axis: usize,
        error: RunError,
    },
    /// The clip claims more frames than the loaded data could describe.
    FrameCount {
        frames: i32,
        bones: usize,
    },
    NoClip {
        index: usize,
        count: usize,
    },
    Format(binrw::Error),
    CrossReference(CrossReferenceError),
    Skeleton(SkeletonError),
}

impl Display for AnimationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AnimationError::Runs {
                bone,
                channel,
                axis,
                error,
            } => write!(
                f,
                "Bad {} values of bone {} on axis {}: {}",
                channel, bone, axis, error
            ),
            AnimationError::FrameCount { frames, bones } => write!(
                f,
                "Clip claims {} frames for {} bones, more than its data can describe",
                frames, bones
            ),
            AnimationError::NoClip { index, count } => {
                write!(f, "No clip {} in a model with {} clips", index, count)
            }
            AnimationError::Format(err) => write!(f, "Bad animation data: {}", err),
            AnimationError::CrossReference(err) => Display::fmt(err, f),
            AnimationError::Skeleton(err) => Display::fmt(err, f),
        }
    }
}

impl Error for AnimationError {}

impl From<binrw::Error> for AnimationError {
    fn from(value: binrw::Error) -> Self {
        AnimationError::Format(value)
    }
}

impl From<CrossReferenceError> for AnimationError {
    fn from(value: CrossReferenceError) -> Self {
        AnimationError::CrossReference(value)
    }
}

impl From<SkeletonError> for AnimationError {
    fn from(value: SkeletonError) -> Self {
        AnimationError::Skeleton(value)
    }
}

/// Frames of one clip stored together: `(clip frame, frame within the stored data)`.
struct FrameSpan {
    frames: Vec<(usize, usize)>,
    stored: usize,
    exact: bool,
}

impl FrameSpan {
    fn whole(frame_count: usize) -> Self {
        Self {
            frames: (0..frame_count).map(|frame| (frame, frame)).collect(),
            stored: frame_count,
            exact: true,
        }
    }

    /// Frames owned by section `section`. A clip longer than one section keeps its last frame
    /// alone in section `frame_count / section_frames + 1`.
    fn section(section: usize, section_frames: usize, frame_count: usize) -> Self {
        let frames: Vec<_> = if frame_count <= section_frames {
            if section == 0 {
                (0..frame_count).map(|frame| (frame, frame)).collect()
            } else {
                Vec::new()
            }
        } else if section == frame_count / section_frames + 1 {
            vec![(frame_count - 1, 0)]
        } else {
            let start = section * section_frames;
            let end = (start + section_frames).min(frame_count - 1);
            (start..end).map(|frame| (frame, frame - start)).collect()
        };
        let stored = frames.iter().map(|(_, local)| local + 1).max().unwrap_or(0);
        Self {
            frames,
            stored,
            exact: false,
        }
    }
}

/// Per-frame source-convention pose of the file's own bones.
type SourceFrames = Vec<Vec<(Vec3, Quat)>>;

/// Decodes clips of one model against its source-convention skeleton.
pub struct ClipDecoder<'a> {
    pub model: &'a MdlFile,
    pub model_data: &'a [u8],
    pub animation_blocks: Option<&'a [u8]>,
    /// Built from the model's own bones, before any coordinate conversion.
    pub skeleton: &'a Skeleton,
    pub coord: &'a CoordinateTransform,
    pub root_yaw: Option<Quat>,
}

impl<'a> ClipDecoder<'a> {
    pub fn new(
        model: &'a MdlFile,
        model_data: &'a [u8],
        animation_blocks: Option<&'a [u8]>,
        skeleton: &'a Skeleton,
        coord: &'a CoordinateTransform,
        root_yaw_degrees: Option<f32>,
    ) -> Self {
        Self {
            model,
            model_data,
            animation_blocks,
            skeleton,
            coord,
            root_yaw: root_yaw_degrees.map(|degrees| Quat::from_rotation_z(degrees.to_radians())),
        }
    }

    /// Decodes every clip and maps sequences onto the clips that survived. Failing clips are
    /// logged and pushed to `rejected`.
    pub fn decode_all(&self, rejected: &mut Vec<ImportError>) -> (Vec<AnimClip>, Vec<SequenceInfo>) {
        let mut clips = Vec::with_capacity(self.model.animations.len());
        let mut clip_index = Vec::with_capacity(self.model.animations.len());
        for (index, desc) in self.model.animations.iter().enumerate() {
            match self.decode(index) {
                Ok(clip) => {
                    log::debug!(
                        "Decoded clip {:?}: {} frames at {} fps",
                        clip.name,
                        clip.frame_count,
                        clip.frame_rate
                    );
                    clip_index.push(Some(clips.len()));
                    clips.push(clip);
                }
                Err(error) => {
                    let clip = clip_name(desc);
                    log::error!("Skipping clip {:?}: {}", clip, error);
                    clip_index.push(None);
                    rejected.push(ImportError::Animation { clip, error });
                }
            }
        }

        let sequences = self
            .model
            .sequences
            .iter()
            .map(|sequence| SequenceInfo {
                name: sequence.label.clone(),
                activity: sequence.activity.clone(),
                looping: sequence.flags & SEQUENCE_LOOPING != 0,
                clips: sequence
                    .animations
                    .iter()
                    .filter_map(|animation| {
                        let index = usize::try_from(*animation).ok()?;
                        clip_index.get(index).copied().flatten()
                    })
                    .collect(),
            })
            .collect();
        (clips, sequences)
    }

    pub fn decode(&self, index: usize) -> Result<AnimClip, AnimationError> {
        let desc = self
            .model
            .animations
            .get(index)
            .ok_or(AnimationError::NoClip {
                index,
                count: self.model.animations.len(),
            })?;
        let frame_count = self.frame_count(desc)?;
        let delta = desc.flags & ANIM_DESC_DELTA != 0;

        let rest: Vec<(Vec3, Quat)> = self
            .model
            .bones
            .iter()
            .map(|bone| {
                if delta {
                    (Vec3::ZERO, Quat::IDENTITY)
                } else {
                    (bone.position, bone.quaternion)
                }
            })
            .collect();
        let mut frames: SourceFrames = vec![rest; frame_count];

        if desc.flags & ANIM_DESC_ALL_ZEROS == 0 {
            if desc.section_frames > 0 && !desc.sections.is_empty() {
                let section_frames = desc.section_frames as usize;
                for (section_index, section) in desc.sections.iter().enumerate() {
                    let span = FrameSpan::section(section_index, section_frames, frame_count);
                    if span.frames.is_empty() {
                        continue;
                    }
                    let (file, data, position) =
                        self.locate(index, desc, section.block, section.offset)?;
                    self.read_records(file, data, position, &span, delta, &mut frames)?;
                }
            } else {
                let (file, data, position) =
                    self.locate(index, desc, desc.anim_block, desc.anim_offset)?;
                let span = FrameSpan::whole(frame_count);
                self.read_records(file, data, position, &span, delta, &mut frames)?;
            }
        }

        if let (Some(yaw), false) = (self.root_yaw, delta) {
            let roots: Vec<usize> = (0..self.model.bones.len())
                .filter(|bone| self.model.bones[*bone].parent < 0)
                .collect();
            for frame in frames.iter_mut() {
                for root in &roots {
                    let (position, rotation) = frame[*root];
                    frame[*root] = (yaw * position, (yaw * rotation).normalize());
                }
            }
        }

        let offset = self.skeleton.index_offset();
        let mut tracks: Vec<BoneTrack> = (0..self.skeleton.len())
            .map(|bone| BoneTrack {
                bone,
                translations: Vec::with_capacity(frame_count),
                rotations: Vec::with_capacity(frame_count),
            })
            .collect();
        let synthetic = self.skeleton.bones()[..offset]
            .iter()
            .map(|bone| bone.local);
        for frame in &frames {
            let locals: Vec<DecomposedTransform> = synthetic
                .clone()
                .chain(
                    frame
                        .iter()
                        .map(|(position, rotation)| DecomposedTransform::new(*position, *rotation)),
                )
                .collect();
            let converted = self.skeleton.convert_pose(&locals, self.coord)?;
            for (track, local) in tracks.iter_mut().zip(converted) {
                track.translations.push(local.translation);
                track.rotations.push(local.rotation);
            }
        }

        Ok(AnimClip {
            name: clip_name(desc),
            frame_count,
            frame_rate: desc.fps,
            looping: desc.flags & ANIM_DESC_LOOPING != 0,
            delta,
            tracks,
        })
    }

    /// Frame count of `desc`, bounded by the loaded bytes before anything is allocated per frame.
    fn frame_count(&self, desc: &MdlAnimDesc) -> Result<usize, AnimationError> {
        let frame_count = desc.frame_count.max(1) as usize;
        let available = self.model_data.len() + self.animation_blocks.map_or(0, <[u8]>::len);
        let max_frames = (available / 4 + 1) * FRAMES_PER_RUN;
        let bones = self.skeleton.len();
        if frame_count > max_frames || frame_count.saturating_mul(bones.max(1)) > MAX_CLIP_SAMPLES {
            return Err(AnimationError::FrameCount {
                frames: desc.frame_count,
                bones,
            });
        }
        Ok(frame_count)
    }

    /// Finds the bytes a block-relative offset points at. Block 0 is the model file itself,
    /// with offsets relative to the animation description.
    fn locate(
        &self,
        index: usize,
        desc: &MdlAnimDesc,
        block: i32,
        relative: i32,
    ) -> Result<(FileKind, &'a [u8], u64), AnimationError> {
        if block == 0 {
            return Ok((FileKind::Model, self.model_data, offset(desc.position, relative)?));
        }
        let blocks = &self.model.anim_blocks;
        let entry = usize::try_from(block)
            .ok()
            .and_then(|block| blocks.get(block))
            .ok_or(CrossReferenceError {
                file: FileKind::Model,
                location: Location::clip(index),
                kind: CrossReferenceKind::AnimationBlock,
                expected: blocks.len() as i64,
                actual: i64::from(block),
            })?;
        let data = self.animation_blocks.ok_or(CrossReferenceError {
            file: FileKind::AnimationBlocks,
            location: Location::clip(index),
            kind: CrossReferenceKind::MissingFile,
            expected: 1,
            actual: 0,
        })?;
        let start = offset(0, entry.data_start)?;
        Ok((FileKind::AnimationBlocks, data, offset(start, relative)?))
    }

    fn read_records(
        &self,
        file: FileKind,
        data: &[u8],
        mut position: u64,
        span: &FrameSpan,
        clip_delta: bool,
        frames: &mut SourceFrames,
    ) -> Result<(), AnimationError> {
        let bone_count = self.model.bones.len();
        loop {
            let header: AnimRecordHeader = read_at(data, position)?;
            if header.bone == NO_BONE {
                break;
            }
            let bone = usize::from(header.bone);
            if bone >= bone_count {
                return Err(CrossReferenceError {
                    file,
                    location: Location::default(),
                    kind: CrossReferenceKind::BoneIndex,
                    expected: bone_count as i64,
                    actual: bone as i64,
                }
                .into());
            }
            let delta = clip_delta || header.flags.delta();
            let rotations = self.read_rotation(data, position, &header, bone, span, delta)?;
            let positions = self.read_position(data, position, &header, bone, span, delta)?;
            for (frame, local) in &span.frames {
                let pose = &mut frames[*frame][bone];
                if let Some(rotations) = &rotations {
                    pose.1 = rotations[*local];
                }
                if let Some(positions) = &positions {
                    pose.0 = positions[*local];
                }
            }

            match header.next {
                0 => break,
                next if next < 0 => {
                    return Err(bad_data(
                        position,
                        format!("Animation record points backwards ({})", next),
                    )
                    .into())
                }
                next => position = offset(position, i32::from(next))?,
            }
        }
        Ok(())
    }

    /// Decodes three axes of runs. Axes without data are zero.
    fn read_axes(
        &self,
        data: &[u8],
        pointers_at: u64,
        bone: usize,
        channel: Channel,
        span: &FrameSpan,
    ) -> Result<Vec<[f32; 3]>, AnimationError> {
        let ValuePointers(pointers) = read_at(data, pointers_at)?;
        let mut axes = vec![[0.0f32; 3]; span.stored];
        for (axis, pointer) in pointers.iter().enumerate() {
            if *pointer <= 0 {
                continue;
            }
            let wrap = |error: RunError| AnimationError::Runs {
                bone,
                channel,
                axis,
                error,
            };
            let start = offset(pointers_at, i32::from(*pointer))?;
            let runs = read_runs(data, start, span.stored).map_err(wrap)?;
            let samples = if span.exact {
                expand(&runs, span.stored)
            } else {
                expand_prefix(&runs, span.stored)
            }
            .map_err(wrap)?;
            for (values, sample) in axes.iter_mut().zip(samples) {
                values[axis] = f32::from(sample);
            }
        }
        Ok(axes)
    }

    fn read_rotation(
        &self,
        data: &[u8],
        record: u64,
        header: &AnimRecordHeader,
        bone: usize,
        span: &FrameSpan,
        delta: bool,
    ) -> Result<Option<Vec<Quat>>, AnimationError> {
        let flags = header.flags;
        let at = record + AnimRecordHeader::SIZE;
        if flags.raw_rotation() {
            let rotation = read_at::<Quaternion48>(data, at)?.decode();
            return Ok(Some(vec![rotation; span.stored]));
        }
        if flags.raw_rotation64() {
            let rotation = read_at::<Quaternion64>(data, at)?.decode();
            return Ok(Some(vec![rotation; span.stored]));
        }
        if !flags.animated_rotation() {
            return Ok(None);
        }
        let source = &self.model.bones[bone];
        let axes = self.read_axes(data, at, bone, Channel::Rotation, span)?;
        Ok(Some(
            axes.into_iter()
                .map(|values| {
                    let mut euler = Vec3::from_array(values) * source.rotation_scale;
                    if !delta {
                        euler += source.rotation;
                    }
                    Quat::from_euler(EulerRot::ZYX, euler.z, euler.y, euler.x)
                })
                .collect(),
        ))
    }

    fn read_position(
        &self,
        data: &[u8],
        record: u64,
        header: &AnimRecordHeader,
        bone: usize,
        span: &FrameSpan,
        delta: bool,
    ) -> Result<Option<Vec<Vec3>>, AnimationError> {
        let flags = header.flags;
        let at = record + header.position_data_offset();
        if flags.raw_position() {
            let position = read_at::<Vector48>(data, at)?.decode();
            return Ok(Some(vec![position; span.stored]));
        }
        if !flags.animated_position() {
            return Ok(None);
        }
        let source = &self.model.bones[bone];
        let axes = self.read_axes(data, at, bone, Channel::Position, span)?;
        Ok(Some(
            axes.into_iter()
                .map(|values| {
                    let offset = Vec3::from_array(values) * source.position_scale;
                    if delta {
                        offset
                    } else {
                        source.position + offset
                    }
                })
                .collect(),
        ))
    }
}

fn clip_name(desc: &MdlAnimDesc) -> String {
    desc.name.trim_start_matches('@').to_string()
}
