//! Run-length compressed animation values.
//!
//! One axis of one channel is stored as a list of runs. A run header holds two bytes, `valid`
//! and `total`, followed by `valid` signed 16-bit values. The run covers `total` frames: the
//! explicit values first, then the last explicit value repeated.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use crate::loader::format::read_at;

#[derive(Debug)]
pub enum RunError {
    EmptyRun { position: u64 },
    NoValues { position: u64 },
    TooManyValues { position: u64, valid: u8, total: u8 },
    Length { expected: usize, actual: usize },
    Format(binrw::Error),
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RunError::EmptyRun { position } => {
                write!(f, "Run at {:#x} covers no frames", position)
            }
            RunError::NoValues { position } => {
                write!(f, "Run at {:#x} has no explicit values", position)
            }
            RunError::TooManyValues {
                position,
                valid,
                total,
            } => write!(
                f,
                "Run at {:#x} has {} values for {} frames",
                position, valid, total
            ),
            RunError::Length { expected, actual } => write!(
                f,
                "Runs cover {} frames, but the clip has {}",
                actual, expected
            ),
            RunError::Format(err) => write!(f, "Bad run data: {}", err),
        }
    }
}

impl Error for RunError {}

impl From<binrw::Error> for RunError {
    fn from(value: binrw::Error) -> Self {
        RunError::Format(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub total: u8,
    pub values: Vec<i16>,
}

/// Reads runs starting at `position` until they cover at least `frame_count` frames.
pub fn read_runs(data: &[u8], mut position: u64, frame_count: usize) -> Result<Vec<Run>, RunError> {
    let mut runs = Vec::new();
    let mut covered = 0usize;
    while covered < frame_count {
        let [valid, total]: [u8; 2] = read_at(data, position)?;
        if total == 0 {
            return Err(RunError::EmptyRun { position });
        }
        if valid == 0 {
            return Err(RunError::NoValues { position });
        }
        if valid > total {
            return Err(RunError::TooManyValues {
                position,
                valid,
                total,
            });
        }
        let values = (1..=u64::from(valid))
            .map(|slot| read_at::<i16>(data, position + slot * 2))
            .collect::<Result<Vec<_>, _>>()?;
        position += (1 + u64::from(valid)) * 2;
        covered += usize::from(total);
        runs.push(Run { total, values });
    }
    Ok(runs)
}

fn unpack(runs: &[Run]) -> Vec<i16> {
    let mut samples = Vec::new();
    for run in runs {
        samples.extend_from_slice(&run.values);
        if let Some(last) = run.values.last() {
            let repeats = usize::from(run.total) - run.values.len();
            samples.extend(std::iter::repeat(*last).take(repeats));
        }
    }
    samples
}

/// One sample per frame. The runs must cover exactly `frame_count` frames.
pub fn expand(runs: &[Run], frame_count: usize) -> Result<Vec<i16>, RunError> {
    let samples = unpack(runs);
    if samples.len() != frame_count {
        return Err(RunError::Length {
            expected: frame_count,
            actual: samples.len(),
        });
    }
    Ok(samples)
}

/// The first `frame_count` samples. Sections may store frames past the ones they own.
pub fn expand_prefix(runs: &[Run], frame_count: usize) -> Result<Vec<i16>, RunError> {
    let mut samples = unpack(runs);
    if samples.len() < frame_count {
        return Err(RunError::Length {
            expected: frame_count,
            actual: samples.len(),
        });
    }
    samples.truncate(frame_count);
    Ok(samples)
}
