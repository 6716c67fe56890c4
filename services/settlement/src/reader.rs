//! Journal replay
//!
//! Segments are read oldest first. Every frame must decode, pass its
//! checksum and carry the next sequence number. Damage at the end of the
//! newest segment is a torn write from a crash and can be cut away;
//! damage anywhere else means the journal cannot be trusted.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::journal::{segments, Frame};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("{segment} damaged at offset {offset}: {detail}")]
    Damaged { segment: String, offset: u64, detail: String },

    #[error("sequence {got} follows {previous}")]
    OutOfSequence { previous: u64, got: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Damage {
    /// Frame decoded but its checksum does not match
    BadChecksum,
    /// Frame cut short or structurally invalid
    Torn,
}

/// Where the newest segment stopped holding valid frames
#[derive(Debug, Clone)]
pub struct TailDamage {
    pub segment: PathBuf,
    pub offset: u64,
    pub damage: Damage,
    pub detail: String,
    /// Bytes cut off when repairing, zero otherwise
    pub truncated: u64,
}

#[derive(Debug, Default)]
pub struct Replay {
    /// Intact frames in sequence order
    pub frames: Vec<Frame>,
    pub tail: Option<TailDamage>,
}

impl Replay {
    pub fn next_sequence(&self) -> u64 {
        self.frames.last().map_or(1, |frame| frame.sequence + 1)
    }
}

/// Replay every segment in `dir`. With `repair`, a damaged tail is
/// truncated so the writer resumes on a frame boundary.
pub fn replay(dir: &Path, repair: bool) -> Result<Replay, ReplayError> {
    let files = segments(dir)?;
    let mut replay = Replay::default();

    for (index, path) in files.iter().enumerate() {
        let data = fs::read(path)?;
        let Some((offset, damage, detail)) = scan(&data, &mut replay.frames)? else {
            continue;
        };

        if index + 1 != files.len() {
            return Err(ReplayError::Damaged {
                segment: path.display().to_string(),
                offset: offset as u64,
                detail,
            });
        }

        warn!(segment = %path.display(), offset, ?damage, %detail, "damaged journal tail");
        let mut truncated = 0;
        if repair {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset as u64)?;
            file.sync_all()?;
            truncated = (data.len() - offset) as u64;
        }
        replay.tail = Some(TailDamage {
            segment: path.clone(),
            offset: offset as u64,
            damage,
            detail,
            truncated,
        });
    }

    Ok(replay)
}

/// Push the segment's intact frames onto `frames`, stopping at the first
/// damaged one.
fn scan(data: &[u8], frames: &mut Vec<Frame>) -> Result<Option<(usize, Damage, String)>, ReplayError> {
    let mut offset = 0;
    while offset < data.len() {
        let (frame, used) = match Frame::decode(&data[offset..]) {
            Ok(decoded) => decoded,
            Err(err) => return Ok(Some((offset, Damage::Torn, err.to_string()))),
        };
        if !frame.is_intact() {
            let detail = format!("sequence {} stored crc {:#010x}", frame.sequence, frame.checksum);
            return Ok(Some((offset, Damage::BadChecksum, detail)));
        }
        if let Some(previous) = frames.last().map(|f| f.sequence) {
            if frame.sequence != previous + 1 {
                return Err(ReplayError::OutOfSequence {
                    previous,
                    got: frame.sequence,
                });
            }
        }
        frames.push(frame);
        offset += used;
    }
    Ok(None)
}
