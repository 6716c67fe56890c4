//! Commit journal
//!
//! Settlement commits are appended to numbered segment files as
//! length-prefixed frames, all integers little-endian:
//! ```text
//! [body_len u32][sequence u64][recorded_at i64][kind u8][payload_len u32][payload][crc32c u32]
//! ```
//! The CRC covers sequence, timestamp, kind and payload.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crc32c::{crc32c, crc32c_append};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed bytes around a payload: length prefix, header fields, checksum.
pub const FRAME_OVERHEAD: usize = 4 + 8 + 8 + 1 + 4 + 4;
/// Payloads above this are treated as a corrupt length prefix.
const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// What a frame's payload decodes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Trade = 1,
    Resolution = 2,
}

impl RecordKind {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(RecordKind::Trade),
            2 => Some(RecordKind::Resolution),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame needs {needed} bytes, {available} available")]
    Incomplete { needed: usize, available: usize },

    #[error("implausible body length {0}")]
    BadLength(usize),

    #[error("payload length {payload} inconsistent with body length {body}")]
    LengthMismatch { payload: usize, body: usize },

    #[error("unknown record kind {0}")]
    UnknownKind(u8),
}

/// One journaled commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Gapless, starting at 1
    pub sequence: u64,
    pub recorded_at: i64,
    pub kind: RecordKind,
    pub payload: Vec<u8>,
    pub checksum: u32,
}

impl Frame {
    /// Build a frame and compute its checksum.
    pub fn seal(sequence: u64, recorded_at: i64, kind: RecordKind, payload: Vec<u8>) -> Self {
        let checksum = Self::digest(sequence, recorded_at, kind, &payload);
        Self {
            sequence,
            recorded_at,
            kind,
            payload,
            checksum,
        }
    }

    fn digest(sequence: u64, recorded_at: i64, kind: RecordKind, payload: &[u8]) -> u32 {
        let crc = crc32c(&sequence.to_le_bytes());
        let crc = crc32c_append(crc, &recorded_at.to_le_bytes());
        let crc = crc32c_append(crc, &[kind as u8]);
        crc32c_append(crc, payload)
    }

    pub fn is_intact(&self) -> bool {
        self.checksum == Self::digest(self.sequence, self.recorded_at, self.kind, &self.payload)
    }

    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let body_len = (self.encoded_len() - 4) as u32;
        out.reserve(self.encoded_len());
        out.extend_from_slice(&body_len.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&self.recorded_at.to_le_bytes());
        out.push(self.kind as u8);
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.checksum.to_le_bytes());
    }

    /// Decode the frame at the front of `data`, returning it with the
    /// number of bytes it occupied. The checksum is not verified.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), FrameError> {
        let mut cursor = Cursor { data, pos: 0 };
        let body_len = cursor.u32()? as usize;
        if !(FRAME_OVERHEAD - 4..=FRAME_OVERHEAD - 4 + MAX_PAYLOAD).contains(&body_len) {
            return Err(FrameError::BadLength(body_len));
        }
        if data.len() < 4 + body_len {
            return Err(FrameError::Incomplete {
                needed: 4 + body_len,
                available: data.len(),
            });
        }

        let sequence = cursor.u64()?;
        let recorded_at = cursor.u64()? as i64;
        let tag = cursor.take(1)?[0];
        let kind = RecordKind::from_tag(tag).ok_or(FrameError::UnknownKind(tag))?;
        let payload_len = cursor.u32()? as usize;
        if payload_len + FRAME_OVERHEAD != 4 + body_len {
            return Err(FrameError::LengthMismatch {
                payload: payload_len,
                body: body_len,
            });
        }
        let payload = cursor.take(payload_len)?.to_vec();
        let checksum = cursor.u32()?;

        let frame = Self {
            sequence,
            recorded_at,
            kind,
            payload,
            checksum,
        };
        Ok((frame, cursor.pos))
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        let bytes = self.data.get(self.pos..self.pos + n).ok_or(FrameError::Incomplete {
            needed: self.pos + n,
            available: self.data.len(),
        })?;
        self.pos += n;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32, FrameError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, FrameError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }
}

/// When appended frames are fsynced. Frames always leave the process
/// buffer before `append` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPolicy {
    EveryRecord,
    EveryN(usize),
    /// Only when a segment is sealed
    OnRotation,
}

#[derive(Debug, Clone)]
pub struct JournalConfig {
    pub dir: PathBuf,
    /// Segment size that triggers rotation
    pub segment_bytes: u64,
    pub sync: SyncPolicy,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            segment_bytes: 64 * 1024 * 1024,
            sync: SyncPolicy::EveryRecord,
        }
    }

    pub fn with_segment_bytes(mut self, bytes: u64) -> Self {
        self.segment_bytes = bytes;
        self
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync = policy;
        self
    }
}

/// Appends frames to the newest segment, rolling to a new one when full.
pub struct SegmentWriter {
    config: JournalConfig,
    out: BufWriter<File>,
    segment: u64,
    segment_path: PathBuf,
    segment_len: u64,
    next_sequence: u64,
    unsynced: usize,
    scratch: Vec<u8>,
}

impl SegmentWriter {
    /// Open the newest segment for appending. `next_sequence` comes from
    /// replaying the existing segments.
    pub fn open(config: JournalConfig, next_sequence: u64) -> io::Result<Self> {
        fs::create_dir_all(&config.dir)?;
        let segment = segment_indices(&config.dir)?.last().map_or(1, |(index, _)| *index);
        let segment_path = segment_path(&config.dir, segment);
        let file = OpenOptions::new().create(true).append(true).open(&segment_path)?;
        let segment_len = file.metadata()?.len();

        Ok(Self {
            config,
            out: BufWriter::new(file),
            segment,
            segment_path,
            segment_len,
            next_sequence,
            unsynced: 0,
            scratch: Vec::new(),
        })
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn segment_path(&self) -> &Path {
        &self.segment_path
    }

    /// Append `payload` under the next sequence number.
    pub fn append(&mut self, recorded_at: i64, kind: RecordKind, payload: Vec<u8>) -> io::Result<Frame> {
        if self.segment_len > 0 && self.segment_len >= self.config.segment_bytes {
            self.roll()?;
        }

        let frame = Frame::seal(self.next_sequence, recorded_at, kind, payload);
        self.scratch.clear();
        frame.encode_into(&mut self.scratch);
        self.out.write_all(&self.scratch)?;
        self.out.flush()?;

        self.segment_len += self.scratch.len() as u64;
        self.next_sequence += 1;
        self.unsynced += 1;

        let due = match self.config.sync {
            SyncPolicy::EveryRecord => true,
            SyncPolicy::EveryN(n) => self.unsynced >= n,
            SyncPolicy::OnRotation => false,
        };
        if due {
            self.sync()?;
        }
        Ok(frame)
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    fn roll(&mut self) -> io::Result<()> {
        self.sync()?;
        self.segment += 1;
        self.segment_path = segment_path(&self.config.dir, self.segment);
        let file = OpenOptions::new().create(true).append(true).open(&self.segment_path)?;
        self.out = BufWriter::new(file);
        self.segment_len = 0;
        Ok(())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        let _ = self.sync();
    }
}

pub(crate) fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("commits-{:08}.log", index))
}

fn segment_index(name: &str) -> Option<u64> {
    name.strip_prefix("commits-")?.strip_suffix(".log")?.parse().ok()
}

fn segment_indices(dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(index) = segment_index(&entry.file_name().to_string_lossy()) {
            segments.push((index, entry.path()));
        }
    }
    segments.sort_unstable_by_key(|(index, _)| *index);
    Ok(segments)
}

/// Segment files in `dir`, oldest first.
pub(crate) fn segments(dir: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(segment_indices(dir)?.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn frame(seq: u64) -> Frame {
        Frame::seal(seq, 1_708_123_456_789_000_000, RecordKind::Trade, b"trade".to_vec())
    }

    #[test]
    fn test_checksum_covers_header_and_payload() {
        let mut f = frame(1);
        assert!(f.is_intact());
        f.sequence = 2;
        assert!(!f.is_intact());

        let mut f = frame(1);
        f.kind = RecordKind::Resolution;
        assert!(!f.is_intact());
    }

    #[test]
    fn test_decode_reports_consumed_bytes() {
        let mut buf = Vec::new();
        frame(7).encode_into(&mut buf);
        frame(8).encode_into(&mut buf);
        assert_eq!(buf.len(), 2 * (FRAME_OVERHEAD + 5));

        let (first, used) = Frame::decode(&buf).unwrap();
        assert_eq!(first.sequence, 7);
        let (second, _) = Frame::decode(&buf[used..]).unwrap();
        assert_eq!(second, frame(8));
    }

    #[test]
    fn test_decode_rejects_damaged_frames() {
        let mut buf = Vec::new();
        frame(1).encode_into(&mut buf);

        assert!(matches!(
            Frame::decode(&buf[..buf.len() - 1]),
            Err(FrameError::Incomplete { .. })
        ));
        assert!(matches!(Frame::decode(&buf[..2]), Err(FrameError::Incomplete { .. })));
        assert!(matches!(
            Frame::decode(&[0xff, 0xff, 0xff, 0xff, 0, 0]),
            Err(FrameError::BadLength(_))
        ));

        let mut bad_kind = buf.clone();
        bad_kind[20] = 9;
        assert_eq!(Frame::decode(&bad_kind).unwrap_err(), FrameError::UnknownKind(9));
    }

    #[test]
    fn test_append_numbers_frames() {
        let tmp = TempDir::new().unwrap();
        let mut writer = SegmentWriter::open(JournalConfig::new(tmp.path()), 1).unwrap();
        for expected in 1..=10 {
            let f = writer.append(0, RecordKind::Trade, vec![7; 16]).unwrap();
            assert_eq!(f.sequence, expected);
        }
        assert_eq!(writer.next_sequence(), 11);
        assert_eq!(
            fs::metadata(writer.segment_path()).unwrap().len(),
            10 * (FRAME_OVERHEAD as u64 + 16)
        );
    }

    #[test]
    fn test_rolls_to_new_segment_and_reopens_newest() {
        let tmp = TempDir::new().unwrap();
        let config = JournalConfig::new(tmp.path()).with_segment_bytes(100);
        {
            let mut writer = SegmentWriter::open(config.clone(), 1).unwrap();
            for _ in 0..6 {
                writer.append(0, RecordKind::Trade, vec![0; 30]).unwrap();
            }
        }
        let files = segments(tmp.path()).unwrap();
        assert!(files.len() > 1);

        let writer = SegmentWriter::open(config, 7).unwrap();
        assert_eq!(Some(writer.segment_path()), files.last().map(PathBuf::as_path));
    }

    #[test]
    fn test_deferred_sync_still_reaches_file() {
        let tmp = TempDir::new().unwrap();
        let config = JournalConfig::new(tmp.path()).with_sync_policy(SyncPolicy::OnRotation);
        let mut writer = SegmentWriter::open(config, 1).unwrap();
        writer.append(0, RecordKind::Resolution, vec![1, 2, 3]).unwrap();

        let data = fs::read(writer.segment_path()).unwrap();
        let (f, _) = Frame::decode(&data).unwrap();
        assert_eq!(f.kind, RecordKind::Resolution);
        assert!(f.is_intact());
    }

    #[test]
    fn test_segment_naming() {
        assert_eq!(segment_path(Path::new("/tmp"), 42), PathBuf::from("/tmp/commits-00000042.log"));
        assert_eq!(segment_index("commits-00000042.log"), Some(42));
        assert_eq!(segment_index("journal-000042.bin"), None);
    }
}
