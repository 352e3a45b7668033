//! Splitting a payload into numbered transport frames and joining them back.
//!
//! Each frame is `0x00 | frame count (u16 BE) | frame index (u16 BE) | chunk`. The
//! companion device reads the frames in whatever order the animation shows them and
//! stitches the chunks back together once it has all of them.

use tracing::{debug, warn};

/// Marks a frame as part of a multipart sequence
pub const MULTIPART_MARKER: u8 = 0x00;

pub const FRAME_HEADER_LEN: usize = 5;

/// Default number of payload bytes carried by one frame
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Sequences with more frames than this are refused when scanning
pub const MAX_SCANNED_FRAMES: u16 = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
pub enum FrameError {
    #[error("frame size must be greater than zero")]
    ZeroFrameSize,

    #[error("payload needs {0} frames, at most 65535 are supported")]
    TooManyFramesToEncode(u64),

    #[error("frame is too short for a multipart header: {0} bytes")]
    TruncatedHeader(u32),

    #[error("not a multipart frame, starts with: {0}")]
    NotMultipart(u8),

    #[error("frame count must be at least 1")]
    ZeroFrameCount,

    #[error("too many frames: {0}, max is 50")]
    TooManyFrames(u16),

    #[error("frame index {index} is out of range for {count} frames")]
    IndexOutOfRange { index: u16, count: u16 },

    #[error("frame count changed from {expected} to {found} mid scan")]
    FrameCountChanged { expected: u16, found: u16 },
}

type Error = FrameError;

/// Split `data` into transport frames
///
/// With `skip_encoding` the data is already a displayable frame and is passed through
/// untouched. Empty data gives no frames.
pub fn create_frames(
    data: &[u8],
    skip_encoding: bool,
    frame_size: usize,
) -> Result<Vec<Vec<u8>>, Error> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    if skip_encoding {
        return Ok(vec![data.to_vec()]);
    }

    if frame_size == 0 {
        return Err(Error::ZeroFrameSize);
    }

    let count = data.len().div_ceil(frame_size);
    let count = u16::try_from(count).map_err(|_| Error::TooManyFramesToEncode(count as u64))?;

    let frames = data
        .chunks(frame_size)
        .enumerate()
        .map(|(index, chunk)| {
            let header = FrameHeader { count, index: index as u16 };

            let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + chunk.len());
            frame.extend_from_slice(&header.to_bytes());
            frame.extend_from_slice(chunk);
            frame
        })
        .collect::<Vec<_>>();

    debug!("split {} bytes into {} frames", data.len(), frames.len());
    Ok(frames)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    pub count: u16,
    pub index: u16,
}

impl FrameHeader {
    pub fn to_bytes(self) -> [u8; FRAME_HEADER_LEN] {
        let [count_high, count_low] = self.count.to_be_bytes();
        let [index_high, index_low] = self.index.to_be_bytes();
        [MULTIPART_MARKER, count_high, count_low, index_high, index_low]
    }

    /// Parse the header, returning it along with the chunk that follows
    pub fn parse(frame: &[u8]) -> Result<(Self, &[u8]), Error> {
        if frame.len() < FRAME_HEADER_LEN {
            return Err(Error::TruncatedHeader(frame.len() as u32));
        }

        if frame[0] != MULTIPART_MARKER {
            return Err(Error::NotMultipart(frame[0]));
        }

        let count = u16::from_be_bytes([frame[1], frame[2]]);
        let index = u16::from_be_bytes([frame[3], frame[4]]);

        Ok((Self { count, index }, &frame[FRAME_HEADER_LEN..]))
    }
}

/// Outcome of adding one frame to a [`FrameJoiner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinResult {
    InProgress {
        scanned: u32,
        total: u32,
        /// False when the frame had already been seen
        is_new: bool,
    },
    Complete(Vec<u8>),
}

/// Collects multipart frames in any order
#[derive(Debug, Default)]
pub struct FrameJoiner {
    parts: Vec<Option<Vec<u8>>>,
    scanned: u32,
}

impl FrameJoiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_frame(&mut self, frame: &[u8]) -> Result<JoinResult, Error> {
        let (header, chunk) = FrameHeader::parse(frame)?;
        let FrameHeader { count, index } = header;

        if count == 0 {
            return Err(Error::ZeroFrameCount);
        }

        if count > MAX_SCANNED_FRAMES {
            return Err(Error::TooManyFrames(count));
        }

        if index >= count {
            return Err(Error::IndexOutOfRange { index, count });
        }

        if self.parts.is_empty() {
            self.parts = vec![None; count as usize];
        }

        let expected = self.parts.len() as u16;
        if expected != count {
            warn!("frame count changed from {expected} to {count}");
            return Err(Error::FrameCountChanged { expected, found: count });
        }

        let slot = &mut self.parts[index as usize];
        let is_new = slot.is_none();
        if is_new {
            *slot = Some(chunk.to_vec());
            self.scanned += 1;
        }

        if self.scanned < count as u32 {
            return Ok(JoinResult::InProgress { scanned: self.scanned, total: count as u32, is_new });
        }

        let data = self.parts.iter().flatten().flatten().copied().collect();
        Ok(JoinResult::Complete(data))
    }

    pub fn total(&self) -> u32 {
        self.parts.len() as u32
    }

    pub fn scanned(&self) -> u32 {
        self.scanned
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_data_has_no_frames() {
        assert!(create_frames(&[], false, DEFAULT_FRAME_SIZE).unwrap().is_empty());
        assert!(create_frames(&[], true, DEFAULT_FRAME_SIZE).unwrap().is_empty());
    }

    #[test]
    fn test_skip_encoding_passes_data_through() {
        let data = vec![0x53, 0x01, 0x02];
        assert_eq!(create_frames(&data, true, DEFAULT_FRAME_SIZE).unwrap(), vec![data]);
    }

    #[test]
    fn test_single_frame_header() {
        let frames = create_frames(&[0xaa, 0xbb], false, DEFAULT_FRAME_SIZE).unwrap();
        assert_eq!(frames, vec![vec![0x00, 0x00, 0x01, 0x00, 0x00, 0xaa, 0xbb]]);
    }

    #[test]
    fn test_frame_boundaries() {
        let exact = vec![1u8; DEFAULT_FRAME_SIZE];
        assert_eq!(create_frames(&exact, false, DEFAULT_FRAME_SIZE).unwrap().len(), 1);

        let over = vec![1u8; DEFAULT_FRAME_SIZE + 1];
        let frames = create_frames(&over, false, DEFAULT_FRAME_SIZE).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), FRAME_HEADER_LEN + DEFAULT_FRAME_SIZE);
        assert_eq!(frames[1].len(), FRAME_HEADER_LEN + 1);
        assert_eq!(&frames[1][..FRAME_HEADER_LEN], &[0x00, 0x00, 0x02, 0x00, 0x01]);
    }

    #[test]
    fn test_zero_frame_size() {
        assert_eq!(create_frames(&[1], false, 0), Err(FrameError::ZeroFrameSize));
    }

    #[test]
    fn test_join_out_of_order_with_duplicates() {
        let data = (0..=255u8).cycle().take(25).collect::<Vec<_>>();
        let frames = create_frames(&data, false, 10).unwrap();
        assert_eq!(frames.len(), 3);

        let mut joiner = FrameJoiner::new();

        assert_eq!(
            joiner.add_frame(&frames[2]).unwrap(),
            JoinResult::InProgress { scanned: 1, total: 3, is_new: true }
        );

        assert_eq!(
            joiner.add_frame(&frames[2]).unwrap(),
            JoinResult::InProgress { scanned: 1, total: 3, is_new: false }
        );

        assert_eq!(
            joiner.add_frame(&frames[0]).unwrap(),
            JoinResult::InProgress { scanned: 2, total: 3, is_new: true }
        );

        assert_eq!(joiner.add_frame(&frames[1]).unwrap(), JoinResult::Complete(data));
    }

    #[test]
    fn test_join_rejects_bad_frames() {
        let mut joiner = FrameJoiner::new();

        assert_eq!(joiner.add_frame(&[0x00, 0x01]), Err(FrameError::TruncatedHeader(2)));
        assert_eq!(joiner.add_frame(&[0x53, 0, 1, 0, 0]), Err(FrameError::NotMultipart(0x53)));
        assert_eq!(joiner.add_frame(&[0x00, 0, 0, 0, 0]), Err(FrameError::ZeroFrameCount));
        assert_eq!(joiner.add_frame(&[0x00, 0, 51, 0, 0]), Err(FrameError::TooManyFrames(51)));
        assert_eq!(
            joiner.add_frame(&[0x00, 0, 2, 0, 2]),
            Err(FrameError::IndexOutOfRange { index: 2, count: 2 })
        );
    }

    #[test]
    fn test_join_rejects_count_change() {
        let mut joiner = FrameJoiner::new();
        joiner.add_frame(&[0x00, 0, 3, 0, 0, 0xaa]).unwrap();

        assert_eq!(
            joiner.add_frame(&[0x00, 0, 4, 0, 1, 0xbb]),
            Err(FrameError::FrameCountChanged { expected: 3, found: 4 })
        );

        joiner.reset();
        assert_eq!(
            joiner.add_frame(&[0x00, 0, 1, 0, 0, 0xbb]).unwrap(),
            JoinResult::Complete(vec![0xbb])
        );
    }
}
