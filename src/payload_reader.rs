//! Reading UOS payload QR codes, single or multipart.
//!
//! The reverse of the animated payload display: frames are fed in as the camera sees
//! them and the joined payload is decoded into a [`UosPayload`] once all of them are in.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use uos_macros::impl_default_for;

use crate::{
    multi_frame::{FrameError, FrameJoiner, JoinResult, MULTIPART_MARKER},
    qr_scanner::HapticFeedback,
    uos::decode::{UosDecodeError, UosPayload, decode_raw_qr_bytes},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
pub enum PayloadReadError {
    #[error("frame is empty")]
    EmptyFrame,

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Decode(#[from] UosDecodeError),
}

type Error = PayloadReadError;

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum PayloadReadResult {
    InProgress { scanned: u32, total: u32, haptic: HapticFeedback },
    Complete { payload: UosPayload, haptic: HapticFeedback },
}

/// Reader state machine
#[derive(Debug, Default)]
enum PayloadReader {
    #[default]
    Uninitialized,
    InProgress(FrameJoiner),
    Complete(UosPayload),
}

impl PayloadReader {
    /// Add one frame
    ///
    /// State transitions:
    /// - Uninitialized → Complete (bare payload or single frame) or InProgress
    /// - InProgress → InProgress (more frames) or Complete
    /// - Complete → returns the cached payload (call `reset()` to read again)
    fn read_frame(&mut self, frame: &[u8]) -> Result<PayloadReadResult, Error> {
        if frame.is_empty() && !matches!(self, Self::Complete(_)) {
            return Err(Error::EmptyFrame);
        }

        let mut joiner = match std::mem::take(self) {
            Self::Complete(payload) => {
                *self = Self::Complete(payload.clone());
                return Ok(PayloadReadResult::Complete { payload, haptic: HapticFeedback::None });
            }
            Self::InProgress(joiner) => joiner,
            Self::Uninitialized if frame.first() == Some(&MULTIPART_MARKER) => FrameJoiner::new(),
            Self::Uninitialized => return self.complete(frame),
        };

        let join_result = match joiner.add_frame(frame) {
            Ok(join_result) => join_result,
            Err(error) => {
                // keep what has been collected so far
                if joiner.scanned() > 0 {
                    *self = Self::InProgress(joiner);
                }

                return Err(error.into());
            }
        };

        match join_result {
            JoinResult::Complete(data) => self.complete(&data),
            JoinResult::InProgress { scanned, total, is_new } => {
                debug!("payload frames scanned {scanned} of {total}");
                *self = Self::InProgress(joiner);

                let haptic = if is_new { HapticFeedback::Progress } else { HapticFeedback::None };
                Ok(PayloadReadResult::InProgress { scanned, total, haptic })
            }
        }
    }

    fn complete(&mut self, data: &[u8]) -> Result<PayloadReadResult, Error> {
        let payload = UosPayload::parse(data)?;
        *self = Self::Complete(payload.clone());

        Ok(PayloadReadResult::Complete { payload, haptic: HapticFeedback::Success })
    }

    fn reset(&mut self) {
        *self = Self::Uninitialized;
    }
}

/// FFI wrapper for the payload reader state machine
#[derive(Debug, uniffi::Object)]
pub struct RustUosPayloadReader(Arc<Mutex<PayloadReader>>);

impl_default_for!(RustUosPayloadReader);

#[uniffi::export]
impl RustUosPayloadReader {
    #[uniffi::constructor]
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(PayloadReader::Uninitialized)))
    }

    /// Add a frame from a binary QR read
    #[uniffi::method]
    pub fn read_frame(&self, frame: Vec<u8>) -> Result<PayloadReadResult, PayloadReadError> {
        self.0.lock().read_frame(&frame)
    }

    /// Add a frame from the hex bitstream some camera libraries report
    #[uniffi::method]
    pub fn read_raw(&self, raw: String) -> Result<PayloadReadResult, PayloadReadError> {
        let frame = decode_raw_qr_bytes(&raw)?;
        self.0.lock().read_frame(&frame)
    }

    #[uniffi::method]
    pub fn reset(&self) {
        self.0.lock().reset()
    }
}
