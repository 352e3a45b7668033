//! Live camera scanning with repeat suppression.
//!
//! The camera keeps delivering the same QR code for as long as it stays in view.
//! [`QrScanner`] only classifies a payload the first time it is seen: a recognized
//! payload pauses the scanner until the screen explicitly resumes it, an unrecognized
//! one is reported once and then suppressed while it stays in front of the camera.
//! State lives in the scanner itself, one scanner per screen or session.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::scan::{ScanClassifier, ScanMode, ScanResult};

/// Haptic feedback hint for the platform to trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum HapticFeedback {
    /// Light tap, new part of a multipart QR scanned
    Progress,
    /// Success notification, scan complete
    Success,
    /// No haptic feedback (duplicate, no change)
    None,
}

/// What happened with one camera read
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum ScanEvent {
    /// Scanner is paused, read dropped
    Ignored,
    /// Same payload as the last one processed
    Duplicate,
    /// New payload that no decoder recognized
    Unrecognized,
    /// New payload, recognized, scanner is now paused
    Classified { result: ScanResult, haptic: HapticFeedback },
}

#[derive(Debug)]
pub struct QrScanner {
    classifier: ScanClassifier,
    last_payload: Option<String>,
    paused: bool,
}

impl QrScanner {
    pub fn new(mode: ScanMode) -> Self {
        Self::with_classifier(ScanClassifier::for_mode(mode))
    }

    pub fn with_classifier(classifier: ScanClassifier) -> Self {
        Self { classifier, last_payload: None, paused: false }
    }

    /// Handle one read from the live camera preview
    pub fn on_read(&mut self, raw: &str) -> ScanEvent {
        if self.paused {
            return ScanEvent::Ignored;
        }

        if self.last_payload.as_deref() == Some(raw) {
            return ScanEvent::Duplicate;
        }

        self.process(raw)
    }

    /// Handle a payload detected in a still image, repeats are not suppressed
    pub fn on_image_read(&mut self, raw: &str) -> ScanEvent {
        self.process(raw)
    }

    fn process(&mut self, raw: &str) -> ScanEvent {
        self.last_payload = Some(raw.to_string());

        match self.classifier.classify(raw) {
            Some(result) => {
                debug!("classified {} scan, pausing scanner", result.kind());
                self.paused = true;
                ScanEvent::Classified { result, haptic: HapticFeedback::Success }
            }
            None => ScanEvent::Unrecognized,
        }
    }

    /// Pause the preview, reads are ignored until [`QrScanner::resume`]
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Start reading again, the last payload can be read again too
    pub fn resume(&mut self) {
        self.paused = false;
        self.last_payload = None;
    }

    /// Start reading again but keep ignoring the last payload while it stays in view
    pub fn dismiss(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn reset(&mut self) {
        self.resume();
    }
}

/// FFI wrapper for [`QrScanner`]
#[derive(Debug, uniffi::Object)]
pub struct RustQrScanner(Arc<Mutex<QrScanner>>);

#[uniffi::export]
impl RustQrScanner {
    #[uniffi::constructor]
    pub fn new(mode: ScanMode) -> Self {
        Self(Arc::new(Mutex::new(QrScanner::new(mode))))
    }

    #[uniffi::method]
    pub fn on_read(&self, raw: String) -> ScanEvent {
        self.0.lock().on_read(&raw)
    }

    #[uniffi::method]
    pub fn on_image_read(&self, raw: String) -> ScanEvent {
        self.0.lock().on_image_read(&raw)
    }

    #[uniffi::method]
    pub fn pause(&self) {
        self.0.lock().pause()
    }

    #[uniffi::method]
    pub fn resume(&self) {
        self.0.lock().resume()
    }

    #[uniffi::method]
    pub fn dismiss(&self) {
        self.0.lock().dismiss()
    }

    #[uniffi::method]
    pub fn is_paused(&self) -> bool {
        self.0.lock().is_paused()
    }

    #[uniffi::method]
    pub fn reset(&self) {
        self.0.lock().reset()
    }
}
