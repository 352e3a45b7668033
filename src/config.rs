//! Display settings for signing payload QR codes

use crate::{multi_frame::DEFAULT_FRAME_SIZE, qr_image::QrErrorCorrection};

/// How often an animated QR moves to its next frame
pub const DEFAULT_FRAME_DELAY_MS: u64 = 2750;

/// Pixels per QR module
pub const DEFAULT_MODULE_SIZE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct QrDisplayConfig {
    /// Payload bytes per transport frame
    pub frame_size: u32,
    /// Time (ms) each frame of an animated QR stays on screen
    pub frame_delay_ms: u64,
    /// Width and height (px) of a single QR module
    pub module_size: u32,
    /// Draw the white border around the code
    pub quiet_zone: bool,
    pub error_correction: QrErrorCorrection,
}

impl Default for QrDisplayConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE as u32,
            frame_delay_ms: DEFAULT_FRAME_DELAY_MS,
            module_size: DEFAULT_MODULE_SIZE,
            quiet_zone: false,
            error_correction: QrErrorCorrection::Medium,
        }
    }
}

impl QrDisplayConfig {
    pub fn frame_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frame_delay_ms)
    }
}

#[uniffi::export]
fn default_qr_display_config() -> QrDisplayConfig {
    QrDisplayConfig::default()
}
