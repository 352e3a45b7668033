//! Timer driven display that cycles through the QR codes of a payload.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::time::{Instant, interval_at};
use tracing::{debug, trace};
use uos_tokio::AbortableTask;

use crate::{
    config::QrDisplayConfig,
    multi_frame::{self, FrameError},
    qr_image::{self, QrImage, QrImageError},
};

type FrameListener = Arc<dyn Fn(u32) + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
pub enum AnimatedQrError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Image(#[from] QrImageError),
}

/// Render every transport frame of `data` into a QR image
pub fn generate_images(
    data: &[u8],
    skip_encoding: bool,
    config: &QrDisplayConfig,
) -> Result<Vec<QrImage>, AnimatedQrError> {
    let frames = multi_frame::create_frames(data, skip_encoding, config.frame_size as usize)?;

    let images = frames
        .iter()
        .map(|frame| {
            qr_image::render(frame, config.error_correction, config.module_size, config.quiet_zone)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(images)
}

/// A list of QR images plus the one currently on screen
///
/// With more than one image a background ticker moves to the next image every
/// `frame_delay`, wrapping back to the first. The ticker stops when the display is
/// dropped or stopped.
#[derive(uniffi::Object)]
pub struct AnimatedQr {
    images: Vec<QrImage>,
    index: Arc<AtomicU32>,
    delay: Duration,
    listener: Option<FrameListener>,
    ticker: Mutex<Option<AbortableTask<()>>>,
}

impl std::fmt::Debug for AnimatedQr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatedQr")
            .field("frames", &self.images.len())
            .field("index", &self.index.load(Ordering::Relaxed))
            .field("delay", &self.delay)
            .finish()
    }
}

impl AnimatedQr {
    pub fn new(images: Vec<QrImage>, delay: Duration) -> Self {
        Self::build(images, delay, None)
    }

    /// Same as [`AnimatedQr::new`], calling `listener` with the new index on every advance
    pub fn with_listener(
        images: Vec<QrImage>,
        delay: Duration,
        listener: impl Fn(u32) + Send + Sync + 'static,
    ) -> Self {
        Self::build(images, delay, Some(Arc::new(listener)))
    }

    fn build(images: Vec<QrImage>, delay: Duration, listener: Option<FrameListener>) -> Self {
        let me = Self {
            images,
            index: Arc::new(AtomicU32::new(0)),
            delay,
            listener,
            ticker: Mutex::new(None),
        };

        me.start_ticker();
        me
    }

    pub fn from_data(
        data: &[u8],
        skip_encoding: bool,
        config: &QrDisplayConfig,
    ) -> Result<Self, AnimatedQrError> {
        let images = generate_images(data, skip_encoding, config)?;
        Ok(Self::new(images, config.frame_delay()))
    }

    fn start_ticker(&self) {
        let len = self.images.len() as u32;
        if len <= 1 || self.delay.is_zero() {
            return;
        }

        let index = self.index.clone();
        let listener = self.listener.clone();
        let delay = self.delay;

        debug!("starting qr animation, {len} frames every {delay:?}");
        let task = AbortableTask::spawn(async move {
            let mut interval = interval_at(Instant::now() + delay, delay);

            loop {
                interval.tick().await;

                let next = (index.load(Ordering::Acquire) + 1) % len;
                index.store(next, Ordering::Release);
                trace!("qr animation frame {next}");

                if let Some(listener) = &listener {
                    listener(next);
                }
            }
        });

        *self.ticker.lock() = Some(task);
    }
}

#[uniffi::export]
impl AnimatedQr {
    #[uniffi::constructor]
    pub fn try_new(
        data: Vec<u8>,
        skip_encoding: bool,
        config: QrDisplayConfig,
    ) -> Result<Self, AnimatedQrError> {
        Self::from_data(&data, skip_encoding, &config)
    }

    /// The image to show right now, `None` when there is nothing to show yet
    pub fn current_image(&self) -> Option<QrImage> {
        let index = self.index.load(Ordering::Acquire) as usize;
        self.images.get(index).cloned()
    }

    pub fn current_index(&self) -> u32 {
        self.index.load(Ordering::Acquire)
    }

    pub fn images(&self) -> Vec<QrImage> {
        self.images.clone()
    }

    pub fn frame_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn is_animated(&self) -> bool {
        self.ticker.lock().as_ref().is_some_and(|ticker| !ticker.is_finished())
    }

    /// Stop cycling, keeps the current image
    pub fn stop(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            debug!("stopping qr animation");
            ticker.abort();
        }
    }

    /// Go back to the first image and start cycling again
    pub fn restart(&self) {
        self.stop();
        self.index.store(0, Ordering::Release);
        self.start_ticker();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::qr_image::QrErrorCorrection;
    use pretty_assertions::assert_eq;

    const DELAY: Duration = Duration::from_millis(2750);

    fn images(count: u8) -> Vec<QrImage> {
        (0..count)
            .map(|index| qr_image::render(&[index], QrErrorCorrection::Low, 1, false).unwrap())
            .collect()
    }

    fn small_config() -> QrDisplayConfig {
        QrDisplayConfig { module_size: 1, ..QrDisplayConfig::default() }
    }

    #[test]
    fn test_generate_images_frame_boundary() {
        let config = small_config();

        assert_eq!(generate_images(&[7u8; 1024], false, &config).unwrap().len(), 1);
        assert_eq!(generate_images(&[7u8; 1025], false, &config).unwrap().len(), 2);
        assert!(generate_images(&[], false, &config).unwrap().is_empty());
    }

    #[test]
    fn test_generate_images_is_deterministic() {
        let config = small_config();
        let data = vec![0x53, 0x01, 0x02, 0x03];

        assert_eq!(
            generate_images(&data, false, &config).unwrap(),
            generate_images(&data, false, &config).unwrap()
        );
    }

    #[test]
    fn test_empty_display_is_not_ready() {
        let display = AnimatedQr::new(Vec::new(), DELAY);
        assert_eq!(display.current_image(), None);
        assert!(!display.is_animated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_image_does_not_animate() {
        let images = images(1);
        let display = AnimatedQr::new(images.clone(), DELAY);

        assert!(!display.is_animated());
        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(display.current_image(), Some(images[0].clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_and_wraps() {
        let display = AnimatedQr::new(images(3), DELAY);
        assert_eq!(display.current_index(), 0);
        assert!(display.is_animated());

        tokio::time::sleep(DELAY + Duration::from_millis(1)).await;
        assert_eq!(display.current_index(), 1);

        tokio::time::sleep(DELAY).await;
        assert_eq!(display.current_index(), 2);

        tokio::time::sleep(DELAY).await;
        assert_eq!(display.current_index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_ticker() {
        let advances = Arc::new(AtomicUsize::new(0));

        let display = {
            let advances = advances.clone();
            AnimatedQr::with_listener(images(2), DELAY, move |_| {
                advances.fetch_add(1, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(DELAY + Duration::from_millis(1)).await;
        assert_eq!(advances.load(Ordering::SeqCst), 1);

        drop(display);
        tokio::time::sleep(DELAY * 4).await;
        assert_eq!(advances.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_restart() {
        let display = AnimatedQr::new(images(2), DELAY);

        tokio::time::sleep(DELAY + Duration::from_millis(1)).await;
        assert_eq!(display.current_index(), 1);

        display.stop();
        assert!(!display.is_animated());
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(display.current_index(), 1);

        display.restart();
        assert_eq!(display.current_index(), 0);
        assert!(display.is_animated());
    }
}
