//! Frame sources feeding a detection run.
//!
//! A source hands out decoded frames until it is exhausted. A frame that
//! cannot be decoded ends the stream instead of failing the session; only
//! problems opening the source itself are reported as errors.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::preprocess::Frame;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Check if a file has a supported image extension
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

pub trait FrameSource {
    /// Stable identity used by the session's run-once guard.
    fn id(&self) -> &str;

    /// Frame size if known without decoding, checked before the first frame.
    fn dimensions(&self) -> Option<(u32, u32)> {
        None
    }

    /// Next decoded frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Start again from the first frame.
    fn rewind(&mut self) -> Result<()>;
}

/// Ordered image files in a directory, e.g. frames extracted from a video.
#[derive(Debug)]
pub struct ImageSequenceSource {
    id: String,
    frames: Vec<PathBuf>,
    position: usize,
    exhausted: bool,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?;

        let mut frames = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_supported_image(&path) {
                frames.push(path);
            }
        }
        frames.sort();

        if frames.is_empty() {
            return Err(anyhow!(
                "No frames found in {} (supported: {})",
                dir.display(),
                SUPPORTED_EXTENSIONS.join(", ")
            ));
        }

        info!("Found {} frames in {}", frames.len(), dir.display());
        Ok(Self {
            id: dir.display().to_string(),
            frames,
            position: 0,
            exhausted: false,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn id(&self) -> &str {
        &self.id
    }

    /// Read from the first file's header; an unreadable header gives no hint.
    fn dimensions(&self) -> Option<(u32, u32)> {
        let first = self.frames.first()?;
        image::image_dimensions(first).ok()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.exhausted {
            return Ok(None);
        }
        let Some(path) = self.frames.get(self.position) else {
            self.exhausted = true;
            return Ok(None);
        };

        match image::open(path) {
            Ok(img) => {
                self.position += 1;
                debug!("Decoded frame {}", path.display());
                Ok(Some(img.to_rgb8()))
            }
            Err(e) => {
                warn!("Could not decode {} ({}), treating as end of stream", path.display(), e);
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        self.exhausted = false;
        Ok(())
    }
}

/// One image served a fixed number of times.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    id: String,
    image: Frame,
    repeat: u64,
    served: u64,
}

impl StillImageSource {
    pub fn open<P: AsRef<Path>>(path: P, repeat: u64) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("{} is not a valid image file", path.display()))?
            .to_rgb8();
        info!(
            "Loaded still image {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Self::from_image(path.display().to_string(), image, repeat))
    }

    pub fn from_image(id: impl Into<String>, image: Frame, repeat: u64) -> Self {
        Self {
            id: id.into(),
            image,
            repeat,
            served: 0,
        }
    }
}

impl FrameSource for StillImageSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(self.image.dimensions())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.served >= self.repeat {
            return Ok(None);
        }
        self.served += 1;
        Ok(Some(self.image.clone()))
    }

    fn rewind(&mut self) -> Result<()> {
        self.served = 0;
        Ok(())
    }
}

#[cfg(feature = "camera")]
pub use camera::CameraSource;

#[cfg(feature = "camera")]
mod camera {
    use super::*;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
    use nokhwa::Camera;

    /// Live capture from a local camera.
    pub struct CameraSource {
        id: String,
        camera: Camera,
    }

    impl CameraSource {
        pub fn open(index: u32) -> Result<Self> {
            let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            let mut camera = Camera::new(CameraIndex::Index(index), requested)?;
            camera.open_stream()?;
            info!("Opened camera {}", index);
            Ok(Self {
                id: format!("camera:{}", index),
                camera,
            })
        }
    }

    impl FrameSource for CameraSource {
        fn id(&self) -> &str {
            &self.id
        }

        fn dimensions(&self) -> Option<(u32, u32)> {
            let resolution = self.camera.resolution();
            Some((resolution.width(), resolution.height()))
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            let buffer = match self.camera.frame() {
                Ok(buffer) => buffer,
                Err(e) => {
                    warn!("Camera frame capture failed ({}), ending stream", e);
                    return Ok(None);
                }
            };
            let decoded = match buffer.decode_image::<RgbFormat>() {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("Camera frame decode failed ({}), ending stream", e);
                    return Ok(None);
                }
            };
            let (width, height) = (decoded.width(), decoded.height());
            let frame = Frame::from_raw(width, height, decoded.into_raw())
                .ok_or_else(|| anyhow!("Camera returned a malformed {}x{} frame", width, height))?;
            Ok(Some(frame))
        }

        fn rewind(&mut self) -> Result<()> {
            // Live feeds have no beginning to return to.
            Ok(())
        }
    }

    impl Drop for CameraSource {
        fn drop(&mut self) {
            if let Err(e) = self.camera.stop_stream() {
                warn!("Error stopping camera stream: {}", e);
            }
        }
    }
}
