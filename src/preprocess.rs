use image::{GrayImage, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::morphology::dilate;
use tracing::debug;

use crate::config::PreprocessConfig;
use crate::error::DetectError;
use crate::filters::{self, Border};

/// A decoded color frame, alive for a single evaluation cycle.
pub type Frame = RgbImage;

/// Binary foreground map: 255 marks foreground, 0 background.
pub type BinaryMap = GrayImage;

/// Foreground value written by the threshold stage.
pub const FOREGROUND: u8 = 255;

/// Turns a color frame into a binary edge map in which parked vehicles
/// show up as dense foreground.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Result<Self, DetectError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Gray -> blur -> adaptive threshold (inverted) -> median -> dilate.
    pub fn process(&self, frame: &Frame) -> BinaryMap {
        let c = &self.config;

        let gray = filters::grayscale(frame);
        let blurred = filters::gaussian_blur(&gray, c.blur_kernel, c.blur_sigma, Border::Reflect101);
        let threshold = filters::adaptive_threshold_inv(&blurred, FOREGROUND, c.block_size, c.c);
        let radius = c.median_kernel / 2;
        let median = median_filter(&threshold, radius, radius);
        let mut dilated = median;
        for _ in 0..c.dilate_iterations {
            dilated = dilate(&dilated, Norm::LInf, c.dilate_radius());
        }

        debug!(
            "Preprocessed {}x{} frame into binary map",
            frame.width(),
            frame.height()
        );
        dilated
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            config: PreprocessConfig::default(),
        }
    }
}
