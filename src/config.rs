use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::error::DetectError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParkwatchConfig {
    pub preprocess: PreprocessConfig,
    pub detection: DetectionConfig,
    pub slots: SlotConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Gaussian blur kernel size (odd)
    pub blur_kernel: u32,
    /// Gaussian blur sigma
    pub blur_sigma: f32,
    /// Adaptive threshold neighbourhood size (odd, >= 3)
    pub block_size: u32,
    /// Constant subtracted from the local mean
    pub c: f32,
    /// Median blur kernel size (odd)
    pub median_kernel: u32,
    /// Square dilation kernel size (odd, at most 511)
    pub dilate_kernel: u32,
    /// Number of dilation passes
    pub dilate_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Foreground pixel count at or above which a slot is occupied
    pub occupancy_threshold: u32,
    /// Top-left anchor of the "Free: n/m" overlay
    pub summary_position: (i32, i32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Where the active slot layout is persisted
    pub store_path: String,
    /// Slot width used when a layout carries no size of its own
    pub default_width: u32,
    /// Slot height used when a layout carries no size of its own
    pub default_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Directory annotated frames are written to (empty disables output)
    pub output_dir: String,
    /// Delay between frames in milliseconds
    pub processing_interval_ms: u64,
    /// Rewind the source when it is exhausted (only with max_frames set)
    pub loop_source: bool,
    /// Stop after this many frames (0 = unbounded)
    pub max_frames: u64,
    pub free_color: [u8; 3],
    pub occupied_color: [u8; 3],
    pub summary_color: [u8; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 3,
            blur_sigma: 1.0,
            block_size: 25,
            c: 16.0,
            median_kernel: 5,
            dilate_kernel: 3,
            dilate_iterations: 1,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            occupancy_threshold: 900,
            summary_position: (100, 50),
        }
    }
}

impl Default for ParkwatchConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            detection: DetectionConfig::default(),
            slots: SlotConfig {
                store_path: "slots.json".to_string(),
                default_width: 107,
                default_height: 48,
            },
            render: RenderConfig {
                output_dir: "annotated".to_string(),
                processing_interval_ms: 10,
                loop_source: false,
                max_frames: 0,
                free_color: [0, 255, 0],
                occupied_color: [255, 0, 0],
                summary_color: [0, 200, 0],
            },
        }
    }
}

impl PreprocessConfig {
    /// Chebyshev radius of the square dilation element.
    pub fn dilate_radius(&self) -> u8 {
        (self.dilate_kernel / 2).min(u8::MAX as u32) as u8
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        let odd = |name: &str, k: u32| {
            if k == 0 || k % 2 == 0 {
                Err(DetectError::InvalidConfig(format!(
                    "{} must be a positive odd number, got {}",
                    name, k
                )))
            } else {
                Ok(())
            }
        };
        odd("preprocess.blur_kernel", self.blur_kernel)?;
        odd("preprocess.block_size", self.block_size)?;
        odd("preprocess.median_kernel", self.median_kernel)?;
        odd("preprocess.dilate_kernel", self.dilate_kernel)?;
        if self.block_size < 3 {
            return Err(DetectError::InvalidConfig(
                "preprocess.block_size must be at least 3".to_string(),
            ));
        }
        if self.dilate_kernel > 2 * u8::MAX as u32 + 1 {
            return Err(DetectError::InvalidConfig(format!(
                "preprocess.dilate_kernel must be at most 511, got {}",
                self.dilate_kernel
            )));
        }
        if !(self.blur_sigma.is_finite() && self.blur_sigma > 0.0) {
            return Err(DetectError::InvalidConfig(format!(
                "preprocess.blur_sigma must be positive, got {}",
                self.blur_sigma
            )));
        }
        if !self.c.is_finite() {
            return Err(DetectError::InvalidConfig(
                "preprocess.c must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

impl ParkwatchConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            // Create default config file
            let default_config = Self::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            fs::write(path, toml_content).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        self.preprocess.validate()?;
        if self.slots.default_width == 0 || self.slots.default_height == 0 {
            return Err(DetectError::InvalidConfig(
                "slots.default_width and slots.default_height must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
