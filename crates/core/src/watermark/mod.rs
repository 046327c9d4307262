//! Watermark compositing onto sliced PDF output.
//!
//! - `raster`: decode and transform the watermark image
//! - `overlay`: build the overlay objects and merge them into every page

pub mod overlay;
pub mod raster;

pub use overlay::apply_watermark;

use crate::error::{Result, RptError};
use std::path::PathBuf;

/// Where the mark is anchored on each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkPosition {
    #[default]
    Center,
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
    /// One centered mark, stamped on every page.
    Repeat,
    /// Grid of marks stepped by the mark size plus 25% padding.
    Tiling,
}

impl WatermarkPosition {
    pub fn parse(name: &str) -> Result<Self> {
        Ok(match name.to_ascii_lowercase().as_str() {
            "center" => Self::Center,
            "topleft" => Self::TopLeft,
            "topcenter" => Self::TopCenter,
            "topright" => Self::TopRight,
            "middleleft" => Self::MiddleLeft,
            "middleright" => Self::MiddleRight,
            "bottomleft" => Self::BottomLeft,
            "bottomcenter" => Self::BottomCenter,
            "bottomright" => Self::BottomRight,
            "repeat" => Self::Repeat,
            "tiling" => Self::Tiling,
            _ => {
                return Err(RptError::InvalidArguments(format!(
                    "unknown watermark position {name:?}"
                )));
            }
        })
    }
}

/// Watermark parameters collected from the command line.
#[derive(Debug, Clone)]
pub struct WatermarkSpec {
    pub image: PathBuf,
    pub position: WatermarkPosition,
    /// Degrees, counter-clockwise.
    pub rotation: f64,
    /// Percent, 0..=100.
    pub opacity: f64,
    /// Relative to the default mark size, 0.1..=4.0.
    pub scale: f64,
}

impl WatermarkSpec {
    pub fn new(image: PathBuf) -> Self {
        Self {
            image,
            position: WatermarkPosition::default(),
            rotation: 0.0,
            opacity: 30.0,
            scale: 1.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.opacity) {
            return Err(RptError::InvalidArguments(format!(
                "watermark opacity {} outside 0..=100",
                self.opacity
            )));
        }
        if !(0.1..=4.0).contains(&self.scale) {
            return Err(RptError::InvalidArguments(format!(
                "watermark scale {} outside 0.1..=4.0",
                self.scale
            )));
        }
        Ok(())
    }
}
