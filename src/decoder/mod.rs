pub mod adam7;
pub mod canvas;
pub mod interlacer;
pub mod rgb_conversion;

use image::RgbaImage;
use std::str::FromStr;
use std::time::Duration;

/// Channel layout of a canvas pixel. Every variant is 8 bits per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PixelDepth {
    Gray8,
    GrayAlpha8,
    Rgb8,
    #[default]
    Rgba8,
}

impl PixelDepth {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelDepth::Gray8 => 1,
            PixelDepth::GrayAlpha8 => 2,
            PixelDepth::Rgb8 => 3,
            PixelDepth::Rgba8 => 4,
        }
    }
}

impl FromStr for PixelDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gray8" | "gray" => Ok(PixelDepth::Gray8),
            "grayalpha8" | "grayalpha" => Ok(PixelDepth::GrayAlpha8),
            "rgb8" | "rgb" => Ok(PixelDepth::Rgb8),
            "rgba8" | "rgba" => Ok(PixelDepth::Rgba8),
            other => Err(format!("unknown pixel depth '{}'", other)),
        }
    }
}

/// How unwritten pixels are shown in an intermediate render
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FillMode {
    /// Only written pixels are drawn; the rest stay transparent
    Sparse,
    /// Each written pixel covers its pass block until later passes refine it
    #[default]
    Replicate,
}

/// Bounding box of pixels touched by one update (inclusive-exclusive)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A rendered intermediate (or final) image
#[derive(Clone, Debug)]
pub struct PassImage {
    pub image: RgbaImage,
    pub pass: u8,
    pub bytes_consumed: usize,
    pub pixels_written: usize,
    pub is_complete: bool,
    /// Pixels newly written by this update, if any
    pub region: Option<Region>,
    pub elapsed: Duration,
}

impl PassImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
