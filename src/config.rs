use crate::decoder::{FillMode, PixelDepth};
use crate::error::{PipelineError, Result};
use crate::fetch::FetchConfig;
use crate::inflate::Compression;
use std::time::Duration;

/// When intermediate images are produced
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Granularity {
    /// After each completed pass
    #[default]
    Pass,
    /// After each completed pass row
    Row,
}

/// Everything a progressive load needs to know up front
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    pub locator: String,
    pub width: u32,
    pub height: u32,
    pub depth: PixelDepth,
    pub min_interval: Duration,
    /// 0 or 1 renders every pass
    pub first_pass: u8,
    pub granularity: Granularity,
    pub fill: FillMode,
    pub compression: Compression,
    pub chunk_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            locator: String::new(),
            width: 0,
            height: 0,
            depth: PixelDepth::default(),
            min_interval: Duration::from_millis(100),
            first_pass: 0,
            granularity: Granularity::default(),
            fill: FillMode::default(),
            compression: Compression::default(),
            chunk_size: 16 * 1024,
        }
    }
}

impl LoaderConfig {
    pub fn new(locator: impl Into<String>, width: u32, height: u32, depth: PixelDepth) -> Self {
        Self {
            locator: locator.into(),
            width,
            height,
            depth,
            ..Self::default()
        }
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_first_pass(mut self, pass: u8) -> Self {
        self.first_pass = pass;
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_fill_mode(mut self, fill: FillMode) -> Self {
        self.fill = fill;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::Config(format!(
                "canvas must not be empty ({}x{})",
                self.width, self.height
            )));
        }
        if self.first_pass > 7 {
            return Err(PipelineError::Config(format!(
                "first pass {} is outside 0..=7",
                self.first_pass
            )));
        }
        if self.chunk_size == 0 {
            return Err(PipelineError::Config("chunk size must be positive".to_string()));
        }
        let overflow = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|pixels| pixels.checked_mul(self.depth.bytes_per_pixel()))
            .and_then(|bytes| bytes.checked_mul(4))
            .is_none();
        if overflow {
            return Err(PipelineError::Config(format!(
                "{}x{} canvas is too large",
                self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            min_interval: self.min_interval,
            first_pass: self.first_pass,
            chunk_size: self.chunk_size,
        }
    }
}
