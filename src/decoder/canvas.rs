use super::PixelDepth;
use crate::error::ReconstructError;

/// Fixed-size pixel buffer the interlacer scatters pass data into.
///
/// Never resized after construction; unwritten pixels stay zeroed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    depth: PixelDepth,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32, depth: PixelDepth) -> Result<Self, ReconstructError> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(depth.bytes_per_pixel()))
            .ok_or(ReconstructError::CanvasTooLarge { width, height })?;
        Ok(Self {
            width,
            height,
            depth,
            pixels: vec![0u8; len],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> PixelDepth {
        self.depth
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    fn offset(&self, x: u32, y: u32) -> Result<usize, ReconstructError> {
        if x >= self.width || y >= self.height {
            return Err(ReconstructError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok((y as usize * self.width as usize + x as usize) * self.depth.bytes_per_pixel())
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        let start = self.offset(x, y).ok()?;
        Some(&self.pixels[start..start + self.depth.bytes_per_pixel()])
    }

    /// Writes one pixel. `value` must be exactly one pixel wide.
    pub fn write_pixel(&mut self, x: u32, y: u32, value: &[u8]) -> Result<(), ReconstructError> {
        let start = self.offset(x, y)?;
        let bpp = self.depth.bytes_per_pixel();
        debug_assert_eq!(value.len(), bpp);
        self.pixels[start..start + bpp].copy_from_slice(&value[..bpp]);
        Ok(())
    }
}
