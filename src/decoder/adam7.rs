//! Geometry of the 7-pass Adam7 interlacing scheme.
//!
//! The pattern over an 8x8 tile is:
//!     16462646
//!     77777777
//!     56565656
//!     77777777
//!     36463646
//!     77777777
//!     56565656
//!     77777777
//!
//! The raw stream handled by this crate is every pass in order, each pass
//! serialized row-major with no filter bytes.

use std::ops::Range;

/// Start position, stride and preview block size of one pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassDescriptor {
    pub pass: u8,
    pub x0: u32,
    pub y0: u32,
    pub dx: u32,
    pub dy: u32,
    /// Width and height of the area a pixel of this pass stands in for
    /// until later passes arrive.
    pub block: (u32, u32),
}

pub const PASSES: [PassDescriptor; 7] = [
    PassDescriptor { pass: 1, x0: 0, y0: 0, dx: 8, dy: 8, block: (8, 8) },
    PassDescriptor { pass: 2, x0: 4, y0: 0, dx: 8, dy: 8, block: (4, 8) },
    PassDescriptor { pass: 3, x0: 0, y0: 4, dx: 4, dy: 8, block: (4, 4) },
    PassDescriptor { pass: 4, x0: 2, y0: 0, dx: 4, dy: 4, block: (2, 4) },
    PassDescriptor { pass: 5, x0: 0, y0: 2, dx: 2, dy: 4, block: (2, 2) },
    PassDescriptor { pass: 6, x0: 1, y0: 0, dx: 2, dy: 2, block: (1, 2) },
    PassDescriptor { pass: 7, x0: 0, y0: 1, dx: 1, dy: 2, block: (1, 1) },
];

impl PassDescriptor {
    /// Looks up a pass by its 1-based number.
    pub fn get(pass: u8) -> Option<&'static PassDescriptor> {
        if (1..=7).contains(&pass) {
            Some(&PASSES[pass as usize - 1])
        } else {
            None
        }
    }

    /// Dimensions of the sub-image this pass selects. A pass that starts
    /// outside the canvas is empty in both directions.
    pub fn dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.x0 || height <= self.y0 {
            return (0, 0);
        }
        let columns = (width - self.x0).div_ceil(self.dx);
        let rows = (height - self.y0).div_ceil(self.dy);
        (columns, rows)
    }
}

/// Where a raw stream position lands on the canvas
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelLocation {
    pub pass: u8,
    pub row: u32,
    pub x: u32,
    pub y: u32,
}

/// How far a raw stream of a given length has progressed through the passes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamProgress {
    /// Number of leading passes whose pixels are all available
    pub completed_passes: u8,
    /// Pass currently receiving data (7 once the stream is complete)
    pub current_pass: u8,
    /// Whole pass rows available, summed over every pass
    pub completed_rows: u64,
    /// Whole pixels available
    pub pixels: usize,
}

/// Per-image pass layout: pass sizes and where each pass starts in the
/// raw stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Adam7Layout {
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
    dims: [(u32, u32); 7],
    /// Pixel index at which each pass starts, plus the total as the 8th entry
    offsets: [usize; 8],
}

impl Adam7Layout {
    pub fn new(width: u32, height: u32, bytes_per_pixel: usize) -> Self {
        let mut dims = [(0, 0); 7];
        let mut offsets = [0usize; 8];
        for (i, desc) in PASSES.iter().enumerate() {
            dims[i] = desc.dimensions(width, height);
            offsets[i + 1] = offsets[i] + dims[i].0 as usize * dims[i].1 as usize;
        }
        Self {
            width,
            height,
            bytes_per_pixel,
            dims,
            offsets,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    pub fn total_pixels(&self) -> usize {
        self.offsets[7]
    }

    pub fn total_bytes(&self) -> usize {
        self.total_pixels() * self.bytes_per_pixel
    }

    /// Columns and rows of a pass. Panics on a pass outside 1..=7.
    pub fn pass_dimensions(&self, pass: u8) -> (u32, u32) {
        self.dims[pass as usize - 1]
    }

    /// Pixel indices of a pass within the raw stream.
    pub fn pass_range(&self, pass: u8) -> Range<usize> {
        let i = pass as usize - 1;
        self.offsets[i]..self.offsets[i + 1]
    }

    /// Pixel index of the first pixel of `row` within `pass`.
    pub fn row_start(&self, pass: u8, row: u32) -> usize {
        let (columns, _) = self.pass_dimensions(pass);
        self.pass_range(pass).start + row as usize * columns as usize
    }

    /// Maps a pixel index of the raw stream to its pass and canvas position.
    pub fn locate(&self, index: usize) -> Option<PixelLocation> {
        if index >= self.total_pixels() {
            return None;
        }
        let i = (0..7).find(|&i| index < self.offsets[i + 1])?;
        let desc = &PASSES[i];
        let columns = self.dims[i].0 as usize;
        let local = index - self.offsets[i];
        let row = (local / columns) as u32;
        let column = (local % columns) as u32;
        Some(PixelLocation {
            pass: desc.pass,
            row,
            x: desc.x0 + column * desc.dx,
            y: desc.y0 + row * desc.dy,
        })
    }

    /// Which pass a canvas pixel belongs to.
    pub fn pass_of(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        PASSES
            .iter()
            .find(|d| x >= d.x0 && y >= d.y0 && (x - d.x0) % d.dx == 0 && (y - d.y0) % d.dy == 0)
            .map(|d| d.pass)
    }

    /// Raw stream pixel index of a canvas pixel.
    pub fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        let pass = self.pass_of(x, y)?;
        let desc = &PASSES[pass as usize - 1];
        let row = (y - desc.y0) / desc.dy;
        let column = ((x - desc.x0) / desc.dx) as usize;
        Some(self.row_start(pass, row) + column)
    }

    /// Canvas positions covered by one pass, in stream order.
    pub fn pass_pixels(&self, pass: u8) -> impl Iterator<Item = (u32, u32)> + '_ {
        let desc = PASSES[pass as usize - 1];
        let (columns, rows) = self.pass_dimensions(pass);
        (0..rows).flat_map(move |row| {
            (0..columns).map(move |column| (desc.x0 + column * desc.dx, desc.y0 + row * desc.dy))
        })
    }

    /// Progress implied by `len` raw bytes.
    pub fn progress(&self, len: usize) -> StreamProgress {
        let pixels = (len / self.bytes_per_pixel.max(1)).min(self.total_pixels());

        let completed_passes = (0..7)
            .take_while(|&i| self.offsets[i + 1] <= pixels)
            .count() as u8;

        let mut completed_rows = 0u64;
        for i in 0..7 {
            let (columns, rows) = self.dims[i];
            if columns == 0 {
                continue;
            }
            let available = pixels.saturating_sub(self.offsets[i]);
            completed_rows += (available / columns as usize).min(rows as usize) as u64;
        }

        StreamProgress {
            completed_passes,
            current_pass: (completed_passes + 1).min(7),
            completed_rows,
            pixels,
        }
    }

    /// Total number of pass rows across all passes.
    pub fn total_rows(&self) -> u64 {
        self.dims
            .iter()
            .filter(|(columns, _)| *columns > 0)
            .map(|(_, rows)| *rows as u64)
            .sum()
    }
}

/// Reorders a row-major image into the pass-ordered raw stream.
pub fn interlace(pixels: &[u8], width: u32, height: u32, bytes_per_pixel: usize) -> Vec<u8> {
    let layout = Adam7Layout::new(width, height, bytes_per_pixel);
    let mut out = Vec::with_capacity(layout.total_bytes());
    for desc in PASSES.iter() {
        for (x, y) in layout.pass_pixels(desc.pass) {
            let start = (y as usize * width as usize + x as usize) * bytes_per_pixel;
            out.extend_from_slice(&pixels[start..start + bytes_per_pixel]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_passes_partition_canvas() {
        for &(width, height) in &[(1, 1), (3, 5), (8, 8), (13, 7), (17, 33)] {
            let layout = Adam7Layout::new(width, height, 1);
            let mut seen = HashSet::new();
            for pass in 1..=7 {
                for pixel in layout.pass_pixels(pass) {
                    assert!(seen.insert(pixel), "{:?} written twice in {}x{}", pixel, width, height);
                }
            }
            assert_eq!(seen.len(), (width * height) as usize);
            assert_eq!(layout.total_pixels(), (width * height) as usize);
        }
    }

    #[test]
    fn test_pass_sizes_8x8() {
        let layout = Adam7Layout::new(8, 8, 1);
        let sizes: Vec<_> = (1..=7).map(|p| layout.pass_range(p).len()).collect();
        assert_eq!(sizes, vec![1, 1, 2, 4, 8, 16, 32]);
    }

    #[test]
    fn test_small_canvas_has_empty_passes() {
        let layout = Adam7Layout::new(1, 1, 3);
        assert_eq!(layout.pass_dimensions(1), (1, 1));
        for pass in 2..=7 {
            assert_eq!(layout.pass_dimensions(pass), (0, 0));
        }
        assert_eq!(layout.total_bytes(), 3);
        assert_eq!(layout.progress(3).completed_passes, 7);
    }

    #[test]
    fn test_locate_matches_index_of() {
        let layout = Adam7Layout::new(13, 7, 2);
        for index in 0..layout.total_pixels() {
            let loc = layout.locate(index).unwrap();
            assert_eq!(layout.index_of(loc.x, loc.y), Some(index));
            assert_eq!(layout.pass_of(loc.x, loc.y), Some(loc.pass));
        }
        assert_eq!(layout.locate(layout.total_pixels()), None);
    }

    #[test]
    fn test_progress_counts_passes_and_rows() {
        let layout = Adam7Layout::new(8, 8, 1);

        let p = layout.progress(0);
        assert_eq!((p.completed_passes, p.current_pass, p.completed_rows), (0, 1, 0));

        // passes 1..3 hold 4 pixels
        let p = layout.progress(4);
        assert_eq!(p.completed_passes, 3);
        assert_eq!(p.current_pass, 4);
        assert_eq!(p.completed_rows, 3);

        // half of pass 4's first row
        let p = layout.progress(5);
        assert_eq!(p.completed_passes, 3);
        assert_eq!(p.completed_rows, 3);

        let p = layout.progress(64);
        assert_eq!(p.completed_passes, 7);
        assert_eq!(p.current_pass, 7);
        assert_eq!(p.completed_rows, layout.total_rows());
    }

    #[test]
    fn test_interlace_orders_by_pass() {
        let pixels: Vec<u8> = (0..64).collect();
        let stream = interlace(&pixels, 8, 8, 1);
        assert_eq!(stream.len(), 64);
        // pass 1 (0,0), pass 2 (4,0), pass 3 (0,4) and (4,4)
        assert_eq!(&stream[..4], &[0, 4, 32, 36]);
    }
}
