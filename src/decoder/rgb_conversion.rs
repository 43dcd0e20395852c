use super::adam7::{Adam7Layout, PASSES};
use super::canvas::Canvas;
use super::{FillMode, PixelDepth};

/// Convert one canvas pixel to RGBA8
///
/// Gray is replicated across R, G and B; layouts without alpha are opaque.
pub fn pixel_to_rgba(depth: PixelDepth, pixel: &[u8]) -> [u8; 4] {
    match depth {
        PixelDepth::Gray8 => [pixel[0], pixel[0], pixel[0], 255],
        PixelDepth::GrayAlpha8 => [pixel[0], pixel[0], pixel[0], pixel[1]],
        PixelDepth::Rgb8 => [pixel[0], pixel[1], pixel[2], 255],
        PixelDepth::Rgba8 => [pixel[0], pixel[1], pixel[2], pixel[3]],
    }
}

/// Convert the written part of a canvas to interleaved RGBA8
///
/// # Arguments
/// * `layout` - Pass layout of the canvas
/// * `canvas` - Canvas holding the scattered pass pixels
/// * `pixels_written` - Number of leading raw stream pixels already applied
/// * `fill` - Whether written pixels stand in for their whole pass block
///
/// # Returns
/// Vec<u8> containing RGBA8 data (RGBARGBARGBA...). Pixels not covered by
/// any written pixel are fully transparent.
pub fn canvas_to_rgba8(
    layout: &Adam7Layout,
    canvas: &Canvas,
    pixels_written: usize,
    fill: FillMode,
) -> Vec<u8> {
    let width = canvas.width() as usize;
    let height = canvas.height() as usize;
    let mut rgba = vec![0u8; width * height * 4];

    let written = pixels_written.min(layout.total_pixels());
    for index in 0..written {
        let Some(loc) = layout.locate(index) else {
            log::warn!("Pixel index {} has no canvas position", index);
            break;
        };
        let Some(pixel) = canvas.pixel(loc.x, loc.y) else {
            continue;
        };
        let value = pixel_to_rgba(canvas.depth(), pixel);

        let (block_w, block_h) = match fill {
            FillMode::Sparse => (1, 1),
            FillMode::Replicate => PASSES[loc.pass as usize - 1].block,
        };
        let x_end = loc.x.saturating_add(block_w).min(canvas.width()) as usize;
        let y_end = loc.y.saturating_add(block_h).min(canvas.height()) as usize;

        for y in loc.y as usize..y_end {
            for x in loc.x as usize..x_end {
                let idx = (y * width + x) * 4;
                rgba[idx..idx + 4].copy_from_slice(&value);
            }
        }
    }

    rgba
}
