//! Scatters the growing raw pixel stream onto a fixed canvas pass by pass
//! and renders intermediate images.
//!
//! Updates are serialized through a single in-flight slot with one pending
//! slot behind it. A request arriving while another is rendering replaces
//! whatever is pending (latest wins), and the caller that holds the slot
//! drains the pending request before releasing it, so queued work always
//! builds on the canvas state left by the request before it.

use super::adam7::{Adam7Layout, PassDescriptor};
use super::canvas::Canvas;
use super::rgb_conversion::canvas_to_rgba8;
use super::{FillMode, PassImage, PixelDepth, Region};
use crate::error::{PipelineError, ReconstructError};
use image::RgbaImage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Outcome delivered to an update's completion callback
pub type RenderResult = Result<PassImage, PipelineError>;

type Completion = Box<dyn FnOnce(RenderResult) + Send>;

/// What happened to a submitted update, known as soon as the call returns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Pixels applied and the completion received an image
    Rendered,
    /// Pixels applied, but the pass is below the first pass to generate
    Skipped,
    /// The update would move the cursor backwards and was dropped
    Stale,
    /// Another update is rendering; this one waits in the pending slot
    Coalesced,
    /// The completion received an error
    Failed,
}

enum Update {
    Stream { data: Arc<[u8]>, pass: u8 },
    Row { pass: u8, row: u32, bytes: Arc<[u8]> },
}

impl Update {
    fn pass(&self) -> u8 {
        match self {
            Update::Stream { pass, .. } | Update::Row { pass, .. } => *pass,
        }
    }

    /// Raw stream byte offset this update reaches
    fn reach(&self, layout: &Adam7Layout) -> usize {
        match self {
            Update::Stream { data, .. } => data.len(),
            Update::Row { pass, row, bytes } => match PassDescriptor::get(*pass) {
                Some(_) => layout.row_start(*pass, *row) * layout.bytes_per_pixel() + bytes.len(),
                None => 0,
            },
        }
    }
}

struct Request {
    update: Update,
    completion: Completion,
}

#[derive(Default)]
struct RequestSlot {
    in_flight: bool,
    pending: Option<Request>,
}

struct CanvasState {
    canvas: Canvas,
    /// Whole pixels of the raw stream already scattered onto the canvas
    pixels_written: usize,
}

/// Releases the render slot if a completion unwinds while holding it.
struct InFlightGuard<'a>(&'a Mutex<RequestSlot>);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.0.lock();
        if slot.pending.take().is_some() {
            log::warn!("Dropping pending update after a render panicked");
        }
        slot.in_flight = false;
    }
}

/// Progressive Adam7 reconstructor for one image load
pub struct Interlacer {
    layout: Adam7Layout,
    first_pass: u8,
    fill: FillMode,
    started: Instant,
    state: Mutex<CanvasState>,
    slot: Mutex<RequestSlot>,
}

impl Interlacer {
    /// Fails when the canvas or its RGBA8 rendering would not fit in memory.
    pub fn new(width: u32, height: u32, depth: PixelDepth) -> Result<Self, ReconstructError> {
        let canvas = Canvas::new(width, height, depth)?;
        if (width as usize).checked_mul(height as usize).and_then(|p| p.checked_mul(4)).is_none() {
            return Err(ReconstructError::CanvasTooLarge { width, height });
        }
        Ok(Self {
            layout: Adam7Layout::new(width, height, depth.bytes_per_pixel()),
            first_pass: 0,
            fill: FillMode::default(),
            started: Instant::now(),
            state: Mutex::new(CanvasState {
                canvas,
                pixels_written: 0,
            }),
            slot: Mutex::new(RequestSlot::default()),
        })
    }

    /// Passes below `pass` are written to the canvas but not rendered.
    pub fn with_first_pass(mut self, pass: u8) -> Self {
        self.first_pass = pass;
        self
    }

    pub fn with_fill_mode(mut self, fill: FillMode) -> Self {
        self.fill = fill;
        self
    }

    pub fn layout(&self) -> &Adam7Layout {
        &self.layout
    }

    pub fn first_pass(&self) -> u8 {
        self.first_pass
    }

    /// True while an update holds the render slot.
    pub fn is_generating(&self) -> bool {
        self.slot.lock().in_flight
    }

    pub fn pixels_written(&self) -> usize {
        self.state.lock().pixels_written
    }

    pub fn bytes_consumed(&self) -> usize {
        self.pixels_written() * self.layout.bytes_per_pixel()
    }

    /// Runs `f` against the current canvas.
    pub fn with_canvas<R>(&self, f: impl FnOnce(&Canvas) -> R) -> R {
        f(&self.state.lock().canvas)
    }

    /// Applies the cumulative raw stream `data` and renders it as `pass`.
    ///
    /// Every whole pixel in `data` beyond the cursor is written; a trailing
    /// partial pixel waits for the next call. `completion` fires once with
    /// the rendered image or the error, unless the update is skipped, stale,
    /// or replaced while pending.
    pub fn update_image<D, F>(&self, data: D, pass: u8, completion: F) -> UpdateStatus
    where
        D: Into<Arc<[u8]>>,
        F: FnOnce(RenderResult) + Send + 'static,
    {
        self.submit(Request {
            update: Update::Stream {
                data: data.into(),
                pass,
            },
            completion: Box::new(completion),
        })
    }

    /// Applies the bytes of a single pass row. `row` counts rows within the
    /// pass, and `bytes` may hold less than a full row.
    pub fn update_row<D, F>(&self, pass: u8, row: u32, bytes: D, completion: F) -> UpdateStatus
    where
        D: Into<Arc<[u8]>>,
        F: FnOnce(RenderResult) + Send + 'static,
    {
        self.submit(Request {
            update: Update::Row {
                pass,
                row,
                bytes: bytes.into(),
            },
            completion: Box::new(completion),
        })
    }

    fn submit(&self, request: Request) -> UpdateStatus {
        {
            let mut slot = self.slot.lock();
            if slot.in_flight {
                let reach = request.update.reach(&self.layout);
                if let Some(pending) = &slot.pending {
                    if reach < pending.update.reach(&self.layout) {
                        log::debug!("Dropping stale update behind pending request ({} bytes)", reach);
                        return UpdateStatus::Stale;
                    }
                }
                if slot.pending.replace(request).is_some() {
                    log::debug!("Replaced pending update with newer request ({} bytes)", reach);
                }
                return UpdateStatus::Coalesced;
            }
            slot.in_flight = true;
        }

        let guard = InFlightGuard(&self.slot);
        let status = self.process(request);

        loop {
            let next = {
                let mut slot = self.slot.lock();
                match slot.pending.take() {
                    Some(next) => next,
                    None => {
                        slot.in_flight = false;
                        break;
                    }
                }
            };
            self.process(next);
        }

        std::mem::forget(guard);
        status
    }

    fn process(&self, request: Request) -> UpdateStatus {
        let Request { update, completion } = request;
        let pass = update.pass();

        let mut state = self.state.lock();
        let applied = match &update {
            Update::Stream { data, pass } => self.apply_stream(&mut state, data, *pass),
            Update::Row { pass, row, bytes } => self.apply_row(&mut state, *pass, *row, bytes),
        };

        let region = match applied {
            Ok(Some(region)) => region,
            Ok(None) => return UpdateStatus::Stale,
            Err(e) => {
                drop(state);
                log::warn!("Reconstruction failed for pass {}: {}", pass, e);
                completion(Err(e.into()));
                return UpdateStatus::Failed;
            }
        };

        if pass < self.first_pass {
            log::debug!(
                "Pass {} below first pass {}, not rendering ({} pixels written)",
                pass,
                self.first_pass,
                state.pixels_written
            );
            return UpdateStatus::Skipped;
        }

        let rendered = self.render(&state, pass, region);
        drop(state);

        match rendered {
            Ok(image) => {
                log::debug!(
                    "Rendered pass {} ({} bytes, complete: {})",
                    image.pass,
                    image.bytes_consumed,
                    image.is_complete
                );
                completion(Ok(image));
                UpdateStatus::Rendered
            }
            Err(e) => {
                completion(Err(e.into()));
                UpdateStatus::Failed
            }
        }
    }

    /// Returns `Ok(None)` for a stale update, otherwise the region touched.
    fn apply_stream(
        &self,
        state: &mut CanvasState,
        data: &[u8],
        pass: u8,
    ) -> Result<Option<Option<Region>>, ReconstructError> {
        if PassDescriptor::get(pass).is_none() {
            return Err(ReconstructError::InvalidPass(pass));
        }

        let bpp = self.layout.bytes_per_pixel();
        let consumed = state.pixels_written * bpp;
        if data.len() < consumed {
            log::debug!(
                "Stale update for pass {}: {} bytes, {} already applied",
                pass,
                data.len(),
                consumed
            );
            return Ok(None);
        }

        let total = self.layout.total_bytes();
        let first = state.pixels_written;
        let available = data.len().min(total) / bpp;
        let region = self.scatter(state, data, first, available)?;

        if data.len() > total {
            return Err(ReconstructError::TrailingData {
                len: data.len(),
                total,
            });
        }
        Ok(Some(region))
    }

    fn apply_row(
        &self,
        state: &mut CanvasState,
        pass: u8,
        row: u32,
        bytes: &[u8],
    ) -> Result<Option<Option<Region>>, ReconstructError> {
        if PassDescriptor::get(pass).is_none() {
            return Err(ReconstructError::InvalidPass(pass));
        }
        let (columns, rows) = self.layout.pass_dimensions(pass);
        if row >= rows {
            return Err(ReconstructError::RowOutOfRange { pass, row, rows });
        }

        let bpp = self.layout.bytes_per_pixel();
        let capacity = columns as usize * bpp;
        if bytes.len() > capacity {
            return Err(ReconstructError::RowTooLong {
                pass,
                row,
                capacity,
                len: bytes.len(),
            });
        }

        let start = self.layout.row_start(pass, row) * bpp;
        let consumed = state.pixels_written * bpp;
        if start > consumed {
            return Err(ReconstructError::NonContiguousRow { start, consumed });
        }
        let end = start + bytes.len();
        if end < consumed {
            log::debug!("Stale row {} of pass {}: ends at {}, {} applied", row, pass, end, consumed);
            return Ok(None);
        }

        // Shift the row so indices line up with the raw stream.
        let first = state.pixels_written;
        let available = end / bpp;
        let row_first = start / bpp;
        let mut region = Region::empty();
        for index in first..available {
            let offset = (index - row_first) * bpp;
            let loc = self
                .layout
                .locate(index)
                .ok_or(ReconstructError::TrailingData { len: end, total: self.layout.total_bytes() })?;
            state.canvas.write_pixel(loc.x, loc.y, &bytes[offset..offset + bpp])?;
            state.pixels_written = index + 1;
            region.include(loc.x, loc.y);
        }
        Ok(Some(region.into_option()))
    }

    /// Writes stream pixels `first..available`, advancing the cursor pixel
    /// by pixel so a failure keeps everything written before it.
    fn scatter(
        &self,
        state: &mut CanvasState,
        data: &[u8],
        first: usize,
        available: usize,
    ) -> Result<Option<Region>, ReconstructError> {
        let bpp = self.layout.bytes_per_pixel();
        let mut region = Region::empty();
        for index in first..available {
            let loc = self.layout.locate(index).ok_or(ReconstructError::TrailingData {
                len: data.len(),
                total: self.layout.total_bytes(),
            })?;
            state
                .canvas
                .write_pixel(loc.x, loc.y, &data[index * bpp..(index + 1) * bpp])?;
            state.pixels_written = index + 1;
            region.include(loc.x, loc.y);
        }
        Ok(region.into_option())
    }

    fn render(
        &self,
        state: &CanvasState,
        pass: u8,
        region: Option<Region>,
    ) -> Result<PassImage, ReconstructError> {
        let width = self.layout.width();
        let height = self.layout.height();
        let rgba = canvas_to_rgba8(&self.layout, &state.canvas, state.pixels_written, self.fill);
        let image = RgbaImage::from_raw(width, height, rgba)
            .ok_or(ReconstructError::Render { width, height })?;

        Ok(PassImage {
            image,
            pass,
            bytes_consumed: state.pixels_written * self.layout.bytes_per_pixel(),
            pixels_written: state.pixels_written,
            is_complete: state.pixels_written == self.layout.total_pixels(),
            region,
            elapsed: self.started.elapsed(),
        })
    }
}

impl Region {
    fn empty() -> Self {
        Region {
            x: u32::MAX,
            y: u32::MAX,
            width: 0,
            height: 0,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        if self.width == 0 {
            *self = Region { x, y, width: 1, height: 1 };
            return;
        }
        let x_end = (self.x + self.width).max(x + 1);
        let y_end = (self.y + self.height).max(y + 1);
        self.x = self.x.min(x);
        self.y = self.y.min(y);
        self.width = x_end - self.x;
        self.height = y_end - self.y;
    }

    fn into_option(self) -> Option<Region> {
        if self.width == 0 {
            None
        } else {
            Some(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::adam7::interlace;
    use crate::error::ErrorKind;
    use std::sync::mpsc::channel;

    fn gradient(width: u32, height: u32, bpp: usize) -> Vec<u8> {
        (0..width as usize * height as usize * bpp)
            .map(|i| (i % 250) as u8 + 1)
            .collect()
    }

    fn written(interlacer: &Interlacer) -> Vec<(u32, u32)> {
        interlacer.with_canvas(|canvas| {
            let mut out = Vec::new();
            for y in 0..canvas.height() {
                for x in 0..canvas.width() {
                    if canvas.pixel(x, y).unwrap().iter().any(|&b| b != 0) {
                        out.push((x, y));
                    }
                }
            }
            out
        })
    }

    #[test]
    fn test_four_bytes_on_8x8_gray() {
        let interlacer = Interlacer::new(8, 8, PixelDepth::Gray8).unwrap();
        let (tx, rx) = channel();
        let status = interlacer.update_image(vec![10u8, 20, 30, 40], 1, move |result| {
            tx.send(result.map(|img| img.pass)).unwrap();
        });

        assert_eq!(status, UpdateStatus::Rendered);
        assert_eq!(rx.recv().unwrap().unwrap(), 1);
        assert_eq!(written(&interlacer), vec![(0, 0), (4, 0), (0, 4), (4, 4)]);
        interlacer.with_canvas(|c| {
            assert_eq!(c.pixel(4, 0), Some(&[20u8][..]));
            assert_eq!(c.pixel(4, 4), Some(&[40u8][..]));
        });
    }

    #[test]
    fn test_partial_pixel_waits_for_next_call() {
        let interlacer = Interlacer::new(4, 4, PixelDepth::Rgb8).unwrap();
        let stream = interlace(&gradient(4, 4, 3), 4, 4, 3);

        interlacer.update_image(&stream[..5], 1, |_| {});
        assert_eq!(interlacer.pixels_written(), 1);
        assert_eq!(interlacer.bytes_consumed(), 3);

        interlacer.update_image(&stream[..6], 1, |_| {});
        assert_eq!(interlacer.pixels_written(), 2);
    }

    #[test]
    fn test_chunking_does_not_change_final_canvas() {
        let (width, height) = (13, 9);
        let stream = interlace(&gradient(width, height, 2), width, height, 2);

        let reference = Interlacer::new(width, height, PixelDepth::GrayAlpha8).unwrap();
        reference.update_image(stream.clone(), 7, |_| {});
        let expected = reference.with_canvas(|c| c.clone());

        for step in [1usize, 3, 7, 64, 101] {
            let interlacer = Interlacer::new(width, height, PixelDepth::GrayAlpha8).unwrap();
            let mut end = 0;
            while end < stream.len() {
                end = (end + step).min(stream.len());
                let pass = interlacer.layout().progress(end).current_pass;
                interlacer.update_image(&stream[..end], pass, |_| {});
            }
            interlacer.with_canvas(|c| assert_eq!(c, &expected, "step {}", step));
        }
    }

    #[test]
    fn test_written_pixels_grow_monotonically() {
        let (width, height) = (10, 10);
        let stream = interlace(&gradient(width, height, 1), width, height, 1);
        let interlacer = Interlacer::new(width, height, PixelDepth::Gray8).unwrap();

        let mut previous: Vec<(u32, u32)> = Vec::new();
        for end in [3, 8, 20, 45, 100] {
            interlacer.update_image(&stream[..end], 1, |_| {});
            let now = written(&interlacer);
            assert!(previous.iter().all(|p| now.contains(p)));
            assert_eq!(now.len(), end);
            previous = now;
        }
    }

    #[test]
    fn test_same_update_twice_is_idempotent() {
        let stream = interlace(&gradient(8, 8, 4), 8, 8, 4);
        let interlacer = Interlacer::new(8, 8, PixelDepth::Rgba8).unwrap();

        interlacer.update_image(&stream[..100], 4, |_| {});
        let once = interlacer.with_canvas(|c| c.clone());
        let status = interlacer.update_image(&stream[..100], 4, |_| {});

        assert_eq!(status, UpdateStatus::Rendered);
        interlacer.with_canvas(|c| assert_eq!(c, &once));
    }

    #[test]
    fn test_regressing_update_is_stale() {
        let stream = interlace(&gradient(8, 8, 1), 8, 8, 1);
        let interlacer = Interlacer::new(8, 8, PixelDepth::Gray8).unwrap();
        interlacer.update_image(&stream[..32], 6, |_| {});

        let (tx, rx) = channel();
        let status = interlacer.update_image(&stream[..16], 5, move |r| tx.send(r.is_ok()).unwrap());

        assert_eq!(status, UpdateStatus::Stale);
        assert!(rx.try_recv().is_err());
        assert_eq!(interlacer.pixels_written(), 32);
    }

    #[test]
    fn test_passes_below_first_pass_are_written_not_rendered() {
        let stream = interlace(&gradient(8, 8, 1), 8, 8, 1);
        let interlacer = Interlacer::new(8, 8, PixelDepth::Gray8).unwrap().with_first_pass(3);

        let (tx, rx) = channel();
        let tx2 = tx.clone();
        let status = interlacer.update_image(&stream[..2], 2, move |r| tx.send(r.map(|i| i.pass)).unwrap());
        assert_eq!(status, UpdateStatus::Skipped);
        assert_eq!(interlacer.pixels_written(), 2);

        let status = interlacer.update_image(&stream[..4], 3, move |r| tx2.send(r.map(|i| i.pass)).unwrap());
        assert_eq!(status, UpdateStatus::Rendered);
        assert_eq!(rx.recv().unwrap().unwrap(), 3);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_trailing_data_fails_but_keeps_canvas() {
        let mut stream = interlace(&gradient(4, 4, 1), 4, 4, 1);
        stream.extend_from_slice(&[9, 9, 9]);
        let interlacer = Interlacer::new(4, 4, PixelDepth::Gray8).unwrap();

        let (tx, rx) = channel();
        let status = interlacer.update_image(stream, 7, move |r| tx.send(r).unwrap());

        assert_eq!(status, UpdateStatus::Failed);
        let err = rx.recv().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Reconstruction);
        assert_eq!(interlacer.pixels_written(), 16);
    }

    #[test]
    fn test_invalid_pass_reports_error() {
        let interlacer = Interlacer::new(4, 4, PixelDepth::Gray8).unwrap();
        let (tx, rx) = channel();
        let status = interlacer.update_image(vec![1u8], 8, move |r| tx.send(r).unwrap());

        assert_eq!(status, UpdateStatus::Failed);
        assert!(matches!(
            rx.recv().unwrap(),
            Err(PipelineError::Reconstruction(ReconstructError::InvalidPass(8)))
        ));
    }

    #[test]
    fn test_row_updates_within_pass() {
        let (width, height) = (8, 8);
        let stream = interlace(&gradient(width, height, 1), width, height, 1);
        let interlacer = Interlacer::new(width, height, PixelDepth::Gray8).unwrap();
        interlacer.update_image(&stream[..8], 4, |_| {});

        // pass 5 has 4 columns and 2 rows, starting at pixel 8
        let layout = interlacer.layout().clone();
        let row0 = layout.row_start(5, 0);
        let row1 = layout.row_start(5, 1);

        let (tx, rx) = channel();
        let status = interlacer.update_row(5, 0, stream[row0..row0 + 4].to_vec(), move |r| {
            tx.send(r.map(|i| i.region)).unwrap();
        });
        assert_eq!(status, UpdateStatus::Rendered);
        let region = rx.recv().unwrap().unwrap().unwrap();
        assert_eq!((region.y, region.height), (2, 1));
        assert_eq!(interlacer.pixels_written(), 12);

        // half a row, then the rest of it
        interlacer.update_row(5, 1, stream[row1..row1 + 2].to_vec(), |_| {});
        assert_eq!(interlacer.pixels_written(), 14);
        interlacer.update_row(5, 1, stream[row1..row1 + 4].to_vec(), |_| {});
        assert_eq!(interlacer.pixels_written(), 16);

        let reference = Interlacer::new(width, height, PixelDepth::Gray8).unwrap();
        reference.update_image(&stream[..16], 5, |_| {});
        let expected = reference.with_canvas(|c| c.clone());
        interlacer.with_canvas(|c| assert_eq!(c, &expected));
    }

    #[test]
    fn test_row_update_errors() {
        let interlacer = Interlacer::new(8, 8, PixelDepth::Gray8).unwrap();
        let (tx, rx) = channel();

        let tx1 = tx.clone();
        interlacer.update_row(1, 1, vec![1u8], move |r| tx1.send(r).unwrap());
        assert!(matches!(
            rx.recv().unwrap(),
            Err(PipelineError::Reconstruction(ReconstructError::RowOutOfRange { pass: 1, row: 1, rows: 1 }))
        ));

        let tx2 = tx.clone();
        interlacer.update_row(1, 0, vec![1u8, 2], move |r| tx2.send(r).unwrap());
        assert!(matches!(
            rx.recv().unwrap(),
            Err(PipelineError::Reconstruction(ReconstructError::RowTooLong { .. }))
        ));

        interlacer.update_row(3, 0, vec![1u8, 2], move |r| tx.send(r).unwrap());
        assert!(matches!(
            rx.recv().unwrap(),
            Err(PipelineError::Reconstruction(ReconstructError::NonContiguousRow { start: 2, consumed: 0 }))
        ));
        assert_eq!(interlacer.pixels_written(), 0);
    }

    #[test]
    fn test_overlapping_updates_are_serialized() {
        let (width, height) = (8, 8);
        let stream: Arc<[u8]> = interlace(&gradient(width, height, 1), width, height, 1).into();
        let interlacer = Arc::new(Interlacer::new(width, height, PixelDepth::Gray8).unwrap());
        let order = Arc::new(Mutex::new(Vec::new()));

        // pass 3 arrives while pass 2 is still rendering
        let inner = Arc::clone(&interlacer);
        let inner_stream = Arc::clone(&stream);
        let inner_order = Arc::clone(&order);
        let status = interlacer.update_image(&stream[..2], 2, move |result| {
            assert!(inner.is_generating());
            inner_order.lock().push(result.unwrap().pass);

            let order_for_three = Arc::clone(&inner_order);
            let queued = inner.update_image(&inner_stream[..4], 3, move |result| {
                let image = result.unwrap();
                // (4, 0) came from pass 2
                assert_eq!(image.image.get_pixel(4, 0).0[0], inner_stream_value(4, 0));
                order_for_three.lock().push(image.pass);
            });
            assert_eq!(queued, UpdateStatus::Coalesced);
            assert_eq!(inner_order.lock().len(), 1);
        });

        fn inner_stream_value(x: u32, y: u32) -> u8 {
            (((y * 8 + x) as usize) % 250) as u8 + 1
        }

        assert_eq!(status, UpdateStatus::Rendered);
        assert_eq!(*order.lock(), vec![2, 3]);
        assert_eq!(interlacer.pixels_written(), 4);
        assert!(!interlacer.is_generating());
    }

    #[test]
    fn test_pending_slot_keeps_latest() {
        let (width, height) = (8, 8);
        let stream: Arc<[u8]> = interlace(&gradient(width, height, 1), width, height, 1).into();
        let interlacer = Arc::new(Interlacer::new(width, height, PixelDepth::Gray8).unwrap());
        let rendered = Arc::new(Mutex::new(Vec::new()));

        let inner = Arc::clone(&interlacer);
        let inner_stream = Arc::clone(&stream);
        let inner_rendered = Arc::clone(&rendered);
        interlacer.update_image(&stream[..1], 1, move |_| {
            let r3 = Arc::clone(&inner_rendered);
            let r4 = Arc::clone(&inner_rendered);
            let r_old = Arc::clone(&inner_rendered);
            assert_eq!(
                inner.update_image(&inner_stream[..4], 3, move |r| r3.lock().push(r.unwrap().pass)),
                UpdateStatus::Coalesced
            );
            assert_eq!(
                inner.update_image(&inner_stream[..8], 4, move |r| r4.lock().push(r.unwrap().pass)),
                UpdateStatus::Coalesced
            );
            assert_eq!(
                inner.update_image(&inner_stream[..2], 2, move |r| r_old.lock().push(r.unwrap().pass)),
                UpdateStatus::Stale
            );
        });

        assert_eq!(*rendered.lock(), vec![4]);
        assert_eq!(interlacer.pixels_written(), 8);
    }

    #[test]
    fn test_complete_image_render() {
        let (width, height) = (5, 3);
        let original = gradient(width, height, 4);
        let stream = interlace(&original, width, height, 4);
        let interlacer = Interlacer::new(width, height, PixelDepth::Rgba8).unwrap().with_fill_mode(FillMode::Sparse);

        let (tx, rx) = channel();
        interlacer.update_image(stream, 7, move |r| tx.send(r).unwrap());
        let image = rx.recv().unwrap().unwrap();

        assert!(image.is_complete);
        assert_eq!(image.region, Some(Region { x: 0, y: 0, width: 5, height: 3 }));
        assert_eq!(image.image.into_raw(), original);
    }

    #[test]
    fn test_panicking_completion_releases_slot() {
        let stream = interlace(&gradient(8, 8, 1), 8, 8, 1);
        let interlacer = Interlacer::new(8, 8, PixelDepth::Gray8).unwrap();

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            interlacer.update_image(&stream[..4], 3, |_| panic!("display went away"));
        }));
        assert!(unwound.is_err());
        assert!(!interlacer.is_generating());

        let (tx, rx) = channel();
        let status = interlacer.update_image(&stream[..8], 4, move |r| tx.send(r.map(|i| i.pass)).unwrap());
        assert_eq!(status, UpdateStatus::Rendered);
        assert_eq!(rx.recv().unwrap().unwrap(), 4);
        assert_eq!(interlacer.pixels_written(), 8);
    }

    #[test]
    fn test_oversized_canvas_rejected() {
        let err = Interlacer::new(u32::MAX, u32::MAX, PixelDepth::Rgba8).err().unwrap();
        assert_eq!(
            err,
            ReconstructError::CanvasTooLarge { width: u32::MAX, height: u32::MAX }
        );
    }
}
