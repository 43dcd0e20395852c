//! Wires the fetcher, the inflater and the interlacer together for one
//! image load and relays the results to a display.

use crate::config::{Granularity, LoaderConfig};
use crate::decoder::interlacer::{Interlacer, RenderResult, UpdateStatus};
use crate::decoder::PassImage;
use crate::error::{PipelineError, ReconstructError, Result};
use crate::fetch::source::{source_for, ByteSource};
use crate::fetch::{CancelToken, FetchHandler, FetchSnapshot, Fetcher};
use crate::inflate::Inflater;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Message form of the load events, for channel-driven displays
#[derive(Debug)]
pub enum LoadEvent {
    Progress { received: u64, expected: Option<u64> },
    Image(PassImage),
    Error(PipelineError),
    Complete,
}

/// Receives the results of a load. Every method is optional.
pub trait ImageEvents: Send + Sync {
    fn on_progress(&self, _received: u64, _expected: Option<u64>) {}

    fn on_image(&self, _image: PassImage) {}

    /// Terminal; at most once per load, never together with `on_complete`.
    fn on_error(&self, _error: PipelineError) {}

    /// Terminal; at most once per load.
    fn on_complete(&self) {}
}

impl ImageEvents for smol::channel::Sender<LoadEvent> {
    fn on_progress(&self, received: u64, expected: Option<u64>) {
        deliver(self, LoadEvent::Progress { received, expected });
    }

    fn on_image(&self, image: PassImage) {
        deliver(self, LoadEvent::Image(image));
    }

    fn on_error(&self, error: PipelineError) {
        deliver(self, LoadEvent::Error(error));
    }

    fn on_complete(&self) {
        deliver(self, LoadEvent::Complete);
    }
}

fn deliver(sender: &smol::channel::Sender<LoadEvent>, event: LoadEvent) {
    if let Err(e) = sender.try_send(event) {
        log::debug!("Dropping load event: {}", e);
    }
}

/// Progressive load of one interlaced image
pub struct ProgressiveLoader {
    config: LoaderConfig,
    fetcher: Fetcher,
    interlacer: Arc<Interlacer>,
}

impl ProgressiveLoader {
    /// Loader for `config.locator` (HTTP URL or file path).
    pub fn new(config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        let source = source_for(&config.locator)?;
        Self::with_source(config, source)
    }

    pub fn with_source(config: LoaderConfig, source: Arc<dyn ByteSource>) -> Result<Self> {
        config.validate()?;
        let interlacer = Interlacer::new(config.width, config.height, config.depth)?
            .with_first_pass(config.first_pass)
            .with_fill_mode(config.fill);
        let fetcher = Fetcher::new(source, config.fetch_config());
        Ok(Self {
            config,
            fetcher,
            interlacer: Arc::new(interlacer),
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Read-only access to the reconstruction state.
    pub fn interlacer(&self) -> &Interlacer {
        &self.interlacer
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.fetcher.cancel_token()
    }

    /// Load on a background thread. On error no events are delivered.
    pub fn start(&self, events: impl ImageEvents + 'static) -> Result<()> {
        self.fetcher.start(Box::new(self.pipeline(Arc::new(events))))
    }

    /// Load on the calling thread, returning once the load has ended.
    pub fn run(&self, events: impl ImageEvents + 'static) {
        let mut pipeline = self.pipeline(Arc::new(events));
        self.fetcher.run(&mut pipeline);
    }

    /// No further events are delivered once this returns, although a render
    /// already underway still finishes.
    pub fn cancel(&self) {
        self.fetcher.cancel();
    }

    pub fn wait(&self) {
        self.fetcher.wait();
    }

    fn pipeline(&self, events: Arc<dyn ImageEvents>) -> Pipeline {
        Pipeline {
            inflater: Inflater::new(self.config.compression),
            interlacer: Arc::clone(&self.interlacer),
            relay: Relay {
                events,
                cancel: self.fetcher.cancel_token(),
                finished: Arc::new(AtomicBool::new(false)),
            },
            granularity: self.config.granularity,
            first_pass: self.config.first_pass,
            last_passes: 0,
            last_rows: 0,
            last_len: 0,
        }
    }
}

/// Delivers results unless the load was cancelled, and keeps terminal
/// events to one per load.
#[derive(Clone)]
struct Relay {
    events: Arc<dyn ImageEvents>,
    cancel: CancelToken,
    finished: Arc<AtomicBool>,
}

impl Relay {
    fn image(&self, image: PassImage) {
        if self.cancel.is_cancelled() {
            log::debug!("Discarding pass {} render after cancel", image.pass);
            return;
        }
        log::info!(
            "Pass {} ready: {}x{}, {} bytes, {:?}",
            image.pass,
            image.width(),
            image.height(),
            image.bytes_consumed,
            image.elapsed
        );
        self.events.on_image(image);
    }

    fn fail(&self, error: PipelineError) {
        if self.cancel.is_cancelled() || self.finished.swap(true, Ordering::SeqCst) {
            log::debug!("Dropping error after load ended: {}", error);
            return;
        }
        log::error!("Load failed: {}", error);
        // stops the fetch as well
        self.cancel.cancel();
        self.events.on_error(error);
    }

    fn complete(&self) {
        if self.cancel.is_cancelled() || self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Load complete");
        self.events.on_complete();
    }

    fn completion(&self) -> impl FnOnce(RenderResult) + Send + 'static {
        let relay = self.clone();
        move |result| match result {
            Ok(image) => relay.image(image),
            Err(e) => relay.fail(e),
        }
    }
}

struct Pipeline {
    inflater: Inflater,
    interlacer: Arc<Interlacer>,
    relay: Relay,
    granularity: Granularity,
    first_pass: u8,
    last_passes: u8,
    last_rows: u64,
    last_len: usize,
}

impl Pipeline {
    /// Pass label for a raw stream of `len` bytes: the pass its last whole
    /// pixel belongs to.
    fn pass_label(&self, len: usize) -> u8 {
        let layout = self.interlacer.layout();
        let pixels = layout.progress(len).pixels;
        match pixels.checked_sub(1).and_then(|last| layout.locate(last)) {
            Some(loc) => loc.pass,
            None => 1,
        }
    }
}

impl FetchHandler for Pipeline {
    fn on_data(&mut self, snapshot: FetchSnapshot) {
        if self.relay.cancel.is_cancelled() {
            return;
        }
        if snapshot.pass_hint < self.first_pass {
            log::debug!(
                "Pass hint {} below first pass {}, not decoding {} bytes yet",
                snapshot.pass_hint,
                self.first_pass,
                snapshot.received()
            );
            return;
        }

        let raw = self.inflater.decompress_partial(&snapshot.data);
        let progress = self.interlacer.layout().progress(raw.len());

        let pass = match self.granularity {
            Granularity::Pass if progress.completed_passes > self.last_passes => progress.completed_passes,
            Granularity::Row if progress.completed_rows > self.last_rows => self.pass_label(raw.len()),
            _ => {
                log::debug!(
                    "No new pass or row in {} raw bytes ({} compressed)",
                    raw.len(),
                    snapshot.received()
                );
                return;
            }
        };
        self.last_passes = progress.completed_passes;
        self.last_rows = progress.completed_rows;
        self.last_len = raw.len();

        log::debug!(
            "Updating pass {} from {} raw bytes ({} compressed)",
            pass,
            raw.len(),
            snapshot.received()
        );
        self.interlacer.update_image(raw, pass, self.relay.completion());
    }

    fn on_progress(&mut self, received: u64, expected: Option<u64>) {
        if !self.relay.cancel.is_cancelled() {
            self.relay.events.on_progress(received, expected);
        }
    }

    fn on_complete(&mut self, snapshot: FetchSnapshot) {
        if self.relay.cancel.is_cancelled() {
            return;
        }

        let raw = match self.inflater.decompress(&snapshot.data) {
            Ok(raw) => raw,
            Err(e) => {
                self.relay.fail(e.into());
                return;
            }
        };

        let layout = self.interlacer.layout();
        let total = layout.total_bytes();
        let len = raw.len();
        let complete = len == total;

        if complete && self.last_len == len {
            log::debug!("Final pass already rendered");
            self.relay.complete();
            return;
        }

        let pass = if complete { 7 } else { self.pass_label(len) };
        let relay = self.relay.clone();
        let finish = move |result: RenderResult| {
            match result {
                Ok(image) => relay.image(image),
                Err(e) => {
                    relay.fail(e);
                    return;
                }
            }
            if len < total {
                relay.fail(ReconstructError::Incomplete { len, total }.into());
            } else {
                relay.complete();
            }
        };

        match self.interlacer.update_image(raw, pass, finish) {
            UpdateStatus::Skipped | UpdateStatus::Stale if len < total => {
                self.relay.fail(ReconstructError::Incomplete { len, total }.into());
            }
            UpdateStatus::Skipped | UpdateStatus::Stale => self.relay.complete(),
            _ => {}
        }
    }

    fn on_error(&mut self, error: PipelineError) {
        self.relay.fail(error);
    }
}
