//! Incremental fetcher: reads a byte source on a background thread,
//! accumulates what arrives, and tells a handler about new data no more
//! often than the configured interval.

pub mod source;

use crate::error::{PipelineError, Result};
use parking_lot::Mutex;
use source::ByteSource;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cumulative share of image pixels (in 64ths) available after each pass
const PASS_SHARE: [u64; 7] = [1, 2, 4, 8, 16, 32, 64];

/// Upper bound on the buffer reserved up front from a claimed length
const MAX_PREALLOC: u64 = 4 * 1024 * 1024;

/// Immutable view of everything received so far
#[derive(Clone, Debug)]
pub struct FetchSnapshot {
    pub data: Arc<[u8]>,
    pub expected_len: Option<u64>,
    /// Pass the fetcher believes is available
    pub pass_hint: u8,
}

impl FetchSnapshot {
    pub fn received(&self) -> usize {
        self.data.len()
    }
}

/// Receives fetcher events. Every method is optional.
pub trait FetchHandler: Send {
    /// New bytes since the last data notification, throttled.
    fn on_data(&mut self, _snapshot: FetchSnapshot) {}

    /// Every chunk, unthrottled, without the buffer.
    fn on_progress(&mut self, _received: u64, _expected: Option<u64>) {}

    /// The stream ended; carries the full buffer.
    fn on_complete(&mut self, _snapshot: FetchSnapshot) {}

    /// The transport failed. No retry follows.
    fn on_error(&mut self, _error: PipelineError) {}
}

/// Shared cancellation flag
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Minimum-interval gate for data notifications
#[derive(Clone, Debug)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Whether a notification may fire at `now`; records it if so.
    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Guess the highest pass covered by `received` of `expected` compressed
/// bytes, assuming bytes arrive roughly in proportion to pixels.
pub fn estimate_pass(received: u64, expected: Option<u64>, first_pass: u8) -> u8 {
    let floor = first_pass.clamp(1, 7);
    let Some(expected) = expected.filter(|&e| e > 0) else {
        return floor;
    };
    let covered = PASS_SHARE
        .iter()
        .take_while(|&&share| received.saturating_mul(64) >= share.saturating_mul(expected))
        .count() as u8;
    covered.max(floor)
}

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub min_interval: Duration,
    pub first_pass: u8,
    pub chunk_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            first_pass: 0,
            chunk_size: 16 * 1024,
        }
    }
}

pub struct Fetcher {
    source: Arc<dyn ByteSource>,
    config: FetchConfig,
    cancel: CancelToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn ByteSource>, config: FetchConfig) -> Self {
        Self {
            source,
            config,
            cancel: CancelToken::new(),
            worker: Mutex::new(None),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Start reading on a background thread.
    ///
    /// Fails without running the handler when a fetch is already running or
    /// the thread cannot be spawned.
    pub fn start(&self, handler: Box<dyn FetchHandler>) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(PipelineError::Config(format!(
                "fetch of {} already started",
                self.source.describe()
            )));
        }

        let source = Arc::clone(&self.source);
        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let spawned = thread::Builder::new()
            .name("interlace-fetch".to_string())
            .spawn(move || {
                let mut handler = handler;
                read_loop(source.as_ref(), &config, &cancel, handler.as_mut());
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to spawn fetch thread: {}", e);
                Err(PipelineError::Transport(format!("failed to spawn fetch thread: {}", e)))
            }
        }
    }

    /// Run the read loop on the calling thread.
    pub fn run(&self, handler: &mut dyn FetchHandler) {
        read_loop(self.source.as_ref(), &self.config, &self.cancel, handler);
    }

    /// Stop delivering events. Reads already in flight finish silently.
    pub fn cancel(&self) {
        log::info!("Cancelling fetch of {}", self.source.describe());
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Block until the background thread exits.
    pub fn wait(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Fetch thread panicked");
            }
        }
    }
}

fn read_loop(
    source: &dyn ByteSource,
    config: &FetchConfig,
    cancel: &CancelToken,
    handler: &mut dyn FetchHandler,
) {
    let start = Instant::now();
    log::info!("Fetching {}", source.describe());

    let stream = match source.open() {
        Ok(stream) => stream,
        Err(e) => {
            if !cancel.is_cancelled() {
                log::error!("Failed to open {}: {}", source.describe(), e);
                handler.on_error(e);
            }
            return;
        }
    };
    let expected_len = stream.expected_len;
    let mut reader = stream.reader;

    let mut buffer: Vec<u8> = Vec::with_capacity(expected_len.map_or(0, |n| n.min(MAX_PREALLOC) as usize));
    let mut chunk = vec![0u8; config.chunk_size.max(1)];
    let mut throttle = Throttle::new(config.min_interval);
    let mut notified_len = 0usize;
    let mut notifications = 0usize;

    loop {
        if cancel.is_cancelled() {
            log::debug!("Fetch cancelled after {} bytes", buffer.len());
            return;
        }

        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if cancel.is_cancelled() {
                    return;
                }
                buffer.extend_from_slice(&chunk[..n]);
                handler.on_progress(buffer.len() as u64, expected_len);

                if buffer.len() > notified_len && throttle.ready_at(Instant::now()) {
                    notified_len = buffer.len();
                    notifications += 1;
                    handler.on_data(FetchSnapshot {
                        data: Arc::from(&buffer[..]),
                        expected_len,
                        pass_hint: estimate_pass(buffer.len() as u64, expected_len, config.first_pass),
                    });
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                if !cancel.is_cancelled() {
                    log::error!("Read from {} failed after {} bytes: {}", source.describe(), buffer.len(), e);
                    handler.on_error(e.into());
                }
                return;
            }
        }
    }

    if cancel.is_cancelled() {
        return;
    }

    log::info!(
        "Fetched {} bytes in {:?} ({} data notifications)",
        buffer.len(),
        start.elapsed(),
        notifications
    );
    handler.on_complete(FetchSnapshot {
        data: Arc::from(buffer),
        expected_len,
        pass_hint: 7,
    });
}
