//! Ordered byte sources the fetcher reads from.

use crate::error::{PipelineError, Result};
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// An opened source: a reader plus the total length, when known
pub struct SourceStream {
    pub reader: Box<dyn Read + Send>,
    pub expected_len: Option<u64>,
}

/// Anything that can hand out an ordered byte stream
pub trait ByteSource: Send + Sync {
    fn open(&self) -> Result<SourceStream>;

    /// Human-readable locator for logging
    fn describe(&self) -> String;
}

/// Picks an HTTP source for `http://` and `https://` locators and a file
/// source for everything else.
pub fn source_for(locator: &str) -> Result<Arc<dyn ByteSource>> {
    if locator.starts_with("http://") || locator.starts_with("https://") {
        Ok(Arc::new(HttpSource::new(locator)?))
    } else {
        Ok(Arc::new(FileSource::new(locator)))
    }
}

/// Streams the body of a GET request
pub struct HttpSource {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        // No overall timeout; slow bodies are the point.
        let client = reqwest::blocking::Client::builder().timeout(None).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl ByteSource for HttpSource {
    fn open(&self) -> Result<SourceStream> {
        log::info!("Requesting {}", self.url);
        let response = self.client.get(&self.url).send()?;
        if !response.status().is_success() {
            return Err(PipelineError::Transport(format!("HTTP error: {}", response.status())));
        }
        let expected_len = response.content_length();
        Ok(SourceStream {
            reader: Box::new(response),
            expected_len,
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Reads a local file
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ByteSource for FileSource {
    fn open(&self) -> Result<SourceStream> {
        let file = File::open(&self.path)?;
        let expected_len = file.metadata().ok().map(|m| m.len());
        Ok(SourceStream {
            reader: Box::new(file),
            expected_len,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory bytes delivered in fixed-size chunks, optionally slowed down
/// or cut off with an error.
#[derive(Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
    chunk_size: usize,
    delay: Duration,
    fail_after: Option<usize>,
    report_len: bool,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            chunk_size: 4096,
            delay: Duration::ZERO,
            fail_after: None,
            report_len: true,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sleep before delivering each chunk.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the read once `bytes` bytes have been delivered.
    pub fn with_failure_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    /// Hide the total length, like a chunked HTTP response.
    pub fn without_length(mut self) -> Self {
        self.report_len = false;
        self
    }
}

impl ByteSource for MemorySource {
    fn open(&self) -> Result<SourceStream> {
        Ok(SourceStream {
            reader: Box::new(ChunkedReader {
                source: self.clone(),
                position: 0,
            }),
            expected_len: self.report_len.then_some(self.data.len() as u64),
        })
    }

    fn describe(&self) -> String {
        format!("memory ({} bytes)", self.data.len())
    }
}

struct ChunkedReader {
    source: MemorySource,
    position: usize,
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let source = &self.source;
        let mut end = (self.position + source.chunk_size.min(buf.len())).min(source.data.len());
        if let Some(limit) = source.fail_after {
            if self.position >= limit {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
            }
            end = end.min(limit);
        }
        if end == self.position {
            return Ok(0);
        }
        if !source.delay.is_zero() {
            thread::sleep(source.delay);
        }
        let n = end - self.position;
        buf[..n].copy_from_slice(&source.data[self.position..end]);
        self.position = end;
        Ok(n)
    }
}
