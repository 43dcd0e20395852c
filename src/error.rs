//! Error types for the streaming decode pipeline

use thiserror::Error;

/// Broad classification of a pipeline failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Decompression,
    Reconstruction,
    Config,
}

/// Errors that terminate an image load
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network or read error from the byte source
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Compressed bytes could not be inflated at final decode
    #[error("Decompression failure: {0}")]
    Decompression(#[from] DecompressError),

    /// Raw pixel data does not fit the declared pass/row geometry
    #[error("Reconstruction failure: {0}")]
    Reconstruction(#[from] ReconstructError),

    /// Loader configuration rejected before start
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Transport(_) => ErrorKind::Transport,
            PipelineError::Decompression(_) => ErrorKind::Decompression,
            PipelineError::Reconstruction(_) => ErrorKind::Reconstruction,
            PipelineError::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Transport(e.to_string())
    }
}

/// Strict inflate failures
#[derive(Debug, Error)]
pub enum DecompressError {
    /// Input ended before the compressed stream did
    #[error("compressed stream truncated after {consumed} bytes ({produced} bytes inflated)")]
    Truncated { consumed: usize, produced: usize },

    /// The compressed bytes are not a valid stream
    #[error("corrupt compressed stream: {0}")]
    Corrupt(String),

    /// Bytes remain after the end of the compressed stream
    #[error("{0} trailing bytes after end of compressed stream")]
    TrailingBytes(usize),
}

/// Pixel data that cannot be mapped onto the canvas
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconstructError {
    #[error("pass {0} is outside 1..=7")]
    InvalidPass(u8),

    #[error("row {row} is outside pass {pass} ({rows} rows)")]
    RowOutOfRange { pass: u8, row: u32, rows: u32 },

    #[error("row {row} of pass {pass} holds {capacity} bytes, got {len}")]
    RowTooLong { pass: u8, row: u32, capacity: usize, len: usize },

    #[error("row starts at byte {start} but only {consumed} bytes have been applied")]
    NonContiguousRow { start: usize, consumed: usize },

    #[error("{len} raw bytes exceed the {total} byte image stream")]
    TrailingData { len: usize, total: usize },

    #[error("pixel ({x}, {y}) is outside the {width}x{height} canvas")]
    OutOfBounds { x: u32, y: u32, width: u32, height: u32 },

    #[error("raw stream ended after {len} of {total} bytes")]
    Incomplete { len: usize, total: usize },

    #[error("{width}x{height} canvas does not fit in memory")]
    CanvasTooLarge { width: u32, height: u32 },

    #[error("failed to build {width}x{height} output image")]
    Render { width: u32, height: u32 },
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
