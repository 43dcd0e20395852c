//! Progressive rendering of Adam7-interlaced, deflate-compressed images
//! while their bytes are still arriving.
//!
//! Bytes flow from a [`fetch::Fetcher`] through an [`inflate::Inflater`]
//! into a [`decoder::interlacer::Interlacer`], and each completed pass (or
//! row) comes out as a [`decoder::PassImage`] through a
//! [`loader::ImageEvents`] handler.

pub mod config;
pub mod decoder;
pub mod error;
pub mod fetch;
pub mod inflate;
pub mod loader;

pub use config::{Granularity, LoaderConfig};
pub use decoder::interlacer::{Interlacer, RenderResult, UpdateStatus};
pub use decoder::{FillMode, PassImage, PixelDepth};
pub use error::{ErrorKind, PipelineError};
pub use inflate::{Compression, Inflater};
pub use loader::{ImageEvents, LoadEvent, ProgressiveLoader};
