//! Stateless inflate over the whole compressed buffer received so far.
//!
//! Every call starts a fresh decoder on the full buffer. The tolerant
//! variant returns whatever could be inflated from a buffer whose tail is
//! still in flight; the strict variant requires a complete, well-formed
//! stream.

use crate::error::DecompressError;
use flate2::read::GzDecoder;
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use flate2::{Decompress, FlushDecompress, Status};
use std::io::{self, Read, Write};
use std::str::FromStr;

const OUTPUT_CHUNK: usize = 64 * 1024;

/// Container around the deflate data
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Zlib,
    Gzip,
    Deflate,
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zlib" => Ok(Compression::Zlib),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "deflate" | "raw" => Ok(Compression::Deflate),
            other => Err(format!("unknown compression '{}'", other)),
        }
    }
}

/// Inflates whole compressed buffers in one format
#[derive(Clone, Copy, Debug, Default)]
pub struct Inflater {
    format: Compression,
}

impl Inflater {
    pub fn new(format: Compression) -> Self {
        Self { format }
    }

    pub fn format(&self) -> Compression {
        self.format
    }

    /// Inflate a complete buffer. Fails on corrupt data, on a stream that
    /// ends early, and on bytes after the end of the stream.
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, DecompressError> {
        match self.format {
            Compression::Zlib => inflate_raw(input, true, true),
            Compression::Deflate => inflate_raw(input, false, true),
            Compression::Gzip => gunzip_strict(input),
        }
    }

    /// Inflate as much of a possibly truncated buffer as possible.
    ///
    /// Never fails: a corrupt stream yields the bytes recovered before the
    /// corruption, and the strict variant reports it once the load ends.
    pub fn decompress_partial(&self, input: &[u8]) -> Vec<u8> {
        let result = match self.format {
            Compression::Zlib => inflate_raw(input, true, false),
            Compression::Deflate => inflate_raw(input, false, false),
            Compression::Gzip => Ok(gunzip_partial(input)),
        };
        match result {
            Ok(out) => out,
            Err(e) => {
                // inflate_raw only errors in strict mode
                log::warn!("Partial inflate failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn inflate_raw(input: &[u8], zlib_header: bool, strict: bool) -> Result<Vec<u8>, DecompressError> {
    let mut inflater = Decompress::new(zlib_header);
    let mut out = Vec::with_capacity(input.len().saturating_mul(2).max(OUTPUT_CHUNK));

    loop {
        if out.capacity() - out.len() < OUTPUT_CHUNK {
            out.reserve(OUTPUT_CHUNK);
        }

        let before_in = inflater.total_in();
        let before_out = inflater.total_out();
        let consumed = before_in as usize;

        let status = inflater.decompress_vec(&input[consumed..], &mut out, FlushDecompress::None);

        match status {
            Ok(Status::StreamEnd) => {
                let consumed = inflater.total_in() as usize;
                if strict && consumed < input.len() {
                    return Err(DecompressError::TrailingBytes(input.len() - consumed));
                }
                return Ok(out);
            }
            Ok(Status::Ok) | Ok(Status::BufError) => {
                let progressed = inflater.total_in() != before_in || inflater.total_out() != before_out;
                if !progressed {
                    // Output had room, so the input is exhausted
                    break;
                }
            }
            Err(e) => {
                if strict {
                    return Err(DecompressError::Corrupt(e.to_string()));
                }
                log::warn!(
                    "Corrupt deflate data after {} input bytes, keeping {} inflated bytes: {}",
                    inflater.total_in(),
                    out.len(),
                    e
                );
                return Ok(out);
            }
        }
    }

    if strict {
        return Err(DecompressError::Truncated {
            consumed: inflater.total_in() as usize,
            produced: out.len(),
        });
    }
    Ok(out)
}

fn gunzip_strict(input: &[u8]) -> Result<Vec<u8>, DecompressError> {
    // The buffered decoder only consumes the member it decodes, so whatever
    // is left in the slice afterwards trails the stream.
    let mut decoder = flate2::bufread::GzDecoder::new(input);
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => match decoder.into_inner().len() {
            0 => Ok(out),
            rest => Err(DecompressError::TrailingBytes(rest)),
        },
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(DecompressError::Truncated {
            consumed: input.len(),
            produced: out.len(),
        }),
        Err(e) => Err(DecompressError::Corrupt(e.to_string())),
    }
}

fn gunzip_partial(input: &[u8]) -> Vec<u8> {
    let mut decoder = GzDecoder::new(input);
    let mut out = Vec::new();
    let mut buf = vec![0u8; OUTPUT_CHUNK];
    loop {
        match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("Partial gzip stopped after {} bytes: {}", out.len(), e);
                break;
            }
        }
    }
    out
}

/// Compress raw bytes into `format`.
pub fn compress(format: Compression, raw: &[u8]) -> io::Result<Vec<u8>> {
    let level = flate2::Compression::default();
    match format {
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), level);
            encoder.write_all(raw)?;
            encoder.finish()
        }
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), level);
            encoder.write_all(raw)?;
            encoder.finish()
        }
        Compression::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), level);
            encoder.write_all(raw)?;
            encoder.finish()
        }
    }
}
