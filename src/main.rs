//! interlace-view - stream an Adam7-interlaced image and save every pass

use anyhow::{bail, Context, Result};
use interlace_stream::decoder::adam7::interlace;
use interlace_stream::inflate::compress;
use interlace_stream::{
    Compression, FillMode, Granularity, LoadEvent, LoaderConfig, PixelDepth, ProgressiveLoader,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const USAGE: &str = "usage:
  interlace-view encode <input-image> <output-file> [--gzip|--deflate]
  interlace-view view <url-or-path> <width> <height> [--depth rgba8] [--interval-ms N]
                 [--first-pass N] [--rows] [--sparse] [--gzip|--deflate] [--out DIR]";

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let result = match args.get(1).map(String::as_str) {
        Some("encode") => encode(&args[2..]),
        Some("view") => view(&args[2..]),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Flags shared by both commands, pulled out of the argument list
struct Flags {
    positional: Vec<String>,
    compression: Compression,
    depth: PixelDepth,
    interval: Option<Duration>,
    first_pass: u8,
    rows: bool,
    sparse: bool,
    out: PathBuf,
}

fn parse_flags(args: &[String]) -> Result<Flags> {
    let mut flags = Flags {
        positional: Vec::new(),
        compression: Compression::Zlib,
        depth: PixelDepth::Rgba8,
        interval: None,
        first_pass: 0,
        rows: false,
        sparse: false,
        out: PathBuf::from("."),
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .with_context(|| format!("{} needs a value", name))
        };
        match arg.as_str() {
            "--gzip" => flags.compression = Compression::Gzip,
            "--deflate" => flags.compression = Compression::Deflate,
            "--rows" => flags.rows = true,
            "--sparse" => flags.sparse = true,
            "--depth" => {
                flags.depth = value("--depth")?.parse().map_err(anyhow::Error::msg)?;
            }
            "--interval-ms" => {
                let ms: u64 = value("--interval-ms")?.parse().context("invalid --interval-ms")?;
                flags.interval = Some(Duration::from_millis(ms));
            }
            "--first-pass" => {
                flags.first_pass = value("--first-pass")?.parse().context("invalid --first-pass")?;
            }
            "--out" => flags.out = PathBuf::from(value("--out")?),
            other if other.starts_with("--") => bail!("unknown flag {}\n{}", other, USAGE),
            other => flags.positional.push(other.to_string()),
        }
    }

    Ok(flags)
}

fn encode(args: &[String]) -> Result<()> {
    let flags = parse_flags(args)?;
    let [input, output] = flags.positional.as_slice() else {
        bail!("encode takes an input image and an output file\n{}", USAGE);
    };

    log::info!("Opening image: {:?}", input);
    let image = image::open(input)
        .with_context(|| format!("failed to open {}", input))?
        .to_rgba8();
    let (width, height) = image.dimensions();

    let stream = interlace(image.as_raw(), width, height, PixelDepth::Rgba8.bytes_per_pixel());
    let compressed = compress(flags.compression, &stream)?;
    std::fs::write(output, &compressed).with_context(|| format!("failed to write {}", output))?;

    log::info!(
        "Encoded {}x{} ({} raw bytes -> {} compressed)",
        width,
        height,
        stream.len(),
        compressed.len()
    );
    println!("{} {} rgba8", width, height);
    Ok(())
}

fn view(args: &[String]) -> Result<()> {
    let flags = parse_flags(args)?;
    let [locator, width, height] = flags.positional.as_slice() else {
        bail!("view takes a locator, a width and a height\n{}", USAGE);
    };
    let width: u32 = width.parse().context("invalid width")?;
    let height: u32 = height.parse().context("invalid height")?;

    let mut config = LoaderConfig::new(locator.as_str(), width, height, flags.depth)
        .with_first_pass(flags.first_pass)
        .with_compression(flags.compression);
    if let Some(interval) = flags.interval {
        config = config.with_min_interval(interval);
    }
    if flags.rows {
        config = config.with_granularity(Granularity::Row);
    }
    if flags.sparse {
        config = config.with_fill_mode(FillMode::Sparse);
    }

    std::fs::create_dir_all(&flags.out)
        .with_context(|| format!("failed to create {}", flags.out.display()))?;

    let loader = ProgressiveLoader::new(config)?;
    let (sender, receiver) = smol::channel::unbounded::<LoadEvent>();
    let start = Instant::now();
    loader.start(sender)?;

    let outcome: Result<usize> = smol::block_on(async {
        let mut saved = 0usize;
        while let Ok(event) = receiver.recv().await {
            match event {
                LoadEvent::Progress { received, expected } => match expected {
                    Some(total) if total > 0 => {
                        log::debug!("Received {}/{} bytes ({}%)", received, total, received * 100 / total)
                    }
                    _ => log::debug!("Received {} bytes", received),
                },
                LoadEvent::Image(update) => {
                    let path = frame_path(&flags.out, update.pass, saved);
                    update
                        .image
                        .save(&path)
                        .with_context(|| format!("failed to save {}", path.display()))?;
                    println!(
                        "pass {} -> {} ({} bytes, {:.2}ms)",
                        update.pass,
                        path.display(),
                        update.bytes_consumed,
                        update.elapsed.as_secs_f64() * 1000.0
                    );
                    saved += 1;
                }
                LoadEvent::Complete => return Ok(saved),
                LoadEvent::Error(e) => return Err(anyhow::Error::new(e)),
            }
        }
        bail!("load ended without completing")
    });

    if outcome.is_err() {
        loader.cancel();
    }
    loader.wait();
    let saved = outcome?;
    log::info!("Saved {} images in {:?}", saved, start.elapsed());
    Ok(())
}

fn frame_path(dir: &Path, pass: u8, index: usize) -> PathBuf {
    dir.join(format!("frame-{:03}-pass-{}.png", index, pass))
}
