//! Stitch points out of fragment files.
//!
//! Reads a JSON metadata record (`{"size": n, ...}`) followed by `n` points as
//! little-endian `i32` triples from stdin. Writes the record back, followed by
//! one little-endian `(u64 offset, f32 value)` pair per point, to stdout.
//!
//! Usage:
//!   stitch manifest.json -i /data/cube < points > samples
//!   stitch manifest.json --time --time-file ./time

use anyhow::Context;
use clap::Parser;
use fragcube::{StitchConfig, Stitcher};
use std::io::{self, BufWriter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stitch")]
#[command(about = "Read points from fragment files and write them with their global offsets")]
struct Args {
    /// Stitch manifest, relative to the input directory
    manifest: PathBuf,

    /// Directory holding the manifest and the fragment files
    #[arg(short, long, default_value = "./", env = "FRAGCUBE_INPUT_DIR")]
    input_dir: PathBuf,

    /// Append a timing report to the time file
    #[arg(short, long)]
    time: bool,

    /// Where to write the timing report
    #[arg(long, default_value = "./time")]
    time_file: PathBuf,

    /// Worker threads [default: available cores]
    #[arg(long, env = "FRAGCUBE_STITCH_THREADS")]
    threads: Option<usize>,

    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(args: &Args) {
    // stdout carries the samples, so logs always go to stderr. RUST_LOG is
    // honoured with --verbose, otherwise only warnings are shown.
    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let mut config = StitchConfig::new(&args.input_dir);
    if let Some(threads) = args.threads {
        config = config.with_threads(threads);
    }
    if args.time {
        config = config.with_timing_file(&args.time_file);
    }

    let stitcher = Stitcher::open(&args.manifest, config).with_context(|| {
        format!(
            "unable to open {}",
            args.input_dir.join(&args.manifest).display()
        )
    })?;

    let mut input = io::stdin().lock();
    let mut output = BufWriter::new(io::stdout());
    stitcher
        .run(&mut input, &mut output)
        .context("stitching failed")?;

    Ok(())
}
