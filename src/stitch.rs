//! Binning and stitching
//!
//! The stitcher takes a set of points in global cube coordinates, reads the
//! sample at every point from the fragment files and writes it back with its
//! global offset. Points are grouped into bins by fragment, so every fragment
//! file is opened exactly once, and the bins are read in parallel.

use crate::config::StitchConfig;
use crate::error::{CubeError, Result};
use crate::geometry::Gvt;
use crate::types::{CubePoint, FragmentId};
use crate::utils::{encode_sample, format_bytes, fragment_path, parse_points, read_f32, POINT_SIZE};
use chrono::{DateTime, Utc};
use memmap2::Mmap;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Describes the fragment files of a cube on local disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchManifest {
    /// Fragment files are named `{basename}-{x}-{y}-{z}.f32`
    pub basename: String,
    #[serde(rename = "fragment-xs")]
    pub fragment_xs: usize,
    #[serde(rename = "fragment-ys")]
    pub fragment_ys: usize,
    #[serde(rename = "fragment-zs")]
    pub fragment_zs: usize,
    #[serde(rename = "cube-xs")]
    pub cube_xs: usize,
    #[serde(rename = "cube-ys")]
    pub cube_ys: usize,
    #[serde(rename = "cube-zs")]
    pub cube_zs: usize,
}

impl StitchManifest {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Read a manifest from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                CubeError::NotFound(format!("manifest {}", path.display()))
            } else {
                CubeError::Io(e)
            }
        })?;
        Self::from_json(&bytes)
    }

    pub fn fragment_shape(&self) -> [usize; 3] {
        [self.fragment_xs, self.fragment_ys, self.fragment_zs]
    }

    pub fn cube_shape(&self) -> [usize; 3] {
        [self.cube_xs, self.cube_ys, self.cube_zs]
    }

    pub fn gvt(&self) -> Result<Gvt> {
        Gvt::new(self.cube_shape(), self.fragment_shape())
    }
}

/// The metadata record leading the stitch input. Only `size`, the number of
/// points, is interpreted; everything else is passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub size: usize,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Points that fall in the same fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    pub key: FragmentId,
    /// Fragment-local linear offsets, ascending
    pub offsets: Vec<usize>,
    /// Input position of the point behind each offset
    pub indices: Vec<usize>,
}

impl Bin {
    fn new(key: FragmentId) -> Self {
        Self {
            key,
            offsets: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Group points by the fragment they fall in.
///
/// Bins are ordered by fragment id, and offsets within a bin ascend, which
/// makes reads from the fragment file sequential.
pub fn bin(gvt: &Gvt, points: &[CubePoint]) -> Result<Vec<Bin>> {
    let shape = gvt.fragment_shape();
    let mut keyed = points
        .iter()
        .enumerate()
        .map(|(index, &p)| {
            let root = gvt.frag_id(p)?;
            let offset = shape.local_to_offset(gvt.local_of(p));
            Ok((root, offset, index))
        })
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_unstable();

    let mut bins: Vec<Bin> = Vec::new();
    for (root, offset, index) in keyed {
        match bins.last_mut() {
            Some(last) if last.key == root => {}
            _ => bins.push(Bin::new(root)),
        }
        // just pushed if it was missing
        if let Some(last) = bins.last_mut() {
            last.offsets.push(offset);
            last.indices.push(index);
        }
    }
    Ok(bins)
}

/// Per-phase wall clock times of a stitch run
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    pub fragment: [usize; 3],
    pub parse: Duration,
    pub bin: Duration,
    pub read: Duration,
    pub total: Duration,
    pub finished: DateTime<Utc>,
}

impl Timing {
    /// Human-readable report
    pub fn report(&self) -> String {
        let [x, y, z] = self.fragment;
        format!(
            "{}\n\
             Fragment size: x: {}, y: {}, z: {}\n\
             Parsing surface: {}ms\n\
             Binning surface: {}ms\n\
             Reading surface: {}ms\n\
             Total elapsed time: {}ms\n\n",
            self.finished.to_rfc3339(),
            x,
            y,
            z,
            self.parse.as_millis(),
            self.bin.as_millis(),
            self.read.as_millis(),
            self.total.as_millis(),
        )
    }

    /// Append the report to `path`, creating it if needed
    pub fn append_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        file.write_all(self.report().as_bytes())?;
        Ok(())
    }
}

/// Reads points out of fragment files
pub struct Stitcher {
    manifest: StitchManifest,
    gvt: Gvt,
    config: StitchConfig,
    pool: rayon::ThreadPool,
}

impl Stitcher {
    pub fn new(manifest: StitchManifest, config: StitchConfig) -> Result<Self> {
        let gvt = manifest.gvt()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.thread_count())
            .build()
            .map_err(|e| CubeError::Configuration(format!("unable to start workers: {}", e)))?;

        Ok(Self {
            manifest,
            gvt,
            config,
            pool,
        })
    }

    /// Load the manifest at `manifest` (relative to the input directory)
    pub fn open(manifest: impl AsRef<Path>, config: StitchConfig) -> Result<Self> {
        let manifest = StitchManifest::load(config.input_dir.join(manifest))?;
        Self::new(manifest, config)
    }

    pub fn gvt(&self) -> &Gvt {
        &self.gvt
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Write the `(offset, value)` pair of every binned point to `out`.
    /// Returns the number of pairs written. Pairs of different bins
    /// interleave in no particular order.
    pub fn stitch<W: Write + Send>(&self, bins: &[Bin], out: &mut W) -> Result<usize> {
        let out = Mutex::new(out);
        self.pool
            .install(|| bins.par_iter().try_for_each(|bin| self.stitch_bin(bin, &out)))?;
        Ok(bins.iter().map(Bin::len).sum())
    }

    fn stitch_bin<W: Write>(&self, bin: &Bin, out: &Mutex<&mut W>) -> Result<()> {
        let path = self
            .config
            .input_dir
            .join(fragment_path(&self.manifest.basename, bin.key));

        let file = File::open(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                warn!(path = %path.display(), "fragment is missing");
                CubeError::StorageInconsistency(format!("fragment {} not found", path.display()))
            } else {
                CubeError::Io(e)
            }
        })?;
        // Safety: fragment files are read-only inputs, not modified while the
        // stitcher runs
        let mmap = unsafe { Mmap::map(&file)? };

        for &offset in &bin.offsets {
            let value = read_f32(&mmap, offset)?;
            let global = self.gvt.local_to_global(offset, bin.key)?;
            out.lock().write_all(&encode_sample(global, value))?;
        }

        debug!(fragment = %bin.key, points = bin.len(), "stitched bin");
        Ok(())
    }

    /// Run the whole pipeline: read the metadata record and the points from
    /// `input`, echo the record to `out` and then write the stitched pairs.
    pub fn run<R: Read, W: Write + Send>(&self, input: &mut R, out: &mut W) -> Result<Timing> {
        let start = Instant::now();

        // Deserializing without `end()` stops right after the closing brace,
        // leaving the points in the reader.
        let meta = {
            let mut de = serde_json::Deserializer::from_reader(&mut *input);
            Meta::deserialize(&mut de)?
        };
        serde_json::to_writer(&mut *out, &meta)?;

        let expected = meta.size.checked_mul(POINT_SIZE).ok_or_else(|| {
            CubeError::Overflow(format!("size (= {}) too large", meta.size))
        })?;
        // never allocate more than the input actually holds
        let mut raw = Vec::new();
        input.by_ref().take(expected as u64).read_to_end(&mut raw)?;
        if raw.len() < expected {
            return Err(CubeError::InvalidDocument(format!(
                "size (= {}) needs {} bytes of points, input has {}",
                meta.size,
                expected,
                raw.len()
            )));
        }
        let points = parse_points(&raw, meta.size)?;
        let parsed = Instant::now();

        let bins = bin(&self.gvt, &points)?;
        let binned = Instant::now();
        debug!(
            points = points.len(),
            bins = bins.len(),
            input = %format_bytes(raw.len()),
            "binned points"
        );

        let written = self.stitch(&bins, out)?;
        out.flush()?;
        let done = Instant::now();

        let timing = Timing {
            fragment: self.manifest.fragment_shape(),
            parse: parsed - start,
            bin: binned - parsed,
            read: done - binned,
            total: done - start,
            finished: Utc::now(),
        };

        info!(
            pairs = written,
            total_ms = timing.total.as_millis() as u64,
            "stitched"
        );

        if let Some(path) = &self.config.timing_file {
            timing.append_to(path)?;
        }
        Ok(timing)
    }
}
