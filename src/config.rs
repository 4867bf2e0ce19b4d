//! Configuration for the scheduler and the stitcher

use crate::error::{CubeError, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Default number of fragment ids per task
pub const DEFAULT_TASK_SIZE: usize = 10;

/// Environment variable overriding the task size
pub const TASK_SIZE_ENV: &str = "FRAGCUBE_TASK_SIZE";

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Max number of fragment ids packed into a single task
    pub task_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_size: DEFAULT_TASK_SIZE,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task size
    pub fn with_task_size(mut self, task_size: usize) -> Self {
        self.task_size = task_size;
        self
    }

    /// Defaults overridden by `FRAGCUBE_TASK_SIZE`, if set
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by the values `lookup` returns
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(TASK_SIZE_ENV) {
            config.task_size = value.trim().parse().map_err(|_| {
                CubeError::Configuration(format!("{} (= {:?}) is not a number", TASK_SIZE_ENV, value))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_size < 1 {
            return Err(CubeError::Configuration(format!(
                "task_size (= {}) < 1",
                self.task_size
            )));
        }
        Ok(())
    }
}

/// Stitcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Directory holding the manifest and the fragment files
    pub input_dir: PathBuf,

    /// Worker threads; the number of available cores when unset
    pub threads: Option<usize>,

    /// Append a timing report to this file
    pub timing_file: Option<PathBuf>,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./"),
            threads: None,
            timing_file: None,
        }
    }
}

impl StitchConfig {
    pub fn new(input_dir: impl AsRef<Path>) -> Self {
        Self {
            input_dir: input_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_timing_file(mut self, path: impl AsRef<Path>) -> Self {
        self.timing_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Size of the worker pool
    pub fn thread_count(&self) -> usize {
        match self.threads {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}
