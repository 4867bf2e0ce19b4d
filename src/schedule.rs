//! Scheduling
//!
//! Scheduling is the process of:
//!
//! 1. parsing an incoming request
//! 2. building all task descriptions (fragment id + what to extract)
//! 3. splitting the set of tasks into units of work
//! 4. describing the output in a header, framed so the response streams
//!
//! Sending tasks to workers is outside this scope.
//!
//! The algorithm is the same for every query shape; only building the tasks
//! and the header needs to know about the shape. Adding a new shape means
//! implementing [`QuerySpec`] for its query type.

use crate::builder::{build_curtain, build_slice};
use crate::config::SchedulerConfig;
use crate::envelope::pack_with_envelope;
use crate::error::{CubeError, Result};
use crate::header::{curtain_header, slice_header, ProcessHeader};
use crate::manifest::FORMAT_VERSION;
use crate::partition::{partition, Partition, TaskSet};
use crate::query::{CurtainQuery, Function, QueryBase, SliceQuery};
use crate::task::{CurtainTask, SliceTask};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info_span};

/// A query shape the scheduler can plan
pub trait QuerySpec: DeserializeOwned {
    type Task: Partition;

    const FUNCTION: Function;

    fn base(&self) -> &QueryBase;

    fn base_mut(&mut self) -> &mut QueryBase;

    /// Build the fragment ids and extraction descriptions
    fn build(&self) -> Result<Vec<Self::Task>>;

    /// Describe the output of `ntasks` tasks
    fn header(&self, ntasks: usize) -> Result<ProcessHeader>;
}

impl QuerySpec for SliceQuery {
    type Task = SliceTask;

    const FUNCTION: Function = Function::Slice;

    fn base(&self) -> &QueryBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut QueryBase {
        &mut self.base
    }

    fn build(&self) -> Result<Vec<SliceTask>> {
        build_slice(self)
    }

    fn header(&self, ntasks: usize) -> Result<ProcessHeader> {
        slice_header(self, ntasks)
    }
}

impl QuerySpec for CurtainQuery {
    type Task = CurtainTask;

    const FUNCTION: Function = Function::Curtain;

    fn base(&self) -> &QueryBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut QueryBase {
        &mut self.base
    }

    fn build(&self) -> Result<Vec<CurtainTask>> {
        build_curtain(self)
    }

    fn header(&self, ntasks: usize) -> Result<ProcessHeader> {
        curtain_header(self, ntasks)
    }
}

/// Schedule an already parsed query
pub fn schedule_query<Q: QuerySpec>(mut query: Q, task_size: usize) -> Result<TaskSet> {
    query.base().manifest.validate()?;
    query.base_mut().normalize_attributes();

    let tasks = query.build()?;
    let mut sched = partition(tasks, task_size)?;
    let head = query.header(sched.count())?;
    sched.set_envelope(pack_with_envelope(&head)?);

    debug!(
        pid = %head.pid,
        function = %Q::FUNCTION,
        ntasks = sched.count(),
        bytes = sched.byte_len(),
        "scheduled"
    );
    Ok(sched)
}

/// Parse a query document of a known shape and schedule it
pub fn schedule<Q: QuerySpec>(doc: &[u8], task_size: usize) -> Result<TaskSet> {
    let query: Q = serde_json::from_slice(doc)?;
    schedule_query(query, task_size)
}

fn check_format_version(document: &Value) -> Result<()> {
    let version = document
        .get("manifest")
        .and_then(|manifest| manifest.get("format-version"))
        .ok_or_else(|| {
            CubeError::InvalidDocument("missing manifest.format-version".to_string())
        })?;

    match version {
        Value::Number(v) if v.as_u64() == Some(FORMAT_VERSION) => Ok(()),
        Value::Number(v) => Err(CubeError::UnsupportedFormatVersion {
            expected: FORMAT_VERSION,
            found: v.to_string(),
        }),
        _ => Err(CubeError::InvalidDocument(format!(
            "format-version must be a number, was {}",
            version
        ))),
    }
}

/// Parse a query document, check its manifest version and schedule it with
/// the planner for its `function`.
pub fn mkschedule(doc: &[u8], task_size: usize) -> Result<TaskSet> {
    let document: Value = serde_json::from_slice(doc)?;

    // Only format-version 1 exists; other versions would dispatch to their
    // own query builders here.
    check_format_version(&document)?;

    let function: Function = document
        .get("function")
        .and_then(Value::as_str)
        .ok_or_else(|| CubeError::InvalidDocument("missing function".to_string()))?
        .parse()?;

    let span = info_span!("schedule", %function);
    let _enter = span.enter();

    match function {
        Function::Slice => schedule_query(serde_json::from_value::<SliceQuery>(document)?, task_size),
        Function::Curtain => {
            schedule_query(serde_json::from_value::<CurtainQuery>(document)?, task_size)
        }
    }
}

/// A configured scheduler, shareable between request handlers
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Scheduler configured from the environment
    pub fn from_env() -> Result<Self> {
        Self::new(SchedulerConfig::from_env()?)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Schedule a query document
    pub fn schedule(&self, doc: &[u8]) -> Result<TaskSet> {
        mkschedule(doc, self.config.task_size)
    }
}
