//! Splitting task descriptions into bounded units of work

use crate::error::{CubeError, Result};
use bytes::Bytes;
use serde::Serialize;

/// A task description whose list of fragment ids can be split.
///
/// Every chunk of ids is packed together with the rest of the description, so
/// a worker gets a self-contained message.
pub trait Partition: Serialize {
    type Id: Clone;

    /// Take the id list out of the task, leaving it empty
    fn take_ids(&mut self) -> Vec<Self::Id>;

    fn set_ids(&mut self, ids: Vec<Self::Id>);

    fn ids_len(&self) -> usize;

    /// Serialize to a msgpack map of named fields
    fn pack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}

/// Number of `task_size`'d chunks needed to process `jobs` ids
pub fn task_count(jobs: usize, task_size: usize) -> Result<usize> {
    if task_size < 1 {
        return Err(CubeError::InvalidArgument(format!(
            "task_size (= {}) < 1",
            task_size
        )));
    }

    let padded = jobs.checked_add(task_size - 1).ok_or_else(|| {
        CubeError::Overflow(format!(
            "task count for {} jobs of size {} overflows",
            jobs, task_size
        ))
    })?;
    Ok(padded / task_size)
}

/// Ordered set of packed tasks, each stored as its own block.
///
/// The envelope is kept separately; `into_stream` produces the full response
/// with the envelope first.
#[derive(Debug, Clone, Default)]
pub struct TaskSet {
    buffer: Vec<u8>,
    ends: Vec<usize>,
    envelope: Option<Bytes>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate room for `tasks` blocks
    pub fn with_capacity(tasks: usize) -> Self {
        Self {
            buffer: Vec::new(),
            ends: Vec::with_capacity(tasks),
            envelope: None,
        }
    }

    /// Append one packed task
    pub fn append(&mut self, block: &[u8]) {
        self.buffer.extend_from_slice(block);
        self.ends.push(self.buffer.len());
    }

    /// Number of task blocks, not counting the envelope
    pub fn count(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Get the i-th task block
    pub fn get(&self, i: usize) -> Option<&[u8]> {
        let end = *self.ends.get(i)?;
        let start = if i == 0 { 0 } else { self.ends[i - 1] };
        Some(&self.buffer[start..end])
    }

    /// Iterate over the task blocks in order
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.count()).filter_map(move |i| self.get(i))
    }

    /// Size in bytes of all task blocks
    pub fn byte_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn set_envelope(&mut self, envelope: impl Into<Bytes>) {
        self.envelope = Some(envelope.into());
    }

    pub fn envelope(&self) -> Option<&[u8]> {
        self.envelope.as_deref()
    }

    /// The complete response: the envelope followed by every task block
    pub fn into_stream(self) -> Vec<u8> {
        let mut stream = Vec::with_capacity(
            self.envelope.as_ref().map_or(0, |e| e.len()) + self.buffer.len(),
        );
        if let Some(envelope) = &self.envelope {
            stream.extend_from_slice(envelope);
        }
        stream.extend_from_slice(&self.buffer);
        stream
    }

    /// Split into the envelope and owned task blocks, e.g. for handing tasks
    /// to a queue one by one
    pub fn into_parts(self) -> (Option<Bytes>, Vec<Bytes>) {
        let buffer = Bytes::from(self.buffer);
        let mut start = 0;
        let blocks = self
            .ends
            .iter()
            .map(|&end| {
                let block = buffer.slice(start..end);
                start = end;
                block
            })
            .collect();
        (self.envelope, blocks)
    }
}

/// Split every task into chunks of at most `task_size` ids and pack each chunk
/// into the task set, in order.
pub fn partition<T: Partition>(outputs: Vec<T>, task_size: usize) -> Result<TaskSet> {
    if task_size < 1 {
        return Err(CubeError::InvalidArgument(format!(
            "task_size (= {}) < 1",
            task_size
        )));
    }

    let mut total: usize = 0;
    for output in &outputs {
        let n = task_count(output.ids_len(), task_size)?;
        total = total
            .checked_add(n)
            .ok_or_else(|| CubeError::Overflow("total task count overflows".to_string()))?;
    }

    if u32::try_from(total).is_err() {
        return Err(CubeError::Overflow(format!(
            "task count (= {}) does not fit in a message array",
            total
        )));
    }

    let mut partitioned = TaskSet::with_capacity(total);
    for mut output in outputs {
        let ids = output.take_ids();
        for chunk in ids.chunks(task_size) {
            output.set_ids(chunk.to_vec());
            partitioned.append(&output.pack()?);
        }
    }

    Ok(partitioned)
}
