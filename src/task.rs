//! Task descriptions handed to workers
//!
//! A task carries everything a worker needs to fetch fragments and extract
//! values from them: where the fragments live, their geometry, and the
//! fragment ids plus what to extract from each.

use crate::error::Result;
use crate::geometry::Gvt;
use crate::manifest::AttributeDesc;
use crate::partition::Partition;
use crate::query::{Function, QueryBase};
use crate::types::{FragmentId, NDIMS};
use serde::{Deserialize, Serialize};

/// Name of the attribute holding the trace values
pub const DATA_ATTRIBUTE: &str = "data";

/// Fields shared by all tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBase {
    pub pid: String,
    pub token: String,
    pub guid: String,
    pub storage_endpoint: String,
    pub prefix: String,
    pub ext: String,
    /// Fragment shape
    pub shape: [usize; NDIMS],
    /// Shape of the cube the fragments partition
    pub shape_cube: [usize; NDIMS],
    pub function: Function,
    pub attribute: String,
}

impl TaskBase {
    /// Task reading the data volume
    pub fn data(query: &QueryBase, function: Function) -> Result<Self> {
        let manifest = &query.manifest;
        let volume = manifest.data_volume()?;
        Ok(Self {
            pid: query.pid.clone(),
            token: query.token.clone(),
            guid: query.guid.clone(),
            storage_endpoint: query.storage_endpoint.clone(),
            prefix: volume.prefix.clone(),
            ext: volume.ext.clone(),
            shape: manifest.fragment_shape()?,
            shape_cube: manifest.cube_shape()?,
            function,
            attribute: DATA_ATTRIBUTE.to_string(),
        })
    }

    /// Task reading an attribute volume
    pub fn attribute(query: &QueryBase, function: Function, attr: &AttributeDesc) -> Result<Self> {
        let manifest = &query.manifest;
        Ok(Self {
            pid: query.pid.clone(),
            token: query.token.clone(),
            guid: query.guid.clone(),
            storage_endpoint: query.storage_endpoint.clone(),
            prefix: attr.prefix.clone(),
            ext: attr.ext.clone(),
            shape: attr.shape()?,
            shape_cube: manifest.attribute_cube_shape()?,
            function,
            attribute: attr.kind.clone(),
        })
    }

    /// Geometry of the volume this task reads
    pub fn gvt(&self) -> Result<Gvt> {
        Gvt::new(self.shape_cube, self.shape)
    }
}

/// Extract the plane `idx` (local to the fragment) along `dim` from every
/// fragment in `ids`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceTask {
    pub base: TaskBase,
    pub dim: usize,
    pub idx: usize,
    pub ids: Vec<FragmentId>,
}

impl SliceTask {
    pub fn new(base: TaskBase, dim: usize) -> Self {
        Self {
            base,
            dim,
            idx: 0,
            ids: Vec::new(),
        }
    }
}

impl Partition for SliceTask {
    type Id = FragmentId;

    fn take_ids(&mut self) -> Vec<FragmentId> {
        std::mem::take(&mut self.ids)
    }

    fn set_ids(&mut self, ids: Vec<FragmentId>) {
        self.ids = ids;
    }

    fn ids_len(&self) -> usize {
        self.ids.len()
    }
}

/// One fragment of a curtain and the traces to extract from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Single {
    /// Fragment id
    pub id: FragmentId,
    /// Index of the first input point that falls in this fragment's column
    pub offset: usize,
    /// Local (x, y) position of every trace in the fragment
    pub coordinates: Vec<[usize; 2]>,
}

impl Single {
    pub fn new(id: FragmentId, offset: usize) -> Self {
        Self {
            id,
            offset,
            coordinates: Vec::new(),
        }
    }
}

/// Extract full traces from every fragment in `ids`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurtainTask {
    pub base: TaskBase,
    pub ids: Vec<Single>,
}

impl CurtainTask {
    pub fn new(base: TaskBase) -> Self {
        Self {
            base,
            ids: Vec::new(),
        }
    }
}

impl Partition for CurtainTask {
    type Id = Single;

    fn take_ids(&mut self) -> Vec<Single> {
        std::mem::take(&mut self.ids)
    }

    fn set_ids(&mut self, ids: Vec<Single>) {
        self.ids = ids;
    }

    fn ids_len(&self) -> usize {
        self.ids.len()
    }
}
