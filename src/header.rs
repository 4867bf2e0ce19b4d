//! The process header
//!
//! The header is the first thing a client reads from a response. It tells the
//! client how many task results to expect and how to assemble them, so the
//! output can be pre-allocated and filled in as results stream in, in any
//! order.
//!
//! `index` and `shapes` are laid out flat. The first `ndims` items of `index`
//! are the sizes of each output dimension, followed by the line numbers of
//! each dimension in turn:
//!
//! ```text
//! ndims: 2
//! index: [3 5 n1 n2 n3 m1 m2 m3 m4 m5]
//! ```
//!
//! `shapes` holds one entry per attribute, each prefixed by its rank:
//! `[rank, s1, .., rank, s1, ..]`.

use crate::error::Result;
use crate::query::{CurtainQuery, Function, QueryBase, SliceQuery};
use crate::task::DATA_ATTRIBUTE;
use crate::types::{Axis, NDIMS};
use serde::{Deserialize, Serialize};

/// Output description of a scheduled process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHeader {
    pub pid: String,
    pub function: Function,
    /// Number of task results in the response
    pub nbundles: usize,
    pub ndims: usize,
    /// Axis labels
    pub labels: Vec<String>,
    pub index: Vec<i64>,
    /// Output attributes, `data` first
    pub attributes: Vec<String>,
    pub shapes: Vec<usize>,
}

impl ProcessHeader {
    fn new(query: &QueryBase, function: Function, ntasks: usize, attributes: Vec<String>) -> Self {
        let mut names = Vec::with_capacity(attributes.len() + 1);
        names.push(DATA_ATTRIBUTE.to_string());
        names.extend(attributes);

        Self {
            pid: query.pid.clone(),
            function,
            nbundles: ntasks,
            ndims: NDIMS,
            labels: query.manifest.line_labels.clone(),
            index: Vec::new(),
            attributes: names,
            shapes: Vec::new(),
        }
    }

    /// Sizes of each output dimension
    pub fn index_sizes(&self) -> &[i64] {
        &self.index[..self.ndims.min(self.index.len())]
    }

    /// Output shape of an attribute
    pub fn shape_of(&self, attribute: &str) -> Option<&[usize]> {
        let position = self.attributes.iter().position(|a| a == attribute)?;
        let mut rest = self.shapes.as_slice();
        for _ in 0..position {
            let rank = *rest.first()?;
            rest = rest.get(rank + 1..)?;
        }
        let rank = *rest.first()?;
        rest.get(1..rank + 1)
    }
}

/// Header of a slice. The queried axis has size 1 and its single line number
/// is included, so clients can tell which line and direction was queried.
pub fn slice_header(query: &SliceQuery, ntasks: usize) -> Result<ProcessHeader> {
    let manifest = &query.base.manifest;
    let dim = Axis::try_from_index(query.dim)?;
    let queried = manifest.line_number(dim, query.idx)?;

    let attributes = query.base.attributes.clone();
    let mut head = ProcessHeader::new(&query.base, Function::Slice, ntasks, attributes);

    let mut sizes = Vec::with_capacity(NDIMS);
    for axis in Axis::ALL {
        if axis == dim {
            sizes.push(1);
        } else {
            sizes.push(manifest.dimension(axis)?.len());
        }
    }

    head.index.extend(sizes.iter().map(|&s| s as i64));
    for axis in Axis::ALL {
        if axis == dim {
            head.index.push(queried);
        } else {
            head.index.extend_from_slice(manifest.dimension(axis)?);
        }
    }

    // data matches the index. Attributes have one value per trace for
    // vertical slices and are a field for depth slices:
    //
    // dim0: [1, N, M] -> [1, N, 1]
    // dim1: [N, 1, M] -> [N, 1, 1]
    // dim2: [N, M, 1] -> [N, M, 1]
    head.shapes.push(NDIMS);
    head.shapes.extend_from_slice(&sizes);
    for _ in 1..head.attributes.len() {
        head.shapes.push(NDIMS);
        head.shapes.extend_from_slice(&sizes[..NDIMS - 1]);
        head.shapes.push(1);
    }

    Ok(head)
}

/// Header of a curtain. Attributes are always one value per trace.
pub fn curtain_header(query: &CurtainQuery, ntasks: usize) -> Result<ProcessHeader> {
    let manifest = &query.base.manifest;
    let ntraces = query.pairs()?.count();
    let depth = manifest.dimension(Axis::Dim2)?;

    let attributes = query.base.attributes.clone();
    let mut head = ProcessHeader::new(&query.base, Function::Curtain, ntasks, attributes);

    head.index.push(query.dim0s.len() as i64);
    head.index.push(query.dim1s.len() as i64);
    head.index.push(depth.len() as i64);
    for &x in &query.dim0s {
        head.index.push(manifest.line_number(Axis::Dim0, x)?);
    }
    for &y in &query.dim1s {
        head.index.push(manifest.line_number(Axis::Dim1, y)?);
    }
    head.index.extend_from_slice(depth);

    head.shapes.extend([2, ntraces, depth.len()]);
    for _ in 1..head.attributes.len() {
        head.shapes.extend([1, ntraces]);
    }

    Ok(head)
}
