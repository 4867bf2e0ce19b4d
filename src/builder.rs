//! Building task descriptions from queries
//!
//! A builder resolves a query against the manifest geometry into the set of
//! fragment ids to read and what to extract from each. There is one builder
//! per query shape. Attributes requested but not recorded for the survey are
//! skipped, since it is perfectly common to ask for e.g. cdp on surveys that
//! don't have it.

use crate::error::Result;
use crate::geometry::Gvt;
use crate::query::{CurtainQuery, Function, SliceQuery};
use crate::task::{CurtainTask, Single, SliceTask, TaskBase};
use crate::types::{Axis, CubePoint, FragmentId};
use std::collections::BTreeMap;
use tracing::debug;

/// Build the slice tasks: one for the data volume and one per known attribute
pub fn build_slice(query: &SliceQuery) -> Result<Vec<SliceTask>> {
    let base = &query.base;
    let mut tasks = Vec::with_capacity(base.attributes.len() + 1);

    let gvt = base.manifest.gvt()?;
    let dim = gvt.mkdim(query.dim)?;
    let mut task = SliceTask::new(TaskBase::data(base, Function::Slice)?, query.dim);
    task.idx = gvt.fragment_shape().index(dim, query.idx);
    task.ids = gvt.slice(dim, query.idx)?;
    tasks.push(task);

    for attr in &base.attributes {
        let Some(desc) = base.manifest.attribute(attr) else {
            debug!(pid = %base.pid, attribute = %attr, "attribute not in manifest, skipping");
            continue;
        };

        let mut task = SliceTask::new(TaskBase::attribute(base, Function::Slice, desc)?, query.dim);
        let gvt = task.base.gvt()?;
        // Attribute volumes have a single depth layer, so a depth slice must
        // be moved back into the grid. For the other axes this is a no-op.
        let idx = query.idx % gvt.cube_shape().get(dim);
        task.idx = gvt.fragment_shape().index(dim, idx);
        task.ids = gvt.slice(dim, idx)?;
        tasks.push(task);
    }

    Ok(tasks)
}

/// Bin every (x, y) of the curtain into all fragments of its column.
///
/// Each fragment appears once, ordered by id, and holds the local (x, y) of
/// every trace that passes through it.
fn bin_columns(gvt: &Gvt, query: &CurtainQuery, reserve: usize) -> Result<Vec<Single>> {
    let zfrags = gvt.fragment_count(Axis::Dim2);
    let mut bins: BTreeMap<FragmentId, Single> = BTreeMap::new();

    for (i, (x, y)) in query.pairs()?.enumerate() {
        let top = CubePoint::new(x, y, 0);
        let fid = gvt.frag_id(top)?;
        let lid = gvt.to_local(top)?;

        for z in 0..zfrags {
            let id = fid.with_z(z);
            bins.entry(id)
                .or_insert_with(|| {
                    let mut single = Single::new(id, i);
                    single.coordinates.reserve(reserve);
                    single
                })
                .coordinates
                .push([lid.x(), lid.y()]);
        }
    }

    Ok(bins.into_values().collect())
}

/// Build the curtain tasks: one for the data volume and one per known
/// attribute. Attributes may be partitioned differently than the data, so
/// their bins are computed separately.
pub fn build_curtain(query: &CurtainQuery) -> Result<Vec<CurtainTask>> {
    let base = &query.base;
    let mut tasks = Vec::with_capacity(base.attributes.len() + 1);

    let gvt = base.manifest.gvt()?;
    // A plane through a fragment, with a little margin
    let fragment = gvt.fragment_shape();
    let approx_per_fragment =
        fragment.get(Axis::Dim0).max(fragment.get(Axis::Dim1)) * 6 / 5;

    let mut task = CurtainTask::new(TaskBase::data(base, Function::Curtain)?);
    task.ids = bin_columns(&gvt, query, approx_per_fragment)?;
    tasks.push(task);

    for attr in &base.attributes {
        let Some(desc) = base.manifest.attribute(attr) else {
            debug!(pid = %base.pid, attribute = %attr, "attribute not in manifest, skipping");
            continue;
        };

        let mut task = CurtainTask::new(TaskBase::attribute(base, Function::Curtain, desc)?);
        let gvt = task.base.gvt()?;
        task.ids = bin_columns(&gvt, query, 0)?;
        tasks.push(task);
    }

    Ok(tasks)
}
