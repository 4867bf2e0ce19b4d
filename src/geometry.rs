//! Geometry of a cube divided into fixed-size fragments
//!
//! Three coordinate spaces are in play:
//!
//! - global: a point in the whole cube
//! - root: the fragment grid, `root = global / fragment_shape`
//! - local: a point inside one fragment, `local = global % fragment_shape`
//!
//! and `global = root * fragment_shape + local` holds for every point. Linear
//! offsets are row-major with the last axis (depth) varying fastest, both
//! within a fragment and over the whole cube.

use crate::error::{CubeError, Result};
use crate::types::{Axis, CubePoint, FragmentId, FragmentPoint, NDIMS};
use serde::{Deserialize, Serialize};
use std::ops::Range;

fn check_positive(what: &str, dims: &[usize; NDIMS]) -> Result<()> {
    if dims.iter().any(|&d| d == 0) {
        return Err(CubeError::InvalidArgument(format!(
            "{} must be positive in every dimension, was {:?}",
            what, dims
        )));
    }
    Ok(())
}

fn linear_offset(p: &[usize; NDIMS], shape: &[usize; NDIMS]) -> usize {
    p[0] * shape[1] * shape[2] + p[1] * shape[2] + p[2]
}

fn axis_range(axis: Axis, fixed: Axis, pin: usize, extent: usize) -> Range<usize> {
    if axis == fixed {
        pin..pin + 1
    } else {
        0..extent
    }
}

/// Size of a fragment in each dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentShape {
    dims: [usize; NDIMS],
}

impl FragmentShape {
    /// Create a new fragment shape
    pub fn new(dims: [usize; NDIMS]) -> Result<Self> {
        check_positive("fragment shape", &dims)?;
        Ok(Self { dims })
    }

    /// Get the size for a specific dimension
    pub fn get(&self, axis: Axis) -> usize {
        self.dims[axis.to_index()]
    }

    /// Get all dimensions
    pub fn dims(&self) -> &[usize; NDIMS] {
        &self.dims
    }

    /// Total number of cells in a fragment
    pub fn total_cells(&self) -> usize {
        self.dims.iter().product()
    }

    /// The plane index within a fragment that corresponds to the global plane
    /// `index` along `axis`.
    pub fn index(&self, axis: Axis, index: usize) -> usize {
        index % self.get(axis)
    }

    /// Linear offset of a local point
    pub fn local_to_offset(&self, p: FragmentPoint) -> usize {
        linear_offset(&p.0, &self.dims)
    }

    /// Local point of a linear offset
    pub fn offset_to_local(&self, offset: usize) -> FragmentPoint {
        let [_, fy, fz] = self.dims;
        FragmentPoint::new(offset / (fy * fz), (offset / fz) % fy, offset % fz)
    }

    /// Linear offsets of every cell of the plane at `local_index` along `axis`,
    /// in increasing order.
    pub fn slice_offsets(&self, axis: Axis, local_index: usize) -> Result<Vec<usize>> {
        if local_index >= self.get(axis) {
            return Err(CubeError::OutOfRange(format!(
                "local index (= {}) not in [0, {}) along {}",
                local_index,
                self.get(axis),
                axis
            )));
        }

        let [fx, fy, fz] = self.dims;
        let mut offsets = Vec::with_capacity(self.total_cells() / self.get(axis));
        for x in axis_range(Axis::Dim0, axis, local_index, fx) {
            for y in axis_range(Axis::Dim1, axis, local_index, fy) {
                for z in axis_range(Axis::Dim2, axis, local_index, fz) {
                    offsets.push(self.local_to_offset(FragmentPoint::new(x, y, z)));
                }
            }
        }
        Ok(offsets)
    }
}

/// Size of the whole cube in each dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CubeShape {
    dims: [usize; NDIMS],
}

impl CubeShape {
    /// Create a new cube shape
    pub fn new(dims: [usize; NDIMS]) -> Result<Self> {
        check_positive("cube shape", &dims)?;
        Ok(Self { dims })
    }

    /// Get the size for a specific dimension
    pub fn get(&self, axis: Axis) -> usize {
        self.dims[axis.to_index()]
    }

    /// Get all dimensions
    pub fn dims(&self) -> &[usize; NDIMS] {
        &self.dims
    }

    /// Total number of cells in the cube
    pub fn total_cells(&self) -> usize {
        self.dims.iter().product()
    }

    /// Check if a point is within bounds
    pub fn contains(&self, p: CubePoint) -> bool {
        p.0.iter().zip(self.dims.iter()).all(|(&c, &d)| c < d)
    }

    /// Linear offset of a global point
    pub fn point_to_offset(&self, p: CubePoint) -> usize {
        linear_offset(&p.0, &self.dims)
    }
}

/// Geometric volume transform: coordinate math for a cube split into
/// fragments. Pure and cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gvt {
    cube: CubeShape,
    fragment: FragmentShape,
}

impl Gvt {
    /// Create a transform from a cube shape and a fragment shape
    pub fn new(cube: [usize; NDIMS], fragment: [usize; NDIMS]) -> Result<Self> {
        Ok(Self {
            cube: CubeShape::new(cube)?,
            fragment: FragmentShape::new(fragment)?,
        })
    }

    /// Validate an axis index
    pub fn mkdim(&self, axis: usize) -> Result<Axis> {
        Axis::try_from_index(axis)
    }

    pub fn fragment_shape(&self) -> &FragmentShape {
        &self.fragment
    }

    pub fn cube_shape(&self) -> &CubeShape {
        &self.cube
    }

    /// Number of fragments along an axis. The last one may be partial.
    pub fn fragment_count(&self, axis: Axis) -> usize {
        self.cube.get(axis).div_ceil(self.fragment.get(axis))
    }

    /// Number of fragments along every axis
    pub fn fragment_counts(&self) -> [usize; NDIMS] {
        Axis::ALL.map(|axis| self.fragment_count(axis))
    }

    /// Total number of fragments
    pub fn total_fragments(&self) -> usize {
        self.fragment_counts().iter().product()
    }

    /// Root coordinate of a global point, without bounds checking
    pub fn root_of(&self, p: CubePoint) -> FragmentId {
        FragmentId(Axis::ALL.map(|axis| p[axis] / self.fragment.get(axis)))
    }

    /// Local coordinate of a global point, without bounds checking
    pub fn local_of(&self, p: CubePoint) -> FragmentPoint {
        FragmentPoint(Axis::ALL.map(|axis| p[axis] % self.fragment.get(axis)))
    }

    /// Global coordinate of a local point in a fragment
    pub fn to_global(&self, id: FragmentId, local: FragmentPoint) -> CubePoint {
        CubePoint(Axis::ALL.map(|axis| id[axis] * self.fragment.get(axis) + local[axis]))
    }

    /// ID of the fragment containing `p`
    pub fn frag_id(&self, p: CubePoint) -> Result<FragmentId> {
        self.check_bounds(p)?;
        Ok(self.root_of(p))
    }

    /// Position of `p` within its fragment
    pub fn to_local(&self, p: CubePoint) -> Result<FragmentPoint> {
        self.check_bounds(p)?;
        Ok(self.local_of(p))
    }

    /// IDs of all fragments intersecting the plane at `index` along `axis`,
    /// ordered lexicographically.
    pub fn slice(&self, axis: Axis, index: usize) -> Result<Vec<FragmentId>> {
        if index >= self.cube.get(axis) {
            return Err(CubeError::OutOfRange(format!(
                "index (= {}) not in [0, {}) along {}",
                index,
                self.cube.get(axis),
                axis
            )));
        }

        let pin = index / self.fragment.get(axis);
        let [cx, cy, cz] = self.fragment_counts();
        let mut ids = Vec::with_capacity(self.total_fragments() / self.fragment_count(axis));
        for x in axis_range(Axis::Dim0, axis, pin, cx) {
            for y in axis_range(Axis::Dim1, axis, pin, cy) {
                for z in axis_range(Axis::Dim2, axis, pin, cz) {
                    ids.push(FragmentId::new(x, y, z));
                }
            }
        }
        Ok(ids)
    }

    /// Global linear offset of the cell at fragment-local `offset` in fragment
    /// `root`.
    ///
    /// Fails if the cell falls in the padding of a partial edge fragment.
    pub fn local_to_global(&self, offset: usize, root: FragmentId) -> Result<u64> {
        if offset >= self.fragment.total_cells() {
            return Err(CubeError::OutOfRange(format!(
                "local offset (= {}) not in [0, {})",
                offset,
                self.fragment.total_cells()
            )));
        }

        let global = self.to_global(root, self.fragment.offset_to_local(offset));
        self.check_bounds(global)?;
        Ok(self.cube.point_to_offset(global) as u64)
    }

    fn check_bounds(&self, p: CubePoint) -> Result<()> {
        if !self.cube.contains(p) {
            return Err(CubeError::OutOfRange(format!(
                "point {} outside cube {:?}",
                p,
                self.cube.dims()
            )));
        }
        Ok(())
    }
}
