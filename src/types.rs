//! Core coordinate types for fragmented cubes

use crate::error::{CubeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// Number of dimensions of a survey cube
pub const NDIMS: usize = 3;

/// Axis of a cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Axis {
    /// Dimension 0 (inline)
    Dim0 = 0,
    /// Dimension 1 (crossline)
    Dim1 = 1,
    /// Dimension 2 (depth/time)
    Dim2 = 2,
}

impl Axis {
    /// All axes, in order
    pub const ALL: [Axis; NDIMS] = [Axis::Dim0, Axis::Dim1, Axis::Dim2];

    /// Convert from usize index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Axis::Dim0),
            1 => Some(Axis::Dim1),
            2 => Some(Axis::Dim2),
            _ => None,
        }
    }

    /// Convert from usize index, failing with `OutOfRange`
    pub fn try_from_index(index: usize) -> Result<Self> {
        Self::from_index(index).ok_or_else(|| {
            CubeError::OutOfRange(format!("axis (= {}) not in [0, {})", index, NDIMS))
        })
    }

    /// Convert to usize index
    pub fn to_index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dim{}", self.to_index())
    }
}

macro_rules! point_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub [usize; NDIMS]);

        impl $name {
            pub fn new(x: usize, y: usize, z: usize) -> Self {
                Self([x, y, z])
            }

            pub fn x(&self) -> usize {
                self.0[0]
            }

            pub fn y(&self) -> usize {
                self.0[1]
            }

            pub fn z(&self) -> usize {
                self.0[2]
            }

            pub fn get(&self, axis: Axis) -> usize {
                self.0[axis.to_index()]
            }
        }

        impl Index<Axis> for $name {
            type Output = usize;

            fn index(&self, axis: Axis) -> &usize {
                &self.0[axis.to_index()]
            }
        }

        impl From<[usize; NDIMS]> for $name {
            fn from(xs: [usize; NDIMS]) -> Self {
                Self(xs)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "({}, {}, {})", self.0[0], self.0[1], self.0[2])
            }
        }
    };
}

point_type!(
    /// Point in global (whole cube) coordinates
    CubePoint
);

point_type!(
    /// Point in local coordinates, relative to the origin of its fragment
    FragmentPoint
);

point_type!(
    /// Root coordinate of a fragment in the fragment grid.
    ///
    /// This is the storage key of a fragment. Ordering is lexicographic on
    /// (x, y, z), which is what every sorted bin and task list relies on.
    FragmentId
);

impl FragmentId {
    /// Same fragment column, different depth
    pub fn with_z(mut self, z: usize) -> Self {
        self.0[2] = z;
        self
    }
}
