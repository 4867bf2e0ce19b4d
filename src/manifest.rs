//! Survey manifest structures

use crate::error::{CubeError, Result};
use crate::geometry::Gvt;
use crate::types::{Axis, NDIMS};
use serde::{Deserialize, Serialize};

/// The only manifest schema understood by this version
pub const FORMAT_VERSION: u64 = 1;

/// A fragmented volume of the survey, e.g. the source data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDesc {
    /// Storage prefix, e.g. `src`
    pub prefix: String,

    /// File extension of fragments
    #[serde(rename = "file-extension")]
    pub ext: String,

    /// Fragment shapes the volume is available in
    pub shapes: Vec<[usize; NDIMS]>,
}

/// An attribute (cdpx, utmx, ...), stored as a 3D volume with depth 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDesc {
    /// Attribute name, matched against the attributes of a query
    #[serde(rename = "type")]
    pub kind: String,

    /// Storage prefix, e.g. `attributes/cdpx`
    pub prefix: String,

    #[serde(rename = "file-extension")]
    pub ext: String,

    #[serde(default)]
    pub layout: String,

    #[serde(default)]
    pub labels: Vec<String>,

    pub shapes: Vec<[usize; NDIMS]>,
}

impl AttributeDesc {
    /// The fragment shape used when querying this attribute
    pub fn shape(&self) -> Result<[usize; NDIMS]> {
        self.shapes.first().copied().ok_or_else(|| {
            CubeError::InvalidDocument(format!("attribute {} has no shapes", self.kind))
        })
    }
}

/// Manifest describing the geometry and storage layout of one survey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version of this document
    #[serde(rename = "format-version")]
    pub format_version: u64,

    /// Volumes with the trace values
    pub data: Vec<VolumeDesc>,

    /// Attribute volumes
    #[serde(default)]
    pub attributes: Vec<AttributeDesc>,

    /// Line numbers (axis labels) of every dimension
    #[serde(rename = "line-numbers")]
    pub line_numbers: Vec<Vec<i64>>,

    /// Human readable name of every dimension
    #[serde(rename = "line-labels", default)]
    pub line_labels: Vec<String>,
}

impl Manifest {
    /// Parse a manifest from JSON and check that it is structurally usable
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the invariants the schedulers index on
    pub fn validate(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(CubeError::UnsupportedFormatVersion {
                expected: FORMAT_VERSION,
                found: self.format_version.to_string(),
            });
        }

        if self.line_numbers.len() != NDIMS {
            return Err(CubeError::InvalidDocument(format!(
                "expected {} line-number dimensions, was {}",
                NDIMS,
                self.line_numbers.len()
            )));
        }

        if self.line_numbers.iter().any(|dim| dim.is_empty()) {
            return Err(CubeError::InvalidDocument(
                "line-numbers must be non-empty in every dimension".to_string(),
            ));
        }

        Gvt::new(self.cube_shape()?, self.fragment_shape()?)
            .map_err(|e| CubeError::InvalidDocument(e.to_string()))?;

        for attr in &self.attributes {
            Gvt::new(self.attribute_cube_shape()?, attr.shape()?)
                .map_err(|e| CubeError::InvalidDocument(format!("{}: {}", attr.kind, e)))?;
        }

        Ok(())
    }

    /// The volume queries read trace values from
    pub fn data_volume(&self) -> Result<&VolumeDesc> {
        self.data
            .first()
            .ok_or_else(|| CubeError::InvalidDocument("Missing data field".to_string()))
    }

    /// The fragment shape of the data volume.
    ///
    /// Only the first shape is used; picking a better shape per query is
    /// possible once more than one is uploaded.
    pub fn fragment_shape(&self) -> Result<[usize; NDIMS]> {
        self.data_volume()?
            .shapes
            .first()
            .copied()
            .ok_or_else(|| CubeError::InvalidDocument("Missing shape field".to_string()))
    }

    /// Size of the cube, i.e. the number of line numbers along each axis
    pub fn cube_shape(&self) -> Result<[usize; NDIMS]> {
        match self.line_numbers.as_slice() {
            [d0, d1, d2] => Ok([d0.len(), d1.len(), d2.len()]),
            dims => Err(CubeError::InvalidDocument(format!(
                "expected {} line-number dimensions, was {}",
                NDIMS,
                dims.len()
            ))),
        }
    }

    /// Cube shape of attribute volumes, which have a single depth layer
    pub fn attribute_cube_shape(&self) -> Result<[usize; NDIMS]> {
        let mut shape = self.cube_shape()?;
        shape[NDIMS - 1] = 1;
        Ok(shape)
    }

    /// Geometry of the data volume
    pub fn gvt(&self) -> Result<Gvt> {
        Gvt::new(self.cube_shape()?, self.fragment_shape()?)
    }

    /// Geometry of an attribute volume
    pub fn attribute_gvt(&self, attr: &AttributeDesc) -> Result<Gvt> {
        Gvt::new(self.attribute_cube_shape()?, attr.shape()?)
    }

    /// Look up an attribute by name
    pub fn attribute(&self, kind: &str) -> Option<&AttributeDesc> {
        self.attributes.iter().find(|desc| desc.kind == kind)
    }

    /// Line numbers along an axis
    pub fn dimension(&self, axis: Axis) -> Result<&[i64]> {
        self.line_numbers
            .get(axis.to_index())
            .map(Vec::as_slice)
            .ok_or_else(|| CubeError::InvalidDocument(format!("missing line numbers for {}", axis)))
    }

    /// The line number at `index` along `axis`
    pub fn line_number(&self, axis: Axis, index: usize) -> Result<i64> {
        let dim = self.dimension(axis)?;
        dim.get(index).copied().ok_or_else(|| {
            CubeError::OutOfRange(format!(
                "index (= {}) not in [0, {}) along {}",
                index,
                dim.len(),
                axis
            ))
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_manifest_json() -> serde_json::Value {
        serde_json::json!({
            "format-version": 1,
            "data": [
                { "prefix": "src", "file-extension": "f32", "shapes": [[2, 2, 2]] }
            ],
            "attributes": [
                {
                    "type": "cdpx",
                    "prefix": "attributes/cdpx",
                    "file-extension": "f32",
                    "layout": "tiled",
                    "labels": ["CDP X"],
                    "shapes": [[2, 2, 1]]
                },
                {
                    "type": "cdpy",
                    "prefix": "attributes/cdpy",
                    "file-extension": "f32",
                    "layout": "tiled",
                    "labels": ["CDP Y"],
                    "shapes": [[4, 4, 1]]
                }
            ],
            "line-numbers": [[1, 2, 3, 4], [10, 11, 12, 13], [0, 4]],
            "line-labels": ["inline", "crossline", "time"]
        })
    }

    pub(crate) fn test_manifest() -> Manifest {
        serde_json::from_value(test_manifest_json()).unwrap()
    }

    #[test]
    fn test_parse_manifest() {
        let bytes = serde_json::to_vec(&test_manifest_json()).unwrap();
        let manifest = Manifest::from_json(&bytes).unwrap();
        assert_eq!(manifest.cube_shape().unwrap(), [4, 4, 2]);
        assert_eq!(manifest.fragment_shape().unwrap(), [2, 2, 2]);
        assert_eq!(manifest.attribute_cube_shape().unwrap(), [4, 4, 1]);
        assert_eq!(manifest.line_labels, vec!["inline", "crossline", "time"]);
    }

    #[test]
    fn test_attribute_lookup() {
        let manifest = test_manifest();
        assert_eq!(manifest.attribute("cdpy").unwrap().shape().unwrap(), [4, 4, 1]);
        assert!(manifest.attribute("utmx").is_none());
    }

    #[test]
    fn test_line_number_bounds() {
        let manifest = test_manifest();
        assert_eq!(manifest.line_number(Axis::Dim1, 3).unwrap(), 13);
        assert!(matches!(
            manifest.line_number(Axis::Dim2, 2),
            Err(CubeError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_dimensionality() {
        let mut doc = test_manifest_json();
        doc["line-numbers"] = serde_json::json!([[1, 2], [1, 2]]);
        let bytes = serde_json::to_vec(&doc).unwrap();
        assert!(matches!(
            Manifest::from_json(&bytes),
            Err(CubeError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_rejects_missing_shape() {
        let mut manifest = test_manifest();
        manifest.data[0].shapes.clear();
        assert!(matches!(
            manifest.validate(),
            Err(CubeError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_rejects_future_version() {
        let mut manifest = test_manifest();
        manifest.format_version = 2;
        assert!(matches!(
            manifest.validate(),
            Err(CubeError::UnsupportedFormatVersion { found, .. }) if found == "2"
        ));
    }
}
