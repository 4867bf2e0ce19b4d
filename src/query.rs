//! Query documents
//!
//! A query is a JSON document naming the function (shape) to extract, its
//! arguments, the requested attributes and the full manifest of the survey.

use crate::error::{CubeError, Result};
use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The query shapes the scheduler knows how to plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Function {
    Slice,
    Curtain,
}

impl Function {
    pub fn as_str(&self) -> &'static str {
        match self {
            Function::Slice => "slice",
            Function::Curtain => "curtain",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Function> for String {
    fn from(function: Function) -> Self {
        function.as_str().to_string()
    }
}

impl TryFrom<String> for Function {
    type Error = CubeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl FromStr for Function {
    type Err = CubeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "slice" => Ok(Function::Slice),
            "curtain" => Ok(Function::Curtain),
            other => Err(CubeError::UnknownFunction(other.to_string())),
        }
    }
}

/// Fields shared by all queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBase {
    /// Process id, echoed in every task and in the header
    pub pid: String,

    /// Opaque credential forwarded to workers
    #[serde(default)]
    pub token: String,

    /// Survey id, forwarded to workers
    #[serde(default)]
    pub guid: String,

    #[serde(default)]
    pub storage_endpoint: String,

    pub manifest: Manifest,

    #[serde(default)]
    pub attributes: Vec<String>,
}

impl QueryBase {
    /// Replace the requested attributes with their normalized form
    pub fn normalize_attributes(&mut self) {
        self.attributes = normalized_attributes(&self.attributes);
    }
}

/// An axis-aligned plane at line `idx` along `dim`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceQuery {
    #[serde(flatten)]
    pub base: QueryBase,
    pub dim: usize,
    pub idx: usize,
}

/// A vertical section through the (dim0s[i], dim1s[i]) polyline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurtainQuery {
    #[serde(flatten)]
    pub base: QueryBase,
    pub dim0s: Vec<usize>,
    pub dim1s: Vec<usize>,
}

impl CurtainQuery {
    /// Number of traces in the curtain
    pub fn len(&self) -> usize {
        self.dim0s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dim0s.is_empty()
    }

    /// The polyline as (x, y) pairs. Fails if the coordinate arrays differ in
    /// length.
    pub fn pairs(&self) -> Result<impl Iterator<Item = (usize, usize)> + '_> {
        if self.dim0s.len() != self.dim1s.len() {
            return Err(CubeError::InvalidDocument(format!(
                "dim0s and dim1s differ in length ({} != {})",
                self.dim0s.len(),
                self.dim1s.len()
            )));
        }
        Ok(self.dim0s.iter().copied().zip(self.dim1s.iter().copied()))
    }
}

/// Expand, sort and deduplicate attribute names. `cdp` is shorthand for the
/// pair `cdpx`, `cdpy`.
pub fn normalized_attributes<S: AsRef<str>>(attributes: &[S]) -> Vec<String> {
    let mut attrs = Vec::with_capacity(attributes.len() * 2);
    for attr in attributes {
        match attr.as_ref() {
            "cdp" => {
                attrs.push("cdpx".to_string());
                attrs.push("cdpy".to_string());
            }
            other => attrs.push(other.to_string()),
        }
    }

    attrs.sort();
    attrs.dedup();
    attrs
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "function", rename_all = "lowercase")]
enum Args {
    Slice { dim: usize, idx: usize },
    Curtain { dim0s: Vec<usize>, dim1s: Vec<usize> },
}

/// Builder for query documents
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pid: String,
    token: String,
    guid: String,
    storage_endpoint: String,
    manifest: Manifest,
    attributes: Vec<String>,
    #[serde(flatten)]
    args: Args,
}

impl Request {
    fn new(manifest: Manifest, args: Args) -> Self {
        Self {
            pid: Uuid::new_v4().to_string(),
            token: String::new(),
            guid: String::new(),
            storage_endpoint: String::new(),
            manifest,
            attributes: Vec::new(),
            args,
        }
    }

    /// A slice at (0-based) index `idx` along `dim`
    pub fn slice(manifest: Manifest, dim: usize, idx: usize) -> Self {
        Self::new(manifest, Args::Slice { dim, idx })
    }

    /// A curtain through the (0-based) (x, y) pairs
    pub fn curtain(manifest: Manifest, pairs: &[(usize, usize)]) -> Self {
        let (dim0s, dim1s) = pairs.iter().copied().unzip();
        Self::new(manifest, Args::Curtain { dim0s, dim1s })
    }

    /// Use a given process id instead of a generated one
    pub fn with_pid(mut self, pid: impl Into<String>) -> Self {
        self.pid = pid.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = guid.into();
        self
    }

    pub fn with_storage_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.storage_endpoint = endpoint.into();
        self
    }

    pub fn with_attributes<S: Into<String>>(mut self, attributes: impl IntoIterator<Item = S>) -> Self {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    /// Serialize to the JSON document accepted by the scheduler
    pub fn to_document(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CubeError::Serialization(e.to_string()))
    }
}
