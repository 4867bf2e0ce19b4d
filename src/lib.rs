//! fragcube - fragmented seismic cube addressing, scheduling and stitching
//!
//! A seismic cube is stored as a grid of equally sized fragments. This crate
//! does the arithmetic between global cube coordinates and (fragment id,
//! local coordinate) pairs, turns slice and curtain queries into compact
//! streams of msgpack-encoded tasks for a worker pool, and stitches samples
//! read from fragment files back into global coordinates.
//!
//! # Features
//!
//! - Geometric volume transform ([`Gvt`]) for 3D cubes with partial edge
//!   fragments
//! - Slice and curtain task builders, with attribute support
//! - Streamable responses: `[header, [task, task, ...]]` in one msgpack message
//! - Parallel, memory-mapped stitcher (see the `stitch` binary)
//! - Local filesystem storage (implement [`Storage`] for cloud storage)
//!
//! # Example
//!
//! ```rust,ignore
//! use fragcube::{Request, Scheduler, SchedulerConfig};
//!
//! # fn example(manifest: fragcube::Manifest) -> fragcube::Result<()> {
//! let doc = Request::slice(manifest, 0, 120)
//!     .with_attributes(["cdp"])
//!     .to_document()?;
//!
//! let scheduler = Scheduler::new(SchedulerConfig::new().with_task_size(10))?;
//! let tasks = scheduler.schedule(&doc)?;
//! for block in tasks.iter() {
//!     // hand the block to a worker
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod envelope;
pub mod error;
pub mod geometry;
pub mod header;
pub mod manifest;
pub mod partition;
pub mod query;
pub mod schedule;
pub mod stitch;
pub mod store;
pub mod task;
pub mod types;
pub mod utils;

// Re-exports
pub use builder::{build_curtain, build_slice};
pub use config::{SchedulerConfig, StitchConfig};
pub use envelope::{pack_with_envelope, read_part, unpack_envelope};
pub use error::{CubeError, Result};
pub use geometry::{CubeShape, FragmentShape, Gvt};
pub use header::ProcessHeader;
pub use manifest::Manifest;
pub use partition::{partition, Partition, TaskSet};
pub use query::{CurtainQuery, Function, Request, SliceQuery};
pub use schedule::{mkschedule, QuerySpec, Scheduler};
pub use stitch::{StitchManifest, Stitcher};
pub use store::{FileSystemStorage, FragmentStore, ManifestStore, Storage};
pub use task::{CurtainTask, Single, SliceTask};
pub use types::{Axis, CubePoint, FragmentId, FragmentPoint};

/// Version of the fragcube implementation
pub const FRAGCUBE_VERSION: &str = env!("CARGO_PKG_VERSION");
