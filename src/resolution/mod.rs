//! Location Resolution
//!
//! - [`engine`]: read/write resolution, retries and write completion,
//!   implemented on [`StackInstance`](crate::stack::StackInstance)
//! - [`placement`]: pool ranking and filesystem choice

pub mod engine;
pub mod placement;

pub use placement::{choose_filesystem, FreeSpace, PlacementPolicy, RoundRobin, WritePlacement};
