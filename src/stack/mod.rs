//! Request Context
//!
//! - [`StackInstance`]: per-request composition of plugin stacks
//! - [`StackHandle`]: the state plugin nodes share with their stack

pub mod handle;
pub mod instance;

pub use handle::StackHandle;
pub use instance::StackInstance;
