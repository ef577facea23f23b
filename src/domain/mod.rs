//! Domain layer - records and plugin contracts
//!
//! Every contract is an object-safe trait. A plugin implements the
//! operations it cares about; everything else falls through to the node it
//! decorates (see [`Catalog::decorated`] and friends) or fails with
//! `NotImplemented` when it terminates the chain.
//!
//! Lifecycle hooks (`set_security_context`, `set_stack_instance`) travel
//! down the whole chain. A node overriding a hook must forward it itself.

/// Forward a data operation to the decorated node of `$contract`
macro_rules! delegate {
    ($contract:ident, $self:ident.$method:ident($($arg:expr),*)) => {
        match <Self as $contract>::decorated($self) {
            Some(inner) => inner.$method($($arg),*),
            None => Err($crate::error::Error::not_implemented(concat!(
                stringify!($contract),
                "::",
                stringify!($method)
            ))),
        }
    };
}
pub(crate) use delegate;

/// Forward a lifecycle hook. The end of a chain accepts it silently.
macro_rules! forward_hook {
    ($contract:ident, $self:ident.$method:ident($arg:expr)) => {
        match <Self as $contract>::decorated($self) {
            Some(inner) => inner.$method($arg),
            None => Ok(()),
        }
    };
}
pub(crate) use forward_hook;

pub mod authn;
pub mod catalog;
pub mod extensible;
pub mod inode;
pub mod io;
pub mod path;
pub mod pool;
pub mod types;

pub use authn::UserGroupDb;
pub use catalog::Catalog;
pub use extensible::Extensible;
pub use inode::INode;
pub use io::{IODriver, IOHandler, OpenFlags, Whence};
pub use pool::{PoolDriver, PoolManager};
pub use types::*;
