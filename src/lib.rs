//! Gridstack - Pluggable Storage Virtualization Stack
//!
//! A logical namespace (the Catalog) and a mapping from logical files to
//! physical replicas held on heterogeneous storage pools, composed at
//! runtime from plugins and scoped to the identity of each request.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         Stack Instance                               │
//! │        security context · exclusion set · key/value board            │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────────┐  │
//! │  │   Catalog    │  │ PoolManager  │  │  PoolDriver (per type)     │  │
//! │  │  (decorated) │  │ (decorated)  │  │  IODriver                  │  │
//! │  └──────┬───────┘  └──────┬───────┘  └─────────────┬──────────────┘  │
//! │         │                 │                        │                 │
//! │  ┌──────┴───────┐  ┌──────┴───────────────────────┴──────────────┐  │
//! │  │    INode     │  │        Location Resolution                   │  │
//! │  │ UserGroupDb  │  │   where_to_read · where_to_write · retries   │  │
//! │  └──────────────┘  └──────────────────────────────────────────────┘  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                       Plugin Manager                                 │
//! │     factories per contract · options routing · stack composition     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`domain`]: records and the plugin contracts
//! - [`error`]: error codes and kinds
//! - [`plugins`]: builtin catalog and the bundled plugins
//! - [`registry`]: plugin manager, factories and configuration files
//! - [`resolution`]: replica and location resolution, placement
//! - [`security`]: credentials, identities, ACLs and access tokens
//! - [`stack`]: the per-request stack instance

pub mod domain;
pub mod error;
pub mod plugins;
pub mod registry;
pub mod resolution;
pub mod security;
pub mod stack;

// Re-export commonly used types
pub use domain::{
    Catalog, Chunk, ExtendedStat, Extensible, Filesystem, FilesystemStatus, INode, IODriver,
    IOHandler, Location, OpenFlags, Pool, PoolAvailability, PoolDriver, PoolManager, Replica,
    ReplicaStatus, Stat, UserGroupDb, Whence,
};

pub use error::{ContractKind, Error, ErrorCategory, ErrorKind, Result};

pub use registry::{PluginManager, StackConfig};

pub use resolution::{PlacementPolicy, WritePlacement};

pub use security::{
    check_permissions, generate_token, validate_token, Access, Acl, Credentials, GroupInfo,
    SecurityContext, TokenStatus, UserInfo,
};

pub use stack::{StackHandle, StackInstance};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
