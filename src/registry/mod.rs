//! Plugin Registry
//!
//! - [`PluginManager`]: factories per contract kind, configuration routing
//!   and stack composition
//! - [`factory`]: the factory traits plugins implement
//! - [`config`]: YAML and line-format configuration files

pub mod config;
pub mod factory;
pub mod manager;

pub use config::{PluginConfig, StackConfig};
pub use factory::{
    BaseFactory, CatalogFactory, INodeFactory, IODriverFactory, PoolDriverFactory,
    PoolManagerFactory, UserGroupDbFactory,
};
pub use manager::{PluginLoader, PluginManager, WRITE_PLACEMENT};
