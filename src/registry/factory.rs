//! Plugin Factories
//!
//! A factory is the registered face of a plugin. It receives configuration
//! and creates one contract node per stack. A single factory type may
//! implement several of these traits and be registered under each of them.

use super::PluginManager;
use crate::domain::{Catalog, INode, IODriver, PoolDriver, PoolManager, UserGroupDb};
use crate::error::Result;

/// Common to every factory
pub trait BaseFactory: Send + Sync {
    /// Id of the plugin that registered this factory
    fn plugin_id(&self) -> &str;

    /// Apply one option. Keys the factory does not know must fail with
    /// `UnknownOption` so the registry can tell claimed keys apart.
    fn configure(&self, key: &str, value: &str) -> Result<()>;
}

pub trait UserGroupDbFactory: BaseFactory {
    /// Whether the created node wraps the previously registered stack
    fn decorates(&self) -> bool {
        false
    }

    fn create_user_group_db(
        &self,
        manager: &PluginManager,
        inner: Option<Box<dyn UserGroupDb>>,
    ) -> Result<Box<dyn UserGroupDb>>;
}

pub trait INodeFactory: BaseFactory {
    fn decorates(&self) -> bool {
        false
    }

    fn create_inode(
        &self,
        manager: &PluginManager,
        inner: Option<Box<dyn INode>>,
    ) -> Result<Box<dyn INode>>;
}

pub trait CatalogFactory: BaseFactory {
    fn decorates(&self) -> bool {
        false
    }

    fn create_catalog(
        &self,
        manager: &PluginManager,
        inner: Option<Box<dyn Catalog>>,
    ) -> Result<Box<dyn Catalog>>;
}

pub trait PoolManagerFactory: BaseFactory {
    fn decorates(&self) -> bool {
        false
    }

    fn create_pool_manager(
        &self,
        manager: &PluginManager,
        inner: Option<Box<dyn PoolManager>>,
    ) -> Result<Box<dyn PoolManager>>;
}

pub trait IODriverFactory: BaseFactory {
    fn decorates(&self) -> bool {
        false
    }

    fn create_io_driver(
        &self,
        manager: &PluginManager,
        inner: Option<Box<dyn IODriver>>,
    ) -> Result<Box<dyn IODriver>>;
}

/// Pool drivers are looked up by pool type rather than stacked
pub trait PoolDriverFactory: BaseFactory {
    fn pool_type(&self) -> &str;

    fn create_pool_driver(&self, manager: &PluginManager) -> Result<Box<dyn PoolDriver>>;
}
