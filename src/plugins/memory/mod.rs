//! Memory Plugin
//!
//! A complete, volatile backend in one factory: the namespace (INode), the
//! user and group database and the pool table. State is shared by every
//! stack created from the same plugin manager.
//!
//! Options:
//! - `MemoryUser name:uid[:group,...]`
//! - `MemoryGroup name:gid`
//! - `MemoryPool name:type`
//! - `MemoryFilesystem pool:server:path[:weight[:free[:status]]]`

pub mod accounts;
pub mod namespace;
pub mod pools;

pub use accounts::{Accounts, MemoryUserGroupDb};
pub use namespace::{MemoryINode, Namespace, ROOT_INO};
pub use pools::{MemoryPoolManager, PoolTable};

use crate::domain::{INode, PoolManager, UserGroupDb};
use crate::error::{Error, Result};
use crate::registry::{
    BaseFactory, INodeFactory, PluginManager, PoolManagerFactory, UserGroupDbFactory,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

pub const PLUGIN_ID: &str = "memory";

pub const OPT_USER: &str = "MemoryUser";
pub const OPT_GROUP: &str = "MemoryGroup";
pub const OPT_POOL: &str = "MemoryPool";
pub const OPT_FILESYSTEM: &str = "MemoryFilesystem";

#[derive(Debug, Default)]
pub struct MemoryFactory {
    namespace: Arc<RwLock<Namespace>>,
    accounts: Arc<Accounts>,
    pools: Arc<PoolTable>,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_filesystem(&self, value: &str) -> Result<()> {
        let (pool_name, filesystem) = pools::parse_filesystem(value)?;
        let mut table = self.pools.write();
        let pool = table
            .get_mut(&pool_name)
            .ok_or_else(|| Error::no_such_pool(&pool_name))?;

        let mut filesystems = pool.filesystems()?;
        filesystems.retain(|fs| !(fs.server == filesystem.server && fs.path == filesystem.path));
        filesystems.push(filesystem);
        pool.set_filesystems(&filesystems)
    }
}

impl BaseFactory for MemoryFactory {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn configure(&self, key: &str, value: &str) -> Result<()> {
        match key {
            OPT_USER => {
                let (user, groups) = Accounts::parse_user(value)?;
                debug!(user = %user.name, uid = user.uid, ?groups, "memory user added");
                self.accounts.add_user(user, groups);
            }
            OPT_GROUP => {
                self.accounts.add_group(Accounts::parse_group(value)?);
            }
            OPT_POOL => {
                let pool = pools::parse_pool(value)?;
                debug!(pool = %pool.name, pool_type = %pool.pool_type, "memory pool added");
                self.pools.write().insert(pool.name.clone(), pool);
            }
            OPT_FILESYSTEM => self.add_filesystem(value)?,
            _ => return Err(Error::unknown_option(key)),
        }
        Ok(())
    }
}

impl UserGroupDbFactory for MemoryFactory {
    fn create_user_group_db(
        &self,
        _manager: &PluginManager,
        _inner: Option<Box<dyn UserGroupDb>>,
    ) -> Result<Box<dyn UserGroupDb>> {
        Ok(Box::new(MemoryUserGroupDb::new(Arc::clone(&self.accounts))))
    }
}

impl INodeFactory for MemoryFactory {
    fn create_inode(
        &self,
        _manager: &PluginManager,
        _inner: Option<Box<dyn INode>>,
    ) -> Result<Box<dyn INode>> {
        Ok(Box::new(MemoryINode::new(Arc::clone(&self.namespace))))
    }
}

impl PoolManagerFactory for MemoryFactory {
    fn create_pool_manager(
        &self,
        _manager: &PluginManager,
        _inner: Option<Box<dyn PoolManager>>,
    ) -> Result<Box<dyn PoolManager>> {
        Ok(Box::new(MemoryPoolManager::new(Arc::clone(&self.pools))))
    }
}

/// Register the memory factory under all three of its contracts
pub fn register(manager: &mut PluginManager) -> Result<()> {
    let factory = Arc::new(MemoryFactory::new());
    manager.register_user_group_db_factory(Arc::clone(&factory))?;
    manager.register_inode_factory(Arc::clone(&factory))?;
    manager.register_pool_manager_factory(factory)
}
