//! Stack Instance
//!
//! The per-request composition: one node chain per contract, the security
//! context they all run under and the replica exclusion set of the current
//! operation. A stack instance is owned by one thread at a time. It can be
//! moved to another thread but is never shared.

use super::handle::StackHandle;
use crate::domain::{Catalog, INode, IODriver, PoolDriver, PoolManager, UserGroupDb};
use crate::error::{ContractKind, Error, ErrorKind, Result};
use crate::registry::PluginManager;
use crate::resolution::placement::PlacementPolicy;
use crate::security::{resolve_identity, Credentials, SecurityContext};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct StackInstance {
    pub(crate) manager: Arc<PluginManager>,
    pub(crate) handle: StackHandle,
    pub(crate) security: Option<Arc<SecurityContext>>,
    pub(crate) user_group_db: Option<Box<dyn UserGroupDb>>,
    pub(crate) inode: Option<Box<dyn INode>>,
    pub(crate) catalog: Option<Box<dyn Catalog>>,
    pub(crate) pool_manager: Option<Box<dyn PoolManager>>,
    pub(crate) io_driver: Option<Box<dyn IODriver>>,
    /// Created on first use, one per pool type
    pub(crate) pool_drivers: HashMap<String, Box<dyn PoolDriver>>,
    pub(crate) placement: Arc<dyn PlacementPolicy>,
}

impl fmt::Debug for StackInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackInstance")
            .field("user", &self.security.as_ref().map(|s| s.user.name.clone()))
            .field("catalog", &self.catalog.as_ref().map(|c| c.impl_id()))
            .field("pool_manager", &self.pool_manager.as_ref().map(|p| p.impl_id()))
            .field("pool_drivers", &self.pool_drivers.keys().collect::<Vec<_>>())
            .field("excluded", &self.handle.excluded())
            .finish()
    }
}

/// Missing contracts leave an empty slot; anything else aborts
fn optional<T>(created: Result<T>) -> Result<Option<T>> {
    match created {
        Ok(node) => Ok(Some(node)),
        Err(e) if e.kind() == ErrorKind::NoFactory => Ok(None),
        Err(e) => Err(e),
    }
}

/// Implementation ids of a node chain, outermost first
macro_rules! chain_of {
    ($slot:expr) => {
        $slot.as_deref_mut().map(|node| {
            let mut names = vec![node.impl_id()];
            let mut next = node.decorated();
            while let Some(inner) = next {
                names.push(inner.impl_id());
                next = inner.decorated();
            }
            names
        })
    };
}

impl StackInstance {
    /// Instantiate every contract the manager has factories for
    pub fn new(manager: Arc<PluginManager>) -> Result<Self> {
        let handle = StackHandle::new();
        let mut stack = Self {
            user_group_db: optional(manager.create_user_group_db())?,
            inode: optional(manager.create_inode())?,
            catalog: optional(manager.create_catalog())?,
            pool_manager: optional(manager.create_pool_manager())?,
            io_driver: optional(manager.create_io_driver())?,
            pool_drivers: HashMap::new(),
            placement: manager.placement(),
            security: None,
            handle,
            manager,
        };

        let handle = stack.handle.clone();
        if let Some(db) = stack.user_group_db.as_deref_mut() {
            db.set_stack_instance(&handle)?;
        }
        if let Some(inode) = stack.inode.as_deref_mut() {
            inode.set_stack_instance(&handle)?;
        }
        if let Some(catalog) = stack.catalog.as_deref_mut() {
            catalog.set_stack_instance(&handle)?;
        }
        if let Some(pools) = stack.pool_manager.as_deref_mut() {
            pools.set_stack_instance(&handle)?;
        }
        if let Some(io) = stack.io_driver.as_deref_mut() {
            io.set_stack_instance(&handle)?;
        }

        debug!(?stack, "stack instance created");
        Ok(stack)
    }

    pub fn plugin_manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    /// Handle shared with the plugin nodes of this stack
    pub fn handle(&self) -> &StackHandle {
        &self.handle
    }

    // =========================================================================
    // Security
    // =========================================================================

    /// Resolve `credentials` through the user/group db and switch to the
    /// resulting identity
    pub fn set_security_credentials(&mut self, credentials: &Credentials) -> Result<()> {
        let db = self
            .user_group_db
            .as_deref_mut()
            .ok_or_else(|| Error::no_factory(ContractKind::UserGroupDb))?;
        let ctx = resolve_identity(db, credentials)?;
        self.set_security_context(ctx)
    }

    /// Replace the security context and push it through every chain
    /// Install `ctx` on every node. The stack keeps its previous context
    /// when a node refuses the new one.
    pub fn set_security_context(&mut self, ctx: SecurityContext) -> Result<()> {
        let ctx = Arc::new(ctx);
        if let Err(e) = self.propagate_security(&ctx) {
            warn!(user = %ctx.user.name, error = %e, "security context refused");
            if let Some(previous) = self.security.clone() {
                if let Err(restore) = self.propagate_security(&previous) {
                    warn!(error = %restore, "previous security context not restored");
                }
            }
            return Err(e);
        }
        self.security = Some(Arc::clone(&ctx));

        info!(user = %ctx.user.name, uid = ctx.uid(), gids = ?ctx.gids(), "security context set");
        Ok(())
    }

    fn propagate_security(&mut self, ctx: &Arc<SecurityContext>) -> Result<()> {
        if let Some(db) = self.user_group_db.as_deref_mut() {
            db.set_security_context(ctx)?;
        }
        if let Some(inode) = self.inode.as_deref_mut() {
            inode.set_security_context(ctx)?;
        }
        if let Some(catalog) = self.catalog.as_deref_mut() {
            catalog.set_security_context(ctx)?;
        }
        if let Some(pools) = self.pool_manager.as_deref_mut() {
            pools.set_security_context(ctx)?;
        }
        if let Some(io) = self.io_driver.as_deref_mut() {
            io.set_security_context(ctx)?;
        }
        for driver in self.pool_drivers.values_mut() {
            driver.set_security_context(ctx)?;
        }
        Ok(())
    }

    pub fn security_context(&self) -> Result<&SecurityContext> {
        self.security.as_deref().ok_or_else(Error::no_security_context)
    }

    // =========================================================================
    // Contract accessors
    // =========================================================================

    pub fn user_group_db(&mut self) -> Result<&mut dyn UserGroupDb> {
        match self.user_group_db.as_deref_mut() {
            Some(db) => Ok(db),
            None => Err(Error::no_factory(ContractKind::UserGroupDb)),
        }
    }

    pub fn inode(&mut self) -> Result<&mut dyn INode> {
        match self.inode.as_deref_mut() {
            Some(inode) => Ok(inode),
            None => Err(Error::no_factory(ContractKind::INode)),
        }
    }

    pub fn catalog(&mut self) -> Result<&mut dyn Catalog> {
        match self.catalog.as_deref_mut() {
            Some(catalog) => Ok(catalog),
            None => Err(Error::no_factory(ContractKind::Catalog)),
        }
    }

    pub fn pool_manager(&mut self) -> Result<&mut dyn PoolManager> {
        match self.pool_manager.as_deref_mut() {
            Some(pools) => Ok(pools),
            None => Err(Error::no_factory(ContractKind::PoolManager)),
        }
    }

    pub fn io_driver(&mut self) -> Result<&mut dyn IODriver> {
        match self.io_driver.as_deref_mut() {
            Some(io) => Ok(io),
            None => Err(Error::no_factory(ContractKind::IODriver)),
        }
    }

    /// Driver for a pool type, created and initialised on first use
    pub fn pool_driver(&mut self, pool_type: &str) -> Result<&mut dyn PoolDriver> {
        driver_for(
            &mut self.pool_drivers,
            &self.manager,
            &self.handle,
            self.security.as_ref(),
            pool_type,
        )
    }

    // =========================================================================
    // Operation scope
    // =========================================================================

    /// Start a new top-level operation. Forgets previous exclusions.
    pub fn begin_operation(&mut self) {
        self.handle.clear_exclusions();
    }

    /// Skip this replica for the rest of the current operation
    pub fn exclude_replica(&mut self, replica_id: i64) {
        if self.handle.exclude(replica_id) {
            debug!(replica_id, "replica excluded");
        }
    }

    pub fn is_excluded(&self, replica_id: i64) -> bool {
        self.handle.is_excluded(replica_id)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.handle.set(key, value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.handle.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handle.contains(key)
    }

    pub fn erase(&mut self, key: &str) -> Option<Value> {
        self.handle.erase(key)
    }

    /// Every instantiated chain with the implementation ids of its nodes
    pub fn chains(&mut self) -> Vec<(ContractKind, Vec<String>)> {
        let mut chains = Vec::new();
        if let Some(names) = chain_of!(self.user_group_db) {
            chains.push((ContractKind::UserGroupDb, names));
        }
        if let Some(names) = chain_of!(self.inode) {
            chains.push((ContractKind::INode, names));
        }
        if let Some(names) = chain_of!(self.catalog) {
            chains.push((ContractKind::Catalog, names));
        }
        if let Some(names) = chain_of!(self.pool_manager) {
            chains.push((ContractKind::PoolManager, names));
        }
        if let Some(names) = chain_of!(self.io_driver) {
            chains.push((ContractKind::IODriver, names));
        }
        chains
    }
}

fn driver_for<'a>(
    drivers: &'a mut HashMap<String, Box<dyn PoolDriver>>,
    manager: &PluginManager,
    handle: &StackHandle,
    security: Option<&Arc<SecurityContext>>,
    pool_type: &str,
) -> Result<&'a mut dyn PoolDriver> {
    if !drivers.contains_key(pool_type) {
        let mut driver = manager.create_pool_driver(pool_type)?;
        driver.set_stack_instance(handle)?;
        if let Some(ctx) = security {
            driver.set_security_context(ctx)?;
        }
        debug!(pool_type, driver = %driver.impl_id(), "pool driver created");
        drivers.insert(pool_type.to_string(), driver);
    }
    match drivers.get_mut(pool_type) {
        Some(driver) => Ok(driver.as_mut()),
        None => Err(Error::unknown_pool_type(pool_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forward_hook;
    use crate::plugins::testing::{disk_manager, memory_manager, stack_as};
    use crate::registry::{BaseFactory, CatalogFactory};
    use crate::security::validate_token;

    /// Catalog decorator that will not run as bob
    struct Gatekeeper {
        inner: Option<Box<dyn Catalog>>,
    }

    impl Catalog for Gatekeeper {
        fn impl_id(&self) -> String {
            "Gatekeeper".into()
        }

        fn decorated(&mut self) -> Option<&mut (dyn Catalog + 'static)> {
            self.inner.as_deref_mut()
        }

        fn set_security_context(&mut self, ctx: &Arc<SecurityContext>) -> Result<()> {
            if ctx.user.name == "bob" {
                return Err(Error::permission_denied("bob is not let in"));
            }
            forward_hook!(Catalog, self.set_security_context(ctx))
        }
    }

    struct GatekeeperFactory;

    impl BaseFactory for GatekeeperFactory {
        fn plugin_id(&self) -> &str {
            "gatekeeper"
        }

        fn configure(&self, key: &str, _value: &str) -> Result<()> {
            Err(Error::unknown_option(key))
        }
    }

    impl CatalogFactory for GatekeeperFactory {
        fn decorates(&self) -> bool {
            true
        }

        fn create_catalog(
            &self,
            _manager: &PluginManager,
            inner: Option<Box<dyn Catalog>>,
        ) -> Result<Box<dyn Catalog>> {
            Ok(Box::new(Gatekeeper { inner }))
        }
    }

    fn assert_send<T: Send>() {}

    fn kind<T>(result: Result<T>) -> Option<ErrorKind> {
        result.err().map(|e| e.kind())
    }

    #[test]
    fn test_moves_between_threads() {
        assert_send::<StackInstance>();

        let manager = Arc::new(memory_manager());
        let mut stack = stack_as(&manager, "alice");

        let mut stack = std::thread::spawn(move || {
            assert_eq!(stack.security_context().unwrap().uid(), 1001);
            assert!(stack.catalog().unwrap().stat("/").unwrap().is_dir());
            stack.exclude_replica(3);
            stack
        })
        .join()
        .unwrap();
        assert!(stack.is_excluded(3));
        stack.begin_operation();
        assert!(!stack.is_excluded(3));
    }

    #[test]
    fn test_switching_identity() {
        let manager = Arc::new(memory_manager());
        let mut stack = stack_as(&manager, "alice");
        assert_eq!(stack.security_context().unwrap().gids(), vec![200, 300]);

        stack
            .set_security_credentials(&Credentials::new("test", "bob"))
            .unwrap();
        let ctx = stack.security_context().unwrap();
        assert_eq!((ctx.uid(), ctx.gids()), (1002, vec![300]));

        stack
            .set_security_credentials(&Credentials::new("test", "alice"))
            .unwrap();
        assert_eq!(stack.security_context().unwrap().user.name, "alice");
    }

    #[test]
    fn test_identity_errors() {
        let manager = Arc::new(memory_manager());
        let mut stack = StackInstance::new(manager).unwrap();
        assert_eq!(kind(stack.security_context()), Some(ErrorKind::NoSecurityContext));
        assert_eq!(
            kind(stack.set_security_credentials(&Credentials::new("test", "mallory"))),
            Some(ErrorKind::NoSuchUser)
        );
        assert!(stack.security.is_none());

        let mut bare = StackInstance::new(Arc::new(PluginManager::new())).unwrap();
        assert_eq!(
            kind(bare.set_security_credentials(&Credentials::new("test", "alice"))),
            Some(ErrorKind::NoFactory)
        );
        assert_eq!(bare.catalog().unwrap().impl_id(), "BuiltInCatalog");
    }

    #[test]
    fn test_refused_identity_keeps_previous_context() {
        let mut manager = memory_manager();
        manager
            .register_catalog_factory(Arc::new(GatekeeperFactory))
            .unwrap();
        let manager = Arc::new(manager);

        let mut fresh = StackInstance::new(Arc::clone(&manager)).unwrap();
        assert_eq!(
            kind(fresh.set_security_credentials(&Credentials::new("test", "bob"))),
            Some(ErrorKind::PermissionDenied)
        );
        assert_eq!(kind(fresh.security_context()), Some(ErrorKind::NoSecurityContext));

        let mut stack = stack_as(&manager, "alice");
        assert_eq!(
            kind(stack.set_security_credentials(&Credentials::new("test", "bob"))),
            Some(ErrorKind::PermissionDenied)
        );
        let ctx = stack.security_context().unwrap();
        assert_eq!((ctx.user.name.as_str(), ctx.uid()), ("alice", 1001));
        assert!(stack.catalog().unwrap().stat("/").unwrap().is_dir());
    }

    #[test]
    fn test_cached_driver_follows_identity() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(disk_manager(&[("disk", dir.path(), 100)]));
        let mut stack = stack_as(&manager, "alice");
        let pool = stack.pool_manager().unwrap().get_pool("disk").unwrap();
        stack.pool_driver("filesystem").unwrap();

        stack
            .set_security_credentials(&Credentials::new("test", "bob"))
            .unwrap();
        let location = stack
            .pool_driver("filesystem")
            .unwrap()
            .put_location(&pool, "/f")
            .unwrap();
        let chunk = location.first().unwrap();
        let token = chunk.token().unwrap();
        assert!(validate_token(token, "bob", &chunk.path, "test-secret", true).is_valid());
        assert!(!validate_token(token, "alice", &chunk.path, "test-secret", true).is_valid());
        assert_eq!(stack.pool_drivers.len(), 1);
    }

    #[test]
    fn test_chains() {
        let mut manager = memory_manager();
        manager.load_plugin("librarian").unwrap();
        let mut stack = StackInstance::new(Arc::new(manager)).unwrap();

        let chains = stack.chains();
        let kinds: Vec<ContractKind> = chains.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                ContractKind::UserGroupDb,
                ContractKind::INode,
                ContractKind::Catalog,
                ContractKind::PoolManager
            ]
        );
        assert_eq!(chains[2].1, vec!["LibrarianCatalog", "BuiltInCatalog"]);
    }

    #[test]
    fn test_unknown_pool_type() {
        let manager = Arc::new(memory_manager());
        let mut stack = StackInstance::new(manager).unwrap();
        assert_eq!(kind(stack.pool_driver("tape")), Some(ErrorKind::UnknownPoolType));
        assert!(stack.pool_drivers.is_empty());
    }

    #[test]
    fn test_values_visible_to_plugins() {
        let mut stack = StackInstance::new(Arc::new(memory_manager())).unwrap();
        let seen_by_plugin = stack.handle().clone();

        stack.set("protocol", "http");
        assert!(seen_by_plugin.contains("protocol"));
        seen_by_plugin.set("retries", 2);
        assert_eq!(stack.get("retries"), Some(Value::from(2)));
        assert_eq!(stack.erase("protocol"), Some(Value::from("http")));
        assert!(!stack.contains("protocol"));
    }
}
