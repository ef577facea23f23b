//! Plugin Manager
//!
//! Holds the registered factories per contract kind, routes configuration
//! to them and composes the per-request stacks.
//!
//! Composition: for each contract the last registered terminal factory
//! creates the innermost node, and every decorating factory registered
//! after it wraps the stack built so far. The last registered decorator is
//! therefore the outermost node.

use super::factory::{
    BaseFactory, CatalogFactory, INodeFactory, IODriverFactory, PoolDriverFactory,
    PoolManagerFactory, UserGroupDbFactory,
};
use crate::domain::{Catalog, INode, IODriver, PoolDriver, PoolManager, UserGroupDb};
use crate::error::{ContractKind, Error, ErrorCategory, ErrorKind, Result};
use crate::plugins::{self, builtin::BuiltInCatalogFactory};
use crate::resolution::placement::{PlacementPolicy, WritePlacement};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Option handled by the manager itself
pub const WRITE_PLACEMENT: &str = "WritePlacement";

/// Registers the factories of one plugin
pub type PluginLoader = fn(&mut PluginManager) -> Result<()>;

pub struct PluginManager {
    factories: Vec<Arc<dyn BaseFactory>>,
    user_group_dbs: Vec<Arc<dyn UserGroupDbFactory>>,
    inodes: Vec<Arc<dyn INodeFactory>>,
    catalogs: Vec<Arc<dyn CatalogFactory>>,
    pool_managers: Vec<Arc<dyn PoolManagerFactory>>,
    io_drivers: Vec<Arc<dyn IODriverFactory>>,
    pool_drivers: Vec<Arc<dyn PoolDriverFactory>>,
    options: BTreeMap<String, String>,
    placement: Arc<dyn PlacementPolicy>,
    catalogue: BTreeMap<String, PluginLoader>,
    loaded: Vec<String>,
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("loaded", &self.loaded)
            .field("factories", &self.factories.len())
            .field("options", &self.options)
            .field("placement", &self.placement.name())
            .finish()
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginManager {
    /// Empty manager with the bundled plugin catalogue and the built-in
    /// catalog already registered
    pub fn new() -> Self {
        let builtin = Arc::new(BuiltInCatalogFactory::new());
        Self {
            factories: vec![builtin.clone()],
            user_group_dbs: Vec::new(),
            inodes: Vec::new(),
            catalogs: vec![builtin],
            pool_managers: Vec::new(),
            io_drivers: Vec::new(),
            pool_drivers: Vec::new(),
            options: BTreeMap::new(),
            placement: WritePlacement::default().policy(),
            catalogue: plugins::catalogue(),
            loaded: Vec::new(),
        }
    }

    // =========================================================================
    // Plugin catalogue
    // =========================================================================

    /// Make a plugin loadable by id, replacing any previous entry
    pub fn register_plugin(&mut self, plugin_id: impl Into<String>, loader: PluginLoader) {
        self.catalogue.insert(plugin_id.into(), loader);
    }

    pub fn available_plugins(&self) -> Vec<&str> {
        self.catalogue.keys().map(String::as_str).collect()
    }

    pub fn load_plugin(&mut self, plugin_id: &str) -> Result<()> {
        let loader = *self
            .catalogue
            .get(plugin_id)
            .ok_or_else(|| Error::unknown_plugin(plugin_id))?;
        loader(self).map_err(|e| e.with_context(format!("loading plugin {}", plugin_id)))?;
        self.loaded.push(plugin_id.to_string());
        info!(plugin = plugin_id, "plugin loaded");
        Ok(())
    }

    /// Plugins loaded so far, in load order
    pub fn loaded_plugins(&self) -> &[String] {
        &self.loaded
    }

    // =========================================================================
    // Registration
    // =========================================================================

    fn remember(&mut self, factory: Arc<dyn BaseFactory>) {
        if !self.factories.iter().any(|known| same_factory(known, &factory)) {
            self.factories.push(factory);
        }
    }

    pub fn register_user_group_db_factory<F>(&mut self, factory: Arc<F>) -> Result<()>
    where
        F: UserGroupDbFactory + 'static,
    {
        check_first(
            ContractKind::UserGroupDb,
            factory.as_ref(),
            factory.decorates(),
            self.user_group_dbs.len(),
        )?;
        self.remember(factory.clone());
        registered(ContractKind::UserGroupDb, factory.as_ref(), factory.decorates());
        self.user_group_dbs.push(factory);
        Ok(())
    }

    pub fn register_inode_factory<F>(&mut self, factory: Arc<F>) -> Result<()>
    where
        F: INodeFactory + 'static,
    {
        check_first(
            ContractKind::INode,
            factory.as_ref(),
            factory.decorates(),
            self.inodes.len(),
        )?;
        self.remember(factory.clone());
        registered(ContractKind::INode, factory.as_ref(), factory.decorates());
        self.inodes.push(factory);
        Ok(())
    }

    pub fn register_catalog_factory<F>(&mut self, factory: Arc<F>) -> Result<()>
    where
        F: CatalogFactory + 'static,
    {
        check_first(
            ContractKind::Catalog,
            factory.as_ref(),
            factory.decorates(),
            self.catalogs.len(),
        )?;
        self.remember(factory.clone());
        registered(ContractKind::Catalog, factory.as_ref(), factory.decorates());
        self.catalogs.push(factory);
        Ok(())
    }

    pub fn register_pool_manager_factory<F>(&mut self, factory: Arc<F>) -> Result<()>
    where
        F: PoolManagerFactory + 'static,
    {
        check_first(
            ContractKind::PoolManager,
            factory.as_ref(),
            factory.decorates(),
            self.pool_managers.len(),
        )?;
        self.remember(factory.clone());
        registered(ContractKind::PoolManager, factory.as_ref(), factory.decorates());
        self.pool_managers.push(factory);
        Ok(())
    }

    pub fn register_io_factory<F>(&mut self, factory: Arc<F>) -> Result<()>
    where
        F: IODriverFactory + 'static,
    {
        check_first(
            ContractKind::IODriver,
            factory.as_ref(),
            factory.decorates(),
            self.io_drivers.len(),
        )?;
        self.remember(factory.clone());
        registered(ContractKind::IODriver, factory.as_ref(), factory.decorates());
        self.io_drivers.push(factory);
        Ok(())
    }

    pub fn register_pool_driver_factory<F>(&mut self, factory: Arc<F>) -> Result<()>
    where
        F: PoolDriverFactory + 'static,
    {
        self.remember(factory.clone());
        debug!(
            plugin = factory.plugin_id(),
            pool_type = factory.pool_type(),
            "registered PoolDriver factory"
        );
        self.pool_drivers.push(factory);
        Ok(())
    }

    pub fn has_factory(&self, kind: ContractKind) -> bool {
        match kind {
            ContractKind::UserGroupDb => !self.user_group_dbs.is_empty(),
            ContractKind::INode => !self.inodes.is_empty(),
            ContractKind::Catalog => !self.catalogs.is_empty(),
            ContractKind::PoolManager => !self.pool_managers.is_empty(),
            ContractKind::PoolDriver => !self.pool_drivers.is_empty(),
            ContractKind::IODriver => !self.io_drivers.is_empty(),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Offer an option to every factory in registration order. Fails with
    /// `UnknownOption` only when no factory claims the key.
    pub fn configure(&mut self, key: &str, value: &str) -> Result<()> {
        if key == WRITE_PLACEMENT {
            self.placement = value.parse::<WritePlacement>()?.policy();
            debug!(placement = self.placement.name(), "write placement selected");
            self.options.insert(key.to_string(), value.to_string());
            return Ok(());
        }

        let targets = self.factories.clone();
        if !offer(&targets, key, value)? {
            return Err(Error::unknown_option(key));
        }
        self.options.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Send an option to the factories of one plugin. An unclaimed key is
    /// an error here, since it was addressed to a specific plugin.
    pub fn configure_plugin(&mut self, plugin_id: &str, key: &str, value: &str) -> Result<()> {
        let targets: Vec<_> = self
            .factories
            .iter()
            .filter(|f| f.plugin_id() == plugin_id)
            .cloned()
            .collect();
        if targets.is_empty() {
            return Err(Error::unknown_plugin(plugin_id));
        }
        if !offer(&targets, key, value)? {
            return Err(Error::unknown_option(key).with_context(format!("plugin {}", plugin_id)));
        }
        self.options.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Last value accepted for `key`
    pub fn get_configuration(&self, key: &str) -> Result<String> {
        self.options
            .get(key)
            .cloned()
            .ok_or_else(|| Error::unknown_option(key))
    }

    pub fn placement(&self) -> Arc<dyn PlacementPolicy> {
        Arc::clone(&self.placement)
    }

    // =========================================================================
    // Stack construction
    // =========================================================================

    pub fn create_user_group_db(&self) -> Result<Box<dyn UserGroupDb>> {
        compose(
            &self.user_group_dbs,
            ContractKind::UserGroupDb,
            |f| f.decorates(),
            |f, inner| f.create_user_group_db(self, inner),
        )
    }

    pub fn create_inode(&self) -> Result<Box<dyn INode>> {
        compose(
            &self.inodes,
            ContractKind::INode,
            |f| f.decorates(),
            |f, inner| f.create_inode(self, inner),
        )
    }

    pub fn create_catalog(&self) -> Result<Box<dyn Catalog>> {
        compose(
            &self.catalogs,
            ContractKind::Catalog,
            |f| f.decorates(),
            |f, inner| f.create_catalog(self, inner),
        )
    }

    pub fn create_pool_manager(&self) -> Result<Box<dyn PoolManager>> {
        compose(
            &self.pool_managers,
            ContractKind::PoolManager,
            |f| f.decorates(),
            |f, inner| f.create_pool_manager(self, inner),
        )
    }

    pub fn create_io_driver(&self) -> Result<Box<dyn IODriver>> {
        compose(
            &self.io_drivers,
            ContractKind::IODriver,
            |f| f.decorates(),
            |f, inner| f.create_io_driver(self, inner),
        )
    }

    /// Driver for a pool type. The most recently registered factory wins.
    pub fn create_pool_driver(&self, pool_type: &str) -> Result<Box<dyn PoolDriver>> {
        self.pool_drivers
            .iter()
            .rev()
            .find(|f| f.pool_type() == pool_type)
            .ok_or_else(|| Error::unknown_pool_type(pool_type))?
            .create_pool_driver(self)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn same_factory(a: &Arc<dyn BaseFactory>, b: &Arc<dyn BaseFactory>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn check_first(
    kind: ContractKind,
    factory: &dyn BaseFactory,
    decorates: bool,
    existing: usize,
) -> Result<()> {
    if decorates && existing == 0 {
        return Err(Error::new(
            ErrorCategory::Configuration,
            kind.missing_code(),
            format!(
                "plugin {} decorates {} and cannot be loaded first",
                factory.plugin_id(),
                kind
            ),
        ));
    }
    Ok(())
}

fn registered(kind: ContractKind, factory: &dyn BaseFactory, decorates: bool) {
    debug!(
        plugin = factory.plugin_id(),
        contract = %kind,
        decorates,
        "registered factory"
    );
}

/// Returns whether at least one factory claimed the key
fn offer(targets: &[Arc<dyn BaseFactory>], key: &str, value: &str) -> Result<bool> {
    let mut claimed = false;
    for factory in targets {
        match factory.configure(key, value) {
            Ok(()) => {
                debug!(plugin = factory.plugin_id(), key, "option accepted");
                claimed = true;
            }
            Err(e) if e.kind() == ErrorKind::UnknownOption => {}
            Err(e) => return Err(e.with_context(format!("plugin {}", factory.plugin_id()))),
        }
    }
    Ok(claimed)
}

fn compose<F: ?Sized, T: ?Sized>(
    factories: &[Arc<F>],
    kind: ContractKind,
    decorates: impl Fn(&F) -> bool,
    mut create: impl FnMut(&F, Option<Box<T>>) -> Result<Box<T>>,
) -> Result<Box<T>> {
    let base = factories
        .iter()
        .rposition(|f| !decorates(f))
        .ok_or_else(|| Error::no_factory(kind))?;

    let mut node = create(&factories[base], None)?;
    for wrapper in &factories[base + 1..] {
        node = create(wrapper, Some(node))?;
    }
    Ok(node)
}
