//! Librarian Plugin
//!
//! Catalog decorator that hides the replicas excluded during the current
//! operation, so every layer above it (and the resolution engine) only sees
//! replicas that are still worth trying.

use crate::domain::{delegate, forward_hook, Catalog, Replica};
use crate::error::{Error, Result};
use crate::registry::{BaseFactory, CatalogFactory, PluginManager};
use crate::stack::StackHandle;
use std::sync::Arc;
use tracing::trace;

pub const PLUGIN_ID: &str = "librarian";

#[derive(Debug, Default)]
pub struct LibrarianFactory;

impl BaseFactory for LibrarianFactory {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn configure(&self, key: &str, _value: &str) -> Result<()> {
        Err(Error::unknown_option(key))
    }
}

impl CatalogFactory for LibrarianFactory {
    fn decorates(&self) -> bool {
        true
    }

    fn create_catalog(
        &self,
        _manager: &PluginManager,
        inner: Option<Box<dyn Catalog>>,
    ) -> Result<Box<dyn Catalog>> {
        Ok(Box::new(LibrarianCatalog {
            inner,
            handle: None,
        }))
    }
}

pub fn register(manager: &mut PluginManager) -> Result<()> {
    manager.register_catalog_factory(Arc::new(LibrarianFactory))
}

pub struct LibrarianCatalog {
    inner: Option<Box<dyn Catalog>>,
    handle: Option<StackHandle>,
}

impl Catalog for LibrarianCatalog {
    fn impl_id(&self) -> String {
        "LibrarianCatalog".into()
    }

    fn decorated(&mut self) -> Option<&mut (dyn Catalog + 'static)> {
        self.inner.as_deref_mut()
    }

    fn set_stack_instance(&mut self, stack: &StackHandle) -> Result<()> {
        self.handle = Some(stack.clone());
        forward_hook!(Catalog, self.set_stack_instance(stack))
    }

    fn get_replicas(&mut self, path: &str) -> Result<Vec<Replica>> {
        let replicas = delegate!(Catalog, self.get_replicas(path))?;
        let Some(handle) = &self.handle else {
            return Ok(replicas);
        };
        if !handle.has_exclusions() {
            return Ok(replicas);
        }
        let total = replicas.len();
        let kept: Vec<Replica> = replicas
            .into_iter()
            .filter(|r| !handle.is_excluded(r.replica_id))
            .collect();
        trace!(path, total, kept = kept.len(), "excluded replicas hidden");
        Ok(kept)
    }
}
