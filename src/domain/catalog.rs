//! Catalog contract
//!
//! The path-addressed view of the namespace. Relative paths resolve against
//! the working directory of the catalog instance.

use super::types::{ExtendedStat, Replica, Stat};
use super::{delegate, forward_hook};
use crate::error::Result;
use crate::security::{Acl, SecurityContext};
use crate::stack::StackHandle;
use std::sync::Arc;

pub trait Catalog: Send {
    /// Implementation id, used in diagnostics
    fn impl_id(&self) -> String;

    /// The node this one wraps, if any
    fn decorated(&mut self) -> Option<&mut (dyn Catalog + 'static)> {
        None
    }

    fn set_security_context(&mut self, ctx: &Arc<SecurityContext>) -> Result<()> {
        forward_hook!(Catalog, self.set_security_context(ctx))
    }

    fn set_stack_instance(&mut self, stack: &StackHandle) -> Result<()> {
        forward_hook!(Catalog, self.set_stack_instance(stack))
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    fn change_dir(&mut self, path: &str) -> Result<()> {
        delegate!(Catalog, self.change_dir(path))
    }

    fn working_dir(&mut self) -> Result<String> {
        delegate!(Catalog, self.working_dir())
    }

    /// Set the creation mask, returning the previous one
    fn umask(&mut self, mask: u32) -> Result<u32> {
        delegate!(Catalog, self.umask(mask))
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    fn extended_stat(&mut self, path: &str) -> Result<ExtendedStat> {
        delegate!(Catalog, self.extended_stat(path))
    }

    /// Plain status record, derived from [`Catalog::extended_stat`]
    fn stat(&mut self, path: &str) -> Result<Stat> {
        Ok(self.extended_stat(path)?.stat)
    }

    /// Whether the caller may access `path` with `mode` (`R_OK | W_OK | X_OK`)
    fn access(&mut self, path: &str, mode: u32) -> Result<bool> {
        delegate!(Catalog, self.access(path, mode))
    }

    fn set_mode(&mut self, path: &str, mode: u32) -> Result<()> {
        delegate!(Catalog, self.set_mode(path, mode))
    }

    fn set_owner(&mut self, path: &str, uid: u32, gid: u32) -> Result<()> {
        delegate!(Catalog, self.set_owner(path, uid, gid))
    }

    fn set_size(&mut self, path: &str, size: u64) -> Result<()> {
        delegate!(Catalog, self.set_size(path, size))
    }

    fn set_acl(&mut self, path: &str, acl: &Acl) -> Result<()> {
        delegate!(Catalog, self.set_acl(path, acl))
    }

    // =========================================================================
    // Replicas
    // =========================================================================

    fn get_replicas(&mut self, path: &str) -> Result<Vec<Replica>> {
        delegate!(Catalog, self.get_replicas(path))
    }

    fn add_replica(&mut self, replica: &Replica) -> Result<()> {
        delegate!(Catalog, self.add_replica(replica))
    }

    fn delete_replica(&mut self, replica: &Replica) -> Result<()> {
        delegate!(Catalog, self.delete_replica(replica))
    }

    fn update_replica(&mut self, replica: &Replica) -> Result<()> {
        delegate!(Catalog, self.update_replica(replica))
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// Create a regular file
    fn create(&mut self, path: &str, mode: u32) -> Result<()> {
        delegate!(Catalog, self.create(path, mode))
    }

    fn make_dir(&mut self, path: &str, mode: u32) -> Result<()> {
        delegate!(Catalog, self.make_dir(path, mode))
    }

    fn unlink(&mut self, path: &str) -> Result<()> {
        delegate!(Catalog, self.unlink(path))
    }

    fn remove_dir(&mut self, path: &str) -> Result<()> {
        delegate!(Catalog, self.remove_dir(path))
    }

    /// Entries of a directory, sorted by name
    fn read_dir(&mut self, path: &str) -> Result<Vec<ExtendedStat>> {
        delegate!(Catalog, self.read_dir(path))
    }
}

/// Names of every node in a catalog chain, outermost first
pub fn catalog_chain(catalog: &mut dyn Catalog) -> Vec<String> {
    let mut chain = vec![catalog.impl_id()];
    let mut node = catalog.decorated();
    while let Some(inner) = node {
        chain.push(inner.impl_id());
        node = inner.decorated();
    }
    chain
}
