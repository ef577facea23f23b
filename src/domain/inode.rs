//! INode contract
//!
//! Identifier-addressed namespace operations. No permission checks happen at
//! this level; the catalog on top is responsible for them. The root entry is
//! the child named `/` of the pseudo-parent `0`.

use super::types::{ExtendedStat, Replica, Stat};
use super::{delegate, forward_hook};
use crate::error::Result;
use crate::security::{Acl, SecurityContext};
use crate::stack::StackHandle;
use std::sync::Arc;

/// Parent id under which the root entry is registered
pub const ROOT_PARENT: u64 = 0;

pub trait INode: Send {
    /// Implementation id, used in diagnostics
    fn impl_id(&self) -> String;

    /// The node this one wraps, if any
    fn decorated(&mut self) -> Option<&mut (dyn INode + 'static)> {
        None
    }

    fn set_security_context(&mut self, ctx: &Arc<SecurityContext>) -> Result<()> {
        forward_hook!(INode, self.set_security_context(ctx))
    }

    fn set_stack_instance(&mut self, stack: &StackHandle) -> Result<()> {
        forward_hook!(INode, self.set_stack_instance(stack))
    }

    /// Create a new entry from `entry.parent`, `entry.name`, owner, mode and
    /// ACL. The backend assigns the inode number and timestamps.
    fn create(&mut self, entry: &ExtendedStat) -> Result<ExtendedStat> {
        delegate!(INode, self.create(entry))
    }

    fn extended_stat(&mut self, ino: u64) -> Result<ExtendedStat> {
        delegate!(INode, self.extended_stat(ino))
    }

    fn extended_stat_child(&mut self, parent: u64, name: &str) -> Result<ExtendedStat> {
        delegate!(INode, self.extended_stat_child(parent, name))
    }

    fn stat(&mut self, ino: u64) -> Result<Stat> {
        Ok(self.extended_stat(ino)?.stat)
    }

    fn stat_child(&mut self, parent: u64, name: &str) -> Result<Stat> {
        Ok(self.extended_stat_child(parent, name)?.stat)
    }

    /// Remove an entry together with its replicas. Directories must be empty.
    fn unlink(&mut self, ino: u64) -> Result<()> {
        delegate!(INode, self.unlink(ino))
    }

    fn read_dir(&mut self, ino: u64) -> Result<Vec<ExtendedStat>> {
        delegate!(INode, self.read_dir(ino))
    }

    fn get_replicas(&mut self, ino: u64) -> Result<Vec<Replica>> {
        delegate!(INode, self.get_replicas(ino))
    }

    fn get_replica(&mut self, replica_id: i64) -> Result<Replica> {
        delegate!(INode, self.get_replica(replica_id))
    }

    /// Register a replica. A zero `replica_id` asks the backend to assign one.
    fn add_replica(&mut self, replica: &Replica) -> Result<()> {
        delegate!(INode, self.add_replica(replica))
    }

    fn delete_replica(&mut self, replica: &Replica) -> Result<()> {
        delegate!(INode, self.delete_replica(replica))
    }

    fn update_replica(&mut self, replica: &Replica) -> Result<()> {
        delegate!(INode, self.update_replica(replica))
    }

    /// Set owner, permission bits and ACL in one go. File type bits are kept.
    fn set_mode(&mut self, ino: u64, uid: u32, gid: u32, mode: u32, acl: &Acl) -> Result<()> {
        delegate!(INode, self.set_mode(ino, uid, gid, mode, acl))
    }

    fn set_size(&mut self, ino: u64, size: u64) -> Result<()> {
        delegate!(INode, self.set_size(ino, size))
    }
}
