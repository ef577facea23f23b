//! Pool contracts
//!
//! [`PoolManager`] owns the pool table. [`PoolDriver`] knows one pool
//! technology: it accounts for space and turns replicas and logical paths
//! into physical [`Location`]s.

use super::types::{Location, Pool, PoolAvailability, Replica};
use super::{delegate, forward_hook};
use crate::error::Result;
use crate::security::SecurityContext;
use crate::stack::StackHandle;
use std::sync::Arc;

// =============================================================================
// Pool manager
// =============================================================================

pub trait PoolManager: Send {
    /// Implementation id, used in diagnostics
    fn impl_id(&self) -> String;

    /// The node this one wraps, if any
    fn decorated(&mut self) -> Option<&mut (dyn PoolManager + 'static)> {
        None
    }

    fn set_security_context(&mut self, ctx: &Arc<SecurityContext>) -> Result<()> {
        forward_hook!(PoolManager, self.set_security_context(ctx))
    }

    fn set_stack_instance(&mut self, stack: &StackHandle) -> Result<()> {
        forward_hook!(PoolManager, self.set_stack_instance(stack))
    }

    fn get_pools(&mut self, availability: PoolAvailability) -> Result<Vec<Pool>> {
        delegate!(PoolManager, self.get_pools(availability))
    }

    fn get_pool(&mut self, name: &str) -> Result<Pool> {
        delegate!(PoolManager, self.get_pool(name))
    }

    fn new_pool(&mut self, pool: &Pool) -> Result<()> {
        delegate!(PoolManager, self.new_pool(pool))
    }

    fn update_pool(&mut self, pool: &Pool) -> Result<()> {
        delegate!(PoolManager, self.update_pool(pool))
    }

    fn delete_pool(&mut self, pool: &Pool) -> Result<()> {
        delegate!(PoolManager, self.delete_pool(pool))
    }
}

// =============================================================================
// Pool driver
// =============================================================================

pub trait PoolDriver: Send {
    /// Implementation id, used in diagnostics
    fn impl_id(&self) -> String;

    /// Pool type tag this driver owns
    fn pool_type(&self) -> String;

    /// The node this one wraps, if any
    fn decorated(&mut self) -> Option<&mut (dyn PoolDriver + 'static)> {
        None
    }

    fn set_security_context(&mut self, ctx: &Arc<SecurityContext>) -> Result<()> {
        forward_hook!(PoolDriver, self.set_security_context(ctx))
    }

    fn set_stack_instance(&mut self, stack: &StackHandle) -> Result<()> {
        forward_hook!(PoolDriver, self.set_stack_instance(stack))
    }

    fn is_available(&mut self, pool: &Pool, for_write: bool) -> Result<bool> {
        delegate!(PoolDriver, self.is_available(pool, for_write))
    }

    fn free_space(&mut self, pool: &Pool) -> Result<u64> {
        delegate!(PoolDriver, self.free_space(pool))
    }

    fn total_space(&mut self, pool: &Pool) -> Result<u64> {
        delegate!(PoolDriver, self.total_space(pool))
    }

    /// Where to read an existing replica from
    fn get_location(&mut self, pool: &Pool, replica: &Replica) -> Result<Location> {
        delegate!(PoolDriver, self.get_location(pool, replica))
    }

    /// Where to write a new replica of the logical file `path`
    fn put_location(&mut self, pool: &Pool, path: &str) -> Result<Location> {
        delegate!(PoolDriver, self.put_location(pool, path))
    }

    /// Account for a completed write. Returns the pool with updated
    /// attributes for the pool manager to persist.
    fn put_done(&mut self, pool: &Pool, replica: &Replica, size: u64) -> Result<Pool> {
        delegate!(PoolDriver, self.put_done(pool, replica, size))
    }

    /// Release whatever `put_location` reserved
    fn cancel_write(&mut self, pool: &Pool, location: &Location) -> Result<()> {
        delegate!(PoolDriver, self.cancel_write(pool, location))
    }

    /// Delete the physical data of a replica
    fn remove(&mut self, pool: &Pool, path: &str, replica: &Replica) -> Result<()> {
        delegate!(PoolDriver, self.remove(pool, path, replica))
    }
}
