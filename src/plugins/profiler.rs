//! Profiler Plugin
//!
//! Decorates the Catalog, PoolManager and IODriver stacks and times every
//! call that goes through them, including the reads and writes of the IO
//! handlers it opens. Each call is logged at debug level with its elapsed
//! time; calls slower than `ProfilerSlowMs` are logged as warnings.

use crate::domain::{
    delegate, Catalog, ExtendedStat, Extensible, IODriver, IOHandler, OpenFlags, Pool,
    PoolAvailability, PoolManager, Replica, Whence,
};
use crate::error::{ContractKind, Error, Result};
use crate::registry::{
    BaseFactory, CatalogFactory, IODriverFactory, PluginManager, PoolManagerFactory,
};
use crate::security::Acl;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const PLUGIN_ID: &str = "profiler";
pub const OPT_SLOW_MS: &str = "ProfilerSlowMs";

const DEFAULT_SLOW_MS: u64 = 1000;

/// Run a delegated call and report how long it took
macro_rules! timed {
    ($self:ident, $contract:ident, $method:ident($($arg:expr),*)) => {{
        let started = Instant::now();
        let result = delegate!($contract, $self.$method($($arg),*));
        report(
            concat!(stringify!($contract), "::", stringify!($method)),
            started.elapsed(),
            $self.slow,
            result.is_ok(),
        );
        result
    }};
}

/// Time a call on a node that always has an inner handler
fn measure<T>(
    operation: &'static str,
    slow: Duration,
    call: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let started = Instant::now();
    let result = call();
    report(operation, started.elapsed(), slow, result.is_ok());
    result
}

fn report(operation: &'static str, elapsed: Duration, slow: Duration, ok: bool) {
    let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    debug!(operation, elapsed_us, ok, "profiled call");
    if !slow.is_zero() && elapsed >= slow {
        warn!(
            operation,
            elapsed_ms = elapsed_us / 1000,
            threshold_ms = u64::try_from(slow.as_millis()).unwrap_or(u64::MAX),
            "slow call"
        );
    }
}

// =============================================================================
// Factory
// =============================================================================

#[derive(Debug)]
pub struct ProfilerFactory {
    slow_ms: AtomicU64,
}

impl Default for ProfilerFactory {
    fn default() -> Self {
        Self {
            slow_ms: AtomicU64::new(DEFAULT_SLOW_MS),
        }
    }
}

impl ProfilerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn slow(&self) -> Duration {
        Duration::from_millis(self.slow_ms.load(Ordering::Relaxed))
    }
}

impl BaseFactory for ProfilerFactory {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn configure(&self, key: &str, value: &str) -> Result<()> {
        if key != OPT_SLOW_MS {
            return Err(Error::unknown_option(key));
        }
        let ms = value.trim().parse::<u64>().map_err(|_| {
            Error::malformed(format!("{} must be milliseconds, got '{}'", OPT_SLOW_MS, value))
        })?;
        self.slow_ms.store(ms, Ordering::Relaxed);
        Ok(())
    }
}

impl CatalogFactory for ProfilerFactory {
    fn decorates(&self) -> bool {
        true
    }

    fn create_catalog(
        &self,
        _manager: &PluginManager,
        inner: Option<Box<dyn Catalog>>,
    ) -> Result<Box<dyn Catalog>> {
        Ok(Box::new(ProfilerCatalog {
            inner,
            slow: self.slow(),
        }))
    }
}

impl PoolManagerFactory for ProfilerFactory {
    fn decorates(&self) -> bool {
        true
    }

    fn create_pool_manager(
        &self,
        _manager: &PluginManager,
        inner: Option<Box<dyn PoolManager>>,
    ) -> Result<Box<dyn PoolManager>> {
        Ok(Box::new(ProfilerPoolManager {
            inner,
            slow: self.slow(),
        }))
    }
}

impl IODriverFactory for ProfilerFactory {
    fn decorates(&self) -> bool {
        true
    }

    fn create_io_driver(
        &self,
        _manager: &PluginManager,
        inner: Option<Box<dyn IODriver>>,
    ) -> Result<Box<dyn IODriver>> {
        Ok(Box::new(ProfilerIODriver {
            inner,
            slow: self.slow(),
        }))
    }
}

/// Decorate the catalog, plus the pool manager and IO driver when they are
/// registered
pub fn register(manager: &mut PluginManager) -> Result<()> {
    let factory = std::sync::Arc::new(ProfilerFactory::new());
    manager.register_catalog_factory(factory.clone())?;
    if manager.has_factory(ContractKind::PoolManager) {
        manager.register_pool_manager_factory(factory.clone())?;
    } else {
        debug!("no pool manager to profile");
    }
    if manager.has_factory(ContractKind::IODriver) {
        manager.register_io_factory(factory)?;
    } else {
        debug!("no io driver to profile");
    }
    Ok(())
}

// =============================================================================
// Catalog
// =============================================================================

pub struct ProfilerCatalog {
    inner: Option<Box<dyn Catalog>>,
    slow: Duration,
}

impl Catalog for ProfilerCatalog {
    fn impl_id(&self) -> String {
        "ProfilerCatalog".into()
    }

    fn decorated(&mut self) -> Option<&mut (dyn Catalog + 'static)> {
        self.inner.as_deref_mut()
    }

    fn change_dir(&mut self, path: &str) -> Result<()> {
        timed!(self, Catalog, change_dir(path))
    }

    fn working_dir(&mut self) -> Result<String> {
        timed!(self, Catalog, working_dir())
    }

    fn umask(&mut self, mask: u32) -> Result<u32> {
        timed!(self, Catalog, umask(mask))
    }

    fn extended_stat(&mut self, path: &str) -> Result<ExtendedStat> {
        timed!(self, Catalog, extended_stat(path))
    }

    fn access(&mut self, path: &str, mode: u32) -> Result<bool> {
        timed!(self, Catalog, access(path, mode))
    }

    fn set_mode(&mut self, path: &str, mode: u32) -> Result<()> {
        timed!(self, Catalog, set_mode(path, mode))
    }

    fn set_owner(&mut self, path: &str, uid: u32, gid: u32) -> Result<()> {
        timed!(self, Catalog, set_owner(path, uid, gid))
    }

    fn set_size(&mut self, path: &str, size: u64) -> Result<()> {
        timed!(self, Catalog, set_size(path, size))
    }

    fn set_acl(&mut self, path: &str, acl: &Acl) -> Result<()> {
        timed!(self, Catalog, set_acl(path, acl))
    }

    fn get_replicas(&mut self, path: &str) -> Result<Vec<Replica>> {
        timed!(self, Catalog, get_replicas(path))
    }

    fn add_replica(&mut self, replica: &Replica) -> Result<()> {
        timed!(self, Catalog, add_replica(replica))
    }

    fn delete_replica(&mut self, replica: &Replica) -> Result<()> {
        timed!(self, Catalog, delete_replica(replica))
    }

    fn update_replica(&mut self, replica: &Replica) -> Result<()> {
        timed!(self, Catalog, update_replica(replica))
    }

    fn create(&mut self, path: &str, mode: u32) -> Result<()> {
        timed!(self, Catalog, create(path, mode))
    }

    fn make_dir(&mut self, path: &str, mode: u32) -> Result<()> {
        timed!(self, Catalog, make_dir(path, mode))
    }

    fn unlink(&mut self, path: &str) -> Result<()> {
        timed!(self, Catalog, unlink(path))
    }

    fn remove_dir(&mut self, path: &str) -> Result<()> {
        timed!(self, Catalog, remove_dir(path))
    }

    fn read_dir(&mut self, path: &str) -> Result<Vec<ExtendedStat>> {
        timed!(self, Catalog, read_dir(path))
    }
}

// =============================================================================
// Pool manager
// =============================================================================

pub struct ProfilerPoolManager {
    inner: Option<Box<dyn PoolManager>>,
    slow: Duration,
}

impl PoolManager for ProfilerPoolManager {
    fn impl_id(&self) -> String {
        "ProfilerPoolManager".into()
    }

    fn decorated(&mut self) -> Option<&mut (dyn PoolManager + 'static)> {
        self.inner.as_deref_mut()
    }

    fn get_pools(&mut self, availability: PoolAvailability) -> Result<Vec<Pool>> {
        timed!(self, PoolManager, get_pools(availability))
    }

    fn get_pool(&mut self, name: &str) -> Result<Pool> {
        timed!(self, PoolManager, get_pool(name))
    }

    fn new_pool(&mut self, pool: &Pool) -> Result<()> {
        timed!(self, PoolManager, new_pool(pool))
    }

    fn update_pool(&mut self, pool: &Pool) -> Result<()> {
        timed!(self, PoolManager, update_pool(pool))
    }

    fn delete_pool(&mut self, pool: &Pool) -> Result<()> {
        timed!(self, PoolManager, delete_pool(pool))
    }
}

// =============================================================================
// IO
// =============================================================================

pub struct ProfilerIODriver {
    inner: Option<Box<dyn IODriver>>,
    slow: Duration,
}

impl IODriver for ProfilerIODriver {
    fn impl_id(&self) -> String {
        "ProfilerIODriver".into()
    }

    fn decorated(&mut self) -> Option<&mut (dyn IODriver + 'static)> {
        self.inner.as_deref_mut()
    }

    fn create_io_handler(
        &mut self,
        pfn: &str,
        flags: OpenFlags,
        extras: &Extensible,
    ) -> Result<Box<dyn IOHandler>> {
        let inner = timed!(self, IODriver, create_io_handler(pfn, flags, extras))?;
        Ok(Box::new(ProfilerIOHandler {
            inner,
            slow: self.slow,
        }))
    }
}

/// Times every call on the handler it wraps
pub struct ProfilerIOHandler {
    inner: Box<dyn IOHandler>,
    slow: Duration,
}

impl IOHandler for ProfilerIOHandler {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let inner = &mut self.inner;
        measure("IOHandler::read", self.slow, || inner.read(buf))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let inner = &mut self.inner;
        measure("IOHandler::write", self.slow, || inner.write(buf))
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let inner = &mut self.inner;
        measure("IOHandler::seek", self.slow, || inner.seek(offset, whence))
    }

    fn tell(&mut self) -> Result<u64> {
        let inner = &mut self.inner;
        measure("IOHandler::tell", self.slow, || inner.tell())
    }

    fn flush(&mut self) -> Result<()> {
        let inner = &mut self.inner;
        measure("IOHandler::flush", self.slow, || inner.flush())
    }

    fn eof(&self) -> bool {
        self.inner.eof()
    }

    fn close(&mut self) -> Result<()> {
        let inner = &mut self.inner;
        measure("IOHandler::close", self.slow, || inner.close())
    }
}
