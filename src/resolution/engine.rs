//! Replica and Location Resolution
//!
//! Turns logical paths into physical locations for a stack instance.
//!
//! Reads: list replicas, drop the excluded ones and those whose pool cannot
//! serve reads, rank the rest by free space and let the owning pool driver
//! materialise a location. A caller that cannot use the location excludes
//! the replica and asks again, so retries are bounded by the replica count.
//!
//! Writes: rank the writable pools and let their drivers hand out a
//! location, falling back to the next pool when one refuses. The namespace
//! entry is created only once a location exists. `done_writing` registers
//! the new replica and lets the driver account for the space used.

use crate::domain::path::absolute_path;
use crate::domain::{
    chunk_keys, Location, Pool, PoolAvailability, PoolDriver, Replica, ReplicaStatus,
};
use crate::error::{errc, Error, ErrorCategory, ErrorKind, Result};
use crate::stack::StackInstance;
use tracing::{debug, info, warn};

/// A replica that survived filtering
struct ReadCandidate {
    replica: Replica,
    pool: Pool,
    free: u64,
}

struct WriteCandidate {
    pool: Pool,
    free: u64,
}

/// Free space of a pool, `None` when the driver cannot tell
fn free_space_of(driver: &mut dyn PoolDriver, pool: &Pool) -> Option<u64> {
    match driver.free_space(pool) {
        Ok(free) => Some(free),
        Err(e) => {
            warn!(pool = %pool.name, error = %e, "free space unknown, pool skipped");
            None
        }
    }
}

impl StackInstance {
    fn absolute(&mut self, path: &str) -> Result<String> {
        let cwd = self
            .catalog()?
            .working_dir()
            .unwrap_or_else(|_| "/".to_string());
        Ok(absolute_path(&cwd, path))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Location to read `path` from, skipping excluded replicas
    pub fn where_to_read(&mut self, path: &str) -> Result<Location> {
        let path = self.absolute(path)?;
        let replicas = self.catalog()?.get_replicas(&path)?;

        if replicas.is_empty() {
            if self.handle.has_exclusions() {
                return Err(Error::no_replica_available(format!(
                    "every replica of {} has been excluded",
                    path
                )));
            }
            return Err(Error::no_such_replica(format!("{} has no replicas", path)));
        }

        let mut candidates = Vec::with_capacity(replicas.len());
        for replica in replicas {
            if self.handle.is_excluded(replica.replica_id) {
                continue;
            }
            if replica.status != ReplicaStatus::Available {
                debug!(replica_id = replica.replica_id, status = ?replica.status, "replica not available");
                continue;
            }
            if let Some(candidate) = self.read_candidate(replica)? {
                candidates.push(candidate);
            }
        }

        let free: Vec<u64> = candidates.iter().map(|c| c.free).collect();
        let Some(chosen) = self.placement.select(&free) else {
            return Err(Error::no_replica_available(format!(
                "no replica of {} is available",
                path
            )));
        };
        let ReadCandidate { replica, pool, .. } = candidates.swap_remove(chosen);

        let driver = self.pool_driver(&pool.pool_type)?;
        let mut location = driver.get_location(&pool, &replica)?;
        for chunk in &mut location.chunks {
            chunk.attrs.set(chunk_keys::POOL, pool.name.clone());
            chunk.attrs.set(chunk_keys::REPLICA_ID, replica.replica_id);
            chunk.attrs.set(chunk_keys::SFN, path.clone());
        }

        debug!(
            path = %path,
            replica_id = replica.replica_id,
            pool = %pool.name,
            "read location resolved"
        );
        Ok(location)
    }

    fn read_candidate(&mut self, replica: Replica) -> Result<Option<ReadCandidate>> {
        let pool = match self.pool_manager()?.get_pool(&replica.pool) {
            Ok(pool) => pool,
            Err(e) if e.kind() == ErrorKind::NoSuchPool => {
                warn!(replica_id = replica.replica_id, pool = %replica.pool, "replica on unknown pool");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let driver = match self.pool_driver(&pool.pool_type) {
            Ok(driver) => driver,
            Err(e) if e.kind() == ErrorKind::UnknownPoolType => {
                warn!(
                    replica_id = replica.replica_id,
                    pool = %pool.name,
                    pool_type = %pool.pool_type,
                    "no driver for replica pool"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if !driver.is_available(&pool, false)? {
            debug!(pool = %pool.name, "pool not available for reading");
            return Ok(None);
        }
        let Some(free) = free_space_of(driver, &pool) else {
            return Ok(None);
        };
        Ok(Some(ReadCandidate {
            replica,
            pool,
            free,
        }))
    }

    /// Run `attempt` against read locations of `path` until it succeeds.
    /// Each failure excludes the replica it was given; once every replica is
    /// excluded the call fails with `NoReplicaAvailable`.
    pub fn read_with_retries<T, F>(&mut self, path: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(&Location) -> Result<T>,
    {
        self.begin_operation();
        loop {
            let location = self.where_to_read(path)?;
            match attempt(&location) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let Some(replica_id) = location.replica_id() else {
                        return Err(e);
                    };
                    warn!(path, replica_id, error = %e, "read attempt failed, excluding replica");
                    self.exclude_replica(replica_id);
                }
            }
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Location to write a new replica of `path` to. Creates the namespace
    /// entry when it does not exist yet, once a pool has issued a location.
    pub fn where_to_write(&mut self, path: &str) -> Result<Location> {
        let path = self.absolute(path)?;

        let pools = self.pool_manager()?.get_pools(PoolAvailability::Any)?;
        if pools.is_empty() {
            return Err(Error::new(
                ErrorCategory::User,
                errc::NO_SUCH_POOL,
                "there are no pools to write to",
            ));
        }

        let mut candidates = Vec::with_capacity(pools.len());
        for pool in pools {
            let driver = match self.pool_driver(&pool.pool_type) {
                Ok(driver) => driver,
                Err(e) if e.kind() == ErrorKind::UnknownPoolType => {
                    warn!(pool = %pool.name, pool_type = %pool.pool_type, "no driver for pool");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !driver.is_available(&pool, true)? {
                continue;
            }
            if let Some(free) = free_space_of(driver, &pool) {
                candidates.push(WriteCandidate { pool, free });
            }
        }

        let exists = self.entry_exists(&path)?;
        let (pool, mut location) = self.place_write(&path, candidates)?;

        if !exists {
            if let Err(e) = self.catalog().and_then(|catalog| catalog.create(&path, 0o664)) {
                if let Err(cancel) = self
                    .pool_driver(&pool.pool_type)
                    .and_then(|driver| driver.cancel_write(&pool, &location))
                {
                    warn!(path = %path, pool = %pool.name, error = %cancel, "could not release write location");
                }
                return Err(e);
            }
        }

        for chunk in &mut location.chunks {
            chunk.attrs.set(chunk_keys::POOL, pool.name.clone());
            chunk.attrs.set(chunk_keys::SFN, path.clone());
        }

        info!(path = %path, pool = %pool.name, "write location resolved");
        Ok(location)
    }

    /// Ask the chosen pool for a location, falling back to the next best
    /// candidate when its driver refuses
    fn place_write(
        &mut self,
        path: &str,
        mut candidates: Vec<WriteCandidate>,
    ) -> Result<(Pool, Location)> {
        let mut refused: Option<Error> = None;
        loop {
            let free: Vec<u64> = candidates.iter().map(|c| c.free).collect();
            let Some(chosen) = self.placement.select(&free) else {
                return Err(match refused {
                    Some(e) => Error::no_replica_available(format!(
                        "no pool accepted {}, last refusal: {}",
                        path, e
                    )),
                    None => Error::no_replica_available(format!(
                        "no pool is available for writing {}",
                        path
                    )),
                });
            };
            let WriteCandidate { pool, .. } = candidates.remove(chosen);

            match self.pool_driver(&pool.pool_type)?.put_location(&pool, path) {
                Ok(location) => return Ok((pool, location)),
                Err(e) => {
                    warn!(path, pool = %pool.name, error = %e, "pool refused write");
                    refused = Some(e);
                }
            }
        }
    }

    /// Whether `path` already names a regular entry; directories are refused
    fn entry_exists(&mut self, path: &str) -> Result<bool> {
        match self.catalog()?.extended_stat(path) {
            Ok(entry) if entry.stat.is_dir() => Err(Error::is_a_directory(path)),
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::FileNotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Register the replica written at `location` and account for `size`
    pub fn done_writing(&mut self, location: &Location, size: u64) -> Result<()> {
        let chunk = location.first()?;
        let pool_name = chunk.attrs.get_str(chunk_keys::POOL, "")?.to_string();
        let sfn = chunk.attrs.get_str(chunk_keys::SFN, "")?.to_string();
        if pool_name.is_empty() || sfn.is_empty() {
            return Err(Error::invalid_argument(
                "location does not come from where_to_write",
            ));
        }

        let pool = self.pool_manager()?.get_pool(&pool_name)?;
        let entry = self.catalog()?.extended_stat(&sfn)?;

        let mut replica = Replica {
            replica_id: 0,
            file_id: entry.stat.ino,
            pool: pool.name.clone(),
            server: chunk.host.clone(),
            rfn: format!("{}:{}", chunk.host, chunk.path),
            status: ReplicaStatus::Available,
            ..Default::default()
        };
        if let Some(filesystem) = chunk.attrs.get(chunk_keys::FILESYSTEM) {
            replica.attrs.set(chunk_keys::FILESYSTEM, filesystem.clone());
        }

        let catalog = self.catalog()?;
        catalog.add_replica(&replica)?;
        catalog.set_size(&sfn, size)?;

        let updated = self.pool_driver(&pool.pool_type)?.put_done(&pool, &replica, size)?;
        self.pool_manager()?.update_pool(&updated)?;

        info!(path = %sfn, pool = %pool.name, server = %replica.server, size, "write completed");
        Ok(())
    }

    /// Abandon a write started with `where_to_write`. The namespace entry is
    /// removed when no replica was registered for it.
    pub fn cancel_write(&mut self, location: &Location) -> Result<()> {
        let chunk = location.first()?;
        let pool_name = chunk.attrs.get_str(chunk_keys::POOL, "")?.to_string();
        let sfn = chunk.attrs.get_str(chunk_keys::SFN, "")?.to_string();

        let pool = self.pool_manager()?.get_pool(&pool_name)?;
        self.pool_driver(&pool.pool_type)?
            .cancel_write(&pool, location)?;

        if !sfn.is_empty() {
            let catalog = self.catalog()?;
            if catalog.get_replicas(&sfn)?.is_empty() {
                catalog.unlink(&sfn)?;
            }
        }
        info!(path = %sfn, pool = %pool.name, "write cancelled");
        Ok(())
    }

    /// Delete one replica: physical data through the pool driver, then the
    /// catalog record
    pub fn remove_replica(&mut self, path: &str, replica: &Replica) -> Result<()> {
        let path = self.absolute(path)?;
        let pool = self.pool_manager()?.get_pool(&replica.pool)?;
        self.pool_driver(&pool.pool_type)?.remove(&pool, &path, replica)?;
        self.catalog()?.delete_replica(replica)?;
        info!(path = %path, replica_id = replica.replica_id, "replica removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IOHandler, OpenFlags};
    use crate::plugins::testing::{disk_manager, root_stack};
    use crate::registry::{BaseFactory, PluginManager, PoolDriverFactory};
    use std::path::Path;
    use std::sync::Arc;

    fn kind<T>(result: Result<T>) -> Option<ErrorKind> {
        result.err().map(|e| e.kind())
    }

    fn pool_of(location: &Location) -> String {
        location.chunks[0]
            .attrs
            .get_str(chunk_keys::POOL, "")
            .unwrap()
            .to_string()
    }

    fn open(stack: &mut StackInstance, location: &Location, flags: OpenFlags) -> Box<dyn IOHandler> {
        let chunk = location.first().unwrap();
        stack
            .io_driver()
            .unwrap()
            .create_io_handler(&chunk.path, flags, &chunk.attrs)
            .unwrap()
    }

    /// File with `count` replicas on `pool`, registered directly in the catalog
    fn file_with_replicas(stack: &mut StackInstance, path: &str, pool: &str, count: i64) {
        let catalog = stack.catalog().unwrap();
        catalog.create(path, 0o644).unwrap();
        let ino = catalog.stat(path).unwrap().ino;
        for n in 1..=count {
            catalog
                .add_replica(&Replica {
                    file_id: ino,
                    pool: pool.to_string(),
                    server: "localhost".into(),
                    rfn: format!("localhost:/nowhere/{}/{}", n, path),
                    ..Default::default()
                })
                .unwrap();
        }
    }

    /// Driver for pool type `broken`: always claims availability, never
    /// issues a location, and cannot size pools named `nospace*`
    struct BrokenDriver;

    impl PoolDriver for BrokenDriver {
        fn impl_id(&self) -> String {
            "BrokenDriver".into()
        }

        fn pool_type(&self) -> String {
            "broken".into()
        }

        fn is_available(&mut self, _pool: &Pool, _for_write: bool) -> Result<bool> {
            Ok(true)
        }

        fn free_space(&mut self, pool: &Pool) -> Result<u64> {
            if pool.name.starts_with("nospace") {
                return Err(Error::internal("statfs failed"));
            }
            Ok(u64::MAX)
        }

        fn put_location(&mut self, pool: &Pool, _path: &str) -> Result<Location> {
            Err(Error::internal(format!("{} is offline", pool.name)))
        }
    }

    struct BrokenFactory;

    impl BaseFactory for BrokenFactory {
        fn plugin_id(&self) -> &str {
            "broken"
        }

        fn configure(&self, key: &str, _value: &str) -> Result<()> {
            Err(Error::unknown_option(key))
        }
    }

    impl PoolDriverFactory for BrokenFactory {
        fn pool_type(&self) -> &str {
            "broken"
        }

        fn create_pool_driver(&self, _manager: &PluginManager) -> Result<Box<dyn PoolDriver>> {
            Ok(Box::new(BrokenDriver))
        }
    }

    /// Disk pool plus the given `name:type` pools served by [`BrokenDriver`]
    fn with_broken_pools(dir: &Path, pools: &[&str]) -> Arc<PluginManager> {
        let mut manager = disk_manager(&[("disk", dir, 1000)]);
        manager.register_pool_driver_factory(Arc::new(BrokenFactory)).unwrap();
        for pool in pools {
            manager.configure("MemoryPool", pool).unwrap();
        }
        Arc::new(manager)
    }

    fn one_pool(dir: &Path) -> Arc<PluginManager> {
        Arc::new(disk_manager(&[("disk", dir, 1000)]))
    }

    #[test]
    fn test_write_then_read_back() {
        let small = tempfile::tempdir().unwrap();
        let large = tempfile::tempdir().unwrap();
        let manager = Arc::new(disk_manager(&[
            ("small", small.path(), 1000),
            ("large", large.path(), 5000),
        ]));
        let mut stack = root_stack(&manager);
        stack.catalog().unwrap().make_dir("/data", 0o755).unwrap();

        let location = stack.where_to_write("/data/f").unwrap();
        assert_eq!(pool_of(&location), "large");
        let chunk = location.first().unwrap().clone();
        assert!(chunk.path.starts_with(large.path().to_str().unwrap()));
        assert_eq!(chunk.attrs.get_str(chunk_keys::SFN, "").unwrap(), "/data/f");
        assert!(chunk.token().is_some());
        assert!(stack.catalog().unwrap().stat("/data/f").unwrap().is_file());

        let mut writer = open(&mut stack, &location, OpenFlags::WRITE);
        writer.write(b"payload").unwrap();
        writer.close().unwrap();
        stack.done_writing(&location, 7).unwrap();

        let catalog = stack.catalog().unwrap();
        assert_eq!(catalog.stat("/data/f").unwrap().size, 7);
        let replicas = catalog.get_replicas("/data/f").unwrap();
        assert_eq!(replicas.len(), 1);
        assert_eq!(replicas[0].pool, "large");
        assert_eq!(replicas[0].status, ReplicaStatus::Available);
        let pool = stack.pool_manager().unwrap().get_pool("large").unwrap();
        assert_eq!(pool.filesystems().unwrap()[0].free, 4993);

        let location = stack.where_to_read("/data/f").unwrap();
        assert_eq!(location.replica_id(), Some(replicas[0].replica_id));
        assert_eq!(location.first().unwrap().path, chunk.path);

        let mut reader = open(&mut stack, &location, OpenFlags::READ);
        let mut buf = [0u8; 32];
        let read = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..read], b"payload");
    }

    #[test]
    fn test_relative_paths_use_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = root_stack(&one_pool(dir.path()));
        let catalog = stack.catalog().unwrap();
        catalog.make_dir("/home", 0o755).unwrap();
        catalog.change_dir("/home").unwrap();

        let location = stack.where_to_write("notes").unwrap();
        assert_eq!(
            location.chunks[0].attrs.get_str(chunk_keys::SFN, "").unwrap(),
            "/home/notes"
        );
    }

    #[test]
    fn test_retries_are_bounded_by_replica_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = root_stack(&one_pool(dir.path()));
        file_with_replicas(&mut stack, "/f", "disk", 3);

        let mut tried = Vec::new();
        let result: Result<()> = stack.read_with_retries("/f", |location| {
            tried.push(location.replica_id().unwrap());
            Err(Error::internal("transfer failed"))
        });

        assert_eq!(kind(result), Some(ErrorKind::NoReplicaAvailable));
        assert_eq!(tried.len(), 3);
        tried.dedup();
        assert_eq!(tried.len(), 3);
    }

    #[test]
    fn test_retry_moves_to_next_replica() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = root_stack(&one_pool(dir.path()));
        file_with_replicas(&mut stack, "/f", "disk", 2);

        let mut attempts = 0;
        let served_by = stack
            .read_with_retries("/f", |location| {
                attempts += 1;
                if attempts == 1 {
                    Err(Error::internal("first replica unreachable"))
                } else {
                    Ok(location.replica_id().unwrap())
                }
            })
            .unwrap();
        assert_eq!(attempts, 2);
        assert!(stack.is_excluded(1));
        assert_eq!(served_by, 2);

        // a new operation starts with a clean slate
        let first = stack.read_with_retries("/f", |l| Ok(l.replica_id())).unwrap();
        assert_eq!(first, Some(1));
    }

    #[test]
    fn test_exclusions_through_librarian() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = disk_manager(&[("disk", dir.path(), 1000)]);
        manager.load_plugin("librarian").unwrap();
        let mut stack = root_stack(&Arc::new(manager));
        file_with_replicas(&mut stack, "/f", "disk", 2);

        stack.exclude_replica(1);
        assert_eq!(stack.where_to_read("/f").unwrap().replica_id(), Some(2));
        stack.exclude_replica(2);
        assert_eq!(
            kind(stack.where_to_read("/f")),
            Some(ErrorKind::NoReplicaAvailable)
        );
    }

    #[test]
    fn test_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = root_stack(&one_pool(dir.path()));
        stack.catalog().unwrap().create("/empty", 0o644).unwrap();
        assert_eq!(kind(stack.where_to_read("/empty")), Some(ErrorKind::NoSuchReplica));
        assert_eq!(kind(stack.where_to_read("/absent")), Some(ErrorKind::FileNotFound));

        file_with_replicas(&mut stack, "/busy", "disk", 1);
        let catalog = stack.catalog().unwrap();
        let mut replica = catalog.get_replicas("/busy").unwrap().remove(0);
        replica.status = ReplicaStatus::BeingPopulated;
        catalog.update_replica(&replica).unwrap();
        assert_eq!(kind(stack.where_to_read("/busy")), Some(ErrorKind::NoReplicaAvailable));

        file_with_replicas(&mut stack, "/lost", "vanished", 1);
        assert_eq!(kind(stack.where_to_read("/lost")), Some(ErrorKind::NoReplicaAvailable));
    }

    #[test]
    fn test_write_errors() {
        let mut manager = crate::plugins::testing::memory_manager();
        manager.load_plugin("filesystem").unwrap();
        manager.configure("TokenPassword", "test-secret").unwrap();
        let manager = Arc::new(manager);
        let mut stack = root_stack(&manager);
        assert_eq!(kind(stack.where_to_write("/f")), Some(ErrorKind::NoSuchPool));

        let dir = tempfile::tempdir().unwrap();
        let mut manager = disk_manager(&[("disk", dir.path(), 1000)]);
        manager.configure("MemoryPool", "tapes:tape").unwrap();
        let mut stack = root_stack(&Arc::new(manager));
        stack.catalog().unwrap().make_dir("/d", 0o755).unwrap();
        assert_eq!(kind(stack.where_to_write("/d")), Some(ErrorKind::IsADirectory));
        assert_eq!(pool_of(&stack.where_to_write("/f").unwrap()), "disk");
    }

    #[test]
    fn test_replica_on_driverless_pool_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = disk_manager(&[("disk", dir.path(), 1000)]);
        manager.configure("MemoryPool", "tapes:tape").unwrap();
        let mut stack = root_stack(&Arc::new(manager));

        let catalog = stack.catalog().unwrap();
        catalog.create("/f", 0o644).unwrap();
        let ino = catalog.stat("/f").unwrap().ino;
        for pool in ["tapes", "disk"] {
            catalog
                .add_replica(&Replica {
                    file_id: ino,
                    pool: pool.into(),
                    server: "localhost".into(),
                    rfn: format!("localhost:/{}/f", pool),
                    ..Default::default()
                })
                .unwrap();
        }

        let location = stack.where_to_read("/f").unwrap();
        assert_eq!(pool_of(&location), "disk");
        assert_eq!(location.replica_id(), Some(2));
    }

    #[test]
    fn test_unweighted_pool_takes_no_writes() {
        let disk = tempfile::tempdir().unwrap();
        let zero = tempfile::tempdir().unwrap();
        let mut manager = disk_manager(&[("disk", disk.path(), 1000)]);
        manager.configure("MemoryPool", "zero:filesystem").unwrap();
        manager
            .configure(
                "MemoryFilesystem",
                &format!("zero:localhost:{}:0:9000", zero.path().display()),
            )
            .unwrap();
        let mut stack = root_stack(&Arc::new(manager));

        assert_eq!(pool_of(&stack.where_to_write("/w").unwrap()), "disk");
    }

    #[test]
    fn test_refused_write_falls_back_to_next_pool() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = root_stack(&with_broken_pools(dir.path(), &["offline:broken"]));

        let location = stack.where_to_write("/w").unwrap();
        assert_eq!(pool_of(&location), "disk");
        assert!(stack.catalog().unwrap().stat("/w").unwrap().is_file());
    }

    #[test]
    fn test_refused_write_leaves_no_entry() {
        let mut manager = crate::plugins::testing::memory_manager();
        manager.register_pool_driver_factory(Arc::new(BrokenFactory)).unwrap();
        manager.configure("MemoryPool", "offline:broken").unwrap();
        let mut stack = root_stack(&Arc::new(manager));

        assert_eq!(kind(stack.where_to_write("/w")), Some(ErrorKind::NoReplicaAvailable));
        assert_eq!(
            kind(stack.catalog().unwrap().stat("/w")),
            Some(ErrorKind::FileNotFound)
        );
    }

    #[test]
    fn test_unsized_pool_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = root_stack(&with_broken_pools(dir.path(), &["nospace:broken"]));
        assert_eq!(pool_of(&stack.where_to_write("/w").unwrap()), "disk");

        let catalog = stack.catalog().unwrap();
        let ino = catalog.stat("/w").unwrap().ino;
        catalog
            .add_replica(&Replica {
                file_id: ino,
                pool: "nospace".into(),
                server: "remote".into(),
                rfn: "remote:/w".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(kind(stack.where_to_read("/w")), Some(ErrorKind::NoReplicaAvailable));
    }

    #[test]
    fn test_round_robin_spreads_ties() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let mut manager = disk_manager(&[("a", a.path(), 100), ("b", b.path(), 100)]);
        manager.configure("WritePlacement", "round-robin").unwrap();
        let mut stack = root_stack(&Arc::new(manager));

        let first = pool_of(&stack.where_to_write("/one").unwrap());
        let second = pool_of(&stack.where_to_write("/two").unwrap());
        assert_ne!(first, second);
    }

    #[test]
    fn test_cancel_write_removes_entry_and_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = root_stack(&one_pool(dir.path()));

        let location = stack.where_to_write("/partial").unwrap();
        let mut writer = open(&mut stack, &location, OpenFlags::WRITE);
        writer.write(b"half").unwrap();
        writer.close().unwrap();
        let pfn = location.first().unwrap().path.clone();
        assert!(Path::new(&pfn).exists());

        stack.cancel_write(&location).unwrap();
        assert!(!Path::new(&pfn).exists());
        assert_eq!(
            kind(stack.catalog().unwrap().stat("/partial")),
            Some(ErrorKind::FileNotFound)
        );
    }

    #[test]
    fn test_done_writing_needs_write_location() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = root_stack(&one_pool(dir.path()));
        let bare = Location::single(crate::domain::Chunk::new("localhost", "/tmp/x"));
        assert_eq!(kind(stack.done_writing(&bare, 1)), Some(ErrorKind::InvalidArgument));
        assert_eq!(
            kind(stack.done_writing(&Location::default(), 1)),
            Some(ErrorKind::InvalidArgument)
        );
    }

    #[test]
    fn test_remove_replica() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = root_stack(&one_pool(dir.path()));
        let location = stack.where_to_write("/gone").unwrap();
        let mut writer = open(&mut stack, &location, OpenFlags::WRITE);
        writer.write(b"x").unwrap();
        writer.close().unwrap();
        stack.done_writing(&location, 1).unwrap();

        let replica = stack.catalog().unwrap().get_replicas("/gone").unwrap().remove(0);
        stack.remove_replica("/gone", &replica).unwrap();
        assert!(!Path::new(&location.chunks[0].path).exists());
        assert_eq!(kind(stack.where_to_read("/gone")), Some(ErrorKind::NoSuchReplica));
    }
}
