//! In-memory pool table

use crate::domain::{Filesystem, FilesystemStatus, Pool, PoolAvailability, PoolManager};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub type PoolTable = RwLock<BTreeMap<String, Pool>>;

/// Parse `name:type`
pub fn parse_pool(value: &str) -> Result<Pool> {
    match value.split_once(':') {
        Some((name, pool_type)) if !name.trim().is_empty() && !pool_type.trim().is_empty() => {
            Ok(Pool::new(name.trim(), pool_type.trim()))
        }
        _ => Err(Error::malformed(format!("expected name:type, got '{}'", value))),
    }
}

/// Parse `pool:server:path[:weight[:free[:status]]]` into the pool name and
/// the filesystem. Total space starts equal to free space.
pub fn parse_filesystem(value: &str) -> Result<(String, Filesystem)> {
    let malformed = || {
        Error::malformed(format!(
            "expected pool:server:path[:weight[:free[:status]]], got '{}'",
            value
        ))
    };
    let parts: Vec<&str> = value.split(':').map(str::trim).collect();
    if parts.len() < 3 || parts.len() > 6 || parts[..3].iter().any(|p| p.is_empty()) {
        return Err(malformed());
    }

    let weight = match parts.get(3) {
        Some(w) => w.parse::<u32>().map_err(|_| malformed())?,
        None => 1,
    };
    let free = match parts.get(4) {
        Some(f) => f.parse::<u64>().map_err(|_| malformed())?,
        None => 0,
    };
    let status = match parts.get(5) {
        Some(s) => s.parse::<FilesystemStatus>()?,
        None => FilesystemStatus::Active,
    };

    Ok((
        parts[0].to_string(),
        Filesystem {
            server: parts[1].to_string(),
            path: parts[2].to_string(),
            weight,
            free,
            total: free,
            status,
        },
    ))
}

pub struct MemoryPoolManager {
    pools: Arc<PoolTable>,
}

impl MemoryPoolManager {
    pub fn new(pools: Arc<PoolTable>) -> Self {
        Self { pools }
    }
}

impl PoolManager for MemoryPoolManager {
    fn impl_id(&self) -> String {
        "MemoryPoolManager".into()
    }

    fn get_pools(&mut self, availability: PoolAvailability) -> Result<Vec<Pool>> {
        let pools = self.pools.read();
        let mut listed = Vec::with_capacity(pools.len());
        for pool in pools.values() {
            if availability.admits(pool)? {
                listed.push(pool.clone());
            }
        }
        Ok(listed)
    }

    fn get_pool(&mut self, name: &str) -> Result<Pool> {
        self.pools
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::no_such_pool(name))
    }

    fn new_pool(&mut self, pool: &Pool) -> Result<()> {
        let mut pools = self.pools.write();
        if pools.contains_key(&pool.name) {
            return Err(Error::exists(&pool.name));
        }
        pools.insert(pool.name.clone(), pool.clone());
        debug!(pool = %pool.name, pool_type = %pool.pool_type, "pool created");
        Ok(())
    }

    fn update_pool(&mut self, pool: &Pool) -> Result<()> {
        match self.pools.write().get_mut(&pool.name) {
            Some(stored) => {
                *stored = pool.clone();
                Ok(())
            }
            None => Err(Error::no_such_pool(&pool.name)),
        }
    }

    fn delete_pool(&mut self, pool: &Pool) -> Result<()> {
        self.pools
            .write()
            .remove(&pool.name)
            .map(|_| ())
            .ok_or_else(|| Error::no_such_pool(&pool.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_filesystem() {
        let (pool, fs) = parse_filesystem("disk:node1:/srv/a:3:1000:readonly").unwrap();
        assert_eq!(pool, "disk");
        assert_eq!((fs.server.as_str(), fs.path.as_str()), ("node1", "/srv/a"));
        assert_eq!((fs.weight, fs.free, fs.total), (3, 1000, 1000));
        assert_eq!(fs.status, FilesystemStatus::ReadOnly);

        let (_, fs) = parse_filesystem("disk:node1:/srv/b").unwrap();
        assert_eq!((fs.weight, fs.free, fs.status), (1, 0, FilesystemStatus::Active));

        assert!(parse_filesystem("disk:node1").is_err());
        assert!(parse_filesystem("disk:node1:/srv:heavy").is_err());
    }

    #[test]
    fn test_availability_filter() {
        let table = Arc::new(PoolTable::default());
        let mut manager = MemoryPoolManager::new(Arc::clone(&table));

        let mut open = Pool::new("open", "filesystem");
        open.set_filesystems(&[parse_filesystem("open:h:/a").unwrap().1])
            .unwrap();
        let mut frozen = Pool::new("frozen", "filesystem");
        frozen
            .set_filesystems(&[parse_filesystem("frozen:h:/b:1:0:readonly").unwrap().1])
            .unwrap();
        manager.new_pool(&open).unwrap();
        manager.new_pool(&frozen).unwrap();

        let names = |pools: Vec<Pool>| pools.into_iter().map(|p| p.name).collect::<Vec<_>>();
        assert_eq!(names(manager.get_pools(PoolAvailability::Any).unwrap()), vec!["frozen", "open"]);
        assert_eq!(names(manager.get_pools(PoolAvailability::ForWrite).unwrap()), vec!["open"]);
        assert_eq!(names(manager.get_pools(PoolAvailability::ForRead).unwrap()).len(), 2);

        assert_eq!(manager.new_pool(&open).unwrap_err().kind(), ErrorKind::Exists);
        manager.delete_pool(&frozen).unwrap();
        assert_eq!(manager.get_pool("frozen").unwrap_err().kind(), ErrorKind::NoSuchPool);
        assert_eq!(
            manager.update_pool(&frozen).unwrap_err().kind(),
            ErrorKind::NoSuchPool
        );
    }
}
