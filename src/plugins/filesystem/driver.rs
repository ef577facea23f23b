//! Filesystem pool driver
//!
//! A pool is a set of directories, possibly on different servers. Writes go
//! to the filesystem picked by [`choose_filesystem`]; the physical name of a
//! replica is the filesystem path followed by the logical path.

use super::{TokenSettings, POOL_TYPE};
use crate::domain::{chunk_keys, Chunk, Location, Pool, PoolDriver, Replica};
use crate::error::{errc, Error, ErrorCategory, Result};
use crate::resolution::choose_filesystem;
use crate::security::{generate_token, SecurityContext};
use std::io::ErrorKind as IoErrorKind;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct FsPoolDriver {
    settings: TokenSettings,
    security: Option<Arc<SecurityContext>>,
}

impl FsPoolDriver {
    pub fn new(settings: TokenSettings) -> Self {
        Self {
            settings,
            security: None,
        }
    }

    fn token(&self, pfn: &str, write: bool) -> Result<String> {
        let id = self.settings.token_id(self.security.as_deref())?;
        generate_token(&id, pfn, &self.settings.password, self.settings.lifetime, write)
    }
}

/// Physical name of `path` on a filesystem rooted at `root`
fn physical_name(root: &str, path: &str) -> String {
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Remove a local file, treating a missing one as already removed
fn remove_local(pfn: &str) -> Result<()> {
    match std::fs::remove_file(pfn) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == IoErrorKind::NotFound => {
            debug!(pfn, "physical file already gone");
            Ok(())
        }
        Err(e) => Err(Error::from(e).with_context(pfn)),
    }
}

impl PoolDriver for FsPoolDriver {
    fn impl_id(&self) -> String {
        "FsPoolDriver".into()
    }

    fn pool_type(&self) -> String {
        POOL_TYPE.to_string()
    }

    fn set_security_context(&mut self, ctx: &Arc<SecurityContext>) -> Result<()> {
        self.security = Some(Arc::clone(ctx));
        Ok(())
    }

    fn is_available(&mut self, pool: &Pool, for_write: bool) -> Result<bool> {
        pool.has_usable_filesystem(for_write)
    }

    fn free_space(&mut self, pool: &Pool) -> Result<u64> {
        Ok(pool
            .filesystems()?
            .iter()
            .filter(|fs| fs.accepts(true))
            .map(|fs| fs.free)
            .sum())
    }

    fn total_space(&mut self, pool: &Pool) -> Result<u64> {
        Ok(pool.filesystems()?.iter().map(|fs| fs.total).sum())
    }

    fn get_location(&mut self, pool: &Pool, replica: &Replica) -> Result<Location> {
        let pfn = replica.physical_path().to_string();
        let filesystems = pool.filesystems()?;
        let hosting = filesystems
            .iter()
            .find(|fs| fs.server == replica.server && pfn.starts_with(&fs.path));
        if let Some(fs) = hosting {
            if !fs.status.allows(false) {
                return Err(Error::no_replica_available(format!(
                    "filesystem {}:{} is disabled",
                    fs.server, fs.path
                )));
            }
        }

        let mut chunk = Chunk::new(replica.server.clone(), pfn.clone());
        chunk.attrs.set(chunk_keys::TOKEN, self.token(&pfn, false)?);
        Ok(Location::single(chunk))
    }

    fn put_location(&mut self, pool: &Pool, path: &str) -> Result<Location> {
        let filesystems = pool.filesystems()?;
        let fs = choose_filesystem(&filesystems).ok_or_else(|| {
            Error::new(
                ErrorCategory::User,
                errc::ENOSPC,
                format!("pool {} has no writable filesystem", pool.name),
            )
        })?;

        let pfn = physical_name(&fs.path, path);
        let mut chunk = Chunk::new(fs.server.clone(), pfn.clone());
        chunk.attrs.set(chunk_keys::TOKEN, self.token(&pfn, true)?);
        chunk.attrs.set(chunk_keys::FILESYSTEM, fs.path.clone());
        debug!(pool = %pool.name, server = %fs.server, pfn = %pfn, "write location issued");
        Ok(Location::single(chunk))
    }

    fn put_done(&mut self, pool: &Pool, replica: &Replica, size: u64) -> Result<Pool> {
        let mut updated = pool.clone();
        let mut filesystems = pool.filesystems()?;
        let root = replica.attrs.get_str(chunk_keys::FILESYSTEM, "")?;
        let pfn = replica.physical_path();

        let written = filesystems.iter_mut().find(|fs| {
            fs.server == replica.server
                && if root.is_empty() {
                    pfn.starts_with(&fs.path)
                } else {
                    fs.path == root
                }
        });
        match written {
            Some(fs) => fs.free = fs.free.saturating_sub(size),
            None => warn!(pool = %pool.name, rfn = %replica.rfn, "replica is on no known filesystem"),
        }

        updated.set_filesystems(&filesystems)?;
        Ok(updated)
    }

    fn cancel_write(&mut self, pool: &Pool, location: &Location) -> Result<()> {
        for chunk in &location.chunks {
            remove_local(&chunk.path)?;
        }
        debug!(pool = %pool.name, chunks = location.chunks.len(), "write cancelled");
        Ok(())
    }

    fn remove(&mut self, pool: &Pool, path: &str, replica: &Replica) -> Result<()> {
        remove_local(replica.physical_path())?;
        debug!(pool = %pool.name, path, rfn = %replica.rfn, "replica data removed");
        Ok(())
    }
}
