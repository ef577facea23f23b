//! Core records exchanged between plugins
//!
//! Stat records, replicas, pools and locations. Backends own the persistent
//! versions of these; the stack only passes copies around.

use super::extensible::Extensible;
use crate::error::{Error, Result};
use crate::security::Acl;
use serde::{Deserialize, Serialize};

// =============================================================================
// Mode bits
// =============================================================================

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_ISGID: u32 = 0o002000;
pub const S_ISVTX: u32 = 0o001000;

/// Requested access, in the low three bits like `access(2)`
pub const R_OK: u32 = 4;
pub const W_OK: u32 = 2;
pub const X_OK: u32 = 1;

// =============================================================================
// Stat
// =============================================================================

/// POSIX-like status record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Permission bits only
    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Lifecycle status of a namespace entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Online,
    Migrated,
}

/// Status record plus the namespace metadata around it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedStat {
    pub stat: Stat,
    pub parent: u64,
    pub name: String,
    pub guid: String,
    pub status: FileStatus,
    pub csumtype: String,
    pub csumvalue: String,
    pub acl: Acl,
    pub attrs: Extensible,
}

// =============================================================================
// Replica
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaStatus {
    #[default]
    Available,
    BeingPopulated,
    ToBeDeleted,
}

/// One physical copy of a logical file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Replica {
    pub replica_id: i64,
    /// Inode of the logical file
    pub file_id: u64,
    pub pool: String,
    pub server: String,
    /// Physical file name, `server:path`
    pub rfn: String,
    pub status: ReplicaStatus,
    pub attrs: Extensible,
}

impl Replica {
    /// Path component of the physical file name
    pub fn physical_path(&self) -> &str {
        match self.rfn.split_once(':') {
            Some((_, path)) => path,
            None => &self.rfn,
        }
    }
}

// =============================================================================
// Pool
// =============================================================================

/// A storage pool. `pool_type` names the driver that owns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    pub pool_type: String,
    pub attrs: Extensible,
}

impl Pool {
    pub fn new(name: impl Into<String>, pool_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool_type: pool_type.into(),
            attrs: Extensible::new(),
        }
    }
}

/// Attribute under which a pool keeps its filesystems
pub const POOL_FILESYSTEMS: &str = "filesystems";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemStatus {
    #[default]
    Active,
    Disabled,
    ReadOnly,
}

impl FilesystemStatus {
    pub fn allows(self, for_write: bool) -> bool {
        match self {
            FilesystemStatus::Active => true,
            FilesystemStatus::ReadOnly => !for_write,
            FilesystemStatus::Disabled => false,
        }
    }
}

impl std::str::FromStr for FilesystemStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "active" | "0" => Ok(FilesystemStatus::Active),
            "disabled" | "1" => Ok(FilesystemStatus::Disabled),
            "readonly" | "rdonly" | "2" => Ok(FilesystemStatus::ReadOnly),
            other => Err(Error::invalid_argument(format!(
                "unknown filesystem status '{}'",
                other
            ))),
        }
    }
}

/// A filesystem backing part of a disk pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filesystem {
    pub server: String,
    pub path: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub free: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub status: FilesystemStatus,
}

fn default_weight() -> u32 {
    1
}

impl Filesystem {
    /// Whether this filesystem serves the requested mode. Writes also need
    /// a non-zero weight.
    pub fn accepts(&self, for_write: bool) -> bool {
        self.status.allows(for_write) && (!for_write || self.weight > 0)
    }
}

impl Pool {
    /// Filesystems recorded in the pool attributes
    pub fn filesystems(&self) -> Result<Vec<Filesystem>> {
        match self.attrs.get(POOL_FILESYSTEMS) {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                Error::invalid_argument(format!("pool {} has bad filesystems: {}", self.name, e))
            }),
        }
    }

    pub fn set_filesystems(&mut self, filesystems: &[Filesystem]) -> Result<()> {
        let value = serde_json::to_value(filesystems)?;
        self.attrs.set(POOL_FILESYSTEMS, value);
        Ok(())
    }

    /// Whether at least one filesystem accepts the requested mode
    pub fn has_usable_filesystem(&self, for_write: bool) -> Result<bool> {
        Ok(self
            .filesystems()?
            .iter()
            .any(|fs| fs.accepts(for_write)))
    }
}

/// Filter for pool listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolAvailability {
    Any,
    ForRead,
    ForWrite,
    ForBoth,
    None,
}

impl PoolAvailability {
    /// Whether a pool's own filesystem table satisfies this filter
    pub fn admits(self, pool: &Pool) -> Result<bool> {
        Ok(match self {
            PoolAvailability::Any => true,
            PoolAvailability::ForRead => pool.has_usable_filesystem(false)?,
            PoolAvailability::ForWrite => pool.has_usable_filesystem(true)?,
            PoolAvailability::ForBoth => {
                pool.has_usable_filesystem(false)? && pool.has_usable_filesystem(true)?
            }
            PoolAvailability::None => !pool.has_usable_filesystem(false)?,
        })
    }
}

// =============================================================================
// Location
// =============================================================================

/// Well-known chunk attribute keys
pub mod chunk_keys {
    pub const POOL: &str = "pool";
    pub const REPLICA_ID: &str = "replicaid";
    pub const SFN: &str = "sfn";
    pub const TOKEN: &str = "token";
    pub const FILESYSTEM: &str = "filesystem";
}

/// A contiguous piece of a physical location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub host: String,
    pub path: String,
    pub offset: u64,
    pub size: u64,
    pub attrs: Extensible,
}

impl Chunk {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.attrs.get(chunk_keys::TOKEN).and_then(|v| v.as_str())
    }
}

impl std::fmt::Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} ({}+{})", self.host, self.path, self.offset, self.size)
    }
}

/// Resolved physical place to read from or write to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub chunks: Vec<Chunk>,
}

impl Location {
    pub fn single(chunk: Chunk) -> Self {
        Self { chunks: vec![chunk] }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn first(&self) -> Result<&Chunk> {
        self.chunks
            .first()
            .ok_or_else(|| Error::invalid_argument("empty location"))
    }

    /// Replica this location was resolved from, for read locations
    pub fn replica_id(&self) -> Option<i64> {
        self.chunks
            .first()
            .and_then(|c| c.attrs.get(chunk_keys::REPLICA_ID))
            .and_then(|v| v.as_i64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_type_bits() {
        let dir = Stat {
            mode: S_IFDIR | 0o755,
            ..Default::default()
        };
        assert!(dir.is_dir());
        assert!(!dir.is_file());
        assert_eq!(dir.perm(), 0o755);
    }

    #[test]
    fn test_replica_physical_path() {
        let replica = Replica {
            rfn: "disk01:/srv/fs1/data/f".into(),
            ..Default::default()
        };
        assert_eq!(replica.physical_path(), "/srv/fs1/data/f");
    }

    #[test]
    fn test_pool_filesystems() {
        let mut pool = Pool::new("disk", "filesystem");
        assert!(pool.filesystems().unwrap().is_empty());
        assert!(!pool.has_usable_filesystem(false).unwrap());

        let fs = Filesystem {
            server: "disk01".into(),
            path: "/srv/fs1".into(),
            weight: 1,
            free: 100,
            total: 100,
            status: FilesystemStatus::ReadOnly,
        };
        pool.set_filesystems(&[fs.clone()]).unwrap();
        assert_eq!(pool.filesystems().unwrap(), vec![fs.clone()]);
        assert!(pool.has_usable_filesystem(false).unwrap());
        assert!(!pool.has_usable_filesystem(true).unwrap());

        let unweighted = Filesystem {
            weight: 0,
            status: FilesystemStatus::Active,
            ..fs
        };
        pool.set_filesystems(&[unweighted]).unwrap();
        assert!(pool.has_usable_filesystem(false).unwrap());
        assert!(!pool.has_usable_filesystem(true).unwrap());
    }

    #[test]
    fn test_location_replica_id() {
        let mut chunk = Chunk::new("disk01", "/srv/fs1/f");
        chunk.attrs.set(chunk_keys::REPLICA_ID, 7);
        let loc = Location::single(chunk);
        assert_eq!(loc.replica_id(), Some(7));
        assert!(Location::default().first().is_err());
    }
}
