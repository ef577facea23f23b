//! In-memory namespace
//!
//! Inodes keyed by number, a `(parent, name)` index for lookups and the
//! replica table. Shared by every MemoryINode created from one factory.

use crate::domain::inode::{INode, ROOT_PARENT};
use crate::domain::{ExtendedStat, Replica, Stat, S_IFDIR, S_IFMT};
use crate::error::{Error, Result};
use crate::security::Acl;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

pub const ROOT_INO: u64 = 1;

#[derive(Debug)]
pub struct Namespace {
    entries: HashMap<u64, ExtendedStat>,
    children: BTreeMap<(u64, String), u64>,
    replicas: BTreeMap<i64, Replica>,
    next_ino: u64,
    next_replica: i64,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(ino: u64) -> Error {
    Error::file_not_found(&format!("inode {}", ino))
}

impl Namespace {
    /// Namespace holding only the root directory
    pub fn new() -> Self {
        let now = Utc::now().timestamp();
        let root = ExtendedStat {
            parent: ROOT_PARENT,
            name: "/".to_string(),
            stat: Stat {
                ino: ROOT_INO,
                mode: S_IFDIR | 0o755,
                nlink: 1,
                atime: now,
                mtime: now,
                ctime: now,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut entries = HashMap::new();
        entries.insert(ROOT_INO, root);
        let mut children = BTreeMap::new();
        children.insert((ROOT_PARENT, "/".to_string()), ROOT_INO);

        Self {
            entries,
            children,
            replicas: BTreeMap::new(),
            next_ino: ROOT_INO + 1,
            next_replica: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, ino: u64) -> Result<&mut ExtendedStat> {
        self.entries.get_mut(&ino).ok_or_else(|| missing(ino))
    }

    fn has_children(&self, ino: u64) -> bool {
        self.children
            .range((ino, String::new())..)
            .next()
            .map(|((parent, _), _)| *parent == ino)
            .unwrap_or(false)
    }

    pub fn create(&mut self, template: &ExtendedStat) -> Result<ExtendedStat> {
        let parent = self
            .entries
            .get(&template.parent)
            .ok_or_else(|| missing(template.parent))?;
        if !parent.stat.is_dir() {
            return Err(Error::not_a_directory(&parent.name));
        }
        if template.name.is_empty() || template.name.contains('/') {
            return Err(Error::invalid_argument(format!(
                "invalid entry name '{}'",
                template.name
            )));
        }
        let key = (template.parent, template.name.clone());
        if self.children.contains_key(&key) {
            return Err(Error::exists(&template.name));
        }

        let now = Utc::now().timestamp();
        let ino = self.next_ino;
        self.next_ino += 1;

        let mut entry = template.clone();
        entry.stat.ino = ino;
        entry.stat.size = 0;
        entry.stat.nlink = 1;
        entry.stat.atime = now;
        entry.stat.mtime = now;
        entry.stat.ctime = now;

        self.children.insert(key, ino);
        self.entries.insert(ino, entry.clone());
        self.entry_mut(template.parent)?.stat.mtime = now;
        Ok(entry)
    }

    pub fn get(&self, ino: u64) -> Result<ExtendedStat> {
        self.entries.get(&ino).cloned().ok_or_else(|| missing(ino))
    }

    pub fn child(&self, parent: u64, name: &str) -> Result<ExtendedStat> {
        let ino = self
            .children
            .get(&(parent, name.to_string()))
            .ok_or_else(|| Error::file_not_found(name))?;
        self.get(*ino)
    }

    /// Remove an inode. Directories must be empty; replicas go with the file.
    pub fn unlink(&mut self, ino: u64) -> Result<()> {
        if ino == ROOT_INO {
            return Err(Error::invalid_argument("the root inode cannot be removed"));
        }
        let entry = self.get(ino)?;
        if entry.stat.is_dir() && self.has_children(ino) {
            return Err(Error::not_empty(&entry.name));
        }

        self.children.remove(&(entry.parent, entry.name.clone()));
        self.entries.remove(&ino);
        self.replicas.retain(|_, r| r.file_id != ino);
        if let Ok(parent) = self.entry_mut(entry.parent) {
            parent.stat.mtime = Utc::now().timestamp();
        }
        Ok(())
    }

    /// Children of a directory, ordered by name
    pub fn read_dir(&self, ino: u64) -> Result<Vec<ExtendedStat>> {
        let dir = self.get(ino)?;
        if !dir.stat.is_dir() {
            return Err(Error::not_a_directory(&dir.name));
        }
        self.children
            .range((ino, String::new())..)
            .take_while(|((parent, _), _)| *parent == ino)
            .map(|(_, child)| self.get(*child))
            .collect()
    }

    pub fn replicas_of(&self, ino: u64) -> Result<Vec<Replica>> {
        self.get(ino)?;
        Ok(self
            .replicas
            .values()
            .filter(|r| r.file_id == ino)
            .cloned()
            .collect())
    }

    pub fn replica(&self, replica_id: i64) -> Result<Replica> {
        self.replicas
            .get(&replica_id)
            .cloned()
            .ok_or_else(|| Error::no_such_replica(format!("replica {} not found", replica_id)))
    }

    /// Store a replica, assigning an id when it has none. Returns the id.
    pub fn add_replica(&mut self, replica: &Replica) -> Result<i64> {
        let file = self.get(replica.file_id)?;
        if file.stat.is_dir() {
            return Err(Error::is_a_directory(&file.name));
        }
        if self
            .replicas
            .values()
            .any(|r| r.file_id == replica.file_id && r.rfn == replica.rfn)
        {
            return Err(Error::exists(&replica.rfn));
        }

        let mut stored = replica.clone();
        if stored.replica_id == 0 {
            stored.replica_id = self.next_replica;
        } else if self.replicas.contains_key(&stored.replica_id) {
            return Err(Error::exists(&format!("replica {}", stored.replica_id)));
        }
        self.next_replica = self.next_replica.max(stored.replica_id + 1);

        let id = stored.replica_id;
        self.replicas.insert(id, stored);
        Ok(id)
    }

    pub fn delete_replica(&mut self, replica_id: i64) -> Result<()> {
        self.replicas
            .remove(&replica_id)
            .map(|_| ())
            .ok_or_else(|| Error::no_such_replica(format!("replica {} not found", replica_id)))
    }

    pub fn update_replica(&mut self, replica: &Replica) -> Result<()> {
        match self.replicas.get_mut(&replica.replica_id) {
            Some(stored) => {
                *stored = replica.clone();
                Ok(())
            }
            None => Err(Error::no_such_replica(format!(
                "replica {} not found",
                replica.replica_id
            ))),
        }
    }

    /// Ownership, permission bits and ACL. The file type bits never change.
    pub fn set_mode(&mut self, ino: u64, uid: u32, gid: u32, mode: u32, acl: &Acl) -> Result<()> {
        let entry = self.entry_mut(ino)?;
        entry.stat.uid = uid;
        entry.stat.gid = gid;
        entry.stat.mode = (entry.stat.mode & S_IFMT) | (mode & 0o7777);
        entry.stat.ctime = Utc::now().timestamp();
        entry.acl = acl.clone();
        Ok(())
    }

    pub fn set_size(&mut self, ino: u64, size: u64) -> Result<()> {
        let entry = self.entry_mut(ino)?;
        entry.stat.size = size;
        entry.stat.mtime = Utc::now().timestamp();
        Ok(())
    }
}

// =============================================================================
// INode node
// =============================================================================

pub struct MemoryINode {
    namespace: Arc<RwLock<Namespace>>,
}

impl MemoryINode {
    pub fn new(namespace: Arc<RwLock<Namespace>>) -> Self {
        Self { namespace }
    }
}

impl INode for MemoryINode {
    fn impl_id(&self) -> String {
        "MemoryINode".into()
    }

    fn create(&mut self, entry: &ExtendedStat) -> Result<ExtendedStat> {
        let created = self.namespace.write().create(entry)?;
        debug!(ino = created.stat.ino, parent = created.parent, name = %created.name, "inode created");
        Ok(created)
    }

    fn extended_stat(&mut self, ino: u64) -> Result<ExtendedStat> {
        self.namespace.read().get(ino)
    }

    fn extended_stat_child(&mut self, parent: u64, name: &str) -> Result<ExtendedStat> {
        self.namespace.read().child(parent, name)
    }

    fn unlink(&mut self, ino: u64) -> Result<()> {
        self.namespace.write().unlink(ino)
    }

    fn read_dir(&mut self, ino: u64) -> Result<Vec<ExtendedStat>> {
        self.namespace.read().read_dir(ino)
    }

    fn get_replicas(&mut self, ino: u64) -> Result<Vec<Replica>> {
        self.namespace.read().replicas_of(ino)
    }

    fn get_replica(&mut self, replica_id: i64) -> Result<Replica> {
        self.namespace.read().replica(replica_id)
    }

    fn add_replica(&mut self, replica: &Replica) -> Result<()> {
        let id = self.namespace.write().add_replica(replica)?;
        debug!(replica_id = id, file_id = replica.file_id, pool = %replica.pool, "replica added");
        Ok(())
    }

    fn delete_replica(&mut self, replica: &Replica) -> Result<()> {
        self.namespace.write().delete_replica(replica.replica_id)
    }

    fn update_replica(&mut self, replica: &Replica) -> Result<()> {
        self.namespace.write().update_replica(replica)
    }

    fn set_mode(&mut self, ino: u64, uid: u32, gid: u32, mode: u32, acl: &Acl) -> Result<()> {
        self.namespace.write().set_mode(ino, uid, gid, mode, acl)
    }

    fn set_size(&mut self, ino: u64, size: u64) -> Result<()> {
        self.namespace.write().set_size(ino, size)
    }
}
