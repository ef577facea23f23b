//! Built-in Catalog
//!
//! Implements the path-addressed catalog on top of whatever INode stack the
//! plugin manager composes, and enforces permissions while doing so: search
//! permission on every traversed directory, write permission on parents
//! for namespace changes and ownership for metadata changes.

use crate::domain::inode::ROOT_PARENT;
use crate::domain::path::{absolute_path, parent_and_name, split_path};
use crate::domain::{
    Catalog, ExtendedStat, INode, Replica, Stat, R_OK, S_IFDIR, S_IFMT, S_IFREG, S_ISGID,
    S_ISVTX, W_OK, X_OK,
};
use crate::error::{ContractKind, Error, ErrorKind, Result};
use crate::registry::{BaseFactory, CatalogFactory, PluginManager};
use crate::security::{check_permissions, has_group, Acl, AclEntry, AclType, SecurityContext};
use crate::stack::StackHandle;
use std::sync::Arc;
use tracing::debug;

pub const PLUGIN_ID: &str = "builtin";

const DEFAULT_UMASK: u32 = 0o022;

// =============================================================================
// Factory
// =============================================================================

#[derive(Debug, Default)]
pub struct BuiltInCatalogFactory;

impl BuiltInCatalogFactory {
    pub fn new() -> Self {
        Self
    }
}

impl BaseFactory for BuiltInCatalogFactory {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn configure(&self, key: &str, _value: &str) -> Result<()> {
        Err(Error::unknown_option(key))
    }
}

impl CatalogFactory for BuiltInCatalogFactory {
    fn create_catalog(
        &self,
        manager: &PluginManager,
        _inner: Option<Box<dyn Catalog>>,
    ) -> Result<Box<dyn Catalog>> {
        let inode = match manager.create_inode() {
            Ok(inode) => Some(inode),
            Err(e) if e.kind() == ErrorKind::NoFactory => None,
            Err(e) => return Err(e),
        };
        Ok(Box::new(BuiltInCatalog::new(inode)))
    }
}

// =============================================================================
// Catalog
// =============================================================================

pub struct BuiltInCatalog {
    inode: Option<Box<dyn INode>>,
    security: Option<Arc<SecurityContext>>,
    cwd: String,
    umask: u32,
}

impl BuiltInCatalog {
    pub fn new(inode: Option<Box<dyn INode>>) -> Self {
        Self {
            inode,
            security: None,
            cwd: "/".to_string(),
            umask: DEFAULT_UMASK,
        }
    }

    fn inode(&mut self) -> Result<&mut dyn INode> {
        match self.inode.as_deref_mut() {
            Some(inode) => Ok(inode),
            None => Err(Error::no_factory(ContractKind::INode)),
        }
    }

    fn context(&self) -> Result<Arc<SecurityContext>> {
        self.security.clone().ok_or_else(Error::no_security_context)
    }

    fn absolute(&self, path: &str) -> String {
        absolute_path(&self.cwd, path)
    }

    /// Walk from the root, checking search permission on the way
    fn lookup(&mut self, abs: &str) -> Result<ExtendedStat> {
        let ctx = self.context()?;
        let inode = self.inode()?;

        let mut current = inode.extended_stat_child(ROOT_PARENT, "/")?;
        let mut walked = String::from("/");
        for name in split_path(abs) {
            if !current.stat.is_dir() {
                return Err(Error::not_a_directory(&walked));
            }
            if !check_permissions(&ctx, &current.acl, &current.stat, X_OK).is_allowed() {
                return Err(Error::permission_denied(format!(
                    "not enough permissions to traverse {}",
                    walked
                )));
            }
            current = match inode.extended_stat_child(current.stat.ino, &name) {
                Ok(entry) => entry,
                Err(e) if e.kind() == ErrorKind::FileNotFound => {
                    return Err(Error::file_not_found(abs))
                }
                Err(e) => return Err(e),
            };
            if !walked.ends_with('/') {
                walked.push('/');
            }
            walked.push_str(&name);
        }
        Ok(current)
    }

    fn require(&self, entry: &ExtendedStat, mode: u32, what: &str) -> Result<()> {
        let ctx = self.context()?;
        if check_permissions(&ctx, &entry.acl, &entry.stat, mode).is_allowed() {
            Ok(())
        } else {
            Err(Error::permission_denied(format!(
                "not enough permissions on {}",
                what
            )))
        }
    }

    fn require_owner(&self, entry: &ExtendedStat, what: &str) -> Result<()> {
        let ctx = self.context()?;
        if ctx.is_root() || ctx.uid() == entry.stat.uid {
            Ok(())
        } else {
            Err(Error::permission_denied(format!("only the owner can modify {}", what)))
        }
    }

    /// Parent directory entry and the last component of `abs`
    fn parent_of(&mut self, abs: &str) -> Result<(ExtendedStat, String)> {
        let (parent_path, name) = parent_and_name(abs);
        let name = name.ok_or_else(|| Error::invalid_argument("the root has no parent"))?;
        let parent = self.lookup(&parent_path)?;
        if !parent.stat.is_dir() {
            return Err(Error::not_a_directory(&parent_path));
        }
        Ok((parent, name))
    }

    fn new_entry(&mut self, path: &str, kind: u32, mode: u32) -> Result<ExtendedStat> {
        let abs = self.absolute(path);
        let ctx = self.context()?;
        let (parent, name) = self.parent_of(&abs)?;
        self.require(&parent, W_OK | X_OK, &abs)?;

        match self.inode()?.extended_stat_child(parent.stat.ino, &name) {
            Ok(_) => return Err(Error::exists(&abs)),
            Err(e) if e.kind() == ErrorKind::FileNotFound => {}
            Err(e) => return Err(e),
        }

        let setgid = parent.stat.mode & S_ISGID != 0;
        let gid = if setgid { parent.stat.gid } else { ctx.gid() };

        let mut file_mode;
        let acl = if parent.acl.has_defaults() {
            // default entries replace the umask
            file_mode = kind | (mode & 0o7777);
            parent.acl.inherit(ctx.uid(), gid, mode, &mut file_mode)
        } else {
            file_mode = kind | (mode & !self.umask & 0o7777);
            Acl::default()
        };
        if setgid && kind == S_IFDIR {
            file_mode |= S_ISGID;
        }

        let template = ExtendedStat {
            parent: parent.stat.ino,
            name,
            stat: Stat {
                mode: file_mode,
                nlink: 1,
                uid: ctx.uid(),
                gid,
                ..Default::default()
            },
            acl,
            ..Default::default()
        };
        let created = self.inode()?.create(&template)?;
        debug!(path = %abs, ino = created.stat.ino, mode = format!("{:o}", file_mode), "entry created");
        Ok(created)
    }

    /// Entry about to be removed from its parent, after parent and sticky
    /// bit checks
    fn removable(&mut self, abs: &str) -> Result<ExtendedStat> {
        let ctx = self.context()?;
        let (parent, name) = self.parent_of(abs)?;
        self.require(&parent, W_OK | X_OK, abs)?;

        let entry = match self.inode()?.extended_stat_child(parent.stat.ino, &name) {
            Ok(entry) => entry,
            Err(e) if e.kind() == ErrorKind::FileNotFound => return Err(Error::file_not_found(abs)),
            Err(e) => return Err(e),
        };

        if parent.stat.mode & S_ISVTX != 0
            && !ctx.is_root()
            && ctx.uid() != parent.stat.uid
            && ctx.uid() != entry.stat.uid
        {
            return Err(Error::permission_denied(format!(
                "sticky bit set on the parent of {}",
                abs
            )));
        }
        Ok(entry)
    }

    fn replica_file(&mut self, replica: &Replica) -> Result<ExtendedStat> {
        let entry = self.inode()?.extended_stat(replica.file_id)?;
        self.require(&entry, W_OK, &format!("inode {}", replica.file_id))?;
        Ok(entry)
    }
}

/// Permission bits of an ACL'd entry: owner, group class (mask when present)
/// and other
fn mode_from_acl(acl: &Acl, mode: u32) -> u32 {
    let perm = |kind| acl.find(kind).map(|e| u32::from(e.perm));
    let owner = perm(AclType::UserObj).unwrap_or((mode >> 6) & 7);
    let group = perm(AclType::Mask)
        .or_else(|| perm(AclType::GroupObj))
        .unwrap_or((mode >> 3) & 7);
    let other = perm(AclType::Other).unwrap_or(mode & 7);
    (mode & !0o777) | (owner << 6) | (group << 3) | other
}

/// Rewrite the base ACL entries to follow a chmod
fn acl_from_mode(acl: &Acl, mode: u32) -> Acl {
    let has_mask = acl.find(AclType::Mask).is_some();
    let entries = acl
        .entries()
        .iter()
        .map(|e| {
            if e.default {
                return *e;
            }
            let perm = match e.kind {
                AclType::UserObj => Some((mode >> 6) & 7),
                AclType::Mask => Some((mode >> 3) & 7),
                AclType::GroupObj if !has_mask => Some((mode >> 3) & 7),
                AclType::Other => Some(mode & 7),
                _ => None,
            };
            match perm {
                Some(perm) => AclEntry {
                    perm: perm as u8,
                    ..*e
                },
                None => *e,
            }
        })
        .collect();
    Acl::new(entries)
}

impl Catalog for BuiltInCatalog {
    fn impl_id(&self) -> String {
        "BuiltInCatalog".into()
    }

    fn set_security_context(&mut self, ctx: &Arc<SecurityContext>) -> Result<()> {
        self.security = Some(Arc::clone(ctx));
        match self.inode.as_deref_mut() {
            Some(inode) => inode.set_security_context(ctx),
            None => Ok(()),
        }
    }

    fn set_stack_instance(&mut self, stack: &StackHandle) -> Result<()> {
        match self.inode.as_deref_mut() {
            Some(inode) => inode.set_stack_instance(stack),
            None => Ok(()),
        }
    }

    fn change_dir(&mut self, path: &str) -> Result<()> {
        let abs = self.absolute(path);
        let entry = self.lookup(&abs)?;
        if !entry.stat.is_dir() {
            return Err(Error::not_a_directory(&abs));
        }
        self.require(&entry, X_OK, &abs)?;
        self.cwd = abs;
        Ok(())
    }

    fn working_dir(&mut self) -> Result<String> {
        Ok(self.cwd.clone())
    }

    fn umask(&mut self, mask: u32) -> Result<u32> {
        let previous = self.umask;
        self.umask = mask & 0o777;
        Ok(previous)
    }

    fn extended_stat(&mut self, path: &str) -> Result<ExtendedStat> {
        let abs = self.absolute(path);
        self.lookup(&abs)
    }

    fn access(&mut self, path: &str, mode: u32) -> Result<bool> {
        let abs = self.absolute(path);
        let entry = self.lookup(&abs)?;
        if mode & 0o7 == 0 {
            return Ok(true);
        }
        let ctx = self.context()?;
        Ok(check_permissions(&ctx, &entry.acl, &entry.stat, mode).is_allowed())
    }

    fn set_mode(&mut self, path: &str, mode: u32) -> Result<()> {
        let abs = self.absolute(path);
        let entry = self.lookup(&abs)?;
        self.require_owner(&entry, &abs)?;

        let ctx = self.context()?;
        let mut mode = mode & 0o7777;
        if !ctx.is_root() && !has_group(&ctx.groups, entry.stat.gid) {
            mode &= !S_ISGID;
        }
        let acl = if entry.acl.is_empty() {
            Acl::default()
        } else {
            acl_from_mode(&entry.acl, mode)
        };
        self.inode()?
            .set_mode(entry.stat.ino, entry.stat.uid, entry.stat.gid, mode, &acl)
    }

    fn set_owner(&mut self, path: &str, uid: u32, gid: u32) -> Result<()> {
        let abs = self.absolute(path);
        let entry = self.lookup(&abs)?;
        let ctx = self.context()?;

        if !ctx.is_root() {
            if uid != entry.stat.uid {
                return Err(Error::permission_denied("only root can change the owner"));
            }
            if ctx.uid() != entry.stat.uid {
                return Err(Error::permission_denied(format!(
                    "only the owner can change the group of {}",
                    abs
                )));
            }
            if gid != entry.stat.gid && !has_group(&ctx.groups, gid) {
                return Err(Error::permission_denied(format!(
                    "user is not a member of group {}",
                    gid
                )));
            }
        }

        self.inode()?
            .set_mode(entry.stat.ino, uid, gid, entry.stat.mode & 0o7777, &entry.acl)
    }

    fn set_size(&mut self, path: &str, size: u64) -> Result<()> {
        let abs = self.absolute(path);
        let entry = self.lookup(&abs)?;
        if entry.stat.is_dir() {
            return Err(Error::is_a_directory(&abs));
        }
        let ctx = self.context()?;
        if ctx.uid() != entry.stat.uid {
            self.require(&entry, W_OK, &abs)?;
        }
        self.inode()?.set_size(entry.stat.ino, size)
    }

    fn set_acl(&mut self, path: &str, acl: &Acl) -> Result<()> {
        let abs = self.absolute(path);
        let entry = self.lookup(&abs)?;
        self.require_owner(&entry, &abs)?;
        acl.validate()?;
        if acl.has_defaults() && !entry.stat.is_dir() {
            return Err(Error::invalid_acl("default entries are only allowed on directories"));
        }

        let mode = mode_from_acl(acl, entry.stat.mode & 0o7777);
        self.inode()?
            .set_mode(entry.stat.ino, entry.stat.uid, entry.stat.gid, mode, acl)
    }

    fn get_replicas(&mut self, path: &str) -> Result<Vec<Replica>> {
        let abs = self.absolute(path);
        let entry = self.lookup(&abs)?;
        if entry.stat.is_dir() {
            return Err(Error::is_a_directory(&abs));
        }
        self.require(&entry, R_OK, &abs)?;
        self.inode()?.get_replicas(entry.stat.ino)
    }

    fn add_replica(&mut self, replica: &Replica) -> Result<()> {
        self.replica_file(replica)?;
        self.inode()?.add_replica(replica)
    }

    fn delete_replica(&mut self, replica: &Replica) -> Result<()> {
        self.replica_file(replica)?;
        self.inode()?.delete_replica(replica)
    }

    fn update_replica(&mut self, replica: &Replica) -> Result<()> {
        self.replica_file(replica)?;
        self.inode()?.update_replica(replica)
    }

    fn create(&mut self, path: &str, mode: u32) -> Result<()> {
        self.new_entry(path, S_IFREG, mode).map(|_| ())
    }

    fn make_dir(&mut self, path: &str, mode: u32) -> Result<()> {
        self.new_entry(path, S_IFDIR, mode).map(|_| ())
    }

    fn unlink(&mut self, path: &str) -> Result<()> {
        let abs = self.absolute(path);
        let entry = self.removable(&abs)?;
        if entry.stat.mode & S_IFMT == S_IFDIR {
            return Err(Error::is_a_directory(&abs));
        }
        self.inode()?.unlink(entry.stat.ino)?;
        debug!(path = %abs, "unlinked");
        Ok(())
    }

    fn remove_dir(&mut self, path: &str) -> Result<()> {
        let abs = self.absolute(path);
        if abs == "/" {
            return Err(Error::invalid_argument("the root directory cannot be removed"));
        }
        let entry = self.removable(&abs)?;
        if !entry.stat.is_dir() {
            return Err(Error::not_a_directory(&abs));
        }
        self.inode()?.unlink(entry.stat.ino)?;
        debug!(path = %abs, "directory removed");
        Ok(())
    }

    fn read_dir(&mut self, path: &str) -> Result<Vec<ExtendedStat>> {
        let abs = self.absolute(path);
        let entry = self.lookup(&abs)?;
        if !entry.stat.is_dir() {
            return Err(Error::not_a_directory(&abs));
        }
        self.require(&entry, R_OK | X_OK, &abs)?;
        self.inode()?.read_dir(entry.stat.ino)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::{memory_manager, root_stack, stack_as};
    use assert_matches::assert_matches;

    fn kind<T>(result: Result<T>) -> Option<ErrorKind> {
        result.err().map(|e| e.kind())
    }

    #[test]
    fn test_without_inode_stack() {
        let mut catalog = BuiltInCatalog::new(None);
        catalog
            .set_security_context(&Arc::new(SecurityContext::root()))
            .unwrap();
        assert_eq!(kind(catalog.extended_stat("/")), Some(ErrorKind::NoFactory));
        assert_eq!(catalog.working_dir().unwrap(), "/");
    }

    #[test]
    fn test_requires_security_context() {
        let manager = Arc::new(memory_manager());
        let mut stack = crate::stack::StackInstance::new(manager).unwrap();
        assert_eq!(
            kind(stack.catalog().unwrap().extended_stat("/")),
            Some(ErrorKind::NoSecurityContext)
        );
    }

    #[test]
    fn test_create_and_stat() {
        let manager = Arc::new(memory_manager());
        let mut root = root_stack(&manager);
        let catalog = root.catalog().unwrap();
        catalog.make_dir("/home", 0o755).unwrap();
        catalog.make_dir("home/alice", 0o777).unwrap();
        catalog.set_owner("/home/alice", 1001, 200).unwrap();

        let mut alice = stack_as(&manager, "alice");
        let catalog = alice.catalog().unwrap();
        catalog.change_dir("/home/alice").unwrap();
        catalog.create("notes", 0o666).unwrap();

        let stat = catalog.stat("notes").unwrap();
        assert!(stat.is_file());
        assert_eq!(stat.perm(), 0o644);
        assert_eq!((stat.uid, stat.gid), (1001, 200));

        assert_eq!(kind(catalog.create("notes", 0o644)), Some(ErrorKind::Exists));
        assert_eq!(
            catalog.read_dir("/home/alice").unwrap()[0].name,
            "notes".to_string()
        );
        assert_eq!(kind(catalog.read_dir("notes")), Some(ErrorKind::NotADirectory));
    }

    #[test]
    fn test_umask() {
        let manager = Arc::new(memory_manager());
        let mut root = root_stack(&manager);
        let catalog = root.catalog().unwrap();
        assert_eq!(catalog.umask(0o077).unwrap(), DEFAULT_UMASK);
        catalog.create("/private", 0o666).unwrap();
        assert_eq!(catalog.stat("/private").unwrap().perm(), 0o600);
    }

    #[test]
    fn test_traversal_needs_search_permission() {
        let manager = Arc::new(memory_manager());
        let mut root = root_stack(&manager);
        let catalog = root.catalog().unwrap();
        catalog.make_dir("/vault", 0o700).unwrap();
        catalog.create("/vault/secret", 0o644).unwrap();

        let mut bob = stack_as(&manager, "bob");
        let catalog = bob.catalog().unwrap();
        assert_eq!(
            kind(catalog.extended_stat("/vault/secret")),
            Some(ErrorKind::PermissionDenied)
        );
        assert_eq!(kind(catalog.create("/vault/mine", 0o644)), Some(ErrorKind::PermissionDenied));
        assert_eq!(kind(catalog.extended_stat("/nowhere")), Some(ErrorKind::FileNotFound));
        assert!(!catalog.access("/vault", R_OK).unwrap());
        assert!(catalog.access("/vault", 0).unwrap());
    }

    #[test]
    fn test_default_acl_inheritance() {
        let manager = Arc::new(memory_manager());
        let mut root = root_stack(&manager);
        let catalog = root.catalog().unwrap();
        catalog.make_dir("/shared", 0o777).unwrap();
        let acl: Acl = "A70,C70,F50,a70,c50,d7200,e70,f00".parse().unwrap();
        catalog.set_acl("/shared", &acl).unwrap();

        catalog.create("/shared/f", 0o666).unwrap();
        let entry = catalog.extended_stat("/shared/f").unwrap();
        assert_eq!(entry.stat.perm(), 0o640);
        assert!(entry.acl.find(AclType::Group).is_some());

        // named group 200 may write through the inherited entry
        let mut alice = stack_as(&manager, "alice");
        assert!(alice.catalog().unwrap().access("/shared/f", W_OK).unwrap());
        let mut bob = stack_as(&manager, "bob");
        assert!(!bob.catalog().unwrap().access("/shared/f", R_OK).unwrap());
    }

    #[test]
    fn test_sticky_directory() {
        let manager = Arc::new(memory_manager());
        let mut root = root_stack(&manager);
        let catalog = root.catalog().unwrap();
        catalog.make_dir("/tmp", 0o777).unwrap();
        catalog.set_mode("/tmp", S_ISVTX | 0o777).unwrap();

        let mut alice = stack_as(&manager, "alice");
        alice.catalog().unwrap().create("/tmp/a", 0o666).unwrap();

        let mut bob = stack_as(&manager, "bob");
        assert_eq!(
            kind(bob.catalog().unwrap().unlink("/tmp/a")),
            Some(ErrorKind::PermissionDenied)
        );
        alice.catalog().unwrap().unlink("/tmp/a").unwrap();
        assert_eq!(
            kind(alice.catalog().unwrap().stat("/tmp/a")),
            Some(ErrorKind::FileNotFound)
        );
    }

    #[test]
    fn test_ownership_changes() {
        let manager = Arc::new(memory_manager());
        let mut root = root_stack(&manager);
        let catalog = root.catalog().unwrap();
        catalog.create("/f", 0o644).unwrap();
        catalog.set_owner("/f", 1001, 200).unwrap();

        let mut alice = stack_as(&manager, "alice");
        let catalog = alice.catalog().unwrap();
        catalog.set_owner("/f", 1001, 300).unwrap();
        assert_eq!(catalog.stat("/f").unwrap().gid, 300);
        assert_matches!(
            catalog.set_owner("/f", 1002, 300).map_err(|e| e.kind()),
            Err(ErrorKind::PermissionDenied)
        );
        assert_matches!(
            catalog.set_owner("/f", 1001, 999).map_err(|e| e.kind()),
            Err(ErrorKind::PermissionDenied)
        );

        catalog.set_mode("/f", 0o600).unwrap();
        catalog.set_size("/f", 4096).unwrap();
        let stat = catalog.stat("/f").unwrap();
        assert_eq!((stat.perm(), stat.size), (0o600, 4096));

        let mut bob = stack_as(&manager, "bob");
        assert_matches!(
            bob.catalog().unwrap().set_mode("/f", 0o666).map_err(|e| e.kind()),
            Err(ErrorKind::PermissionDenied)
        );
    }

    #[test]
    fn test_remove_dir() {
        let manager = Arc::new(memory_manager());
        let mut root = root_stack(&manager);
        let catalog = root.catalog().unwrap();
        catalog.make_dir("/d", 0o755).unwrap();
        catalog.create("/d/f", 0o644).unwrap();

        assert_eq!(kind(catalog.remove_dir("/d")), Some(ErrorKind::NotEmpty));
        assert_eq!(kind(catalog.unlink("/d")), Some(ErrorKind::IsADirectory));
        assert_eq!(kind(catalog.remove_dir("/d/f")), Some(ErrorKind::NotADirectory));
        catalog.unlink("/d/f").unwrap();
        catalog.remove_dir("/d").unwrap();
        assert_eq!(kind(catalog.remove_dir("/")), Some(ErrorKind::InvalidArgument));
    }
}
