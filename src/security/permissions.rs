//! Permission evaluation
//!
//! Standard POSIX owner/group/other checks with an optional ACL overlay.
//! A denying answer is a value, never an error.

use super::acl::{Acl, AclType};
use super::{GroupInfo, SecurityContext};
use crate::domain::Stat;
use tracing::{debug, trace};

/// Outcome of a permission query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied,
}

impl Access {
    pub fn is_allowed(self) -> bool {
        self == Access::Allowed
    }

    fn from_bits(granted: u32, requested: u32) -> Self {
        if granted & requested == requested {
            Access::Allowed
        } else {
            Access::Denied
        }
    }
}

/// Whether any non-banned group in the list has this gid
pub fn has_group(groups: &[GroupInfo], gid: u32) -> bool {
    groups.iter().any(|g| g.gid == gid && !g.is_banned())
}

/// Evaluate `requested` (an `R_OK | W_OK | X_OK` combination) for the
/// identity in `ctx` against a file's owner, mode and ACL.
pub fn check_permissions(ctx: &SecurityContext, acl: &Acl, stat: &Stat, requested: u32) -> Access {
    let requested = requested & 0o7;
    let uid = ctx.uid();

    if ctx.is_root() {
        return Access::Allowed;
    }

    let primary_banned = ctx.groups.first().map(GroupInfo::is_banned).unwrap_or(false);
    if ctx.user.is_banned() || primary_banned {
        debug!(user = %ctx.user.name, "banned user rejected");
        return Access::Denied;
    }

    if stat.uid == uid {
        return Access::from_bits((stat.mode >> 6) & 0o7, requested);
    }

    if acl.is_empty() {
        let bits = if has_group(&ctx.groups, stat.gid) {
            (stat.mode >> 3) & 0o7
        } else {
            stat.mode & 0o7
        };
        return Access::from_bits(bits, requested);
    }

    trace!(ino = stat.ino, acl = %acl, "evaluating ACL");

    let mask = acl.find(AclType::Mask).map(|e| u32::from(e.perm));

    if let Some(entry) = acl
        .entries()
        .iter()
        .find(|e| !e.default && e.kind == AclType::User && e.id == uid)
    {
        let granted = u32::from(entry.perm) & mask.unwrap_or(0o7);
        return Access::from_bits(granted, requested);
    }

    let mut granted = 0;
    let mut matched = false;

    if has_group(&ctx.groups, stat.gid) {
        if let Some(owner_group) = acl.find(AclType::GroupObj) {
            granted = u32::from(owner_group.perm);
            matched = true;
            if mask.is_none() {
                return Access::from_bits(granted, requested);
            }
        }
    }

    for entry in acl
        .entries()
        .iter()
        .filter(|e| !e.default && e.kind == AclType::Group)
    {
        if has_group(&ctx.groups, entry.id) {
            granted |= u32::from(entry.perm);
            matched = true;
        }
    }

    if matched {
        return Access::from_bits(granted & mask.unwrap_or(0o7), requested);
    }

    let other = acl
        .find(AclType::Other)
        .map(|e| u32::from(e.perm))
        .unwrap_or(stat.mode & 0o7);
    Access::from_bits(other, requested)
}
