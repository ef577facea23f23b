//! Security Model
//!
//! Turns raw client credentials into a resolved identity and answers
//! POSIX mode / ACL permission queries.
//!
//! - [`Credentials`]: transport-level identity material of one request
//! - [`SecurityContext`]: resolved user plus ordered groups
//! - [`acl`]: ACL entries, parsing and inheritance
//! - [`permissions`]: owner/group/other and ACL evaluation
//! - [`token`]: signed, time-limited access tokens

pub mod acl;
pub mod permissions;
pub mod token;

pub use acl::{Acl, AclEntry, AclType};
pub use permissions::{check_permissions, has_group, Access};
pub use token::{generate_token, validate_token, TokenStatus, GENERIC_USER};

use crate::domain::{Extensible, UserGroupDb};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

// =============================================================================
// Credentials
// =============================================================================

/// Identity material presented by a client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Authentication mechanism (x509, token, ...)
    pub mechanism: String,
    /// Client name or certificate subject
    pub client_name: String,
    pub remote_address: String,
    pub session_id: String,
    /// Group tags (VOMS-like FQANs). When empty, the user's own
    /// group memberships are used.
    pub fqans: Vec<String>,
}

impl Credentials {
    pub fn new(mechanism: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            mechanism: mechanism.into(),
            client_name: client_name.into(),
            ..Default::default()
        }
    }

    pub fn from_address(mut self, remote_address: impl Into<String>) -> Self {
        self.remote_address = remote_address.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_fqan(mut self, fqan: impl Into<String>) -> Self {
        self.fqans.push(fqan.into());
        self
    }
}

// =============================================================================
// Resolved identity
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub uid: u32,
    pub attrs: Extensible,
}

impl UserInfo {
    pub fn new(name: impl Into<String>, uid: u32) -> Self {
        Self {
            name: name.into(),
            uid,
            attrs: Extensible::new(),
        }
    }

    pub fn is_banned(&self) -> bool {
        self.attrs.get_bool("banned", false).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    pub gid: u32,
    pub attrs: Extensible,
}

impl GroupInfo {
    pub fn new(name: impl Into<String>, gid: u32) -> Self {
        Self {
            name: name.into(),
            gid,
            attrs: Extensible::new(),
        }
    }

    pub fn is_banned(&self) -> bool {
        self.attrs.get_bool("banned", false).unwrap_or(false)
    }
}

/// Uid of the unprivileged identity a default context carries
pub const NOBODY_UID: u32 = u32::MAX;

/// Identity a request runs as. Replaced wholesale, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub user: UserInfo,
    /// Primary group first
    pub groups: Vec<GroupInfo>,
    pub credentials: Credentials,
}

impl Default for SecurityContext {
    /// An unprivileged identity with no groups
    fn default() -> Self {
        Self {
            user: UserInfo::new("nobody", NOBODY_UID),
            groups: Vec::new(),
            credentials: Credentials::default(),
        }
    }
}

impl SecurityContext {
    /// Superuser context, used by administrative tools and tests
    pub fn root() -> Self {
        Self {
            user: UserInfo::new("root", 0),
            groups: vec![GroupInfo::new("root", 0)],
            credentials: Credentials::new("local", "root"),
        }
    }

    pub fn is_root(&self) -> bool {
        self.user.uid == 0
    }

    pub fn uid(&self) -> u32 {
        self.user.uid
    }

    /// Primary gid, 0 when the user has no group at all
    pub fn gid(&self) -> u32 {
        self.groups.first().map(|g| g.gid).unwrap_or(0)
    }

    pub fn gids(&self) -> Vec<u32> {
        self.groups.iter().map(|g| g.gid).collect()
    }
}

/// Resolve credentials into a security context through the user/group db
pub fn resolve_identity(db: &mut dyn UserGroupDb, credentials: &Credentials) -> Result<SecurityContext> {
    if credentials.client_name.trim().is_empty() {
        return Err(Error::authentication("credentials carry no client name"));
    }
    if credentials.fqans.iter().any(|f| f.trim().is_empty()) {
        return Err(Error::authentication("credentials carry an empty group tag"));
    }

    let user = db.get_user(&credentials.client_name)?;

    let groups = if credentials.fqans.is_empty() {
        db.get_groups_for_user(&user.name)?
    } else {
        credentials
            .fqans
            .iter()
            .map(|fqan| db.get_group(fqan))
            .collect::<Result<Vec<_>>>()?
    };

    debug!(
        user = %user.name,
        uid = user.uid,
        groups = groups.len(),
        "resolved security context"
    );

    Ok(SecurityContext {
        user,
        groups,
        credentials: credentials.clone(),
    })
}
