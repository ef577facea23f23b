//! Access Control Lists
//!
//! Compact textual form: comma separated `<type><perm><id>` entries where the
//! type character is `'@' + type` (so `A` is USER_OBJ, `B` USER, ...), the
//! permission is one octal digit and the id is decimal.

use crate::domain::types::S_IFDIR;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Flag or-ed onto an entry type to mark it as a default (inherited) entry
pub const ACL_DEFAULT: u8 = 0x20;

// =============================================================================
// Entry type
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AclType {
    UserObj = 1,
    User = 2,
    GroupObj = 3,
    Group = 4,
    Mask = 5,
    Other = 6,
}

impl AclType {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(AclType::UserObj),
            2 => Some(AclType::User),
            3 => Some(AclType::GroupObj),
            4 => Some(AclType::Group),
            5 => Some(AclType::Mask),
            6 => Some(AclType::Other),
            _ => None,
        }
    }
}

/// One ACL entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AclEntry {
    pub kind: AclType,
    pub default: bool,
    pub perm: u8,
    pub id: u32,
}

impl AclEntry {
    pub fn new(kind: AclType, perm: u8, id: u32) -> Self {
        Self {
            kind,
            default: false,
            perm,
            id,
        }
    }

    pub fn default_entry(kind: AclType, perm: u8, id: u32) -> Self {
        Self {
            kind,
            default: true,
            perm,
            id,
        }
    }

    /// Raw type byte, default flag included
    pub fn raw_type(&self) -> u8 {
        let base = self.kind as u8;
        if self.default {
            base | ACL_DEFAULT
        } else {
            base
        }
    }

    fn sort_key(&self) -> (u8, u32) {
        (self.raw_type(), self.id)
    }
}

// =============================================================================
// Acl
// =============================================================================

/// Ordered list of ACL entries. Empty means "plain POSIX mode".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Acl {
    entries: Vec<AclEntry>,
}

impl Acl {
    pub fn new(mut entries: Vec<AclEntry>) -> Self {
        entries.sort_by_key(AclEntry::sort_key);
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    /// First non-default entry of the given type
    pub fn find(&self, kind: AclType) -> Option<&AclEntry> {
        self.entries.iter().find(|e| e.kind == kind && !e.default)
    }

    pub fn find_default(&self, kind: AclType) -> Option<&AclEntry> {
        self.entries.iter().find(|e| e.kind == kind && e.default)
    }

    pub fn has_defaults(&self) -> bool {
        self.entries.iter().any(|e| e.default)
    }

    /// Check the structural rules of an ACL
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }

        let count = |kind: AclType, default: bool| {
            self.entries
                .iter()
                .filter(|e| e.kind == kind && e.default == default)
                .count()
        };

        for (i, entry) in self.entries.iter().enumerate() {
            if entry.perm > 7 {
                return Err(Error::invalid_acl(format!(
                    "invalid permission: {}",
                    entry.perm
                )));
            }
            if i > 0 && self.entries[i - 1].sort_key() == entry.sort_key() {
                return Err(Error::invalid_acl(format!(
                    "duplicated entry: {}{}",
                    (b'@' + entry.raw_type()) as char,
                    entry.id
                )));
            }
        }

        if count(AclType::UserObj, false) != 1
            || count(AclType::GroupObj, false) != 1
            || count(AclType::Other, false) != 1
        {
            return Err(Error::invalid_acl(
                "there must be one and only one of each type USER_OBJ, GROUP_OBJ, OTHER",
            ));
        }

        if (count(AclType::User, false) > 0 || count(AclType::Group, false) > 0)
            && count(AclType::Mask, false) != 1
        {
            return Err(Error::invalid_acl(
                "a MASK entry is required when USER or GROUP entries exist",
            ));
        }

        if self.has_defaults() {
            if count(AclType::UserObj, true) != 1
                || count(AclType::GroupObj, true) != 1
                || count(AclType::Other, true) != 1
            {
                return Err(Error::invalid_acl(
                    "default entries need exactly one DEF_USER_OBJ, DEF_GROUP_OBJ and DEF_OTHER",
                ));
            }
            if (count(AclType::User, true) > 0 || count(AclType::Group, true) > 0)
                && count(AclType::Mask, true) != 1
            {
                return Err(Error::invalid_acl(
                    "a default MASK entry is required when default USER or GROUP entries exist",
                ));
            }
        }

        Ok(())
    }

    /// Derive the ACL of a new entry created under a directory carrying `self`.
    ///
    /// `file_mode` holds the type bits and requested permission bits on input
    /// and the effective mode on output.
    pub fn inherit(&self, uid: u32, gid: u32, create_mode: u32, file_mode: &mut u32) -> Acl {
        let is_dir = *file_mode & S_IFDIR == S_IFDIR;
        let apply = |mode: &mut u32, shift: u32, perm: u8| {
            let bits = 0o7 << shift;
            *mode = (*mode & !bits) | (create_mode & (u32::from(perm) << shift));
        };

        let mut inherited = Vec::new();
        let carries_acl = self.find_default(AclType::Mask).is_some() || is_dir;

        for entry in self.entries.iter().filter(|e| e.default) {
            match entry.kind {
                AclType::UserObj => apply(file_mode, 6, entry.perm),
                AclType::GroupObj => apply(file_mode, 3, entry.perm),
                AclType::Other => apply(file_mode, 0, entry.perm),
                _ => {}
            }
            if !carries_acl {
                continue;
            }

            let (id, perm) = match entry.kind {
                AclType::UserObj => (uid, entry.perm & ((create_mode >> 6) & 7) as u8),
                AclType::GroupObj => (gid, entry.perm & ((create_mode >> 3) & 7) as u8),
                AclType::Other => (entry.id, entry.perm & (create_mode & 7) as u8),
                _ => (entry.id, entry.perm),
            };
            inherited.push(AclEntry::new(entry.kind, perm, id));
            if is_dir {
                inherited.push(*entry);
            }
        }

        Acl::new(inherited)
    }
}

impl FromStr for Acl {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for raw in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let mut chars = raw.chars();
            let type_char = chars.next().ok_or_else(|| Error::invalid_acl("empty entry"))?;
            let perm_char = chars
                .next()
                .ok_or_else(|| Error::invalid_acl(format!("entry '{}' has no permission", raw)))?;

            let raw_type = (type_char as u32)
                .checked_sub('@' as u32)
                .filter(|t| *t <= u32::from(u8::MAX))
                .map(|t| t as u8)
                .ok_or_else(|| Error::invalid_acl(format!("invalid ACL type: {}", type_char)))?;
            let kind = AclType::from_raw(raw_type & !ACL_DEFAULT)
                .ok_or_else(|| Error::invalid_acl(format!("invalid ACL type: {}", type_char)))?;
            let perm = perm_char
                .to_digit(8)
                .ok_or_else(|| Error::invalid_acl(format!("invalid permission: {}", perm_char)))?
                as u8;
            let id_text = chars.as_str();
            let id = if id_text.is_empty() {
                0
            } else {
                id_text
                    .parse()
                    .map_err(|_| Error::invalid_acl(format!("invalid id in entry '{}'", raw)))?
            };

            entries.push(AclEntry {
                kind,
                default: raw_type & ACL_DEFAULT != 0,
                perm,
                id,
            });
        }
        Ok(Acl::new(entries))
    }
}

impl TryFrom<String> for Acl {
    type Error = Error;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<Acl> for String {
    fn from(acl: Acl) -> Self {
        acl.to_string()
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(
                f,
                "{}{}{}",
                (b'@' + entry.raw_type()) as char,
                entry.perm,
                entry.id
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_and_display() {
        let acl: Acl = "A61,B62,C41,E40,F00".parse().unwrap();
        assert_eq!(acl.entries().len(), 5);
        assert_eq!(acl.find(AclType::User).unwrap().id, 2);
        assert_eq!(acl.find(AclType::Mask).unwrap().perm, 4);
        assert_eq!(acl.to_string(), "A61,B62,C41,E40,F00");
        acl.validate().unwrap();
    }

    #[test]
    fn test_malformed_text() {
        for text in ["Z61", "A9", "A", "B6x"] {
            assert_matches!(
                text.parse::<Acl>().map_err(|e| e.kind()),
                Err(ErrorKind::InvalidAcl),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_validate_requires_mask() {
        let acl: Acl = "A60,B62,C40,F00".parse().unwrap();
        assert_matches!(acl.validate().map_err(|e| e.kind()), Err(ErrorKind::InvalidAcl));

        let missing_other: Acl = "A60,C40".parse().unwrap();
        assert!(missing_other.validate().is_err());

        let duplicated: Acl = "A60,B62,B72,C40,E70,F00".parse().unwrap();
        assert!(duplicated.validate().is_err());
    }

    #[test]
    fn test_inherit_for_file() {
        // Default entries only: d:user_obj rw, d:group_obj r, d:other none
        let parent: Acl = "A70,C50,F50,a60,c40,f00".parse().unwrap();
        let mut mode = crate::domain::types::S_IFREG | 0o666;
        let acl = parent.inherit(1001, 200, 0o666, &mut mode);

        assert_eq!(mode & 0o777, 0o640);
        // No default mask and not a directory: plain mode, no ACL
        assert!(acl.is_empty());
    }

    #[test]
    fn test_inherit_for_directory() {
        let parent: Acl = "A70,C50,F50,a70,b75,c50,e50,f00".parse().unwrap();
        let mut mode = S_IFDIR | 0o777;
        let acl = parent.inherit(1001, 200, 0o777, &mut mode);

        assert_eq!(mode & 0o777, 0o750);
        assert_eq!(acl.find(AclType::UserObj).unwrap().id, 1001);
        assert_eq!(acl.find(AclType::GroupObj).unwrap().id, 200);
        assert!(acl.find_default(AclType::User).is_some());
        acl.validate().unwrap();
    }
}
