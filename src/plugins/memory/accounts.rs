//! In-memory user and group database

use crate::domain::UserGroupDb;
use crate::error::{Error, Result};
use crate::security::{GroupInfo, UserInfo};
use dashmap::DashMap;
use std::sync::Arc;

/// A user and the names of its groups, primary first
#[derive(Debug, Clone)]
struct Account {
    user: UserInfo,
    groups: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Accounts {
    users: DashMap<String, Account>,
    groups: DashMap<String, GroupInfo>,
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: UserInfo, groups: Vec<String>) {
        self.users
            .insert(user.name.clone(), Account { user, groups });
    }

    pub fn add_group(&self, group: GroupInfo) {
        self.groups.insert(group.name.clone(), group);
    }

    pub fn user(&self, name: &str) -> Result<UserInfo> {
        self.users
            .get(name)
            .map(|a| a.user.clone())
            .ok_or_else(|| Error::no_such_user(name))
    }

    pub fn group(&self, name: &str) -> Result<GroupInfo> {
        self.groups
            .get(name)
            .map(|g| g.value().clone())
            .ok_or_else(|| Error::no_such_group(name))
    }

    pub fn groups_for_user(&self, name: &str) -> Result<Vec<GroupInfo>> {
        let names = self
            .users
            .get(name)
            .map(|a| a.groups.clone())
            .ok_or_else(|| Error::no_such_user(name))?;
        names.iter().map(|group| self.group(group)).collect()
    }

    /// Parse `name:uid[:group,...]`
    pub fn parse_user(value: &str) -> Result<(UserInfo, Vec<String>)> {
        let mut parts = value.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        let uid = parts.next().and_then(|uid| uid.trim().parse::<u32>().ok());
        let (Some(uid), false) = (uid, name.is_empty()) else {
            return Err(Error::malformed(format!(
                "expected name:uid[:group,...], got '{}'",
                value
            )));
        };
        let groups = parts
            .next()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok((UserInfo::new(name, uid), groups))
    }

    /// Parse `name:gid`
    pub fn parse_group(value: &str) -> Result<GroupInfo> {
        match value.split_once(':') {
            Some((name, gid)) if !name.trim().is_empty() => gid
                .trim()
                .parse::<u32>()
                .map(|gid| GroupInfo::new(name.trim(), gid))
                .map_err(|_| Error::malformed(format!("invalid gid in '{}'", value))),
            _ => Err(Error::malformed(format!("expected name:gid, got '{}'", value))),
        }
    }
}

pub struct MemoryUserGroupDb {
    accounts: Arc<Accounts>,
}

impl MemoryUserGroupDb {
    pub fn new(accounts: Arc<Accounts>) -> Self {
        Self { accounts }
    }
}

impl UserGroupDb for MemoryUserGroupDb {
    fn impl_id(&self) -> String {
        "MemoryUserGroupDb".into()
    }

    fn get_user(&mut self, name: &str) -> Result<UserInfo> {
        self.accounts.user(name)
    }

    fn get_group(&mut self, name: &str) -> Result<GroupInfo> {
        self.accounts.group(name)
    }

    fn get_groups_for_user(&mut self, name: &str) -> Result<Vec<GroupInfo>> {
        self.accounts.groups_for_user(name)
    }
}
