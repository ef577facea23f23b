//! User and group database contract

use super::{delegate, forward_hook};
use crate::error::Result;
use crate::security::{GroupInfo, SecurityContext, UserInfo};
use crate::stack::StackHandle;
use std::sync::Arc;

/// Maps client names and group tags onto user and group records
pub trait UserGroupDb: Send {
    /// Implementation id, used in diagnostics
    fn impl_id(&self) -> String;

    /// The node this one wraps, if any
    fn decorated(&mut self) -> Option<&mut (dyn UserGroupDb + 'static)> {
        None
    }

    fn set_security_context(&mut self, ctx: &Arc<SecurityContext>) -> Result<()> {
        forward_hook!(UserGroupDb, self.set_security_context(ctx))
    }

    fn set_stack_instance(&mut self, stack: &StackHandle) -> Result<()> {
        forward_hook!(UserGroupDb, self.set_stack_instance(stack))
    }

    fn get_user(&mut self, name: &str) -> Result<UserInfo> {
        delegate!(UserGroupDb, self.get_user(name))
    }

    fn get_group(&mut self, name: &str) -> Result<GroupInfo> {
        delegate!(UserGroupDb, self.get_group(name))
    }

    /// Groups the user belongs to, primary group first
    fn get_groups_for_user(&mut self, name: &str) -> Result<Vec<GroupInfo>> {
        delegate!(UserGroupDb, self.get_groups_for_user(name))
    }
}
