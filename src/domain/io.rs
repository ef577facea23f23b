//! IO contract
//!
//! An [`IODriver`] opens physical files named by a location chunk and hands
//! back an [`IOHandler`] for the transfer itself.

use super::extensible::Extensible;
use super::{delegate, forward_hook};
use crate::error::Result;
use crate::security::SecurityContext;
use crate::stack::StackHandle;
use std::sync::Arc;

/// How a physical file is opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
}

impl OpenFlags {
    pub const READ: OpenFlags = OpenFlags {
        write: false,
        create: false,
        truncate: false,
    };

    /// Write, creating or truncating the file
    pub const WRITE: OpenFlags = OpenFlags {
        write: true,
        create: true,
        truncate: true,
    };
}

/// Origin of a seek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

pub trait IODriver: Send {
    /// Implementation id, used in diagnostics
    fn impl_id(&self) -> String;

    /// The node this one wraps, if any
    fn decorated(&mut self) -> Option<&mut (dyn IODriver + 'static)> {
        None
    }

    fn set_security_context(&mut self, ctx: &Arc<SecurityContext>) -> Result<()> {
        forward_hook!(IODriver, self.set_security_context(ctx))
    }

    fn set_stack_instance(&mut self, stack: &StackHandle) -> Result<()> {
        forward_hook!(IODriver, self.set_stack_instance(stack))
    }

    /// Open `pfn`. `extras` carries the chunk attributes, token included.
    fn create_io_handler(
        &mut self,
        pfn: &str,
        flags: OpenFlags,
        extras: &Extensible,
    ) -> Result<Box<dyn IOHandler>> {
        delegate!(IODriver, self.create_io_handler(pfn, flags, extras))
    }
}

/// An open physical file
pub trait IOHandler: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Move the cursor, returning the new absolute offset
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64>;

    fn tell(&mut self) -> Result<u64>;

    fn flush(&mut self) -> Result<()>;

    /// Whether the last read hit the end of the file
    fn eof(&self) -> bool;

    fn close(&mut self) -> Result<()>;
}
