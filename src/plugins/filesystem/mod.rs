//! Filesystem Plugin
//!
//! Disk pools whose filesystems are plain directories, and the IO driver
//! that serves them. Locations handed out by the pool driver carry a signed
//! token which the IO driver checks before opening anything.
//!
//! Options:
//! - `TokenPassword <secret>`: shared HMAC secret, required
//! - `TokenId ip|id`: bind tokens to the client address or the user name
//! - `TokenLife <seconds>`: token lifetime

pub mod driver;
pub mod io;

pub use driver::FsPoolDriver;
pub use io::{LocalIODriver, LocalIOHandler};

use crate::domain::{IODriver, PoolDriver};
use crate::error::{Error, Result};
use crate::registry::{BaseFactory, IODriverFactory, PluginManager, PoolDriverFactory};
use crate::security::SecurityContext;
use parking_lot::RwLock;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

pub const PLUGIN_ID: &str = "filesystem";
pub const POOL_TYPE: &str = "filesystem";

pub const OPT_TOKEN_PASSWORD: &str = "TokenPassword";
pub const OPT_TOKEN_ID: &str = "TokenId";
pub const OPT_TOKEN_LIFE: &str = "TokenLife";

const DEFAULT_TOKEN_LIFE: u64 = 600;

/// What a token is bound to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenIdKind {
    /// Client remote address
    Ip,
    /// User name
    #[default]
    Id,
}

impl FromStr for TokenIdKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" => Ok(TokenIdKind::Ip),
            "id" => Ok(TokenIdKind::Id),
            other => Err(Error::malformed(format!(
                "TokenId must be 'ip' or 'id', got '{}'",
                other
            ))),
        }
    }
}

/// Token settings captured by every driver at creation
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub password: String,
    pub id_kind: TokenIdKind,
    pub lifetime: u64,
}

impl TokenSettings {
    /// Identity a token is issued to or checked against
    pub fn token_id(&self, ctx: Option<&SecurityContext>) -> Result<String> {
        let ctx = ctx.ok_or_else(Error::no_security_context)?;
        Ok(match self.id_kind {
            TokenIdKind::Ip => ctx.credentials.remote_address.clone(),
            TokenIdKind::Id => ctx.user.name.clone(),
        })
    }
}

#[derive(Debug)]
pub struct FilesystemFactory {
    password: RwLock<Option<String>>,
    id_kind: RwLock<TokenIdKind>,
    lifetime: RwLock<u64>,
}

impl Default for FilesystemFactory {
    fn default() -> Self {
        Self {
            password: RwLock::new(None),
            id_kind: RwLock::new(TokenIdKind::default()),
            lifetime: RwLock::new(DEFAULT_TOKEN_LIFE),
        }
    }
}

impl FilesystemFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn settings(&self) -> Result<TokenSettings> {
        let password = self
            .password
            .read()
            .clone()
            .ok_or_else(|| Error::malformed(format!("{} is not set", OPT_TOKEN_PASSWORD)))?;
        Ok(TokenSettings {
            password,
            id_kind: *self.id_kind.read(),
            lifetime: *self.lifetime.read(),
        })
    }
}

impl BaseFactory for FilesystemFactory {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn configure(&self, key: &str, value: &str) -> Result<()> {
        match key {
            OPT_TOKEN_PASSWORD => {
                if value.is_empty() {
                    return Err(Error::malformed("TokenPassword cannot be empty"));
                }
                *self.password.write() = Some(value.to_string());
            }
            OPT_TOKEN_ID => *self.id_kind.write() = value.parse()?,
            OPT_TOKEN_LIFE => {
                let lifetime = value.trim().parse::<u64>().map_err(|_| {
                    Error::malformed(format!("TokenLife must be a number of seconds, got '{}'", value))
                })?;
                *self.lifetime.write() = lifetime;
            }
            _ => return Err(Error::unknown_option(key)),
        }
        debug!(key, "filesystem option set");
        Ok(())
    }
}

impl PoolDriverFactory for FilesystemFactory {
    fn pool_type(&self) -> &str {
        POOL_TYPE
    }

    fn create_pool_driver(&self, _manager: &PluginManager) -> Result<Box<dyn PoolDriver>> {
        Ok(Box::new(FsPoolDriver::new(self.settings()?)))
    }
}

impl IODriverFactory for FilesystemFactory {
    fn create_io_driver(
        &self,
        _manager: &PluginManager,
        _inner: Option<Box<dyn IODriver>>,
    ) -> Result<Box<dyn IODriver>> {
        Ok(Box::new(LocalIODriver::new(self.settings()?)))
    }
}

pub fn register(manager: &mut PluginManager) -> Result<()> {
    let factory = Arc::new(FilesystemFactory::new());
    manager.register_pool_driver_factory(Arc::clone(&factory))?;
    manager.register_io_factory(factory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_options() {
        let factory = FilesystemFactory::new();
        assert_eq!(
            factory.settings().unwrap_err().kind(),
            ErrorKind::Malformed
        );

        factory.configure(OPT_TOKEN_PASSWORD, "s3cret").unwrap();
        factory.configure(OPT_TOKEN_ID, "IP").unwrap();
        factory.configure(OPT_TOKEN_LIFE, "30").unwrap();
        let settings = factory.settings().unwrap();
        assert_eq!(settings.password, "s3cret");
        assert_eq!(settings.id_kind, TokenIdKind::Ip);
        assert_eq!(settings.lifetime, 30);

        assert_eq!(
            factory.configure(OPT_TOKEN_ID, "cert").unwrap_err().kind(),
            ErrorKind::Malformed
        );
        assert_eq!(
            factory.configure(OPT_TOKEN_LIFE, "soon").unwrap_err().kind(),
            ErrorKind::Malformed
        );
        assert_eq!(
            factory.configure("MemoryUser", "x:1").unwrap_err().kind(),
            ErrorKind::UnknownOption
        );
    }

    #[test]
    fn test_token_id_binding() {
        let ctx = SecurityContext {
            credentials: crate::security::Credentials::new("test", "alice").from_address("10.1.2.3"),
            user: crate::security::UserInfo::new("alice", 1001),
            ..Default::default()
        };
        let mut settings = TokenSettings {
            password: "p".into(),
            id_kind: TokenIdKind::Id,
            lifetime: 60,
        };
        assert_eq!(settings.token_id(Some(&ctx)).unwrap(), "alice");
        settings.id_kind = TokenIdKind::Ip;
        assert_eq!(settings.token_id(Some(&ctx)).unwrap(), "10.1.2.3");
        assert_eq!(
            settings.token_id(None).unwrap_err().kind(),
            ErrorKind::NoSecurityContext
        );
    }
}
