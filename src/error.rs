//! Error types for the storage stack
//!
//! Every failure is a `(category, subcode, message)` triple. The pair
//! `(category, subcode)` packs into a single integer (category in the high
//! byte) so codes can cross API boundaries unchanged, and the rendered
//! message is prefixed with `[#CC.SSSSSS]` for log correlation.

use std::fmt;
use thiserror::Error;

// =============================================================================
// Sub-codes
// =============================================================================

/// Well-known sub-codes. POSIX errno values are reused where one fits.
pub mod errc {
    pub const ENOENT: u32 = 2;
    pub const EIO: u32 = 5;
    pub const EBADF: u32 = 9;
    pub const EACCES: u32 = 13;
    pub const EEXIST: u32 = 17;
    pub const ENOTDIR: u32 = 20;
    pub const EISDIR: u32 = 21;
    pub const EINVAL: u32 = 22;
    pub const ENOSPC: u32 = 28;
    pub const ENOSYS: u32 = 38;
    pub const ENOTEMPTY: u32 = 39;

    pub const INTERNAL: u32 = 258;
    pub const NO_POOL_MANAGER: u32 = 272;
    pub const NO_CATALOG: u32 = 273;
    pub const NO_INODE: u32 = 274;
    pub const NO_AUTHN: u32 = 275;
    pub const NO_IO: u32 = 276;
    pub const NO_POOL_DRIVER: u32 = 277;
    pub const UNKNOWN_PLUGIN: u32 = 278;
    pub const NO_SECURITY_CONTEXT: u32 = 300;
    pub const MALFORMED: u32 = 350;
    pub const UNKNOWN_KEY: u32 = 351;
    pub const NO_REPLICAS: u32 = 401;
    pub const NO_SUCH_REPLICA: u32 = 402;
    pub const NO_SUCH_USER: u32 = 501;
    pub const NO_SUCH_GROUP: u32 = 502;
    pub const AUTHENTICATION: u32 = 503;
    pub const INVALID_ACL: u32 = 504;
    pub const UNKNOWN_POOL_TYPE: u32 = 600;
    pub const NO_SUCH_POOL: u32 = 601;
}

/// Mask of the sub-code part of a packed error code
const SUBCODE_MASK: u32 = 0x00FF_FFFF;

// =============================================================================
// Category
// =============================================================================

/// High-byte classification of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caused by the request itself (missing file, permission, ...)
    User,
    /// Failure inside the stack or a backend
    System,
    /// Raised while loading or composing plugins
    Configuration,
    /// Raised by a namespace or pool database
    Database,
}

impl ErrorCategory {
    /// Numeric value stored in the high byte
    pub fn index(self) -> u32 {
        match self {
            ErrorCategory::User => 0x00,
            ErrorCategory::System => 0x01,
            ErrorCategory::Configuration => 0x02,
            ErrorCategory::Database => 0x03,
        }
    }

    fn from_index(index: u32) -> Self {
        match index {
            0x01 => ErrorCategory::System,
            0x02 => ErrorCategory::Configuration,
            0x03 => ErrorCategory::Database,
            _ => ErrorCategory::User,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::User => write!(f, "user"),
            ErrorCategory::System => write!(f, "system"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Database => write!(f, "database"),
        }
    }
}

// =============================================================================
// Contract kinds
// =============================================================================

/// The plugin contracts a registry can hold factories for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContractKind {
    UserGroupDb,
    INode,
    Catalog,
    PoolManager,
    PoolDriver,
    IODriver,
}

impl ContractKind {
    /// Sub-code reported when no factory provides this contract
    pub fn missing_code(self) -> u32 {
        match self {
            ContractKind::UserGroupDb => errc::NO_AUTHN,
            ContractKind::INode => errc::NO_INODE,
            ContractKind::Catalog => errc::NO_CATALOG,
            ContractKind::PoolManager => errc::NO_POOL_MANAGER,
            ContractKind::PoolDriver => errc::NO_POOL_DRIVER,
            ContractKind::IODriver => errc::NO_IO,
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractKind::UserGroupDb => write!(f, "UserGroupDb"),
            ContractKind::INode => write!(f, "INode"),
            ContractKind::Catalog => write!(f, "Catalog"),
            ContractKind::PoolManager => write!(f, "PoolManager"),
            ContractKind::PoolDriver => write!(f, "PoolDriver"),
            ContractKind::IODriver => write!(f, "IODriver"),
        }
    }
}

// =============================================================================
// Error
// =============================================================================

/// Structured error value shared by every component of the stack
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[#{:02}.{:06}] {}", .category.index(), .subcode, .message)]
pub struct Error {
    category: ErrorCategory,
    subcode: u32,
    message: String,
}

/// Taxonomy used by callers to branch on failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthenticationError,
    PermissionDenied,
    NotImplemented,
    UnknownOption,
    NoFactory,
    NoSuchUser,
    NoSuchGroup,
    NoSuchReplica,
    FileNotFound,
    NoReplicaAvailable,
    InvalidAcl,
    Internal,
    NoSuchPool,
    UnknownPoolType,
    NoSecurityContext,
    Exists,
    NotADirectory,
    IsADirectory,
    NotEmpty,
    InvalidArgument,
    Malformed,
    Other,
}

impl Error {
    /// Build an error from its parts. Formatting the message is the caller's job.
    pub fn new(category: ErrorCategory, subcode: u32, message: impl Into<String>) -> Self {
        Self {
            category,
            subcode: subcode & SUBCODE_MASK,
            message: message.into(),
        }
    }

    /// Rebuild an error from a packed integer code
    pub fn from_code(code: u32, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::from_index(code >> 24),
            code & SUBCODE_MASK,
            message,
        )
    }

    /// Packed `(category, subcode)` code
    pub fn code(&self) -> u32 {
        (self.category.index() << 24) | self.subcode
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn subcode(&self) -> u32 {
        self.subcode
    }

    /// Message without the `[#CC.SSSSSS]` tag
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Map the code onto the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self.subcode {
            errc::AUTHENTICATION => ErrorKind::AuthenticationError,
            errc::EACCES => ErrorKind::PermissionDenied,
            errc::ENOSYS => ErrorKind::NotImplemented,
            errc::UNKNOWN_KEY => ErrorKind::UnknownOption,
            errc::NO_POOL_MANAGER
            | errc::NO_CATALOG
            | errc::NO_INODE
            | errc::NO_AUTHN
            | errc::NO_IO
            | errc::NO_POOL_DRIVER
            | errc::UNKNOWN_PLUGIN => ErrorKind::NoFactory,
            errc::NO_SUCH_USER => ErrorKind::NoSuchUser,
            errc::NO_SUCH_GROUP => ErrorKind::NoSuchGroup,
            errc::NO_SUCH_REPLICA => ErrorKind::NoSuchReplica,
            errc::ENOENT => ErrorKind::FileNotFound,
            errc::NO_REPLICAS => ErrorKind::NoReplicaAvailable,
            errc::INVALID_ACL => ErrorKind::InvalidAcl,
            errc::INTERNAL => ErrorKind::Internal,
            errc::NO_SUCH_POOL => ErrorKind::NoSuchPool,
            errc::UNKNOWN_POOL_TYPE => ErrorKind::UnknownPoolType,
            errc::NO_SECURITY_CONTEXT => ErrorKind::NoSecurityContext,
            errc::EEXIST => ErrorKind::Exists,
            errc::ENOTDIR => ErrorKind::NotADirectory,
            errc::EISDIR => ErrorKind::IsADirectory,
            errc::ENOTEMPTY => ErrorKind::NotEmpty,
            errc::EINVAL => ErrorKind::InvalidArgument,
            errc::MALFORMED => ErrorKind::Malformed,
            _ => ErrorKind::Other,
        }
    }

    /// Wrap with extra context, keeping category and sub-code
    pub fn with_context(self, context: impl fmt::Display) -> Self {
        Self {
            message: format!("{}: {}", context, self.message),
            ..self
        }
    }

    /// Registration-time errors abort stack construction
    pub fn is_fatal(&self) -> bool {
        self.category == ErrorCategory::Configuration
    }

    /// Whether another credential set could make the call succeed
    pub fn is_authorization(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::PermissionDenied
                | ErrorKind::AuthenticationError
                | ErrorKind::NoSecurityContext
        )
    }

    // =========================================================================
    // Constructors for the common cases
    // =========================================================================

    pub fn not_implemented(operation: &str) -> Self {
        Self::new(
            ErrorCategory::System,
            errc::ENOSYS,
            format!("there is no plugin that implements {}", operation),
        )
    }

    pub fn unknown_option(key: &str) -> Self {
        Self::new(
            ErrorCategory::Configuration,
            errc::UNKNOWN_KEY,
            format!("unknown option {}", key),
        )
    }

    pub fn unknown_plugin(plugin_id: &str) -> Self {
        Self::new(
            ErrorCategory::Configuration,
            errc::UNKNOWN_PLUGIN,
            format!("plugin {} is not available", plugin_id),
        )
    }

    pub fn no_factory(kind: ContractKind) -> Self {
        Self::new(
            ErrorCategory::Configuration,
            kind.missing_code(),
            format!("no plugin provides {}", kind),
        )
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::User, errc::EACCES, message)
    }

    pub fn file_not_found(path: &str) -> Self {
        Self::new(
            ErrorCategory::User,
            errc::ENOENT,
            format!("{} does not exist", path),
        )
    }

    pub fn exists(path: &str) -> Self {
        Self::new(
            ErrorCategory::User,
            errc::EEXIST,
            format!("{} already exists", path),
        )
    }

    pub fn not_a_directory(path: &str) -> Self {
        Self::new(
            ErrorCategory::User,
            errc::ENOTDIR,
            format!("{} is not a directory", path),
        )
    }

    pub fn is_a_directory(path: &str) -> Self {
        Self::new(
            ErrorCategory::User,
            errc::EISDIR,
            format!("{} is a directory", path),
        )
    }

    pub fn not_empty(path: &str) -> Self {
        Self::new(
            ErrorCategory::User,
            errc::ENOTEMPTY,
            format!("{} is not empty", path),
        )
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::User, errc::EINVAL, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::System, errc::AUTHENTICATION, message)
    }

    pub fn no_such_user(name: &str) -> Self {
        Self::new(
            ErrorCategory::User,
            errc::NO_SUCH_USER,
            format!("user {} not found", name),
        )
    }

    pub fn no_such_group(name: &str) -> Self {
        Self::new(
            ErrorCategory::User,
            errc::NO_SUCH_GROUP,
            format!("group {} not found", name),
        )
    }

    pub fn no_such_replica(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::User, errc::NO_SUCH_REPLICA, message)
    }

    pub fn no_replica_available(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::User, errc::NO_REPLICAS, message)
    }

    pub fn no_such_pool(name: &str) -> Self {
        Self::new(
            ErrorCategory::User,
            errc::NO_SUCH_POOL,
            format!("pool {} not found", name),
        )
    }

    pub fn unknown_pool_type(pool_type: &str) -> Self {
        Self::new(
            ErrorCategory::System,
            errc::UNKNOWN_POOL_TYPE,
            format!("no plugin recognises the pool type '{}'", pool_type),
        )
    }

    pub fn invalid_acl(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::System, errc::INVALID_ACL, message)
    }

    pub fn no_security_context() -> Self {
        Self::new(
            ErrorCategory::System,
            errc::NO_SECURITY_CONTEXT,
            "the security context has not been initialized",
        )
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Configuration, errc::MALFORMED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::System, errc::INTERNAL, message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let subcode = match err.kind() {
            std::io::ErrorKind::NotFound => errc::ENOENT,
            std::io::ErrorKind::PermissionDenied => errc::EACCES,
            std::io::ErrorKind::AlreadyExists => errc::EEXIST,
            std::io::ErrorKind::InvalidInput => errc::EINVAL,
            _ => err
                .raw_os_error()
                .map(|code| code as u32)
                .unwrap_or(errc::EIO),
        };
        Error::new(ErrorCategory::System, subcode, err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::malformed(format!("YAML parse error: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::malformed(format!("JSON parse error: {}", err))
    }
}

/// Result type alias for the stack
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_packing() {
        let err = Error::unknown_option("Foo");
        assert_eq!(err.code(), 0x0200_0000 | errc::UNKNOWN_KEY);
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.subcode(), errc::UNKNOWN_KEY);

        let decoded = Error::from_code(err.code(), "again");
        assert_eq!(decoded.category(), ErrorCategory::Configuration);
        assert_eq!(decoded.kind(), ErrorKind::UnknownOption);
    }

    #[test]
    fn test_display_tag() {
        let err = Error::file_not_found("/data/f");
        assert_eq!(err.to_string(), "[#00.000002] /data/f does not exist");

        let err = Error::not_implemented("get_replicas");
        assert!(err.to_string().starts_with("[#01.000038] "));
        assert!(err.message().contains("get_replicas"));
    }

    #[test]
    fn test_context_preserves_code() {
        let err = Error::file_not_found("/x").with_context("profiler");
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert_eq!(err.message(), "profiler: /x does not exist");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::no_factory(ContractKind::Catalog).is_fatal());
        assert!(Error::unknown_option("x").is_fatal());
        assert!(!Error::no_replica_available("none").is_fatal());
        assert!(Error::permission_denied("no").is_authorization());
        assert!(!Error::file_not_found("/x").is_authorization());
    }

    #[test]
    fn test_unknown_plugin_is_not_a_missing_file() {
        let err = Error::unknown_plugin("tape");
        assert_eq!(err.kind(), ErrorKind::NoFactory);
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.subcode(), errc::UNKNOWN_PLUGIN);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert_eq!(err.category(), ErrorCategory::System);
    }
}
