//! Signed, time-limited access tokens
//!
//! A token binds a physical file name, an identity (user name or client
//! address), an expiry and the access mode:
//!
//! ```text
//! base64(HMAC-SHA256(secret, pfn 0x1d id 0x1d expires 0x1d w)) @ expires @ w
//! ```
//!
//! Backends validate tokens against the same shared secret; nothing is
//! stored server-side.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Identity accepted for any caller
pub const GENERIC_USER: &str = "nouser";

const FIELD_SEPARATOR: char = '\u{1d}';

/// Result of validating a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Valid,
    Malformed,
    Invalid,
    Expired,
    WrongMode,
}

impl TokenStatus {
    pub fn is_valid(self) -> bool {
        self == TokenStatus::Valid
    }
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenStatus::Valid => write!(f, "valid"),
            TokenStatus::Malformed => write!(f, "malformed"),
            TokenStatus::Invalid => write!(f, "invalid signature"),
            TokenStatus::Expired => write!(f, "expired"),
            TokenStatus::WrongMode => write!(f, "not valid for writing"),
        }
    }
}

fn mac_for(secret: &str, id: &str, pfn: &str, expires: i64, write: bool) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::internal(format!("cannot key token HMAC: {}", e)))?;
    let payload = format!(
        "{pfn}{sep}{id}{sep}{expires}{sep}{w}",
        sep = FIELD_SEPARATOR,
        w = u8::from(write)
    );
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Issue a token valid for `lifetime_secs` from now
pub fn generate_token(
    id: &str,
    pfn: &str,
    secret: &str,
    lifetime_secs: u64,
    write: bool,
) -> Result<String> {
    generate_token_at(Utc::now().timestamp(), id, pfn, secret, lifetime_secs, write)
}

/// Issue a token as if the current time were `now`
pub fn generate_token_at(
    now: i64,
    id: &str,
    pfn: &str,
    secret: &str,
    lifetime_secs: u64,
    write: bool,
) -> Result<String> {
    let expires = now.saturating_add(i64::try_from(lifetime_secs).unwrap_or(i64::MAX));
    let signature = mac_for(secret, id, pfn, expires, write)?.finalize().into_bytes();
    Ok(format!(
        "{}@{}@{}",
        STANDARD.encode(signature),
        expires,
        u8::from(write)
    ))
}

/// Check a token for `pfn` presented by `id`
pub fn validate_token(token: &str, id: &str, pfn: &str, secret: &str, write: bool) -> TokenStatus {
    validate_token_at(Utc::now().timestamp(), token, id, pfn, secret, write)
}

/// Check a token as if the current time were `now`
pub fn validate_token_at(
    now: i64,
    token: &str,
    id: &str,
    pfn: &str,
    secret: &str,
    write: bool,
) -> TokenStatus {
    let mut parts = token.splitn(3, '@');
    let (Some(encoded), Some(expires), Some(mode)) = (parts.next(), parts.next(), parts.next())
    else {
        return TokenStatus::Malformed;
    };
    let Ok(expires) = expires.parse::<i64>() else {
        return TokenStatus::Malformed;
    };
    let token_for_write = match mode {
        "0" => false,
        "1" => true,
        _ => return TokenStatus::Malformed,
    };
    let Ok(signature) = STANDARD.decode(encoded) else {
        return TokenStatus::Malformed;
    };

    let matches_id = |candidate: &str| {
        mac_for(secret, candidate, pfn, expires, token_for_write)
            .map(|mac| mac.verify_slice(&signature).is_ok())
            .unwrap_or(false)
    };
    if !matches_id(id) && !matches_id(GENERIC_USER) {
        return TokenStatus::Invalid;
    }

    if expires < now {
        return TokenStatus::Expired;
    }
    if write && !token_for_write {
        return TokenStatus::WrongMode;
    }
    TokenStatus::Valid
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cr3t";

    #[test]
    fn test_valid_token() {
        let token = generate_token("alice", "/srv/fs1/f", SECRET, 60, false).unwrap();
        assert_eq!(
            validate_token(&token, "alice", "/srv/fs1/f", SECRET, false),
            TokenStatus::Valid
        );
    }

    #[test]
    fn test_binding_is_enforced() {
        let token = generate_token("10.0.0.1", "/srv/fs1/f", SECRET, 60, false).unwrap();
        assert_eq!(
            validate_token(&token, "10.0.0.2", "/srv/fs1/f", SECRET, false),
            TokenStatus::Invalid
        );
        assert_eq!(
            validate_token(&token, "10.0.0.1", "/srv/fs1/g", SECRET, false),
            TokenStatus::Invalid
        );
        assert_eq!(
            validate_token(&token, "10.0.0.1", "/srv/fs1/f", "other", false),
            TokenStatus::Invalid
        );
    }

    #[test]
    fn test_generic_user_token() {
        let token = generate_token(GENERIC_USER, "/srv/f", SECRET, 60, true).unwrap();
        assert!(validate_token(&token, "anyone", "/srv/f", SECRET, true).is_valid());
    }

    #[test]
    fn test_expiry_and_mode() {
        let token = generate_token_at(1_000, "alice", "/srv/f", SECRET, 30, false).unwrap();
        assert!(validate_token_at(1_030, &token, "alice", "/srv/f", SECRET, false).is_valid());
        assert_eq!(
            validate_token_at(1_031, &token, "alice", "/srv/f", SECRET, false),
            TokenStatus::Expired
        );
        assert_eq!(
            validate_token_at(1_010, &token, "alice", "/srv/f", SECRET, true),
            TokenStatus::WrongMode
        );
    }

    #[test]
    fn test_malformed() {
        for token in ["", "abc", "abc@x@0", "abc@10@2", "!!!@10@0"] {
            assert_eq!(
                validate_token(token, "alice", "/srv/f", SECRET, false),
                TokenStatus::Malformed,
                "{}",
                token
            );
        }
    }
}
