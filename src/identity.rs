//! Repository owner identities and repository references.

use std::fmt;

use bech32::{FromBase32, ToBase32, Variant};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ResolveError, Result};

static REPOSITORY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]{0,99}$").expect("valid regex"));

const NPUB_HRP: &str = "npub";

/// A 32-byte x-only public key, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Accept either 64 hex characters (any case) or an `npub` bech32 string.
    pub fn parse(raw: &str) -> Result<Self> {
        let lowered = raw.trim().to_lowercase();
        if lowered.len() == 64 && lowered.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(Identity(lowered));
        }
        let invalid = || ResolveError::InvalidIdentity(raw.to_string());
        let (hrp, data, _) = bech32::decode(&lowered).map_err(|_| invalid())?;
        if hrp != NPUB_HRP {
            return Err(invalid());
        }
        let bytes = Vec::<u8>::from_base32(&data).map_err(|_| invalid())?;
        if bytes.len() != 32 {
            return Err(invalid());
        }
        Ok(Identity(hex::encode(bytes)))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Bech32 `npub` display form.
    pub fn npub(&self) -> String {
        // Construction guarantees 32 bytes of valid hex.
        let bytes = hex::decode(&self.0).unwrap_or_default();
        bech32::encode(NPUB_HRP, bytes.to_base32(), Variant::Bech32).unwrap_or_default()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner and name of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    pub owner: Identity,
    pub name: String,
}

impl RepositoryRef {
    /// Validate raw route input. Both checks run before anything is fetched.
    pub fn parse(owner: &str, name: &str) -> Result<Self> {
        let owner = Identity::parse(owner)?;
        let name = validate_name(name)?;
        Ok(Self { owner, name })
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner.npub(), self.name)
    }
}

fn validate_name(raw: &str) -> Result<String> {
    let name = raw.to_lowercase();
    if REPOSITORY_NAME.is_match(&name) {
        Ok(name)
    } else {
        Err(ResolveError::InvalidRepositoryName(raw.to_string()))
    }
}
