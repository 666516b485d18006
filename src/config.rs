//! Configuration loading from `.env` files.

use std::{env, time::Duration};

use anyhow::{Context, Result};
use secp256k1::SecretKey;

pub const DEFAULT_IPFS_API: &str = "http://127.0.0.1:5001";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Relays queried for repository and thread events.
    pub relays: Vec<String>,
    /// Base URL of the IPFS RPC API.
    pub ipfs_api: String,
    /// Optional Tor SOCKS proxy (host:port).
    pub tor_socks: Option<String>,
    /// Key used to sign replies.
    pub secret_key: Option<SecretKey>,
    /// Per-relay query timeout.
    pub fetch_timeout: Duration,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let relays = csv_strings(env::var("RELAYS").context("RELAYS is not set")?);
        let ipfs_api = env::var("IPFS_API")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_IPFS_API.into());
        let tor_socks = env::var("TOR_SOCKS").ok().filter(|s| !s.is_empty());
        let secret_key = match env::var("SECRET_KEY").ok().filter(|s| !s.is_empty()) {
            Some(raw) => {
                let bytes = hex::decode(raw.trim()).context("SECRET_KEY is not hex")?;
                Some(SecretKey::from_slice(&bytes).context("SECRET_KEY is not a valid key")?)
            }
            None => None,
        };
        let fetch_timeout = match env::var("FETCH_TIMEOUT_SECS").ok().filter(|s| !s.is_empty()) {
            Some(raw) => raw
                .trim()
                .parse()
                .context("FETCH_TIMEOUT_SECS is not a number")?,
            None => DEFAULT_FETCH_TIMEOUT_SECS,
        };
        Ok(Self {
            relays,
            ipfs_api,
            tor_socks,
            secret_key,
            fetch_timeout: Duration::from_secs(fetch_timeout),
        })
    }
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    let s = input.as_ref();
    s.split(',')
        .filter_map(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs, sync::Mutex};
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 5] = [
        "RELAYS",
        "IPFS_API",
        "TOR_SOCKS",
        "SECRET_KEY",
        "FETCH_TIMEOUT_SECS",
    ];

    fn load(contents: &str) -> Result<Settings> {
        for v in VARS.iter() {
            env::remove_var(v);
        }
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(&env_path, contents).unwrap();
        Settings::from_env(env_path.to_str().unwrap())
    }

    #[test]
    fn loads_env() {
        let _g = ENV_MUTEX.lock().unwrap();
        let cfg = load(concat!(
            "RELAYS=ws://r1, ws://r2\n",
            "IPFS_API=http://10.0.0.2:5001\n",
            "TOR_SOCKS=127.0.0.1:9050\n",
            "SECRET_KEY=0909090909090909090909090909090909090909090909090909090909090909\n",
            "FETCH_TIMEOUT_SECS=3\n",
        ))
        .unwrap();
        assert_eq!(cfg.relays, vec!["ws://r1", "ws://r2"]);
        assert_eq!(cfg.ipfs_api, "http://10.0.0.2:5001");
        assert_eq!(cfg.tor_socks, Some("127.0.0.1:9050".into()));
        assert_eq!(
            cfg.secret_key,
            Some(SecretKey::from_slice(&[9u8; 32]).unwrap())
        );
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(3));
    }

    #[test]
    fn defaults_when_optional_absent() {
        let _g = ENV_MUTEX.lock().unwrap();
        let cfg = load("RELAYS=\nTOR_SOCKS=\n").unwrap();
        assert!(cfg.relays.is_empty());
        assert_eq!(cfg.ipfs_api, DEFAULT_IPFS_API);
        assert!(cfg.tor_socks.is_none());
        assert!(cfg.secret_key.is_none());
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS));
    }

    #[test]
    fn missing_relays_is_an_error() {
        let _g = ENV_MUTEX.lock().unwrap();
        assert!(load("IPFS_API=http://127.0.0.1:5001\n").is_err());
    }

    #[test]
    fn malformed_values_are_errors() {
        let _g = ENV_MUTEX.lock().unwrap();
        assert!(load("RELAYS=ws://r1\nSECRET_KEY=zz\n").is_err());
        assert!(load("RELAYS=ws://r1\nFETCH_TIMEOUT_SECS=soon\n").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let _g = ENV_MUTEX.lock().unwrap();
        assert!(Settings::from_env("/nonexistent/gitrelay.env").is_err());
    }

    #[test]
    fn csv_helper() {
        assert_eq!(csv_strings("a, b , ,c"), vec!["a", "b", "c"]);
        assert!(csv_strings("").is_empty());
    }
}
