//! Human-readable names for identities.
//!
//! [`DisplayNames`] is a read-through cache in front of a [`NameResolver`].
//! Lookups never block on the network: until a name has been resolved the
//! identity is shown in its `npub` form, and any failure keeps that fallback.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::{error::TransportError, event::Event, identity::Identity, relay::RelayTransport};

/// Resolves a verified display name for an identity, if it has one.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn display_name(&self, who: &Identity) -> Option<String>;
}

/// Source of profile metadata events.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn profile(&self, who: &Identity) -> Result<Option<Event>, TransportError>;
}

#[async_trait]
impl ProfileSource for RelayTransport {
    async fn profile(&self, who: &Identity) -> Result<Option<Event>, TransportError> {
        self.fetch_profile(who).await
    }
}

#[derive(Deserialize)]
struct Metadata {
    #[serde(default)]
    nip05: Option<String>,
}

#[derive(Deserialize)]
struct WellKnown {
    #[serde(default)]
    names: HashMap<String, String>,
}

/// Verifies the `nip05` identifier of an identity's profile against
/// `https://<domain>/.well-known/nostr.json`.
pub struct Nip05Resolver {
    profiles: Arc<dyn ProfileSource>,
    client: reqwest::Client,
    scheme: &'static str,
}

impl Nip05Resolver {
    pub fn new(profiles: Arc<dyn ProfileSource>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            profiles,
            client,
            scheme: "https",
        })
    }

    #[cfg(test)]
    fn insecure(mut self) -> Self {
        self.scheme = "http";
        self
    }

    async fn verify(&self, who: &Identity, nip05: &str) -> Result<bool, reqwest::Error> {
        let Some((name, domain)) = split_nip05(nip05) else {
            return Ok(false);
        };
        let url = format!("{}://{domain}/.well-known/nostr.json", self.scheme);
        let doc: WellKnown = self
            .client
            .get(url)
            .query(&[("name", name)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(doc
            .names
            .get(name)
            .is_some_and(|hex| hex.eq_ignore_ascii_case(who.as_hex())))
    }
}

/// Split `name@domain` (a bare domain means name `_`).
fn split_nip05(raw: &str) -> Option<(&str, &str)> {
    let (name, domain) = match raw.split_once('@') {
        Some((name, domain)) => (name, domain),
        None => ("_", raw),
    };
    if name.is_empty() || domain.is_empty() {
        return None;
    }
    Some((name, domain))
}

/// `_@domain` displays as just `domain`.
fn display_form(nip05: &str) -> String {
    match split_nip05(nip05) {
        Some(("_", domain)) => domain.to_string(),
        _ => nip05.to_string(),
    }
}

#[async_trait]
impl NameResolver for Nip05Resolver {
    async fn display_name(&self, who: &Identity) -> Option<String> {
        let profile = match self.profiles.profile(who).await {
            Ok(Some(ev)) => ev,
            Ok(None) => return None,
            Err(e) => {
                debug!(who = %who, error = %e, "profile lookup failed");
                return None;
            }
        };
        let nip05 = serde_json::from_str::<Metadata>(&profile.content)
            .ok()?
            .nip05
            .filter(|s| !s.is_empty())?
            .to_lowercase();
        match self.verify(who, &nip05).await {
            Ok(true) => Some(display_form(&nip05)),
            Ok(false) => {
                debug!(who = %who, %nip05, "nip05 does not match");
                None
            }
            Err(e) => {
                debug!(who = %who, %nip05, error = %e, "nip05 verification failed");
                None
            }
        }
    }
}

/// Read-through cache of display names.
pub struct DisplayNames {
    resolver: Arc<dyn NameResolver>,
    cache: Mutex<HashMap<Identity, Option<String>>>,
}

impl DisplayNames {
    pub fn new(resolver: Arc<dyn NameResolver>) -> Self {
        Self {
            resolver,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Name to show right now: the cached verified name or the `npub`.
    pub fn get(&self, who: &Identity) -> String {
        match self.cache.lock().get(who) {
            Some(Some(name)) => name.clone(),
            _ => who.npub(),
        }
    }

    /// Resolve on first use, then serve from cache.
    pub async fn resolve(&self, who: &Identity) -> String {
        if let Some(hit) = self.cache.lock().get(who).cloned() {
            return hit.unwrap_or_else(|| who.npub());
        }
        let name = self.resolver.display_name(who).await;
        self.cache.lock().insert(who.clone(), name.clone());
        name.unwrap_or_else(|| who.npub())
    }
}
