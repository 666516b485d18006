//! Selection of a repository's current snapshot from its event stream.

use std::fmt;

use tracing::debug;
use url::Url;

use crate::{
    error::{ResolveError, Result},
    event::Event,
    identity::RepositoryRef,
    path::RepoPath,
    transport::{PARTICIPANT_TAG, REPOSITORY_TAG},
};

/// Content-addressing schemes a snapshot URI may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Ipfs,
}

impl Scheme {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ipfs" => Some(Scheme::Ipfs),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Ipfs => "ipfs",
        }
    }
}

/// A resolved `(root hash, path)` pair in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub scheme: Scheme,
    pub root_hash: String,
    /// Snapshot sub-path followed by the logical path; empty or `/`-prefixed.
    pub path: String,
}

impl Locator {
    /// Path handed to the content store, e.g. `Qm123/README.md`.
    pub fn store_path(&self) -> String {
        format!("{}{}", self.root_hash, self.path)
    }

    /// Locator of the child entry `name` below this one.
    pub fn child(&self, name: &str) -> Self {
        let mut path = self.path.clone();
        if !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(name.trim_start_matches('/'));
        Locator {
            path,
            ..self.clone()
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.name(), self.store_path())
    }
}

/// The event chosen as a repository's current snapshot pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub event: Event,
    scheme: Scheme,
    root_hash: String,
    base: String,
}

impl Commit {
    /// Interpret `event` as a snapshot pointer.
    pub fn from_event(event: Event) -> Result<Self> {
        let (scheme, root_hash, base) = parse_snapshot_uri(&event.content)?;
        Ok(Self {
            event,
            scheme,
            root_hash,
            base,
        })
    }

    pub fn root_hash(&self) -> &str {
        &self.root_hash
    }

    /// Locator for a logical path inside this snapshot.
    pub fn locate(&self, path: &RepoPath) -> Locator {
        Locator {
            scheme: self.scheme,
            root_hash: self.root_hash.clone(),
            path: format!("{}{}", self.base, path.as_str()),
        }
    }
}

/// Split `scheme://<root>[/sub]` into its scheme, root hash and sub-path.
///
/// The sub-path is returned without a trailing slash so logical paths
/// (which always start with `/`) can be appended directly.
fn parse_snapshot_uri(content: &str) -> Result<(Scheme, String, String)> {
    let content = content.trim();
    // URL parsing silently drops tabs and newlines; such content is not a pointer.
    if content.contains(['\t', '\n', '\r']) {
        return Err(ResolveError::UnsupportedScheme(format!(
            "control characters in URI: {content:?}"
        )));
    }
    let url = Url::parse(content)
        .map_err(|_| ResolveError::UnsupportedScheme(format!("not a URI: {content}")))?;
    let scheme = Scheme::from_name(url.scheme())
        .ok_or_else(|| ResolveError::UnsupportedScheme(format!("{}:", url.scheme())))?;

    // The host of a non-special URL is opaque, so the hash keeps its case.
    let rest = match url.host_str() {
        Some(host) => format!("{host}{}", url.path()),
        None => url.path().to_string(),
    };
    let rest = rest.trim_start_matches('/');
    let (root, sub) = rest.split_once('/').unwrap_or((rest, ""));
    if root.is_empty() {
        return Err(ResolveError::UnsupportedScheme(format!(
            "missing content hash: {content}"
        )));
    }
    let sub = sub.trim_matches('/');
    let base = if sub.is_empty() {
        String::new()
    } else {
        format!("/{sub}")
    };
    Ok((scheme, root.to_string(), base))
}

/// Pick the current snapshot of `repo` from `events`.
///
/// Candidates must be authored by the owner, tagged with the repository name,
/// carry no participant tag and point at a supported content scheme. The
/// newest candidate wins; equal timestamps fall back to the larger event id.
pub fn select_commit(repo: &RepositoryRef, events: &[Event]) -> Result<Commit> {
    let mut best: Option<Commit> = None;
    let mut candidates = 0usize;
    for ev in events {
        if ev.has_tag(PARTICIPANT_TAG) {
            continue;
        }
        if ev.pubkey != repo.owner.as_hex() || !ev.has_tag_value(REPOSITORY_TAG, &repo.name) {
            continue;
        }
        let commit = match Commit::from_event(ev.clone()) {
            Ok(commit) => commit,
            Err(e) => {
                debug!(id = %ev.id, error = %e, "skipping non-commit event");
                continue;
            }
        };
        candidates += 1;
        let newer = match &best {
            None => true,
            Some(cur) => {
                (commit.event.created_at, &commit.event.id) > (cur.event.created_at, &cur.event.id)
            }
        };
        if newer {
            best = Some(commit);
        }
    }
    let commit = best.ok_or(ResolveError::RepositoryNotFound)?;
    debug!(
        repo = %repo,
        candidates,
        total = events.len(),
        id = %commit.event.id,
        "selected commit"
    );
    Ok(commit)
}
