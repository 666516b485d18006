//! Repository-relative paths.

use std::fmt;

use serde::Serialize;

/// A logical path inside a repository snapshot. Always starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RepoPath(String);

impl RepoPath {
    pub fn root() -> Self {
        RepoPath("/".into())
    }

    /// Prefix `raw` with `/` when it does not already start with one.
    pub fn new(raw: &str) -> Self {
        if raw.starts_with('/') {
            RepoPath(raw.to_string())
        } else {
            RepoPath(format!("/{raw}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.segments().next().is_none()
    }

    /// Non-empty components between slashes.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last component, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Child path for a directory entry `name`.
    pub fn join(&self, name: &str) -> Self {
        let name = name.trim_start_matches('/');
        if self.0.ends_with('/') {
            RepoPath(format!("{}{name}", self.0))
        } else {
            RepoPath(format!("{}/{name}", self.0))
        }
    }

    /// Navigation trail: `(label, link)` pairs starting with `(".", "/")`.
    ///
    /// `/src/lib` yields `[(".", "/"), ("src", "src"), ("lib", "src/lib")]`.
    pub fn breadcrumbs(&self) -> Vec<(String, String)> {
        let mut crumbs = vec![(".".to_string(), "/".to_string())];
        let mut link = String::new();
        for seg in self.segments() {
            if !link.is_empty() {
                link.push('/');
            }
            link.push_str(seg);
            crumbs.push((seg.to_string(), link.clone()));
        }
        crumbs
    }
}

impl Default for RepoPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepoPath {
    fn from(raw: &str) -> Self {
        RepoPath::new(raw)
    }
}
