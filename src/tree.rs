//! Directory-versus-file resolution inside a snapshot.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::{
    commit::Commit,
    content::{load_file, FileDescriptor},
    error::{ResolveError, Result},
    path::RepoPath,
    store::{ContentStore, DirEntry},
};

static README: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^readme(\.(txt|md))?$").expect("valid regex"));

/// What the caller is going to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// A directory listing, or the file itself when the path is a file.
    Listing,
    /// A single rendered document; directories fall back to their readme.
    Document,
}

/// Result of resolving a logical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Resolved {
    Directory { entries: Vec<DirEntry> },
    File(FileDescriptor),
}

/// Resolve `path` inside `commit` for the given intent.
pub async fn resolve(
    store: &dyn ContentStore,
    commit: &Commit,
    path: &RepoPath,
    intent: Intent,
) -> Result<Resolved> {
    let locator = commit.locate(path);
    let store_path = locator.store_path();
    let entries = store.list(&store_path).await?;

    if entries.is_empty() {
        return Ok(Resolved::File(load_file(store, &locator).await?));
    }
    if !entries.iter().any(|e| !e.name.is_empty()) {
        return Err(ResolveError::NotADirectory(store_path));
    }

    match intent {
        Intent::Listing => Ok(Resolved::Directory { entries }),
        Intent::Document => {
            let readme = find_readme(&entries)
                .ok_or_else(|| ResolveError::IsADirectory(store_path.clone()))?;
            debug!(dir = %store_path, readme = %readme.name, "showing readme");
            let descriptor = load_file(store, &locator.child(&readme.name)).await?;
            Ok(Resolved::File(descriptor))
        }
    }
}

/// First listing entry named `readme`, `readme.md` or `readme.txt`, any case.
pub fn find_readme(entries: &[DirEntry]) -> Option<&DirEntry> {
    entries
        .iter()
        .find(|e| !e.is_directory && README.is_match(&e.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::{Event, Tag},
        store::MemoryStore,
    };

    fn commit() -> Commit {
        Commit::from_event(Event {
            id: "c1".into(),
            pubkey: "ab".repeat(32),
            kind: 1,
            created_at: 1,
            tags: vec![Tag::new(["r", "demo"])],
            content: "ipfs://Qm123/".into(),
            sig: String::new(),
        })
        .unwrap()
    }

    #[test]
    fn readme_matching() {
        let names = |ns: &[&str]| ns.iter().map(|n| DirEntry::file(*n)).collect::<Vec<_>>();
        let e = names(&["main.rs", "Readme.md"]);
        assert_eq!(find_readme(&e).unwrap().name, "Readme.md");
        assert!(find_readme(&names(&["README"])).is_some());
        assert!(find_readme(&names(&["readme.TXT"])).is_some());
        assert!(find_readme(&names(&["readme.rst", "not-readme.md", "main.rs"])).is_none());
        assert!(find_readme(&[DirEntry::dir("readme")]).is_none());
    }

    #[tokio::test]
    async fn root_document_uses_readme() {
        let store = MemoryStore::new()
            .with_file("Qm123/README.md", "# Demo")
            .with_file("Qm123/main.rs", "fn main() {}");
        let got = resolve(&store, &commit(), &RepoPath::root(), Intent::Document)
            .await
            .unwrap();
        let Resolved::File(d) = got else {
            panic!("expected file");
        };
        assert_eq!(d.path, "Qm123/README.md");
        assert_eq!(d.content.as_deref(), Some("# Demo"));
        assert!(!d.too_large);
    }

    #[tokio::test]
    async fn directory_without_readme_is_a_directory() {
        let store = MemoryStore::new().with_file("Qm123/main.rs", "fn main() {}");
        let err = resolve(&store, &commit(), &RepoPath::root(), Intent::Document)
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::IsADirectory("Qm123/".into()));
    }

    #[tokio::test]
    async fn listing_intent_returns_entries() {
        let store = MemoryStore::new()
            .with_file("Qm123/README.md", "# Demo")
            .with_file("Qm123/src/lib.rs", "");
        let got = resolve(&store, &commit(), &RepoPath::root(), Intent::Listing)
            .await
            .unwrap();
        assert_eq!(
            got,
            Resolved::Directory {
                entries: vec![DirEntry::dir("src"), DirEntry::file("README.md")]
            }
        );
    }

    #[tokio::test]
    async fn nested_readme_path_is_joined() {
        let store = MemoryStore::new().with_file("Qm123/docs/readme.txt", "docs");
        let got = resolve(&store, &commit(), &RepoPath::new("docs"), Intent::Document)
            .await
            .unwrap();
        let Resolved::File(d) = got else {
            panic!("expected file");
        };
        assert_eq!(d.path, "Qm123/docs/readme.txt");
    }

    #[tokio::test]
    async fn file_path_resolves_to_file_for_any_intent() {
        let store = MemoryStore::new().with_file("Qm123/src/lib.rs", "pub fn x() {}");
        for intent in [Intent::Listing, Intent::Document] {
            let got = resolve(&store, &commit(), &RepoPath::new("/src/lib.rs"), intent)
                .await
                .unwrap();
            let Resolved::File(d) = got else {
                panic!("expected file");
            };
            assert_eq!(d.content.as_deref(), Some("pub fn x() {}"));
            assert_eq!(d.language(), "rust");
        }
    }

    #[tokio::test]
    async fn unnamed_entries_are_not_a_directory() {
        let store = MemoryStore::new().with_listing("Qm123/blob", vec![DirEntry::file("")]);
        let err = resolve(&store, &commit(), &RepoPath::new("/blob"), Intent::Listing)
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::NotADirectory("Qm123/blob".into()));
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let store = MemoryStore::new().with_file("Qm123/a.txt", "a");
        let err = resolve(&store, &commit(), &RepoPath::new("/zzz"), Intent::Listing)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }
}
