//! Wiring of collaborators to the resolvers.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::{
    commit::{select_commit, Commit},
    error::Result,
    identity::RepositoryRef,
    path::RepoPath,
    store::ContentStore,
    thread::{fetch_thread, Thread, ThreadSession},
    transport::EventTransport,
    tree::{self, Intent, Resolved},
    view::{ViewState, Views},
};

/// Entry point for resolving repositories against a transport and a store.
#[derive(Clone)]
pub struct Resolver {
    transport: Arc<dyn EventTransport>,
    store: Arc<dyn ContentStore>,
}

impl Resolver {
    pub fn new(transport: Arc<dyn EventTransport>, store: Arc<dyn ContentStore>) -> Self {
        Self { transport, store }
    }

    pub fn transport(&self) -> &Arc<dyn EventTransport> {
        &self.transport
    }

    /// Fetch the repository's events and select its current snapshot.
    pub async fn commit(&self, repo: &RepositoryRef) -> Result<Commit> {
        let events = self.transport.query_by_repository(repo).await?;
        select_commit(repo, &events)
    }

    /// Resolve `path` in the repository's current snapshot.
    pub async fn open(&self, repo: &RepositoryRef, path: &RepoPath, intent: Intent) -> Result<Page> {
        let commit = self.commit(repo).await?;
        let resolved = tree::resolve(self.store.as_ref(), &commit, path, intent).await?;
        Ok(Page {
            commit_id: commit.event.id.clone(),
            root_hash: commit.root_hash().to_string(),
            path: path.clone(),
            resolved,
        })
    }

    pub async fn thread(&self, repo: &RepositoryRef, root_id: &str) -> Result<Thread> {
        fetch_thread(self.transport.as_ref(), repo, root_id).await
    }

    pub fn thread_session(&self, repo: RepositoryRef, root_id: &str) -> ThreadSession {
        ThreadSession::new(Arc::clone(&self.transport), repo, root_id)
    }
}

/// A resolved path together with the snapshot it was resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub commit_id: String,
    pub root_hash: String,
    pub path: RepoPath,
    pub resolved: Resolved,
}

/// Display slot: one per repository and intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub repo: RepositoryRef,
    pub intent: Intent,
}

/// Display slot for one discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub repo: RepositoryRef,
    pub root_id: String,
}

/// Navigation over a repository where the newest request for a slot wins.
pub struct Browser {
    resolver: Resolver,
    pages: Views<PageKey, Page>,
    threads: Views<ThreadKey, Thread>,
}

impl Browser {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            pages: Views::new(),
            threads: Views::new(),
        }
    }

    /// Resolve `path` into the slot for `(repo, intent)`. Returns `false` when
    /// a newer navigation superseded this one before it finished.
    pub async fn navigate(&self, repo: &RepositoryRef, path: RepoPath, intent: Intent) -> bool {
        let key = PageKey {
            repo: repo.clone(),
            intent,
        };
        let applied = self
            .pages
            .run(key, self.resolver.open(repo, &path, intent))
            .await;
        if !applied {
            info!(%path, "navigation superseded");
        }
        applied
    }

    pub fn page(&self, repo: &RepositoryRef, intent: Intent) -> Option<ViewState<Page>> {
        self.pages.get(&PageKey {
            repo: repo.clone(),
            intent,
        })
    }

    /// Load the replies to `root_id` into its slot. Returns `false` when
    /// superseded.
    pub async fn open_thread(&self, repo: &RepositoryRef, root_id: &str) -> bool {
        let key = ThreadKey {
            repo: repo.clone(),
            root_id: root_id.to_string(),
        };
        self.threads
            .run(key, self.resolver.thread(repo, root_id))
            .await
    }

    /// Submit a reply, then drop the shown thread and refetch it. Loads that
    /// started before the reply can no longer land.
    pub async fn reply(&self, repo: &RepositoryRef, root_id: &str, content: &str) -> Result<bool> {
        let ev = self
            .resolver
            .transport()
            .submit_reply(repo, root_id, content)
            .await?;
        info!(root = %root_id, id = %ev.id, "reply accepted");
        self.threads.invalidate(&ThreadKey {
            repo: repo.clone(),
            root_id: root_id.to_string(),
        });
        Ok(self.open_thread(repo, root_id).await)
    }

    pub fn thread(&self, repo: &RepositoryRef, root_id: &str) -> Option<ViewState<Thread>> {
        self.threads.get(&ThreadKey {
            repo: repo.clone(),
            root_id: root_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{ResolveError, StoreError, TransportError},
        event::{Event, Tag},
        store::{ByteStream, DirEntry, MemoryStore},
        transport::MemoryTransport,
    };
    use async_trait::async_trait;
    use secp256k1::SecretKey;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    const OWNER: &str = "abcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabca";

    fn repo() -> RepositoryRef {
        RepositoryRef::parse(OWNER, "demo").unwrap()
    }

    fn commit_event(id: &str, created_at: u64, uri: &str) -> Event {
        Event {
            id: id.into(),
            pubkey: OWNER.into(),
            kind: 1,
            created_at,
            tags: vec![Tag::new(["r", "demo"])],
            content: uri.into(),
            sig: String::new(),
        }
    }

    fn resolver(events: Vec<Event>, store: impl ContentStore + 'static) -> Resolver {
        Resolver::new(Arc::new(MemoryTransport::new(events)), Arc::new(store))
    }

    #[tokio::test]
    async fn open_root_shows_readme() {
        let r = resolver(
            vec![commit_event("c1", 1, "ipfs://Qm123/")],
            MemoryStore::new().with_file("Qm123/README.md", "hello"),
        );
        let page = r.open(&repo(), &RepoPath::root(), Intent::Document).await.unwrap();
        assert_eq!(page.commit_id, "c1");
        let Resolved::File(d) = page.resolved else {
            panic!("expected file");
        };
        assert_eq!(d.path, "Qm123/README.md");
        assert_eq!(d.content.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn unknown_repository() {
        let r = resolver(vec![], MemoryStore::new());
        assert_eq!(
            r.open(&repo(), &RepoPath::root(), Intent::Listing).await,
            Err(ResolveError::RepositoryNotFound)
        );
    }

    #[tokio::test]
    async fn repeated_resolution_is_identical() {
        let r = resolver(
            vec![commit_event("c1", 1, "ipfs://Qm123/"), commit_event("c0", 0, "ipfs://QmOld/")],
            MemoryStore::new()
                .with_file("Qm123/src/a.rs", "a")
                .with_file("Qm123/src/b.rs", "b"),
        );
        for intent in [Intent::Listing, Intent::Document] {
            let path = RepoPath::new(if intent == Intent::Listing { "/src" } else { "/src/a.rs" });
            let first = r.open(&repo(), &path, intent).await.unwrap();
            let second = r.open(&repo(), &path, intent).await.unwrap();
            assert_eq!(first, second);
        }
    }

    /// Store whose listing of one path blocks until released.
    struct GatedStore {
        inner: MemoryStore,
        gated: String,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ContentStore for GatedStore {
        async fn list(&self, path: &str) -> std::result::Result<Vec<DirEntry>, StoreError> {
            if path == self.gated {
                self.gate.notified().await;
            }
            self.inner.list(path).await
        }

        async fn stream(&self, path: &str) -> std::result::Result<ByteStream, StoreError> {
            self.inner.stream(path).await
        }
    }

    #[tokio::test]
    async fn slow_earlier_navigation_does_not_overwrite_newer() {
        let gate = Arc::new(Notify::new());
        let store = GatedStore {
            inner: MemoryStore::new()
                .with_file("Qm123/a.txt", "A")
                .with_file("Qm123/b.txt", "B"),
            gated: "Qm123/a.txt".into(),
            gate: gate.clone(),
        };
        let browser = Browser::new(resolver(vec![commit_event("c1", 1, "ipfs://Qm123/")], store));
        let repo = repo();

        let nav_a = browser.navigate(&repo, RepoPath::new("/a.txt"), Intent::Document);
        let nav_b = async {
            tokio::task::yield_now().await;
            let applied = browser
                .navigate(&repo, RepoPath::new("/b.txt"), Intent::Document)
                .await;
            // `/b` is done; now let `/a` finish late.
            gate.notify_one();
            applied
        };
        let (applied_a, applied_b) = tokio::join!(nav_a, nav_b);
        assert!(!applied_a);
        assert!(applied_b);

        let Some(ViewState::Ready(page)) = browser.page(&repo, Intent::Document) else {
            panic!("expected a ready page");
        };
        assert_eq!(page.path, RepoPath::new("/b.txt"));
        let Resolved::File(d) = page.resolved else {
            panic!("expected file");
        };
        assert_eq!(d.content.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn failures_are_shown_per_slot() {
        let browser = Browser::new(resolver(
            vec![commit_event("c1", 1, "ipfs://Qm123/")],
            MemoryStore::new().with_file("Qm123/main.rs", ""),
        ));
        assert!(browser.navigate(&repo(), RepoPath::root(), Intent::Document).await);
        assert!(browser.navigate(&repo(), RepoPath::root(), Intent::Listing).await);
        assert_eq!(
            browser.page(&repo(), Intent::Document),
            Some(ViewState::Failed(ResolveError::IsADirectory("Qm123/".into())))
        );
        assert!(matches!(
            browser.page(&repo(), Intent::Listing),
            Some(ViewState::Ready(Page {
                resolved: Resolved::Directory { .. },
                ..
            }))
        ));
    }

    /// Transport whose first thread query answers with the events present
    /// when it started, but only after the gate opens.
    struct GatedThreads {
        inner: MemoryTransport,
        first: AtomicBool,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl EventTransport for GatedThreads {
        async fn query_by_repository(
            &self,
            repo: &RepositoryRef,
        ) -> std::result::Result<Vec<Event>, TransportError> {
            self.inner.query_by_repository(repo).await
        }

        async fn query_by_thread(
            &self,
            repo: &RepositoryRef,
            root_id: &str,
        ) -> std::result::Result<Vec<Event>, TransportError> {
            let snapshot = self.inner.query_by_thread(repo, root_id).await;
            if self.first.swap(false, Ordering::SeqCst) {
                self.gate.notified().await;
            }
            snapshot
        }

        async fn submit_reply(
            &self,
            repo: &RepositoryRef,
            root_id: &str,
            content: &str,
        ) -> std::result::Result<Event, TransportError> {
            self.inner.submit_reply(repo, root_id, content).await
        }
    }

    #[tokio::test]
    async fn load_started_before_reply_cannot_hide_it() {
        let gate = Arc::new(Notify::new());
        let transport = GatedThreads {
            inner: MemoryTransport::new(vec![])
                .with_secret(SecretKey::from_slice(&[5u8; 32]).unwrap()),
            first: AtomicBool::new(true),
            gate: gate.clone(),
        };
        let browser = Browser::new(Resolver::new(Arc::new(transport), Arc::new(MemoryStore::new())));
        let repo = repo();

        let early = browser.open_thread(&repo, "root1");
        let replying = async {
            tokio::task::yield_now().await;
            let applied = browser.reply(&repo, "root1", "first!").await.unwrap();
            gate.notify_one();
            applied
        };
        let (applied_early, applied_reply) = tokio::join!(early, replying);
        assert!(!applied_early);
        assert!(applied_reply);

        let Some(ViewState::Ready(thread)) = browser.thread(&repo, "root1") else {
            panic!("expected a ready thread");
        };
        let contents: Vec<&str> = thread.replies.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["first!"]);
    }
}
