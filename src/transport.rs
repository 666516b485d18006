//! Event transport: how resolvers reach the signed event log.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use secp256k1::SecretKey;
use serde_json::{json, Value};

use crate::{
    error::TransportError,
    event::{Event, Tag, UnsignedEvent},
    identity::RepositoryRef,
};

/// Repository name every repository event carries.
pub const REPOSITORY_TAG: &str = "r";
/// Marks an event as a comment; commits never carry it.
pub const PARTICIPANT_TAG: &str = "p";
/// Thread root a reply belongs to.
pub const ROOT_TAG: &str = "e";
pub const ISSUE_TITLE_TAG: &str = "c";
pub const PULL_REQUEST_TITLE_TAG: &str = "m";
pub const REPLY_KIND: u32 = 1;

/// Access to the append-only event log. Results are unordered and may be
/// incomplete or contain duplicates.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Events published by the owner under the repository name.
    async fn query_by_repository(&self, repo: &RepositoryRef)
        -> Result<Vec<Event>, TransportError>;

    /// Replies attached to `root_id` within the repository.
    async fn query_by_thread(
        &self,
        repo: &RepositoryRef,
        root_id: &str,
    ) -> Result<Vec<Event>, TransportError>;

    /// Publish a reply to `root_id` and return the accepted event.
    async fn submit_reply(
        &self,
        repo: &RepositoryRef,
        root_id: &str,
        content: &str,
    ) -> Result<Event, TransportError>;
}

/// Relay filter for [`EventTransport::query_by_repository`].
pub fn repository_filter(repo: &RepositoryRef) -> Value {
    json!({
        "authors": [repo.owner.as_hex()],
        "#r": [repo.name],
    })
}

/// Relay filter for [`EventTransport::query_by_thread`].
pub fn thread_filter(repo: &RepositoryRef, root_id: &str) -> Value {
    json!({
        "#e": [root_id],
        "#p": [repo.owner.as_hex()],
        "#r": [repo.name],
    })
}

/// Tags placed on a reply to `root_id`.
pub fn reply_tags(repo: &RepositoryRef, root_id: &str) -> Vec<Tag> {
    vec![
        Tag::new([ROOT_TAG, root_id, "", "reply"]),
        Tag::new([PARTICIPANT_TAG, repo.owner.as_hex()]),
        Tag::new([REPOSITORY_TAG, repo.name.as_str()]),
    ]
}

/// Build and sign a reply event.
pub fn sign_reply(
    secret: &SecretKey,
    repo: &RepositoryRef,
    root_id: &str,
    content: &str,
    created_at: u64,
) -> Result<Event, TransportError> {
    UnsignedEvent {
        pubkey: String::new(),
        kind: REPLY_KIND,
        created_at,
        tags: reply_tags(repo, root_id),
        content: content.to_string(),
    }
    .sign(secret)
    .map_err(|e| TransportError::Signing(e.to_string()))
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Transport over a fixed in-process event set, applying the same filters a
/// relay would.
pub struct MemoryTransport {
    events: Mutex<Vec<Event>>,
    secret: Option<SecretKey>,
    offline: Mutex<bool>,
    queries: AtomicUsize,
}

impl MemoryTransport {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: Mutex::new(events),
            secret: None,
            offline: Mutex::new(false),
            queries: AtomicUsize::new(0),
        }
    }

    /// Enable [`EventTransport::submit_reply`] with the given signing key.
    pub fn with_secret(mut self, secret: SecretKey) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn push(&self, ev: Event) {
        self.events.lock().push(ev);
    }

    /// Make every call fail with a relay error.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    /// Number of queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), TransportError> {
        if *self.offline.lock() {
            return Err(TransportError::Relay {
                relay: "memory".into(),
                reason: "offline".into(),
            });
        }
        Ok(())
    }

    fn matching(&self, pred: impl Fn(&Event) -> bool) -> Result<Vec<Event>, TransportError> {
        self.check_online()?;
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.events.lock().iter().filter(|e| pred(e)).cloned().collect())
    }
}

#[async_trait]
impl EventTransport for MemoryTransport {
    async fn query_by_repository(
        &self,
        repo: &RepositoryRef,
    ) -> Result<Vec<Event>, TransportError> {
        self.matching(|e| {
            e.pubkey == repo.owner.as_hex() && e.has_tag_value(REPOSITORY_TAG, &repo.name)
        })
    }

    async fn query_by_thread(
        &self,
        repo: &RepositoryRef,
        root_id: &str,
    ) -> Result<Vec<Event>, TransportError> {
        self.matching(|e| {
            e.has_tag_value(ROOT_TAG, root_id) && e.has_tag_value(REPOSITORY_TAG, &repo.name)
        })
    }

    async fn submit_reply(
        &self,
        repo: &RepositoryRef,
        root_id: &str,
        content: &str,
    ) -> Result<Event, TransportError> {
        self.check_online()?;
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| TransportError::Signing("no secret key configured".into()))?;
        let mut events = self.events.lock();
        // Keep replies strictly after everything already stored.
        let created_at = events
            .iter()
            .map(|e| e.created_at + 1)
            .max()
            .unwrap_or(0)
            .max(unix_now());
        let ev = sign_reply(secret, repo, root_id, content, created_at)?;
        events.push(ev.clone());
        Ok(ev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepositoryRef {
        RepositoryRef::parse(&"ab".repeat(32), "demo").unwrap()
    }

    #[test]
    fn reply_tags_mark_comment() {
        let tags = reply_tags(&repo(), "root1");
        assert_eq!(tags[0], Tag::new(["e", "root1", "", "reply"]));
        assert_eq!(tags[1].key(), Some(PARTICIPANT_TAG));
        assert_eq!(tags[2], Tag::new(["r", "demo"]));
    }

    #[test]
    fn filters_follow_conventions() {
        let f = repository_filter(&repo());
        assert_eq!(f["authors"][0], "ab".repeat(32));
        assert_eq!(f["#r"][0], "demo");
        let t = thread_filter(&repo(), "root1");
        assert_eq!(t["#e"][0], "root1");
    }

    #[tokio::test]
    async fn memory_transport_submit_then_query() {
        let sk = SecretKey::from_slice(&[3u8; 32]).unwrap();
        let transport = MemoryTransport::new(vec![]).with_secret(sk);
        let ev = transport.submit_reply(&repo(), "root1", "hi").await.unwrap();
        assert!(ev.has_tag(PARTICIPANT_TAG));
        let thread = transport.query_by_thread(&repo(), "root1").await.unwrap();
        assert_eq!(thread, vec![ev]);
        assert!(transport
            .query_by_thread(&repo(), "other")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(transport.query_count(), 2);
    }

    #[tokio::test]
    async fn memory_transport_offline_and_unsigned() {
        let transport = MemoryTransport::new(vec![]);
        assert!(matches!(
            transport.submit_reply(&repo(), "r", "x").await,
            Err(TransportError::Signing(_))
        ));
        transport.set_offline(true);
        assert!(matches!(
            transport.query_by_repository(&repo()).await,
            Err(TransportError::Relay { .. })
        ));
    }
}
