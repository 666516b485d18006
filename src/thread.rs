//! Issue and pull request discussion threads.

use std::{cmp::Reverse, collections::HashSet, sync::Arc};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    content::FileDescriptor,
    error::Result,
    event::Event,
    identity::RepositoryRef,
    transport::{EventTransport, ISSUE_TITLE_TAG, PULL_REQUEST_TITLE_TAG, ROOT_TAG},
};

/// Flavour of a thread root; only changes how the root itself is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadKind {
    Issue,
    PullRequest,
}

/// Title, author and body of a thread root, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadHeader {
    pub title: String,
    pub author: String,
    pub body: FileDescriptor,
}

/// Replies to a root event, oldest first. Single level, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    pub root_id: String,
    pub replies: Vec<Event>,
}

impl Thread {
    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

/// Frame a root event for display. `root_hash` anchors relative links in the
/// markdown body to the repository snapshot.
pub fn frame_root(root: &Event, kind: ThreadKind, root_hash: &str) -> ThreadHeader {
    let title_tag = match kind {
        ThreadKind::Issue => ISSUE_TITLE_TAG,
        ThreadKind::PullRequest => PULL_REQUEST_TITLE_TAG,
    };
    let title = root
        .tag_value(title_tag)
        .filter(|t| !t.is_empty())
        .unwrap_or("Untitled")
        .to_string();
    let body = match kind {
        ThreadKind::Issue => root.content.clone(),
        ThreadKind::PullRequest => {
            format!("Wants to merge ``{}`` into this repository", root.content)
        }
    };
    ThreadHeader {
        title,
        author: root.pubkey.clone(),
        body: comment_body_text(body, root_hash),
    }
}

/// Markdown descriptor for a reply body.
pub fn comment_body(reply: &Event, root_hash: &str) -> FileDescriptor {
    comment_body_text(reply.content.clone(), root_hash)
}

fn comment_body_text(content: String, root_hash: &str) -> FileDescriptor {
    FileDescriptor::markdown(format!("{root_hash}/issue.md"), content)
}

/// Keep replies to `root_id`, drop duplicates, order oldest first.
///
/// Sorting is newest-first by `(created_at, id)` and then reversed, so equal
/// timestamps still come out in a stable order.
pub fn order_replies(root_id: &str, events: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    let mut replies: Vec<Event> = events
        .into_iter()
        .filter(|e| e.id != root_id && e.has_tag_value(ROOT_TAG, root_id))
        .filter(|e| seen.insert(e.id.clone()))
        .collect();
    replies.sort_by(|a, b| {
        (Reverse(a.created_at), Reverse(&a.id)).cmp(&(Reverse(b.created_at), Reverse(&b.id)))
    });
    replies.reverse();
    replies
}

/// Fetch and order the replies to `root_id`. Zero replies is a valid thread.
pub async fn fetch_thread(
    transport: &dyn EventTransport,
    repo: &RepositoryRef,
    root_id: &str,
) -> Result<Thread> {
    let events = transport.query_by_thread(repo, root_id).await?;
    let fetched = events.len();
    let replies = order_replies(root_id, events);
    debug!(root = %root_id, fetched, replies = replies.len(), "fetched thread");
    Ok(Thread {
        root_id: root_id.to_string(),
        replies,
    })
}

/// A thread being viewed and replied to.
///
/// Submitting a reply never edits the loaded thread: the session drops it and
/// refetches, so only events the transport returns are ever shown.
pub struct ThreadSession {
    transport: Arc<dyn EventTransport>,
    repo: RepositoryRef,
    root_id: String,
    current: Option<Thread>,
    editor_generation: u64,
}

impl ThreadSession {
    pub fn new(transport: Arc<dyn EventTransport>, repo: RepositoryRef, root_id: &str) -> Self {
        Self {
            transport,
            repo,
            root_id: root_id.to_string(),
            current: None,
            editor_generation: 0,
        }
    }

    /// Loaded thread, if any fetch has completed since the last invalidation.
    pub fn current(&self) -> Option<&Thread> {
        self.current.as_ref()
    }

    /// Bumped after every accepted reply so editors can clear their draft.
    pub fn editor_generation(&self) -> u64 {
        self.editor_generation
    }

    pub async fn refresh(&mut self) -> Result<&Thread> {
        let thread = fetch_thread(self.transport.as_ref(), &self.repo, &self.root_id).await?;
        Ok(&*self.current.insert(thread))
    }

    /// Submit a reply, then invalidate and refetch the thread.
    pub async fn reply(&mut self, content: &str) -> Result<&Thread> {
        let ev = self
            .transport
            .submit_reply(&self.repo, &self.root_id, content)
            .await?;
        info!(root = %self.root_id, id = %ev.id, "reply accepted");
        self.current = None;
        self.editor_generation += 1;
        self.refresh().await
    }
}
