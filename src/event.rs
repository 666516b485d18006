//! Nostr event model.

use secp256k1::{Keypair, Message, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// The first element names the tag, the remaining ones carry its values.
/// Tags this crate relies on:
///
/// - `r` – repository name the event belongs to
/// - `e` – thread root an event replies to
/// - `p` – participant; its presence marks an event as a comment
/// - `c` / `m` – issue / pull request title on a thread root
///
/// Unknown tags are kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tag(fields.into_iter().map(Into::into).collect())
    }

    /// Tag name, e.g. `"e"`.
    pub fn key(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// First value after the name.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// Signed event as delivered by relays.
///
/// ```json
/// {
///   "id": "aa11",
///   "pubkey": "79be667e...",
///   "kind": 1,
///   "created_at": 1700000000,
///   "tags": [["r", "demo"]],
///   "content": "ipfs://Qm123/",
///   "sig": "deadbeef"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Kind number.
    pub kind: u32,
    /// Unix timestamp of creation.
    pub created_at: u64,
    pub tags: Vec<Tag>,
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

impl Event {
    /// True when any tag is named `key`.
    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.iter().any(|t| t.key() == Some(key))
    }

    /// First value of the first tag named `key`.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key() == Some(key))
            .and_then(Tag::value)
    }

    /// True when some `key` tag carries `value` as its first value.
    pub fn has_tag_value(&self, key: &str, value: &str) -> bool {
        self.tags
            .iter()
            .any(|t| t.key() == Some(key) && t.value() == Some(value))
    }
}

/// Event fields before id and signature are computed.
#[derive(Debug, Clone)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub kind: u32,
    pub created_at: u64,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl UnsignedEvent {
    /// Compute the id and sign it with `secret`, whose x-only public key
    /// replaces `pubkey`.
    pub fn sign(mut self, secret: &SecretKey) -> Result<Event, serde_json::Error> {
        let secp = Secp256k1::new();
        let kp = Keypair::from_secret_key(&secp, secret);
        self.pubkey = hex::encode(kp.x_only_public_key().0.serialize());
        let hash = event_hash(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)?;
        let msg = Message::from_digest(hash);
        let sig = secp.sign_schnorr_no_aux_rand(&msg, &kp);
        Ok(Event {
            id: hex::encode(hash),
            pubkey: self.pubkey,
            kind: self.kind,
            created_at: self.created_at,
            tags: self.tags,
            content: self.content,
            sig: hex::encode(sig.as_ref()),
        })
    }
}

/// Compute the NIP-01 event hash from its fields.
pub fn event_hash(
    pubkey: &str,
    created_at: u64,
    kind: u32,
    tags: &[Tag],
    content: &str,
) -> Result<[u8; 32], serde_json::Error> {
    let arr = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
    let data = serde_json::to_vec(&arr)?;
    Ok(Sha256::digest(&data).into())
}
