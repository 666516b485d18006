//! Browse git repositories whose snapshots are announced as Nostr events and
//! stored in a content-addressed store.
//!
//! A repository is identified by its owner and name. The owner's newest
//! snapshot pointer is selected from the relay events ([`commit`]), paths are
//! resolved against the snapshot ([`tree`]), files are loaded under a size cap
//! ([`content`]), and issue or pull request discussions are assembled from
//! replies ([`thread`]). [`repo::Resolver`] wires these to an
//! [`transport::EventTransport`] and a [`store::ContentStore`].

pub mod commit;
pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod identity;
pub mod ipfs;
pub mod path;
pub mod profile;
pub mod relay;
pub mod repo;
pub mod store;
pub mod thread;
pub mod transport;
pub mod tree;
pub mod view;
