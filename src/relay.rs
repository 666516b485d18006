//! Event transport over Nostr relays (NIP-01 `REQ`/`EVENT`/`EOSE`/`OK`).

use std::{collections::HashMap, time::Duration};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures_util::{future::join_all, SinkExt, StreamExt};
use rand::RngCore;
use secp256k1::SecretKey;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{client_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::TransportError,
    event::Event,
    identity::{Identity, RepositoryRef},
    transport::{
        repository_filter, sign_reply, thread_filter, unix_now, EventTransport,
    },
};

/// Kind of profile metadata events.
pub const METADATA_KIND: u32 = 0;

type RelayStream = WebSocketStream<Box<dyn AsyncReadWrite + Unpin + Send>>;

/// Queries every configured relay concurrently and merges their answers.
#[derive(Clone)]
pub struct RelayTransport {
    relays: Vec<String>,
    tor_socks: Option<String>,
    secret: Option<SecretKey>,
    timeout: Duration,
}

impl RelayTransport {
    pub fn new(relays: Vec<String>, timeout: Duration) -> Self {
        Self {
            relays,
            tor_socks: None,
            secret: None,
            timeout,
        }
    }

    /// Route relay connections through a SOCKS5 proxy (`host:port`).
    pub fn with_socks(mut self, proxy: Option<String>) -> Self {
        self.tor_socks = proxy;
        self
    }

    /// Key used to sign submitted replies.
    pub fn with_secret(mut self, secret: Option<SecretKey>) -> Self {
        self.secret = secret;
        self
    }

    /// Run `filter` on all relays. Succeeds when at least one relay answered.
    pub async fn query(&self, filter: Value) -> Result<Vec<Event>, TransportError> {
        if self.relays.is_empty() {
            return Err(TransportError::NoRelays);
        }
        let runs = self.relays.iter().map(|relay| {
            let filter = filter.clone();
            async move {
                let res = match timeout(
                    self.timeout,
                    query_relay(relay, filter, self.tor_socks.as_deref()),
                )
                .await
                {
                    Ok(res) => res,
                    Err(_) => Err(anyhow!("timed out after {:?}", self.timeout)),
                };
                (relay, res)
            }
        });

        let mut merged: HashMap<String, Event> = HashMap::new();
        let mut first_err = None;
        let mut answered = 0usize;
        for (relay, res) in join_all(runs).await {
            match res {
                Ok(events) => {
                    answered += 1;
                    debug!(%relay, count = events.len(), "relay answered");
                    for ev in events {
                        merged.entry(ev.id.clone()).or_insert(ev);
                    }
                }
                Err(e) => {
                    warn!(%relay, error = %e, "relay query failed");
                    first_err.get_or_insert(TransportError::Relay {
                        relay: relay.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        if answered == 0 {
            return Err(first_err.unwrap_or(TransportError::NoRelays));
        }
        Ok(merged.into_values().collect())
    }

    /// Send `ev` to every relay. Succeeds when at least one relay accepted it.
    pub async fn publish(&self, ev: &Event) -> Result<(), TransportError> {
        if self.relays.is_empty() {
            return Err(TransportError::NoRelays);
        }
        let runs = self.relays.iter().map(|relay| async move {
            let res = match timeout(
                self.timeout,
                publish_to_relay(relay, ev, self.tor_socks.as_deref()),
            )
            .await
            {
                Ok(res) => res,
                Err(_) => Err(anyhow!("timed out after {:?}", self.timeout)),
            };
            (relay, res)
        });

        let mut reasons = vec![];
        let mut accepted = false;
        for (relay, res) in join_all(runs).await {
            match res {
                Ok(()) => accepted = true,
                Err(e) => {
                    warn!(%relay, error = %e, "relay did not accept event");
                    reasons.push(format!("{relay}: {e}"));
                }
            }
        }
        if accepted {
            Ok(())
        } else {
            Err(TransportError::Rejected(reasons.join("; ")))
        }
    }

    /// A single event by id, if any relay has it.
    pub async fn fetch_event(&self, id: &str) -> Result<Option<Event>, TransportError> {
        let events = self.query(json!({ "ids": [id] })).await?;
        Ok(events.into_iter().find(|e| e.id == id))
    }

    /// Newest profile metadata event of `pubkey`, if any relay has one.
    pub async fn fetch_profile(&self, pubkey: &Identity) -> Result<Option<Event>, TransportError> {
        let events = self
            .query(json!({
                "authors": [pubkey.as_hex()],
                "kinds": [METADATA_KIND],
            }))
            .await?;
        Ok(events
            .into_iter()
            .filter(|e| e.kind == METADATA_KIND && e.pubkey == pubkey.as_hex())
            .max_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id))))
    }
}

#[async_trait]
impl EventTransport for RelayTransport {
    async fn query_by_repository(
        &self,
        repo: &RepositoryRef,
    ) -> Result<Vec<Event>, TransportError> {
        self.query(repository_filter(repo)).await
    }

    async fn query_by_thread(
        &self,
        repo: &RepositoryRef,
        root_id: &str,
    ) -> Result<Vec<Event>, TransportError> {
        self.query(thread_filter(repo, root_id)).await
    }

    async fn submit_reply(
        &self,
        repo: &RepositoryRef,
        root_id: &str,
        content: &str,
    ) -> Result<Event, TransportError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| TransportError::Signing("SECRET_KEY is not set".into()))?;
        let ev = sign_reply(secret, repo, root_id, content, unix_now())?;
        self.publish(&ev).await?;
        Ok(ev)
    }
}

fn subscription_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Issue one subscription and collect events until the relay signals EOSE.
async fn query_relay(relay: &str, filter: Value, tor_socks: Option<&str>) -> Result<Vec<Event>> {
    let mut ws = connect_ws(relay, tor_socks).await?;
    let sub_id = subscription_id();
    let req = json!(["REQ", sub_id, filter]);
    ws.send(Message::Text(req.to_string())).await?;

    let mut events = vec![];
    while let Some(msg) = ws.next().await {
        let txt = match msg? {
            Message::Text(txt) => txt,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(val) = serde_json::from_str::<Value>(&txt) else {
            continue;
        };
        let Some(arr) = val.as_array() else {
            continue;
        };
        let for_us = arr.get(1).and_then(|v| v.as_str()) == Some(sub_id.as_str());
        match arr.first().and_then(|v| v.as_str()) {
            Some("EVENT") if for_us && arr.len() >= 3 => {
                match serde_json::from_value::<Event>(arr[2].clone()) {
                    Ok(ev) => events.push(ev),
                    Err(e) => debug!(%relay, error = %e, "skipping malformed event"),
                }
            }
            Some("EOSE") if for_us => break,
            Some("CLOSED") if for_us => {
                let reason = arr.get(2).and_then(|v| v.as_str()).unwrap_or_default();
                bail!("subscription closed: {reason}");
            }
            Some("NOTICE") => debug!(%relay, notice = %txt, "relay notice"),
            _ => {}
        }
    }

    let _ = ws
        .send(Message::Text(json!(["CLOSE", sub_id]).to_string()))
        .await;
    let _ = ws.close(None).await;
    Ok(events)
}

/// Send one event and wait for the relay's `OK` verdict on it.
async fn publish_to_relay(relay: &str, ev: &Event, tor_socks: Option<&str>) -> Result<()> {
    let mut ws = connect_ws(relay, tor_socks).await?;
    ws.send(Message::Text(json!(["EVENT", ev]).to_string()))
        .await?;
    while let Some(msg) = ws.next().await {
        let txt = match msg? {
            Message::Text(txt) => txt,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(val) = serde_json::from_str::<Value>(&txt) else {
            continue;
        };
        let Some(arr) = val.as_array() else {
            continue;
        };
        if arr.first().and_then(|v| v.as_str()) == Some("OK")
            && arr.get(1).and_then(|v| v.as_str()) == Some(ev.id.as_str())
        {
            let _ = ws.close(None).await;
            let accepted = arr.get(2).and_then(|v| v.as_bool()).unwrap_or(false);
            if accepted {
                return Ok(());
            }
            let reason = arr.get(3).and_then(|v| v.as_str()).unwrap_or_default();
            bail!("rejected: {reason}");
        }
    }
    bail!("connection closed before OK")
}

/// Establish a WebSocket connection, optionally via a SOCKS5 proxy.
async fn connect_ws(relay: &str, tor_socks: Option<&str>) -> Result<RelayStream> {
    let url = Url::parse(relay)?;
    let host = url.host_str().ok_or_else(|| anyhow!("missing host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("missing port"))?;
    let req = relay.into_client_request()?;
    let stream: Box<dyn AsyncReadWrite + Unpin + Send> = if let Some(proxy) = tor_socks {
        Box::new(Socks5Stream::connect(proxy, (host, port)).await?)
    } else {
        Box::new(TcpStream::connect((host, port)).await?)
    };
    let (ws, _) = client_async(req, stream).await?;
    Ok(ws)
}

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}
