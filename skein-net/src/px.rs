use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use skein_types::primitives::{unix_now, Principal};
use skein_types::wire::{PeerRecord, PxMessage};

use crate::config::{PxConfig, Visibility};
use crate::error::NetError;
use crate::framing::{encode_frame, FrameBuffer};
use crate::protocol::PX_PROTOCOL;
use crate::transport::{IncomingStream, Transport};

/// Source tag for records learned through a resolve response.
const SOURCE_RESOLVE: &str = "resolve";

/// Source tag for records inserted through the privileged direct path.
const SOURCE_DIRECT: &str = "direct";

/// One cached address record. Owned exclusively by [`PeerExchange`].
#[derive(Debug, Clone)]
pub struct PeerCacheEntry {
    pub record: PeerRecord,
    /// Where the record came from: "resolve", "direct", or the pushing
    /// peer's transport id.
    pub source: String,
    /// Insertion time; expiry counts from here, not from `last_seen`.
    pub cached_at: Instant,
    /// True only for records inserted via the privileged direct path,
    /// never settable from the wire.
    pub verified: bool,
}

type PeerCache = HashMap<Principal, PeerCacheEntry>;

/// The peer-exchange (discovery) service.
///
/// Maintains a bounded-freshness cache of peer address records and serves
/// resolve/push requests over its own protocol channel, gated by the
/// configured visibility policy. An explicitly owned component: every node
/// instance constructs its own, so multiple nodes in one process never
/// share cache state.
pub struct PeerExchange {
    /// Self-handle for spawning service tasks from `&self`.
    this: Weak<PeerExchange>,
    transport: Arc<dyn Transport>,
    local: Mutex<PeerRecord>,
    cache: Mutex<PeerCache>,
    config: Mutex<PxConfig>,
}

impl PeerExchange {
    pub fn new(
        transport: Arc<dyn Transport>,
        local_principal: Principal,
        addresses: Vec<String>,
        config: PxConfig,
    ) -> Arc<Self> {
        let peer_id = transport.local_id();
        Arc::new_cyclic(|weak| Self {
            this: weak.clone(),
            transport,
            local: Mutex::new(PeerRecord {
                principal: local_principal,
                addresses,
                peer_id,
                last_seen: unix_now(),
            }),
            cache: Mutex::new(HashMap::new()),
            config: Mutex::new(config),
        })
    }

    /// Register the protocol handler and start the eviction sweep.
    pub async fn start(&self) -> Result<(), NetError> {
        let mut incoming = self.transport.listen(PX_PROTOCOL).await?;
        let this = match self.this.upgrade() {
            Some(this) => this,
            None => return Ok(()),
        };

        let px = Arc::clone(&this);
        tokio::spawn(async move {
            while let Some(stream) = incoming.recv().await {
                let px = Arc::clone(&px);
                tokio::spawn(async move {
                    px.handle_stream(stream).await;
                });
            }
        });

        let px = this;
        let sweep_interval = self.lock_config().sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                px.evict_expired();
            }
        });

        info!(local = %self.transport.local_id(), "peer exchange started");
        Ok(())
    }

    // ─── Public API ──────────────────────────────────────────────────────────

    /// Resolve a principal's address record: local cache first, then a wire
    /// request through `via_address`. All failures (including timeout) are
    /// logged and swallowed; discovery never takes a session down.
    pub async fn resolve(&self, principal: &str, via_address: &str) -> Option<PeerRecord> {
        let (ttl, budget) = {
            let config = self.lock_config();
            (config.cache_ttl, config.resolve_timeout)
        };

        {
            let cache = self.lock_cache();
            if let Some(entry) = cache.get(principal) {
                if entry.cached_at.elapsed() < ttl {
                    return Some(entry.record.clone());
                }
            }
        }

        match timeout(budget, self.resolve_remote(principal, via_address)).await {
            Ok(Ok(Some(record))) => {
                self.insert_record(record.clone(), SOURCE_RESOLVE.to_string(), false);
                Some(record)
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(%principal, via = %via_address, "resolve failed: {}", e);
                None
            }
            Err(_) => {
                warn!(%principal, via = %via_address, "resolve timed out");
                None
            }
        }
    }

    /// Push peer records to `target_address`. With no explicit list, shares
    /// our own record plus every cached, unexpired, visibility-authorized
    /// entry, capped at the configured maximum. Failures are logged and
    /// swallowed.
    pub async fn push_peers(&self, target_address: &str, peers: Option<Vec<PeerRecord>>) {
        let mut records = match peers {
            Some(records) => records,
            None => self.shareable_records(target_address),
        };
        if records.is_empty() {
            return;
        }

        let max = self.lock_config().max_push_peers;
        records.truncate(max);

        if let Err(e) = self.send_push(target_address, records).await {
            warn!(target = %target_address, "peer push failed: {}", e);
        }
    }

    /// Privileged insert for a peer we authenticated over a direct
    /// connection. This is the only path that sets `verified`; nothing on
    /// the wire can reach it.
    pub fn add_verified_peer(&self, principal: &str, peer_id: &str, addresses: Vec<String>) {
        self.insert_record(
            PeerRecord {
                principal: principal.to_string(),
                addresses,
                peer_id: peer_id.to_string(),
                last_seen: unix_now(),
            },
            SOURCE_DIRECT.to_string(),
            true,
        );
    }

    /// All unexpired cached records.
    pub fn get_known_peers(&self) -> Vec<PeerRecord> {
        let ttl = self.lock_config().cache_ttl;
        self.lock_cache()
            .values()
            .filter(|entry| entry.cached_at.elapsed() < ttl)
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// One unexpired cached record.
    pub fn get_peer(&self, principal: &str) -> Option<PeerRecord> {
        let ttl = self.lock_config().cache_ttl;
        let cache = self.lock_cache();
        cache
            .get(principal)
            .filter(|entry| entry.cached_at.elapsed() < ttl)
            .map(|entry| entry.record.clone())
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.lock_config().visibility = visibility;
    }

    pub fn set_allowlist(&self, principals: Vec<Principal>) {
        self.lock_config().allowlist = principals;
    }

    /// Update the addresses advertised in our own record.
    pub fn set_local_addresses(&self, addresses: Vec<String>) {
        let mut local = self.lock_local();
        local.addresses = addresses;
        local.last_seen = unix_now();
    }

    // ─── Wire handling ───────────────────────────────────────────────────────

    async fn handle_stream(self: Arc<Self>, incoming: IncomingStream) {
        let mut stream = incoming.stream;
        let remote_id = incoming.remote_id;
        let mut frames = FrameBuffer::new();
        let mut chunk = [0u8; 8192];

        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!(peer = %remote_id, "px stream read ended: {}", e);
                    break;
                }
            };
            frames.extend(&chunk[..n]);

            loop {
                match frames.next_frame::<PxMessage>() {
                    Ok(Some(msg)) => {
                        if let Some(response) = self.handle_message(msg, &remote_id) {
                            let bytes = match encode_frame(&response) {
                                Ok(bytes) => bytes,
                                Err(e) => {
                                    warn!("px response encode failed: {}", e);
                                    return;
                                }
                            };
                            if stream.write_all(&bytes).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(peer = %remote_id, "px frame error: {}", e);
                        return;
                    }
                }
            }
        }
    }

    fn handle_message(&self, msg: PxMessage, remote_peer_id: &str) -> Option<PxMessage> {
        match msg {
            PxMessage::ResolveRequest {
                principal,
                request_id,
            } => Some(self.handle_resolve_request(&principal, request_id, remote_peer_id)),
            PxMessage::Push { peers } => {
                debug!(peer = %remote_peer_id, count = peers.len(), "received peer push");
                for record in peers {
                    self.insert_record(record, remote_peer_id.to_string(), false);
                }
                None
            }
            PxMessage::ResolveResponse { .. } => {
                debug!(peer = %remote_peer_id, "ignoring unsolicited resolve response");
                None
            }
        }
    }

    fn handle_resolve_request(
        &self,
        principal: &str,
        request_id: [u8; 16],
        remote_peer_id: &str,
    ) -> PxMessage {
        let (visibility, allowlist, ttl) = {
            let config = self.lock_config();
            (
                config.visibility,
                config.allowlist.clone(),
                config.cache_ttl,
            )
        };
        let cache = self.lock_cache();

        match cache.get(principal) {
            // A known peer whose record we may not disclose: explicit
            // refusal, even if the record has expired.
            Some(_) if !authorized(&cache, visibility, &allowlist, remote_peer_id) => {
                PxMessage::ResolveResponse {
                    request_id,
                    peer: None,
                    error: Some("not authorized".to_string()),
                }
            }
            Some(entry) if entry.cached_at.elapsed() < ttl => PxMessage::ResolveResponse {
                request_id,
                peer: Some(entry.record.clone()),
                error: None,
            },
            _ => PxMessage::ResolveResponse {
                request_id,
                peer: None,
                error: None,
            },
        }
    }

    async fn resolve_remote(
        &self,
        principal: &str,
        via_address: &str,
    ) -> Result<Option<PeerRecord>, NetError> {
        let mut stream = self.transport.dial(via_address, PX_PROTOCOL).await?;

        let mut request_id = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut request_id);
        let request = PxMessage::ResolveRequest {
            principal: principal.to_string(),
            request_id,
        };
        stream
            .write_all(&encode_frame(&request)?)
            .await
            .map_err(|e| NetError::Transport {
                reason: format!("px send: {}", e),
            })?;

        // Read until the matching response arrives or the stream ends.
        // The overall budget is enforced by the caller; dropping this
        // future on timeout drops the stream and with it every waiter.
        let mut frames = FrameBuffer::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) => return Err(NetError::Closed),
                Ok(n) => n,
                Err(e) => {
                    return Err(NetError::Transport {
                        reason: format!("px read: {}", e),
                    })
                }
            };
            frames.extend(&chunk[..n]);

            while let Some(msg) = frames.next_frame::<PxMessage>()? {
                match msg {
                    PxMessage::ResolveResponse {
                        request_id: id,
                        peer,
                        error,
                    } if id == request_id => {
                        if let Some(reason) = error {
                            debug!(%principal, via = %via_address, "resolve refused: {}", reason);
                            return Ok(None);
                        }
                        return Ok(peer);
                    }
                    other => {
                        debug!("ignoring {} while awaiting resolve response", other.kind());
                    }
                }
            }
        }
    }

    async fn send_push(
        &self,
        target_address: &str,
        peers: Vec<PeerRecord>,
    ) -> Result<(), NetError> {
        let mut stream = self.transport.dial(target_address, PX_PROTOCOL).await?;
        let push = PxMessage::Push { peers };
        stream
            .write_all(&encode_frame(&push)?)
            .await
            .map_err(|e| NetError::Transport {
                reason: format!("px send: {}", e),
            })?;
        stream.shutdown().await.ok();
        Ok(())
    }

    // ─── Cache ───────────────────────────────────────────────────────────────

    /// Merge a record under the freshness rule: an existing entry for the
    /// same principal is superseded only by a strictly newer `last_seen`.
    fn insert_record(&self, record: PeerRecord, source: String, verified: bool) {
        let mut cache = self.lock_cache();
        if let Some(existing) = cache.get(&record.principal) {
            if record.last_seen <= existing.record.last_seen {
                return;
            }
        }
        cache.insert(
            record.principal.clone(),
            PeerCacheEntry {
                record,
                source,
                cached_at: Instant::now(),
                verified,
            },
        );
    }

    /// Our own record plus every cached, unexpired entry the visibility
    /// policy lets us disclose to `target`.
    fn shareable_records(&self, target: &str) -> Vec<PeerRecord> {
        let (visibility, allowlist, ttl) = {
            let config = self.lock_config();
            (
                config.visibility,
                config.allowlist.clone(),
                config.cache_ttl,
            )
        };

        let mut records = Vec::new();
        {
            let mut local = self.lock_local();
            local.last_seen = unix_now();
            records.push(local.clone());
        }

        let cache = self.lock_cache();
        if authorized(&cache, visibility, &allowlist, target) {
            for entry in cache.values() {
                if entry.cached_at.elapsed() < ttl {
                    records.push(entry.record.clone());
                }
            }
        }
        records
    }

    fn evict_expired(&self) {
        let ttl = self.lock_config().cache_ttl;
        let mut cache = self.lock_cache();
        let before = cache.len();
        cache.retain(|_, entry| entry.cached_at.elapsed() < ttl);
        let evicted = before - cache.len();
        if evicted > 0 {
            debug!(evicted, "peer cache sweep");
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, PeerCache> {
        self.cache.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_config(&self) -> MutexGuard<'_, PxConfig> {
        self.config.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_local(&self) -> MutexGuard<'_, PeerRecord> {
        self.local.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Whether a requester may learn cached records under the current policy.
///
/// Under PRIVATE visibility the requester's principal is established from
/// the verified cache only: an entry inserted by the privileged direct
/// path whose transport id matches the requester. Wire-claimed principals
/// are never consulted.
fn authorized(
    cache: &PeerCache,
    visibility: Visibility,
    allowlist: &[Principal],
    remote_peer_id: &str,
) -> bool {
    match visibility {
        Visibility::Public => true,
        Visibility::Stealth => false,
        Visibility::Private => cache
            .values()
            .find(|entry| entry.verified && entry.record.peer_id == remote_peer_id)
            .map(|entry| allowlist.contains(&entry.record.principal))
            .unwrap_or(false),
    }
}
