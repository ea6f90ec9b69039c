use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use borsh::BorshDeserialize;
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use skein_identity::{create_attestation, verify_attestation, Identity};
use skein_types::primitives::{unix_now, Principal};
use skein_types::wire::{ChatMessage, SessionMessage};

use crate::config::NetConfig;
use crate::error::NetError;
use crate::framing::{encode_frame, FrameBuffer};
use crate::transport::BoxedStream;

/// Handshake progress. Both roles move through the same states; the role
/// only decides who speaks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connected,
    HelloSent,
    HelloReceived,
    AuthSent,
    AuthReceived,
    Authenticated,
    Closed,
}

/// Heartbeat status. Degraded is a report, never a termination: the
/// substrate surfaces liveness, the caller decides what to do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Degraded,
}

/// Notifications a session emits to its single observer.
#[derive(Debug)]
pub enum SessionEvent {
    Authenticated(Principal),
    Message(ChatMessage),
    Closed,
    Error(String),
}

struct PingState {
    /// Outstanding probe: (nonce, send time). Cleared by the matching Pong.
    pending: Option<(Vec<u8>, Instant)>,
}

/// One authenticated, bidirectional application channel with a single
/// remote peer, bound 1:1 to a live stream.
///
/// Construction spawns a read pump (frames → FIFO queue) and a write pump
/// (encoded frames → stream); the handshake drivers then consume the queue
/// strictly in arrival order. Nothing here is ever persisted.
pub struct Session {
    /// Self-handle for spawning the application loop from `&self`.
    this: Weak<Session>,
    identity: Arc<Identity>,
    remote_peer_id: String,
    config: NetConfig,
    phase: Mutex<Phase>,
    remote_principal: Mutex<Option<Principal>>,
    authenticated: AtomicBool,
    closed: AtomicBool,
    /// Taken (dropped) on close so the write pump winds down.
    outgoing: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    incoming: AsyncMutex<mpsc::UnboundedReceiver<SessionMessage>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    ping: Mutex<PingState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("remote_peer_id", &self.remote_peer_id)
            .field("authenticated", &self.authenticated)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Wrap a freshly opened stream. Returns the session and its event
    /// receiver — one observer per session, no shared bus.
    pub fn new(
        stream: BoxedStream,
        identity: Arc<Identity>,
        remote_peer_id: String,
        config: NetConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<SessionMessage>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();

        let session = Arc::new_cyclic(|weak| Self {
            this: weak.clone(),
            identity,
            remote_peer_id,
            config,
            phase: Mutex::new(Phase::Connected),
            remote_principal: Mutex::new(None),
            authenticated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            outgoing: Mutex::new(Some(out_tx)),
            incoming: AsyncMutex::new(in_rx),
            events: event_tx,
            ping: Mutex::new(PingState { pending: None }),
        });

        let (mut read_half, mut write_half) = tokio::io::split(stream);

        // Write pump: ends when the sender is dropped (close) or the
        // stream rejects a write.
        let writer_session = Arc::clone(&session);
        tokio::spawn(async move {
            while let Some(bytes) = out_rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
            let _ = write_half.shutdown().await;
            writer_session.mark_closed();
        });

        // Read pump: frames decode in arrival order into the FIFO queue;
        // several complete messages may decode from one read event.
        let reader_session = Arc::clone(&session);
        tokio::spawn(async move {
            let mut frames = FrameBuffer::new();
            let mut chunk = [0u8; 8192];
            loop {
                match read_half.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        frames.extend(&chunk[..n]);
                        loop {
                            match frames.next_frame::<SessionMessage>() {
                                Ok(Some(msg)) => {
                                    if in_tx.send(msg).is_err() {
                                        return;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    reader_session.fail(format!("bad frame: {}", e));
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        if !reader_session.closed.load(Ordering::SeqCst) {
                            debug!("session read ended: {}", e);
                        }
                        break;
                    }
                }
            }
            reader_session.mark_closed();
        });

        (session, event_rx)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The remote peer's principal; `None` until authentication completes.
    pub fn remote(&self) -> Option<Principal> {
        self.lock_remote().clone()
    }

    /// Transport-level identifier of the remote endpoint.
    pub fn peer_id(&self) -> &str {
        &self.remote_peer_id
    }

    /// Principal of the local identity this session speaks for.
    pub fn local_principal(&self) -> Principal {
        self.identity.principal().clone()
    }

    pub fn phase(&self) -> Phase {
        *self.lock_phase()
    }

    /// Run the handshake as the side that opened the stream.
    pub async fn authenticate_as_initiator(&self) -> Result<(), NetError> {
        self.send_hello_auth()?;

        self.recv_hello().await?;
        let principal = self.recv_and_verify_auth().await?;

        self.send(&SessionMessage::AuthOk)?;
        self.recv_auth_ok().await?;

        self.finish_authentication(principal);
        Ok(())
    }

    /// Run the handshake as the side that accepted the stream.
    pub async fn authenticate_as_responder(&self) -> Result<(), NetError> {
        self.recv_hello().await?;
        let principal = self.recv_and_verify_auth().await?;

        self.send_hello_auth()?;

        self.recv_auth_ok().await?;
        self.send(&SessionMessage::AuthOk)?;

        self.finish_authentication(principal);
        Ok(())
    }

    /// Send a chat message to the authenticated peer.
    pub fn send_chat_message(&self, content: &str) -> Result<ChatMessage, NetError> {
        if !self.is_authenticated() {
            return Err(NetError::NotAuthenticated);
        }
        let to = self.remote().ok_or(NetError::NotAuthenticated)?;

        let message = ChatMessage {
            id: random_hex_id(),
            from: self.identity.principal().clone(),
            to,
            nick: self.identity.nickname().map(str::to_string),
            content: content.to_string(),
            timestamp: unix_now(),
        };
        let payload = borsh::to_vec(&message).map_err(|e| NetError::Codec {
            reason: e.to_string(),
        })?;
        self.send(&SessionMessage::StreamData { payload })?;
        Ok(message)
    }

    /// Send a liveness probe. The caller owns the timer; this only records
    /// the outstanding nonce for [`Session::liveness`] to judge.
    pub fn send_ping(&self) -> Result<(), NetError> {
        if !self.is_authenticated() {
            return Err(NetError::NotAuthenticated);
        }
        let mut nonce = vec![0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        self.send(&SessionMessage::Ping {
            nonce: nonce.clone(),
        })?;
        self.lock_ping().pending = Some((nonce, Instant::now()));
        Ok(())
    }

    /// Current heartbeat status: Degraded once an outstanding ping has gone
    /// unanswered past the configured window.
    pub fn liveness(&self) -> Liveness {
        match &self.lock_ping().pending {
            Some((_, sent)) if sent.elapsed() > self.config.liveness_window => Liveness::Degraded,
            _ => Liveness::Alive,
        }
    }

    /// Close the session: drops buffered state and the stream. Idempotent.
    pub fn close(&self) {
        self.mark_closed();
    }

    // ─── Handshake steps ─────────────────────────────────────────────────────

    fn send_hello_auth(&self) -> Result<(), NetError> {
        let mut nonce = vec![0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let attestation =
            create_attestation(&self.identity, self.config.attestation_validity_secs).map_err(
                |e| {
                    self.abort(NetError::Handshake {
                        reason: format!("create attestation: {}", e),
                    })
                },
            )?;

        self.send(&SessionMessage::Hello {
            node_public_key: self.identity.node_public_key(),
            nonce: nonce.clone(),
        })?;
        self.set_phase(Phase::HelloSent);

        self.send(&SessionMessage::Auth {
            principal: self.identity.principal().clone(),
            attestation,
            nonce,
        })?;
        self.set_phase(Phase::AuthSent);
        Ok(())
    }

    async fn recv_hello(&self) -> Result<(), NetError> {
        match self.next_message().await? {
            SessionMessage::Hello { .. } => {
                self.set_phase(Phase::HelloReceived);
                Ok(())
            }
            other => Err(self.abort(NetError::UnexpectedMessage {
                expected: "HELLO",
                got: other.kind().to_string(),
            })),
        }
    }

    /// Receive AUTH, verify the attestation, and record the remote
    /// principal. Fails closed on any verification defect.
    async fn recv_and_verify_auth(&self) -> Result<Principal, NetError> {
        let (principal, attestation) = match self.next_message().await? {
            SessionMessage::Auth {
                principal,
                attestation,
                ..
            } => (principal, attestation),
            other => {
                return Err(self.abort(NetError::UnexpectedMessage {
                    expected: "AUTH",
                    got: other.kind().to_string(),
                }))
            }
        };
        self.set_phase(Phase::AuthReceived);

        if attestation.principal != principal {
            return Err(self.abort(NetError::Handshake {
                reason: "attestation bound to a different principal".to_string(),
            }));
        }
        if !verify_attestation(&attestation, self.identity.network()) {
            return Err(self.abort(NetError::AttestationRejected));
        }

        *self.lock_remote() = Some(principal.clone());
        Ok(principal)
    }

    async fn recv_auth_ok(&self) -> Result<(), NetError> {
        match self.next_message().await? {
            SessionMessage::AuthOk => Ok(()),
            other => Err(self.abort(NetError::UnexpectedMessage {
                expected: "AUTH_OK",
                got: other.kind().to_string(),
            })),
        }
    }

    fn finish_authentication(&self, principal: Principal) {
        self.authenticated.store(true, Ordering::SeqCst);
        self.set_phase(Phase::Authenticated);
        let _ = self
            .events
            .send(SessionEvent::Authenticated(principal.clone()));
        debug!(remote = %principal, "session authenticated");
        self.spawn_app_loop();
    }

    /// Post-authentication loop: deliver StreamData, answer Ping, settle
    /// Pong. Any handshake-type message arriving here is a violation.
    fn spawn_app_loop(&self) {
        let session = match self.this.upgrade() {
            Some(session) => session,
            None => return,
        };
        tokio::spawn(async move {
            let mut rx = session.incoming.lock().await;
            loop {
                let msg = match rx.recv().await {
                    Some(msg) => msg,
                    None => break,
                };
                match msg {
                    SessionMessage::StreamData { payload } => {
                        match ChatMessage::try_from_slice(&payload) {
                            Ok(chat) => {
                                let _ = session.events.send(SessionEvent::Message(chat));
                            }
                            Err(e) => {
                                session.fail(format!("undecodable stream payload: {}", e));
                                break;
                            }
                        }
                    }
                    SessionMessage::Ping { nonce } => {
                        if session.send(&SessionMessage::Pong { nonce }).is_err() {
                            break;
                        }
                    }
                    SessionMessage::Pong { nonce } => {
                        let mut ping = session.lock_ping();
                        if matches!(&ping.pending, Some((expected, _)) if *expected == nonce) {
                            ping.pending = None;
                        }
                    }
                    other => {
                        session.fail(format!(
                            "unexpected {} after authentication",
                            other.kind()
                        ));
                        break;
                    }
                }
            }
        });
    }

    // ─── Plumbing ────────────────────────────────────────────────────────────

    fn send(&self, msg: &SessionMessage) -> Result<(), NetError> {
        let bytes = encode_frame(msg)?;
        let guard = self.lock_outgoing();
        match guard.as_ref() {
            Some(tx) => tx.send(bytes).map_err(|_| NetError::Closed),
            None => Err(NetError::Closed),
        }
    }

    /// Await the next queued message, bounded by the handshake budget.
    async fn next_message(&self) -> Result<SessionMessage, NetError> {
        let mut rx = self.incoming.lock().await;
        match timeout(self.config.handshake_timeout, rx.recv()).await {
            Err(_) => Err(self.abort(NetError::Timeout)),
            Ok(None) => Err(NetError::Closed),
            Ok(Some(msg)) => Ok(msg),
        }
    }

    /// Report a violation and tear the session down.
    fn fail(&self, reason: String) {
        warn!(peer = %self.remote_peer_id, "session failed: {}", reason);
        let _ = self.events.send(SessionEvent::Error(reason));
        self.mark_closed();
    }

    /// Abort the handshake with `err`: emit the error, close, hand the
    /// error back for propagation.
    fn abort(&self, err: NetError) -> NetError {
        let _ = self.events.send(SessionEvent::Error(err.to_string()));
        self.mark_closed();
        err
    }

    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            *self.lock_phase() = Phase::Closed;
            // Dropping the sender lets the write pump drain and shut down.
            self.lock_outgoing().take();
            let _ = self.events.send(SessionEvent::Closed);
        }
    }

    fn set_phase(&self, phase: Phase) {
        *self.lock_phase() = phase;
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_remote(&self) -> MutexGuard<'_, Option<Principal>> {
        self.remote_principal
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }

    fn lock_outgoing(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Vec<u8>>>> {
        self.outgoing.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_ping(&self) -> MutexGuard<'_, PingState> {
        self.ping.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Random 16-byte hex id for chat messages.
fn random_hex_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_types::network::NetworkId;

    fn identity() -> Arc<Identity> {
        Arc::new(Identity::generate(NetworkId::Dev).unwrap())
    }

    /// Two sessions wired back-to-back over an in-memory duplex pipe.
    fn pipe_pair() -> (
        (Arc<Session>, mpsc::UnboundedReceiver<SessionEvent>),
        (Arc<Session>, mpsc::UnboundedReceiver<SessionEvent>),
    ) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let left = Session::new(
            Box::new(a),
            identity(),
            "peer-b".to_string(),
            NetConfig::default(),
        );
        let right = Session::new(
            Box::new(b),
            identity(),
            "peer-a".to_string(),
            NetConfig::default(),
        );
        (left, right)
    }

    #[tokio::test]
    async fn test_handshake_symmetry() {
        let ((initiator, _ie), (responder, _re)) = pipe_pair();

        let resp = Arc::clone(&responder);
        let responder_task = tokio::spawn(async move { resp.authenticate_as_responder().await });
        initiator.authenticate_as_initiator().await.unwrap();
        responder_task.await.unwrap().unwrap();

        assert!(initiator.is_authenticated());
        assert!(responder.is_authenticated());
        assert_eq!(
            initiator.remote().unwrap(),
            responder.local_principal()
        );
        assert_eq!(
            responder.remote().unwrap(),
            initiator.local_principal()
        );
        assert_eq!(initiator.phase(), Phase::Authenticated);
    }

    #[tokio::test]
    async fn test_chat_message_delivery() {
        let ((initiator, _ie), (responder, mut responder_events)) = pipe_pair();

        let resp = Arc::clone(&responder);
        let task = tokio::spawn(async move { resp.authenticate_as_responder().await });
        initiator.authenticate_as_initiator().await.unwrap();
        task.await.unwrap().unwrap();

        // Drain the Authenticated event.
        assert!(matches!(
            responder_events.recv().await,
            Some(SessionEvent::Authenticated(_))
        ));

        let sent = initiator.send_chat_message("hello there").unwrap();
        match responder_events.recv().await {
            Some(SessionEvent::Message(msg)) => {
                assert_eq!(msg.content, "hello there");
                assert_eq!(msg.from, initiator.local_principal());
                assert_eq!(msg.to, responder.local_principal());
                assert_eq!(msg.id, sent.id);
            }
            other => panic!("expected message event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_rejected_before_auth() {
        let ((initiator, _ie), _right) = pipe_pair();
        let err = initiator.send_chat_message("too early").unwrap_err();
        assert!(matches!(err, NetError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_out_of_order_message_aborts() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let (initiator, _events) = Session::new(
            Box::new(a),
            identity(),
            "peer".to_string(),
            NetConfig::default(),
        );

        // The "peer" opens with AUTH_OK instead of HELLO.
        let mut raw = b;
        let frame = encode_frame(&SessionMessage::AuthOk).unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut raw, &frame)
            .await
            .unwrap();

        let err = initiator.authenticate_as_initiator().await.unwrap_err();
        assert!(matches!(err, NetError::UnexpectedMessage { .. }));
        assert!(initiator.is_closed());
        assert_eq!(initiator.phase(), Phase::Closed);
    }

    #[tokio::test]
    async fn test_ping_pong_and_liveness() {
        let ((initiator, _ie), (responder, _re)) = pipe_pair();

        let resp = Arc::clone(&responder);
        let task = tokio::spawn(async move { resp.authenticate_as_responder().await });
        initiator.authenticate_as_initiator().await.unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(initiator.liveness(), Liveness::Alive);
        initiator.send_ping().unwrap();

        // The responder answers immediately; wait for the pong to settle.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(initiator.liveness(), Liveness::Alive);
        assert!(initiator.lock_ping().pending.is_none());
    }

    #[tokio::test]
    async fn test_missed_pong_degrades_but_does_not_close() {
        let (a, _unanswered) = tokio::io::duplex(64 * 1024);
        let mut config = NetConfig::default();
        config.liveness_window = std::time::Duration::from_millis(10);
        let (session, _events) =
            Session::new(Box::new(a), identity(), "peer".to_string(), config);

        // Pretend we are authenticated so the ping is allowed.
        session.authenticated.store(true, Ordering::SeqCst);
        *session.lock_remote() = Some("skein:dev:peer".to_string());

        session.send_ping().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(session.liveness(), Liveness::Degraded);
        // Reported, not terminated.
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_close_emits_event_and_is_idempotent() {
        let ((session, mut events), _right) = pipe_pair();
        session.close();
        session.close();
        assert!(session.is_closed());
        assert!(matches!(events.recv().await, Some(SessionEvent::Closed)));
    }
}
