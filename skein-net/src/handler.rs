use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use skein_identity::IdentityResolver;
use skein_types::primitives::Principal;
use skein_types::wire::ChatMessage;

use crate::config::NetConfig;
use crate::error::NetError;
use crate::protocol::SESSION_PROTOCOL;
use crate::session::{Session, SessionEvent};
use crate::transport::{IncomingStream, Transport};

/// Notifications the handler emits to the host.
#[derive(Debug)]
pub enum HandlerEvent {
    /// A session passed authentication and the authorization gate.
    SessionEstablished(Arc<Session>),
    /// An application message arrived on an established session.
    Message {
        from: Principal,
        message: ChatMessage,
    },
    /// An established session closed.
    SessionClosed(Principal),
    /// A session failed; `principal` is absent when it never authenticated.
    SessionError {
        principal: Option<Principal>,
        reason: String,
    },
}

type SessionMap = HashMap<Principal, Arc<Session>>;

/// Drives the session protocol over a transport: dials out, accepts in,
/// runs handshakes, applies the resolver's authorization gate, and indexes
/// live sessions by remote principal.
pub struct SessionHandler {
    /// Self-handle for spawning supervision tasks from `&self`.
    this: Weak<SessionHandler>,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn IdentityResolver>,
    config: NetConfig,
    sessions: Mutex<SessionMap>,
    events: mpsc::UnboundedSender<HandlerEvent>,
}

impl SessionHandler {
    pub fn new(
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn IdentityResolver>,
        config: NetConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<HandlerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handler = Arc::new_cyclic(|weak| Self {
            this: weak.clone(),
            transport,
            resolver,
            config,
            sessions: Mutex::new(HashMap::new()),
            events: event_tx,
        });
        (handler, event_rx)
    }

    /// Register for incoming session streams and start accepting them.
    pub async fn start(&self) -> Result<(), NetError> {
        let mut incoming = self.transport.listen(SESSION_PROTOCOL).await?;
        let handler = match self.this.upgrade() {
            Some(handler) => handler,
            None => return Ok(()),
        };
        tokio::spawn(async move {
            while let Some(stream) = incoming.recv().await {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    handler.accept(stream).await;
                });
            }
        });
        info!(local = %self.transport.local_id(), "session handler started");
        Ok(())
    }

    /// Dial a peer and authenticate as initiator. Returns the session only
    /// after both cryptographic authentication and the resolver's
    /// authorization gate have passed.
    pub async fn connect(&self, address: &str) -> Result<Arc<Session>, NetError> {
        let identity = self.resolver.resolve(None).ok_or(NetError::NoIdentity)?;
        let stream = self.transport.dial(address, SESSION_PROTOCOL).await?;

        let (session, events) = Session::new(
            stream,
            identity,
            address.to_string(),
            self.config.clone(),
        );
        self.supervise(Arc::clone(&session), events);

        session.authenticate_as_initiator().await?;
        self.apply_gate(&session)?;
        Ok(session)
    }

    /// Look up an established session by remote principal.
    pub fn get_session(&self, principal: &str) -> Option<Arc<Session>> {
        self.lock_sessions().get(principal).cloned()
    }

    /// All currently established sessions.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.lock_sessions().values().cloned().collect()
    }

    /// Close every session and forget them.
    pub fn close_all(&self) {
        let sessions: Vec<_> = self.lock_sessions().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close();
        }
    }

    async fn accept(self: Arc<Self>, incoming: IncomingStream) {
        // The no-argument resolve picks the identity for the initial
        // exchange; without one we cannot answer at all.
        let identity = match self.resolver.resolve(None) {
            Some(identity) => identity,
            None => {
                warn!(peer = %incoming.remote_id, "no identity for incoming session");
                return;
            }
        };

        let remote_id = incoming.remote_id.clone();
        let (session, events) = Session::new(
            incoming.stream,
            identity,
            incoming.remote_id,
            self.config.clone(),
        );
        self.supervise(Arc::clone(&session), events);

        if let Err(e) = session.authenticate_as_responder().await {
            warn!(peer = %remote_id, "inbound handshake failed: {}", e);
            return;
        }
        if let Err(e) = self.apply_gate(&session) {
            warn!(peer = %remote_id, "inbound session rejected: {}", e);
        }
    }

    /// The post-authentication authorization gate: some local identity must
    /// accept the now-known remote principal, or the session dies even
    /// though its cryptography checked out.
    fn apply_gate(&self, session: &Arc<Session>) -> Result<(), NetError> {
        let principal = session.remote().ok_or_else(|| NetError::Handshake {
            reason: "authenticated session has no remote principal".to_string(),
        })?;

        if self.resolver.resolve(Some(&principal)).is_none() {
            session.close();
            return Err(NetError::PeerNotAccepted { principal });
        }

        self.lock_sessions()
            .insert(principal, Arc::clone(session));
        let _ = self
            .events
            .send(HandlerEvent::SessionEstablished(Arc::clone(session)));
        Ok(())
    }

    /// Forward one session's events into the handler's channel and keep the
    /// session index consistent.
    fn supervise(
        &self,
        session: Arc<Session>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let handler = match self.this.upgrade() {
            Some(handler) => handler,
            None => return,
        };
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::Authenticated(principal) => {
                        debug!(remote = %principal, "session authenticated");
                    }
                    SessionEvent::Message(message) => {
                        if let Some(from) = session.remote() {
                            let _ = handler.events.send(HandlerEvent::Message { from, message });
                        }
                    }
                    SessionEvent::Error(reason) => {
                        let _ = handler.events.send(HandlerEvent::SessionError {
                            principal: session.remote(),
                            reason,
                        });
                    }
                    SessionEvent::Closed => {
                        if let Some(principal) = session.remote() {
                            let mut sessions = handler.lock_sessions();
                            if let Some(current) = sessions.get(&principal) {
                                if Arc::ptr_eq(current, &session) {
                                    sessions.remove(&principal);
                                    drop(sessions);
                                    let _ = handler
                                        .events
                                        .send(HandlerEvent::SessionClosed(principal));
                                }
                            }
                        }
                        break;
                    }
                }
            }
        });
    }

    fn lock_sessions(&self) -> MutexGuard<'_, SessionMap> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }
}
