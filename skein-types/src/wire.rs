use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::attestation::Attestation;
use crate::primitives::{NodePublicKey, Principal, Timestamp};

/// Messages exchanged on the authenticated session channel.
///
/// Decoded exactly once at the framing boundary; everything downstream
/// works with this closed enum, never raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum SessionMessage {
    /// Opens the handshake: the sender's transport key plus a fresh nonce.
    Hello {
        node_public_key: NodePublicKey,
        nonce: Vec<u8>,
    },
    /// Proves account ownership: the sender's principal and attestation.
    /// `nonce` echoes the nonce from the same side's Hello.
    Auth {
        principal: Principal,
        attestation: Attestation,
        nonce: Vec<u8>,
    },
    /// Confirms the peer's attestation was accepted.
    AuthOk,
    /// Liveness probe; the nonce must be echoed back in a Pong.
    Ping { nonce: Vec<u8> },
    /// Answer to a Ping, carrying the probe's nonce.
    Pong { nonce: Vec<u8> },
    /// Opaque application payload (post-authentication only).
    StreamData { payload: Vec<u8> },
}

impl SessionMessage {
    /// Short name for logs and unexpected-message errors.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionMessage::Hello { .. } => "HELLO",
            SessionMessage::Auth { .. } => "AUTH",
            SessionMessage::AuthOk => "AUTH_OK",
            SessionMessage::Ping { .. } => "PING",
            SessionMessage::Pong { .. } => "PONG",
            SessionMessage::StreamData { .. } => "STREAM_DATA",
        }
    }
}

/// A peer's address record as shared over the discovery channel.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct PeerRecord {
    /// The peer's account principal.
    pub principal: Principal,
    /// Dialable addresses, most-preferred first.
    pub addresses: Vec<String>,
    /// The peer's transport-level identifier.
    pub peer_id: String,
    /// Last time the record's owner was observed (Unix seconds).
    pub last_seen: Timestamp,
}

/// Messages exchanged on the peer-exchange (discovery) channel.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum PxMessage {
    /// Ask the responder for a principal's address record.
    ResolveRequest {
        principal: Principal,
        request_id: [u8; 16],
    },
    /// Answer to a ResolveRequest, correlated by `request_id`. `peer` is
    /// absent on a miss; `error` carries the not-authorized reason.
    ResolveResponse {
        request_id: [u8; 16],
        peer: Option<PeerRecord>,
        error: Option<String>,
    },
    /// Unsolicited share of known peer records.
    Push { peers: Vec<PeerRecord> },
}

impl PxMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            PxMessage::ResolveRequest { .. } => "PX_RESOLVE_REQ",
            PxMessage::ResolveResponse { .. } => "PX_RESOLVE_RESP",
            PxMessage::Push { .. } => "PX_PUSH",
        }
    }
}

/// An application chat message as carried inside `StreamData` and routed
/// by the message router.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Random hex id for dedup and acknowledgement.
    pub id: String,
    /// Sending principal.
    pub from: Principal,
    /// Receiving principal.
    pub to: Principal,
    /// Sender's display nickname, if any.
    pub nick: Option<String>,
    /// Message body.
    pub content: String,
    /// Unix time the sender created the message.
    pub timestamp: Timestamp,
}
