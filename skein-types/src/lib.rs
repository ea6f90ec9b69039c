pub mod attestation;
pub mod constants;
pub mod error;
pub mod network;
pub mod primitives;
pub mod wire;

#[cfg(test)]
mod tests {
    use borsh::{BorshDeserialize, BorshSerialize};

    /// Helper: borsh round-trip test.
    fn borsh_roundtrip<T: BorshSerialize + BorshDeserialize + PartialEq + std::fmt::Debug>(
        value: &T,
    ) {
        let encoded = borsh::to_vec(value).expect("borsh serialize failed");
        let decoded = T::try_from_slice(&encoded).expect("borsh deserialize failed");
        assert_eq!(*value, decoded);
    }

    #[test]
    fn test_attestation_roundtrip() {
        use crate::attestation::Attestation;
        let attestation = Attestation {
            version: 1,
            principal: "skein:dev:00112233445566778899aabbccddeeff00112233".to_string(),
            node_public_key: [1u8; 32],
            issued_at: 1_700_000_000,
            expires_at: 1_700_086_400,
            nonce: vec![2u8; 24],
            domain: crate::constants::ATTESTATION_DOMAIN.to_string(),
            signature: [3u8; 65],
        };
        borsh_roundtrip(&attestation);
    }

    #[test]
    fn test_session_message_roundtrip() {
        use crate::wire::SessionMessage;
        borsh_roundtrip(&SessionMessage::Hello {
            node_public_key: [5u8; 32],
            nonce: vec![6u8; 16],
        });
        borsh_roundtrip(&SessionMessage::AuthOk);
        borsh_roundtrip(&SessionMessage::StreamData {
            payload: vec![1, 2, 3, 4],
        });
    }

    #[test]
    fn test_px_message_roundtrip() {
        use crate::wire::{PeerRecord, PxMessage};
        borsh_roundtrip(&PxMessage::ResolveResponse {
            request_id: [9u8; 16],
            peer: Some(PeerRecord {
                principal: "skein:dev:00112233445566778899aabbccddeeff00112233".to_string(),
                addresses: vec!["127.0.0.1:9910".to_string()],
                peer_id: "mem-1".to_string(),
                last_seen: 1_700_000_000,
            }),
            error: None,
        });
    }

    #[test]
    fn test_chat_message_roundtrip() {
        use crate::wire::ChatMessage;
        borsh_roundtrip(&ChatMessage {
            id: "f00d".to_string(),
            from: "skein:dev:00112233445566778899aabbccddeeff00112233".to_string(),
            to: "skein:dev:ffeeddccbbaa99887766554433221100ffeeddcc".to_string(),
            nick: Some("alice".to_string()),
            content: "hello".to_string(),
            timestamp: 1_700_000_000,
        });
    }
}
