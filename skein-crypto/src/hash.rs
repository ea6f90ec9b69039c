use skein_types::primitives::Hash;

/// Compute the BLAKE3 hash of the given data.
pub fn blake3_hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Derive key material using BLAKE3 KDF.
/// The context string ensures different uses produce different outputs.
pub fn blake3_kdf(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_hash_deterministic() {
        let data = b"hello skein";
        assert_eq!(blake3_hash(data), blake3_hash(data));
    }

    #[test]
    fn test_blake3_hash_different_inputs() {
        assert_ne!(blake3_hash(b"hello"), blake3_hash(b"world"));
    }

    #[test]
    fn test_blake3_kdf_context_separation() {
        let material = b"same material";
        assert_ne!(
            blake3_kdf("context-a", material),
            blake3_kdf("context-b", material)
        );
    }
}
