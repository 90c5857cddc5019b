use crate::core::{
    errors::UniqueStorageResult,
    types::{ChunkBinding, NetworkLocation, NodeIdentity, HASH_SIZE},
    utils::{compute_sha256, sign_data, verify_signature},
};

/// Location-binding hash over chunk bytes. Any change to ip, port, or
/// hostname changes the result with overwhelming probability, making
/// relocation detectable. Used by both the creation path (over original
/// chunk bytes) and the challenge path (over mutated bytes).
pub fn bind_to_location(chunk_data: &[u8], location: &NetworkLocation) -> [u8; HASH_SIZE] {
    let mut data = location.canonical_bytes();
    data.extend_from_slice(chunk_data);
    compute_sha256(&data)
}

/// Create the write-once binding triple for a chunk
pub fn create_chunk_bindings(
    chunk_data: &[u8],
    identity: &NodeIdentity,
) -> UniqueStorageResult<ChunkBinding> {
    let server_binding = bind_to_location(chunk_data, &identity.location);

    let mut key_payload = Vec::with_capacity(HASH_SIZE + chunk_data.len());
    key_payload.extend_from_slice(&server_binding);
    key_payload.extend_from_slice(chunk_data);
    let key_binding = sign_data(&identity.private_key, &key_payload)?;

    let mut final_payload = Vec::with_capacity(HASH_SIZE + key_binding.len());
    final_payload.extend_from_slice(&server_binding);
    final_payload.extend_from_slice(&key_binding);
    let final_binding = compute_sha256(&final_payload);

    Ok(ChunkBinding {
        server_binding,
        key_binding,
        final_binding,
    })
}

/// Verify the key-binding signature against a claimed public key
pub fn verify_key_binding(
    public_key: &[u8],
    chunk_data: &[u8],
    binding: &ChunkBinding,
) -> UniqueStorageResult<bool> {
    let mut key_payload = Vec::with_capacity(HASH_SIZE + chunk_data.len());
    key_payload.extend_from_slice(&binding.server_binding);
    key_payload.extend_from_slice(chunk_data);
    verify_signature(public_key, &key_payload, &binding.key_binding)
}

/// Check internal consistency of a binding triple
pub fn verify_final_binding(binding: &ChunkBinding) -> bool {
    let mut final_payload = Vec::with_capacity(HASH_SIZE + binding.key_binding.len());
    final_payload.extend_from_slice(&binding.server_binding);
    final_payload.extend_from_slice(&binding.key_binding);
    compute_sha256(&final_payload) == binding.final_binding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::NetworkLocation;

    fn test_identity(key_seed: &[u8], ip: &str, port: u16) -> NodeIdentity {
        NodeIdentity::from_seed(key_seed, NetworkLocation::new(ip, port)).unwrap()
    }

    #[test]
    fn test_binding_is_internally_consistent() {
        let identity = test_identity(b"node-a", "10.0.0.1", 8444);
        let binding = create_chunk_bindings(b"chunk payload", &identity).unwrap();

        assert!(verify_final_binding(&binding));
        assert!(verify_key_binding(&identity.public_key, b"chunk payload", &binding).unwrap());
    }

    #[test]
    fn test_one_byte_change_changes_final_binding() {
        let identity = test_identity(b"node-a", "10.0.0.1", 8444);
        let original = create_chunk_bindings(b"chunk payload", &identity).unwrap();
        let flipped = create_chunk_bindings(b"chunk payloae", &identity).unwrap();

        assert_ne!(original.server_binding, flipped.server_binding);
        assert_ne!(original.final_binding, flipped.final_binding);
    }

    #[test]
    fn test_location_change_changes_bindings() {
        let here = test_identity(b"node-a", "10.0.0.1", 8444);
        let there = test_identity(b"node-a", "10.0.0.2", 8444);
        let binding_here = create_chunk_bindings(b"chunk payload", &here).unwrap();
        let binding_there = create_chunk_bindings(b"chunk payload", &there).unwrap();

        assert_ne!(binding_here.server_binding, binding_there.server_binding);
        assert_ne!(binding_here.final_binding, binding_there.final_binding);
    }

    #[test]
    fn test_key_change_changes_bindings() {
        let node_a = test_identity(b"node-a", "10.0.0.1", 8444);
        let node_b = test_identity(b"node-b", "10.0.0.1", 8444);
        let binding_a = create_chunk_bindings(b"chunk payload", &node_a).unwrap();
        let binding_b = create_chunk_bindings(b"chunk payload", &node_b).unwrap();

        // Same location and data, different private key: the signature and
        // therefore the final binding diverge
        assert_eq!(binding_a.server_binding, binding_b.server_binding);
        assert_ne!(binding_a.key_binding, binding_b.key_binding);
        assert_ne!(binding_a.final_binding, binding_b.final_binding);
    }

    #[test]
    fn test_shared_key_different_location_differs() {
        // Key-sharing across locations is not sufficient to forge a proof
        let mirror_a = test_identity(b"shared-key", "10.0.0.1", 8444);
        let mirror_b = test_identity(b"shared-key", "203.0.113.9", 8444);
        let binding_a = create_chunk_bindings(b"identical chunk", &mirror_a).unwrap();
        let binding_b = create_chunk_bindings(b"identical chunk", &mirror_b).unwrap();

        assert_ne!(binding_a.server_binding, binding_b.server_binding);
    }

    #[test]
    fn test_wrong_public_key_fails_key_binding() {
        let identity = test_identity(b"node-a", "10.0.0.1", 8444);
        let other = test_identity(b"node-b", "10.0.0.1", 8444);
        let binding = create_chunk_bindings(b"chunk payload", &identity).unwrap();

        assert!(!verify_key_binding(&other.public_key, b"chunk payload", &binding).unwrap());
    }

    #[test]
    fn test_hash_non_collision_over_sample_set() {
        let identity = test_identity(b"node-a", "10.0.0.1", 8444);
        let mut seen = std::collections::HashSet::new();
        for i in 0..64u32 {
            let data = i.to_be_bytes();
            let binding = create_chunk_bindings(&data, &identity).unwrap();
            assert!(seen.insert(binding.final_binding));
        }
    }
}
