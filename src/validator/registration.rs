use crate::core::{
    errors::{UniqueStorageError, UniqueStorageResult},
    types::{NodeIdentity, ServerCoinMemo, EPOCH_DURATION_SECS, PROTOCOL_PREFIX},
    utils::{sign_data, verify_signature},
};

/// Epoch window containing a UNIX timestamp. Registrations are valid for
/// exactly one window; validators reject anything else as stale.
pub fn current_epoch(unix_seconds: f64) -> u64 {
    (unix_seconds.max(0.0) as u64) / EPOCH_DURATION_SECS
}

/// Signed material for a key-location record. The protocol prefix is a
/// fixed domain-separation constant preventing signature reuse across
/// unrelated protocols.
fn memo_payload(public_key: &[u8; 32], host: &str, epoch: u64) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(public_key);
    payload.extend_from_slice(host.as_bytes());
    payload.extend_from_slice(&epoch.to_be_bytes());
    payload.extend_from_slice(PROTOCOL_PREFIX);
    payload
}

/// Publish a signed (key, host) registration for one epoch
pub fn create_server_coin_memo(
    identity: &NodeIdentity,
    epoch: u64,
) -> UniqueStorageResult<ServerCoinMemo> {
    let host = identity.location.host_string();
    let payload = memo_payload(&identity.public_key, &host, epoch);
    let signature = sign_data(&identity.private_key, &payload)?;

    Ok(ServerCoinMemo {
        host,
        wallet_public_key: identity.public_key,
        epoch,
        signature,
    })
}

/// Check a registration record against the validator's current epoch.
/// This runs once before any transform-derived proof for the (key, host)
/// pair is trusted; it is independent of challenge validation.
pub fn verify_server_coin_memo(
    memo: &ServerCoinMemo,
    validator_epoch: u64,
) -> UniqueStorageResult<()> {
    if memo.host.is_empty() {
        return Err(UniqueStorageError::BindingMismatch {
            reason: "registration host is empty".to_string(),
        });
    }

    if memo.epoch != validator_epoch {
        return Err(UniqueStorageError::StaleRegistration {
            memo_epoch: memo.epoch,
            current_epoch: validator_epoch,
        });
    }

    let payload = memo_payload(&memo.wallet_public_key, &memo.host, memo.epoch);
    if !verify_signature(&memo.wallet_public_key, &payload, &memo.signature)? {
        return Err(UniqueStorageError::SignatureInvalid {
            reason: "registration memo signature does not verify".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::NetworkLocation;

    fn test_identity() -> NodeIdentity {
        NodeIdentity::from_seed(
            b"registration-node",
            NetworkLocation::with_hostname("10.0.0.1", 8444, "mirror.example"),
        )
        .unwrap()
    }

    #[test]
    fn test_epoch_windows() {
        assert_eq!(current_epoch(0.0), 0);
        assert_eq!(current_epoch(3_599.0), 0);
        assert_eq!(current_epoch(3_600.0), 1);
        assert_eq!(current_epoch(7_200.5), 2);
    }

    #[test]
    fn test_memo_verifies_in_its_own_epoch() {
        let identity = test_identity();
        let memo = create_server_coin_memo(&identity, 42).unwrap();
        assert_eq!(memo.host, "mirror.example:8444");
        assert!(verify_server_coin_memo(&memo, 42).is_ok());
    }

    #[test]
    fn test_memo_is_stale_outside_its_epoch() {
        let identity = test_identity();
        let memo = create_server_coin_memo(&identity, 42).unwrap();

        match verify_server_coin_memo(&memo, 43) {
            Err(UniqueStorageError::StaleRegistration {
                memo_epoch: 42,
                current_epoch: 43,
            }) => {}
            other => panic!("expected stale registration, got {:?}", other),
        }
        assert!(verify_server_coin_memo(&memo, 41).is_err());
    }

    #[test]
    fn test_tampered_memo_fields_fail() {
        let identity = test_identity();
        let memo = create_server_coin_memo(&identity, 42).unwrap();

        let mut moved = memo.clone();
        moved.host = "elsewhere.example:8444".to_string();
        assert!(verify_server_coin_memo(&moved, 42).is_err());

        let mut reepoch = memo.clone();
        reepoch.epoch = 43;
        // Wrong epoch is caught before the signature is even checked
        assert!(verify_server_coin_memo(&reepoch, 42).is_err());

        let other = NodeIdentity::from_seed(
            b"other-node",
            NetworkLocation::with_hostname("10.0.0.1", 8444, "mirror.example"),
        )
        .unwrap();
        let mut rekeyed = memo;
        rekeyed.wallet_public_key = other.public_key;
        assert!(verify_server_coin_memo(&rekeyed, 42).is_err());
    }

    #[test]
    fn test_signature_from_different_key_fails() {
        let identity = test_identity();
        let impostor = NodeIdentity::from_seed(
            b"impostor",
            NetworkLocation::with_hostname("10.0.0.1", 8444, "mirror.example"),
        )
        .unwrap();

        let mut memo = create_server_coin_memo(&impostor, 42).unwrap();
        memo.wallet_public_key = identity.public_key;
        match verify_server_coin_memo(&memo, 42) {
            Err(UniqueStorageError::SignatureInvalid { .. }) => {}
            other => panic!("expected signature failure, got {:?}", other),
        }
    }
}
