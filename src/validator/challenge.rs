use log::{debug, info};
use std::collections::{HashMap, HashSet};

use crate::core::{
    errors::{UniqueStorageError, UniqueStorageResult},
    logging::report_challenge_outcome,
    types::*,
    utils::{generate_challenge_nonce, get_current_timestamp, sign_data},
};
use crate::storage::store::ChunkStore;
use crate::transform::binding::bind_to_location;
use crate::validator::ledger::ChallengeLedger;
use crate::validator::verification::{evaluate_response, ValidationContext};

struct PendingChallenge {
    challenge: StorageChallenge,
    status: ChallengeStatus,
    node: Option<String>,
}

/// Issues challenges, enforces their deadlines, and judges responses.
/// Owns the outcome ledger; per-challenge state machine:
/// Issued -> AwaitingResponse -> {Verified | TimedOut | Failed}.
pub struct ChallengeValidator {
    identity: NodeIdentity,
    timeout_ms: u32,
    pending: HashMap<String, PendingChallenge>,
    used_nonces: HashSet<String>,
    ledger: ChallengeLedger,
}

impl ChallengeValidator {
    pub fn new(identity: NodeIdentity) -> Self {
        Self::with_timeout(identity, CHALLENGE_TIMEOUT_MS)
    }

    pub fn with_timeout(identity: NodeIdentity, timeout_ms: u32) -> Self {
        Self {
            identity,
            timeout_ms,
            pending: HashMap::new(),
            used_nonces: HashSet::new(),
            ledger: ChallengeLedger::new(),
        }
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.identity.public_key
    }

    pub fn ledger(&self) -> &ChallengeLedger {
        &self.ledger
    }

    /// Select a copy and chunk uniformly at random, stamp and sign the
    /// challenge. The nonce is single-use; replays are rejected at
    /// resolution time.
    pub fn issue_challenge(
        &mut self,
        total_copies: u32,
        chunks_per_copy: u32,
    ) -> UniqueStorageResult<StorageChallenge> {
        if total_copies == 0 || chunks_per_copy == 0 {
            return Err(UniqueStorageError::ChunkPlan(
                "challenge space must be non-empty".to_string(),
            ));
        }

        let mut draw = [0u8; 8];
        getrandom::getrandom(&mut draw).map_err(|e| {
            UniqueStorageError::Cryptographic(format!("entropy generation failed: {}", e))
        })?;
        let copy_index =
            u32::from_be_bytes([draw[0], draw[1], draw[2], draw[3]]) % total_copies;
        let chunk_index =
            u32::from_be_bytes([draw[4], draw[5], draw[6], draw[7]]) % chunks_per_copy;

        let mut challenge = StorageChallenge {
            copy_index,
            chunk_index,
            challenge_nonce: generate_challenge_nonce(),
            timestamp: get_current_timestamp(),
            validator_signature: Vec::new(),
            timeout_ms: self.timeout_ms,
        };
        challenge.validator_signature =
            sign_data(&self.identity.private_key, &challenge.canonical_bytes())?;

        let nonce = challenge.nonce_hex();
        if self.used_nonces.contains(&nonce) {
            return Err(UniqueStorageError::ReplayedChallenge { nonce });
        }
        self.pending.insert(
            nonce.clone(),
            PendingChallenge {
                challenge: challenge.clone(),
                status: ChallengeStatus::Issued,
                node: None,
            },
        );

        debug!(
            "Issued challenge {} for copy {} chunk {} (timeout {}ms)",
            nonce, copy_index, chunk_index, self.timeout_ms
        );
        Ok(challenge)
    }

    /// Mark a challenge as sent to a specific node
    pub fn dispatch(
        &mut self,
        challenge: &StorageChallenge,
        node_public_key: &[u8; PUBLIC_KEY_SIZE],
    ) -> UniqueStorageResult<()> {
        let nonce = challenge.nonce_hex();
        let pending = self
            .pending
            .get_mut(&nonce)
            .ok_or(UniqueStorageError::ChallengeNotFound { nonce: nonce.clone() })?;

        if pending.status != ChallengeStatus::Issued {
            return Err(UniqueStorageError::ReplayedChallenge { nonce });
        }
        pending.status = ChallengeStatus::AwaitingResponse;
        pending.node = Some(hex::encode(node_public_key));
        Ok(())
    }

    pub fn status(&self, challenge: &StorageChallenge) -> Option<ChallengeStatus> {
        self.pending
            .get(&challenge.nonce_hex())
            .map(|p| p.status)
    }

    /// Resolve a response. All verification failures collapse to a single
    /// rejected outcome; timing failures resolve as TimedOut, everything
    /// else as Failed. The outcome is recorded in the ledger either way.
    pub fn process_response(
        &mut self,
        challenge: &StorageChallenge,
        response: &ChallengeResponse,
        node_public_key: &[u8; PUBLIC_KEY_SIZE],
        expected_location: &NetworkLocation,
    ) -> UniqueStorageResult<ChallengeStatus> {
        let nonce = challenge.nonce_hex();

        if self.used_nonces.contains(&nonce) {
            return Err(UniqueStorageError::ReplayedChallenge { nonce });
        }
        let pending = self
            .pending
            .get_mut(&nonce)
            .ok_or(UniqueStorageError::ChallengeNotFound { nonce: nonce.clone() })?;
        if !matches!(
            pending.status,
            ChallengeStatus::Issued | ChallengeStatus::AwaitingResponse
        ) {
            return Err(UniqueStorageError::ReplayedChallenge { nonce });
        }

        let validator_public_key = self.identity.public_key;
        let ctx = ValidationContext {
            challenge,
            response,
            node_public_key,
            expected_location,
            validator_public_key: &validator_public_key,
        };

        let node = hex::encode(node_public_key);
        let (status, response_ms) = match evaluate_response(&ctx) {
            Ok(elapsed_ms) => (ChallengeStatus::Verified, Some(elapsed_ms)),
            Err(UniqueStorageError::TimingViolation { elapsed_ms, .. }) => {
                (ChallengeStatus::TimedOut, Some(elapsed_ms as u32))
            }
            Err(err) => {
                debug!("Challenge {} rejected: {}", nonce, err);
                (ChallengeStatus::Failed, None)
            }
        };

        pending.status = status;
        pending.node = Some(node.clone());
        self.used_nonces.insert(nonce);
        self.ledger.record(&node, status, response_ms);
        report_challenge_outcome(&node, status, response_ms);

        Ok(status)
    }

    /// Spec-shaped boolean form: true only for a fully verified response
    pub fn validate_challenge_response(
        &mut self,
        challenge: &StorageChallenge,
        response: &ChallengeResponse,
        node_public_key: &[u8; PUBLIC_KEY_SIZE],
        expected_location: &NetworkLocation,
    ) -> bool {
        matches!(
            self.process_response(challenge, response, node_public_key, expected_location),
            Ok(ChallengeStatus::Verified)
        )
    }

    /// Resolve every unanswered challenge whose deadline has passed. The
    /// deadline is enforced here, on the validator's clock; whatever the
    /// node does after it is irrelevant to the outcome.
    pub fn expire_overdue(&mut self, now: f64) -> Vec<String> {
        let mut expired = Vec::new();

        for (nonce, pending) in self.pending.iter_mut() {
            let open = matches!(
                pending.status,
                ChallengeStatus::Issued | ChallengeStatus::AwaitingResponse
            );
            let overdue =
                (now - pending.challenge.timestamp) * 1000.0 > pending.challenge.timeout_ms as f64;

            if open && overdue {
                pending.status = ChallengeStatus::TimedOut;
                self.used_nonces.insert(nonce.clone());
                if let Some(ref node) = pending.node {
                    self.ledger.record(node, ChallengeStatus::TimedOut, None);
                    report_challenge_outcome(node, ChallengeStatus::TimedOut, None);
                }
                expired.push(nonce.clone());
            }
        }

        if !expired.is_empty() {
            info!("⏱️  {} challenge(s) expired unanswered", expired.len());
        }
        expired
    }
}

/// Node-side challenge handler. Answers strictly from the store via the
/// fast path; a chunk that was never genuinely transformed by this node
/// cannot be answered in time — the only recourse would be the full slow
/// transform, which categorically exceeds the challenge timeout.
pub struct ChallengeResponder {
    identity: NodeIdentity,
    store: ChunkStore,
}

impl ChallengeResponder {
    pub fn new(identity: NodeIdentity, store: ChunkStore) -> UniqueStorageResult<Self> {
        if !store.matches_identity(&identity) {
            return Err(UniqueStorageError::BindingMismatch {
                reason: "store was created under a different key or location".to_string(),
            });
        }
        Ok(Self { identity, store })
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn respond(
        &mut self,
        challenge: &StorageChallenge,
    ) -> UniqueStorageResult<ChallengeResponse> {
        if challenge.copy_index != self.store.copy_index()
            || !self.store.has_chunk(challenge.chunk_index)
        {
            return Err(UniqueStorageError::ChunkNotTransformed {
                chunk_index: challenge.chunk_index,
            });
        }

        let mutated_data = self.store.read_mutated(challenge.chunk_index)?;

        let server_binding = bind_to_location(&mutated_data, &self.identity.location);
        let key_signature = sign_data(&self.identity.private_key, &mutated_data)?;

        Ok(ChallengeResponse {
            mutated_data,
            proof: UniqueContentProof {
                server_binding,
                key_signature,
                current_location: self.identity.location.clone(),
            },
            responded_at: get_current_timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::engine::{transform_file, CancelFlag};
    use std::path::PathBuf;

    fn node_identity() -> NodeIdentity {
        NodeIdentity::from_seed(b"challenged-node", NetworkLocation::new("10.0.0.1", 8444))
            .unwrap()
    }

    fn validator_identity() -> NodeIdentity {
        NodeIdentity::from_seed(b"validator", NetworkLocation::new("198.51.100.1", 9000)).unwrap()
    }

    fn test_config() -> TransformConfig {
        TransformConfig {
            standard_chunk_count: 6,
            min_iterations_per_chunk: 1_000,
            checkpoint_interval: 250,
            target_total_time_secs: 1.0,
            challenge_timeout_ms: 5_000,
        }
    }

    fn temp_root(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("pous-challenge-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn stored_responder(tag: &str, identity: &NodeIdentity) -> (ChallengeResponder, PathBuf) {
        let root = temp_root(tag);
        let chunks =
            transform_file(identity, &vec![9u8; 96], 0, &test_config(), &CancelFlag::new())
                .unwrap();
        let store = ChunkStore::create(&root, identity, 0, &chunks).unwrap();
        (
            ChallengeResponder::new(identity.clone(), store).unwrap(),
            root,
        )
    }

    fn challenge_for(
        validator: &mut ChallengeValidator,
        chunk_index: u32,
    ) -> StorageChallenge {
        // Issue until the random draw lands on the wanted chunk; the loop
        // exercises the issuing path while keeping the test deterministic
        loop {
            let challenge = validator.issue_challenge(1, 6).unwrap();
            if challenge.chunk_index == chunk_index {
                return challenge;
            }
        }
    }

    #[test]
    fn test_issue_challenge_shape() {
        let mut validator = ChallengeValidator::new(validator_identity());
        let challenge = validator.issue_challenge(3, 60).unwrap();

        assert!(challenge.copy_index < 3);
        assert!(challenge.chunk_index < 60);
        assert_eq!(challenge.timeout_ms, CHALLENGE_TIMEOUT_MS);
        assert_eq!(challenge.validator_signature.len(), SIGNATURE_SIZE);
        assert_eq!(
            validator.status(&challenge),
            Some(ChallengeStatus::Issued)
        );
    }

    #[test]
    fn test_happy_path_verifies() {
        let node = node_identity();
        let (mut responder, root) = stored_responder("happy", &node);
        let mut validator = ChallengeValidator::new(validator_identity());

        let challenge = validator.issue_challenge(1, 6).unwrap();
        validator.dispatch(&challenge, &node.public_key).unwrap();
        assert_eq!(
            validator.status(&challenge),
            Some(ChallengeStatus::AwaitingResponse)
        );

        let response = responder.respond(&challenge).unwrap();
        let status = validator
            .process_response(&challenge, &response, &node.public_key, &node.location)
            .unwrap();

        assert_eq!(status, ChallengeStatus::Verified);
        let node_hex = hex::encode(node.public_key);
        assert_eq!(validator.ledger().success_rate(&node_hex), Some(1.0));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_replayed_response_rejected() {
        let node = node_identity();
        let (mut responder, root) = stored_responder("replay", &node);
        let mut validator = ChallengeValidator::new(validator_identity());

        let challenge = validator.issue_challenge(1, 6).unwrap();
        validator.dispatch(&challenge, &node.public_key).unwrap();
        let response = responder.respond(&challenge).unwrap();

        validator
            .process_response(&challenge, &response, &node.public_key, &node.location)
            .unwrap();
        match validator.process_response(&challenge, &response, &node.public_key, &node.location) {
            Err(UniqueStorageError::ReplayedChallenge { .. }) => {}
            other => panic!("expected replay rejection, got {:?}", other),
        }

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_location_spoofing_fails_even_with_valid_signature() {
        let node = node_identity();
        let (mut responder, root) = stored_responder("spoof", &node);
        let mut validator = ChallengeValidator::new(validator_identity());

        let challenge = validator.issue_challenge(1, 6).unwrap();
        validator.dispatch(&challenge, &node.public_key).unwrap();
        let response = responder.respond(&challenge).unwrap();

        // The validator's records say the node lives elsewhere
        let expected = NetworkLocation::new("203.0.113.50", 8444);
        let accepted = validator.validate_challenge_response(
            &challenge,
            &response,
            &node.public_key,
            &expected,
        );
        assert!(!accepted);
        assert_eq!(
            validator.status(&challenge),
            Some(ChallengeStatus::Failed)
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_tampered_data_fails() {
        let node = node_identity();
        let (mut responder, root) = stored_responder("tamperdata", &node);
        let mut validator = ChallengeValidator::new(validator_identity());

        let challenge = validator.issue_challenge(1, 6).unwrap();
        validator.dispatch(&challenge, &node.public_key).unwrap();
        let mut response = responder.respond(&challenge).unwrap();
        response.mutated_data[0] ^= 0xFF;

        let status = validator
            .process_response(&challenge, &response, &node.public_key, &node.location)
            .unwrap();
        assert_eq!(status, ChallengeStatus::Failed);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_late_response_times_out() {
        let node = node_identity();
        let (mut responder, root) = stored_responder("late", &node);
        let mut validator = ChallengeValidator::new(validator_identity());

        let challenge = validator.issue_challenge(1, 6).unwrap();
        validator.dispatch(&challenge, &node.public_key).unwrap();
        let mut response = responder.respond(&challenge).unwrap();
        response.responded_at = challenge.timestamp + 6.0; // past the 5s budget

        let status = validator
            .process_response(&challenge, &response, &node.public_key, &node.location)
            .unwrap();
        assert_eq!(status, ChallengeStatus::TimedOut);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_node_without_transformed_chunk_times_out() {
        // Simulation of the core asymmetry: timeout 5_000ms against a
        // calibrated ~60_000ms cold recompute. A node that never ran the
        // transform has no stored chunk, cannot answer, and the validator
        // resolves the challenge as TimedOut.
        let node = node_identity();
        let (mut responder, root) = stored_responder("cold", &node);
        let mut validator = ChallengeValidator::new(validator_identity());

        let recompute_ms =
            TransformConfig::default().estimated_recompute_ms(DEFAULT_ITERATIONS_PER_SECOND);
        assert!(recompute_ms >= 60_000 / 2);
        assert!(recompute_ms > CHALLENGE_TIMEOUT_MS as u64);

        // Challenge a copy the node never transformed
        let mut challenge = validator.issue_challenge(8, 6).unwrap();
        while challenge.copy_index == 0 {
            challenge = validator.issue_challenge(8, 6).unwrap();
        }
        validator.dispatch(&challenge, &node.public_key).unwrap();

        match responder.respond(&challenge) {
            Err(UniqueStorageError::ChunkNotTransformed { .. }) => {}
            other => panic!("expected missing-chunk error, got {:?}", other.is_ok()),
        }

        let expired = validator.expire_overdue(challenge.timestamp + 6.0);
        assert!(expired.contains(&challenge.nonce_hex()));
        assert_eq!(
            validator.status(&challenge),
            Some(ChallengeStatus::TimedOut)
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_expire_overdue_leaves_fresh_challenges_open() {
        let mut validator = ChallengeValidator::new(validator_identity());
        let challenge = validator.issue_challenge(1, 6).unwrap();

        let expired = validator.expire_overdue(challenge.timestamp + 1.0);
        assert!(expired.is_empty());
        assert_eq!(
            validator.status(&challenge),
            Some(ChallengeStatus::Issued)
        );
    }

    #[test]
    fn test_responder_rejects_foreign_store() {
        let node = node_identity();
        let root = temp_root("foreign");
        let chunks =
            transform_file(&node, &vec![1u8; 96], 0, &test_config(), &CancelFlag::new()).unwrap();
        let store = ChunkStore::create(&root, &node, 0, &chunks).unwrap();

        let moved =
            NodeIdentity::from_seed(b"challenged-node", NetworkLocation::new("10.9.9.9", 8444))
                .unwrap();
        assert!(ChallengeResponder::new(moved, store).is_err());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_specific_chunk_challenge_round_trip() {
        let node = node_identity();
        let (mut responder, root) = stored_responder("chunk37", &node);
        let mut validator = ChallengeValidator::new(validator_identity());

        let challenge = challenge_for(&mut validator, 3);
        validator.dispatch(&challenge, &node.public_key).unwrap();
        let response = responder.respond(&challenge).unwrap();

        assert!(validator.validate_challenge_response(
            &challenge,
            &response,
            &node.public_key,
            &node.location,
        ));

        let _ = std::fs::remove_dir_all(&root);
    }
}
