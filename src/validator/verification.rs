use crate::core::{
    errors::{check_timing_budget, UniqueStorageError, UniqueStorageResult},
    types::*,
    utils::verify_signature,
};
use crate::transform::binding::bind_to_location;
use crate::transform::engine::recompute_range;
use crate::validator::registration::verify_server_coin_memo;

/// Everything the validator needs to judge one challenge response.
/// `expected_location` and `node_public_key` come from the validator's own
/// records, never from the response.
pub struct ValidationContext<'a> {
    pub challenge: &'a StorageChallenge,
    pub response: &'a ChallengeResponse,
    pub node_public_key: &'a [u8; PUBLIC_KEY_SIZE],
    pub expected_location: &'a NetworkLocation,
    pub validator_public_key: &'a [u8; PUBLIC_KEY_SIZE],
}

/// Judge a response against every acceptance condition. Returns the
/// response latency on success; any single failure rejects the whole
/// response with the specific error — no partial credit.
pub fn evaluate_response(ctx: &ValidationContext) -> UniqueStorageResult<u32> {
    // The challenge itself must be authentic before its deadline means anything
    if !verify_signature(
        ctx.validator_public_key,
        &ctx.challenge.canonical_bytes(),
        &ctx.challenge.validator_signature,
    )? {
        return Err(UniqueStorageError::SignatureInvalid {
            reason: "challenge was not signed by this validator".to_string(),
        });
    }

    // (a) deadline, judged on the validator's own clock values
    let elapsed_secs = ctx.response.responded_at - ctx.challenge.timestamp;
    if elapsed_secs < 0.0 {
        return Err(UniqueStorageError::TimingViolation {
            elapsed_ms: 0,
            budget_ms: ctx.challenge.timeout_ms as u64,
        });
    }
    let elapsed_ms = (elapsed_secs * 1000.0) as u64;
    check_timing_budget(elapsed_ms, ctx.challenge.timeout_ms as u64)?;

    // (b) the claimed location must be the one on file, and the served
    // bytes must bind to it; a spoofed location fails even with a valid
    // signature
    let proof = &ctx.response.proof;
    if proof.current_location != *ctx.expected_location {
        return Err(UniqueStorageError::LocationMismatch {
            actual: proof.current_location.to_string(),
            expected: ctx.expected_location.to_string(),
        });
    }

    let recomputed = bind_to_location(&ctx.response.mutated_data, &proof.current_location);
    if recomputed != proof.server_binding {
        return Err(UniqueStorageError::BindingMismatch {
            reason: "recomputed server binding does not match the claimed binding".to_string(),
        });
    }

    // (c) the served bytes must carry the node key's signature
    if !verify_signature(
        ctx.node_public_key,
        &ctx.response.mutated_data,
        &proof.key_signature,
    )? {
        return Err(UniqueStorageError::SignatureInvalid {
            reason: "key signature over served data does not verify".to_string(),
        });
    }

    Ok(elapsed_ms as u32)
}

/// Boolean form of the full acceptance check; every verifier-side error
/// collapses to a rejection
pub fn validate_challenge_response(ctx: &ValidationContext) -> bool {
    evaluate_response(ctx).is_ok()
}

fn sample_interior_checkpoint(checkpoint_count: usize) -> usize {
    let mut buf = [0u8; 4];
    getrandom::getrandom(&mut buf).unwrap_or_default();
    1 + (u32::from_be_bytes(buf) as usize % (checkpoint_count - 1))
}

/// Verify a sequential-transform result: minimum iteration count,
/// checkpoint cardinality, result signature, the tail segment up to the
/// final state, and one randomly sampled interior checkpoint interval.
/// Recomputation cost is linear in the sampled range; no succinct
/// verification is claimed.
pub fn verify_vdf_result(
    vdf: &VdfResult,
    node_public_key: &[u8; PUBLIC_KEY_SIZE],
    config: &TransformConfig,
) -> UniqueStorageResult<()> {
    if vdf.iterations < config.min_iterations_per_chunk {
        return Err(UniqueStorageError::InsufficientIterations {
            claimed: vdf.iterations,
            required: config.min_iterations_per_chunk,
        });
    }

    let interval = config.checkpoint_interval;
    let expected_checkpoints = (vdf.iterations / interval) as usize;
    if vdf.checkpoints.len() != expected_checkpoints {
        return Err(UniqueStorageError::VdfVerificationFailed {
            reason: format!(
                "{} checkpoints for {} iterations, expected {}",
                vdf.checkpoints.len(),
                vdf.iterations,
                expected_checkpoints
            ),
        });
    }

    if !verify_signature(node_public_key, &vdf.final_state, &vdf.signature)? {
        return Err(UniqueStorageError::SignatureInvalid {
            reason: "final state signature does not verify".to_string(),
        });
    }

    // Tail: from the last checkpoint to the claimed final state
    if expected_checkpoints > 0 {
        let last_checkpoint = vdf.checkpoints[expected_checkpoints - 1];
        let covered = expected_checkpoints as u32 * interval;
        let tail = vdf.iterations - covered;

        let reached = if tail == 0 {
            last_checkpoint
        } else {
            recompute_range(&last_checkpoint, covered, tail)
        };
        if reached != vdf.final_state {
            return Err(UniqueStorageError::VdfVerificationFailed {
                reason: "final state does not follow from the last checkpoint".to_string(),
            });
        }
    }

    // One interior interval, chosen at random per verification
    if expected_checkpoints >= 2 {
        let j = sample_interior_checkpoint(expected_checkpoints);
        let recomputed = recompute_range(&vdf.checkpoints[j - 1], j as u32 * interval, interval);
        if recomputed != vdf.checkpoints[j] {
            return Err(UniqueStorageError::VdfVerificationFailed {
                reason: format!("checkpoint {} does not match its recomputed sub-range", j),
            });
        }
    }

    Ok(())
}

/// Full-strength variant for verifiers that can reconstruct the chunk's
/// initial transform state: additionally grounds the first checkpoint (or,
/// for short runs, the whole chain) in the seed.
pub fn verify_vdf_result_with_seed(
    seed: &[u8; HASH_SIZE],
    vdf: &VdfResult,
    node_public_key: &[u8; PUBLIC_KEY_SIZE],
    config: &TransformConfig,
) -> UniqueStorageResult<()> {
    verify_vdf_result(vdf, node_public_key, config)?;

    let interval = config.checkpoint_interval;
    if vdf.checkpoints.is_empty() {
        if recompute_range(seed, 0, vdf.iterations) != vdf.final_state {
            return Err(UniqueStorageError::VdfVerificationFailed {
                reason: "final state does not follow from the seed".to_string(),
            });
        }
    } else if recompute_range(seed, 0, interval) != vdf.checkpoints[0] {
        return Err(UniqueStorageError::VdfVerificationFailed {
            reason: "first checkpoint does not follow from the seed".to_string(),
        });
    }

    Ok(())
}

/// Context for proof-bundle verification
pub struct BundleContext<'a> {
    pub node_public_key: &'a [u8; PUBLIC_KEY_SIZE],
    pub expected_location: &'a NetworkLocation,
    pub current_epoch: u64,
    pub mutated_data: Option<&'a [u8]>,
}

/// Exhaustive verification over the closed set of proof kinds
pub fn verify_proof_bundle(
    bundle: &ProofBundle,
    ctx: &BundleContext,
) -> UniqueStorageResult<()> {
    match bundle {
        ProofBundle::KeyLocation(memo) => {
            verify_server_coin_memo(memo, ctx.current_epoch)?;
            if memo.wallet_public_key != *ctx.node_public_key {
                return Err(UniqueStorageError::BindingMismatch {
                    reason: "registration key does not match the node on file".to_string(),
                });
            }
            if memo.host != ctx.expected_location.host_string() {
                return Err(UniqueStorageError::LocationMismatch {
                    actual: memo.host.clone(),
                    expected: ctx.expected_location.to_string(),
                });
            }
            Ok(())
        }
        ProofBundle::UniqueContent(proof) => {
            let data = ctx.mutated_data.ok_or_else(|| {
                UniqueStorageError::BindingMismatch {
                    reason: "unique-content proof requires the served bytes".to_string(),
                }
            })?;

            if proof.current_location != *ctx.expected_location {
                return Err(UniqueStorageError::LocationMismatch {
                    actual: proof.current_location.to_string(),
                    expected: ctx.expected_location.to_string(),
                });
            }
            if bind_to_location(data, &proof.current_location) != proof.server_binding {
                return Err(UniqueStorageError::BindingMismatch {
                    reason: "served bytes do not bind to the claimed location".to_string(),
                });
            }
            if !verify_signature(ctx.node_public_key, data, &proof.key_signature)? {
                return Err(UniqueStorageError::SignatureInvalid {
                    reason: "key signature over served data does not verify".to_string(),
                });
            }
            Ok(())
        }
    }
}
