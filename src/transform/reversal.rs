use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::core::{
    errors::{UniqueStorageError, UniqueStorageResult},
    types::*,
    utils::{compute_sha256, derive_key, generate_deterministic_bytes, generate_reversal_nonce},
};

/// The fast-inverse primitive: a keyed byte substitution over a ChaCha20
/// keystream, both seeded from the forward pass's final state. Producing
/// the transform key requires the full sequential transform; applying the
/// inverse is O(len) regardless of the iteration count. This asymmetry is
/// what keeps retrieval cheap while creation stays expensive.

/// Keystream/substitution seed, computable only from the final VDF state
fn transform_key_for(
    final_state: &[u8; HASH_SIZE],
    chunk_index: u32,
    nonce: &[u8; REVERSAL_NONCE_SIZE],
) -> [u8; HASH_SIZE] {
    let mut context = Vec::with_capacity(4 + REVERSAL_NONCE_SIZE);
    context.extend_from_slice(&chunk_index.to_be_bytes());
    context.extend_from_slice(nonce);
    derive_key(final_state, &context, REVERSAL_KEY_INFO)
}

/// Keyed byte permutation via Fisher-Yates over a ChaCha20 stream
fn build_sbox(transform_key: &[u8; HASH_SIZE]) -> [u8; REVERSAL_MATRIX_SIZE] {
    let seed = derive_key(transform_key, &[], REVERSAL_SBOX_INFO);
    let mut rng = ChaCha20Rng::from_seed(seed);

    let mut sbox = [0u8; REVERSAL_MATRIX_SIZE];
    for (i, entry) in sbox.iter_mut().enumerate() {
        *entry = i as u8;
    }
    for i in (1..REVERSAL_MATRIX_SIZE).rev() {
        let j = rng.gen_range(0, i + 1);
        sbox.swap(i, j);
    }
    sbox
}

fn invert_sbox(sbox: &[u8; REVERSAL_MATRIX_SIZE]) -> [u8; REVERSAL_MATRIX_SIZE] {
    let mut inverse = [0u8; REVERSAL_MATRIX_SIZE];
    for (i, &mapped) in sbox.iter().enumerate() {
        inverse[mapped as usize] = i as u8;
    }
    inverse
}

/// Build the reversal key for a chunk from forward-transform material
pub fn generate_reversal_key(
    original_chunk: &[u8],
    vdf: &VdfResult,
    initial_state: &[u8; HASH_SIZE],
    chunk_index: u32,
) -> ReversalKey {
    let mut nonce_entropy = Vec::with_capacity(HASH_SIZE + 4);
    nonce_entropy.extend_from_slice(&vdf.final_state);
    nonce_entropy.extend_from_slice(&chunk_index.to_be_bytes());
    let nonce = generate_reversal_nonce(&nonce_entropy);

    let transform_key = transform_key_for(&vdf.final_state, chunk_index, &nonce);
    let sbox = build_sbox(&transform_key);

    ReversalKey {
        transform_key,
        reversal_matrix: invert_sbox(&sbox),
        original_checksum: compute_sha256(original_chunk),
        parameters: ReversalParameters {
            iterations: vdf.iterations,
            seed: *initial_state,
            nonce,
        },
    }
}

/// Mutate a chunk into its node-unique stored form and emit the matching
/// reversal key
pub fn mutate_chunk(
    original_chunk: &[u8],
    vdf: &VdfResult,
    initial_state: &[u8; HASH_SIZE],
    chunk_index: u32,
) -> UniqueStorageResult<(Vec<u8>, ReversalKey)> {
    if original_chunk.is_empty() {
        return Err(UniqueStorageError::ChunkPlan(
            "cannot mutate an empty chunk".to_string(),
        ));
    }

    let reversal_key = generate_reversal_key(original_chunk, vdf, initial_state, chunk_index);
    let sbox = invert_sbox(&reversal_key.reversal_matrix);
    let keystream = generate_deterministic_bytes(&reversal_key.transform_key, original_chunk.len());

    let mutated = original_chunk
        .iter()
        .zip(keystream.iter())
        .map(|(&byte, &pad)| sbox[(byte ^ pad) as usize])
        .collect();

    Ok((mutated, reversal_key))
}

/// Recover the exact original bytes from mutated data in time independent
/// of the transform's iteration count. Output is verified against the
/// original checksum before it is returned; a mismatch is terminal and
/// unverified data is never served.
pub fn restore_original_data(
    mutated_data: &[u8],
    reversal_key: &ReversalKey,
) -> UniqueStorageResult<Vec<u8>> {
    let keystream = generate_deterministic_bytes(&reversal_key.transform_key, mutated_data.len());

    let restored: Vec<u8> = mutated_data
        .iter()
        .zip(keystream.iter())
        .map(|(&byte, &pad)| reversal_key.reversal_matrix[byte as usize] ^ pad)
        .collect();

    if compute_sha256(&restored) != reversal_key.original_checksum {
        return Err(UniqueStorageError::RestorationVerification);
    }

    Ok(restored)
}

/// Reversal material size relative to the chunk it reverses
pub fn reversal_overhead_ratio(chunk_length: usize) -> f64 {
    let overhead = HASH_SIZE // transform_key
        + REVERSAL_MATRIX_SIZE
        + HASH_SIZE // original_checksum
        + 4 + HASH_SIZE + REVERSAL_NONCE_SIZE; // parameters
    overhead as f64 / chunk_length.max(1) as f64
}
