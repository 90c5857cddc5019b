use crc::{Crc, CRC_32_ISO_HDLC};
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer, Verifier};
use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use hmac::{Hmac, Mac, NewMac};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::errors::{UniqueStorageError, UniqueStorageResult};
use crate::core::types::*;

/// Compute SHA256 hash of data
pub fn compute_sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn compute_blake3(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

pub fn compute_keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Fast CRC32 checksum for stored chunk integrity (much faster than SHA256)
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
    CRC.checksum(data)
}

/// Get current timestamp in seconds since Unix epoch
pub fn get_current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Generate a deterministic-width nonce for reversal key material
pub fn generate_reversal_nonce(additional_entropy: &[u8]) -> [u8; REVERSAL_NONCE_SIZE] {
    let mut data = Vec::new();
    data.extend_from_slice(&get_current_timestamp().to_be_bytes());
    data.extend_from_slice(additional_entropy);

    let hash = compute_sha256(&data);
    let mut nonce = [0u8; REVERSAL_NONCE_SIZE];
    nonce.copy_from_slice(&hash[..REVERSAL_NONCE_SIZE]);
    nonce
}

/// Single-use challenge nonce backed by OS randomness
pub fn generate_challenge_nonce() -> [u8; CHALLENGE_NONCE_SIZE] {
    let mut nonce = [0u8; CHALLENGE_NONCE_SIZE];
    getrandom::getrandom(&mut nonce).unwrap_or_default();

    // Fold in local entropy so a failed OS read still never repeats
    let fold = compute_keccak256(&generate_secure_entropy(&nonce));
    for (byte, extra) in nonce.iter_mut().zip(fold.iter()) {
        *byte ^= extra;
    }
    nonce
}

/// Generate cryptographically secure random entropy
pub fn generate_secure_entropy(additional_data: &[u8]) -> [u8; 32] {
    let mut entropy_sources = Vec::new();

    entropy_sources.extend_from_slice(&get_current_timestamp().to_be_bytes());

    let mut system_random = [0u8; 32];
    getrandom::getrandom(&mut system_random).unwrap_or_default();
    entropy_sources.extend_from_slice(&system_random);

    entropy_sources.extend_from_slice(additional_data);
    entropy_sources.extend_from_slice(&std::process::id().to_be_bytes());

    compute_blake3(&entropy_sources)
}

/// Deterministic byte expansion using ChaCha20
pub fn generate_deterministic_bytes(seed: &[u8; 32], length: usize) -> Vec<u8> {
    let mut rng = ChaCha20Rng::from_seed(*seed);
    (0..length).map(|_| rng.gen()).collect()
}

/// HMAC-based key derivation
pub fn derive_key(master_key: &[u8], context: &[u8], info: &str) -> [u8; 32] {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_varkey(master_key).expect("HMAC can take key of any size");
    mac.update(context);
    mac.update(info.as_bytes());

    let result = mac.finalize().into_bytes();
    let mut derived_key = [0u8; 32];
    derived_key.copy_from_slice(&result);
    derived_key
}

/// Input validation helpers
pub fn validate_public_key(public_key: &[u8]) -> UniqueStorageResult<()> {
    if public_key.len() != PUBLIC_KEY_SIZE {
        return Err(UniqueStorageError::InvalidPublicKeySize(public_key.len()));
    }
    Ok(())
}

pub fn validate_private_key(private_key: &[u8]) -> UniqueStorageResult<()> {
    if private_key.len() != PRIVATE_KEY_SIZE {
        return Err(UniqueStorageError::InvalidPrivateKeySize(private_key.len()));
    }
    Ok(())
}

pub fn validate_chunk_index(chunk_index: u32, total_chunks: u32) -> UniqueStorageResult<()> {
    if chunk_index >= total_chunks {
        return Err(UniqueStorageError::ChunkIndexOutOfRange {
            index: chunk_index,
            max: total_chunks,
        });
    }
    Ok(())
}

/// Ed25519 signature generation and verification
pub fn sign_data(private_key: &[u8], data: &[u8]) -> UniqueStorageResult<Vec<u8>> {
    validate_private_key(private_key)?;

    let secret_key = SecretKey::from_bytes(private_key)
        .map_err(|e| UniqueStorageError::Cryptographic(format!("Invalid private key: {}", e)))?;

    let public_key = PublicKey::from(&secret_key);
    let keypair = Keypair {
        secret: secret_key,
        public: public_key,
    };

    Ok(keypair.sign(data).to_bytes().to_vec())
}

pub fn verify_signature(
    public_key: &[u8],
    data: &[u8],
    signature: &[u8],
) -> UniqueStorageResult<bool> {
    validate_public_key(public_key)?;

    if signature.len() != SIGNATURE_SIZE {
        return Err(UniqueStorageError::InvalidSignatureSize(signature.len()));
    }

    let public_key = PublicKey::from_bytes(public_key)
        .map_err(|e| UniqueStorageError::Cryptographic(format!("Invalid public key: {}", e)))?;

    let signature = Signature::from_bytes(signature)
        .map_err(|e| UniqueStorageError::Cryptographic(format!("Invalid signature: {}", e)))?;

    Ok(public_key.verify(data, &signature).is_ok())
}

/// Derive the public key matching an Ed25519 secret key
pub fn derive_public_key(private_key: &[u8]) -> UniqueStorageResult<[u8; PUBLIC_KEY_SIZE]> {
    validate_private_key(private_key)?;

    let secret_key = SecretKey::from_bytes(private_key)
        .map_err(|e| UniqueStorageError::Cryptographic(format!("Invalid private key: {}", e)))?;

    Ok(PublicKey::from(&secret_key).to_bytes())
}

impl NodeIdentity {
    /// Build an identity from existing key material, validating sizes
    pub fn from_keys(
        public_key: &[u8],
        private_key: &[u8],
        location: NetworkLocation,
    ) -> UniqueStorageResult<Self> {
        validate_public_key(public_key)?;
        validate_private_key(private_key)?;

        let mut public = [0u8; PUBLIC_KEY_SIZE];
        public.copy_from_slice(public_key);
        let mut private = [0u8; PRIVATE_KEY_SIZE];
        private.copy_from_slice(private_key);

        Ok(Self {
            public_key: public,
            private_key: private,
            location,
        })
    }

    /// Generate a fresh identity from OS entropy
    pub fn generate(location: NetworkLocation) -> UniqueStorageResult<Self> {
        let mut private = [0u8; PRIVATE_KEY_SIZE];
        getrandom::getrandom(&mut private).map_err(|e| {
            UniqueStorageError::Cryptographic(format!("Entropy generation failed: {}", e))
        })?;

        let public = derive_public_key(&private)?;
        Ok(Self {
            public_key: public,
            private_key: private,
            location,
        })
    }

    /// Build an identity deterministically from seed bytes (tests, tooling)
    pub fn from_seed(seed: &[u8], location: NetworkLocation) -> UniqueStorageResult<Self> {
        let private = compute_sha256(seed);
        let public = derive_public_key(&private)?;
        Ok(Self {
            public_key: public,
            private_key: private,
            location,
        })
    }
}

/// Stable identifier for a (key, location) pair, used to scope stored copies
pub fn generate_node_scope_id(identity: &NodeIdentity) -> [u8; 32] {
    let mut data = Vec::new();
    data.extend_from_slice(&identity.public_key);
    data.extend_from_slice(&identity.location.canonical_bytes());
    compute_sha256(&data)
}

/// Performance timing utilities
pub struct PerformanceTimer {
    start_time: std::time::Instant,
    operation_name: String,
}

impl PerformanceTimer {
    pub fn new(operation_name: &str) -> Self {
        Self {
            start_time: std::time::Instant::now(),
            operation_name: operation_name.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u32 {
        self.start_time.elapsed().as_millis() as u32
    }

    pub fn check_target(self, target_ms: u32) -> u32 {
        let elapsed = self.elapsed_ms();
        if elapsed > target_ms {
            debug!(
                "Performance target missed: {} took {}ms (target: {}ms)",
                self.operation_name, elapsed, target_ms
            );
        } else {
            debug!(
                "Performance target met: {} took {}ms (target: {}ms)",
                self.operation_name, elapsed, target_ms
            );
        }
        elapsed
    }
}

/// Merkle root over stored mutated-chunk hashes
pub fn compute_merkle_root(hashes: &[[u8; 32]]) -> [u8; 32] {
    if hashes.is_empty() {
        return [0u8; 32];
    }

    use rs_merkle::{algorithms::Sha256 as MerkleSha256, MerkleTree as RsMerkleTree};
    let tree = RsMerkleTree::<MerkleSha256>::from_leaves(hashes);
    tree.root().unwrap_or([0u8; 32])
}
