use serde::{Deserialize, Serialize};

// Protocol Constants
pub const HASH_SIZE: usize = 32; // SHA256 output size
pub const PUBLIC_KEY_SIZE: usize = 32; // Ed25519 public key
pub const PRIVATE_KEY_SIZE: usize = 32; // Ed25519 secret key
pub const SIGNATURE_SIZE: usize = 64; // Ed25519 signature

// Transform Parameters
pub const STANDARD_CHUNK_COUNT: u32 = 60; // Fixed chunk count regardless of file size
pub const MIN_ITERATIONS_PER_CHUNK: u32 = 100_000; // Floor for a valid per-chunk proof
pub const CHECKPOINT_INTERVAL: u32 = 10_000; // Iterations between checkpoint snapshots
pub const TARGET_TOTAL_TIME_SECS: f64 = 60.0; // Calibrated full-copy transform duration
pub const DEFAULT_ITERATIONS_PER_SECOND: u32 = 375_000; // Reference-hardware estimate

// Challenge Parameters
pub const CHALLENGE_TIMEOUT_MS: u32 = 5_000; // Validator-enforced response deadline
pub const CHALLENGE_NONCE_SIZE: usize = 16; // Single-use nonce width
pub const STORE_READ_TARGET_MS: u32 = 100; // Chunk read budget inside the challenge window
pub const RETRIEVAL_TARGET_MS: u32 = 150; // Full read+reversal serving budget

// Reversal Key Parameters
pub const REVERSAL_NONCE_SIZE: usize = 12;
pub const REVERSAL_MATRIX_SIZE: usize = 256; // Inverse byte-substitution table

// Registration Parameters
pub const EPOCH_DURATION_SECS: u64 = 3_600; // Key-location registrations are valid for one epoch
pub const PROTOCOL_PREFIX: &[u8] = b"proof-of-unique-storage.v1"; // Domain separation for memo signatures

// Ledger Parameters
pub const LEDGER_WINDOW: usize = 256; // Rolling outcome window per node

// Domain separation labels
pub const CHAIN_SEED_DOMAIN: &[u8] = b"unique-storage.chain-seed";
pub const REVERSAL_KEY_INFO: &str = "unique-storage.reversal-key";
pub const REVERSAL_SBOX_INFO: &str = "unique-storage.reversal-sbox";

// Calibration bounds (iterations per second on plausible hardware)
pub const CALIBRATION_MIN_RATE: u32 = 50_000;
pub const CALIBRATION_MAX_RATE: u32 = 5_000_000;

/// A node's network location; every binding commits to this value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkLocation {
    pub ip: String,
    pub port: u16,
    pub hostname: Option<String>,
}

impl NetworkLocation {
    pub fn new(ip: &str, port: u16) -> Self {
        Self {
            ip: ip.to_string(),
            port,
            hostname: None,
        }
    }

    pub fn with_hostname(ip: &str, port: u16, hostname: &str) -> Self {
        Self {
            ip: ip.to_string(),
            port,
            hostname: Some(hostname.to_string()),
        }
    }

    /// Canonical byte encoding used by every binding computation.
    /// NUL separators keep adjacent fields from aliasing each other.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut encoded = Vec::new();
        encoded.extend_from_slice(self.ip.as_bytes());
        encoded.push(0);
        encoded.extend_from_slice(&self.port.to_be_bytes());
        encoded.push(0);
        if let Some(ref hostname) = self.hostname {
            encoded.extend_from_slice(hostname.as_bytes());
        }
        encoded
    }

    /// Host string used in key-location registration records
    pub fn host_string(&self) -> String {
        match self.hostname {
            Some(ref hostname) => format!("{}:{}", hostname, self.port),
            None => format!("{}:{}", self.ip, self.port),
        }
    }
}

impl std::fmt::Display for NetworkLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.host_string())
    }
}

/// Long-lived node identity. The private key is exclusively owned by the
/// node; rotating the key or moving the location invalidates every stored
/// artifact bound to the old values.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    pub private_key: [u8; PRIVATE_KEY_SIZE],
    pub location: NetworkLocation,
}

/// Immutable chunk boundary within the original file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDefinition {
    pub index: u32,
    pub start_offset: u64,
    pub length: u64,
}

/// Ordered partition of a file into a fixed chunk count
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub file_size: u64,
    pub chunks: Vec<ChunkDefinition>,
}

impl ChunkPlan {
    pub fn chunk_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    /// Byte range of one chunk within the source buffer
    pub fn slice_bounds(&self, index: u32) -> Option<(usize, usize)> {
        self.chunks.get(index as usize).map(|def| {
            let start = def.start_offset as usize;
            (start, start + def.length as usize)
        })
    }
}

/// Cryptographic linkage of chunk data to a location and key.
/// Derived once at transform time, never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkBinding {
    /// hash(canonical(location) || chunk_data)
    pub server_binding: [u8; HASH_SIZE],
    /// sign(private_key, server_binding || chunk_data)
    pub key_binding: Vec<u8>,
    /// hash(server_binding || key_binding)
    pub final_binding: [u8; HASH_SIZE],
}

/// Output of the sequential transform for one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct VdfResult {
    pub final_state: [u8; HASH_SIZE],
    /// Intermediate states captured every `checkpoint_interval` iterations,
    /// in iteration order; length == iterations / checkpoint_interval
    pub checkpoints: Vec<[u8; HASH_SIZE]>,
    pub iterations: u32,
    /// sign(private_key, final_state)
    pub signature: Vec<u8>,
}

/// Parameters recorded alongside a reversal key
#[derive(Debug, Clone, PartialEq)]
pub struct ReversalParameters {
    pub iterations: u32,
    /// Initial transform state of the chunk (the forward-pass seed)
    pub seed: [u8; HASH_SIZE],
    pub nonce: [u8; REVERSAL_NONCE_SIZE],
}

/// Asymmetric fast-inverse material harvested from the forward transform.
/// Applying the inverse to the matching mutated data always reproduces the
/// original bytes exactly, or the data is corrupt.
#[derive(Debug, Clone, PartialEq)]
pub struct ReversalKey {
    /// HMAC-derived keystream seed; computable only from the final VDF state
    pub transform_key: [u8; HASH_SIZE],
    /// Inverse byte-substitution table
    pub reversal_matrix: [u8; REVERSAL_MATRIX_SIZE],
    /// sha256 of the original chunk bytes
    pub original_checksum: [u8; HASH_SIZE],
    pub parameters: ReversalParameters,
}

/// Creation-time provenance persisted with each transformed chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkProvenance {
    pub binding: ChunkBinding,
    pub vdf: VdfResult,
}

/// Persisted artifact; read-only after write, one per (node, chunk index)
#[derive(Debug, Clone)]
pub struct TransformedChunk {
    pub mutated_data: Vec<u8>,
    pub reversal_key: ReversalKey,
    pub chunk_index: u32,
    pub proof: ChunkProvenance,
}

/// Ephemeral, single-use storage challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageChallenge {
    pub copy_index: u32,
    pub chunk_index: u32,
    pub challenge_nonce: [u8; CHALLENGE_NONCE_SIZE],
    /// UNIX seconds at issue time
    pub timestamp: f64,
    pub validator_signature: Vec<u8>,
    pub timeout_ms: u32,
}

impl StorageChallenge {
    /// Bytes covered by the validator signature
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut encoded = Vec::new();
        encoded.extend_from_slice(&self.copy_index.to_be_bytes());
        encoded.extend_from_slice(&self.chunk_index.to_be_bytes());
        encoded.extend_from_slice(&self.challenge_nonce);
        encoded.extend_from_slice(&self.timestamp.to_be_bytes());
        encoded.extend_from_slice(&self.timeout_ms.to_be_bytes());
        encoded
    }

    pub fn nonce_hex(&self) -> String {
        hex::encode(self.challenge_nonce)
    }
}

/// Proof that served bytes are bound to the serving node's location and key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueContentProof {
    pub server_binding: [u8; HASH_SIZE],
    /// sign(private_key, mutated_data)
    pub key_signature: Vec<u8>,
    pub current_location: NetworkLocation,
}

/// Ephemeral response to a storage challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub mutated_data: Vec<u8>,
    pub proof: UniqueContentProof,
    /// UNIX seconds at response time
    pub responded_at: f64,
}

/// Signed key-location registration record, valid for one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCoinMemo {
    pub host: String,
    pub wallet_public_key: [u8; PUBLIC_KEY_SIZE],
    pub epoch: u64,
    /// sign(private_key, public_key || host || epoch_be || PROTOCOL_PREFIX)
    pub signature: Vec<u8>,
}

/// Closed union of proof kinds so verification is exhaustive
#[derive(Debug, Clone)]
pub enum ProofBundle {
    KeyLocation(ServerCoinMemo),
    UniqueContent(UniqueContentProof),
}

/// Per-challenge state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeStatus {
    Issued,
    AwaitingResponse,
    Verified,
    TimedOut,
    Failed,
}

/// Transform and challenge configuration. Defaults match the protocol
/// constants; tests shrink the iteration counts for wall-clock sanity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    pub standard_chunk_count: u32,
    pub min_iterations_per_chunk: u32,
    pub checkpoint_interval: u32,
    pub target_total_time_secs: f64,
    pub challenge_timeout_ms: u32,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            standard_chunk_count: STANDARD_CHUNK_COUNT,
            min_iterations_per_chunk: MIN_ITERATIONS_PER_CHUNK,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            target_total_time_secs: TARGET_TOTAL_TIME_SECS,
            challenge_timeout_ms: CHALLENGE_TIMEOUT_MS,
        }
    }
}

impl TransformConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.standard_chunk_count == 0 {
            return Err("standard_chunk_count must be positive".to_string());
        }
        if self.checkpoint_interval == 0 {
            return Err("checkpoint_interval must be positive".to_string());
        }
        if self.min_iterations_per_chunk == 0 {
            return Err("min_iterations_per_chunk must be positive".to_string());
        }
        Ok(())
    }

    /// Per-chunk iteration count that completes a full copy in roughly
    /// `target_total_time_secs` at the measured rate, never below the
    /// configured minimum
    pub fn iterations_for_rate(&self, iterations_per_second: u32) -> u32 {
        let per_chunk = (self.target_total_time_secs * iterations_per_second as f64
            / self.standard_chunk_count as f64) as u32;
        per_chunk.max(self.min_iterations_per_chunk)
    }

    /// Wall-clock estimate for a cold full-copy recompute at the measured
    /// rate; the cheating path a challenge timeout must dominate
    pub fn estimated_recompute_ms(&self, iterations_per_second: u32) -> u64 {
        let total_iterations = self.iterations_for_rate(iterations_per_second) as u64
            * self.standard_chunk_count as u64;
        total_iterations * 1_000 / iterations_per_second.max(1) as u64
    }
}
