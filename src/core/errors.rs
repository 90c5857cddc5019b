use thiserror::Error;

/// Comprehensive error handling for the unique-storage proof system
#[derive(Error, Debug)]
pub enum UniqueStorageError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chunk plan error: {0}")]
    ChunkPlan(String),

    #[error("Chunk index {index} out of range [0, {max})")]
    ChunkIndexOutOfRange { index: u32, max: u32 },

    #[error("Invalid public key: expected 32 bytes, got {0}")]
    InvalidPublicKeySize(usize),

    #[error("Invalid private key: expected 32 bytes, got {0}")]
    InvalidPrivateKeySize(usize),

    #[error("Invalid signature: expected 64 bytes, got {0}")]
    InvalidSignatureSize(usize),

    #[error("Cryptographic operation failed: {0}")]
    Cryptographic(String),

    #[error("Insufficient iterations: claimed {claimed} < required {required}")]
    InsufficientIterations { claimed: u32, required: u32 },

    #[error("Sequential transform verification failed: {reason}")]
    VdfVerificationFailed { reason: String },

    #[error("Binding mismatch: {reason}")]
    BindingMismatch { reason: String },

    #[error("Signature invalid: {reason}")]
    SignatureInvalid { reason: String },

    #[error("Timing violation: {elapsed_ms}ms elapsed against a {budget_ms}ms budget")]
    TimingViolation { elapsed_ms: u64, budget_ms: u64 },

    #[error("Restoration verification failed: restored bytes do not match original checksum")]
    RestorationVerification,

    #[error("Location mismatch: served from {actual}, expected {expected}")]
    LocationMismatch { actual: String, expected: String },

    #[error("Stale registration: memo epoch {memo_epoch}, current epoch {current_epoch}")]
    StaleRegistration { memo_epoch: u64, current_epoch: u64 },

    #[error("Chunk {chunk_index} has not been transformed by this node")]
    ChunkNotTransformed { chunk_index: u32 },

    #[error("Transform cancelled before completion")]
    TransformCancelled,

    #[error("Challenge not found: {nonce}")]
    ChallengeNotFound { nonce: String },

    #[error("Replayed challenge nonce: {nonce}")]
    ReplayedChallenge { nonce: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupted store: {0}")]
    Corruption(String),

    #[error("Store manifest error: {reason}")]
    StoreManifest { reason: String },
}

/// Helper type alias for Results
pub type UniqueStorageResult<T> = std::result::Result<T, UniqueStorageError>;

/// Deadline checking helper shared by the validator and the serving path
pub fn check_timing_budget(elapsed_ms: u64, budget_ms: u64) -> UniqueStorageResult<()> {
    if elapsed_ms > budget_ms {
        Err(UniqueStorageError::TimingViolation {
            elapsed_ms,
            budget_ms,
        })
    } else {
        Ok(())
    }
}
