//! Proof of unique storage.
//!
//! Proves that a storage node holds a genuinely distinct, location- and
//! key-bound copy of data. Creating a copy requires a slow, strictly
//! sequential transform chained across a fixed number of chunks; serving
//! and verifying a copy stay fast through reversal keys harvested from the
//! forward pass. A node that never ran the transform cannot answer a
//! challenge inside the deadline, because the only alternative is the full
//! recompute — that asymmetry, not access control, is the anti-fraud core.
//!
//! Write path: plan chunks, bind them to the node's location and key, run
//! the sequential transform, harvest reversal material, persist. Read
//! path: memory-mapped chunk reads, O(len) reversal, checksum-verified
//! output. Validation path: signed single-use challenges with a hard
//! deadline, binding and signature checks, checkpoint spot verification,
//! and a rolling per-node outcome ledger.

pub mod core;
pub mod storage;
pub mod transform;
pub mod validator;

pub use crate::core::errors::{UniqueStorageError, UniqueStorageResult};
pub use crate::core::logging::{init_logger, LoggerConfig};
pub use crate::core::types::*;
pub use crate::storage::{ChunkStore, RetrievalService};
pub use crate::transform::{
    bind_to_location, create_chunk_bindings, plan_chunks, restore_original_data, transform_copies,
    transform_file, CancelFlag, TransformCalibration, TransformTask,
};
pub use crate::validator::{
    create_server_coin_memo, current_epoch, verify_server_coin_memo, verify_vdf_result,
    ChallengeLedger, ChallengeResponder, ChallengeValidator,
};

use std::path::{Path, PathBuf};

use crate::transform::engine::transform_file as run_transform;
use crate::validator::registration;

/// High-level node facade wiring planner, binding, transform engine,
/// reversal key generation, and storage together
pub struct UniqueStorageNode {
    identity: NodeIdentity,
    config: TransformConfig,
    store_root: PathBuf,
}

impl UniqueStorageNode {
    pub fn new(
        identity: NodeIdentity,
        config: TransformConfig,
        store_root: &Path,
    ) -> UniqueStorageResult<Self> {
        config.validate().map_err(UniqueStorageError::ChunkPlan)?;
        Ok(Self {
            identity,
            config,
            store_root: store_root.to_path_buf(),
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// The slow write path: transform and persist one copy. Run once per
    /// (node, location, key, copy) combination.
    pub fn commit_file(&self, data: &[u8], copy_index: u32) -> UniqueStorageResult<ChunkStore> {
        let cancel = CancelFlag::new();
        let chunks = run_transform(&self.identity, data, copy_index, &self.config, &cancel)?;
        ChunkStore::create(&self.store_root, &self.identity, copy_index, &chunks)
    }

    /// Background variant with a cancellation handle and completion channel
    pub fn commit_file_background(&self, data: Vec<u8>, copy_index: u32) -> TransformTask {
        TransformTask::spawn(
            self.identity.clone(),
            data,
            copy_index,
            self.config.clone(),
        )
    }

    /// Open the fast serving path for a stored copy
    pub fn open_retrieval(&self, copy_index: u32) -> UniqueStorageResult<RetrievalService> {
        let store = ChunkStore::load(&self.store_root, &self.identity, copy_index)?;
        Ok(RetrievalService::new(store))
    }

    /// Open the node-side challenge handler for a stored copy
    pub fn open_responder(&self, copy_index: u32) -> UniqueStorageResult<ChallengeResponder> {
        let store = ChunkStore::load(&self.store_root, &self.identity, copy_index)?;
        ChallengeResponder::new(self.identity.clone(), store)
    }

    /// Publish this node's key-location registration for an epoch
    pub fn register(&self, epoch: u64) -> UniqueStorageResult<ServerCoinMemo> {
        registration::create_server_coin_memo(&self.identity, epoch)
    }
}
