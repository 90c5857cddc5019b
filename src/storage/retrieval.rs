use log::{debug, warn};

use crate::core::{
    errors::UniqueStorageResult,
    types::RETRIEVAL_TARGET_MS,
    utils::{validate_chunk_index, PerformanceTimer},
};
use crate::storage::store::ChunkStore;
use crate::transform::reversal::restore_original_data;

/// Latency-sensitive serving path: answers data requests by fast reversal,
/// never by recomputation. The transform engine is not reachable from here.
pub struct RetrievalService {
    store: ChunkStore,
}

impl RetrievalService {
    pub fn new(store: ChunkStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ChunkStore {
        &mut self.store
    }

    /// Serve one chunk's original bytes. Output is checksum-verified by the
    /// reversal layer before it leaves this function; a verification
    /// failure aborts the request rather than returning suspect data.
    pub fn serve_chunk(&mut self, chunk_index: u32) -> UniqueStorageResult<Vec<u8>> {
        let timer = PerformanceTimer::new("serve_chunk");
        validate_chunk_index(chunk_index, self.store.chunk_count())?;

        let mutated = self.store.read_mutated(chunk_index)?;
        let record = self.store.record(chunk_index)?;
        let restored = restore_original_data(&mutated, &record.reversal_key)?;

        let elapsed = timer.check_target(RETRIEVAL_TARGET_MS);
        if elapsed > RETRIEVAL_TARGET_MS {
            warn!(
                "serve_chunk({}) took {}ms against a {}ms budget",
                chunk_index, elapsed, RETRIEVAL_TARGET_MS
            );
        } else {
            debug!("serve_chunk({}) answered in {}ms", chunk_index, elapsed);
        }

        Ok(restored)
    }

    /// Reconstruct the full original file in chunk order
    pub fn serve_all(&mut self) -> UniqueStorageResult<Vec<u8>> {
        let mut indices: Vec<u32> = self.store.records().iter().map(|r| r.chunk_index).collect();
        indices.sort_unstable();

        let mut data = Vec::with_capacity(self.store.file_size() as usize);
        for chunk_index in indices {
            data.extend_from_slice(&self.serve_chunk(chunk_index)?);
        }
        Ok(data)
    }
}
