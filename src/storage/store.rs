use log::info;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::{
    errors::{UniqueStorageError, UniqueStorageResult},
    types::*,
    utils::{
        compute_crc32, compute_merkle_root, compute_sha256, generate_node_scope_id,
        PerformanceTimer,
    },
};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Serialized store manifest; hex-encoded fields keep it inspectable
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreManifest {
    format_version: u32,
    node_public_key: String,
    location: NetworkLocation,
    copy_index: u32,
    file_size: u64,
    chunk_count: u32,
    merkle_root: String,
    chunks: Vec<ManifestRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestRecord {
    chunk_index: u32,
    length: u64,
    crc32: u32,
    mutated_sha256: String,
    transform_key: String,
    reversal_matrix: String,
    original_checksum: String,
    reversal_iterations: u32,
    reversal_seed: String,
    reversal_nonce: String,
    server_binding: String,
    key_binding: String,
    final_binding: String,
    vdf_final_state: String,
    vdf_checkpoints: Vec<String>,
    vdf_iterations: u32,
    vdf_signature: String,
}

/// Decoded per-chunk record held in memory after load
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk_index: u32,
    pub length: u64,
    pub crc32: u32,
    pub mutated_sha256: [u8; HASH_SIZE],
    pub reversal_key: ReversalKey,
    pub binding: ChunkBinding,
    pub vdf: VdfResult,
}

fn decode_hex_field(value: &str, field: &str) -> UniqueStorageResult<Vec<u8>> {
    hex::decode(value).map_err(|e| {
        UniqueStorageError::Serialization(format!("invalid hex in manifest field {}: {}", field, e))
    })
}

fn decode_hash(value: &str, field: &str) -> UniqueStorageResult<[u8; HASH_SIZE]> {
    let bytes = decode_hex_field(value, field)?;
    if bytes.len() != HASH_SIZE {
        return Err(UniqueStorageError::Serialization(format!(
            "manifest field {} has length {}, expected {}",
            field,
            bytes.len(),
            HASH_SIZE
        )));
    }
    let mut hash = [0u8; HASH_SIZE];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}

impl ManifestRecord {
    fn from_chunk(chunk: &TransformedChunk) -> Self {
        Self {
            chunk_index: chunk.chunk_index,
            length: chunk.mutated_data.len() as u64,
            crc32: compute_crc32(&chunk.mutated_data),
            mutated_sha256: hex::encode(compute_sha256(&chunk.mutated_data)),
            transform_key: hex::encode(chunk.reversal_key.transform_key),
            reversal_matrix: hex::encode(chunk.reversal_key.reversal_matrix),
            original_checksum: hex::encode(chunk.reversal_key.original_checksum),
            reversal_iterations: chunk.reversal_key.parameters.iterations,
            reversal_seed: hex::encode(chunk.reversal_key.parameters.seed),
            reversal_nonce: hex::encode(chunk.reversal_key.parameters.nonce),
            server_binding: hex::encode(chunk.proof.binding.server_binding),
            key_binding: hex::encode(&chunk.proof.binding.key_binding),
            final_binding: hex::encode(chunk.proof.binding.final_binding),
            vdf_final_state: hex::encode(chunk.proof.vdf.final_state),
            vdf_checkpoints: chunk.proof.vdf.checkpoints.iter().map(hex::encode).collect(),
            vdf_iterations: chunk.proof.vdf.iterations,
            vdf_signature: hex::encode(&chunk.proof.vdf.signature),
        }
    }

    fn decode(&self) -> UniqueStorageResult<StoredChunk> {
        let matrix_bytes = decode_hex_field(&self.reversal_matrix, "reversal_matrix")?;
        if matrix_bytes.len() != REVERSAL_MATRIX_SIZE {
            return Err(UniqueStorageError::Serialization(format!(
                "reversal matrix has length {}, expected {}",
                matrix_bytes.len(),
                REVERSAL_MATRIX_SIZE
            )));
        }
        let mut reversal_matrix = [0u8; REVERSAL_MATRIX_SIZE];
        reversal_matrix.copy_from_slice(&matrix_bytes);

        let nonce_bytes = decode_hex_field(&self.reversal_nonce, "reversal_nonce")?;
        if nonce_bytes.len() != REVERSAL_NONCE_SIZE {
            return Err(UniqueStorageError::Serialization(format!(
                "reversal nonce has length {}, expected {}",
                nonce_bytes.len(),
                REVERSAL_NONCE_SIZE
            )));
        }
        let mut nonce = [0u8; REVERSAL_NONCE_SIZE];
        nonce.copy_from_slice(&nonce_bytes);

        let mut checkpoints = Vec::with_capacity(self.vdf_checkpoints.len());
        for (i, checkpoint) in self.vdf_checkpoints.iter().enumerate() {
            checkpoints.push(decode_hash(checkpoint, &format!("vdf_checkpoints[{}]", i))?);
        }

        Ok(StoredChunk {
            chunk_index: self.chunk_index,
            length: self.length,
            crc32: self.crc32,
            mutated_sha256: decode_hash(&self.mutated_sha256, "mutated_sha256")?,
            reversal_key: ReversalKey {
                transform_key: decode_hash(&self.transform_key, "transform_key")?,
                reversal_matrix,
                original_checksum: decode_hash(&self.original_checksum, "original_checksum")?,
                parameters: ReversalParameters {
                    iterations: self.reversal_iterations,
                    seed: decode_hash(&self.reversal_seed, "reversal_seed")?,
                    nonce,
                },
            },
            binding: ChunkBinding {
                server_binding: decode_hash(&self.server_binding, "server_binding")?,
                key_binding: decode_hex_field(&self.key_binding, "key_binding")?,
                final_binding: decode_hash(&self.final_binding, "final_binding")?,
            },
            vdf: VdfResult {
                final_state: decode_hash(&self.vdf_final_state, "vdf_final_state")?,
                checkpoints,
                iterations: self.vdf_iterations,
                signature: decode_hex_field(&self.vdf_signature, "vdf_signature")?,
            },
        })
    }
}

/// Persistent store for one copy's transformed chunks. Single writer at
/// creation time, read-only thereafter; concurrent readers need no
/// locking. Reads are memory-mapped to stay inside the challenge budget.
pub struct ChunkStore {
    store_dir: PathBuf,
    manifest: StoreManifest,
    records: Vec<StoredChunk>,
    mmaps: HashMap<u32, Mmap>,
}

/// Directory holding one (node, copy) store
pub fn copy_store_dir(root: &Path, identity: &NodeIdentity, copy_index: u32) -> PathBuf {
    root.join(hex::encode(generate_node_scope_id(identity)))
        .join(format!("copy_{:04}", copy_index))
}

fn chunk_file_name(chunk_index: u32) -> String {
    format!("chunk_{:06}.pous", chunk_index)
}

impl ChunkStore {
    /// Persist a freshly transformed copy. Fails if the copy already
    /// exists: stored artifacts are write-once.
    pub fn create(
        root: &Path,
        identity: &NodeIdentity,
        copy_index: u32,
        chunks: &[TransformedChunk],
    ) -> UniqueStorageResult<Self> {
        let timer = PerformanceTimer::new("chunk_store_create");
        let store_dir = copy_store_dir(root, identity, copy_index);
        let manifest_path = store_dir.join(MANIFEST_FILE_NAME);

        if manifest_path.exists() {
            return Err(UniqueStorageError::StoreManifest {
                reason: format!(
                    "copy {} already stored at {} (artifacts are write-once)",
                    copy_index,
                    store_dir.display()
                ),
            });
        }

        if chunks.is_empty() {
            return Err(UniqueStorageError::StoreManifest {
                reason: "refusing to store an empty copy".to_string(),
            });
        }

        std::fs::create_dir_all(&store_dir)?;

        let mut file_size = 0u64;
        let mut leaf_hashes = Vec::with_capacity(chunks.len());
        let mut manifest_records = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let file = OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(store_dir.join(chunk_file_name(chunk.chunk_index)))?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&chunk.mutated_data)?;
            writer.flush()?;

            file_size += chunk.mutated_data.len() as u64;
            leaf_hashes.push(compute_sha256(&chunk.mutated_data));
            manifest_records.push(ManifestRecord::from_chunk(chunk));
        }

        let manifest = StoreManifest {
            format_version: STORE_FORMAT_VERSION,
            node_public_key: hex::encode(identity.public_key),
            location: identity.location.clone(),
            copy_index,
            file_size,
            chunk_count: chunks.len() as u32,
            merkle_root: hex::encode(compute_merkle_root(&leaf_hashes)),
            chunks: manifest_records,
        };

        let serialized = serde_json::to_string_pretty(&manifest)
            .map_err(|e| UniqueStorageError::Serialization(e.to_string()))?;
        std::fs::write(&manifest_path, serialized)?;

        let records = manifest
            .chunks
            .iter()
            .map(ManifestRecord::decode)
            .collect::<UniqueStorageResult<Vec<_>>>()?;

        info!(
            "Stored copy {} ({} chunks, {} bytes) at {} in {}ms",
            copy_index,
            chunks.len(),
            file_size,
            store_dir.display(),
            timer.elapsed_ms()
        );

        Ok(Self {
            store_dir,
            manifest,
            records,
            mmaps: HashMap::new(),
        })
    }

    /// Open a previously written copy
    pub fn load(
        root: &Path,
        identity: &NodeIdentity,
        copy_index: u32,
    ) -> UniqueStorageResult<Self> {
        let store_dir = copy_store_dir(root, identity, copy_index);
        let manifest_path = store_dir.join(MANIFEST_FILE_NAME);

        let contents = std::fs::read_to_string(&manifest_path).map_err(|_| {
            UniqueStorageError::StoreManifest {
                reason: format!("no manifest at {}", manifest_path.display()),
            }
        })?;

        let manifest: StoreManifest = serde_json::from_str(&contents)
            .map_err(|e| UniqueStorageError::Serialization(e.to_string()))?;

        if manifest.format_version != STORE_FORMAT_VERSION {
            return Err(UniqueStorageError::StoreManifest {
                reason: format!("unsupported format version {}", manifest.format_version),
            });
        }

        let records = manifest
            .chunks
            .iter()
            .map(ManifestRecord::decode)
            .collect::<UniqueStorageResult<Vec<_>>>()?;

        Ok(Self {
            store_dir,
            manifest,
            records,
            mmaps: HashMap::new(),
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn copy_index(&self) -> u32 {
        self.manifest.copy_index
    }

    pub fn chunk_count(&self) -> u32 {
        self.manifest.chunk_count
    }

    pub fn file_size(&self) -> u64 {
        self.manifest.file_size
    }

    pub fn has_chunk(&self, chunk_index: u32) -> bool {
        self.records.iter().any(|r| r.chunk_index == chunk_index)
    }

    /// Stored artifacts are only valid for the exact (key, location) pair
    /// that produced them; rotation requires full retransformation.
    pub fn matches_identity(&self, identity: &NodeIdentity) -> bool {
        self.manifest.node_public_key == hex::encode(identity.public_key)
            && self.manifest.location == identity.location
    }

    pub fn record(&self, chunk_index: u32) -> UniqueStorageResult<&StoredChunk> {
        self.records
            .iter()
            .find(|r| r.chunk_index == chunk_index)
            .ok_or(UniqueStorageError::ChunkNotTransformed { chunk_index })
    }

    pub fn records(&self) -> &[StoredChunk] {
        &self.records
    }

    /// Read one chunk's mutated bytes through the memory map
    pub fn read_mutated(&mut self, chunk_index: u32) -> UniqueStorageResult<Vec<u8>> {
        let timer = PerformanceTimer::new("store_read_mutated");
        let expected_length = self.record(chunk_index)?.length;

        if !self.mmaps.contains_key(&chunk_index) {
            let file = File::open(self.store_dir.join(chunk_file_name(chunk_index)))?;
            let mmap = unsafe { Mmap::map(&file) }?;
            self.mmaps.insert(chunk_index, mmap);
        }

        let mmap = &self.mmaps[&chunk_index];
        if mmap.len() as u64 != expected_length {
            return Err(UniqueStorageError::Corruption(format!(
                "chunk {} file is {} bytes, manifest says {}",
                chunk_index,
                mmap.len(),
                expected_length
            )));
        }

        let data = mmap.to_vec();
        timer.check_target(STORE_READ_TARGET_MS);
        Ok(data)
    }

    /// Recheck CRC32s and the merkle root against the chunk files
    pub fn verify_integrity(&mut self) -> UniqueStorageResult<bool> {
        let indices: Vec<u32> = self.records.iter().map(|r| r.chunk_index).collect();
        let mut leaf_hashes = Vec::with_capacity(indices.len());

        for chunk_index in indices {
            let data = self.read_mutated(chunk_index)?;
            let record = self.record(chunk_index)?;

            if compute_crc32(&data) != record.crc32 {
                return Ok(false);
            }
            let hash = compute_sha256(&data);
            if hash != record.mutated_sha256 {
                return Ok(false);
            }
            leaf_hashes.push(hash);
        }

        Ok(hex::encode(compute_merkle_root(&leaf_hashes)) == self.manifest.merkle_root)
    }

    /// Reassemble a full in-memory artifact for one chunk
    pub fn transformed_chunk(&mut self, chunk_index: u32) -> UniqueStorageResult<TransformedChunk> {
        let mutated_data = self.read_mutated(chunk_index)?;
        let record = self.record(chunk_index)?;

        Ok(TransformedChunk {
            mutated_data,
            reversal_key: record.reversal_key.clone(),
            chunk_index,
            proof: ChunkProvenance {
                binding: record.binding.clone(),
                vdf: record.vdf.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::engine::{transform_file, CancelFlag};

    fn test_identity() -> NodeIdentity {
        NodeIdentity::from_seed(b"store-test-node", NetworkLocation::new("10.0.0.1", 8444))
            .unwrap()
    }

    fn test_config() -> TransformConfig {
        TransformConfig {
            standard_chunk_count: 4,
            min_iterations_per_chunk: 1_000,
            checkpoint_interval: 250,
            target_total_time_secs: 1.0,
            challenge_timeout_ms: 5_000,
        }
    }

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pous-store-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn transformed_chunks(identity: &NodeIdentity) -> Vec<TransformedChunk> {
        transform_file(identity, &vec![5u8; 64], 0, &test_config(), &CancelFlag::new()).unwrap()
    }

    #[test]
    fn test_create_load_round_trip() {
        let root = temp_root("roundtrip");
        let identity = test_identity();
        let chunks = transformed_chunks(&identity);

        let created = ChunkStore::create(&root, &identity, 0, &chunks).unwrap();
        assert_eq!(created.chunk_count(), 4);

        let mut loaded = ChunkStore::load(&root, &identity, 0).unwrap();
        assert!(loaded.matches_identity(&identity));
        assert_eq!(loaded.chunk_count(), 4);
        assert_eq!(loaded.read_mutated(2).unwrap(), chunks[2].mutated_data);
        assert_eq!(
            loaded.record(2).unwrap().reversal_key,
            chunks[2].reversal_key
        );
        assert!(loaded.verify_integrity().unwrap());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_store_is_write_once() {
        let root = temp_root("writeonce");
        let identity = test_identity();
        let chunks = transformed_chunks(&identity);

        ChunkStore::create(&root, &identity, 0, &chunks).unwrap();
        match ChunkStore::create(&root, &identity, 0, &chunks) {
            Err(UniqueStorageError::StoreManifest { .. }) => {}
            other => panic!("expected write-once rejection, got {:?}", other.is_ok()),
        }

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_tampered_chunk_file_fails_integrity() {
        let root = temp_root("tamper");
        let identity = test_identity();
        let chunks = transformed_chunks(&identity);
        let store = ChunkStore::create(&root, &identity, 0, &chunks).unwrap();

        let path = store.store_dir().join(chunk_file_name(1));
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let mut reloaded = ChunkStore::load(&root, &identity, 0).unwrap();
        assert!(!reloaded.verify_integrity().unwrap());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_identity_rotation_invalidates_store() {
        let root = temp_root("rotate");
        let identity = test_identity();
        let chunks = transformed_chunks(&identity);
        ChunkStore::create(&root, &identity, 0, &chunks).unwrap();

        let store = ChunkStore::load(&root, &identity, 0).unwrap();
        let moved = NodeIdentity::from_seed(
            b"store-test-node",
            NetworkLocation::new("203.0.113.9", 8444),
        )
        .unwrap();
        assert!(!store.matches_identity(&moved));

        // The moved identity scopes to a different directory entirely
        assert!(ChunkStore::load(&root, &moved, 0).is_err());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_missing_chunk_reported() {
        let root = temp_root("missing");
        let identity = test_identity();
        let chunks = transformed_chunks(&identity);
        let mut store = ChunkStore::create(&root, &identity, 0, &chunks).unwrap();

        match store.read_mutated(99) {
            Err(UniqueStorageError::ChunkNotTransformed { chunk_index: 99 }) => {}
            other => panic!("expected missing-chunk error, got {:?}", other.is_ok()),
        }

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_transformed_chunk_reassembly() {
        let root = temp_root("reassemble");
        let identity = test_identity();
        let chunks = transformed_chunks(&identity);
        let mut store = ChunkStore::create(&root, &identity, 0, &chunks).unwrap();

        let rebuilt = store.transformed_chunk(3).unwrap();
        assert_eq!(rebuilt.mutated_data, chunks[3].mutated_data);
        assert_eq!(rebuilt.proof.binding, chunks[3].proof.binding);
        assert_eq!(rebuilt.proof.vdf, chunks[3].proof.vdf);

        let _ = std::fs::remove_dir_all(&root);
    }
}
