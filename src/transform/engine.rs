use log::{info, trace};
use rayon::prelude::*;
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::core::{
    errors::{UniqueStorageError, UniqueStorageResult},
    logging::report_transform_summary,
    types::*,
    utils::{compute_blake3, compute_sha256, sign_data, PerformanceTimer},
};
use crate::transform::binding::create_chunk_bindings;
use crate::transform::planner::plan_chunks;
use crate::transform::reversal::mutate_chunk;

/// Per-chunk transform lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformPhase {
    Initialized,
    Running,
    Completed,
}

/// Cancellation handle for an in-progress transform. Cancelling never
/// produces a usable partial proof and has no effect on completed chunks.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<Mutex<bool>>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if let Ok(mut flag) = self.0.lock() {
            *flag = true;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.lock().map(|flag| *flag).unwrap_or(false)
    }
}

/// One mix iteration. Each step consumes the previous step's full output,
/// so iteration k cannot start before iteration k-1 finishes anywhere.
fn mix_step(state: &[u8; HASH_SIZE], iteration: u32) -> [u8; HASH_SIZE] {
    let digest = compute_sha256(state);
    let mut data = Vec::with_capacity(HASH_SIZE * 2 + 4);
    data.extend_from_slice(state);
    data.extend_from_slice(&digest);
    data.extend_from_slice(&iteration.to_be_bytes());
    compute_blake3(&data)
}

/// Seed for chunk 0 of one (key, copy) chain; distinct copies get
/// independent chains and may be computed in parallel with each other
pub fn initial_chain_seed(public_key: &[u8; PUBLIC_KEY_SIZE], copy_index: u32) -> [u8; HASH_SIZE] {
    let mut data = Vec::new();
    data.extend_from_slice(CHAIN_SEED_DOMAIN);
    data.extend_from_slice(public_key);
    data.extend_from_slice(&copy_index.to_be_bytes());
    compute_sha256(&data)
}

/// Initial transform state for one chunk. Chaining on the previous chunk's
/// final state makes the whole copy sequential end to end: changing any
/// upstream chunk, the location, or the key invalidates every downstream
/// proof.
pub fn initial_chunk_state(
    chunk_data: &[u8],
    binding: &ChunkBinding,
    previous_final_state: &[u8; HASH_SIZE],
) -> [u8; HASH_SIZE] {
    let mut data = Vec::new();
    data.extend_from_slice(chunk_data);
    data.extend_from_slice(&binding.server_binding);
    data.extend_from_slice(&binding.key_binding);
    data.extend_from_slice(previous_final_state);
    compute_sha256(&data)
}

/// Recompute a sub-range of the mix chain. Verifiers use this for
/// checkpoint spot checks; cost is linear in `count` — no succinct
/// verification is claimed.
pub fn recompute_range(
    start_state: &[u8; HASH_SIZE],
    start_iteration: u32,
    count: u32,
) -> [u8; HASH_SIZE] {
    let mut state = *start_state;
    for k in 0..count {
        state = mix_step(&state, start_iteration + k);
    }
    state
}

/// Sequential transform state machine for a single chunk:
/// Initialized -> Running -> Completed. The `&mut self` iteration loop
/// makes concurrent iterations of one chunk unrepresentable.
pub struct ChunkTransform {
    state: [u8; HASH_SIZE],
    initial_state: [u8; HASH_SIZE],
    iteration: u32,
    checkpoint_interval: u32,
    checkpoints: Vec<[u8; HASH_SIZE]>,
    phase: TransformPhase,
}

impl ChunkTransform {
    pub fn new(
        chunk_data: &[u8],
        binding: &ChunkBinding,
        previous_final_state: &[u8; HASH_SIZE],
        checkpoint_interval: u32,
    ) -> Self {
        let initial_state = initial_chunk_state(chunk_data, binding, previous_final_state);
        Self {
            state: initial_state,
            initial_state,
            iteration: 0,
            checkpoint_interval,
            checkpoints: Vec::new(),
            phase: TransformPhase::Initialized,
        }
    }

    pub fn phase(&self) -> TransformPhase {
        self.phase
    }

    pub fn initial_state(&self) -> [u8; HASH_SIZE] {
        self.initial_state
    }

    /// Run the strictly sequential mix loop. A checkpoint is appended after
    /// every full `checkpoint_interval` iterations; cancellation is polled
    /// at the same boundaries.
    pub fn run(&mut self, iterations: u32, cancel: &CancelFlag) -> UniqueStorageResult<()> {
        if cancel.is_cancelled() {
            return Err(UniqueStorageError::TransformCancelled);
        }

        self.phase = TransformPhase::Running;

        for _ in 0..iterations {
            self.state = mix_step(&self.state, self.iteration);
            self.iteration += 1;

            if self.iteration % self.checkpoint_interval == 0 {
                self.checkpoints.push(self.state);
                trace!(
                    "[VDF TRACE] iteration {} | state {} | checkpoint {}",
                    self.iteration,
                    hex::encode(&self.state[..8]),
                    self.checkpoints.len()
                );

                if cancel.is_cancelled() {
                    return Err(UniqueStorageError::TransformCancelled);
                }
            }
        }

        self.phase = TransformPhase::Completed;
        Ok(())
    }

    /// Emit the signed result. Only a completed run yields a proof.
    pub fn into_result(self, identity: &NodeIdentity) -> UniqueStorageResult<VdfResult> {
        if self.phase != TransformPhase::Completed {
            return Err(UniqueStorageError::VdfVerificationFailed {
                reason: "transform has not completed".to_string(),
            });
        }

        let signature = sign_data(&identity.private_key, &self.state)?;

        Ok(VdfResult {
            final_state: self.state,
            checkpoints: self.checkpoints,
            iterations: self.iteration,
            signature,
        })
    }
}

/// Transform every chunk of one copy, chained in order. This is the slow
/// write path, run once per (node, location, key, copy) combination.
pub fn transform_file(
    identity: &NodeIdentity,
    data: &[u8],
    copy_index: u32,
    config: &TransformConfig,
    cancel: &CancelFlag,
) -> UniqueStorageResult<Vec<TransformedChunk>> {
    let timer = PerformanceTimer::new("transform_file");
    let plan = plan_chunks(data.len() as u64, config)?;

    let mut chunks = Vec::with_capacity(plan.chunks.len());
    let mut previous_final_state = initial_chain_seed(&identity.public_key, copy_index);
    let mut total_iterations = 0u64;

    for definition in &plan.chunks {
        let (start, end) = (
            definition.start_offset as usize,
            (definition.start_offset + definition.length) as usize,
        );
        let chunk_data = &data[start..end];

        let binding = create_chunk_bindings(chunk_data, identity)?;

        let mut transform = ChunkTransform::new(
            chunk_data,
            &binding,
            &previous_final_state,
            config.checkpoint_interval,
        );
        let seed = transform.initial_state();
        transform.run(config.min_iterations_per_chunk, cancel)?;
        let vdf = transform.into_result(identity)?;

        previous_final_state = vdf.final_state;
        total_iterations += vdf.iterations as u64;

        let (mutated_data, reversal_key) =
            mutate_chunk(chunk_data, &vdf, &seed, definition.index)?;

        chunks.push(TransformedChunk {
            mutated_data,
            reversal_key,
            chunk_index: definition.index,
            proof: ChunkProvenance { binding, vdf },
        });
    }

    let elapsed = timer.elapsed_ms();
    report_transform_summary(copy_index, plan.chunk_count(), total_iterations, elapsed);

    Ok(chunks)
}

/// Transform several independent copies concurrently. Copies have no
/// cross-copy ordering requirement; only the chain inside each copy is
/// sequential.
pub fn transform_copies(
    identity: &NodeIdentity,
    data: &[u8],
    copy_indices: &[u32],
    config: &TransformConfig,
) -> Vec<UniqueStorageResult<Vec<TransformedChunk>>> {
    let cancel = CancelFlag::new();
    copy_indices
        .par_iter()
        .map(|&copy_index| transform_file(identity, data, copy_index, config, &cancel))
        .collect()
}

/// A whole-copy transform running on a background thread with an explicit
/// completion channel and a cancellation handle
pub struct TransformTask {
    cancel: CancelFlag,
    receiver: Receiver<UniqueStorageResult<Vec<TransformedChunk>>>,
    handle: Option<JoinHandle<()>>,
}

impl TransformTask {
    pub fn spawn(
        identity: NodeIdentity,
        data: Vec<u8>,
        copy_index: u32,
        config: TransformConfig,
    ) -> Self {
        let cancel = CancelFlag::new();
        let worker_cancel = cancel.clone();
        let (sender, receiver) = channel();

        let handle = thread::spawn(move || {
            info!(
                "🚀 Transform task started for copy {} ({} bytes)",
                copy_index,
                data.len()
            );
            let result = transform_file(&identity, &data, copy_index, &config, &worker_cancel);
            let _ = sender.send(result);
        });

        Self {
            cancel,
            receiver,
            handle: Some(handle),
        }
    }

    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the task completes or is cancelled
    pub fn wait(mut self) -> UniqueStorageResult<Vec<TransformedChunk>> {
        let result = self
            .receiver
            .recv()
            .map_err(|_| UniqueStorageError::TransformCancelled)?;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        result
    }
}

/// Iteration-rate calibration: keeps per-chunk iteration counts aligned
/// with the target total transform time on the hardware actually in use
#[derive(Debug, Clone)]
pub struct TransformCalibration {
    iterations_per_second: u32,
}

impl Default for TransformCalibration {
    fn default() -> Self {
        Self {
            iterations_per_second: DEFAULT_ITERATIONS_PER_SECOND,
        }
    }
}

impl TransformCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate(&self) -> u32 {
        self.iterations_per_second
    }

    /// Fold a measured run into the rate estimate using an exponential
    /// moving average, clamped to plausible hardware bounds
    pub fn update(&mut self, iterations: u64, elapsed_secs: f64) {
        if elapsed_secs > 0.0 && iterations > 1_000 {
            let actual_rate = iterations as f64 / elapsed_secs;

            let alpha = 0.1;
            self.iterations_per_second =
                ((1.0 - alpha) * self.iterations_per_second as f64 + alpha * actual_rate) as u32;

            self.iterations_per_second = self
                .iterations_per_second
                .clamp(CALIBRATION_MIN_RATE, CALIBRATION_MAX_RATE);
        }
    }

    /// Per-chunk iteration count for the configured time target at the
    /// current rate estimate
    pub fn iterations_per_chunk(&self, config: &TransformConfig) -> u32 {
        config.iterations_for_rate(self.iterations_per_second)
    }
}
