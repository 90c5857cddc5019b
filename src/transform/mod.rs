pub mod binding;
pub mod engine;
pub mod planner;
pub mod reversal;

pub use binding::{bind_to_location, create_chunk_bindings, verify_final_binding, verify_key_binding};
pub use engine::{
    initial_chain_seed, initial_chunk_state, recompute_range, transform_copies, transform_file,
    CancelFlag, ChunkTransform, TransformCalibration, TransformPhase, TransformTask,
};
pub use planner::plan_chunks;
pub use reversal::{generate_reversal_key, mutate_chunk, restore_original_data};
