use crate::core::{
    errors::{UniqueStorageError, UniqueStorageResult},
    types::{ChunkDefinition, ChunkPlan, TransformConfig},
};

/// Partition a file into a fixed chunk count regardless of size.
///
/// For `file_size >= standard_chunk_count` the plan holds exactly
/// `standard_chunk_count` chunks: the first `file_size % count` chunks carry
/// `ceil(file_size / count)` bytes, the trailing chunks one byte fewer.
/// Files smaller than the chunk count clamp the effective count to one
/// single-byte chunk per file byte; a zero-length chunk is never produced.
pub fn plan_chunks(file_size: u64, config: &TransformConfig) -> UniqueStorageResult<ChunkPlan> {
    config
        .validate()
        .map_err(UniqueStorageError::ChunkPlan)?;

    if file_size == 0 {
        return Err(UniqueStorageError::ChunkPlan(
            "file size must be positive".to_string(),
        ));
    }

    let requested = config.standard_chunk_count as u64;
    let effective = requested.min(file_size);

    let base = file_size / effective;
    let remainder = file_size % effective;

    let mut chunks = Vec::with_capacity(effective as usize);
    let mut offset = 0u64;
    for index in 0..effective {
        let length = if index < remainder { base + 1 } else { base };
        chunks.push(ChunkDefinition {
            index: index as u32,
            start_offset: offset,
            length,
        });
        offset += length;
    }

    debug_assert_eq!(offset, file_size);

    Ok(ChunkPlan { file_size, chunks })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_count(count: u32) -> TransformConfig {
        TransformConfig {
            standard_chunk_count: count,
            ..TransformConfig::default()
        }
    }

    #[test]
    fn test_exact_count_and_sum_for_large_files() {
        let config = config_with_count(60);
        for file_size in [60u64, 61, 599, 600, 601, 4096, 1_048_576] {
            let plan = plan_chunks(file_size, &config).unwrap();
            assert_eq!(plan.chunk_count(), 60, "file_size={}", file_size);
            let total: u64 = plan.chunks.iter().map(|c| c.length).sum();
            assert_eq!(total, file_size);
            assert!(plan.chunks.iter().all(|c| c.length > 0));
        }
    }

    #[test]
    fn test_even_partition() {
        let plan = plan_chunks(600, &config_with_count(60)).unwrap();
        assert!(plan.chunks.iter().all(|c| c.length == 10));
        assert_eq!(plan.chunks[37].start_offset, 370);
    }

    #[test]
    fn test_leading_chunks_take_the_remainder() {
        // 100 bytes over 60 chunks: 40 chunks of 2 bytes, then 20 of 1
        let plan = plan_chunks(100, &config_with_count(60)).unwrap();
        assert_eq!(plan.chunks[0].length, 2);
        assert_eq!(plan.chunks[39].length, 2);
        assert_eq!(plan.chunks[40].length, 1);
        assert_eq!(plan.chunks[59].length, 1);
    }

    #[test]
    fn test_chunks_are_contiguous_and_ordered() {
        let plan = plan_chunks(601, &config_with_count(60)).unwrap();
        let mut expected_offset = 0u64;
        for (i, chunk) in plan.chunks.iter().enumerate() {
            assert_eq!(chunk.index as usize, i);
            assert_eq!(chunk.start_offset, expected_offset);
            expected_offset += chunk.length;
        }
    }

    #[test]
    fn test_small_file_clamps_effective_count() {
        let plan = plan_chunks(7, &config_with_count(60)).unwrap();
        assert_eq!(plan.chunk_count(), 7);
        assert!(plan.chunks.iter().all(|c| c.length == 1));
    }

    #[test]
    fn test_deterministic() {
        let config = config_with_count(60);
        let a = plan_chunks(12_345, &config).unwrap();
        let b = plan_chunks(12_345, &config).unwrap();
        assert_eq!(a.chunks, b.chunks);
    }

    #[test]
    fn test_rejects_empty_file_and_zero_count() {
        assert!(plan_chunks(0, &config_with_count(60)).is_err());
        assert!(plan_chunks(100, &config_with_count(0)).is_err());
    }

    #[test]
    fn test_slice_bounds() {
        let plan = plan_chunks(600, &config_with_count(60)).unwrap();
        assert_eq!(plan.slice_bounds(0), Some((0, 10)));
        assert_eq!(plan.slice_bounds(37), Some((370, 380)));
        assert_eq!(plan.slice_bounds(60), None);
    }
}
