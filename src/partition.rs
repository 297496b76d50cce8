use std::ops::Range;

use anyhow::Result;
use rayon::prelude::*;

#[cfg(test)]
mod tests {

    use super::*;
    use anyhow::bail;

    #[test]
    fn ranges_are_contiguous_and_cover_everything() {
        let ranges = partition_ranges(10, 3);
        assert_eq!(ranges, vec![0..3, 3..6, 6..10]);

        let ranges = partition_ranges(9, 3);
        assert_eq!(ranges, vec![0..3, 3..6, 6..9]);

        // more workers than items collapses to one item each
        let ranges = partition_ranges(4, 8);
        assert_eq!(ranges, vec![0..1, 1..2, 2..3, 3..4]);

        let ranges = partition_ranges(0, 4);
        assert_eq!(ranges, vec![0..0]);
    }

    #[test]
    fn mapped_slices_come_back_in_partition_order() {
        let out = par_map_partitions(100, 7, |range| {
            Ok(range.map(|i| i * 2).collect::<Vec<_>>())
        })
        .unwrap();
        assert_eq!(out.len(), 100);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, i * 2);
        }
    }

    #[test]
    fn a_failing_partition_fails_the_whole_call() {
        let result: Result<Vec<usize>> = par_map_partitions(10, 4, |range| {
            if range.contains(&5) {
                bail!("worker died");
            }
            Ok(range.collect())
        });
        assert!(result.is_err());
    }
}

/// Workers available for a one-shot parallel map: the core count minus one
/// kept free, never less than one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

/// Splits `n` items into contiguous index ranges, one per worker. Every range
/// gets ⌊n/workers⌋ items and the last absorbs the remainder; there is no
/// work stealing.
pub fn partition_ranges(n: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.clamp(1, n.max(1));
    let chunk = n / workers;
    (0..workers)
        .map(|i| {
            let start = i * chunk;
            let end = if i == workers - 1 { n } else { start + chunk };
            start..end
        })
        .collect()
}

/// Jacobi-style parallel map over a fixed static partition.
///
/// Every worker reads the same frozen inputs captured by `f` and produces the
/// outputs for its own contiguous range only; the per-range slices are
/// concatenated in partition order. Any worker error aborts the whole call
/// with no partial result.
pub fn par_map_partitions<T, F>(n: usize, workers: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(Range<usize>) -> Result<Vec<T>> + Sync + Send,
{
    let ranges = partition_ranges(n, workers);
    let slices = ranges
        .into_par_iter()
        .map(&f)
        .collect::<Result<Vec<Vec<T>>>>()?;
    Ok(slices.into_iter().flatten().collect())
}
