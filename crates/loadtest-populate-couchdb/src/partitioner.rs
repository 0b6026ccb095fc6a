//! Static partitioning of document ids across upload workers.

use std::ops::RangeInclusive;

/// Inclusive range of document id counters owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPartition {
    pub start: u64,
    pub end: u64,
}

impl WorkPartition {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn ids(&self) -> RangeInclusive<u64> {
        self.start..=self.end
    }

    /// Number of ids in the range; never zero.
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Split `total` ids starting at `start_id` into contiguous ranges.
///
/// With `threads <= total`, every range holds `total / threads` ids and the
/// last one also absorbs the remainder. With more threads than ids, each id
/// gets its own range and the surplus threads are not used.
pub fn partition(total: u64, threads: usize, start_id: u64) -> Vec<WorkPartition> {
    let threads = threads as u64;
    if threads == 0 || total == 0 {
        return Vec::new();
    }
    if threads > total {
        return (start_id..start_id + total)
            .map(|id| WorkPartition::new(id, id))
            .collect();
    }

    let base = total / threads;
    let last_id = start_id + total - 1;
    (0..threads)
        .map(|i| {
            let start = start_id + i * base;
            let end = if i == threads - 1 {
                last_id
            } else {
                start + base - 1
            };
            WorkPartition::new(start, end)
        })
        .collect()
}

/// Describe the partitioning plan for logging.
pub fn describe_partitions(partitions: &[WorkPartition]) -> String {
    let mut lines = vec!["Work distribution:".to_string()];
    for (i, p) in partitions.iter().enumerate() {
        lines.push(format!(
            "  worker {}: docs {}..{} ({} ids)",
            i + 1,
            p.start,
            p.end,
            p.size()
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(partitions: &[WorkPartition], start_id: u64, total: u64) {
        let ids: Vec<u64> = partitions.iter().flat_map(|p| p.ids()).collect();
        let expected: Vec<u64> = (start_id..start_id + total).collect();
        assert_eq!(ids, expected);
        assert!(partitions.iter().all(|p| p.start <= p.end));
    }

    #[test]
    fn test_even_split() {
        let partitions = partition(9, 3, 1);
        assert_eq!(
            partitions,
            vec![
                WorkPartition::new(1, 3),
                WorkPartition::new(4, 6),
                WorkPartition::new(7, 9)
            ]
        );
    }

    #[test]
    fn test_last_partition_absorbs_remainder() {
        let partitions = partition(10, 3, 1);
        assert_eq!(
            partitions,
            vec![
                WorkPartition::new(1, 3),
                WorkPartition::new(4, 6),
                WorkPartition::new(7, 10)
            ]
        );
    }

    #[test]
    fn test_more_threads_than_docs() {
        let partitions = partition(3, 8, 5);
        assert_eq!(
            partitions,
            vec![
                WorkPartition::new(5, 5),
                WorkPartition::new(6, 6),
                WorkPartition::new(7, 7)
            ]
        );
    }

    #[test]
    fn test_exact_cover_for_many_shapes() {
        for total in 1..=40u64 {
            for threads in 1..=12usize {
                for start_id in [1u64, 17] {
                    let partitions = partition(total, threads, start_id);
                    let expected_len = (threads as u64).min(total) as usize;
                    assert_eq!(partitions.len(), expected_len);
                    assert_exact_cover(&partitions, start_id, total);
                }
            }
        }
    }

    #[test]
    fn test_no_docs() {
        assert!(partition(0, 4, 1).is_empty());
    }

    #[test]
    fn test_describe() {
        let text = describe_partitions(&partition(4, 2, 1));
        assert!(text.contains("worker 1: docs 1..2 (2 ids)"));
        assert!(text.contains("worker 2: docs 3..4 (2 ids)"));
    }
}
