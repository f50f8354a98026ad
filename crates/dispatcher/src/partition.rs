//! 分片规划
//!
//! 把一段逻辑工作量（N个键、N次操作）切分给固定数量的工作者，
//! 相邻区间首尾相接，没有空洞或重叠，整除余下的部分全部归最后一个工作者。
//! 所有函数都是纯函数，相同输入总是得到相同的切分。

use fleetbench_core::{KeyRange, OrchestratorError, OrchestratorResult, PopulationRange};

/// 把 `[start, start + total - 1]` 切分为 `worker_count` 个连续区间
///
/// 每个工作者分到 `total / worker_count` 个键，最后一个区间的结束位置被强制为
/// `start + total - 1`，用来吸收余数。`total < worker_count` 时前面的区间为空
/// （`end == start - 1`），这是允许的。
pub fn plan(total: u64, worker_count: usize, start: i64) -> OrchestratorResult<Vec<KeyRange>> {
    if worker_count == 0 {
        return Err(OrchestratorError::InvalidArgument(
            "worker_count must be at least 1".to_string(),
        ));
    }
    let total = i64::try_from(total).map_err(|_| {
        OrchestratorError::InvalidArgument(format!("total is too large: {total}"))
    })?;

    let per_worker = total / worker_count as i64;
    let last_end = start + total - 1;

    let mut ranges = Vec::with_capacity(worker_count);
    let mut cursor = start;
    for i in 0..worker_count {
        let end = if i + 1 == worker_count {
            last_end
        } else {
            cursor + per_worker - 1
        };
        ranges.push(KeyRange::new(cursor, end));
        cursor = end + 1;
    }

    Ok(ranges)
}

/// 把 `total` 次操作分配给 `worker_count` 个工作者，余数归最后一个
pub fn split_count(total: u64, worker_count: usize) -> OrchestratorResult<Vec<u64>> {
    Ok(plan(total, worker_count, 1)?
        .iter()
        .map(KeyRange::len)
        .collect())
}

/// 按行数生成数据填充区间 `seq=a..b`，1起始的闭区间，各区间行数之和等于 `row_count`
pub fn population_ranges(
    row_count: u64,
    worker_count: usize,
) -> OrchestratorResult<Vec<PopulationRange>> {
    Ok(plan(row_count, worker_count, 1)?
        .into_iter()
        .map(|range| PopulationRange { range })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(ranges: &[KeyRange]) -> Vec<(i64, i64)> {
        ranges.iter().map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn test_plan_last_range_absorbs_remainder() {
        let ranges = plan(100, 3, 1).unwrap();
        assert_eq!(bounds(&ranges), vec![(1, 33), (34, 66), (67, 100)]);

        let ranges = plan(10, 4, 1).unwrap();
        assert_eq!(bounds(&ranges), vec![(1, 2), (3, 4), (5, 6), (7, 10)]);
    }

    #[test]
    fn test_plan_even_split() {
        let ranges = plan(9, 3, 1).unwrap();
        assert_eq!(bounds(&ranges), vec![(1, 3), (4, 6), (7, 9)]);
    }

    #[test]
    fn test_plan_custom_start() {
        let ranges = plan(10, 3, 1001).unwrap();
        assert_eq!(bounds(&ranges), vec![(1001, 1003), (1004, 1006), (1007, 1010)]);
    }

    #[test]
    fn test_plan_single_worker_gets_everything() {
        let ranges = plan(7, 1, 5).unwrap();
        assert_eq!(bounds(&ranges), vec![(5, 11)]);
    }

    #[test]
    fn test_plan_fewer_keys_than_workers() {
        // 每个工作者分到0个键，前面的区间为空，最后一个区间包含全部
        let ranges = plan(2, 3, 1).unwrap();
        assert_eq!(bounds(&ranges), vec![(1, 0), (1, 0), (1, 2)]);
        assert!(ranges[0].is_empty());
        assert!(ranges[1].is_empty());
        assert_eq!(ranges[2].len(), 2);
    }

    #[test]
    fn test_plan_zero_workers_rejected() {
        assert!(matches!(
            plan(10, 0, 1),
            Err(OrchestratorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_plan_is_contiguous_and_covers_span() {
        for total in 1..=60u64 {
            for workers in 1..=8usize {
                for start in [-5i64, 0, 1, 17] {
                    let ranges = plan(total, workers, start).unwrap();
                    assert_eq!(ranges.len(), workers);
                    assert_eq!(ranges[0].start, start);
                    assert_eq!(ranges[workers - 1].end, start + total as i64 - 1);
                    for pair in ranges.windows(2) {
                        assert_eq!(pair[0].end + 1, pair[1].start);
                    }
                    let covered: u64 = ranges.iter().map(KeyRange::len).sum();
                    assert_eq!(covered, total);
                }
            }
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        assert_eq!(plan(12345, 7, 3).unwrap(), plan(12345, 7, 3).unwrap());
    }

    #[test]
    fn test_split_count_keeps_remainder() {
        assert_eq!(split_count(10, 4).unwrap(), vec![2, 2, 2, 4]);
        assert_eq!(split_count(100, 3).unwrap(), vec![33, 33, 34]);
        assert_eq!(split_count(1000, 3).unwrap().iter().sum::<u64>(), 1000);
    }

    #[test]
    fn test_population_ranges_sum_to_row_count() {
        let pops = population_ranges(100, 3).unwrap();
        let args: Vec<String> = pops.iter().map(PopulationRange::to_args).collect();
        assert_eq!(
            args,
            vec![
                " n=33 -pop seq=1..33 ",
                " n=33 -pop seq=34..66 ",
                " n=34 -pop seq=67..100 ",
            ]
        );
        assert_eq!(pops.iter().map(PopulationRange::count).sum::<u64>(), 100);
    }
}
