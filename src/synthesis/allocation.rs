//! Proportional per-cluster target allocation.

use std::collections::BTreeMap;

/// Splits `total` across clusters in proportion to their respondent counts.
///
/// Each cluster in `counts` receives `max(1, round(total * count / sum))`.
/// When no respondents remain every cluster receives 1. The allocations may
/// not sum exactly to `total` because of rounding and the floor of 1.
pub fn allocate_targets(total: usize, counts: &BTreeMap<usize, usize>) -> BTreeMap<usize, usize> {
    let valid: usize = counts.values().sum();
    counts
        .iter()
        .map(|(&cluster, &count)| {
            let target = if valid == 0 {
                1
            } else {
                (total as f64 * count as f64 / valid as f64).round() as usize
            };
            (cluster, target.max(1))
        })
        .collect()
}
