use std::collections::BTreeMap;

use log::info;

use crate::error::Result;
use crate::matrix::NamedMatrix;
use crate::membership::ClusterMembership;
use crate::util;

pub const DEFAULT_ADJUST_CUTOFF: f64 = 0.33;
pub const DEFAULT_ADJUST_LIMIT: usize = 100;
const MAX_ADJUST_TRIES: usize = 50;

/// One-shot terminal rebalancing pass: clusters whose member-score
/// quantile leaves a small pool of better-scoring outsiders pull those
/// rows in through the forced-add path. Returns whether any membership
/// changed, so the caller can decide to run the pass again.
///
/// `row_scores` is the (fuzzified) row score matrix cached at the final
/// regular iteration.
pub fn postadjust(
    membership: &mut ClusterMembership,
    row_scores: &NamedMatrix,
    cutoff: f64,
    limit: usize,
) -> Result<bool> {
    let mut assignments = Vec::with_capacity(membership.num_clusters());
    for cluster in 1..=membership.num_clusters() {
        assignments.push(adjust_cluster(membership, cluster, row_scores, cutoff, limit)?);
    }

    let mut has_changed = false;
    for assign in assignments {
        if !assign.is_empty() {
            has_changed = true;
        }
        for (row, cluster) in assign {
            membership.add_cluster_to_row(&row, cluster, true)?;
        }
    }
    Ok(has_changed)
}

/// Assignment plan for a single cluster. Oversized and empty candidate
/// pools yield an empty plan, never an error.
fn adjust_cluster(
    membership: &ClusterMembership,
    cluster: usize,
    row_scores: &NamedMatrix,
    cutoff: f64,
    limit: usize,
) -> Result<BTreeMap<String, usize>> {
    let old_rows = membership.rows_for_cluster(cluster);
    let column = cluster - 1;

    let mut member_values = Vec::with_capacity(old_rows.len());
    for row in old_rows {
        member_values.push(row_scores[(row_scores.row_index_of(row)?, column)]);
    }
    // NaN threshold (memberless cluster) fails every comparison below
    let threshold = util::quantile(&member_values, cutoff);

    let mut pool: Vec<usize> = Vec::new();
    for row in 0..row_scores.num_rows() {
        let name = &row_scores.row_names()[row];
        if !old_rows.contains(name) && row_scores[(row, column)] < threshold {
            pool.push(row);
        }
    }
    if pool.is_empty() || pool.len() > limit {
        return Ok(BTreeMap::new());
    }

    let mut result = BTreeMap::new();
    let mut tries = 0;
    while !pool.is_empty() && tries < MAX_ADJUST_TRIES {
        // ties go to the earliest pool entry, i.e. score-matrix row order
        let mut best = 0;
        for i in 1..pool.len() {
            if row_scores[(pool[i], column)] > row_scores[(pool[best], column)] {
                best = i;
            }
        }
        let row = pool.remove(best);
        result.insert(row_scores.row_names()[row].clone(), cluster);
        tries += 1;
    }

    info!(
        "cluster {}: rows before: {}, after: {}",
        cluster,
        old_rows.len(),
        old_rows.len() + result.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MembershipConfig;
    use crate::matrix::default_names;
    use ndarray::Array2;
    use std::collections::BTreeSet;

    fn config() -> MembershipConfig {
        MembershipConfig {
            num_clusters: 2,
            clusters_per_row: 1,
            clusters_per_col: 1,
            ..MembershipConfig::default()
        }
    }

    fn scores(values: Vec<f64>, rows: usize) -> NamedMatrix {
        NamedMatrix::new(
            default_names("g", rows),
            vec!["1".to_string(), "2".to_string()],
            Array2::from_shape_vec((rows, 2), values).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_pulls_in_below_threshold_rows_with_forced_add() {
        let rows = BTreeMap::from([
            ("g0".to_string(), vec![1]),
            ("g1".to_string(), vec![1]),
            ("g2".to_string(), vec![1]),
            ("g3".to_string(), vec![2]),
        ]);
        let cols = BTreeMap::from([("c0".to_string(), vec![1])]);
        let mut membership = ClusterMembership::new(rows, cols, config()).unwrap();

        // g3 scores far below cluster 1's member quantile
        let rs = scores(
            vec![
                0.5, 9.0, //
                0.6, 9.0, //
                0.7, 9.0, //
                -5.0, 0.1,
            ],
            4,
        );
        let changed = postadjust(&mut membership, &rs, DEFAULT_ADJUST_CUTOFF, DEFAULT_ADJUST_LIMIT)
            .unwrap();

        assert!(changed);
        // forced add: g3 now exceeds its one-slot capacity by design
        assert_eq!(
            membership.clusters_for_row("g3").unwrap(),
            BTreeSet::from([1, 2])
        );
        assert!(membership.rows_for_cluster(1).contains("g3"));
        assert!(membership.is_consistent());
    }

    #[test]
    fn test_no_candidates_reports_unchanged() {
        let rows = BTreeMap::from([
            ("g0".to_string(), vec![1]),
            ("g1".to_string(), vec![1]),
            ("g2".to_string(), vec![2]),
        ]);
        let cols = BTreeMap::from([("c0".to_string(), vec![1])]);
        let mut membership = ClusterMembership::new(rows, cols, config()).unwrap();
        let before = membership.snapshot();

        // every outsider scores above both cluster thresholds
        let rs = scores(
            vec![
                0.1, 5.0, //
                0.2, 5.0, //
                9.0, 0.3,
            ],
            3,
        );
        let changed = postadjust(&mut membership, &rs, DEFAULT_ADJUST_CUTOFF, DEFAULT_ADJUST_LIMIT)
            .unwrap();

        assert!(!changed);
        assert_eq!(membership.snapshot(), before);
    }

    #[test]
    fn test_oversized_pool_is_skipped() {
        let rows = BTreeMap::from([
            ("g0".to_string(), vec![1]),
            ("g1".to_string(), vec![2]),
            ("g2".to_string(), vec![2]),
            ("g3".to_string(), vec![2]),
        ]);
        let cols = BTreeMap::from([("c0".to_string(), vec![1])]);
        let mut membership = ClusterMembership::new(rows, cols, config()).unwrap();
        let before = membership.snapshot();

        // three below-threshold candidates for cluster 1, limit of 2
        let rs = scores(
            vec![
                0.5, 9.0, //
                -1.0, 9.0, //
                -2.0, 9.0, //
                -3.0, 9.0,
            ],
            4,
        );
        let changed = postadjust(&mut membership, &rs, DEFAULT_ADJUST_CUTOFF, 2).unwrap();
        assert!(!changed);
        assert_eq!(membership.snapshot(), before);
    }

    #[test]
    fn test_memberless_cluster_is_skipped() {
        let rows = BTreeMap::from([
            ("g0".to_string(), vec![1]),
            ("g1".to_string(), vec![1]),
        ]);
        let cols = BTreeMap::from([("c0".to_string(), vec![1])]);
        let mut membership = ClusterMembership::new(rows, cols, config()).unwrap();

        // cluster 2 has no members: its quantile is NaN, nothing changes
        let rs = scores(vec![0.5, -9.0, 0.6, -9.0], 2);
        let changed = postadjust(&mut membership, &rs, DEFAULT_ADJUST_CUTOFF, DEFAULT_ADJUST_LIMIT)
            .unwrap();
        assert!(!changed);
    }
}
