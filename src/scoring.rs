/**
 * File: /src/scoring.rs
 * Created Date: Friday, June 13th 2025
 * Author: Zihan
 * -----
 * Last Modified: Tuesday, 22nd July 2025 11:05:40 am
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
**/
use rayon::prelude::*;

use crate::error::Result;
use crate::matrix::NamedMatrix;
use crate::membership::ClusterMembership;
use crate::util;

/// Source of the raw per-cluster score matrices consumed by the
/// membership update. Implementations are external collaborators; the
/// engine only requires the row matrix to be |rows| × K and the column
/// matrix |columns| × K, both row-indexed by entity name.
pub trait ScoreProvider: Send + Sync {
    fn name(&self) -> &str;

    /// |rows| × num_clusters matrix; lower scores are better fits.
    fn row_scores(
        &self,
        membership: &ClusterMembership,
        matrix: &NamedMatrix,
    ) -> Result<NamedMatrix>;

    /// |columns| × num_clusters matrix; lower scores are better fits.
    fn column_scores(
        &self,
        membership: &ClusterMembership,
        matrix: &NamedMatrix,
    ) -> Result<NamedMatrix>;
}

/// Variance-based scorer over the expression matrix.
///
/// Row scores are the log mean squared deviation of a row from the
/// cluster's per-column means, over the cluster's columns. Column scores
/// normalize the squared deviation by the column mean magnitude (an
/// index of dispersion). Degenerate clusters score as the 0.95 quantile
/// of the finite in-membership scores, so they neither attract nor
/// repel.
pub struct DispersionScorer {
    pub parallel: bool,
}

impl DispersionScorer {
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    fn per_cluster<F>(&self, num_clusters: usize, compute: F) -> Vec<Option<Vec<f64>>>
    where
        F: Fn(usize) -> Option<Vec<f64>> + Send + Sync,
    {
        if self.parallel {
            (1..=num_clusters).into_par_iter().map(compute).collect()
        } else {
            (1..=num_clusters).map(compute).collect()
        }
    }
}

/// Per-column mean squared deviation from the column mean, normalized
/// by |mean| + 0.01. One value per column of `sm`.
pub(crate) fn submatrix_column_scores(sm: &NamedMatrix) -> Vec<f64> {
    let mut scores = Vec::with_capacity(sm.num_columns());
    for j in 0..sm.num_columns() {
        let col: Vec<f64> = sm.column_values(j).iter().copied().collect();
        let mean = util::finite_mean(&col);
        let devs: Vec<f64> = col
            .iter()
            .filter(|v| v.is_finite())
            .map(|v| (v - mean).powi(2))
            .collect();
        scores.push(util::finite_mean(&devs) / (mean.abs() + 0.01));
    }
    scores
}

/// 0.95 quantile of the finite scores belonging to current members,
/// used to substitute for degenerate clusters and non-finite entries.
fn membership_substitution(
    cluster_scores: &[Option<Vec<f64>>],
    members_of: impl Fn(usize) -> Vec<usize>,
) -> f64 {
    let mut pool = Vec::new();
    for (idx, scores) in cluster_scores.iter().enumerate() {
        if let Some(scores) = scores {
            for entity in members_of(idx + 1) {
                let value = scores[entity];
                if value.is_finite() {
                    pool.push(value);
                }
            }
        }
    }
    util::quantile(&pool, 0.95)
}

fn assemble(
    entity_names: &[String],
    num_clusters: usize,
    cluster_scores: Vec<Option<Vec<f64>>>,
    substitution: f64,
) -> Result<NamedMatrix> {
    let column_names: Vec<String> = (1..=num_clusters).map(|c| c.to_string()).collect();
    let mut result = NamedMatrix::filled(entity_names.to_vec(), column_names, substitution)?;
    for (idx, scores) in cluster_scores.into_iter().enumerate() {
        if let Some(scores) = scores {
            for (row, value) in scores.into_iter().enumerate() {
                if value.is_finite() {
                    result[(row, idx)] = value;
                }
            }
        }
    }
    Ok(result)
}

impl ScoreProvider for DispersionScorer {
    fn name(&self) -> &str {
        "Dispersion"
    }

    fn row_scores(
        &self,
        membership: &ClusterMembership,
        matrix: &NamedMatrix,
    ) -> Result<NamedMatrix> {
        let all_rows = matrix.row_names().to_vec();
        let cluster_scores = self.per_cluster(membership.num_clusters(), |cluster| {
            let rnames: Vec<String> = membership.rows_for_cluster(cluster).iter().cloned().collect();
            let cnames: Vec<String> = membership
                .columns_for_cluster(cluster)
                .iter()
                .cloned()
                .collect();
            if rnames.is_empty() || cnames.len() < 2 {
                return None;
            }
            let member_sm = matrix.submatrix_by_name(&rnames, &cnames).ok()?;
            let filtered = matrix.submatrix_by_name(&all_rows, &cnames).ok()?;

            let colmeans: Vec<f64> = (0..member_sm.num_columns())
                .map(|j| {
                    let col: Vec<f64> = member_sm.column_values(j).iter().copied().collect();
                    util::finite_mean(&col)
                })
                .collect();

            let mut scores = Vec::with_capacity(filtered.num_rows());
            for i in 0..filtered.num_rows() {
                let devs: Vec<f64> = (0..filtered.num_columns())
                    .map(|j| (filtered[(i, j)] - colmeans[j]).powi(2))
                    .collect();
                scores.push((util::finite_mean(&devs) + 1e-99).ln());
            }
            Some(scores)
        });

        let substitution = membership_substitution(&cluster_scores, |cluster| {
            membership
                .rows_for_cluster(cluster)
                .iter()
                .filter_map(|name| matrix.row_index_of(name).ok())
                .collect()
        });
        assemble(matrix.row_names(), membership.num_clusters(), cluster_scores, substitution)
    }

    fn column_scores(
        &self,
        membership: &ClusterMembership,
        matrix: &NamedMatrix,
    ) -> Result<NamedMatrix> {
        let all_cols = matrix.column_names().to_vec();
        let cluster_scores = self.per_cluster(membership.num_clusters(), |cluster| {
            let rnames: Vec<String> = membership.rows_for_cluster(cluster).iter().cloned().collect();
            if rnames.len() < 2 {
                return None;
            }
            let sm = matrix.submatrix_by_name(&rnames, &all_cols).ok()?;
            Some(submatrix_column_scores(&sm))
        });

        let column_index: std::collections::HashMap<&String, usize> = matrix
            .column_names()
            .iter()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();
        let substitution = membership_substitution(&cluster_scores, |cluster| {
            membership
                .columns_for_cluster(cluster)
                .iter()
                .filter_map(|name| column_index.get(name).copied())
                .collect()
        });
        assemble(matrix.column_names(), membership.num_clusters(), cluster_scores, substitution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MembershipConfig;
    use crate::matrix::default_names;
    use ndarray::array;
    use std::collections::BTreeMap;

    fn planted_matrix() -> NamedMatrix {
        // rows 0-2 tight around 1.0 on all conditions, row 3 far off
        NamedMatrix::new(
            default_names("g", 4),
            default_names("c", 3),
            array![
                [1.0, 1.1, 0.9],
                [1.0, 0.9, 1.1],
                [1.1, 1.0, 1.0],
                [8.0, -7.0, 9.0],
            ],
        )
        .unwrap()
    }

    fn membership() -> ClusterMembership {
        let config = MembershipConfig {
            num_clusters: 2,
            clusters_per_row: 1,
            clusters_per_col: 2,
            ..MembershipConfig::default()
        };
        let rows = BTreeMap::from([
            ("g0".to_string(), vec![1]),
            ("g1".to_string(), vec![1]),
            ("g2".to_string(), vec![1]),
            ("g3".to_string(), vec![]),
        ]);
        let cols = BTreeMap::from([
            ("c0".to_string(), vec![1]),
            ("c1".to_string(), vec![1]),
            ("c2".to_string(), vec![1]),
        ]);
        ClusterMembership::new(rows, cols, config).unwrap()
    }

    #[test]
    fn test_row_scores_prefer_coherent_rows() {
        let matrix = planted_matrix();
        let m = membership();
        let scores = DispersionScorer::new(false).row_scores(&m, &matrix).unwrap();

        assert_eq!(scores.num_rows(), 4);
        assert_eq!(scores.num_columns(), 2);
        // member rows sit near the cluster means, the outlier far away
        assert!(scores[(0, 0)] < scores[(3, 0)]);
        assert!(scores[(1, 0)] < scores[(3, 0)]);
    }

    #[test]
    fn test_degenerate_cluster_gets_substitution() {
        let matrix = planted_matrix();
        let m = membership();
        let scores = DispersionScorer::new(false).row_scores(&m, &matrix).unwrap();

        // cluster 2 has no members: every row scores the substitution value
        let sub = scores[(0, 1)];
        assert!(sub.is_finite());
        for row in 0..4 {
            assert_eq!(scores[(row, 1)], sub);
        }
    }

    #[test]
    fn test_column_scores_shape_and_order() {
        let matrix = planted_matrix();
        let m = membership();
        let scores = DispersionScorer::new(false)
            .column_scores(&m, &matrix)
            .unwrap();
        assert_eq!(scores.num_rows(), 3);
        assert_eq!(scores.num_columns(), 2);
        for j in 0..3 {
            assert!(scores[(j, 0)].is_finite());
        }
    }

    #[test]
    fn test_parallel_matches_serial() {
        let matrix = planted_matrix();
        let m = membership();
        let serial = DispersionScorer::new(false).row_scores(&m, &matrix).unwrap();
        let parallel = DispersionScorer::new(true).row_scores(&m, &matrix).unwrap();
        for i in 0..serial.num_rows() {
            for j in 0..serial.num_columns() {
                assert!((serial[(i, j)] - parallel[(i, j)]).abs() < 1e-12);
            }
        }
    }
}
