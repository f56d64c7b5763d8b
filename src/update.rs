use std::collections::VecDeque;

use rand::Rng;

use crate::matrix::NamedMatrix;
use crate::membership::ClusterMembership;
use crate::error::Result;
use crate::util;

/// Bernoulli gate for one entity. A probability at or above 1.0 short
/// circuits without consuming the generator, which keeps gated runs
/// bit-reproducible.
pub fn seeing_change<R: Rng>(rng: &mut R, prob: f64) -> bool {
    prob >= 1.0 || rng.random::<f64>() <= prob
}

/// Per-entity candidate lists: the `n` best-scoring cluster ids per row
/// of the score matrix, descending; score ties go to the smaller id.
pub fn best_clusters(scores: &NamedMatrix, n: usize) -> Vec<Vec<usize>> {
    (0..scores.num_rows())
        .map(|row| {
            let values: Vec<f64> = scores.row_values(row).iter().copied().collect();
            util::top_n_order(&values, n)
                .into_iter()
                .map(|idx| idx + 1)
                .collect()
        })
        .collect()
}

/// One update pass over all rows. Returns the number of membership
/// changes applied.
///
/// Per gated row, up to `max_changes_per_row` changes: free slots take
/// the best unheld candidate; at capacity the candidate replaces the
/// held cluster with the largest positive score delta. A candidate that
/// beats no held cluster is discarded without spending change budget.
pub fn update_for_rows<R: Rng>(
    membership: &mut ClusterMembership,
    rd_scores: &NamedMatrix,
    rng: &mut R,
) -> Result<usize> {
    let candidate_lists = best_clusters(rd_scores, membership.num_clusters_per_row());
    let max_changes = membership.config().max_changes_per_row;
    let change_prob = membership.config().prob_row_change;
    let row_names = rd_scores.row_names().to_vec();

    let mut total_changes = 0;
    for (index, row) in row_names.iter().enumerate() {
        let mut candidates: VecDeque<usize> = membership
            .clusters_not_in_row(row, &candidate_lists[index])?
            .into();
        if !seeing_change(rng, change_prob) {
            continue;
        }
        let mut changes = 0;
        while changes < max_changes {
            let candidate = match candidates.pop_front() {
                Some(c) => c,
                None => break,
            };
            if membership.num_clusters_for_row(row)? < membership.num_clusters_per_row() {
                membership.add_cluster_to_row(row, candidate, false)?;
                changes += 1;
            } else if replace_delta_row_member(membership, row, candidate, rd_scores)? {
                changes += 1;
            }
        }
        total_changes += changes;
    }
    Ok(total_changes)
}

/// One update pass over all columns; mirror of `update_for_rows`.
pub fn update_for_cols<R: Rng>(
    membership: &mut ClusterMembership,
    cd_scores: &NamedMatrix,
    rng: &mut R,
) -> Result<usize> {
    let candidate_lists = best_clusters(cd_scores, membership.num_clusters_per_column());
    let max_changes = membership.config().max_changes_per_col;
    let change_prob = membership.config().prob_col_change;
    let col_names = cd_scores.row_names().to_vec();

    let mut total_changes = 0;
    for (index, col) in col_names.iter().enumerate() {
        let mut candidates: VecDeque<usize> = membership
            .clusters_not_in_column(col, &candidate_lists[index])?
            .into();
        if !seeing_change(rng, change_prob) {
            continue;
        }
        let mut changes = 0;
        while changes < max_changes {
            let candidate = match candidates.pop_front() {
                Some(c) => c,
                None => break,
            };
            if membership.num_clusters_for_column(col)? < membership.num_clusters_per_column() {
                membership.add_cluster_to_column(col, candidate, false)?;
                changes += 1;
            } else if replace_delta_column_member(membership, col, candidate, cd_scores)? {
                changes += 1;
            }
        }
        total_changes += changes;
    }
    Ok(total_changes)
}

/// Replaces the held cluster with the largest positive delta against
/// `candidate`; delta ties go to the larger cluster id. Returns whether
/// a replacement happened.
fn replace_delta_row_member(
    membership: &mut ClusterMembership,
    row: &str,
    candidate: usize,
    rd_scores: &NamedMatrix,
) -> Result<bool> {
    let index = rd_scores.row_index_of(row)?;
    let values = rd_scores.row_values(index);
    let candidate_score = values[candidate - 1];

    let mut deltas: Vec<(f64, usize)> = membership
        .clusters_for_row(row)?
        .into_iter()
        .map(|held| (candidate_score - values[held - 1], held))
        .collect();
    deltas.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.cmp(&a.1))
    });
    match deltas.first() {
        Some(&(delta, worst)) if delta > 0.0 => membership.replace_row_cluster(row, worst, candidate),
        _ => Ok(false),
    }
}

fn replace_delta_column_member(
    membership: &mut ClusterMembership,
    col: &str,
    candidate: usize,
    cd_scores: &NamedMatrix,
) -> Result<bool> {
    let index = cd_scores.row_index_of(col)?;
    let values = cd_scores.row_values(index);
    let candidate_score = values[candidate - 1];

    let mut deltas: Vec<(f64, usize)> = membership
        .clusters_for_column(col)?
        .into_iter()
        .map(|held| (candidate_score - values[held - 1], held))
        .collect();
    deltas.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.cmp(&a.1))
    });
    match deltas.first() {
        Some(&(delta, worst)) if delta > 0.0 => {
            membership.replace_column_cluster(col, worst, candidate)
        }
        _ => Ok(false),
    }
}
