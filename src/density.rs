/**
 * File: /src/density.rs
 * Created Date: Monday, June 16th 2025
 * Author: Zihan
 * -----
 * Last Modified: Wednesday, 23rd July 2025 3:31:27 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
**/
use rayon::prelude::*;
use statrs::distribution::{Continuous, Normal};

use crate::error::Result;
use crate::matrix::NamedMatrix;
use crate::membership::ClusterMembership;
use crate::util;

const GRID_POINTS: usize = 256;

/// Density scores for rows and columns: for every cluster, how typical
/// each entity's raw score is of the cluster's current member scores.
/// Each output column is normalized to sum 1, so the uniform fallback
/// `1/n` and a real density column carry the same total mass.
pub fn density_scores(
    membership: &ClusterMembership,
    row_scores: &NamedMatrix,
    col_scores: &NamedMatrix,
    parallel: bool,
) -> Result<(NamedMatrix, NamedMatrix)> {
    Ok((
        row_density_scores(membership, row_scores, parallel)?,
        col_density_scores(membership, col_scores, parallel)?,
    ))
}

/// Base bandwidth from the score spread; floored so a flat score matrix
/// still yields a usable kernel.
fn base_bandwidth(scores: &NamedMatrix) -> f64 {
    let range = (scores.max() - scores.min()).abs();
    if range.is_finite() {
        (range / 100.0).max(0.001)
    } else {
        0.001
    }
}

/// Row-side bandwidth widens for small clusters: exp(-n/10) * 10.
fn bwscale(cluster_size: usize) -> f64 {
    (-(cluster_size as f64) / 10.0).exp() * 10.0
}

pub fn row_density_scores(
    membership: &ClusterMembership,
    row_scores: &NamedMatrix,
    parallel: bool,
) -> Result<NamedMatrix> {
    let bandwidth = base_bandwidth(row_scores);
    let compute = |cluster: usize| -> Result<Vec<f64>> {
        let cluster_rows = membership.rows_for_cluster(cluster);
        let cluster_cols = membership.columns_for_cluster(cluster);
        let kscores: Vec<f64> = row_scores.column_values(cluster - 1).iter().copied().collect();
        let finite: Vec<f64> = kscores.iter().copied().filter(|v| v.is_finite()).collect();

        if cluster_rows.is_empty() || cluster_cols.is_empty() || finite.is_empty() {
            return Ok(uniform(row_scores.num_rows()));
        }
        let mut member_scores = Vec::with_capacity(cluster_rows.len());
        for row in cluster_rows {
            member_scores.push(kscores[row_scores.row_index_of(row)?]);
        }
        let cluster_bandwidth = bandwidth * bwscale(cluster_rows.len());
        Ok(kernel_density(
            &kscores,
            &member_scores,
            cluster_bandwidth,
            finite.iter().copied().fold(f64::INFINITY, f64::min) - 1.0,
            finite.iter().copied().fold(f64::NEG_INFINITY, f64::max) + 1.0,
        ))
    };

    let columns: Vec<Vec<f64>> = run_per_cluster(membership.num_clusters(), parallel, compute)?;
    assemble(row_scores, columns)
}

pub fn col_density_scores(
    membership: &ClusterMembership,
    col_scores: &NamedMatrix,
    parallel: bool,
) -> Result<NamedMatrix> {
    let bandwidth = base_bandwidth(col_scores);
    let compute = |cluster: usize| -> Result<Vec<f64>> {
        let cluster_rows = membership.rows_for_cluster(cluster);
        let cluster_cols = membership.columns_for_cluster(cluster);
        let kscores: Vec<f64> = col_scores.column_values(cluster - 1).iter().copied().collect();
        let finite: Vec<f64> = kscores.iter().copied().filter(|v| v.is_finite()).collect();

        // a single column member cannot anchor a kernel
        if cluster_rows.is_empty() || cluster_cols.len() <= 1 || finite.is_empty() {
            return Ok(uniform(col_scores.num_rows()));
        }
        let mut member_scores = Vec::with_capacity(cluster_cols.len());
        for col in cluster_cols {
            member_scores.push(kscores[col_scores.row_index_of(col)?]);
        }
        Ok(kernel_density(
            &kscores,
            &member_scores,
            bandwidth,
            finite.iter().copied().fold(f64::INFINITY, f64::min) - 1.0,
            finite.iter().copied().fold(f64::NEG_INFINITY, f64::max) + 1.0,
        ))
    };

    let columns: Vec<Vec<f64>> = run_per_cluster(membership.num_clusters(), parallel, compute)?;
    assemble(col_scores, columns)
}

fn run_per_cluster<F>(num_clusters: usize, parallel: bool, compute: F) -> Result<Vec<Vec<f64>>>
where
    F: Fn(usize) -> Result<Vec<f64>> + Send + Sync,
{
    if parallel {
        (1..=num_clusters).into_par_iter().map(compute).collect()
    } else {
        (1..=num_clusters).map(compute).collect()
    }
}

fn assemble(scores: &NamedMatrix, columns: Vec<Vec<f64>>) -> Result<NamedMatrix> {
    let mut result = NamedMatrix::filled(
        scores.row_names().to_vec(),
        scores.column_names().to_vec(),
        0.0,
    )?;
    for (idx, column) in columns.into_iter().enumerate() {
        for (row, value) in column.into_iter().enumerate() {
            result[(row, idx)] = value;
        }
    }
    Ok(result)
}

fn uniform(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Gaussian kernel density of `member_scores`, evaluated on a 256-point
/// grid spanning `[dmin, dmax]` and linearly interpolated at every
/// entry of `kvalues` (clamped at the grid edges), then normalized to
/// sum 1. Degenerate kernels fall back to the uniform score.
pub(crate) fn kernel_density(
    kvalues: &[f64],
    member_scores: &[f64],
    bandwidth: f64,
    dmin: f64,
    dmax: f64,
) -> Vec<f64> {
    let finite_members: Vec<f64> = member_scores
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if finite_members.is_empty() || bandwidth <= 0.0 || !dmin.is_finite() || !dmax.is_finite() {
        return uniform(kvalues.len());
    }

    // unit normal construction cannot fail
    let kernel = Normal::new(0.0, 1.0).unwrap();
    let step = (dmax - dmin) / (GRID_POINTS - 1) as f64;
    let grid: Vec<f64> = (0..GRID_POINTS).map(|g| dmin + g as f64 * step).collect();
    let weight = 1.0 / (finite_members.len() as f64 * bandwidth);
    let estimate: Vec<f64> = grid
        .iter()
        .map(|&x| {
            finite_members
                .iter()
                .map(|&s| kernel.pdf((x - s) / bandwidth))
                .sum::<f64>()
                * weight
        })
        .collect();

    let densities: Vec<f64> = kvalues
        .iter()
        .map(|&v| {
            if v.is_finite() {
                util::interp(v, &grid, &estimate)
            } else {
                0.0
            }
        })
        .collect();
    let total: f64 = densities.iter().sum();
    if total > 0.0 && total.is_finite() {
        densities.into_iter().map(|d| d / total).collect()
    } else {
        uniform(kvalues.len())
    }
}
