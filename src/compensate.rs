/**
 * File: /src/compensate.rs
 * Created Date: Tuesday, June 17th 2025
 * Author: Zihan
 * -----
 * Last Modified: Thursday, 10th July 2025 1:18:44 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
**/
use crate::matrix::NamedMatrix;
use crate::membership::ClusterMembership;

/// Rescales every density-score column by `exp(-size / expected)` where
/// `expected = dim_size * clusters_per_dim / num_clusters`. Density
/// estimation favors clusters that are already big; this pulls their
/// scores back down so small clusters stay competitive.
///
/// `matrix_dims` are the dimensions of the original expression matrix.
pub fn compensate_size(
    membership: &ClusterMembership,
    matrix_dims: (usize, usize),
    rd_scores: &mut NamedMatrix,
    cd_scores: &mut NamedMatrix,
) {
    let (num_rows, num_cols) = matrix_dims;
    let num_clusters = membership.num_clusters();

    for cluster in 1..=num_clusters {
        let row_size = membership
            .num_row_members(cluster)
            .max(membership.config().min_cluster_rows_allowed) as f64;
        rd_scores.multiply_column_by(
            cluster - 1,
            compensate_dim_size(
                row_size,
                num_rows as f64,
                membership.num_clusters_per_row() as f64,
                num_clusters as f64,
            ),
        );

        let col_size = (membership.num_column_members(cluster) as f64).max(num_cols as f64 / 10.0);
        cd_scores.multiply_column_by(
            cluster - 1,
            compensate_dim_size(
                col_size,
                num_cols as f64,
                membership.num_clusters_per_column() as f64,
                num_clusters as f64,
            ),
        );
    }
}

fn compensate_dim_size(size: f64, dim_size: f64, clusters_per_dim: f64, num_clusters: f64) -> f64 {
    (-size / (dim_size * clusters_per_dim / num_clusters)).exp()
}
