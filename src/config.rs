/**
 * File: /src/config.rs
 * Created Date: Wednesday, June 11th 2025
 * Author: Zihan
 * -----
 * Last Modified: Monday, 14th July 2025 10:40:19 am
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
use std::fs::File;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use ndarray_npy::ReadNpyExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matrix::{default_names, NamedMatrix};

/// Internal representation of the forward membership maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    /// Variable-size set per row/column.
    Set,
    /// Fixed-width slot array per row/column, `0` marking a free slot.
    Slot,
}

/// Decay schedule for the fuzzification coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuzzySchedule {
    /// `0.75 * exp(-i / (N/4))`
    Decay,
    /// `0.7 * exp(-i / (N/3)) + 0.05`, never fully vanishing
    DampedDecay,
}

/// Read-only run parameters for the membership engine, fixed for the
/// process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Number of biclusters `1..=K`.
    pub num_clusters: usize,
    /// Cluster slots per row.
    pub clusters_per_row: usize,
    /// Cluster slots per column.
    pub clusters_per_col: usize,
    /// Bernoulli gate probability that a row is updated in an iteration.
    pub prob_row_change: f64,
    /// Bernoulli gate probability that a column is updated in an iteration.
    pub prob_col_change: f64,
    /// Membership changes a single row may receive per iteration.
    pub max_changes_per_row: usize,
    /// Membership changes a single column may receive per iteration.
    pub max_changes_per_col: usize,
    /// Size floor used by row size compensation.
    pub min_cluster_rows_allowed: usize,
    /// Advisory ceiling on rows per cluster.
    pub max_cluster_rows_allowed: usize,
    /// Number of regular iterations of a run.
    pub num_iterations: usize,
    /// Whether scores are fuzzified before each update.
    pub add_fuzz: bool,
    pub fuzzy_schedule: FuzzySchedule,
    /// Parallelize the read-only per-cluster scoring phases.
    pub parallel: bool,
    /// Seed for the injected generator; fixed seed => reproducible run.
    pub random_seed: u64,
    pub storage: StorageKind,
    /// Where checkpoints and the cached score artifact go; None disables
    /// persistence.
    pub output_dir: Option<PathBuf>,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        MembershipConfig {
            num_clusters: 20,
            clusters_per_row: 2,
            clusters_per_col: 13,
            prob_row_change: 0.5,
            prob_col_change: 1.0,
            max_changes_per_row: 1,
            max_changes_per_col: 5,
            min_cluster_rows_allowed: 3,
            max_cluster_rows_allowed: 70,
            num_iterations: 2000,
            add_fuzz: true,
            fuzzy_schedule: FuzzySchedule::Decay,
            parallel: true,
            random_seed: 0,
            storage: StorageKind::Set,
            output_dir: None,
        }
    }
}

impl MembershipConfig {
    /// Configuration for `num_clusters` clusters with the standard
    /// derived column slot count of two thirds of the cluster count.
    pub fn with_num_clusters(num_clusters: usize) -> Self {
        MembershipConfig {
            num_clusters,
            clusters_per_col: ((num_clusters as f64) * 2.0 / 3.0).round().max(1.0) as usize,
            ..MembershipConfig::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_clusters == 0 {
            return Err(Error::InvalidParameter {
                name: "num_clusters",
                message: "must be at least 1",
            });
        }
        if self.clusters_per_row == 0 || self.clusters_per_row > self.num_clusters {
            return Err(Error::InvalidParameter {
                name: "clusters_per_row",
                message: "must be in 1..=num_clusters",
            });
        }
        if self.clusters_per_col == 0 || self.clusters_per_col > self.num_clusters {
            return Err(Error::InvalidParameter {
                name: "clusters_per_col",
                message: "must be in 1..=num_clusters",
            });
        }
        if !(0.0..=1.0).contains(&self.prob_row_change) {
            return Err(Error::InvalidParameter {
                name: "prob_row_change",
                message: "must be in [0, 1]",
            });
        }
        if !(0.0..=1.0).contains(&self.prob_col_change) {
            return Err(Error::InvalidParameter {
                name: "prob_col_change",
                message: "must be in [0, 1]",
            });
        }
        if self.num_iterations == 0 {
            return Err(Error::InvalidParameter {
                name: "num_iterations",
                message: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Reads an expression matrix from a `.npy` file, naming rows `g0..`
/// and columns `c0..`.
pub fn load_expression_matrix(path: &Path) -> Result<NamedMatrix> {
    let reader = File::open(path)?;
    let values = Array2::<f64>::read_npy(reader)
        .map_err(|e| Error::MatrixLoad(format!("{}: {}", path.display(), e)))?;
    let (rows, cols) = values.dim();
    NamedMatrix::new(default_names("g", rows), default_names("c", cols), values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(MembershipConfig::default().validate().is_ok());
    }

    #[test]
    fn test_with_num_clusters_derives_col_slots() {
        let config = MembershipConfig::with_num_clusters(30);
        assert_eq!(config.num_clusters, 30);
        assert_eq!(config.clusters_per_col, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let mut config = MembershipConfig::default();
        config.clusters_per_row = 0;
        assert!(config.validate().is_err());

        let mut config = MembershipConfig::default();
        config.clusters_per_row = config.num_clusters + 1;
        assert!(config.validate().is_err());

        let mut config = MembershipConfig::default();
        config.prob_row_change = 1.5;
        assert!(config.validate().is_err());
    }
}
