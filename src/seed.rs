/**
 * File: /src/seed.rs
 * Created Date: Saturday, June 14th 2025
 * Author: Zihan
 * -----
 * Last Modified: Saturday, 19th July 2025 6:12:03 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
**/
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;

use crate::error::{Error, Result};
use crate::matrix::NamedMatrix;
use crate::scoring::submatrix_column_scores;

/// Assigns each row its initial cluster (`0` = unassigned, legal only
/// during seeding).
pub trait RowSeeder {
    fn seed(&self, matrix: &NamedMatrix, num_clusters: usize) -> Result<Vec<usize>>;
    fn name(&self) -> &str;
}

/// Derives the full column membership from the seeded row assignment.
/// Returns one cluster list per column, best first.
pub trait ColumnSeeder {
    fn seed(
        &self,
        matrix: &NamedMatrix,
        row_assignments: &[usize],
        num_clusters: usize,
        clusters_per_col: usize,
    ) -> Result<Vec<Vec<usize>>>;
    fn name(&self) -> &str;
}

/// K-means over the expression rows; NaN cells are zeroed first.
pub struct KMeansRowSeeder {
    pub max_iterations: u64,
    pub n_runs: usize,
}

impl Default for KMeansRowSeeder {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            n_runs: 2,
        }
    }
}

impl RowSeeder for KMeansRowSeeder {
    fn seed(&self, matrix: &NamedMatrix, num_clusters: usize) -> Result<Vec<usize>> {
        if matrix.num_rows() < num_clusters {
            return Err(Error::Seeding(format!(
                "{} rows cannot seed {} clusters",
                matrix.num_rows(),
                num_clusters
            )));
        }
        let records = matrix.values().mapv(|v| if v.is_finite() { v } else { 0.0 });
        let dataset = DatasetBase::from(records);
        let model = KMeans::params(num_clusters)
            .max_n_iterations(self.max_iterations)
            .n_runs(self.n_runs)
            .fit(&dataset)
            .map_err(|e| Error::Seeding(e.to_string()))?;
        let labels = model.predict(&dataset);
        Ok(labels.iter().map(|&label| label + 1).collect())
    }

    fn name(&self) -> &str {
        "KMeans"
    }
}

/// Reads `row-name cluster` pairs from a delimited file with a header
/// line. Rows absent from the file stay unassigned.
pub struct FileRowSeeder {
    pub path: PathBuf,
    pub separator: char,
}

impl FileRowSeeder {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            separator: ' ',
        }
    }
}

impl RowSeeder for FileRowSeeder {
    fn seed(&self, matrix: &NamedMatrix, num_clusters: usize) -> Result<Vec<usize>> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| Error::Seeding(format!("{}: {}", self.path.display(), e)))?;
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for line in content.lines().skip(1) {
            let line = line.trim().replace('"', "");
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split(self.separator);
            let name = fields
                .next()
                .ok_or_else(|| Error::Seeding(format!("malformed line: '{}'", line)))?;
            let cluster: usize = fields
                .next()
                .and_then(|f| f.parse().ok())
                .ok_or_else(|| Error::Seeding(format!("malformed line: '{}'", line)))?;
            if cluster > num_clusters {
                return Err(Error::Seeding(format!(
                    "cluster {} for '{}' exceeds {}",
                    cluster, name, num_clusters
                )));
            }
            by_name.insert(name.to_string(), cluster);
        }
        Ok(matrix
            .row_names()
            .iter()
            .map(|name| by_name.get(name).copied().unwrap_or(0))
            .collect())
    }

    fn name(&self) -> &str {
        "File"
    }
}

/// Default column seeder: ranks clusters per condition by the column
/// dispersion of the cluster's seeded rows (tightest first) and keeps
/// the best `clusters_per_col`.
pub struct BestScoreColumnSeeder;

impl ColumnSeeder for BestScoreColumnSeeder {
    fn seed(
        &self,
        matrix: &NamedMatrix,
        row_assignments: &[usize],
        num_clusters: usize,
        clusters_per_col: usize,
    ) -> Result<Vec<Vec<usize>>> {
        let all_cols = matrix.column_names().to_vec();

        // per-cluster column scores; empty clusters never win a rank
        let mut cluster_scores: Vec<Vec<f64>> = Vec::with_capacity(num_clusters);
        for cluster in 1..=num_clusters {
            let rnames: Vec<String> = matrix
                .row_names()
                .iter()
                .zip(row_assignments)
                .filter(|(_, &assigned)| assigned == cluster)
                .map(|(name, _)| name.clone())
                .collect();
            if rnames.is_empty() {
                cluster_scores.push(vec![f64::INFINITY; matrix.num_columns()]);
                continue;
            }
            let sm = matrix.submatrix_by_name(&rnames, &all_cols)?;
            cluster_scores.push(submatrix_column_scores(&sm));
        }

        let mut column_members = Vec::with_capacity(matrix.num_columns());
        for col in 0..matrix.num_columns() {
            let mut ranked: Vec<usize> = (0..num_clusters).collect();
            ranked.sort_by(|&a, &b| {
                let sa = cluster_scores[a][col];
                let sb = cluster_scores[b][col];
                sa.partial_cmp(&sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            });
            column_members.push(
                ranked
                    .into_iter()
                    .take(clusters_per_col)
                    .map(|idx| idx + 1)
                    .collect(),
            );
        }
        Ok(column_members)
    }

    fn name(&self) -> &str {
        "BestScore"
    }
}
