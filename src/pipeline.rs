use std::time::{Duration, Instant};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::adjust;
use crate::checkpoint::CheckpointStore;
use crate::compensate::compensate_size;
use crate::config::MembershipConfig;
use crate::density::density_scores;
use crate::error::{Error, Result};
use crate::fuzzify::{fuzzify, fuzzy_coefficient};
use crate::matrix::NamedMatrix;
use crate::membership::ClusterMembership;
use crate::scoring::ScoreProvider;
use crate::update::{update_for_cols, update_for_rows};

/// Per-iteration bookkeeping handed through scoring and update calls;
/// not persisted beyond logging.
#[derive(Debug, Clone)]
pub struct IterationContext {
    pub iteration: usize,
    pub num_iterations: usize,
    pub fuzzy_coefficient: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationStats {
    pub iteration: usize,
    pub fuzzy_coefficient: Option<f64>,
    pub row_changes: usize,
    pub col_changes: usize,
    pub scoring_duration: Duration,
    pub update_duration: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub iterations: Vec<IterationStats>,
}

impl RunResult {
    pub fn total_changes(&self) -> usize {
        self.iterations
            .iter()
            .map(|s| s.row_changes + s.col_changes)
            .sum()
    }
}

/// Iteration driver for the membership engine.
///
/// Each iteration pulls fresh raw score matrices from the provider and
/// runs fuzzify → density → size compensation → row update → column
/// update, checkpointing the membership afterwards. Scoring phases may
/// fan out over clusters; all membership mutation happens on this
/// thread.
pub struct BiclusterEngine {
    provider: Box<dyn ScoreProvider>,
    membership: ClusterMembership,
    matrix: NamedMatrix,
    checkpoint: Option<CheckpointStore>,
    rng: StdRng,
    start_iteration: usize,
}

impl BiclusterEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn membership(&self) -> &ClusterMembership {
        &self.membership
    }

    pub fn into_membership(self) -> ClusterMembership {
        self.membership
    }

    /// Runs the configured number of regular iterations.
    pub fn run(&mut self) -> Result<RunResult> {
        let num_iterations = self.membership.config().num_iterations;
        let mut iterations = Vec::with_capacity(num_iterations);
        info!(
            "starting membership run with {} scoring, iterations {}..={}",
            self.provider.name(),
            self.start_iteration,
            num_iterations
        );

        for iteration in self.start_iteration..=num_iterations {
            let scoring_start = Instant::now();
            let row_scores = self.provider.row_scores(&self.membership, &self.matrix)?;
            let col_scores = self.provider.column_scores(&self.membership, &self.matrix)?;
            let scoring_duration = scoring_start.elapsed();

            let update_start = Instant::now();
            let context = IterationContext {
                iteration,
                num_iterations,
                fuzzy_coefficient: None,
            };
            let (row_changes, col_changes, fuzzy) =
                self.update(row_scores, col_scores, context)?;
            let update_duration = update_start.elapsed();

            if let Some(store) = &self.checkpoint {
                store.save(&self.membership, iteration)?;
            }
            info!(
                "iteration {}/{}: {} row changes, {} col changes in {:?}",
                iteration,
                num_iterations,
                row_changes,
                col_changes,
                scoring_duration + update_duration
            );
            iterations.push(IterationStats {
                iteration,
                fuzzy_coefficient: fuzzy,
                row_changes,
                col_changes,
                scoring_duration,
                update_duration,
            });
        }
        Ok(RunResult { iterations })
    }

    /// One membership update from raw score matrices. Returns the row
    /// and column change counts and the fuzzy coefficient used, if any.
    pub fn update(
        &mut self,
        mut row_scores: NamedMatrix,
        mut col_scores: NamedMatrix,
        mut context: IterationContext,
    ) -> Result<(usize, usize, Option<f64>)> {
        let config = self.membership.config().clone();
        if row_scores.num_columns() != config.num_clusters {
            return Err(Error::DimensionMismatch {
                expected: config.num_clusters,
                found: row_scores.num_columns(),
            });
        }
        if col_scores.num_columns() != config.num_clusters {
            return Err(Error::DimensionMismatch {
                expected: config.num_clusters,
                found: col_scores.num_columns(),
            });
        }

        if config.add_fuzz {
            let start = Instant::now();
            let coeff = fuzzy_coefficient(
                config.fuzzy_schedule,
                context.iteration,
                context.num_iterations,
            );
            context.fuzzy_coefficient = Some(coeff);
            fuzzify(
                &self.membership,
                &mut row_scores,
                &mut col_scores,
                coeff,
                &mut self.rng,
            )?;
            debug!("fuzzify took {:?}", start.elapsed());
        }

        // the post-adjuster reads the scores of the last regular
        // iteration from disk instead of recomputing them
        if context.iteration == context.num_iterations {
            if let Some(store) = &self.checkpoint {
                store.save_row_scores(&row_scores)?;
            }
        }

        let start = Instant::now();
        let (mut rd_scores, mut cd_scores) = density_scores(
            &self.membership,
            &row_scores,
            &col_scores,
            config.parallel,
        )?;
        debug!("density scores took {:?}", start.elapsed());

        let start = Instant::now();
        compensate_size(
            &self.membership,
            (self.matrix.num_rows(), self.matrix.num_columns()),
            &mut rd_scores,
            &mut cd_scores,
        );
        debug!("size compensation took {:?}", start.elapsed());

        let start = Instant::now();
        let row_changes = update_for_rows(&mut self.membership, &rd_scores, &mut self.rng)?;
        debug!("row update took {:?}", start.elapsed());

        let start = Instant::now();
        let col_changes = update_for_cols(&mut self.membership, &cd_scores, &mut self.rng)?;
        debug!("column update took {:?}", start.elapsed());

        Ok((row_changes, col_changes, context.fuzzy_coefficient))
    }

    /// Terminal rebalancing pass over the cached final-iteration row
    /// scores. Returns whether any membership changed.
    pub fn postadjust(&mut self, cutoff: f64, limit: usize) -> Result<bool> {
        let store = self.checkpoint.as_ref().ok_or(Error::InvalidParameter {
            name: "output_dir",
            message: "post-adjustment needs a checkpoint store with cached row scores",
        })?;
        let row_scores = store.load_row_scores()?;
        adjust::postadjust(&mut self.membership, &row_scores, cutoff, limit)
    }

    /// Post-adjustment against explicitly supplied row scores.
    pub fn postadjust_with(
        &mut self,
        row_scores: &NamedMatrix,
        cutoff: f64,
        limit: usize,
    ) -> Result<bool> {
        adjust::postadjust(&mut self.membership, row_scores, cutoff, limit)
    }
}

/// Builder wiring provider, matrix and membership together.
pub struct EngineBuilder {
    provider: Option<Box<dyn ScoreProvider>>,
    membership: Option<ClusterMembership>,
    matrix: Option<NamedMatrix>,
    start_iteration: usize,
}

impl EngineBuilder {
    pub fn new() -> Self {
        EngineBuilder {
            provider: None,
            membership: None,
            matrix: None,
            start_iteration: 1,
        }
    }

    pub fn with_provider(mut self, provider: Box<dyn ScoreProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_membership(mut self, membership: ClusterMembership) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn with_matrix(mut self, matrix: NamedMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    /// Resumes from the persisted checkpoint in the config's output
    /// directory instead of a fresh membership.
    pub fn resume(mut self, config: MembershipConfig) -> Result<Self> {
        let dir = config.output_dir.clone().ok_or(Error::InvalidParameter {
            name: "output_dir",
            message: "resume needs a checkpoint directory",
        })?;
        let store = CheckpointStore::new(&dir)?;
        let (membership, iteration) = store.restore(config)?;
        self.membership = Some(membership);
        self.start_iteration = iteration + 1;
        Ok(self)
    }

    pub fn build(self) -> Result<BiclusterEngine> {
        let provider = self.provider.ok_or(Error::InvalidParameter {
            name: "provider",
            message: "score provider not set",
        })?;
        let membership = self.membership.ok_or(Error::InvalidParameter {
            name: "membership",
            message: "membership not set",
        })?;
        let matrix = self.matrix.ok_or(Error::InvalidParameter {
            name: "matrix",
            message: "expression matrix not set",
        })?;
        if matrix.num_rows() == 0 || matrix.num_columns() == 0 {
            return Err(Error::InvalidParameter {
                name: "matrix",
                message: "expression matrix is empty",
            });
        }

        let config = membership.config();
        let checkpoint = match &config.output_dir {
            Some(dir) => Some(CheckpointStore::new(dir)?),
            None => None,
        };
        let rng = StdRng::seed_from_u64(config.random_seed);
        Ok(BiclusterEngine {
            provider,
            membership,
            matrix,
            checkpoint,
            rng,
            start_iteration: self.start_iteration,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MembershipConfig, StorageKind};
    use crate::matrix::default_names;
    use crate::scoring::DispersionScorer;
    use ndarray::Array2;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use std::collections::BTreeMap;

    fn planted_matrix(rows: usize, cols: usize) -> NamedMatrix {
        let mut values = Array2::random((rows, cols), Uniform::new(0.0, 1.0));
        for i in 0..rows / 2 {
            for j in 0..cols / 2 {
                values[[i, j]] += 2.0;
            }
        }
        NamedMatrix::new(default_names("g", rows), default_names("c", cols), values).unwrap()
    }

    fn seeded_membership(rows: usize, cols: usize, config: MembershipConfig) -> ClusterMembership {
        let row_map: BTreeMap<String, Vec<usize>> = (0..rows)
            .map(|i| (format!("g{}", i), vec![i % config.num_clusters + 1]))
            .collect();
        let col_map: BTreeMap<String, Vec<usize>> = (0..cols)
            .map(|j| (format!("c{}", j), vec![j % config.num_clusters + 1]))
            .collect();
        ClusterMembership::new(row_map, col_map, config).unwrap()
    }

    fn small_config() -> MembershipConfig {
        MembershipConfig {
            num_clusters: 2,
            clusters_per_row: 1,
            clusters_per_col: 1,
            prob_row_change: 1.0,
            prob_col_change: 1.0,
            max_changes_per_row: 1,
            max_changes_per_col: 1,
            min_cluster_rows_allowed: 1,
            num_iterations: 3,
            add_fuzz: false,
            parallel: false,
            storage: StorageKind::Set,
            output_dir: None,
            ..MembershipConfig::default()
        }
    }

    #[test]
    fn test_builder_requires_all_parts() {
        assert!(BiclusterEngine::builder().build().is_err());
        let matrix = planted_matrix(8, 6);
        assert!(BiclusterEngine::builder()
            .with_matrix(matrix)
            .build()
            .is_err());
    }

    #[test]
    fn test_run_keeps_membership_consistent() {
        let matrix = planted_matrix(10, 8);
        let config = small_config();
        let membership = seeded_membership(10, 8, config);
        let mut engine = BiclusterEngine::builder()
            .with_provider(Box::new(DispersionScorer::new(false)))
            .with_matrix(matrix)
            .with_membership(membership)
            .build()
            .unwrap();

        let result = engine.run().unwrap();
        assert_eq!(result.iterations.len(), 3);
        assert!(engine.membership().is_consistent());
        for i in 0..10 {
            let clusters = engine
                .membership()
                .clusters_for_row(&format!("g{}", i))
                .unwrap();
            assert!(clusters.len() <= 1);
        }
    }

    #[test]
    fn test_deterministic_runs_with_same_seed() {
        let matrix = planted_matrix(10, 8);
        let mut config = small_config();
        config.add_fuzz = true;
        config.random_seed = 11;

        let run = |matrix: NamedMatrix, config: MembershipConfig| {
            let membership = seeded_membership(10, 8, config);
            let mut engine = BiclusterEngine::builder()
                .with_provider(Box::new(DispersionScorer::new(false)))
                .with_matrix(matrix)
                .with_membership(membership)
                .build()
                .unwrap();
            engine.run().unwrap();
            engine.into_membership().snapshot()
        };

        let first = run(matrix.clone(), config.clone());
        let second = run(matrix, config);
        assert_eq!(first, second);
    }
}
