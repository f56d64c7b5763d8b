/**
 * File: /src/fuzzify.rs
 * Created Date: Tuesday, June 17th 2025
 * Author: Zihan
 * -----
 * Last Modified: Friday, 18th July 2025 8:56:10 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
**/
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::config::FuzzySchedule;
use crate::error::Result;
use crate::matrix::NamedMatrix;
use crate::membership::ClusterMembership;
use crate::util;

/// Iteration-decaying coefficient controlling the noise amplitude.
pub fn fuzzy_coefficient(schedule: FuzzySchedule, iteration: usize, num_iterations: usize) -> f64 {
    let i = iteration as f64;
    let n = num_iterations as f64;
    match schedule {
        FuzzySchedule::Decay => 0.75 * (-i / (n / 4.0)).exp(),
        FuzzySchedule::DampedDecay => 0.7 * (-i / (n / 3.0)).exp() + 0.05,
    }
}

/// Adds Gaussian noise to both score matrices in place, scaled by
/// `fuzzy_coeff` and by the spread of the scores currently inside
/// clusters. A matrix with no finite in-membership score passes through
/// unchanged.
pub fn fuzzify<R: Rng>(
    membership: &ClusterMembership,
    row_scores: &mut NamedMatrix,
    col_scores: &mut NamedMatrix,
    fuzzy_coeff: f64,
    rng: &mut R,
) -> Result<()> {
    let row_pool = {
        let scores: &NamedMatrix = row_scores;
        member_score_pool(scores, |cluster| {
            membership
                .rows_for_cluster(cluster)
                .iter()
                .filter_map(|name| scores.row_index_of(name).ok())
                .collect()
        })
    };
    perturb(row_scores, &row_pool, fuzzy_coeff, rng);

    let col_pool = {
        let scores: &NamedMatrix = col_scores;
        member_score_pool(scores, |cluster| {
            membership
                .columns_for_cluster(cluster)
                .iter()
                .filter_map(|name| scores.row_index_of(name).ok())
                .collect()
        })
    };
    perturb(col_scores, &col_pool, fuzzy_coeff, rng);
    Ok(())
}

/// Scores of current members, pooled over every cluster column.
fn member_score_pool(
    scores: &NamedMatrix,
    member_indexes: impl Fn(usize) -> Vec<usize>,
) -> Vec<f64> {
    let mut pool = Vec::new();
    for col in 0..scores.num_columns() {
        for row in member_indexes(col + 1) {
            pool.push(scores[(row, col)]);
        }
    }
    pool
}

fn perturb<R: Rng>(scores: &mut NamedMatrix, pool: &[f64], fuzzy_coeff: f64, rng: &mut R) {
    let sd = util::finite_stddev(pool);
    if !sd.is_finite() {
        return;
    }
    let noise = match Normal::new(0.0, sd * fuzzy_coeff) {
        Ok(dist) => dist,
        Err(_) => return,
    };
    scores.values_mut().mapv_inplace(|v| v + noise.sample(rng));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MembershipConfig;
    use crate::matrix::default_names;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn setup() -> (ClusterMembership, NamedMatrix, NamedMatrix) {
        let config = MembershipConfig {
            num_clusters: 2,
            clusters_per_row: 1,
            clusters_per_col: 2,
            ..MembershipConfig::default()
        };
        let rows = BTreeMap::from([
            ("g0".to_string(), vec![1]),
            ("g1".to_string(), vec![2]),
            ("g2".to_string(), vec![1]),
        ]);
        let cols = BTreeMap::from([("c0".to_string(), vec![1]), ("c1".to_string(), vec![2])]);
        let membership = ClusterMembership::new(rows, cols, config).unwrap();

        let row_scores = NamedMatrix::new(
            default_names("g", 3),
            vec!["1".to_string(), "2".to_string()],
            Array2::from_shape_vec((3, 2), vec![0.1, 0.9, 0.8, 0.2, 0.15, 0.7]).unwrap(),
        )
        .unwrap();
        let col_scores = NamedMatrix::new(
            default_names("c", 2),
            vec!["1".to_string(), "2".to_string()],
            Array2::from_shape_vec((2, 2), vec![0.3, 0.6, 0.5, 0.25]).unwrap(),
        )
        .unwrap();
        (membership, row_scores, col_scores)
    }

    #[test]
    fn test_coefficient_decays_monotonically() {
        let n = 100;
        let mut last = f64::INFINITY;
        for i in [0, 10, 50, 100] {
            let coeff = fuzzy_coefficient(FuzzySchedule::Decay, i, n);
            assert!(coeff < last);
            assert!(coeff <= 0.75);
            last = coeff;
        }
        // the damped schedule keeps a noise floor
        let late = fuzzy_coefficient(FuzzySchedule::DampedDecay, n, n);
        assert!(late > 0.05 && late < 0.1);
    }

    #[test]
    fn test_fuzzify_perturbs_scores() {
        let (membership, mut row_scores, mut col_scores) = setup();
        let before = row_scores.values().clone();
        let mut rng = StdRng::seed_from_u64(7);
        fuzzify(&membership, &mut row_scores, &mut col_scores, 0.5, &mut rng).unwrap();
        let changed = row_scores
            .values()
            .iter()
            .zip(before.iter())
            .any(|(a, b)| (a - b).abs() > 1e-12);
        assert!(changed);
    }

    #[test]
    fn test_zero_coefficient_leaves_scores_unchanged() {
        let (membership, mut row_scores, mut col_scores) = setup();
        let before = row_scores.values().clone();
        let mut rng = StdRng::seed_from_u64(7);
        fuzzify(&membership, &mut row_scores, &mut col_scores, 0.0, &mut rng).unwrap();
        for (a, b) in row_scores.values().iter().zip(before.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_seeded_rng_reproduces_noise() {
        let (membership, row_scores, col_scores) = setup();
        let mut first = (row_scores.clone(), col_scores.clone());
        let mut second = (row_scores, col_scores);

        let mut rng1 = StdRng::seed_from_u64(42);
        fuzzify(&membership, &mut first.0, &mut first.1, 0.3, &mut rng1).unwrap();
        let mut rng2 = StdRng::seed_from_u64(42);
        fuzzify(&membership, &mut second.0, &mut second.1, 0.3, &mut rng2).unwrap();

        for (a, b) in first.0.values().iter().zip(second.0.values().iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_no_members_means_no_perturbation() {
        let config = MembershipConfig {
            num_clusters: 2,
            clusters_per_row: 1,
            clusters_per_col: 1,
            ..MembershipConfig::default()
        };
        let rows = BTreeMap::from([("g0".to_string(), vec![]), ("g1".to_string(), vec![])]);
        let cols = BTreeMap::from([("c0".to_string(), vec![])]);
        let membership = ClusterMembership::new(rows, cols, config).unwrap();

        let mut row_scores = NamedMatrix::new(
            default_names("g", 2),
            vec!["1".to_string(), "2".to_string()],
            Array2::from_shape_vec((2, 2), vec![0.1, 0.2, 0.3, 0.4]).unwrap(),
        )
        .unwrap();
        let mut col_scores = NamedMatrix::new(
            default_names("c", 1),
            vec!["1".to_string(), "2".to_string()],
            Array2::from_shape_vec((1, 2), vec![0.5, 0.6]).unwrap(),
        )
        .unwrap();

        let before = row_scores.values().clone();
        let mut rng = StdRng::seed_from_u64(1);
        fuzzify(&membership, &mut row_scores, &mut col_scores, 0.5, &mut rng).unwrap();
        assert_eq!(row_scores.values(), &before);
    }
}
