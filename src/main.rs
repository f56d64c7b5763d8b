/*
 * File: /src/main.rs
 * Created Date: Tuesday, June 10th 2025
 * Author: Zihan
 * -----
 * Last Modified: Friday, 25th July 2025 9:30:02 am
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use log::info;
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

use fuzzy_cocluster::adjust::{DEFAULT_ADJUST_CUTOFF, DEFAULT_ADJUST_LIMIT};
use fuzzy_cocluster::config::load_expression_matrix;
use fuzzy_cocluster::matrix::default_names;
use fuzzy_cocluster::seed::{BestScoreColumnSeeder, KMeansRowSeeder};
use fuzzy_cocluster::{
    BiclusterEngine, ClusterMembership, DispersionScorer, MembershipConfig, NamedMatrix,
};

struct RunArgs {
    matrix_path: Option<PathBuf>,
    num_clusters: usize,
    num_iterations: usize,
    seed: u64,
}

impl RunArgs {
    /// ```bash
    /// $ cargo run -- data/ratios.npy 20 200 42
    /// ```
    /// With no arguments a synthetic planted matrix is used.
    fn new(mut args: impl Iterator<Item = String>) -> Result<RunArgs, Box<dyn std::error::Error>> {
        args.next();
        let matrix_path = args.next().map(PathBuf::from);
        let num_clusters = match args.next() {
            Some(v) => v.parse()?,
            None => 4,
        };
        let num_iterations = match args.next() {
            Some(v) => v.parse()?,
            None => 50,
        };
        let seed = match args.next() {
            Some(v) => v.parse()?,
            None => 0,
        };
        Ok(RunArgs {
            matrix_path,
            num_clusters,
            num_iterations,
            seed,
        })
    }
}

fn synthetic_matrix(rows: usize, cols: usize, num_clusters: usize) -> NamedMatrix {
    let mut values = Array2::random((rows, cols), Uniform::new(0.0, 1.0));
    let rows_per = rows / num_clusters;
    let cols_per = cols / num_clusters;
    for k in 0..num_clusters {
        for i in k * rows_per..((k + 1) * rows_per).min(rows) {
            for j in k * cols_per..((k + 1) * cols_per).min(cols) {
                values[[i, j]] += 2.0;
            }
        }
    }
    NamedMatrix::new(default_names("g", rows), default_names("c", cols), values)
        .expect("shape is consistent by construction")
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = RunArgs::new(std::env::args())?;

    let matrix = match &args.matrix_path {
        Some(path) => load_expression_matrix(path)?,
        None => synthetic_matrix(120, 40, args.num_clusters),
    };
    info!(
        "loaded {} x {} expression matrix",
        matrix.num_rows(),
        matrix.num_columns()
    );

    let mut config = MembershipConfig::with_num_clusters(args.num_clusters);
    config.num_iterations = args.num_iterations;
    config.random_seed = args.seed;
    config.min_cluster_rows_allowed = 3;
    config.output_dir = Some(PathBuf::from("out"));

    let seed_start = Instant::now();
    let membership = ClusterMembership::create(
        &matrix,
        &KMeansRowSeeder::default(),
        &BestScoreColumnSeeder,
        config,
    )?;
    info!("seeded memberships in {:?}", seed_start.elapsed());

    let mut engine = BiclusterEngine::builder()
        .with_provider(Box::new(DispersionScorer::new(true)))
        .with_matrix(matrix)
        .with_membership(membership)
        .build()?;

    let run_start = Instant::now();
    let result = engine.run()?;
    info!(
        "{} iterations, {} membership changes in {:?}",
        result.iterations.len(),
        result.total_changes(),
        run_start.elapsed()
    );

    let adjusted = engine.postadjust(DEFAULT_ADJUST_CUTOFF, DEFAULT_ADJUST_LIMIT)?;
    info!(
        "[{}] post-adjustment changed membership: {}",
        fuzzy_cocluster::util::timestamp(),
        adjusted
    );

    let membership = engine.membership();
    for cluster in 1..=membership.num_clusters() {
        println!(
            "bicluster {:>3}: {:>4} rows, {:>3} columns",
            cluster,
            membership.num_row_members(cluster),
            membership.num_column_members(cluster)
        );
    }
    Ok(())
}

fn main() {
    fuzzy_cocluster::init_logger();
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        process::exit(1);
    }
}
