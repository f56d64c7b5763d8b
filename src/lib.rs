/**
 * File: /src/lib.rs
 * Created Date: Tuesday, June 10th 2025
 * Author: Zihan
 * -----
 * Last Modified: Thursday, 24th July 2025 5:48:33 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
pub mod adjust;
pub mod checkpoint;
pub mod compensate;
pub mod config;
pub mod density;
pub mod error;
pub mod fuzzify;
pub mod matrix;
pub mod membership;
pub mod pipeline;
pub mod scoring;
pub mod seed;
pub mod update;
pub mod util;

pub use config::{FuzzySchedule, MembershipConfig, StorageKind};
pub use error::{Dimension, Error, Result};
pub use matrix::NamedMatrix;
pub use membership::ClusterMembership;
pub use pipeline::{BiclusterEngine, EngineBuilder, IterationContext, RunResult};
pub use scoring::{DispersionScorer, ScoreProvider};

use log::LevelFilter;

/// Initializes a plain stdout logger; repeated calls are harmless.
pub fn init_logger() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init();
}
