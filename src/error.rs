use thiserror::Error;

/// Which side of the bipartite membership an operation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Row,
    Column,
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::Row => write!(f, "row"),
            Dimension::Column => write!(f, "column"),
        }
    }
}

/// Errors raised by the membership engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A checked add would exceed the per-row/per-column cluster limit.
    /// Signals a logic error in candidate selection; callers that really
    /// need to go over the limit use the forced-add path.
    #[error("exceeded clusters/{dimension} limit ({limit}) for {dimension}: '{name}'")]
    CapacityExceeded {
        dimension: Dimension,
        name: String,
        limit: usize,
    },

    /// A row or column that should have been seeded is not in the
    /// membership maps. Absence of an entity is a configuration error;
    /// a cluster with zero members is not.
    #[error("unknown {dimension}: '{name}'")]
    NotFound { dimension: Dimension, name: String },

    /// Cluster id outside `1..=num_clusters`.
    #[error("cluster {cluster} out of range 1..={num_clusters}")]
    ClusterOutOfRange { cluster: usize, num_clusters: usize },

    /// Matrix shapes disagree with the membership configuration.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// Invalid configuration value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        name: &'static str,
        message: &'static str,
    },

    /// Seeding failed (k-means did not converge, file unreadable, ...).
    #[error("seeding failed: {0}")]
    Seeding(String),

    /// Expression matrix could not be loaded.
    #[error("matrix load: {0}")]
    MatrixLoad(String),

    /// Checkpoint persistence failure.
    #[error("checkpoint i/o: {0}")]
    CheckpointIo(#[from] std::io::Error),

    /// Checkpoint (de)serialization failure.
    #[error("checkpoint format: {0}")]
    CheckpointFormat(#[from] serde_json::Error),
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
