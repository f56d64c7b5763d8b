/**
 * File: /src/checkpoint.rs
 * Created Date: Wednesday, June 18th 2025
 * Author: Zihan
 * -----
 * Last Modified: Thursday, 24th July 2025 10:12:56 am
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
**/
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::MembershipConfig;
use crate::error::Result;
use crate::matrix::NamedMatrix;
use crate::membership::ClusterMembership;

const CHECKPOINT_FILE: &str = "membership_checkpoint.json";
const ROW_SCORES_FILE: &str = "last_row_scores.json";

/// Durable record of a run: the iteration counter and the two forward
/// membership maps. The inverse indices are derived state and are
/// rebuilt on restore, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub iteration: usize,
    pub row_is_member_of: BTreeMap<String, Vec<usize>>,
    pub col_is_member_of: BTreeMap<String, Vec<usize>>,
}

/// File-backed key-value store for checkpoints and the cached row-score
/// artifact the post-adjuster reads.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(CheckpointStore {
            dir: dir.to_path_buf(),
        })
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    pub fn row_scores_path(&self) -> PathBuf {
        self.dir.join(ROW_SCORES_FILE)
    }

    pub fn save(&self, membership: &ClusterMembership, iteration: usize) -> Result<()> {
        info!("saving membership checkpoint for iteration {}", iteration);
        let (row_is_member_of, col_is_member_of) = membership.snapshot();
        let record = Checkpoint {
            iteration,
            row_is_member_of,
            col_is_member_of,
        };
        fs::write(self.checkpoint_path(), serde_json::to_string(&record)?)?;
        Ok(())
    }

    pub fn load(&self) -> Result<Checkpoint> {
        let content = fs::read_to_string(self.checkpoint_path())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Rebuilds a membership from the persisted forward maps.
    pub fn restore(&self, config: MembershipConfig) -> Result<(ClusterMembership, usize)> {
        info!("restoring cluster memberships from checkpoint data");
        let record = self.load()?;
        let membership =
            ClusterMembership::new(record.row_is_member_of, record.col_is_member_of, config)?;
        Ok((membership, record.iteration))
    }

    /// Persists the (fuzzified) row scores of the final regular
    /// iteration so post-adjustment can run as a separate process step.
    pub fn save_row_scores(&self, scores: &NamedMatrix) -> Result<()> {
        fs::write(self.row_scores_path(), serde_json::to_string(scores)?)?;
        Ok(())
    }

    pub fn load_row_scores(&self) -> Result<NamedMatrix> {
        let content = fs::read_to_string(self.row_scores_path())?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageKind;
    use crate::matrix::default_names;
    use ndarray::Array2;
    use std::collections::BTreeSet;

    fn sample_membership(storage: StorageKind) -> ClusterMembership {
        let config = MembershipConfig {
            num_clusters: 3,
            clusters_per_row: 2,
            clusters_per_col: 2,
            storage,
            ..MembershipConfig::default()
        };
        let rows = BTreeMap::from([
            ("g0".to_string(), vec![1, 3]),
            ("g1".to_string(), vec![2]),
            ("g2".to_string(), vec![]),
        ]);
        let cols = BTreeMap::from([
            ("c0".to_string(), vec![1, 2]),
            ("c1".to_string(), vec![3]),
        ]);
        ClusterMembership::new(rows, cols, config).unwrap()
    }

    #[test]
    fn test_checkpoint_round_trip_restores_all_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        let membership = sample_membership(StorageKind::Set);
        store.save(&membership, 42).unwrap();

        let config = membership.config().clone();
        let (restored, iteration) = store.restore(config).unwrap();
        assert_eq!(iteration, 42);
        for row in ["g0", "g1", "g2"] {
            assert_eq!(
                restored.clusters_for_row(row).unwrap(),
                membership.clusters_for_row(row).unwrap()
            );
        }
        for col in ["c0", "c1"] {
            assert_eq!(
                restored.clusters_for_column(col).unwrap(),
                membership.clusters_for_column(col).unwrap()
            );
        }
        for cluster in 1..=3 {
            assert_eq!(restored.rows_for_cluster(cluster), membership.rows_for_cluster(cluster));
            assert_eq!(
                restored.columns_for_cluster(cluster),
                membership.columns_for_cluster(cluster)
            );
        }
        assert!(restored.is_consistent());
    }

    #[test]
    fn test_restore_into_slot_storage() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        let membership = sample_membership(StorageKind::Set);
        store.save(&membership, 7).unwrap();

        let mut config = membership.config().clone();
        config.storage = StorageKind::Slot;
        let (restored, _) = store.restore(config).unwrap();
        assert_eq!(
            restored.clusters_for_row("g0").unwrap(),
            BTreeSet::from([1, 3])
        );
        assert!(restored.is_consistent());
    }

    #[test]
    fn test_row_scores_artifact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        let scores = NamedMatrix::new(
            default_names("g", 2),
            vec!["1".to_string(), "2".to_string()],
            Array2::from_shape_vec((2, 2), vec![0.25, -1.5, 3.0, 0.0]).unwrap(),
        )
        .unwrap();
        store.save_row_scores(&scores).unwrap();

        let loaded = store.load_row_scores().unwrap();
        assert_eq!(loaded.row_names(), scores.row_names());
        assert_eq!(loaded.values(), scores.values());
        assert_eq!(loaded.row_index_of("g1").unwrap(), 1);
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        assert!(store.load().is_err());
    }
}
