/**
 * File: /src/membership.rs
 * Created Date: Thursday, June 12th 2025
 * Author: Zihan
 * -----
 * Last Modified: Saturday, 19th July 2025 2:47:31 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{MembershipConfig, StorageKind};
use crate::error::{Dimension, Error, Result};
use crate::matrix::NamedMatrix;
use crate::seed::{ColumnSeeder, RowSeeder};

static NO_MEMBERS: BTreeSet<String> = BTreeSet::new();

#[derive(Debug, PartialEq, Eq)]
enum InsertOutcome {
    Added,
    AlreadyMember,
    Full,
}

/// Forward map from entity name to held clusters. Two representations
/// with one contract: `Sets` keeps a variable-size set per entity,
/// `Slots` keeps a fixed-width array where 0 marks a free slot and
/// offers O(1) free-slot discovery. Forced inserts let `Sets` grow past
/// the limit and let `Slots` extend past their width.
#[derive(Debug, Clone)]
enum ForwardStore {
    Sets {
        map: BTreeMap<String, BTreeSet<usize>>,
        limit: usize,
    },
    Slots {
        map: BTreeMap<String, Vec<usize>>,
        width: usize,
    },
}

impl ForwardStore {
    fn empty(kind: StorageKind, limit: usize) -> Self {
        match kind {
            StorageKind::Set => ForwardStore::Sets {
                map: BTreeMap::new(),
                limit,
            },
            StorageKind::Slot => ForwardStore::Slots {
                map: BTreeMap::new(),
                width: limit,
            },
        }
    }

    fn ensure_entity(&mut self, name: &str) {
        match self {
            ForwardStore::Sets { map, .. } => {
                map.entry(name.to_string()).or_default();
            }
            ForwardStore::Slots { map, width } => {
                map.entry(name.to_string()).or_insert_with(|| vec![0; *width]);
            }
        }
    }

    fn has_entity(&self, name: &str) -> bool {
        match self {
            ForwardStore::Sets { map, .. } => map.contains_key(name),
            ForwardStore::Slots { map, .. } => map.contains_key(name),
        }
    }

    fn clusters(&self, name: &str) -> Option<BTreeSet<usize>> {
        match self {
            ForwardStore::Sets { map, .. } => map.get(name).cloned(),
            ForwardStore::Slots { map, .. } => map
                .get(name)
                .map(|slots| slots.iter().copied().filter(|&c| c > 0).collect()),
        }
    }

    fn contains(&self, name: &str, cluster: usize) -> Option<bool> {
        match self {
            ForwardStore::Sets { map, .. } => map.get(name).map(|set| set.contains(&cluster)),
            ForwardStore::Slots { map, .. } => map.get(name).map(|slots| slots.contains(&cluster)),
        }
    }

    fn count(&self, name: &str) -> Option<usize> {
        match self {
            ForwardStore::Sets { map, .. } => map.get(name).map(|set| set.len()),
            ForwardStore::Slots { map, .. } => map
                .get(name)
                .map(|slots| slots.iter().filter(|&&c| c > 0).count()),
        }
    }

    fn first_free_slot(&self, name: &str) -> Option<Option<usize>> {
        match self {
            ForwardStore::Sets { map, limit } => map
                .get(name)
                .map(|set| if set.len() < *limit { Some(set.len()) } else { None }),
            ForwardStore::Slots { map, .. } => map
                .get(name)
                .map(|slots| slots.iter().position(|&c| c == 0)),
        }
    }

    fn insert(&mut self, name: &str, cluster: usize, force: bool) -> InsertOutcome {
        self.ensure_entity(name);
        match self {
            ForwardStore::Sets { map, limit } => {
                let set = map.get_mut(name).unwrap();
                if set.contains(&cluster) {
                    InsertOutcome::AlreadyMember
                } else if set.len() < *limit || force {
                    set.insert(cluster);
                    InsertOutcome::Added
                } else {
                    InsertOutcome::Full
                }
            }
            ForwardStore::Slots { map, .. } => {
                let slots = map.get_mut(name).unwrap();
                if slots.contains(&cluster) {
                    InsertOutcome::AlreadyMember
                } else if let Some(free) = slots.iter().position(|&c| c == 0) {
                    slots[free] = cluster;
                    InsertOutcome::Added
                } else if force {
                    slots.push(cluster);
                    InsertOutcome::Added
                } else {
                    InsertOutcome::Full
                }
            }
        }
    }

    /// Returns whether the cluster was present; `None` for an unknown
    /// entity. Slot storage zeroes the position, keeping later slots in
    /// place.
    fn remove(&mut self, name: &str, cluster: usize) -> Option<bool> {
        match self {
            ForwardStore::Sets { map, .. } => map.get_mut(name).map(|set| set.remove(&cluster)),
            ForwardStore::Slots { map, .. } => map.get_mut(name).map(|slots| {
                match slots.iter().position(|&c| c == cluster) {
                    Some(idx) => {
                        slots[idx] = 0;
                        true
                    }
                    None => false,
                }
            }),
        }
    }

    /// Overwrites `old` with `new` in place (slot storage keeps the slot
    /// position). Returns whether `old` was present.
    fn replace(&mut self, name: &str, old: usize, new: usize) -> Option<bool> {
        match self {
            ForwardStore::Sets { map, .. } => map.get_mut(name).map(|set| {
                if set.remove(&old) {
                    set.insert(new);
                    true
                } else {
                    false
                }
            }),
            ForwardStore::Slots { map, .. } => map.get_mut(name).map(|slots| {
                match slots.iter().position(|&c| c == old) {
                    Some(idx) => {
                        slots[idx] = new;
                        true
                    }
                    None => false,
                }
            }),
        }
    }

    fn snapshot(&self) -> BTreeMap<String, Vec<usize>> {
        match self {
            ForwardStore::Sets { map, .. } => map
                .iter()
                .map(|(name, set)| (name.clone(), set.iter().copied().collect()))
                .collect(),
            ForwardStore::Slots { map, .. } => map
                .iter()
                .map(|(name, slots)| {
                    let mut clusters: Vec<usize> =
                        slots.iter().copied().filter(|&c| c > 0).collect();
                    clusters.sort_unstable();
                    (name.clone(), clusters)
                })
                .collect(),
        }
    }
}

/// Row and column cluster memberships of an input matrix, with inverse
/// cluster→members indices kept consistent on every mutation.
///
/// All mutation goes through the checked add/remove/replace operations;
/// the forward maps and inverse maps are never touched directly, which
/// is what keeps `r ∈ rows_for_cluster(c) ⟺ c ∈ clusters_for_row(r)`
/// true across a run.
#[derive(Debug, Clone)]
pub struct ClusterMembership {
    config: MembershipConfig,
    rows: ForwardStore,
    cols: ForwardStore,
    cluster_rows: BTreeMap<usize, BTreeSet<String>>,
    cluster_cols: BTreeMap<usize, BTreeSet<String>>,
}

impl ClusterMembership {
    /// Builds a membership from explicit entity→clusters maps. The
    /// inverse indices are always rebuilt here; persisted inverse maps
    /// are never trusted.
    pub fn new(
        row_is_member_of: BTreeMap<String, Vec<usize>>,
        col_is_member_of: BTreeMap<String, Vec<usize>>,
        config: MembershipConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut membership = ClusterMembership {
            rows: ForwardStore::empty(config.storage, config.clusters_per_row),
            cols: ForwardStore::empty(config.storage, config.clusters_per_col),
            cluster_rows: BTreeMap::new(),
            cluster_cols: BTreeMap::new(),
            config,
        };
        // forced adds: a checkpoint taken after post-adjustment may
        // legitimately carry over-capacity entities
        for (row, clusters) in &row_is_member_of {
            membership.rows.ensure_entity(row);
            for &cluster in clusters.iter().filter(|&&c| c > 0) {
                membership.add_cluster_to_row(row, cluster, true)?;
            }
        }
        for (col, clusters) in &col_is_member_of {
            membership.cols.ensure_entity(col);
            for &cluster in clusters.iter().filter(|&&c| c > 0) {
                membership.add_cluster_to_column(col, cluster, true)?;
            }
        }
        Ok(membership)
    }

    /// Creates a seeded membership: the row seeder assigns one initial
    /// cluster per row, the column seeder derives the full column
    /// membership from that assignment.
    pub fn create(
        matrix: &NamedMatrix,
        row_seeder: &dyn RowSeeder,
        column_seeder: &dyn ColumnSeeder,
        config: MembershipConfig,
    ) -> Result<Self> {
        config.validate()?;
        let row_assignments = row_seeder.seed(matrix, config.num_clusters)?;
        if row_assignments.len() != matrix.num_rows() {
            return Err(Error::DimensionMismatch {
                expected: matrix.num_rows(),
                found: row_assignments.len(),
            });
        }
        let column_assignments = column_seeder.seed(
            matrix,
            &row_assignments,
            config.num_clusters,
            config.clusters_per_col,
        )?;
        if column_assignments.len() != matrix.num_columns() {
            return Err(Error::DimensionMismatch {
                expected: matrix.num_columns(),
                found: column_assignments.len(),
            });
        }

        let row_map: BTreeMap<String, Vec<usize>> = matrix
            .row_names()
            .iter()
            .zip(&row_assignments)
            .map(|(name, &cluster)| (name.clone(), if cluster > 0 { vec![cluster] } else { vec![] }))
            .collect();
        let col_map: BTreeMap<String, Vec<usize>> = matrix
            .column_names()
            .iter()
            .zip(&column_assignments)
            .map(|(name, clusters)| {
                let mut clusters = clusters.clone();
                clusters.truncate(config.clusters_per_col);
                (name.clone(), clusters)
            })
            .collect();
        ClusterMembership::new(row_map, col_map, config)
    }

    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    pub fn num_clusters(&self) -> usize {
        self.config.num_clusters
    }

    pub fn num_clusters_per_row(&self) -> usize {
        self.config.clusters_per_row
    }

    pub fn num_clusters_per_column(&self) -> usize {
        self.config.clusters_per_col
    }

    fn check_cluster(&self, cluster: usize) -> Result<()> {
        if cluster == 0 || cluster > self.config.num_clusters {
            return Err(Error::ClusterOutOfRange {
                cluster,
                num_clusters: self.config.num_clusters,
            });
        }
        Ok(())
    }

    fn not_found(dimension: Dimension, name: &str) -> Error {
        Error::NotFound {
            dimension,
            name: name.to_string(),
        }
    }

    // ---- row side ------------------------------------------------------

    pub fn clusters_for_row(&self, row: &str) -> Result<BTreeSet<usize>> {
        self.rows
            .clusters(row)
            .ok_or_else(|| Self::not_found(Dimension::Row, row))
    }

    pub fn num_clusters_for_row(&self, row: &str) -> Result<usize> {
        self.rows
            .count(row)
            .ok_or_else(|| Self::not_found(Dimension::Row, row))
    }

    /// Rows of a cluster; the empty set for a memberless cluster, which
    /// is a normal state, not an error.
    pub fn rows_for_cluster(&self, cluster: usize) -> &BTreeSet<String> {
        self.cluster_rows.get(&cluster).unwrap_or(&NO_MEMBERS)
    }

    pub fn num_row_members(&self, cluster: usize) -> usize {
        self.rows_for_cluster(cluster).len()
    }

    pub fn is_row_in_cluster(&self, row: &str, cluster: usize) -> bool {
        self.rows.contains(row, cluster).unwrap_or(false)
    }

    /// The candidates not currently held by `row`, preserving order.
    pub fn clusters_not_in_row(&self, row: &str, candidates: &[usize]) -> Result<Vec<usize>> {
        let held = self.clusters_for_row(row)?;
        Ok(candidates
            .iter()
            .copied()
            .filter(|c| !held.contains(c))
            .collect())
    }

    /// Index of the first free membership slot for `row`; `None` when at
    /// capacity.
    pub fn first_free_slot_for_row(&self, row: &str) -> Result<Option<usize>> {
        self.rows
            .first_free_slot(row)
            .ok_or_else(|| Self::not_found(Dimension::Row, row))
    }

    /// Checked add; `force` bypasses the per-row limit and is reserved
    /// for post-adjustment. Adding an already-held cluster is a no-op.
    pub fn add_cluster_to_row(&mut self, row: &str, cluster: usize, force: bool) -> Result<()> {
        self.check_cluster(cluster)?;
        match self.rows.insert(row, cluster, force) {
            InsertOutcome::Added => {
                self.cluster_rows
                    .entry(cluster)
                    .or_default()
                    .insert(row.to_string());
                Ok(())
            }
            InsertOutcome::AlreadyMember => Ok(()),
            InsertOutcome::Full => Err(Error::CapacityExceeded {
                dimension: Dimension::Row,
                name: row.to_string(),
                limit: self.config.clusters_per_row,
            }),
        }
    }

    /// Removes `cluster` from `row` in both maps. Unknown rows are an
    /// error; a cluster the row does not hold is a quiet no-op.
    pub fn remove_cluster_from_row(&mut self, row: &str, cluster: usize) -> Result<()> {
        let removed = self
            .rows
            .remove(row, cluster)
            .ok_or_else(|| Self::not_found(Dimension::Row, row))?;
        if removed {
            if let Some(members) = self.cluster_rows.get_mut(&cluster) {
                members.remove(row);
            }
        }
        Ok(())
    }

    /// Replaces `old` with `new` for `row`, returning whether anything
    /// changed. No-op when `new == old`, when the row already holds
    /// `new`, or when it does not hold `old`.
    pub fn replace_row_cluster(&mut self, row: &str, old: usize, new: usize) -> Result<bool> {
        if new == old || self.is_row_in_cluster(row, new) {
            return Ok(false);
        }
        self.check_cluster(new)?;
        let replaced = self
            .rows
            .replace(row, old, new)
            .ok_or_else(|| Self::not_found(Dimension::Row, row))?;
        if replaced {
            if let Some(members) = self.cluster_rows.get_mut(&old) {
                members.remove(row);
            }
            self.cluster_rows
                .entry(new)
                .or_default()
                .insert(row.to_string());
        }
        Ok(replaced)
    }

    // ---- column side ---------------------------------------------------

    pub fn clusters_for_column(&self, column: &str) -> Result<BTreeSet<usize>> {
        self.cols
            .clusters(column)
            .ok_or_else(|| Self::not_found(Dimension::Column, column))
    }

    pub fn num_clusters_for_column(&self, column: &str) -> Result<usize> {
        self.cols
            .count(column)
            .ok_or_else(|| Self::not_found(Dimension::Column, column))
    }

    pub fn columns_for_cluster(&self, cluster: usize) -> &BTreeSet<String> {
        self.cluster_cols.get(&cluster).unwrap_or(&NO_MEMBERS)
    }

    pub fn num_column_members(&self, cluster: usize) -> usize {
        self.columns_for_cluster(cluster).len()
    }

    pub fn is_column_in_cluster(&self, column: &str, cluster: usize) -> bool {
        self.cols.contains(column, cluster).unwrap_or(false)
    }

    pub fn clusters_not_in_column(&self, column: &str, candidates: &[usize]) -> Result<Vec<usize>> {
        let held = self.clusters_for_column(column)?;
        Ok(candidates
            .iter()
            .copied()
            .filter(|c| !held.contains(c))
            .collect())
    }

    pub fn first_free_slot_for_column(&self, column: &str) -> Result<Option<usize>> {
        self.cols
            .first_free_slot(column)
            .ok_or_else(|| Self::not_found(Dimension::Column, column))
    }

    pub fn add_cluster_to_column(&mut self, column: &str, cluster: usize, force: bool) -> Result<()> {
        self.check_cluster(cluster)?;
        match self.cols.insert(column, cluster, force) {
            InsertOutcome::Added => {
                self.cluster_cols
                    .entry(cluster)
                    .or_default()
                    .insert(column.to_string());
                Ok(())
            }
            InsertOutcome::AlreadyMember => Ok(()),
            InsertOutcome::Full => Err(Error::CapacityExceeded {
                dimension: Dimension::Column,
                name: column.to_string(),
                limit: self.config.clusters_per_col,
            }),
        }
    }

    pub fn remove_cluster_from_column(&mut self, column: &str, cluster: usize) -> Result<()> {
        let removed = self
            .cols
            .remove(column, cluster)
            .ok_or_else(|| Self::not_found(Dimension::Column, column))?;
        if removed {
            if let Some(members) = self.cluster_cols.get_mut(&cluster) {
                members.remove(column);
            }
        }
        Ok(())
    }

    pub fn replace_column_cluster(&mut self, column: &str, old: usize, new: usize) -> Result<bool> {
        if new == old || self.is_column_in_cluster(column, new) {
            return Ok(false);
        }
        self.check_cluster(new)?;
        let replaced = self
            .cols
            .replace(column, old, new)
            .ok_or_else(|| Self::not_found(Dimension::Column, column))?;
        if replaced {
            if let Some(members) = self.cluster_cols.get_mut(&old) {
                members.remove(column);
            }
            self.cluster_cols
                .entry(new)
                .or_default()
                .insert(column.to_string());
        }
        Ok(replaced)
    }

    // ---- persistence ---------------------------------------------------

    /// The two forward maps in canonical form, for checkpointing. The
    /// inverse maps are derived state and are rebuilt on restore.
    pub fn snapshot(&self) -> (BTreeMap<String, Vec<usize>>, BTreeMap<String, Vec<usize>>) {
        (self.rows.snapshot(), self.cols.snapshot())
    }

    /// Verifies the bidirectional index invariant; meant for tests and
    /// debug assertions.
    pub fn is_consistent(&self) -> bool {
        for (row, _) in self.rows.snapshot() {
            let clusters = match self.rows.clusters(&row) {
                Some(c) => c,
                None => return false,
            };
            for cluster in clusters {
                if !self.rows_for_cluster(cluster).contains(&row) {
                    return false;
                }
            }
        }
        for (cluster, members) in &self.cluster_rows {
            for row in members {
                if !self.is_row_in_cluster(row, *cluster) {
                    return false;
                }
            }
        }
        for (col, _) in self.cols.snapshot() {
            let clusters = match self.cols.clusters(&col) {
                Some(c) => c,
                None => return false,
            };
            for cluster in clusters {
                if !self.columns_for_cluster(cluster).contains(&col) {
                    return false;
                }
            }
        }
        for (cluster, members) in &self.cluster_cols {
            for col in members {
                if !self.is_column_in_cluster(col, *cluster) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(storage: StorageKind) -> MembershipConfig {
        MembershipConfig {
            num_clusters: 4,
            clusters_per_row: 2,
            clusters_per_col: 2,
            storage,
            ..MembershipConfig::default()
        }
    }

    fn simple_membership(storage: StorageKind) -> ClusterMembership {
        let rows = BTreeMap::from([
            ("g0".to_string(), vec![1]),
            ("g1".to_string(), vec![1, 2]),
            ("g2".to_string(), vec![]),
        ]);
        let cols = BTreeMap::from([
            ("c0".to_string(), vec![1]),
            ("c1".to_string(), vec![2]),
        ]);
        ClusterMembership::new(rows, cols, test_config(storage)).unwrap()
    }

    #[test]
    fn test_forward_and_inverse_agree() {
        for storage in [StorageKind::Set, StorageKind::Slot] {
            let m = simple_membership(storage);
            assert_eq!(m.clusters_for_row("g1").unwrap(), BTreeSet::from([1, 2]));
            assert!(m.rows_for_cluster(1).contains("g0"));
            assert!(m.rows_for_cluster(1).contains("g1"));
            assert!(m.rows_for_cluster(3).is_empty());
            assert!(m.is_consistent());
        }
    }

    #[test]
    fn test_missing_row_is_error_empty_cluster_is_not() {
        let m = simple_membership(StorageKind::Set);
        assert!(m.clusters_for_row("nope").is_err());
        assert!(m.rows_for_cluster(4).is_empty());
    }

    #[test]
    fn test_capacity_enforced_and_force_bypasses() {
        for storage in [StorageKind::Set, StorageKind::Slot] {
            let mut m = simple_membership(storage);
            // g1 already holds 2 of 2 clusters
            let err = m.add_cluster_to_row("g1", 3, false).unwrap_err();
            assert!(matches!(err, Error::CapacityExceeded { .. }));

            m.add_cluster_to_row("g1", 3, true).unwrap();
            assert_eq!(m.num_clusters_for_row("g1").unwrap(), 3);
            assert!(m.rows_for_cluster(3).contains("g1"));
            assert!(m.is_consistent());
        }
    }

    #[test]
    fn test_add_already_held_is_noop() {
        for storage in [StorageKind::Set, StorageKind::Slot] {
            let mut m = simple_membership(storage);
            m.add_cluster_to_row("g0", 1, false).unwrap();
            assert_eq!(m.num_clusters_for_row("g0").unwrap(), 1);
        }
    }

    #[test]
    fn test_remove_updates_both_maps() {
        for storage in [StorageKind::Set, StorageKind::Slot] {
            let mut m = simple_membership(storage);
            m.remove_cluster_from_row("g1", 1).unwrap();
            assert_eq!(m.clusters_for_row("g1").unwrap(), BTreeSet::from([2]));
            assert!(!m.rows_for_cluster(1).contains("g1"));
            // removing a cluster the row does not hold is a no-op
            m.remove_cluster_from_row("g1", 1).unwrap();
            assert!(m.remove_cluster_from_row("ghost", 1).is_err());
            assert!(m.is_consistent());
        }
    }

    #[test]
    fn test_replace_is_atomic_and_self_replace_is_noop() {
        for storage in [StorageKind::Set, StorageKind::Slot] {
            let mut m = simple_membership(storage);
            assert!(m.replace_row_cluster("g0", 1, 3).unwrap());
            assert_eq!(m.clusters_for_row("g0").unwrap(), BTreeSet::from([3]));
            assert!(!m.rows_for_cluster(1).contains("g0"));
            assert!(m.rows_for_cluster(3).contains("g0"));

            // replacing a cluster with itself changes nothing
            assert!(!m.replace_row_cluster("g0", 3, 3).unwrap());
            assert_eq!(m.clusters_for_row("g0").unwrap(), BTreeSet::from([3]));

            // replacement with an already-held cluster changes nothing
            assert!(!m.replace_row_cluster("g1", 1, 2).unwrap());
            assert_eq!(m.clusters_for_row("g1").unwrap(), BTreeSet::from([1, 2]));
            assert!(m.is_consistent());
        }
    }

    #[test]
    fn test_slot_storage_tracks_free_slots() {
        let mut m = simple_membership(StorageKind::Slot);
        assert_eq!(m.first_free_slot_for_row("g0").unwrap(), Some(1));
        assert_eq!(m.first_free_slot_for_row("g1").unwrap(), None);
        assert_eq!(m.first_free_slot_for_row("g2").unwrap(), Some(0));

        // removal frees the slot in place
        m.remove_cluster_from_row("g1", 1).unwrap();
        assert_eq!(m.first_free_slot_for_row("g1").unwrap(), Some(0));
    }

    #[test]
    fn test_clusters_not_in_row_preserves_order() {
        let m = simple_membership(StorageKind::Set);
        let filtered = m.clusters_not_in_row("g1", &[4, 2, 3, 1]).unwrap();
        assert_eq!(filtered, vec![4, 3]);
    }

    #[test]
    fn test_cluster_out_of_range_rejected() {
        let mut m = simple_membership(StorageKind::Set);
        assert!(m.add_cluster_to_row("g2", 0, false).is_err());
        assert!(m.add_cluster_to_row("g2", 5, false).is_err());
    }

    #[test]
    fn test_snapshot_round_trip_across_representations() {
        let m = simple_membership(StorageKind::Set);
        let (rows, cols) = m.snapshot();

        // restore into the other representation; contract is identical
        let restored =
            ClusterMembership::new(rows, cols, test_config(StorageKind::Slot)).unwrap();
        for row in ["g0", "g1", "g2"] {
            assert_eq!(
                restored.clusters_for_row(row).unwrap(),
                m.clusters_for_row(row).unwrap()
            );
        }
        for cluster in 1..=4 {
            assert_eq!(restored.rows_for_cluster(cluster), m.rows_for_cluster(cluster));
            assert_eq!(
                restored.columns_for_cluster(cluster),
                m.columns_for_cluster(cluster)
            );
        }
        assert!(restored.is_consistent());
    }
}
