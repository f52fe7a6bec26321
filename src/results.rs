//! Persisted duplicate groups.
//!
//! Each completed scan replaces the previous snapshot wholesale. Loading
//! re-resolves every member against the live library, since the snapshot may
//! reference videos deleted after it was taken.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

use crate::detect::DuplicateGroup;
use crate::error::StoreError;
use crate::library::AssetStore;

/// All groups of one completed scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSnapshot {
    pub scan_date: DateTime<Utc>,
    pub groups: Vec<DuplicateGroup>,
}

/// Durable storage for the latest snapshot.
pub trait ResultStore {
    /// Delete every stored group and store `groups` in its place.
    fn replace_groups(&self, groups: &[DuplicateGroup], scan_date: DateTime<Utc>) -> Result<(), StoreError>;

    /// The stored snapshot as written, or `None` if no scan was saved yet.
    fn latest_groups(&self) -> Result<Option<ResultSnapshot>, StoreError>;
}

/// Replace the stored snapshot with `groups`, stamped now.
pub fn save(store: &dyn ResultStore, groups: &[DuplicateGroup]) -> Result<DateTime<Utc>, StoreError> {
    let scan_date = Utc::now();
    store.replace_groups(groups, scan_date)?;
    Ok(scan_date)
}

/// Load the stored snapshot, keeping only members still in the library and
/// dropping groups left with fewer than two.
pub fn load(store: &dyn ResultStore, library: &dyn AssetStore) -> Result<Option<ResultSnapshot>, StoreError> {
    let Some(mut snapshot) = store.latest_groups()? else {
        return Ok(None);
    };

    let live: HashSet<String> = library.list()?.into_iter().map(|a| a.id).collect();
    let before = snapshot.groups.len();
    snapshot.groups = resolve(snapshot.groups, &live);
    if snapshot.groups.len() != before {
        debug!("Pruned {} stale groups from snapshot", before - snapshot.groups.len());
    }

    Ok(Some(snapshot))
}

/// Remove `deleted` ids from every group and drop groups that fall below two
/// members. Returns how many groups were dropped.
pub fn prune_deleted(groups: &mut Vec<DuplicateGroup>, deleted: &[String]) -> usize {
    let before = groups.len();
    groups.retain_mut(|group| {
        for id in deleted {
            group.remove_member(id);
        }
        group.is_valid()
    });
    before - groups.len()
}

/// Prune `deleted` ids from the stored snapshot, keeping its scan date.
/// Returns how many groups were dropped.
pub fn remove_from_snapshot(store: &dyn ResultStore, deleted: &[String]) -> Result<usize, StoreError> {
    let Some(mut snapshot) = store.latest_groups()? else {
        return Ok(0);
    };
    let dropped = prune_deleted(&mut snapshot.groups, deleted);
    store.replace_groups(&snapshot.groups, snapshot.scan_date)?;
    Ok(dropped)
}

fn resolve(groups: Vec<DuplicateGroup>, live: &HashSet<String>) -> Vec<DuplicateGroup> {
    groups
        .into_iter()
        .filter_map(|mut group| {
            group.members.retain(|m| live.contains(m));
            group.is_valid().then_some(group)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::SimilarityType;
    use crate::library::{Asset, AssetMetadata, MemoryLibrary};
    use std::cell::RefCell;

    #[derive(Default)]
    struct MemoryResults {
        snapshot: RefCell<Option<ResultSnapshot>>,
    }

    impl ResultStore for MemoryResults {
        fn replace_groups(&self, groups: &[DuplicateGroup], scan_date: DateTime<Utc>) -> Result<(), StoreError> {
            *self.snapshot.borrow_mut() = Some(ResultSnapshot {
                scan_date,
                groups: groups.to_vec(),
            });
            Ok(())
        }

        fn latest_groups(&self) -> Result<Option<ResultSnapshot>, StoreError> {
            Ok(self.snapshot.borrow().clone())
        }
    }

    fn library(ids: &[&str]) -> MemoryLibrary {
        let mut lib = MemoryLibrary::new();
        for id in ids {
            lib.insert(
                Asset::new(*id, format!("/videos/{}.mp4", id)),
                AssetMetadata {
                    duration: 10.0,
                    width: 640,
                    height: 480,
                    file_size: 10,
                    created_at: None,
                    favorite: false,
                },
            );
        }
        lib
    }

    fn group(t: SimilarityType, ids: &[&str], score: f32) -> DuplicateGroup {
        DuplicateGroup::new(t, ids.iter().map(|s| s.to_string()).collect(), score)
    }

    #[test]
    fn test_load_without_snapshot() {
        let store = MemoryResults::default();
        assert!(load(&store, &library(&["a"])).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryResults::default();
        let lib = library(&["a", "b", "c", "d"]);
        let groups = vec![
            group(SimilarityType::ExactDuplicate, &["a", "b"], 0.0),
            group(SimilarityType::VisuallySimilar, &["c", "d"], 21.0),
        ];
        let scan_date = save(&store, &groups).unwrap();

        let snapshot = load(&store, &lib).unwrap().unwrap();
        assert_eq!(snapshot.scan_date, scan_date);
        assert_eq!(snapshot.groups, groups);
    }

    #[test]
    fn test_group_with_one_live_member_is_pruned() {
        let store = MemoryResults::default();
        save(
            &store,
            &[
                group(SimilarityType::NearDuplicate, &["a", "b", "c"], 0.0),
                group(SimilarityType::ExactDuplicate, &["d", "e", "f"], 0.0),
            ],
        )
        .unwrap();

        // b and c deleted; e deleted
        let lib = library(&["a", "d", "f"]);
        let snapshot = load(&store, &lib).unwrap().unwrap();
        assert_eq!(snapshot.groups.len(), 1);
        assert_eq!(snapshot.groups[0].members, vec!["d".to_string(), "f".to_string()]);
    }

    #[test]
    fn test_prune_deleted() {
        let mut groups = vec![
            group(SimilarityType::NearDuplicate, &["a", "b", "c"], 0.0),
            group(SimilarityType::ExactDuplicate, &["d", "e"], 0.0),
        ];
        let dropped = prune_deleted(&mut groups, &["b".to_string(), "e".to_string()]);
        assert_eq!(dropped, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_remove_from_snapshot_keeps_scan_date() {
        let store = MemoryResults::default();
        assert_eq!(remove_from_snapshot(&store, &["a".to_string()]).unwrap(), 0);

        let scan_date = save(
            &store,
            &[
                group(SimilarityType::ExactDuplicate, &["a", "b"], 0.0),
                group(SimilarityType::NearDuplicate, &["c", "d", "e"], 0.0),
            ],
        )
        .unwrap();

        let dropped = remove_from_snapshot(&store, &["a".to_string(), "d".to_string()]).unwrap();
        assert_eq!(dropped, 1);

        let stored = store.latest_groups().unwrap().unwrap();
        assert_eq!(stored.scan_date, scan_date);
        assert_eq!(stored.groups.len(), 1);
        assert_eq!(stored.groups[0].members, vec!["c".to_string(), "e".to_string()]);
    }
}
