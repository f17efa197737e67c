// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Run snapshot store
//!
//! Latest fetched snapshot per run id. Entries are replaced wholesale;
//! nothing here derives data from them.

use parking_lot::RwLock;
use runlens_core::RunSnapshot;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of [`SnapshotStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreUpdate {
    Inserted,
    Replaced,
    /// Same content as the cached snapshot; nothing was written.
    Unchanged,
}

impl StoreUpdate {
    pub fn changed(&self) -> bool {
        !matches!(self, StoreUpdate::Unchanged)
    }
}

#[derive(Debug)]
struct StoredRun {
    snapshot: Arc<RunSnapshot>,
    fingerprint: String,
}

/// Shared cache of run snapshots keyed by run id.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    runs: RwLock<HashMap<String, StoredRun>>,
    /// Bumped on every content change, so views know when to rebuild.
    generation: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `snapshot`, last write wins. Content with the same fingerprint
    /// is not rewritten.
    pub fn put(&self, snapshot: RunSnapshot) -> StoreUpdate {
        let fingerprint = snapshot.fingerprint();
        let mut runs = self.runs.write();
        let update = match runs.get(&snapshot.run_id) {
            Some(existing) if existing.fingerprint == fingerprint => {
                return StoreUpdate::Unchanged
            }
            Some(_) => StoreUpdate::Replaced,
            None => StoreUpdate::Inserted,
        };

        tracing::debug!(
            run_id = %snapshot.run_id,
            rows = snapshot.results.len(),
            ?update,
            "Stored run snapshot"
        );
        runs.insert(
            snapshot.run_id.clone(),
            StoredRun {
                snapshot: Arc::new(snapshot),
                fingerprint,
            },
        );
        self.generation.fetch_add(1, Ordering::Relaxed);
        update
    }

    pub fn get(&self, run_id: &str) -> Option<Arc<RunSnapshot>> {
        self.runs.read().get(run_id).map(|r| Arc::clone(&r.snapshot))
    }

    /// Content fingerprint of the cached snapshot.
    pub fn fingerprint(&self, run_id: &str) -> Option<String> {
        self.runs.read().get(run_id).map(|r| r.fingerprint.clone())
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.runs.read().contains_key(run_id)
    }

    /// Snapshots for `run_ids` in the given order, skipping unknown ids.
    pub fn get_many<S: AsRef<str>>(&self, run_ids: &[S]) -> Vec<Arc<RunSnapshot>> {
        let runs = self.runs.read();
        run_ids
            .iter()
            .filter_map(|id| runs.get(id.as_ref()).map(|r| Arc::clone(&r.snapshot)))
            .collect()
    }

    pub fn remove(&self, run_id: &str) -> bool {
        let removed = self.runs.write().remove(run_id).is_some();
        if removed {
            self.generation.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlens_core::{EvalStatus, EvaluationResult};

    fn snapshot(status: EvalStatus) -> RunSnapshot {
        RunSnapshot::new("r1", vec![EvaluationResult::new("t").with_status(status)])
    }

    #[test]
    fn test_put_reports_changes() {
        let store = SnapshotStore::new();
        assert_eq!(store.put(snapshot(EvalStatus::Running)), StoreUpdate::Inserted);
        let generation = store.generation();

        assert_eq!(store.put(snapshot(EvalStatus::Running)), StoreUpdate::Unchanged);
        assert_eq!(store.generation(), generation);

        assert_eq!(store.put(snapshot(EvalStatus::Completed)), StoreUpdate::Replaced);
        assert!(store.generation() > generation);
        assert_eq!(
            store.get("r1").unwrap().results[0].status,
            EvalStatus::Completed
        );
    }

    #[test]
    fn test_unchanged_put_keeps_same_allocation() {
        let store = SnapshotStore::new();
        store.put(snapshot(EvalStatus::Running));
        let before = store.get("r1").unwrap();
        store.put(snapshot(EvalStatus::Running));
        assert!(Arc::ptr_eq(&before, &store.get("r1").unwrap()));
    }

    #[test]
    fn test_non_finite_latency_counts_as_unchanged() {
        let store = SnapshotStore::new();
        let run = || {
            RunSnapshot::new(
                "r1",
                vec![EvaluationResult::new("t").with_latency(f64::NAN)],
            )
        };
        assert_eq!(store.put(run()), StoreUpdate::Inserted);
        assert_eq!(store.put(run()), StoreUpdate::Unchanged);
        assert_eq!(store.fingerprint("r1"), Some(run().fingerprint()));
        assert_eq!(store.fingerprint("missing"), None);
    }

    #[test]
    fn test_get_many_keeps_requested_order() {
        let store = SnapshotStore::new();
        store.put(RunSnapshot::new("a", vec![]));
        store.put(RunSnapshot::new("b", vec![]));

        let got = store.get_many(&["b", "missing", "a"]);
        let ids: Vec<&str> = got.iter().map(|s| s.run_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_remove() {
        let store = SnapshotStore::new();
        store.put(RunSnapshot::new("a", vec![]));
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.is_empty());
    }
}
