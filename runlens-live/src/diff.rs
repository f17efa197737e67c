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

//! Snapshot diffing and minimal patching.

use runlens_core::{EvaluationResult, RunSnapshot};
use runlens_query::{IdentityKey, IdentityResolver};
use serde::Serialize;
use std::collections::HashMap;

/// What changed between two snapshots of the same run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    /// Rows present in both whose content differs.
    pub changed: Vec<IdentityKey>,
    pub added: Vec<IdentityKey>,
    pub removed: Vec<IdentityKey>,
    /// Same rows, different order.
    pub reordered: bool,
    /// Run-level fields (name, chips, totals) differ.
    pub metadata_changed: bool,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
            && !self.reordered
            && !self.metadata_changed
    }

    /// True when rows only changed content in place.
    pub fn is_in_place(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && !self.reordered
    }

    pub fn touched(&self) -> usize {
        self.changed.len() + self.added.len() + self.removed.len()
    }
}

fn metadata_differs(old: &RunSnapshot, new: &RunSnapshot) -> bool {
    old.run_name != new.run_name
        || old.session_name != new.session_name
        || old.score_chips != new.score_chips
        || old.average_latency != new.average_latency
        || old.total_evaluations != new.total_evaluations
        || old.total_functions != new.total_functions
        || old.selected_total != new.selected_total
}

/// Deep content diff keyed by row identity.
pub fn diff_snapshots(
    old: &RunSnapshot,
    new: &RunSnapshot,
    resolver: &dyn IdentityResolver,
) -> SnapshotDiff {
    let old_keys = resolver.resolve(&old.run_id, &old.results);
    // Keyed under the cached id; an incoming document may omit it.
    let new_keys = resolver.resolve(&old.run_id, &new.results);

    let old_rows: HashMap<&IdentityKey, &EvaluationResult> =
        old_keys.iter().zip(&old.results).collect();
    let new_rows: HashMap<&IdentityKey, &EvaluationResult> =
        new_keys.iter().zip(&new.results).collect();

    let mut diff = SnapshotDiff::default();
    for (key, row) in new_keys.iter().zip(&new.results) {
        match old_rows.get(key) {
            None => diff.added.push(key.clone()),
            Some(previous) if *previous != row => diff.changed.push(key.clone()),
            Some(_) => {}
        }
    }
    diff.removed = old_keys
        .iter()
        .filter(|k| !new_rows.contains_key(k))
        .cloned()
        .collect();
    diff.reordered = diff.added.is_empty() && diff.removed.is_empty() && old_keys != new_keys;
    diff.metadata_changed = metadata_differs(old, new);
    diff
}

/// Brings `local` up to date with `incoming`, touching only what differs.
///
/// When the row set and order are unchanged only the changed rows are
/// replaced; otherwise the row list is swapped wholesale.
pub fn patch_snapshot(
    local: &mut RunSnapshot,
    incoming: RunSnapshot,
    resolver: &dyn IdentityResolver,
) -> SnapshotDiff {
    let diff = diff_snapshots(local, &incoming, resolver);
    if diff.is_empty() {
        return diff;
    }

    let RunSnapshot {
        run_id: _,
        run_name,
        session_name,
        results,
        score_chips,
        average_latency,
        total_evaluations,
        total_functions,
        selected_total,
    } = incoming;

    if diff.is_in_place() {
        for (slot, row) in local.results.iter_mut().zip(results) {
            if *slot != row {
                *slot = row;
            }
        }
    } else {
        local.results = results;
    }

    if diff.metadata_changed {
        local.run_name = run_name;
        local.session_name = session_name;
        local.score_chips = score_chips;
        local.average_latency = average_latency;
        local.total_evaluations = total_evaluations;
        local.total_functions = total_functions;
        local.selected_total = selected_total;
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlens_core::{EvalStatus, ScoreChip};
    use runlens_query::OrdinalIdentity;

    fn run(rows: Vec<EvaluationResult>) -> RunSnapshot {
        RunSnapshot::new("r1", rows)
    }

    #[test]
    fn test_identical_snapshots_have_empty_diff() {
        let a = run(vec![EvaluationResult::new("t1"), EvaluationResult::new("t2")]);
        assert!(diff_snapshots(&a, &a.clone(), &OrdinalIdentity).is_empty());
    }

    #[test]
    fn test_status_change_detected() {
        let old = run(vec![
            EvaluationResult::new("t1").with_status(EvalStatus::Running),
            EvaluationResult::new("t2"),
        ]);
        let new = run(vec![
            EvaluationResult::new("t1")
                .with_status(EvalStatus::Completed)
                .with_output("done"),
            EvaluationResult::new("t2"),
        ]);
        let diff = diff_snapshots(&old, &new, &OrdinalIdentity);
        assert_eq!(diff.changed, vec![IdentityKey::from("t1::#0")]);
        assert!(diff.is_in_place());
    }

    #[test]
    fn test_added_removed_and_reordered() {
        let old = run(vec![EvaluationResult::new("a"), EvaluationResult::new("b")]);
        let new = run(vec![EvaluationResult::new("b"), EvaluationResult::new("c")]);
        let diff = diff_snapshots(&old, &new, &OrdinalIdentity);
        assert_eq!(diff.added, vec![IdentityKey::from("c::#0")]);
        assert_eq!(diff.removed, vec![IdentityKey::from("a::#0")]);
        assert!(!diff.reordered);

        let swapped = run(vec![EvaluationResult::new("b"), EvaluationResult::new("a")]);
        let diff = diff_snapshots(&old, &swapped, &OrdinalIdentity);
        assert!(diff.reordered);
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn test_patch_in_place_only_touches_changed_rows() {
        let mut local = run(vec![
            EvaluationResult::new("t1").with_status(EvalStatus::Running),
            EvaluationResult::new("t2").with_output("kept"),
        ]);
        let mut incoming = run(vec![
            EvaluationResult::new("t1").with_status(EvalStatus::Completed),
            EvaluationResult::new("t2").with_output("kept"),
        ]);
        incoming.score_chips = vec![ScoreChip::ratio("acc", 1, 2)];

        let diff = patch_snapshot(&mut local, incoming.clone(), &OrdinalIdentity);
        assert_eq!(diff.touched(), 1);
        assert!(diff.metadata_changed);
        assert_eq!(local, incoming);
    }

    #[test]
    fn test_patch_structural_change_replaces_rows() {
        let mut local = run(vec![EvaluationResult::new("a")]);
        let incoming = run(vec![EvaluationResult::new("a"), EvaluationResult::new("b")]);
        let diff = patch_snapshot(&mut local, incoming.clone(), &OrdinalIdentity);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(local.results, incoming.results);
    }
}
