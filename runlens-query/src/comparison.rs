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

//! Comparison matrix: one logical row per identity, one slot per run.
//!
//! The matrix is a pure function of its input snapshots. It is rebuilt in
//! full whenever any participating snapshot changes; nothing is cached.

use runlens_core::{EvaluationResult, RunSnapshot, ScoreChip, MAX_COMPARISON_RUNS};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::identity::{IdentityKey, IdentityResolver};
use crate::rows::search_text;

/// Per-run column header, carrying the stats the producer attached to the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunColumn {
    pub run_id: String,
    pub run_name: String,
    pub score_chips: Vec<ScoreChip>,
    pub average_latency: Option<f64>,
}

/// One run's result for a comparison entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSlot {
    pub run_id: String,
    /// Row index of the result within its own run.
    pub index: usize,
    pub result: EvaluationResult,
    #[serde(skip)]
    pub search_text: String,
}

/// One logical test case merged across the compared runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonEntry {
    pub key: IdentityKey,
    /// Position in the matrix's key order; the sort tiebreaker.
    pub position: usize,
    pub function: Option<String>,
    pub dataset: Option<String>,
    pub labels: Vec<String>,
    /// Aligned with [`ComparisonMatrix::runs`]; `None` means "no data".
    pub slots: Vec<Option<RunSlot>>,
}

impl ComparisonEntry {
    /// First populated slot in comparison-set order.
    pub fn first_slot(&self) -> Option<&RunSlot> {
        self.slots.iter().flatten().next()
    }

    pub fn slot(&self, run_id: &str) -> Option<&RunSlot> {
        self.slots.iter().flatten().find(|s| s.run_id == run_id)
    }

    pub fn populated(&self) -> impl Iterator<Item = &RunSlot> {
        self.slots.iter().flatten()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonMatrix {
    pub runs: Vec<RunColumn>,
    /// Entries in ascending identity-key order.
    pub entries: Vec<ComparisonEntry>,
}

impl ComparisonMatrix {
    pub fn run_ids(&self) -> impl Iterator<Item = &str> {
        self.runs.iter().map(|r| r.run_id.as_str())
    }
}

/// Merges up to [`MAX_COMPARISON_RUNS`] snapshots into a comparison matrix.
///
/// Snapshots past the limit are ignored. Shared metadata for each entry comes
/// from the first run (in input order) that has the case.
pub fn build_matrix(
    snapshots: &[&RunSnapshot],
    resolver: &dyn IdentityResolver,
) -> ComparisonMatrix {
    if snapshots.len() > MAX_COMPARISON_RUNS {
        tracing::warn!(
            requested = snapshots.len(),
            max = MAX_COMPARISON_RUNS,
            "Too many runs for comparison, extra runs ignored"
        );
    }
    let snapshots = &snapshots[..snapshots.len().min(MAX_COMPARISON_RUNS)];
    let width = snapshots.len();

    let runs: Vec<RunColumn> = snapshots
        .iter()
        .map(|s| RunColumn {
            run_id: s.run_id.clone(),
            run_name: s.display_name().to_string(),
            score_chips: s.score_chips.clone(),
            average_latency: s.average_latency,
        })
        .collect();

    let mut merged: BTreeMap<IdentityKey, Vec<Option<RunSlot>>> = BTreeMap::new();

    for (column, snapshot) in snapshots.iter().enumerate() {
        let keys = resolver.resolve(&snapshot.run_id, &snapshot.results);
        for (index, (key, result)) in keys.into_iter().zip(&snapshot.results).enumerate() {
            let slots = merged.entry(key).or_insert_with(|| vec![None; width]);
            // Duplicate keys within one run cannot happen with an ordinal
            // resolver; with a custom one the first row wins.
            if slots[column].is_none() {
                slots[column] = Some(RunSlot {
                    run_id: snapshot.run_id.clone(),
                    index,
                    search_text: search_text(result),
                    result: result.clone(),
                });
            }
        }
    }

    let entries = merged
        .into_iter()
        .enumerate()
        .map(|(position, (key, slots))| {
            let (function, dataset, labels) = match slots.iter().flatten().next() {
                Some(slot) => (
                    slot.result.function.clone(),
                    slot.result.dataset.clone(),
                    slot.result.labels.clone(),
                ),
                None => (None, None, Vec::new()),
            };
            ComparisonEntry {
                function,
                dataset,
                labels,
                key,
                position,
                slots,
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        runs = runs.len(),
        entries = entries.len(),
        "Built comparison matrix"
    );

    ComparisonMatrix { runs, entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OrdinalIdentity;
    use runlens_core::Score;

    fn run(id: &str, rows: Vec<EvaluationResult>) -> RunSnapshot {
        RunSnapshot::new(id, rows)
    }

    #[test]
    fn test_aligns_by_identity_not_position() {
        let a = run(
            "a",
            vec![EvaluationResult::new("t1"), EvaluationResult::new("t2")],
        );
        let b = run(
            "b",
            vec![EvaluationResult::new("t2"), EvaluationResult::new("t1")],
        );

        let matrix = build_matrix(&[&a, &b], &OrdinalIdentity);
        assert_eq!(matrix.entries.len(), 2);

        let t1 = &matrix.entries[0];
        assert_eq!(t1.function.as_deref(), Some("t1"));
        assert_eq!(t1.slot("a").unwrap().index, 0);
        assert_eq!(t1.slot("b").unwrap().index, 1);
    }

    #[test]
    fn test_missing_case_leaves_empty_slot() {
        let a = run(
            "a",
            vec![EvaluationResult::new("t1"), EvaluationResult::new("only_a")],
        );
        let b = run("b", vec![EvaluationResult::new("t1")]);

        let matrix = build_matrix(&[&a, &b], &OrdinalIdentity);
        let only_a = matrix
            .entries
            .iter()
            .find(|e| e.function.as_deref() == Some("only_a"))
            .unwrap();
        assert!(only_a.slots[0].is_some());
        assert!(only_a.slots[1].is_none());
    }

    #[test]
    fn test_metadata_from_first_populated_run() {
        let a = run("a", vec![]);
        let b = run(
            "b",
            vec![EvaluationResult::new("t1").with_labels(["from_b"])],
        );
        let c = run(
            "c",
            vec![EvaluationResult::new("t1").with_labels(["from_c"])],
        );

        let matrix = build_matrix(&[&a, &b, &c], &OrdinalIdentity);
        assert_eq!(matrix.entries[0].labels, vec!["from_b"]);
        assert_eq!(matrix.entries[0].first_slot().unwrap().run_id, "b");
    }

    #[test]
    fn test_entries_sorted_by_key() {
        let a = run(
            "a",
            vec![
                EvaluationResult::new("zeta"),
                EvaluationResult::new("alpha"),
                EvaluationResult::new("mid"),
            ],
        );
        let b = run("b", vec![EvaluationResult::new("beta")]);
        let matrix = build_matrix(&[&a, &b], &OrdinalIdentity);
        let keys: Vec<&str> = matrix.entries.iter().map(|e| e.key.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(matrix
            .entries
            .iter()
            .enumerate()
            .all(|(i, e)| e.position == i));
    }

    #[test]
    fn test_runs_past_limit_ignored() {
        let runs: Vec<RunSnapshot> = (0..5)
            .map(|i| run(&format!("r{i}"), vec![EvaluationResult::new("t")]))
            .collect();
        let refs: Vec<&RunSnapshot> = runs.iter().collect();
        let matrix = build_matrix(&refs, &OrdinalIdentity);
        assert_eq!(matrix.runs.len(), MAX_COMPARISON_RUNS);
        assert_eq!(matrix.entries[0].slots.len(), MAX_COMPARISON_RUNS);
    }

    #[test]
    fn test_run_columns_carry_attached_stats() {
        let mut a = run(
            "a",
            vec![EvaluationResult::new("t").with_score(Score::pass_fail("acc", true))],
        );
        a.score_chips = vec![ScoreChip::ratio("acc", 1, 1)];
        a.average_latency = Some(0.3);
        let b = run("b", vec![]).with_name("candidate");

        let matrix = build_matrix(&[&a, &b], &OrdinalIdentity);
        assert_eq!(matrix.runs[0].score_chips, a.score_chips);
        assert_eq!(matrix.runs[0].average_latency, Some(0.3));
        assert_eq!(matrix.runs[1].run_name, "candidate");
    }

    #[test]
    fn test_unnamed_rows_do_not_align_across_runs() {
        let a = run(
            "a",
            vec![EvaluationResult::default().with_output("case from A")],
        );
        let b = run(
            "b",
            vec![EvaluationResult::default().with_output("unrelated case from B")],
        );

        let matrix = build_matrix(&[&a, &b], &OrdinalIdentity);
        assert_eq!(matrix.entries.len(), 2);
        for entry in &matrix.entries {
            assert_eq!(entry.populated().count(), 1);
        }
    }
}
