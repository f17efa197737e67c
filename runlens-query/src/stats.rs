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

//! Stats aggregation over a run or an arbitrary row subset.
//!
//! Aggregation is read-only: the chips and latency a producer attached to a
//! [`RunSnapshot`] are never overwritten here.

use runlens_core::{EvalStatus, EvaluationResult, RunSnapshot, ScoreChip};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Row counts by status bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub not_started: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub errors: usize,
    pub cancelled: usize,
}

impl Progress {
    pub fn record(&mut self, status: EvalStatus) {
        self.total += 1;
        match status {
            EvalStatus::NotStarted => self.not_started += 1,
            EvalStatus::Pending => self.pending += 1,
            EvalStatus::Running => self.running += 1,
            EvalStatus::Completed => self.completed += 1,
            EvalStatus::Error => self.errors += 1,
            EvalStatus::Cancelled => self.cancelled += 1,
        }
    }

    /// Rows that reached a terminal status (completed, error or cancelled).
    pub fn done(&self) -> usize {
        self.completed + self.errors + self.cancelled
    }

    pub fn incomplete(&self) -> usize {
        self.not_started + self.pending + self.running
    }

    pub fn is_finished(&self) -> bool {
        self.incomplete() == 0
    }

    /// Percent of rows in a terminal status; an empty run counts as finished.
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.done() as f64 * 100.0 / self.total as f64
    }
}

/// `summarize(run)` output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub chips: Vec<ScoreChip>,
    pub average_latency: Option<f64>,
    pub progress: Progress,
}

/// `summarize_filtered(rows)` output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilteredStats {
    pub chips: Vec<ScoreChip>,
    pub average_latency: Option<f64>,
    pub filtered_count: usize,
}

#[derive(Default)]
struct ChipAccumulator {
    has_pass_flag: bool,
    passed: usize,
    /// Rows carrying the key, flagged or not.
    rows: usize,
    sum: f64,
    count: usize,
}

impl ChipAccumulator {
    fn into_chip(self, key: String) -> Option<ScoreChip> {
        if self.has_pass_flag {
            Some(ScoreChip::ratio(key, self.passed, self.rows))
        } else if self.count > 0 {
            Some(ScoreChip::avg(key, self.sum, self.count))
        } else {
            None
        }
    }
}

/// One chip per distinct score key, in first-seen order.
///
/// A key with any `passed` flag becomes a ratio chip: rows that passed over
/// every row carrying the key. Other keys average their numeric values. Keys with neither are
/// skipped. Only the first score per key in each row counts.
pub fn compute_chips<'a, I>(results: I) -> Vec<ScoreChip>
where
    I: IntoIterator<Item = &'a EvaluationResult>,
{
    let mut order: Vec<String> = Vec::new();
    let mut acc: HashMap<String, ChipAccumulator> = HashMap::new();

    for result in results {
        let mut seen: HashSet<&str> = HashSet::new();
        for score in result.scores() {
            if !seen.insert(score.key.as_str()) {
                continue;
            }
            let entry = acc.entry(score.key.clone()).or_insert_with(|| {
                order.push(score.key.clone());
                ChipAccumulator::default()
            });
            entry.rows += 1;
            if let Some(passed) = score.passed {
                entry.has_pass_flag = true;
                if passed {
                    entry.passed += 1;
                }
            }
            if let Some(value) = score.numeric_value() {
                entry.sum += value;
                entry.count += 1;
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| acc.remove(&key).and_then(|a| a.into_chip(key)))
        .collect()
}

/// Mean latency over rows that report one.
pub fn average_latency<'a, I>(results: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a EvaluationResult>,
{
    let (sum, count) = results
        .into_iter()
        .filter_map(|r| r.latency())
        .filter(|l| l.is_finite())
        .fold((0.0, 0usize), |(sum, count), l| (sum + l, count + 1));
    (count > 0).then(|| sum / count as f64)
}

pub fn progress<'a, I>(results: I) -> Progress
where
    I: IntoIterator<Item = &'a EvaluationResult>,
{
    let mut progress = Progress::default();
    for result in results {
        progress.record(result.status);
    }
    progress
}

/// Full-run summary for the single-run view.
pub fn summarize(run: &RunSnapshot) -> RunStats {
    RunStats {
        chips: compute_chips(&run.results),
        average_latency: average_latency(&run.results),
        progress: progress(&run.results),
    }
}

/// Summary over an arbitrary subset, typically the filtered rows.
pub fn summarize_filtered<'a, I>(results: I) -> FilteredStats
where
    I: IntoIterator<Item = &'a EvaluationResult>,
    I::IntoIter: Clone,
{
    let iter = results.into_iter();
    FilteredStats {
        chips: compute_chips(iter.clone()),
        average_latency: average_latency(iter.clone()),
        filtered_count: iter.count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlens_core::{ChipKind, Score};

    #[test]
    fn test_progress_counts_terminal_statuses() {
        let mut results: Vec<EvaluationResult> = (0..7)
            .map(|i| EvaluationResult::new(format!("t{i}")))
            .collect();
        results[5].status = EvalStatus::Error;
        results[6].status = EvalStatus::Cancelled;
        results.extend(
            (7..10).map(|i| EvaluationResult::new(format!("t{i}")).with_status(EvalStatus::NotStarted)),
        );

        let stats = summarize(&RunSnapshot::new("r", results));
        assert_eq!(stats.progress.total, 10);
        assert_eq!(stats.progress.done(), 7);
        assert_eq!(stats.progress.incomplete(), 3);
        assert!((stats.progress.percent_complete() - 70.0).abs() < 1e-9);
        assert!(!stats.progress.is_finished());
    }

    #[test]
    fn test_ratio_chip_only_counts_rows_with_key() {
        let results = vec![
            EvaluationResult::new("a").with_score(Score::pass_fail("acc", true)),
            EvaluationResult::new("b").with_score(Score::pass_fail("acc", false)),
            EvaluationResult::new("c"),
            EvaluationResult::new("d").with_score(Score::numeric("f1", 0.5)),
        ];
        let chips = compute_chips(&results);
        assert_eq!(chips[0], ScoreChip::ratio("acc", 1, 2));
        assert_eq!(chips[1], ScoreChip::avg("f1", 0.5, 1));
    }

    #[test]
    fn test_any_pass_flag_makes_ratio_over_all_rows_with_key() {
        let results = vec![
            EvaluationResult::new("a").with_score(Score::numeric("judge", 0.9)),
            EvaluationResult::new("b").with_score(Score {
                passed: Some(true),
                ..Score::numeric("judge", 0.4)
            }),
            EvaluationResult::new("c").with_score(Score::numeric("other", 1.0)),
        ];
        let chips = compute_chips(&results);
        assert!(matches!(
            chips[0].kind,
            ChipKind::Ratio { passed: 1, total: 2 }
        ));
        assert_eq!(chips[0].label(), "judge: 50% (1/2)");
    }

    #[test]
    fn test_duplicate_key_in_row_counted_once() {
        let results = vec![EvaluationResult::new("a")
            .with_score(Score::pass_fail("acc", true))
            .with_score(Score::pass_fail("acc", false))];
        assert_eq!(compute_chips(&results), vec![ScoreChip::ratio("acc", 1, 1)]);
    }

    #[test]
    fn test_average_latency_skips_missing() {
        let results = vec![
            EvaluationResult::new("a").with_latency(1.0),
            EvaluationResult::new("b"),
            EvaluationResult::new("c").with_latency(3.0),
        ];
        assert_eq!(average_latency(&results), Some(2.0));
        assert_eq!(average_latency(&results[1..2]), None);
    }

    #[test]
    fn test_summarize_filtered_subset() {
        let results = vec![
            EvaluationResult::new("a")
                .with_latency(1.0)
                .with_score(Score::pass_fail("acc", true)),
            EvaluationResult::new("b")
                .with_latency(5.0)
                .with_score(Score::pass_fail("acc", false)),
        ];
        let subset: Vec<&EvaluationResult> = results.iter().take(1).collect();
        let stats = summarize_filtered(subset.iter().copied());
        assert_eq!(stats.filtered_count, 1);
        assert_eq!(stats.average_latency, Some(1.0));
        assert_eq!(stats.chips, vec![ScoreChip::ratio("acc", 1, 1)]);
    }

    #[test]
    fn test_summarize_leaves_snapshot_untouched() {
        let mut run = RunSnapshot::new(
            "r",
            vec![EvaluationResult::new("a").with_score(Score::pass_fail("acc", false))],
        );
        run.score_chips = vec![ScoreChip::ratio("acc", 9, 10)];
        run.average_latency = Some(4.2);
        let before = run.clone();

        let stats = summarize(&run);
        assert_eq!(stats.chips, vec![ScoreChip::ratio("acc", 0, 1)]);
        assert_eq!(run, before);
    }

    #[test]
    fn test_empty_run_is_finished() {
        let stats = summarize(&RunSnapshot::new("r", vec![]));
        assert!(stats.progress.is_finished());
        assert!(stats.chips.is_empty());
        assert_eq!(stats.average_latency, None);
    }
}
