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

//! Run snapshots and run listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::{EvalStatus, EvaluationResult};

/// Aggregated metric summary for one score key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreChip {
    pub key: String,
    #[serde(flatten)]
    pub kind: ChipKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChipKind {
    /// Pass/fail metric: `passed` of `total` scores carried `passed == true`.
    Ratio { passed: usize, total: usize },
    /// Numeric metric averaged over `count` values.
    Avg { sum: f64, count: usize },
}

impl ScoreChip {
    pub fn ratio(key: impl Into<String>, passed: usize, total: usize) -> Self {
        Self {
            key: key.into(),
            kind: ChipKind::Ratio { passed, total },
        }
    }

    pub fn avg(key: impl Into<String>, sum: f64, count: usize) -> Self {
        Self {
            key: key.into(),
            kind: ChipKind::Avg { sum, count },
        }
    }

    /// Pass percentage for ratio chips, mean for average chips.
    pub fn value(&self) -> Option<f64> {
        match self.kind {
            ChipKind::Ratio { total: 0, .. } | ChipKind::Avg { count: 0, .. } => None,
            ChipKind::Ratio { passed, total } => Some(passed as f64 * 100.0 / total as f64),
            ChipKind::Avg { sum, count } => Some(sum / count as f64),
        }
    }

    pub fn label(&self) -> String {
        match (&self.kind, self.value()) {
            (ChipKind::Ratio { passed, total }, Some(pct)) => {
                format!("{}: {:.0}% ({}/{})", self.key, pct, passed, total)
            }
            (ChipKind::Avg { .. }, Some(avg)) => format!("{}: {:.2}", self.key, avg),
            (_, None) => format!("{}: -", self.key),
        }
    }
}

/// Full result set for one run at one point in time.
///
/// Replaced wholesale on every fetch; only the live reconciler patches one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub run_name: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default)]
    pub results: Vec<EvaluationResult>,
    /// Chips computed by the producer, shown as-is in comparison mode.
    #[serde(default)]
    pub score_chips: Vec<ScoreChip>,
    #[serde(default)]
    pub average_latency: Option<f64>,
    #[serde(default)]
    pub total_evaluations: usize,
    #[serde(default)]
    pub total_functions: usize,
    #[serde(default)]
    pub selected_total: Option<usize>,
}

impl RunSnapshot {
    pub fn new(run_id: impl Into<String>, results: Vec<EvaluationResult>) -> Self {
        let total_evaluations = results.len();
        Self {
            run_id: run_id.into(),
            results,
            total_evaluations,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = Some(name.into());
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session_name = Some(session.into());
        self
    }

    /// Display name, falling back to the run id.
    pub fn display_name(&self) -> &str {
        self.run_name.as_deref().unwrap_or(&self.run_id)
    }

    pub fn has_incomplete(&self) -> bool {
        self.results.iter().any(|r| r.status.is_incomplete())
    }

    /// Content fingerprint (blake3 over the canonical JSON encoding).
    ///
    /// Non-finite floats encode as `null`, so a run whose latency is NaN still
    /// fingerprints equal to itself.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(blake3::hash(&bytes).as_bytes())
    }
}

/// Lightweight run descriptor returned by run listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    #[serde(default)]
    pub run_name: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
    pub total_evaluations: usize,
    #[serde(default)]
    pub completed: usize,
    #[serde(default)]
    pub errors: usize,
    pub timestamp: DateTime<Utc>,
}

impl RunSummary {
    pub fn from_snapshot(snapshot: &RunSnapshot, timestamp: DateTime<Utc>) -> Self {
        let completed = snapshot
            .results
            .iter()
            .filter(|r| !r.status.is_incomplete())
            .count();
        let errors = snapshot
            .results
            .iter()
            .filter(|r| r.status == EvalStatus::Error || r.error().is_some())
            .count();

        Self {
            run_id: snapshot.run_id.clone(),
            run_name: snapshot.run_name.clone(),
            session_name: snapshot.session_name.clone(),
            total_evaluations: snapshot.results.len().max(snapshot.total_evaluations),
            completed,
            errors,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Score;
    use serde_json::json;

    #[test]
    fn test_chip_wire_format() {
        let chip = ScoreChip::ratio("acc", 3, 4);
        let value = serde_json::to_value(&chip).unwrap();
        assert_eq!(
            value,
            json!({"key": "acc", "type": "ratio", "passed": 3, "total": 4})
        );
        let back: ScoreChip = serde_json::from_value(value).unwrap();
        assert_eq!(back, chip);
    }

    #[test]
    fn test_chip_values() {
        assert_eq!(ScoreChip::ratio("acc", 3, 4).value(), Some(75.0));
        assert_eq!(ScoreChip::avg("f1", 1.5, 3).value(), Some(0.5));
        assert_eq!(ScoreChip::ratio("acc", 0, 0).value(), None);
        assert_eq!(ScoreChip::ratio("acc", 1, 2).label(), "acc: 50% (1/2)");
    }

    #[test]
    fn test_snapshot_document_parse() {
        let doc = json!({
            "run_id": "r1",
            "run_name": "baseline",
            "session_name": "default",
            "total_evaluations": 2,
            "results": [
                {"function": "t1", "status": "completed",
                 "result": {"scores": [{"key": "acc", "passed": true}], "latency": 0.2}},
                {"function": "t2", "status": "running", "result": {}}
            ]
        });
        let snapshot = serde_json::from_value::<RunSnapshot>(doc).unwrap();
        assert_eq!(snapshot.display_name(), "baseline");
        assert!(snapshot.has_incomplete());
        assert_eq!(snapshot.results[0].scores()[0], Score::pass_fail("acc", true));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = RunSnapshot::new("r1", vec![EvaluationResult::new("t1")]);
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.results[0].outcome.output = Some(json!("changed"));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_summary_counts() {
        let snapshot = RunSnapshot::new(
            "r1",
            vec![
                EvaluationResult::new("a"),
                EvaluationResult::new("b").with_status(EvalStatus::Running),
                EvaluationResult::new("c").with_status(EvalStatus::Error),
            ],
        );
        let summary = RunSummary::from_snapshot(&snapshot, Utc::now());
        assert_eq!(summary.total_evaluations, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.errors, 1);
    }
}
