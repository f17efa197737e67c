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

//! Indexed single-run rows with their precomputed search text.

use runlens_core::{render_value, EvaluationResult, RunSnapshot};
use serde::Serialize;

use crate::identity::{IdentityKey, IdentityResolver};

/// One result of the displayed run, with identity and original position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRow {
    pub key: IdentityKey,
    /// Position in the run before filtering or sorting.
    pub index: usize,
    pub result: EvaluationResult,
    #[serde(skip)]
    pub search_text: String,
}

/// Builds rows for every result of `snapshot`, in run order.
pub fn index_run(snapshot: &RunSnapshot, resolver: &dyn IdentityResolver) -> Vec<RunRow> {
    let keys = resolver.resolve(&snapshot.run_id, &snapshot.results);

    keys.into_iter()
        .zip(snapshot.results.iter())
        .enumerate()
        .map(|(index, (key, result))| RunRow {
            key,
            index,
            search_text: search_text(result),
            result: result.clone(),
        })
        .collect()
}

/// Lowercased text blob searched by the free-text filter.
///
/// Covers function, dataset, labels, input/reference/output, error,
/// annotation and each score's key, value and pass token.
pub fn search_text(result: &EvaluationResult) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(8 + result.scores().len());

    if let Some(function) = &result.function {
        parts.push(function.clone());
    }
    if let Some(dataset) = &result.dataset {
        parts.push(dataset.clone());
    }
    parts.extend(result.labels.iter().cloned());

    let outcome = &result.outcome;
    for value in [&outcome.input, &outcome.reference, &outcome.output]
        .into_iter()
        .flatten()
    {
        parts.push(render_value(value));
    }
    if let Some(error) = result.error() {
        parts.push(error.to_string());
    }
    if let Some(annotation) = result.annotation() {
        parts.push(annotation.to_string());
    }

    for score in result.scores() {
        parts.push(score.key.clone());
        if let Some(value) = &score.value {
            parts.push(value.to_string());
        }
        match score.passed {
            Some(true) => parts.push("passed".to_string()),
            Some(false) => parts.push("failed".to_string()),
            None => {}
        }
    }

    parts.join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OrdinalIdentity;
    use runlens_core::Score;
    use serde_json::json;

    #[test]
    fn test_search_text_covers_fields() {
        let row = EvaluationResult::new("test_Refund")
            .with_dataset("Support")
            .with_labels(["slow"])
            .with_input(json!({"q": "Where is my order"}))
            .with_output("Shipped")
            .with_error("Timeout")
            .with_annotation("check tone")
            .with_score(Score::pass_fail("accuracy", false));

        let text = search_text(&row);
        for needle in [
            "test_refund",
            "support",
            "slow",
            "where is my order",
            "shipped",
            "timeout",
            "check tone",
            "accuracy",
            "failed",
        ] {
            assert!(text.contains(needle), "missing {needle} in {text}");
        }
    }

    #[test]
    fn test_index_run_keeps_order() {
        let snapshot = RunSnapshot::new(
            "r1",
            vec![EvaluationResult::new("b"), EvaluationResult::new("a")],
        );
        let rows = index_run(&snapshot, &OrdinalIdentity);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].key.as_str(), "b::#0");
        assert_eq!(rows[1].key.as_str(), "a::#0");
    }
}
