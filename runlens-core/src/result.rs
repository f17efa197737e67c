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

//! Per-case evaluation results as delivered by the execution engine.
//!
//! A result row carries its identity metadata (`function`, `dataset`,
//! `labels`, `status`) at the top level and the case outcome nested under
//! `result`, matching the run documents written by the runner.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Execution status of one case.
///
/// Rows without a status field come from finished runs and read as `Completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalStatus {
    NotStarted,
    Pending,
    Running,
    #[default]
    Completed,
    Error,
    Cancelled,
}

impl EvalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalStatus::NotStarted => "not_started",
            EvalStatus::Pending => "pending",
            EvalStatus::Running => "running",
            EvalStatus::Completed => "completed",
            EvalStatus::Error => "error",
            EvalStatus::Cancelled => "cancelled",
        }
    }

    /// True while the case may still change (`not_started`, `pending`, `running`).
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            EvalStatus::NotStarted | EvalStatus::Pending | EvalStatus::Running
        )
    }
}

impl std::fmt::Display for EvalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw score value: numeric, boolean or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ScoreValue {
    /// Numeric coercion: numbers as-is, booleans as 1/0, decimal strings parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScoreValue::Number(n) if n.is_finite() => Some(*n),
            ScoreValue::Number(_) => None,
            ScoreValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ScoreValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

impl std::fmt::Display for ScoreValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreValue::Bool(b) => write!(f, "{}", b),
            ScoreValue::Number(n) => write!(f, "{}", n),
            ScoreValue::Text(s) => f.write_str(s),
        }
    }
}

/// One named metric attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ScoreValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Score {
    pub fn numeric(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value: Some(ScoreValue::Number(value)),
            passed: None,
            notes: None,
        }
    }

    pub fn pass_fail(key: impl Into<String>, passed: bool) -> Self {
        Self {
            key: key.into(),
            value: None,
            passed: Some(passed),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn numeric_value(&self) -> Option<f64> {
        self.value.as_ref().and_then(ScoreValue::as_f64)
    }
}

/// Trace payload captured alongside a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<Value>,
}

/// The outcome half of a result row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub scores: Vec<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_data: Option<TraceData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// One test case's outcome within one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub status: EvalStatus,
    #[serde(default, rename = "result")]
    pub outcome: CaseOutcome,
}

impl EvaluationResult {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: Some(function.into()),
            ..Default::default()
        }
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: EvalStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_score(mut self, score: Score) -> Self {
        self.outcome.scores.push(score);
        self
    }

    pub fn with_latency(mut self, seconds: f64) -> Self {
        self.outcome.latency = Some(seconds);
        self
    }

    pub fn with_output(mut self, output: impl Into<Value>) -> Self {
        self.outcome.output = Some(output.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<Value>) -> Self {
        self.outcome.input = Some(input.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.outcome.error = Some(error.into());
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.outcome.annotation = Some(annotation.into());
        self
    }

    pub fn with_trace(mut self, trace: TraceData) -> Self {
        self.outcome.trace_data = Some(trace);
        self
    }

    pub fn scores(&self) -> &[Score] {
        &self.outcome.scores
    }

    /// First score under `key`, if any.
    pub fn score(&self, key: &str) -> Option<&Score> {
        self.outcome.scores.iter().find(|s| s.key == key)
    }

    pub fn latency(&self) -> Option<f64> {
        self.outcome.latency.filter(|l| l.is_finite())
    }

    pub fn error(&self) -> Option<&str> {
        non_empty(self.outcome.error.as_deref())
    }

    pub fn annotation(&self) -> Option<&str> {
        non_empty(self.outcome.annotation.as_deref())
    }

    pub fn trace_url(&self) -> Option<&str> {
        non_empty(
            self.outcome
                .trace_data
                .as_ref()
                .and_then(|t| t.trace_url.as_deref()),
        )
    }

    pub fn has_messages(&self) -> bool {
        self.outcome
            .trace_data
            .as_ref()
            .is_some_and(|t| !t.messages.is_empty())
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Renders a JSON payload for display: strings verbatim, everything else compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
