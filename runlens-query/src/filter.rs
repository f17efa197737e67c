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

//! Filter engine
//!
//! Every rule must pass (AND). A row lacking the score a rule names fails
//! that rule. Malformed rules (blank key, non-finite literal) are inactive.
//! Comparison entries match when *any* populated slot matches, so a run in
//! which the case regressed is never hidden.

use runlens_core::{EvaluationResult, TriState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::comparison::ComparisonEntry;
use crate::rows::RunRow;

const NUMERIC_EPSILON: f64 = 1e-9;

/// Comparison operator of a numeric score rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
            Comparator::Equal => "==",
            Comparator::NotEqual => "!=",
        }
    }

    pub fn evaluate(&self, lhs: f64, rhs: f64) -> bool {
        let equal = (lhs - rhs).abs() <= NUMERIC_EPSILON;
        match self {
            Comparator::Gt => lhs > rhs && !equal,
            Comparator::Gte => lhs > rhs || equal,
            Comparator::Lt => lhs < rhs && !equal,
            Comparator::Lte => lhs < rhs || equal,
            Comparator::Equal => equal,
            Comparator::NotEqual => !equal,
        }
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Comparator::Gt),
            ">=" => Ok(Comparator::Gte),
            "<" => Ok(Comparator::Lt),
            "<=" => Ok(Comparator::Lte),
            "==" | "=" => Ok(Comparator::Equal),
            "!=" => Ok(Comparator::NotEqual),
            other => Err(format!("unknown comparator '{}'", other)),
        }
    }
}

/// Numeric rule on one score key, e.g. `accuracy >= 0.8`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRule {
    pub key: String,
    pub op: Comparator,
    pub value: f64,
}

impl ValueRule {
    pub fn new(key: impl Into<String>, op: Comparator, value: f64) -> Self {
        Self {
            key: key.into(),
            op,
            value,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.key.trim().is_empty() && self.value.is_finite()
    }

    /// Parses `key<op>number`; returns `None` for anything malformed.
    pub fn parse(expr: &str) -> Option<Self> {
        // Two-character operators first so `>=` is not read as `>`.
        for op in ["!=", ">=", "<=", "==", ">", "<", "="] {
            if let Some((key, value)) = expr.split_once(op) {
                let key = key.trim();
                let value = value.trim().parse::<f64>().ok()?;
                let rule = ValueRule::new(key, op.parse().ok()?, value);
                return rule.is_active().then_some(rule);
            }
        }
        None
    }

    fn admits(&self, result: &EvaluationResult) -> bool {
        result
            .scores()
            .iter()
            .filter(|s| s.key == self.key)
            .filter_map(|s| s.numeric_value())
            .any(|v| self.op.evaluate(v, self.value))
    }
}

impl std::fmt::Display for ValueRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.key, self.op.symbol(), self.value)
    }
}

/// Requires a score under `key` with exactly this pass value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassRule {
    pub key: String,
    pub passed: bool,
}

impl PassRule {
    pub fn new(key: impl Into<String>, passed: bool) -> Self {
        Self {
            key: key.into(),
            passed,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.key.trim().is_empty()
    }

    /// Parses `key=true|false|passed|failed|1|0`.
    pub fn parse(expr: &str) -> Option<Self> {
        let (key, value) = expr.split_once('=')?;
        let passed = match value.trim().to_ascii_lowercase().as_str() {
            "true" | "passed" | "pass" | "1" | "yes" => true,
            "false" | "failed" | "fail" | "0" | "no" => false,
            _ => return None,
        };
        let rule = PassRule::new(key.trim(), passed);
        rule.is_active().then_some(rule)
    }

    fn admits(&self, result: &EvaluationResult) -> bool {
        result
            .scores()
            .iter()
            .any(|s| s.key == self.key && s.passed == Some(self.passed))
    }
}

/// Independent include and exclude sets over dataset names or labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetFilter {
    #[serde(default)]
    pub include: BTreeSet<String>,
    #[serde(default)]
    pub exclude: BTreeSet<String>,
}

impl SetFilter {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn admits<'a, I>(&self, values: I) -> bool
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        if !self.include.is_empty() && !values.clone().into_iter().any(|v| self.include.contains(v))
        {
            return false;
        }
        !values.into_iter().any(|v| self.exclude.contains(v))
    }
}

/// Tri-state toggles on a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToggleField {
    Annotation,
    HasError,
    HasUrl,
    HasMessages,
}

/// The user's structured query (search text lives beside it in the session).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub value_rules: Vec<ValueRule>,
    #[serde(default)]
    pub pass_rules: Vec<PassRule>,
    #[serde(default)]
    pub annotation: TriState,
    #[serde(default)]
    pub datasets: SetFilter,
    #[serde(default)]
    pub labels: SetFilter,
    #[serde(default)]
    pub has_error: TriState,
    #[serde(default)]
    pub has_url: TriState,
    #[serde(default)]
    pub has_messages: TriState,
}

impl FilterState {
    /// True when no rule can exclude a row.
    pub fn is_empty(&self) -> bool {
        !self.value_rules.iter().any(ValueRule::is_active)
            && !self.pass_rules.iter().any(PassRule::is_active)
            && self.annotation.is_unset()
            && self.datasets.is_empty()
            && self.labels.is_empty()
            && self.has_error.is_unset()
            && self.has_url.is_unset()
            && self.has_messages.is_unset()
    }

    pub fn toggle(&mut self, field: ToggleField) -> TriState {
        let slot = match field {
            ToggleField::Annotation => &mut self.annotation,
            ToggleField::HasError => &mut self.has_error,
            ToggleField::HasUrl => &mut self.has_url,
            ToggleField::HasMessages => &mut self.has_messages,
        };
        *slot = slot.cycle();
        *slot
    }

    pub fn clear(&mut self) {
        *self = FilterState::default();
    }

    /// Structured rules only; search is checked separately.
    fn admits(&self, result: &EvaluationResult) -> bool {
        self.value_rules
            .iter()
            .filter(|r| r.is_active())
            .all(|r| r.admits(result))
            && self
                .pass_rules
                .iter()
                .filter(|r| r.is_active())
                .all(|r| r.admits(result))
            && self.annotation.admits(result.annotation().is_some())
            && self.datasets.admits(result.dataset.as_deref())
            && self.labels.admits(result.labels.iter().map(String::as_str))
            && self.has_error.admits(result.error().is_some())
            && self.has_url.admits(result.trace_url().is_some())
            && self.has_messages.admits(result.has_messages())
    }
}

/// Normalizes a raw search box value for matching.
pub fn normalize_search(search: &str) -> String {
    search.trim().to_lowercase()
}

/// Whether one result (with its precomputed search text) passes the filter.
///
/// `needle` must already be normalized with [`normalize_search`].
pub fn matches_result(
    result: &EvaluationResult,
    search_text: &str,
    filter: &FilterState,
    needle: &str,
) -> bool {
    (needle.is_empty() || search_text.contains(needle)) && filter.admits(result)
}

/// Anything the filter engine can decide on.
pub trait Filterable {
    /// `needle` must already be normalized with [`normalize_search`].
    fn matches_normalized(&self, filter: &FilterState, needle: &str) -> bool;
}

impl Filterable for RunRow {
    fn matches_normalized(&self, filter: &FilterState, needle: &str) -> bool {
        matches_result(&self.result, &self.search_text, filter, needle)
    }
}

impl Filterable for ComparisonEntry {
    fn matches_normalized(&self, filter: &FilterState, needle: &str) -> bool {
        self.populated()
            .any(|slot| matches_result(&slot.result, &slot.search_text, filter, needle))
    }
}

/// `matches(row, filterState, searchTerm)`.
pub fn matches<T: Filterable + ?Sized>(row: &T, filter: &FilterState, search: &str) -> bool {
    row.matches_normalized(filter, &normalize_search(search))
}

/// Rows passing the filter, in input order; the input is left untouched.
pub fn filter_rows<'a, T: Filterable>(
    rows: &'a [T],
    filter: &FilterState,
    search: &str,
) -> Vec<&'a T> {
    let needle = normalize_search(search);
    if needle.is_empty() && filter.is_empty() {
        return rows.iter().collect();
    }
    rows.iter()
        .filter(|row| row.matches_normalized(filter, &needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::build_matrix;
    use crate::identity::OrdinalIdentity;
    use crate::rows::index_run;
    use runlens_core::{RunSnapshot, Score, TraceData};
    use serde_json::json;

    fn row(result: EvaluationResult) -> RunRow {
        let snapshot = RunSnapshot::new("r", vec![result]);
        index_run(&snapshot, &OrdinalIdentity).remove(0)
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let r = row(EvaluationResult::default());
        assert!(matches(&r, &FilterState::default(), ""));
        assert!(matches(&r, &FilterState::default(), "   "));
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let r = row(EvaluationResult::new("test_refund").with_output("Order SHIPPED"));
        let filter = FilterState::default();
        assert!(matches(&r, &filter, "shipped"));
        assert!(matches(&r, &filter, "REFUND"));
        assert!(!matches(&r, &filter, "cancelled"));
    }

    #[test]
    fn test_value_rule_requires_key() {
        let r = row(EvaluationResult::new("t").with_score(Score::numeric("f1", 0.7)));
        let mut filter = FilterState::default();
        filter.value_rules.push(ValueRule::new("f1", Comparator::Gte, 0.7));
        assert!(matches(&r, &filter, ""));

        filter.value_rules.push(ValueRule::new("recall", Comparator::Lt, 10.0));
        assert!(!matches(&r, &filter, ""));
    }

    #[test]
    fn test_value_rule_coerces_text_scores() {
        let mut result = EvaluationResult::new("t");
        result.outcome.scores.push(
            serde_json::from_value(json!({"key": "rating", "value": "4"})).unwrap(),
        );
        let r = row(result);
        let mut filter = FilterState::default();
        filter.value_rules.push(ValueRule::new("rating", Comparator::Gt, 3.0));
        assert!(matches(&r, &filter, ""));
    }

    #[test]
    fn test_malformed_rules_inactive() {
        let r = row(EvaluationResult::new("t"));
        let mut filter = FilterState::default();
        filter.value_rules.push(ValueRule::new("", Comparator::Gt, 1.0));
        filter.value_rules.push(ValueRule::new("acc", Comparator::Gt, f64::NAN));
        filter.pass_rules.push(PassRule::new("  ", true));
        assert!(filter.is_empty());
        assert!(matches(&r, &filter, ""));
    }

    #[test]
    fn test_comparators() {
        assert!(Comparator::Gt.evaluate(2.0, 1.0));
        assert!(!Comparator::Gt.evaluate(1.0, 1.0));
        assert!(Comparator::Gte.evaluate(1.0, 1.0));
        assert!(Comparator::Lt.evaluate(0.5, 1.0));
        assert!(Comparator::Lte.evaluate(1.0, 1.0));
        assert!(Comparator::Equal.evaluate(0.1 + 0.2, 0.3));
        assert!(Comparator::NotEqual.evaluate(0.1, 0.3));
    }

    #[test]
    fn test_rule_parsing() {
        assert_eq!(
            ValueRule::parse("accuracy>=0.8"),
            Some(ValueRule::new("accuracy", Comparator::Gte, 0.8))
        );
        assert_eq!(
            ValueRule::parse("latency != 2"),
            Some(ValueRule::new("latency", Comparator::NotEqual, 2.0))
        );
        assert_eq!(ValueRule::parse("accuracy>high"), None);
        assert_eq!(ValueRule::parse(">=0.3"), None);
        assert_eq!(PassRule::parse("acc=passed"), Some(PassRule::new("acc", true)));
        assert_eq!(PassRule::parse("acc=maybe"), None);
    }

    #[test]
    fn test_annotation_tristate() {
        let annotated = row(EvaluationResult::new("a").with_annotation("looks off"));
        let plain = row(EvaluationResult::new("b"));
        let mut filter = FilterState::default();

        assert_eq!(filter.toggle(ToggleField::Annotation), TriState::Positive);
        assert!(matches(&annotated, &filter, ""));
        assert!(!matches(&plain, &filter, ""));

        assert_eq!(filter.toggle(ToggleField::Annotation), TriState::Negative);
        assert!(!matches(&annotated, &filter, ""));
        assert!(matches(&plain, &filter, ""));
    }

    #[test]
    fn test_dataset_and_label_sets() {
        let r = row(
            EvaluationResult::new("t")
                .with_dataset("qa")
                .with_labels(["slow", "prod"]),
        );
        let mut filter = FilterState::default();
        filter.datasets.include.insert("qa".into());
        filter.labels.exclude.insert("flaky".into());
        assert!(matches(&r, &filter, ""));

        filter.labels.exclude.insert("slow".into());
        assert!(!matches(&r, &filter, ""));

        let mut filter = FilterState::default();
        filter.datasets.include.insert("chat".into());
        assert!(!matches(&r, &filter, ""));

        let no_dataset = row(EvaluationResult::new("t"));
        assert!(!matches(&no_dataset, &filter, ""));
    }

    #[test]
    fn test_trace_tristates() {
        let traced = row(
            EvaluationResult::new("t")
                .with_error("boom")
                .with_trace(TraceData {
                    trace_url: Some("https://trace/1".into()),
                    messages: vec![json!({"role": "user"})],
                }),
        );
        let bare = row(EvaluationResult::new("u"));

        let mut filter = FilterState::default();
        filter.has_url = TriState::Positive;
        filter.has_messages = TriState::Positive;
        filter.has_error = TriState::Positive;
        assert!(matches(&traced, &filter, ""));
        assert!(!matches(&bare, &filter, ""));

        filter.has_error = TriState::Negative;
        assert!(!matches(&traced, &filter, ""));
    }

    #[test]
    fn test_comparison_any_match() {
        let a = RunSnapshot::new(
            "a",
            vec![EvaluationResult::new("t1").with_score(Score::pass_fail("acc", true))],
        );
        let b = RunSnapshot::new(
            "b",
            vec![EvaluationResult::new("t1").with_score(Score::pass_fail("acc", false))],
        );
        let matrix = build_matrix(&[&a, &b], &OrdinalIdentity);
        let entry = &matrix.entries[0];

        for passed in [true, false] {
            let mut filter = FilterState::default();
            filter.pass_rules.push(PassRule::new("acc", passed));
            assert!(matches(entry, &filter, ""));
        }

        let mut filter = FilterState::default();
        filter.pass_rules.push(PassRule::new("missing", true));
        assert!(!matches(entry, &filter, ""));
    }

    #[test]
    fn test_filter_rows_preserves_order_and_source() {
        let snapshot = RunSnapshot::new(
            "r",
            vec![
                EvaluationResult::new("keep_1"),
                EvaluationResult::new("drop"),
                EvaluationResult::new("keep_2"),
            ],
        );
        let rows = index_run(&snapshot, &OrdinalIdentity);
        let visible = filter_rows(&rows, &FilterState::default(), "keep");
        let names: Vec<_> = visible
            .iter()
            .map(|r| r.result.function.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["keep_1", "keep_2"]);
        assert_eq!(rows.len(), 3);
    }
}
