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

//! Multi-key sort with deterministic tie-breaking.
//!
//! Keys are compared in priority order; the first non-equal comparison
//! decides. Full ties fall back to the row's original position. Missing
//! values sort after present ones in either direction.

use runlens_core::{render_value, EvaluationResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::comparison::ComparisonEntry;
use crate::rows::RunRow;

/// A sortable table column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Function,
    Dataset,
    Labels,
    Input,
    Output,
    Reference,
    Error,
    /// First score of the row.
    Scores,
    /// A specific score key.
    Score(String),
    Latency,
    Status,
    Annotation,
}

impl SortColumn {
    /// How values of this column compare unless told otherwise.
    pub fn default_value_type(&self) -> ValueType {
        match self {
            SortColumn::Scores | SortColumn::Score(_) | SortColumn::Latency => ValueType::Number,
            _ => ValueType::Text,
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortColumn::Function => f.write_str("function"),
            SortColumn::Dataset => f.write_str("dataset"),
            SortColumn::Labels => f.write_str("labels"),
            SortColumn::Input => f.write_str("input"),
            SortColumn::Output => f.write_str("output"),
            SortColumn::Reference => f.write_str("reference"),
            SortColumn::Error => f.write_str("error"),
            SortColumn::Scores => f.write_str("scores"),
            SortColumn::Score(key) => write!(f, "score.{}", key),
            SortColumn::Latency => f.write_str("latency"),
            SortColumn::Status => f.write_str("status"),
            SortColumn::Annotation => f.write_str("annotation"),
        }
    }
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(key) = s.strip_prefix("score.") {
            if key.is_empty() {
                return Err("score column needs a key".to_string());
            }
            return Ok(SortColumn::Score(key.to_string()));
        }
        match s.to_ascii_lowercase().as_str() {
            "function" | "name" => Ok(SortColumn::Function),
            "dataset" => Ok(SortColumn::Dataset),
            "labels" => Ok(SortColumn::Labels),
            "input" => Ok(SortColumn::Input),
            "output" => Ok(SortColumn::Output),
            "reference" => Ok(SortColumn::Reference),
            "error" => Ok(SortColumn::Error),
            "scores" => Ok(SortColumn::Scores),
            "latency" => Ok(SortColumn::Latency),
            "status" => Ok(SortColumn::Status),
            "annotation" => Ok(SortColumn::Annotation),
            other => Err(format!("unknown sort column '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Number,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub column: SortColumn,
    pub direction: SortDirection,
    pub value_type: ValueType,
}

impl SortKey {
    pub fn asc(column: SortColumn) -> Self {
        Self {
            value_type: column.default_value_type(),
            column,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: SortColumn) -> Self {
        Self {
            direction: SortDirection::Desc,
            ..Self::asc(column)
        }
    }

    /// Parses `column[:asc|desc]`, e.g. `latency:desc` or `score.accuracy`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (column, direction) = match raw.rsplit_once(':') {
            Some((column, "desc")) => (column, SortDirection::Desc),
            Some((column, "asc")) => (column, SortDirection::Asc),
            _ => (raw, SortDirection::Asc),
        };
        let column: SortColumn = column.parse()?;
        Ok(Self {
            value_type: column.default_value_type(),
            column,
            direction,
        })
    }
}

/// Ordered sort keys; empty means original run order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    #[serde(default)]
    pub keys: Vec<SortKey>,
}

impl SortState {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn then(mut self, key: SortKey) -> Self {
        self.keys.push(key);
        self
    }

    /// Plain header click: ascending, then descending, then unsorted.
    pub fn toggle(&mut self, column: SortColumn) {
        match self.keys.as_slice() {
            [only] if only.column == column && only.direction == SortDirection::Asc => {
                self.keys[0].direction = SortDirection::Desc;
            }
            [only] if only.column == column => self.keys.clear(),
            _ => self.keys = vec![SortKey::asc(column)],
        }
    }

    /// Modified header click: cycles one column inside a multi-key sort.
    pub fn toggle_multi(&mut self, column: SortColumn) {
        match self.keys.iter().position(|k| k.column == column) {
            None => self.keys.push(SortKey::asc(column)),
            Some(i) if self.keys[i].direction == SortDirection::Asc => {
                self.keys[i].direction = SortDirection::Desc;
            }
            Some(i) => {
                self.keys.remove(i);
            }
        }
    }
}

/// Extracted cell value used for ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Number(f64),
    Text(String),
    Empty,
}

impl SortValue {
    fn text(s: Option<&str>) -> Self {
        match s {
            Some(s) if !s.is_empty() => SortValue::Text(s.to_lowercase()),
            _ => SortValue::Empty,
        }
    }

    fn number(n: Option<f64>) -> Self {
        n.filter(|n| n.is_finite())
            .map_or(SortValue::Empty, SortValue::Number)
    }

    fn coerce(self, value_type: ValueType) -> Self {
        match (self, value_type) {
            (SortValue::Text(s), ValueType::Number) => SortValue::number(s.trim().parse().ok()),
            (SortValue::Number(n), ValueType::Text) => SortValue::Text(n.to_string()),
            (value, _) => value,
        }
    }

    fn compare(&self, other: &SortValue, direction: SortDirection) -> Ordering {
        match (self, other) {
            (SortValue::Empty, SortValue::Empty) => Ordering::Equal,
            (SortValue::Empty, _) => Ordering::Greater,
            (_, SortValue::Empty) => Ordering::Less,
            (SortValue::Number(a), SortValue::Number(b)) => direction.apply(a.total_cmp(b)),
            (SortValue::Text(a), SortValue::Text(b)) => direction.apply(a.cmp(b)),
            // Mixed kinds only arise from custom rows; numbers first.
            (SortValue::Number(_), SortValue::Text(_)) => direction.apply(Ordering::Less),
            (SortValue::Text(_), SortValue::Number(_)) => direction.apply(Ordering::Greater),
        }
    }
}

/// Column value of a single result.
pub fn result_value(result: &EvaluationResult, column: &SortColumn) -> SortValue {
    let outcome = &result.outcome;
    match column {
        SortColumn::Function => SortValue::text(result.function.as_deref()),
        SortColumn::Dataset => SortValue::text(result.dataset.as_deref()),
        SortColumn::Labels => SortValue::text(Some(result.labels.join(", ").as_str())),
        SortColumn::Input => SortValue::text(outcome.input.as_ref().map(render_value).as_deref()),
        SortColumn::Output => {
            SortValue::text(outcome.output.as_ref().map(render_value).as_deref())
        }
        SortColumn::Reference => {
            SortValue::text(outcome.reference.as_ref().map(render_value).as_deref())
        }
        SortColumn::Error => SortValue::text(result.error()),
        SortColumn::Scores => score_value(result.scores().first()),
        SortColumn::Score(key) => score_value(result.score(key)),
        SortColumn::Latency => SortValue::number(result.latency()),
        SortColumn::Status => SortValue::text(Some(result.status.as_str())),
        SortColumn::Annotation => SortValue::text(result.annotation()),
    }
}

fn score_value(score: Option<&runlens_core::Score>) -> SortValue {
    match score {
        Some(s) => match (s.numeric_value(), s.passed) {
            (Some(v), _) => SortValue::Number(v),
            (None, Some(passed)) => SortValue::Number(if passed { 1.0 } else { 0.0 }),
            (None, None) => SortValue::Empty,
        },
        None => SortValue::Empty,
    }
}

/// Anything the sort engine can order.
pub trait Sortable {
    fn sort_value(&self, column: &SortColumn) -> SortValue;

    /// Position before filtering; the final tiebreaker.
    fn original_index(&self) -> usize;
}

impl Sortable for RunRow {
    fn sort_value(&self, column: &SortColumn) -> SortValue {
        result_value(&self.result, column)
    }

    fn original_index(&self) -> usize {
        self.index
    }
}

impl Sortable for ComparisonEntry {
    fn sort_value(&self, column: &SortColumn) -> SortValue {
        match column {
            SortColumn::Function => SortValue::text(self.function.as_deref()),
            SortColumn::Dataset => SortValue::text(self.dataset.as_deref()),
            SortColumn::Labels => SortValue::text(Some(self.labels.join(", ").as_str())),
            other => self
                .first_slot()
                .map_or(SortValue::Empty, |slot| result_value(&slot.result, other)),
        }
    }

    fn original_index(&self) -> usize {
        self.position
    }
}

fn key_values<T: Sortable + ?Sized>(row: &T, state: &SortState) -> Vec<SortValue> {
    state
        .keys
        .iter()
        .map(|k| row.sort_value(&k.column).coerce(k.value_type))
        .collect()
}

fn compare_values(
    a: &[SortValue],
    a_index: usize,
    b: &[SortValue],
    b_index: usize,
    state: &SortState,
) -> Ordering {
    a.iter()
        .zip(b)
        .zip(&state.keys)
        .map(|((x, y), key)| x.compare(y, key.direction))
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a_index.cmp(&b_index))
}

/// Total order between two rows under `state`.
pub fn compare_rows<T: Sortable + ?Sized>(a: &T, b: &T, state: &SortState) -> Ordering {
    compare_values(
        &key_values(a, state),
        a.original_index(),
        &key_values(b, state),
        b.original_index(),
        state,
    )
}

/// Reorders row references; the rows themselves are never touched.
pub fn sort_rows<T: Sortable>(rows: &mut Vec<&T>, state: &SortState) {
    let mut decorated: Vec<(Vec<SortValue>, usize, &T)> = rows
        .drain(..)
        .map(|row| (key_values(row, state), row.original_index(), row))
        .collect();

    decorated.sort_by(|(a, ai, _), (b, bi, _)| compare_values(a, *ai, b, *bi, state));

    rows.extend(decorated.into_iter().map(|(_, _, row)| row));
}
