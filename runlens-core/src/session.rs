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

//! Session-scoped UI state shared between the host and the query engine.
//!
//! Nothing here touches storage; the host owns persistence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Result, RunlensError};
use crate::snapshot::RunSummary;

/// Maximum number of runs in one comparison
pub const MAX_COMPARISON_RUNS: usize = 4;

/// Comparison mode needs at least this many runs
pub const MIN_COMPARISON_RUNS: usize = 2;

/// Three-valued filter toggle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    #[default]
    Unset,
    Positive,
    Negative,
}

impl TriState {
    /// Fixed cycle: unset -> positive -> negative -> unset.
    pub fn cycle(self) -> TriState {
        match self {
            TriState::Unset => TriState::Positive,
            TriState::Positive => TriState::Negative,
            TriState::Negative => TriState::Unset,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, TriState::Unset)
    }

    /// `Some(true)` requires presence, `Some(false)` absence, `None` passes.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            TriState::Unset => None,
            TriState::Positive => Some(true),
            TriState::Negative => Some(false),
        }
    }

    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            None => TriState::Unset,
            Some(true) => TriState::Positive,
            Some(false) => TriState::Negative,
        }
    }

    /// Whether a row where the property is `present` passes this toggle.
    pub fn admits(&self, present: bool) -> bool {
        self.as_flag().map_or(true, |required| required == present)
    }
}

/// Row selection keyed by stable identity, so it survives reordering and refreshes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    keys: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, key: &str) -> bool {
        if self.keys.remove(key) {
            false
        } else {
            self.keys.insert(key.to_string());
            true
        }
    }

    pub fn insert(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Drops keys for rows that no longer exist; returns how many were dropped.
    pub fn retain_existing<'a, I>(&mut self, existing: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let existing: BTreeSet<&str> = existing.into_iter().collect();
        let before = self.keys.len();
        self.keys.retain(|k| existing.contains(k.as_str()));
        before - self.keys.len()
    }
}

/// Ordered set of 0..=4 distinct run ids designated for comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSet {
    run_ids: Vec<String>,
}

impl ComparisonSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a run; duplicates and additions past the limit are no-ops returning `false`.
    pub fn add(&mut self, run_id: impl Into<String>) -> bool {
        let run_id = run_id.into();
        if self.run_ids.contains(&run_id) {
            return false;
        }
        if self.run_ids.len() >= MAX_COMPARISON_RUNS {
            tracing::debug!(run_id = %run_id, "Comparison set full, ignoring run");
            return false;
        }
        self.run_ids.push(run_id);
        true
    }

    pub fn remove(&mut self, run_id: &str) -> bool {
        let before = self.run_ids.len();
        self.run_ids.retain(|id| id != run_id);
        before != self.run_ids.len()
    }

    pub fn clear(&mut self) {
        self.run_ids.clear();
    }

    pub fn is_active(&self) -> bool {
        self.run_ids.len() >= MIN_COMPARISON_RUNS
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.run_ids.iter().any(|id| id == run_id)
    }

    pub fn run_ids(&self) -> &[String] {
        &self.run_ids
    }

    pub fn len(&self) -> usize {
        self.run_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.run_ids.is_empty()
    }
}

impl FromIterator<String> for ComparisonSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        let mut set = ComparisonSet::new();
        for id in iter {
            set.add(id);
        }
        set
    }
}

/// Parses a comma-separated list of 2-4 distinct run names.
pub fn parse_compare_run_names(raw: &str) -> Result<Vec<String>> {
    let names: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if names.len() < MIN_COMPARISON_RUNS {
        return Err(RunlensError::InvalidArgument(format!(
            "comparison requires at least {} run names",
            MIN_COMPARISON_RUNS
        )));
    }
    if names.len() > MAX_COMPARISON_RUNS {
        return Err(RunlensError::InvalidArgument(format!(
            "comparison supports at most {} run names, got {}",
            MAX_COMPARISON_RUNS,
            names.len()
        )));
    }

    let mut seen = BTreeSet::new();
    for name in &names {
        if !seen.insert(name.as_str()) {
            return Err(RunlensError::InvalidArgument(format!(
                "duplicate run name '{}'",
                name
            )));
        }
    }

    Ok(names)
}

/// Finds the run named exactly `run_name` within `session`.
///
/// Missing runs are `Ok(None)` unless `required`; several runs sharing the
/// name is always an error.
pub fn resolve_run_name<'a>(
    runs: &'a [RunSummary],
    session: &str,
    run_name: &str,
    required: bool,
) -> Result<Option<&'a RunSummary>> {
    let matches: Vec<&RunSummary> = runs
        .iter()
        .filter(|r| r.session_name.as_deref() == Some(session))
        .filter(|r| r.run_name.as_deref() == Some(run_name))
        .collect();

    match matches.as_slice() {
        [] if required => Err(RunlensError::NotFound(format!(
            "run '{}' not found in session '{}'",
            run_name, session
        ))),
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        many => Err(RunlensError::Ambiguous(format!(
            "run name '{}' matches {} runs in session '{}'",
            run_name,
            many.len(),
            session
        ))),
    }
}
