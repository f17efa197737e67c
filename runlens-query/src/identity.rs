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

//! Cross-run identity keys for result rows.
//!
//! A key aligns "the same" case across runs: function name, dataset and the
//! ordinal of that function+dataset pair within the run (parametrized or
//! repeated cases). Rows without a function name fall back to their position
//! and will not align across runs.

use runlens_core::EvaluationResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identity of one logical test case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Computes identity keys for every row of a run, in row order.
///
/// Implementations must be pure: the same run id and rows always yield the
/// same keys.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, run_id: &str, results: &[EvaluationResult]) -> Vec<IdentityKey>;
}

/// Escapes the key delimiters so distinct parts never join to the same key.
fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if matches!(c, '\\' | ':' | '#' | '@') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Default resolver: `function::dataset#ordinal`, or `@run_id#index` without
/// a function. An empty dataset counts as no dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrdinalIdentity;

impl OrdinalIdentity {
    pub fn key_for(function: &str, dataset: Option<&str>, ordinal: usize) -> IdentityKey {
        IdentityKey(format!(
            "{}::{}#{}",
            escape(function),
            escape(dataset.unwrap_or_default()),
            ordinal
        ))
    }

    /// Key scoped to its run, so it never aligns with another run's row.
    pub fn positional(run_id: &str, index: usize) -> IdentityKey {
        IdentityKey(format!("@{}#{}", escape(run_id), index))
    }
}

impl IdentityResolver for OrdinalIdentity {
    fn resolve(&self, run_id: &str, results: &[EvaluationResult]) -> Vec<IdentityKey> {
        let mut seen: HashMap<(&str, &str), usize> = HashMap::new();

        results
            .iter()
            .enumerate()
            .map(|(index, result)| match result.function.as_deref() {
                Some(function) if !function.is_empty() => {
                    let dataset = result.dataset.as_deref().unwrap_or_default();
                    let ordinal = seen.entry((function, dataset)).or_insert(0);
                    let key = Self::key_for(function, Some(dataset), *ordinal);
                    *ordinal += 1;
                    key
                }
                _ => Self::positional(run_id, index),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_cases_get_ordinals() {
        let rows = vec![
            EvaluationResult::new("t").with_dataset("qa"),
            EvaluationResult::new("t").with_dataset("qa"),
            EvaluationResult::new("t"),
        ];
        let keys = OrdinalIdentity.resolve("r1", &rows);
        assert_eq!(keys[0].as_str(), "t::qa#0");
        assert_eq!(keys[1].as_str(), "t::qa#1");
        assert_eq!(keys[2].as_str(), "t::#0");
    }

    #[test]
    fn test_stable_under_reordering_of_distinct_cases() {
        let a = vec![EvaluationResult::new("x"), EvaluationResult::new("y")];
        let b = vec![EvaluationResult::new("y"), EvaluationResult::new("x")];
        let mut ka = OrdinalIdentity.resolve("r1", &a);
        let mut kb = OrdinalIdentity.resolve("r1", &b);
        ka.sort();
        kb.sort();
        assert_eq!(ka, kb);
    }

    #[test]
    fn test_missing_function_falls_back_to_position() {
        let rows = vec![EvaluationResult::new("x"), EvaluationResult::default()];
        let keys = OrdinalIdentity.resolve("r1", &rows);
        assert_eq!(keys[1].as_str(), "@r1#1");
    }

    #[test]
    fn test_positional_keys_are_scoped_to_their_run() {
        let rows = vec![EvaluationResult::default()];
        let a = OrdinalIdentity.resolve("run-a", &rows);
        let b = OrdinalIdentity.resolve("run-b", &rows);
        assert_ne!(a, b);
    }

    #[test]
    fn test_delimiters_in_names_do_not_collide() {
        let rows = vec![
            EvaluationResult::new("a").with_dataset("b::"),
            EvaluationResult::new("a::b"),
            EvaluationResult::new("x#1"),
            EvaluationResult::new("x").with_dataset("#1"),
        ];
        let keys = OrdinalIdentity.resolve("r1", &rows);
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[2], keys[3]);
        assert_eq!(keys[1].as_str(), "a\\:\\:b::#0");
    }

    #[test]
    fn test_empty_dataset_is_no_dataset() {
        let rows = vec![EvaluationResult::new("t").with_dataset(""), EvaluationResult::new("t")];
        let keys = OrdinalIdentity.resolve("r1", &rows);
        assert_eq!(keys[0].as_str(), "t::#0");
        assert_eq!(keys[1].as_str(), "t::#1");
    }
}
