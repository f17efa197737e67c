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

//! Session state owned by the host and passed into the engine.
//!
//! The engine never persists this; hosts serialize it (serde) or share it as
//! query parameters.

use runlens_core::{ComparisonSet, Selection, TriState};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::filter::FilterState;
use crate::sort::{SortDirection, SortKey, SortState};

/// Everything the user has set up for the current dashboard session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub comparison: ComparisonSet,
    #[serde(default)]
    pub filter: FilterState,
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub sort: SortState,
    #[serde(default)]
    pub selection: Selection,
}

impl SessionState {
    pub fn for_run(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            ..Default::default()
        }
    }

    pub fn is_comparison(&self) -> bool {
        self.comparison.is_active()
    }

    /// Run ids the view needs, current run first, deduplicated.
    pub fn referenced_runs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.run_id.iter().cloned().collect();
        for id in self.comparison.run_ids() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// Encodes the shareable part of the session as a query string.
    ///
    /// Selection stays local and is not encoded.
    pub fn to_query_params(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());

        if let Some(run_id) = &self.run_id {
            query.append_pair("run_id", run_id);
        }
        for id in self.comparison.run_ids() {
            query.append_pair("compare_run_id", id);
        }
        let search = self.search.trim();
        if !search.is_empty() {
            query.append_pair("search", search);
        }
        for (name, state) in [
            ("has_error", self.filter.has_error),
            ("has_url", self.filter.has_url),
            ("has_messages", self.filter.has_messages),
        ] {
            if let Some(flag) = state.as_flag() {
                query.append_pair(name, if flag { "1" } else { "0" });
            }
        }
        if let Some(flag) = self.filter.annotation.as_flag() {
            query.append_pair("annotation", if flag { "yes" } else { "no" });
        }
        if !self.sort.is_empty() {
            let keys: Vec<String> = self
                .sort
                .keys
                .iter()
                .map(|k| match k.direction {
                    SortDirection::Asc => k.column.to_string(),
                    SortDirection::Desc => format!("{}:desc", k.column),
                })
                .collect();
            query.append_pair("sort", &keys.join(","));
        }

        query.finish()
    }

    /// Parses a query string; unknown parameters and bad values are ignored.
    pub fn from_query_params(query: &str) -> Self {
        let mut state = SessionState::default();
        let query = query.strip_prefix('?').unwrap_or(query);

        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim();
            match name.as_ref() {
                "run_id" if !value.is_empty() => state.run_id = Some(value.to_string()),
                "compare_run_id" if !value.is_empty() => {
                    // Duplicates and a fifth run are dropped by the set.
                    state.comparison.add(value);
                }
                "search" => state.search = value.to_string(),
                "has_error" => state.filter.has_error = parse_flag(value),
                "has_url" => state.filter.has_url = parse_flag(value),
                "has_messages" => state.filter.has_messages = parse_flag(value),
                "annotation" => state.filter.annotation = parse_flag(value),
                "sort" => {
                    state.sort = SortState {
                        keys: value
                            .split(',')
                            .filter_map(|raw| SortKey::parse(raw).ok())
                            .collect(),
                    }
                }
                _ => {}
            }
        }

        state
    }
}

fn parse_flag(value: &str) -> TriState {
    TriState::from_flag(match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    })
}
