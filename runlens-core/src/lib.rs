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

//! Runlens Core
//!
//! Fundamental data structures for evaluation run results: the per-case
//! result rows, run snapshots and summaries, and the session-scoped UI state
//! (selection, comparison set, tri-state toggles) that the query engine
//! reads but never stores.

pub mod config;
pub mod error;
pub mod result;
pub mod session;
pub mod snapshot;

pub use config::{
    DashboardConfig, ExportConfig, ExportFormat, PollingConfig, SourceConfig,
    DEFAULT_POLL_INTERVAL_MS,
};
pub use error::{Result, RunlensError};
pub use result::{
    render_value, CaseOutcome, EvalStatus, EvaluationResult, Score, ScoreValue, TraceData,
};
pub use session::{
    parse_compare_run_names, resolve_run_name, ComparisonSet, Selection, TriState,
    MAX_COMPARISON_RUNS, MIN_COMPARISON_RUNS,
};
pub use snapshot::{ChipKind, RunSnapshot, RunSummary, ScoreChip};
