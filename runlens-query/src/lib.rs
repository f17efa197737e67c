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

//! Runlens Query Engine
//!
//! Result reconciliation and query engine for evaluation runs: identity
//! resolution, comparison matrix, filtering, sorting, stats and export.
//! Every engine function is synchronous, pure and infallible.

pub mod comparison;
pub mod export;
pub mod filter;
pub mod identity;
pub mod rows;
pub mod session;
pub mod sort;
pub mod stats;
pub mod store;
pub mod view;

pub use comparison::{build_matrix, ComparisonEntry, ComparisonMatrix, RunColumn, RunSlot};
pub use export::{cell_text, parse_columns, ExportPayload, ExportRow, DEFAULT_COLUMNS};
pub use filter::{
    filter_rows, matches, Comparator, Filterable, FilterState, PassRule, SetFilter, ToggleField,
    ValueRule,
};
pub use identity::{IdentityKey, IdentityResolver, OrdinalIdentity};
pub use rows::{index_run, search_text, RunRow};
pub use session::SessionState;
pub use sort::{
    compare_rows, sort_rows, SortColumn, SortDirection, SortKey, SortState, SortValue, Sortable,
    ValueType,
};
pub use stats::{
    average_latency, compute_chips, progress, summarize, summarize_filtered, FilteredStats,
    Progress, RunStats,
};
pub use store::{SnapshotStore, StoreUpdate};
pub use view::{ComparisonView, DashboardView, DisplayStats, SingleRunView};
