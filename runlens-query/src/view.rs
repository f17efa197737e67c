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

//! Dashboard view pipeline
//!
//! snapshots -> identity -> (matrix) -> filter -> sort -> stats.
//!
//! A view owns its rows and keeps the display order as indices into them, so
//! the source rows are never reordered.

use runlens_core::{RunSnapshot, MIN_COMPARISON_RUNS};
use serde::Serialize;
use std::sync::Arc;

use crate::comparison::{build_matrix, ComparisonEntry, ComparisonMatrix, RunColumn};
use crate::filter::{filter_rows, normalize_search, FilterState};
use crate::identity::{IdentityKey, IdentityResolver};
use crate::rows::{index_run, RunRow};
use crate::session::SessionState;
use crate::sort::{sort_rows, SortState};
use crate::stats::{summarize, summarize_filtered, FilteredStats, RunStats};
use crate::store::SnapshotStore;

/// Stats shown above the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DisplayStats {
    /// No active filter: the full-run summary.
    Full(RunStats),
    /// Filter or search active: recomputed over the visible rows.
    Filtered {
        full: RunStats,
        filtered: FilteredStats,
    },
    /// Comparison mode: the per-run chips each producer attached, unchanged.
    Attached { runs: Vec<RunColumn> },
}

#[derive(Debug, Clone)]
pub struct SingleRunView {
    pub snapshot: Arc<RunSnapshot>,
    pub rows: Vec<RunRow>,
    /// Display order as indices into `rows`.
    pub order: Vec<usize>,
    pub stats: DisplayStats,
}

impl SingleRunView {
    pub fn build(
        snapshot: Arc<RunSnapshot>,
        resolver: &dyn IdentityResolver,
        filter: &FilterState,
        search: &str,
        sort: &SortState,
    ) -> Self {
        let rows = index_run(&snapshot, resolver);

        let mut visible = filter_rows(&rows, filter, search);
        sort_rows(&mut visible, sort);
        let order: Vec<usize> = visible.iter().map(|r| r.index).collect();

        let full = summarize(&snapshot);
        let stats = if filter.is_empty() && normalize_search(search).is_empty() {
            DisplayStats::Full(full)
        } else {
            DisplayStats::Filtered {
                full,
                filtered: summarize_filtered(visible.iter().map(|r| &r.result)),
            }
        };

        tracing::debug!(
            run_id = %snapshot.run_id,
            rows = rows.len(),
            visible = order.len(),
            "Built single-run view"
        );

        Self {
            snapshot,
            rows,
            order,
            stats,
        }
    }

    pub fn visible(&self) -> impl Iterator<Item = &RunRow> + '_ {
        self.order.iter().map(move |&i| &self.rows[i])
    }

    pub fn is_polling_candidate(&self) -> bool {
        self.snapshot.has_incomplete()
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonView {
    pub matrix: ComparisonMatrix,
    /// Display order as indices into `matrix.entries`.
    pub order: Vec<usize>,
    pub stats: DisplayStats,
}

impl ComparisonView {
    pub fn build(
        snapshots: &[&RunSnapshot],
        resolver: &dyn IdentityResolver,
        filter: &FilterState,
        search: &str,
        sort: &SortState,
    ) -> Self {
        let matrix = build_matrix(snapshots, resolver);

        let mut visible = filter_rows(&matrix.entries, filter, search);
        sort_rows(&mut visible, sort);
        let order: Vec<usize> = visible.iter().map(|e| e.position).collect();

        let stats = DisplayStats::Attached {
            runs: matrix.runs.clone(),
        };

        Self {
            matrix,
            order,
            stats,
        }
    }

    pub fn visible(&self) -> impl Iterator<Item = &ComparisonEntry> + '_ {
        self.order.iter().map(move |&i| &self.matrix.entries[i])
    }
}

/// Filtered, sorted rows ready for display or export.
#[derive(Debug, Clone)]
pub enum DashboardView {
    Single(SingleRunView),
    Comparison(ComparisonView),
}

impl DashboardView {
    /// Builds the view for `session` from cached snapshots.
    ///
    /// `None` while a required snapshot has not been fetched yet.
    pub fn build(
        store: &SnapshotStore,
        session: &SessionState,
        resolver: &dyn IdentityResolver,
    ) -> Option<Self> {
        if session.is_comparison() {
            let snapshots = store.get_many(session.comparison.run_ids());
            if snapshots.len() < MIN_COMPARISON_RUNS {
                return None;
            }
            let refs: Vec<&RunSnapshot> = snapshots.iter().map(Arc::as_ref).collect();
            return Some(DashboardView::Comparison(ComparisonView::build(
                &refs,
                resolver,
                &session.filter,
                &session.search,
                &session.sort,
            )));
        }

        let snapshot = store.get(session.run_id.as_deref()?)?;
        Some(DashboardView::Single(SingleRunView::build(
            snapshot,
            resolver,
            &session.filter,
            &session.search,
            &session.sort,
        )))
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, DashboardView::Comparison(_))
    }

    pub fn stats(&self) -> &DisplayStats {
        match self {
            DashboardView::Single(view) => &view.stats,
            DashboardView::Comparison(view) => &view.stats,
        }
    }

    pub fn visible_count(&self) -> usize {
        match self {
            DashboardView::Single(view) => view.order.len(),
            DashboardView::Comparison(view) => view.order.len(),
        }
    }

    pub fn total_count(&self) -> usize {
        match self {
            DashboardView::Single(view) => view.rows.len(),
            DashboardView::Comparison(view) => view.matrix.entries.len(),
        }
    }

    /// Identity keys of every row, visible or not.
    pub fn keys(&self) -> Vec<&IdentityKey> {
        match self {
            DashboardView::Single(view) => view.rows.iter().map(|r| &r.key).collect(),
            DashboardView::Comparison(view) => {
                view.matrix.entries.iter().map(|e| &e.key).collect()
            }
        }
    }

    /// Identity keys in display order.
    pub fn visible_keys(&self) -> Vec<&IdentityKey> {
        match self {
            DashboardView::Single(view) => view.visible().map(|r| &r.key).collect(),
            DashboardView::Comparison(view) => view.visible().map(|e| &e.key).collect(),
        }
    }
}
