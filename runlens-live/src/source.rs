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

//! Where run documents come from.

use async_trait::async_trait;
use runlens_core::{RunSnapshot, RunSummary};

use crate::error::Result;

/// Fetch boundary for run data.
///
/// Implementations return whole snapshots; the reconciler decides what
/// actually changed.
#[async_trait]
pub trait RunSource: Send + Sync {
    /// Full snapshot of one run.
    async fn fetch_run(&self, run_id: &str) -> Result<RunSnapshot>;

    /// Lightweight summaries of the runs in `session`, newest first.
    async fn list_runs(&self, session: &str) -> Result<Vec<RunSummary>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Newest first, run id as tiebreak so listings are stable.
pub(crate) fn sort_newest_first(runs: &mut [RunSummary]) {
    runs.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
}
