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

//! Runlens Live
//!
//! Keeps the displayed run fresh while it is still executing: run sources,
//! snapshot diffing and the cancellable polling loop.

pub mod diff;
pub mod directory;
pub mod error;
pub mod http;
pub mod reconciler;
pub mod source;

pub use diff::{diff_snapshots, patch_snapshot, SnapshotDiff};
pub use directory::DirectoryRunSource;
pub use error::{Result, SourceError};
pub use http::HttpRunSource;
pub use reconciler::{
    LiveReconciler, LiveUpdate, PollHandle, PollOutcome, PollState, ReconcileResult,
};
pub use source::RunSource;
