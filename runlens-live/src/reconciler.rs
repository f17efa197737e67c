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

//! Live reconciler
//!
//! Polls the displayed run while any of its rows is incomplete and patches
//! the cached snapshot when content changes. State machine:
//! `idle -> polling -> idle`. At most one fetch is in flight per handle;
//! the next poll is armed only after the previous result has been applied.

use runlens_core::{PollingConfig, RunSnapshot};
use runlens_query::{IdentityResolver, SessionState, SnapshotStore, StoreUpdate};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::diff::{patch_snapshot, SnapshotDiff};
use crate::error::Result;
use crate::source::RunSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Polling,
}

impl PollState {
    /// Polling while any row may still change.
    pub fn for_snapshot(snapshot: &RunSnapshot) -> Self {
        if snapshot.has_incomplete() {
            PollState::Polling
        } else {
            PollState::Idle
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Nothing was cached for the run yet.
    Loaded,
    /// Fetched content equals the cached snapshot; nothing was written.
    Unchanged,
    Updated(SnapshotDiff),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileResult {
    pub outcome: PollOutcome,
    pub state: PollState,
}

/// Change notification sent to the host after a patch was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub run_id: String,
    pub diff: SnapshotDiff,
}

pub struct LiveReconciler {
    source: Arc<dyn RunSource>,
    store: Arc<SnapshotStore>,
    resolver: Arc<dyn IdentityResolver>,
    interval: Duration,
    enabled: bool,
}

impl LiveReconciler {
    pub fn new(
        source: Arc<dyn RunSource>,
        store: Arc<SnapshotStore>,
        resolver: Arc<dyn IdentityResolver>,
        config: &PollingConfig,
    ) -> Self {
        Self {
            source,
            store,
            resolver,
            interval: Duration::from_millis(config.interval_ms.max(1)),
            enabled: config.enabled,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn source(&self) -> &Arc<dyn RunSource> {
        &self.source
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Initial load of one run. Unlike polling, failures are returned.
    pub async fn load(&self, run_id: &str) -> Result<StoreUpdate> {
        let snapshot = self.source.fetch_run(run_id).await?;
        Ok(self.store.put(snapshot))
    }

    /// Loads several runs concurrently; each result is stored independently.
    ///
    /// Returns the first failure after every fetch has finished.
    pub async fn load_many(&self, run_ids: &[String]) -> Result<()> {
        let mut fetches = JoinSet::new();
        for run_id in run_ids {
            let source = Arc::clone(&self.source);
            let run_id = run_id.clone();
            fetches.spawn(async move {
                let result = source.fetch_run(&run_id).await;
                (run_id, result)
            });
        }

        let mut first_error = None;
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((_, Ok(snapshot))) => {
                    self.store.put(snapshot);
                }
                Ok((run_id, Err(e))) => {
                    tracing::warn!(run_id = %run_id, error = %e, "Failed to load run");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(e.into());
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One poll tick: fetch, compare fingerprints, then diff and patch if needed.
    pub async fn reconcile_once(&self, run_id: &str) -> Result<ReconcileResult> {
        let incoming = self.source.fetch_run(run_id).await?;

        let Some(cached) = self.store.get(run_id) else {
            let state = PollState::for_snapshot(&incoming);
            self.store.put(incoming);
            return Ok(ReconcileResult {
                outcome: PollOutcome::Loaded,
                state,
            });
        };

        if self.store.fingerprint(run_id).as_deref() == Some(incoming.fingerprint().as_str()) {
            tracing::trace!(run_id = %run_id, "Poll returned unchanged content");
            return Ok(ReconcileResult {
                outcome: PollOutcome::Unchanged,
                state: PollState::for_snapshot(&cached),
            });
        }

        let mut local = RunSnapshot::clone(&cached);
        let diff = patch_snapshot(&mut local, incoming, self.resolver.as_ref());
        let state = PollState::for_snapshot(&local);

        if diff.is_empty() {
            tracing::trace!(run_id = %run_id, "Poll returned unchanged content");
            return Ok(ReconcileResult {
                outcome: PollOutcome::Unchanged,
                state,
            });
        }

        tracing::debug!(
            run_id = %run_id,
            changed = diff.changed.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Applied live update"
        );
        self.store.put(local);

        Ok(ReconcileResult {
            outcome: PollOutcome::Updated(diff),
            state,
        })
    }

    /// Drops selected keys whose rows no longer exist in the cached run.
    pub fn prune_selection(&self, session: &mut SessionState) -> usize {
        let Some(snapshot) = session.run_id.as_deref().and_then(|id| self.store.get(id)) else {
            return 0;
        };
        let keys = self.resolver.resolve(&snapshot.run_id, &snapshot.results);
        session
            .selection
            .retain_existing(keys.iter().map(|k| k.as_str()))
    }

    /// Starts polling the session's run if it needs it.
    ///
    /// `None` (idle) when polling is disabled, the session is comparing runs,
    /// the run is not cached yet, or every row is already finished.
    pub fn watch(self: &Arc<Self>, session: &SessionState) -> Option<PollHandle> {
        if !self.enabled {
            return None;
        }
        if session.is_comparison() {
            tracing::debug!("Comparison mode, live polling suppressed");
            return None;
        }
        let run_id = session.run_id.clone()?;
        let snapshot = self.store.get(&run_id)?;
        if PollState::for_snapshot(&snapshot) == PollState::Idle {
            return None;
        }
        Some(self.spawn_poll(run_id))
    }

    fn spawn_poll(self: &Arc<Self>, run_id: String) -> PollHandle {
        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(PollState::Polling);
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(Arc::clone(self).poll_loop(
            run_id,
            token.clone(),
            state_tx,
            update_tx,
        ));

        PollHandle {
            _guard: token.clone().drop_guard(),
            token,
            state: state_rx,
            updates: update_rx,
            task,
        }
    }

    async fn poll_loop(
        self: Arc<Self>,
        run_id: String,
        token: CancellationToken,
        state: watch::Sender<PollState>,
        updates: mpsc::UnboundedSender<LiveUpdate>,
    ) {
        tracing::debug!(
            run_id = %run_id,
            source = %self.source.describe(),
            interval_ms = self.interval.as_millis() as u64,
            "Live polling started"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            // In-flight fetches are dropped on cancel; their result is moot.
            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = self.reconcile_once(&run_id) => result,
            };

            match result {
                Ok(ReconcileResult { outcome, state: next }) => {
                    if let PollOutcome::Updated(diff) = outcome {
                        // Host may have stopped listening; polling continues regardless.
                        let _ = updates.send(LiveUpdate {
                            run_id: run_id.clone(),
                            diff,
                        });
                    }
                    if next == PollState::Idle {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "Poll failed, retrying next interval");
                }
            }
        }

        let _ = state.send(PollState::Idle);
        tracing::debug!(run_id = %run_id, "Live polling stopped");
    }
}

/// Running poll task. Dropping the handle cancels it.
pub struct PollHandle {
    token: CancellationToken,
    _guard: DropGuard,
    state: watch::Receiver<PollState>,
    updates: mpsc::UnboundedReceiver<LiveUpdate>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Next applied update; `None` once polling has stopped.
    pub async fn next_update(&mut self) -> Option<LiveUpdate> {
        self.updates.recv().await
    }

    /// Stops polling. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits until the loop reaches idle, on its own or after [`cancel`](Self::cancel).
    pub async fn wait_idle(&mut self) {
        // A closed channel means the task is gone, which is idle too.
        let _ = self.state.wait_for(|s| *s == PollState::Idle).await;
    }
}
