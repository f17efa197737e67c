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

//! Run source reading saved run files from disk.
//!
//! Layout: `<root>/<session>/<run_name>_<run_id>.json`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runlens_core::{RunSnapshot, RunSummary};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Result, SourceError};
use crate::source::{sort_newest_first, RunSource};

pub struct DirectoryRunSource {
    root: PathBuf,
}

/// `(run_name, run_id)` from a run file name, split at the last `_`.
///
/// Only a guess when the run id itself contains `_`; the document's own
/// `run_id` wins whenever it is present.
fn parse_file_name(path: &Path) -> Option<(&str, &str)> {
    if path.extension()? != "json" {
        return None;
    }
    path.file_stem()?.to_str()?.rsplit_once('_')
}

impl DirectoryRunSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session: &str) -> PathBuf {
        self.root.join(session)
    }

    /// Writes `snapshot` as `<session>/<run_name>_<run_id>.json`.
    pub async fn save_run(&self, session: &str, snapshot: &RunSnapshot) -> Result<PathBuf> {
        let dir = self.session_dir(session);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!(
            "{}_{}.json",
            snapshot.run_name.as_deref().unwrap_or("run"),
            snapshot.run_id
        ));
        let data = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    /// Run name of a file called `<run_name>_<run_id>.json`.
    fn name_for_run_id<'a>(path: &'a Path, run_id: &str) -> Option<&'a str> {
        if path.extension()? != "json" {
            return None;
        }
        let name = path
            .file_stem()?
            .to_str()?
            .strip_suffix(run_id)?
            .strip_suffix('_')?;
        (!name.is_empty()).then_some(name)
    }

    /// Reads a run file; `run_id` is the id the file name was matched on, if any.
    async fn read_snapshot(&self, path: &Path, run_id: Option<&str>) -> Result<RunSnapshot> {
        let data = tokio::fs::read_to_string(path).await?;
        let mut snapshot: RunSnapshot = serde_json::from_str(&data)?;

        let names = match run_id {
            Some(id) => Self::name_for_run_id(path, id).map(|name| (name, id)),
            None => parse_file_name(path),
        };
        if let Some((run_name, run_id)) = names {
            if snapshot.run_id.is_empty() {
                snapshot.run_id = run_id.to_string();
            }
            if snapshot.run_name.is_none() {
                snapshot.run_name = Some(run_name.to_string());
            }
        }
        if snapshot.session_name.is_none() {
            snapshot.session_name = path
                .parent()
                .and_then(Path::file_name)
                .and_then(|s| s.to_str())
                .map(String::from);
        }
        Ok(snapshot)
    }

    /// Files in `dir` that look like run files; a missing dir is empty.
    async fn run_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if parse_file_name(&path).is_some() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Files named `<run_name>_<run_id>.json` in any session.
    async fn candidate_files(&self, run_id: &str) -> Result<Vec<PathBuf>> {
        let mut sessions = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut candidates = Vec::new();
        while let Some(session) = sessions.next_entry().await? {
            if !session.file_type().await?.is_dir() {
                continue;
            }
            for path in Self::run_files(&session.path()).await? {
                if Self::name_for_run_id(&path, run_id).is_some() {
                    candidates.push(path);
                }
            }
        }
        Ok(candidates)
    }
}

#[async_trait]
impl RunSource for DirectoryRunSource {
    async fn fetch_run(&self, run_id: &str) -> Result<RunSnapshot> {
        // A file name can end in `_<run_id>` for a different run (`a_b_c`
        // is both `a`/`b_c` and `a_b`/`c`), so the document decides.
        let mut first_error = None;
        for path in self.candidate_files(run_id).await? {
            match self.read_snapshot(&path, Some(run_id)).await {
                Ok(snapshot) if snapshot.run_id == run_id => return Ok(snapshot),
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| SourceError::NotFound(run_id.to_string())))
    }

    async fn list_runs(&self, session: &str) -> Result<Vec<RunSummary>> {
        let mut runs = Vec::new();

        for path in Self::run_files(&self.session_dir(session)).await? {
            let snapshot = match self.read_snapshot(&path, None).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable run file");
                    continue;
                }
            };
            let timestamp: DateTime<Utc> = tokio::fs::metadata(&path)
                .await?
                .modified()
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());
            runs.push(RunSummary::from_snapshot(&snapshot, timestamp));
        }

        sort_newest_first(&mut runs);
        Ok(runs)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
