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

//! HTTP run source backed by the results server.
//!
//! `GET {base}/results?run_id=..` returns a run document and
//! `GET {base}/api/runs?session=..` a run listing.

use async_trait::async_trait;
use runlens_core::{RunSnapshot, RunSummary, SourceConfig};
use std::time::Duration;
use url::Url;

use crate::error::{Result, SourceError};
use crate::source::{sort_newest_first, RunSource};

pub struct HttpRunSource {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpRunSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // Relative joins replace the last path segment unless it ends in '/'.
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: Url::parse(&base)?,
            client,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    async fn get_text(&self, url: Url, not_found: String) -> Result<String> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(not_found));
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl RunSource for HttpRunSource {
    async fn fetch_run(&self, run_id: &str) -> Result<RunSnapshot> {
        let url = self.endpoint("results", &[("run_id", run_id)])?;
        let body = self.get_text(url, run_id.to_string()).await?;
        let mut snapshot: RunSnapshot = serde_json::from_str(&body)?;
        if snapshot.run_id.is_empty() {
            snapshot.run_id = run_id.to_string();
        }
        Ok(snapshot)
    }

    async fn list_runs(&self, session: &str) -> Result<Vec<RunSummary>> {
        let url = self.endpoint("api/runs", &[("session", session)])?;
        let body = self.get_text(url, format!("session '{}'", session)).await?;
        let mut runs: Vec<RunSummary> = serde_json::from_str(&body)?;
        sort_newest_first(&mut runs);
        Ok(runs)
    }

    fn describe(&self) -> String {
        self.base_url.to_string()
    }
}
