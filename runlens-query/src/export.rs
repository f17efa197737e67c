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

//! Export payloads for the currently visible rows.
//!
//! Only filtered, sorted, column-limited rows are exported. An empty view
//! exports nothing.

use chrono::{DateTime, Utc};
use runlens_core::{render_value, EvaluationResult, ExportFormat, Score};
use serde::Serialize;

use crate::sort::SortColumn;
use crate::view::{DashboardView, DisplayStats};

/// Columns exported when none are configured.
pub static DEFAULT_COLUMNS: [SortColumn; 11] = [
    SortColumn::Function,
    SortColumn::Dataset,
    SortColumn::Labels,
    SortColumn::Status,
    SortColumn::Input,
    SortColumn::Output,
    SortColumn::Reference,
    SortColumn::Scores,
    SortColumn::Latency,
    SortColumn::Error,
    SortColumn::Annotation,
];

/// Parses configured column names, skipping unknown ones.
pub fn parse_columns<S: AsRef<str>>(names: &[S]) -> Vec<SortColumn> {
    let columns: Vec<SortColumn> = names
        .iter()
        .filter_map(|name| match name.as_ref().parse() {
            Ok(column) => Some(column),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring export column");
                None
            }
        })
        .collect();

    if columns.is_empty() {
        DEFAULT_COLUMNS.to_vec()
    } else {
        columns
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub key: String,
    /// Run name; set only for comparison exports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    /// Aligned with [`ExportPayload::columns`].
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportPayload {
    pub generated_at: DateTime<Utc>,
    pub runs: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<ExportRow>,
    pub visible_count: usize,
    pub total_count: usize,
    pub stats: DisplayStats,
}

impl ExportPayload {
    /// Builds the payload from a view; `None` when no row is visible.
    pub fn build(
        view: &DashboardView,
        columns: &[SortColumn],
        generated_at: DateTime<Utc>,
    ) -> Option<Self> {
        if view.visible_count() == 0 {
            tracing::debug!("Nothing visible, skipping export");
            return None;
        }
        let columns = if columns.is_empty() {
            &DEFAULT_COLUMNS[..]
        } else {
            columns
        };

        let (runs, rows) = match view {
            DashboardView::Single(single) => {
                let rows: Vec<ExportRow> = single
                    .visible()
                    .map(|row| ExportRow {
                        key: row.key.to_string(),
                        run: None,
                        cells: cells(&row.result, columns),
                    })
                    .collect();
                (vec![single.snapshot.display_name().to_string()], rows)
            }
            DashboardView::Comparison(comparison) => {
                let runs: Vec<String> = comparison
                    .matrix
                    .runs
                    .iter()
                    .map(|r| r.run_name.clone())
                    .collect();
                let mut rows = Vec::new();
                for entry in comparison.visible() {
                    for (slot, run) in entry.slots.iter().zip(&runs) {
                        if let Some(slot) = slot {
                            rows.push(ExportRow {
                                key: entry.key.to_string(),
                                run: Some(run.clone()),
                                cells: cells(&slot.result, columns),
                            });
                        }
                    }
                }
                (runs, rows)
            }
        };

        Some(Self {
            generated_at,
            runs,
            columns: columns.iter().map(ToString::to_string).collect(),
            rows,
            visible_count: view.visible_count(),
            total_count: view.total_count(),
            stats: view.stats().clone(),
        })
    }

    fn is_comparison(&self) -> bool {
        self.rows.iter().any(|r| r.run.is_some())
    }

    pub fn render(&self, format: ExportFormat) -> serde_json::Result<String> {
        match format {
            ExportFormat::Json => self.to_json(),
            ExportFormat::Csv => Ok(self.to_csv()),
            ExportFormat::Markdown => Ok(self.to_markdown()),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let comparison = self.is_comparison();
        let mut csv = String::new();

        let mut header: Vec<String> = Vec::with_capacity(self.columns.len() + 1);
        if comparison {
            header.push("run".to_string());
        }
        header.extend(self.columns.iter().map(|c| escape_csv(c)));
        csv.push_str(&header.join(","));
        csv.push_str("\r\n");

        for row in &self.rows {
            let mut fields: Vec<String> = Vec::with_capacity(row.cells.len() + 1);
            if comparison {
                fields.push(escape_csv(row.run.as_deref().unwrap_or_default()));
            }
            fields.extend(row.cells.iter().map(|c| escape_csv(c)));
            csv.push_str(&fields.join(","));
            csv.push_str("\r\n");
        }

        csv
    }

    pub fn to_markdown(&self) -> String {
        let comparison = self.is_comparison();
        let mut md = String::new();

        md.push_str(&format!("## {}\n\n", self.runs.join(" vs ")));
        md.push_str(&format!(
            "_{} of {} rows, exported {}_\n\n",
            self.visible_count,
            self.total_count,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        let chips: Vec<String> = match &self.stats {
            DisplayStats::Full(stats) => stats.chips.iter().map(|c| c.label()).collect(),
            DisplayStats::Filtered { filtered, .. } => {
                filtered.chips.iter().map(|c| c.label()).collect()
            }
            DisplayStats::Attached { .. } => Vec::new(),
        };
        if !chips.is_empty() {
            md.push_str(&format!("{}\n\n", chips.join(" · ")));
        }

        let mut header: Vec<&str> = Vec::new();
        if comparison {
            header.push("run");
        }
        header.extend(self.columns.iter().map(String::as_str));
        md.push_str(&format!("| {} |\n", header.join(" | ")));
        md.push_str(&format!("|{}\n", " --- |".repeat(header.len())));

        for row in &self.rows {
            let mut fields: Vec<String> = Vec::new();
            if comparison {
                fields.push(escape_markdown(row.run.as_deref().unwrap_or_default()));
            }
            fields.extend(row.cells.iter().map(|c| escape_markdown(c)));
            md.push_str(&format!("| {} |\n", fields.join(" | ")));
        }

        md
    }
}

fn cells(result: &EvaluationResult, columns: &[SortColumn]) -> Vec<String> {
    columns.iter().map(|c| cell_text(result, c)).collect()
}

/// Display text of one cell.
pub fn cell_text(result: &EvaluationResult, column: &SortColumn) -> String {
    let outcome = &result.outcome;
    match column {
        SortColumn::Function => result.function.clone().unwrap_or_default(),
        SortColumn::Dataset => result.dataset.clone().unwrap_or_default(),
        SortColumn::Labels => result.labels.join(", "),
        SortColumn::Input => outcome.input.as_ref().map(render_value).unwrap_or_default(),
        SortColumn::Output => outcome.output.as_ref().map(render_value).unwrap_or_default(),
        SortColumn::Reference => outcome
            .reference
            .as_ref()
            .map(render_value)
            .unwrap_or_default(),
        SortColumn::Error => result.error().unwrap_or_default().to_string(),
        SortColumn::Scores => result
            .scores()
            .iter()
            .map(score_text)
            .collect::<Vec<_>>()
            .join("; "),
        SortColumn::Score(key) => result.score(key).map(score_text).unwrap_or_default(),
        SortColumn::Latency => result
            .latency()
            .map(|l| format!("{:.3}", l))
            .unwrap_or_default(),
        SortColumn::Status => result.status.as_str().to_string(),
        SortColumn::Annotation => result.annotation().unwrap_or_default().to_string(),
    }
}

fn score_text(score: &Score) -> String {
    let verdict = score.passed.map(|p| if p { "passed" } else { "failed" });
    match (&score.value, verdict) {
        (Some(value), Some(verdict)) => format!("{}: {} ({})", score.key, value, verdict),
        (Some(value), None) => format!("{}: {}", score.key, value),
        (None, Some(verdict)) => format!("{}: {}", score.key, verdict),
        (None, None) => score.key.clone(),
    }
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|").replace("\r\n", "<br>").replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OrdinalIdentity;
    use crate::session::SessionState;
    use crate::store::SnapshotStore;
    use chrono::TimeZone;
    use runlens_core::RunSnapshot;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn single_view(results: Vec<EvaluationResult>, search: &str) -> DashboardView {
        let store = SnapshotStore::new();
        store.put(RunSnapshot::new("r1", results).with_name("baseline"));
        let mut session = SessionState::for_run("r1");
        session.search = search.to_string();
        DashboardView::build(&store, &session, &OrdinalIdentity).unwrap()
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("hello"), "hello");
        assert_eq!(escape_csv("hello,world"), "\"hello,world\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_empty_view_exports_nothing() {
        let view = single_view(vec![EvaluationResult::new("a")], "zzz");
        assert!(ExportPayload::build(&view, &[], timestamp()).is_none());
    }

    #[test]
    fn test_csv_only_visible_rows_and_columns() {
        let view = single_view(
            vec![
                EvaluationResult::new("keep")
                    .with_output("a, b")
                    .with_score(Score::pass_fail("acc", true)),
                EvaluationResult::new("drop"),
            ],
            "keep",
        );
        let payload = ExportPayload::build(
            &view,
            &[SortColumn::Function, SortColumn::Output, SortColumn::Scores],
            timestamp(),
        )
        .unwrap();

        assert_eq!(
            payload.to_csv(),
            "function,output,scores\r\nkeep,\"a, b\",acc: passed\r\n"
        );
        assert_eq!(payload.visible_count, 1);
        assert_eq!(payload.total_count, 2);
    }

    #[test]
    fn test_markdown_table() {
        let view = single_view(vec![EvaluationResult::new("a|b").with_latency(0.25)], "");
        let payload = ExportPayload::build(
            &view,
            &[SortColumn::Function, SortColumn::Latency],
            timestamp(),
        )
        .unwrap();
        let md = payload.to_markdown();
        assert!(md.starts_with("## baseline\n"));
        assert!(md.contains("2025-03-01 12:00:00 UTC"));
        assert!(md.contains("| function | latency |\n| --- | --- |\n"));
        assert!(md.contains("| a\\|b | 0.250 |"));
    }

    #[test]
    fn test_json_carries_timestamp_and_stats() {
        let view = single_view(vec![EvaluationResult::new("a")], "");
        let payload = ExportPayload::build(&view, &[], timestamp()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&payload.render(ExportFormat::Json).unwrap()).unwrap();
        assert_eq!(value["generated_at"], "2025-03-01T12:00:00Z");
        assert_eq!(value["stats"]["mode"], "full");
        assert_eq!(value["columns"].as_array().unwrap().len(), DEFAULT_COLUMNS.len());
    }

    #[test]
    fn test_comparison_export_has_run_column() {
        let store = SnapshotStore::new();
        store.put(RunSnapshot::new("a", vec![EvaluationResult::new("t1")]).with_name("base"));
        store.put(
            RunSnapshot::new(
                "b",
                vec![EvaluationResult::new("t1"), EvaluationResult::new("t2")],
            )
            .with_name("cand"),
        );
        let mut session = SessionState::default();
        session.comparison.add("a");
        session.comparison.add("b");
        let view = DashboardView::build(&store, &session, &OrdinalIdentity).unwrap();

        let payload =
            ExportPayload::build(&view, &[SortColumn::Function], timestamp()).unwrap();
        assert_eq!(payload.runs, vec!["base", "cand"]);
        assert_eq!(
            payload.to_csv(),
            "run,function\r\nbase,t1\r\ncand,t1\r\ncand,t2\r\n"
        );
    }

    #[test]
    fn test_parse_columns_falls_back_to_defaults() {
        assert_eq!(parse_columns(&["bogus"]), DEFAULT_COLUMNS.to_vec());
        assert_eq!(
            parse_columns(&["latency", "score.acc"]),
            vec![SortColumn::Latency, SortColumn::Score("acc".into())]
        );
    }
}
