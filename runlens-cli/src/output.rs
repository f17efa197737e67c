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

//! Plain-text rendering for terminal output.

use runlens_core::{RunSummary, ScoreChip};
use runlens_live::SnapshotDiff;
use runlens_query::{
    cell_text, ComparisonView, DashboardView, DisplayStats, Progress, SingleRunView, SortColumn,
};

const CELL_WIDTH: usize = 40;

pub fn print_runs(session: &str, runs: &[RunSummary]) {
    println!("Runs in session '{}' ({}):", session, runs.len());
    println!("{}", "=".repeat(60));
    for run in runs {
        println!(
            "  {} ({}) - {}/{} done, {} errors, {}",
            run.run_name.as_deref().unwrap_or("-"),
            run.run_id,
            run.completed,
            run.total_evaluations,
            run.errors,
            run.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    if runs.is_empty() {
        println!("  No runs found.");
    }
}

pub fn print_view(view: &DashboardView) {
    match view {
        DashboardView::Single(single) => print_single(single),
        DashboardView::Comparison(comparison) => print_comparison(comparison),
    }
}

pub fn print_update(diff: &SnapshotDiff, progress: &Progress) {
    println!(
        "↻ {} changed, {} added, {} removed - {}/{} finished ({:.0}%)",
        diff.changed.len(),
        diff.added.len(),
        diff.removed.len(),
        progress.done(),
        progress.total,
        progress.percent_complete()
    );
    for key in &diff.changed {
        println!("    {}", key);
    }
}

fn print_single(view: &SingleRunView) {
    println!("Run {} ({})", view.snapshot.display_name(), view.snapshot.run_id);
    print_stats(&view.stats);
    println!(
        "Showing {} of {} rows",
        view.order.len(),
        view.rows.len()
    );
    println!("{}", "-".repeat(60));

    for row in view.visible() {
        let result = &row.result;
        println!(
            "  [{:<11}] {}  {}s  {}",
            result.status.as_str(),
            row.key,
            or_dash(cell_text(result, &SortColumn::Latency)),
            or_dash(cell_text(result, &SortColumn::Scores))
        );
        if let Some(error) = result.error() {
            println!("      error: {}", truncate(error));
        }
    }
}

fn print_comparison(view: &ComparisonView) {
    println!("Comparing {} runs", view.matrix.runs.len());
    print_stats(&view.stats);
    println!(
        "Showing {} of {} cases",
        view.order.len(),
        view.matrix.entries.len()
    );
    println!("{}", "-".repeat(60));

    for entry in view.visible() {
        println!("  {}", entry.key);
        for (slot, run) in entry.slots.iter().zip(&view.matrix.runs) {
            match slot {
                Some(slot) => println!(
                    "      {:<20} [{:<11}] {}",
                    run.run_name,
                    slot.result.status.as_str(),
                    or_dash(cell_text(&slot.result, &SortColumn::Scores))
                ),
                None => println!("      {:<20} (not in run)", run.run_name),
            }
        }
    }
}

fn print_stats(stats: &DisplayStats) {
    match stats {
        DisplayStats::Full(full) => {
            println!("  Scores: {}", chips(&full.chips));
            println!("  Avg latency: {}", latency(full.average_latency));
            println!(
                "  Progress: {}/{} ({:.0}%)",
                full.progress.done(),
                full.progress.total,
                full.progress.percent_complete()
            );
        }
        DisplayStats::Filtered { full, filtered } => {
            println!(
                "  Scores (filtered, {} rows): {}",
                filtered.filtered_count,
                chips(&filtered.chips)
            );
            println!("  Avg latency (filtered): {}", latency(filtered.average_latency));
            println!("  Scores (all): {}", chips(&full.chips));
        }
        DisplayStats::Attached { runs } => {
            for run in runs {
                println!(
                    "  {}: {} | avg latency {}",
                    run.run_name,
                    chips(&run.score_chips),
                    latency(run.average_latency)
                );
            }
        }
    }
}

fn chips(chips: &[ScoreChip]) -> String {
    if chips.is_empty() {
        return "-".to_string();
    }
    chips
        .iter()
        .map(ScoreChip::label)
        .collect::<Vec<_>>()
        .join(", ")
}

fn latency(value: Option<f64>) -> String {
    value
        .map(|l| format!("{:.3}s", l))
        .unwrap_or_else(|| "-".to_string())
}

fn or_dash(text: String) -> String {
    if text.is_empty() {
        "-".to_string()
    } else {
        truncate(&text)
    }
}

fn truncate(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= CELL_WIDTH && !text.contains('\n') {
        return line.to_string();
    }
    let cut: String = line.chars().take(CELL_WIDTH).collect();
    format!("{}…", cut)
}
