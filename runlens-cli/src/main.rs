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

//! Runlens CLI
//!
//! Inspect, compare, export and follow evaluation runs from the terminal.

mod output;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use runlens_core::{
    parse_compare_run_names, resolve_run_name, DashboardConfig, ExportFormat, TriState,
};
use runlens_live::{DirectoryRunSource, HttpRunSource, LiveReconciler, RunSource};
use runlens_query::{
    parse_columns, summarize, DashboardView, ExportPayload, OrdinalIdentity, PassRule,
    SessionState, SnapshotStore, SortKey, SortState, ValueRule,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runlens")]
#[command(about = "Runlens - evaluation run dashboard", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read runs from this results server instead of the local directory
    #[arg(long)]
    server: Option<String>,

    /// Local results directory (overrides config)
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the runs of a session, newest first
    Runs {
        #[arg(long, default_value = "default")]
        session: String,
    },

    /// Show one run with filters and sorting applied
    Show {
        /// Run name (with --session) or run id
        run: String,

        #[arg(long)]
        session: Option<String>,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Compare 2-4 runs side by side
    Compare {
        /// Comma-separated run names (with --session) or run ids
        runs: String,

        #[arg(long)]
        session: Option<String>,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Export the visible rows of one run or a comparison
    Export {
        /// One run, or 2-4 comma-separated runs to compare
        runs: String,

        #[arg(long)]
        session: Option<String>,

        /// json, csv or markdown (defaults to the configured format)
        #[arg(short, long)]
        format: Option<String>,

        /// Columns to export, e.g. `function,latency,score.accuracy`
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Follow an in-progress run until every row has finished
    Watch {
        run: String,

        #[arg(long)]
        session: Option<String>,
    },

    /// Print the shareable query string for a view
    Link {
        /// One run, or 2-4 comma-separated runs to compare
        runs: String,

        #[arg(long)]
        session: Option<String>,

        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Flag {
    Yes,
    No,
}

impl From<Flag> for TriState {
    fn from(flag: Flag) -> Self {
        match flag {
            Flag::Yes => TriState::Positive,
            Flag::No => TriState::Negative,
        }
    }
}

/// Filter, search and sort options shared by the view commands.
#[derive(Args, Debug, Default)]
struct QueryArgs {
    /// Free-text search
    #[arg(short, long)]
    search: Option<String>,

    /// Score threshold such as `accuracy>=0.8` (repeatable)
    #[arg(long = "where", value_name = "RULE")]
    value_rules: Vec<String>,

    /// Pass/fail requirement such as `correct=false` (repeatable)
    #[arg(long = "pass", value_name = "RULE")]
    pass_rules: Vec<String>,

    #[arg(long, value_enum)]
    has_error: Option<Flag>,

    #[arg(long, value_enum)]
    has_url: Option<Flag>,

    #[arg(long, value_enum)]
    has_messages: Option<Flag>,

    #[arg(long, value_enum)]
    annotation: Option<Flag>,

    /// Only these datasets (repeatable)
    #[arg(long)]
    dataset: Vec<String>,

    #[arg(long)]
    exclude_dataset: Vec<String>,

    /// Only rows carrying one of these labels (repeatable)
    #[arg(long)]
    label: Vec<String>,

    #[arg(long)]
    exclude_label: Vec<String>,

    /// Sort keys, e.g. `latency:desc,function`
    #[arg(long)]
    sort: Option<String>,

    /// Start from a query string produced by `runlens link`
    #[arg(long)]
    link: Option<String>,
}

impl QueryArgs {
    /// Applies the options on top of `session`; explicit flags win over `--link`.
    fn apply(&self, session: &mut SessionState) -> Result<()> {
        if let Some(link) = &self.link {
            let shared = SessionState::from_query_params(link);
            session.filter = shared.filter;
            session.search = shared.search;
            session.sort = shared.sort;
        }

        if let Some(search) = &self.search {
            session.search = search.clone();
        }
        for expr in &self.value_rules {
            match ValueRule::parse(expr) {
                Some(rule) => session.filter.value_rules.push(rule),
                None => bail!("Invalid score rule '{}', expected e.g. accuracy>=0.8", expr),
            }
        }
        for expr in &self.pass_rules {
            match PassRule::parse(expr) {
                Some(rule) => session.filter.pass_rules.push(rule),
                None => bail!("Invalid pass rule '{}', expected e.g. correct=false", expr),
            }
        }

        let toggles = [
            (self.has_error, &mut session.filter.has_error),
            (self.has_url, &mut session.filter.has_url),
            (self.has_messages, &mut session.filter.has_messages),
            (self.annotation, &mut session.filter.annotation),
        ];
        for (flag, state) in toggles {
            if let Some(flag) = flag {
                *state = flag.into();
            }
        }

        session.filter.datasets.include.extend(self.dataset.iter().cloned());
        session
            .filter
            .datasets
            .exclude
            .extend(self.exclude_dataset.iter().cloned());
        session.filter.labels.include.extend(self.label.iter().cloned());
        session
            .filter
            .labels
            .exclude
            .extend(self.exclude_label.iter().cloned());

        if let Some(sort) = &self.sort {
            let keys = sort
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(SortKey::parse)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| anyhow::anyhow!("Invalid sort: {}", e))?;
            session.sort = SortState { keys };
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config =
        DashboardConfig::load(cli.config.clone()).context("Failed to load configuration")?;
    if let Some(dir) = &cli.results_dir {
        config.source.results_dir = dir.clone();
    }

    let source: Arc<dyn RunSource> = match &cli.server {
        Some(url) => {
            config.source.base_url = url.clone();
            Arc::new(
                HttpRunSource::from_config(&config.source)
                    .context("Invalid results server URL")?,
            )
        }
        None => Arc::new(DirectoryRunSource::new(config.source.results_dir.clone())),
    };
    debug!(source = %source.describe(), "Using run source");

    let live = Arc::new(LiveReconciler::new(
        Arc::clone(&source),
        Arc::new(SnapshotStore::new()),
        Arc::new(OrdinalIdentity),
        &config.polling,
    ));

    match cli.command {
        Commands::Runs { session } => {
            let runs = source
                .list_runs(&session)
                .await
                .with_context(|| format!("Failed to list runs of session '{}'", session))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else {
                output::print_runs(&session, &runs);
            }
        }

        Commands::Show {
            run,
            session,
            query,
        } => {
            let mut state =
                SessionState::for_run(resolve_run(source.as_ref(), session.as_deref(), &run).await?);
            query.apply(&mut state)?;
            let view = load_view(&live, &state).await?;
            print_view(&view, cli.json)?;
        }

        Commands::Compare {
            runs,
            session,
            query,
        } => {
            let mut state = session_for(source.as_ref(), session.as_deref(), &runs).await?;
            if !state.is_comparison() {
                bail!("compare needs 2-4 runs, got '{}'", runs);
            }
            query.apply(&mut state)?;
            let view = load_view(&live, &state).await?;
            print_view(&view, cli.json)?;
        }

        Commands::Export {
            runs,
            session,
            format,
            columns,
            output,
            query,
        } => {
            let mut state = session_for(source.as_ref(), session.as_deref(), &runs).await?;
            query.apply(&mut state)?;
            let view = load_view(&live, &state).await?;

            let format: ExportFormat = match format {
                Some(f) => f.parse()?,
                None => config.export.format,
            };
            let columns = if columns.is_empty() {
                parse_columns(&config.export.columns)
            } else {
                parse_columns(&columns)
            };

            let Some(payload) = ExportPayload::build(&view, &columns, Utc::now()) else {
                println!("✗ No visible rows, nothing exported");
                return Ok(());
            };
            let rendered = payload.render(format)?;

            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    info!(path = ?path, rows = payload.rows.len(), "Export written");
                    println!("✓ Exported {} rows to {}", payload.rows.len(), path.display());
                }
                None => print!("{}", rendered),
            }
        }

        Commands::Watch { run, session } => {
            let run_id = resolve_run(source.as_ref(), session.as_deref(), &run).await?;
            watch_run(&live, run_id, cli.json).await?;
        }

        Commands::Link {
            runs,
            session,
            query,
        } => {
            let mut state = session_for(source.as_ref(), session.as_deref(), &runs).await?;
            query.apply(&mut state)?;
            println!("?{}", state.to_query_params());
        }
    }

    Ok(())
}

/// Maps a run name to its id within `session`; anything else is taken as an id.
async fn resolve_run(source: &dyn RunSource, session: Option<&str>, run: &str) -> Result<String> {
    let Some(session) = session else {
        return Ok(run.to_string());
    };

    let runs = source
        .list_runs(session)
        .await
        .with_context(|| format!("Failed to list runs of session '{}'", session))?;
    match resolve_run_name(&runs, session, run, false)? {
        Some(summary) => Ok(summary.run_id.clone()),
        None => {
            debug!(run = %run, session = %session, "No run by that name, treating it as an id");
            Ok(run.to_string())
        }
    }
}

/// Session for one run, or a comparison when several are listed.
async fn session_for(
    source: &dyn RunSource,
    session: Option<&str>,
    runs: &str,
) -> Result<SessionState> {
    if !runs.contains(',') {
        return Ok(SessionState::for_run(
            resolve_run(source, session, runs.trim()).await?,
        ));
    }

    let names = parse_compare_run_names(runs)?;
    let mut state = SessionState::default();
    for name in &names {
        let run_id = resolve_run(source, session, name).await?;
        if state.run_id.is_none() {
            state.run_id = Some(run_id.clone());
        }
        if !state.comparison.add(run_id) {
            bail!("'{}' resolves to a run that is already being compared", name);
        }
    }
    Ok(state)
}

async fn load_view(live: &LiveReconciler, state: &SessionState) -> Result<DashboardView> {
    live.load_many(&state.referenced_runs())
        .await
        .context("Failed to load run data")?;
    DashboardView::build(live.store(), state, &OrdinalIdentity)
        .context("Run data is not available")
}

fn print_view(view: &DashboardView, json: bool) -> Result<()> {
    if json {
        match ExportPayload::build(view, &[], Utc::now()) {
            Some(payload) => println!("{}", payload.to_json()?),
            None => println!("{{\"rows\": [], \"visible_count\": 0}}"),
        }
    } else {
        output::print_view(view);
    }
    Ok(())
}

async fn watch_run(live: &Arc<LiveReconciler>, run_id: String, json: bool) -> Result<()> {
    live.load(&run_id)
        .await
        .with_context(|| format!("Failed to load run '{}'", run_id))?;
    let session = SessionState::for_run(run_id.clone());

    let Some(mut handle) = live.watch(&session) else {
        println!("✓ Run {} has no rows in progress", run_id);
        return Ok(());
    };
    println!(
        "Watching run {} (every {} ms, Ctrl-C to stop)",
        run_id,
        live.interval().as_millis()
    );

    loop {
        tokio::select! {
            update = handle.next_update() => {
                let Some(update) = update else { break };
                if json {
                    println!("{}", serde_json::to_string(&update.diff)?);
                } else if let Some(snapshot) = live.store().get(&update.run_id) {
                    output::print_update(&update.diff, &summarize(&snapshot).progress);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                break;
            }
        }
    }
    handle.wait_idle().await;

    if let Some(snapshot) = live.store().get(&run_id) {
        let progress = summarize(&snapshot).progress;
        println!(
            "✓ Stopped watching: {}/{} rows finished",
            progress.done(),
            progress.total
        );
    }
    Ok(())
}
