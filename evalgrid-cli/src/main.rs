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

//! Evalgrid CLI
//!
//! Runs the column derivation and cell resolution over captured API
//! responses on disk.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use evalgrid_columns::{build_run_table_model, CellResolver, ScenarioStepsCache};
use evalgrid_core::{
    EvaluationRun, EvaluatorDefinition, GridConfig, ScenarioStepsResult, TableView,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "evalgrid")]
#[command(about = "Evalgrid - evaluation run table derivation", long_about = None)]
struct Cli {
    /// Grid config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewArg {
    Human,
    Auto,
}

impl From<ViewArg> for TableView {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::Human => TableView::Human,
            ViewArg::Auto => TableView::Auto,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the column model of a run
    Columns {
        /// Run response (`GET /preview/evaluations/runs/{id}`)
        #[arg(long)]
        run: PathBuf,

        /// Evaluator query response (`POST /preview/simple/evaluators/query`)
        #[arg(long)]
        evaluators: Option<PathBuf>,

        /// Table view, overrides the config
        #[arg(long, value_enum)]
        view: Option<ViewArg>,
    },

    /// Resolve a single cell against a scenario's steps
    Cell {
        #[arg(long)]
        run: PathBuf,

        #[arg(long)]
        evaluators: Option<PathBuf>,

        /// Scenario steps response
        #[arg(long)]
        steps: PathBuf,

        /// Scenario ID
        #[arg(long)]
        scenario: String,

        /// Column ID, as printed by `columns`
        #[arg(long)]
        column: String,
    },
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_run(path: &Path) -> Result<EvaluationRun> {
    EvaluationRun::from_json_str(&read(path)?)
        .with_context(|| format!("Failed to parse run from {}", path.display()))
}

fn load_evaluators(path: Option<&Path>) -> Result<Vec<EvaluatorDefinition>> {
    match path {
        Some(path) => EvaluatorDefinition::list_from_json_str(&read(path)?)
            .with_context(|| format!("Failed to parse evaluators from {}", path.display())),
        None => Ok(Vec::new()),
    }
}

fn load_config(path: Option<&Path>) -> Result<GridConfig> {
    match path {
        Some(path) => GridConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(GridConfig::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Columns {
            run,
            evaluators,
            view,
        } => {
            if let Some(view) = view {
                config.view = view.into();
            }
            let run = load_run(&run)?;
            let evaluators = load_evaluators(evaluators.as_deref())?;
            let model = build_run_table_model(&run, &evaluators, &config);
            info!(
                run_id = %run.id,
                columns = model.columns.len(),
                groups = model.groups.len(),
                "Derived column model"
            );
            println!("{}", serde_json::to_string_pretty(&model)?);
        }

        Commands::Cell {
            run,
            evaluators,
            steps,
            scenario,
            column,
        } => {
            let run = load_run(&run)?;
            let evaluators = load_evaluators(evaluators.as_deref())?;
            let steps = ScenarioStepsResult::from_json_str(&read(&steps)?)
                .context("Failed to parse scenario steps")?;

            let model = build_run_table_model(&run, &evaluators, &config);
            let target = model
                .column(&column)
                .with_context(|| format!("Run {} has no column {}", run.id, column))?;

            let cache = ScenarioStepsCache::new(&config.cache);
            cache.insert(&run.id, &scenario, steps);
            let cell = CellResolver::new(&cache, &run.id).resolve(&scenario, target);
            info!(
                scenario = %scenario,
                column = %target.id,
                failed = cell.failure.is_some(),
                "Resolved cell"
            );
            println!("{}", serde_json::to_string_pretty(&cell)?);
        }
    }

    Ok(())
}
