/*
 * bytedb-analyze: taint analysis over a serialized program graph
 *
 * Usage:
 *   bytedb-analyze -a taint.json -s "com.app" -l program.json
 *   bytedb-analyze -a taint.json -s "com.app;com.web" -cp out/program.json --sarif -o report.sarif
 *
 * Exit codes:
 *   0  analysis completed (possibly partial, see the report header)
 *   1  argument or configuration error
 *   2  analysis aborted on an internal error
 */

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use bytedb_analysis::adapters::{to_sarif, FileDatabase, Report};
use bytedb_analysis::config::AnalysisConfig;
use bytedb_analysis::errors::EngineError;
use bytedb_analysis::features::ifds::application::{resolve_start_methods, run_analysis};
use bytedb_analysis::features::ifds::infrastructure::Outcome;
use bytedb_analysis::features::ifds::ports::Analyzer;
use bytedb_analysis::features::taint::{BackwardTaintAnalyzer, TaintAnalyzer};
use bytedb_analysis::shared::models::ApplicationGraph;

#[derive(Parser)]
#[command(name = "bytedb-analyze")]
#[command(about = "Interprocedural taint analysis over a JVM program graph", long_about = None)]
struct Cli {
    /// Analysis configuration (taint rules + engine settings, JSON)
    #[arg(short = 'a', long = "analysis-conf")]
    analysis_conf: PathBuf,

    /// Serialized program-graph database
    #[arg(short = 'l', long = "db-location")]
    db_location: Option<PathBuf>,

    /// Semicolon-separated class-name prefixes selecting start methods
    #[arg(short = 's', long = "start")]
    start: String,

    /// Report file
    #[arg(short = 'o', long = "output", default_value = "report.json")]
    output: PathBuf,

    /// Class path; the first serialized-graph entry is used when no
    /// --db-location is given (defaults to $CLASSPATH)
    #[arg(short = 'c', long = "classpath", visible_alias = "cp")]
    classpath: Option<String>,

    /// Emit SARIF instead of the native JSON report
    #[arg(long)]
    sarif: bool,

    /// Couple a backward (demand) runner to every unit
    #[arg(long)]
    backward: bool,
}

fn graph_location(cli: &Cli) -> Result<PathBuf, EngineError> {
    if let Some(location) = &cli.db_location {
        return Ok(location.clone());
    }
    let classpath = cli
        .classpath
        .clone()
        .or_else(|| std::env::var("CLASSPATH").ok())
        .unwrap_or_default();
    classpath
        .split(if cfg!(windows) { ';' } else { ':' })
        .map(PathBuf::from)
        .find(|entry| entry.extension().is_some_and(|ext| ext == "json"))
        .ok_or_else(|| {
            EngineError::config(
                "no program graph: pass --db-location or a serialized-graph classpath entry",
            )
        })
}

fn run(cli: &Cli) -> Result<Outcome, EngineError> {
    let config = AnalysisConfig::from_file(&cli.analysis_conf)?;
    let rules = Arc::new(config.effective_rules());
    let depth = config.engine.max_access_path_depth;

    let graph: Arc<dyn ApplicationGraph> = Arc::new(FileDatabase::load(&graph_location(cli)?)?);

    let prefixes: Vec<String> = cli
        .start
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if prefixes.is_empty() {
        return Err(EngineError::config("--start must name at least one prefix"));
    }
    let starts = resolve_start_methods(graph.as_ref(), &prefixes);
    info!(start_methods = starts.len(), "resolved start methods");

    let analyzer = Arc::new(TaintAnalyzer::new(rules.clone(), depth));
    let backward: Option<Arc<dyn Analyzer>> = cli
        .backward
        .then(|| Arc::new(BackwardTaintAnalyzer::new(rules, depth)) as Arc<dyn Analyzer>);

    let result = run_analysis(graph.clone(), analyzer, backward, &starts, &config.engine)?;

    let rendered = if cli.sarif {
        serde_json::to_string_pretty(&to_sarif(graph.as_ref(), &result))?
    } else {
        Report::build(graph.as_ref(), &result).to_json()?
    };
    std::fs::write(&cli.output, rendered)?;

    info!(
        findings = result.findings.len(),
        output = %cli.output.display(),
        "report written"
    );
    Ok(result.outcome)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(Outcome::Aborted) => {
            error!("analysis aborted; see the report diagnostic");
            ExitCode::from(2)
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "analysis failed");
            ExitCode::from(1)
        }
    }
}
