//! Command-line driver for `modelcheck-core` (spec.md §6): loads one or
//! more compiled AST JSON files plus a `fizz.yaml` run configuration,
//! explores the state space, and writes a Graphviz `.dot` rendering, a
//! JSON failure report, and (when the config declares a performance model)
//! a steady-state Markov report. Exits non-zero if any safety/liveness
//! invariant failed or a deadlock was found.

use anyhow::{Context, Result};
use modelcheck_core::ast::{ExplorationOptions, File as AstFile, LivenessMode, PerformanceModel};
use modelcheck_core::evaluator::arith::ArithEvaluator;
use modelcheck_core::{markov, output, ModelChecker};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Cli {
    /// One or more compiled AST JSON files to check together.
    ast_json: Vec<PathBuf>,
    /// Run configuration (exploration limits, liveness mode, performance model).
    config: PathBuf,
    dot_out: PathBuf,
    failures_out: PathBuf,
    markov_out: PathBuf,
}

impl Cli {
    /// Manual flag parsing, matching the teacher's `parse_database_url`
    /// idiom: `args.windows(2)` scans for `--flag value` pairs, everything
    /// else is treated as a positional AST JSON path.
    fn parse() -> Result<Cli> {
        let args: Vec<String> = std::env::args().skip(1).collect();

        let flag_value = |flag: &str| {
            args.windows(2)
                .find(|w| w[0] == flag)
                .map(|w| PathBuf::from(&w[1]))
        };

        let mut ast_json = Vec::new();
        let mut skip_next = false;
        for arg in &args {
            if skip_next {
                skip_next = false;
                continue;
            }
            if arg.starts_with("--") {
                skip_next = true;
                continue;
            }
            ast_json.push(PathBuf::from(arg));
        }

        if ast_json.is_empty() {
            anyhow::bail!("usage: modelcheck <ast.json>... [--config fizz.yaml] [--dot-out model.dot] [--failures-out failures.json] [--markov-out markov.json]");
        }

        Ok(Cli {
            ast_json,
            config: flag_value("--config").unwrap_or_else(|| PathBuf::from("fizz.yaml")),
            dot_out: flag_value("--dot-out").unwrap_or_else(|| PathBuf::from("model.dot")),
            failures_out: flag_value("--failures-out").unwrap_or_else(|| PathBuf::from("failures.json")),
            markov_out: flag_value("--markov-out").unwrap_or_else(|| PathBuf::from("markov.json")),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct FizzConfig {
    #[serde(default)]
    options: ExplorationOptions,
    #[serde(default)]
    liveness: LivenessMode,
    #[serde(default)]
    performance: PerformanceModel,
}

/// JSON-friendly shape of a [`markov::MarkovReport`]: `NodeId` isn't a
/// serde-able map key, so nodes are keyed by their plain graph index.
#[derive(Debug, Serialize)]
struct MarkovOutput {
    steady_state: Vec<(usize, f64)>,
    expected_counters: std::collections::HashMap<String, f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse()?;
    let config = load_config(&cli.config)?;

    let files: Vec<AstFile> = cli
        .ast_json
        .iter()
        .map(|path| load_ast(path))
        .collect::<Result<_>>()?;

    let checker = ModelChecker::new(files, Arc::new(ArithEvaluator), config.options, config.liveness);
    let report = checker.run().context("exploration failed")?;

    tracing::info!(
        nodes = report.nodes_visited,
        edges = report.edges,
        safety_failures = report.safety_failures.len(),
        liveness_failures = report.liveness_failures.len(),
        deadlocks = report.deadlocks.len(),
        "exploration complete"
    );

    let highlight: Vec<_> = report
        .safety_failures
        .iter()
        .filter_map(|e| match e {
            modelcheck_core::ModelError::Assertion { node, .. } => Some(*node),
            _ => None,
        })
        .chain(report.deadlocks.iter().copied())
        .collect();
    std::fs::write(&cli.dot_out, output::to_dot(&report.graph, &highlight))
        .with_context(|| format!("writing {}", cli.dot_out.display()))?;

    let failure_reports: Vec<_> = report
        .safety_failures
        .iter()
        .chain(report.liveness_failures.iter())
        .filter_map(|e| output::failure_report(&report.graph, e))
        .collect();
    std::fs::write(
        &cli.failures_out,
        serde_json::to_string_pretty(&failure_reports)?,
    )
    .with_context(|| format!("writing {}", cli.failures_out.display()))?;

    let roots: Vec<_> = report
        .graph
        .node_indices()
        .filter(|&id| report.graph.node(id).map(|d| d.is_init).unwrap_or(false))
        .collect();
    if !roots.is_empty() {
        let markov_report = markov::analyze(&report.graph, &config.performance, &roots);
        let markov_output = MarkovOutput {
            steady_state: markov_report
                .steady_state
                .iter()
                .map(|(id, p)| (id.index(), *p))
                .collect(),
            expected_counters: markov_report.expected_counters,
        };
        std::fs::write(&cli.markov_out, serde_json::to_string_pretty(&markov_output)?)
            .with_context(|| format!("writing {}", cli.markov_out.display()))?;
    }

    if report.safety_failures.is_empty() && report.liveness_failures.is_empty() && report.deadlocks.is_empty() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn load_config(path: &PathBuf) -> Result<FizzConfig> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no run configuration found, using defaults");
        return Ok(FizzConfig::default());
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_ast(path: &PathBuf) -> Result<AstFile> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
