mod scenarios;

use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, value_parser};
use directories::ProjectDirs;
use launchgate::config::InterceptSettings;
use launchgate::decision::DecisionRule;
use launchgate::engine::{DecisionEngine, DefaultDelegate};
use launchgate::handlers::DryRunLauncher;
use launchgate::urls::DenyList;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::scenarios::{InterceptScenario, find_scenario, scenarios};

#[derive(Parser, Debug)]
#[command(name = "launchgate-bench", author, version, about = "Decision engine benchmark harness", long_about = None)]
struct BenchCli {
    /// Increase logging verbosity.
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Location to write benchmark reports.
    #[arg(long, value_parser = value_parser!(PathBuf))]
    output: Option<PathBuf>,

    /// Command to execute.
    #[command(subcommand)]
    command: BenchCommand,
}

#[derive(Subcommand, Debug)]
enum BenchCommand {
    /// Time repeated evaluations of one or all scenarios.
    Run(RunCommand),
    /// List the built-in scenarios.
    List,
}

#[derive(Args, Debug)]
struct RunCommand {
    /// Scenario identifier to execute; all scenarios run when omitted.
    #[arg(long)]
    scenario: Option<String>,

    /// Number of evaluations per scenario.
    #[arg(long, default_value_t = 1000)]
    iterations: u32,
}

#[derive(Debug, Serialize)]
struct ScenarioResult {
    name: &'static str,
    rule: DecisionRule,
    expected: DecisionRule,
    matched: bool,
    iterations: u32,
    mean_ns: u128,
}

#[derive(Debug, Serialize)]
struct BenchReport {
    generated_at: DateTime<Utc>,
    results: Vec<ScenarioResult>,
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        "launchgate_bench=debug"
    } else {
        "launchgate_bench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = BenchCli::parse();
    init_tracing(cli.verbose);

    let output_root = cli.output.unwrap_or_else(|| {
        ProjectDirs::from("org", "launchgate", "Launchgate")
            .map(|dirs| dirs.data_dir().join("benchmarks"))
            .unwrap_or_else(|| PathBuf::from("./benchmarks"))
    });

    match &cli.command {
        BenchCommand::Run(cmd) => handle_run(cmd, &output_root)?,
        BenchCommand::List => {
            for scenario in scenarios() {
                println!("{:<18} {}", scenario.name, scenario.description);
            }
        }
    }

    Ok(())
}

fn handle_run(cmd: &RunCommand, output_root: &Path) -> Result<()> {
    let selected: Vec<&InterceptScenario> = match cmd.scenario.as_deref() {
        Some(name) => match find_scenario(name) {
            Some(scenario) => vec![scenario],
            None => bail!("Unknown scenario '{name}'"),
        },
        None => scenarios().iter().collect(),
    };
    let iterations = cmd.iterations.max(1);

    let settings = InterceptSettings::default();
    let denylist = DenyList::new(&settings.denylist_patterns);
    let mut results = Vec::with_capacity(selected.len());
    for scenario in selected {
        let result = run_scenario(scenario, &settings, &denylist, iterations);
        if result.matched {
            info!(scenario = result.name, mean_ns = result.mean_ns as u64, "scenario complete");
        } else {
            warn!(
                scenario = result.name,
                rule = ?result.rule,
                expected = ?result.expected,
                "scenario ended on an unexpected rule"
            );
        }
        results.push(result);
    }

    let report = BenchReport {
        generated_at: Utc::now(),
        results,
    };
    let path = write_report(&report, output_root)?;
    info!(path = %path.display(), "benchmark report written");
    Ok(())
}

fn run_scenario(
    scenario: &InterceptScenario,
    settings: &InterceptSettings,
    denylist: &DenyList,
    iterations: u32,
) -> ScenarioResult {
    let resolver = scenario.resolver();
    let engine = DecisionEngine::new(
        settings,
        denylist,
        &resolver,
        &DryRunLauncher,
        &DefaultDelegate,
    );
    let request = scenario.request();

    let rule = engine.evaluate(&request).rule;
    let started = Instant::now();
    for _ in 0..iterations {
        let _ = engine.evaluate(&request);
    }
    let mean_ns = started.elapsed().as_nanos() / u128::from(iterations);

    ScenarioResult {
        name: scenario.name,
        rule,
        expected: scenario.expected,
        matched: rule == scenario.expected,
        iterations,
        mean_ns,
    }
}

fn write_report(report: &BenchReport, output_root: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_root).with_context(|| {
        format!(
            "Unable to create benchmark output directory {}",
            output_root.display()
        )
    })?;
    let timestamp = report.generated_at.format("%Y%m%dT%H%M%SZ");
    let path = output_root.join(format!("report-{timestamp}.json"));
    let body = serde_json::to_string_pretty(report)?;
    fs::write(&path, body)
        .with_context(|| format!("Unable to write benchmark report {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_defaults() {
        let cli = BenchCli::parse_from(["launchgate-bench", "run"]);
        match cli.command {
            BenchCommand::Run(cmd) => {
                assert!(cmd.scenario.is_none());
                assert_eq!(cmd.iterations, 1000);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parses_run_options() {
        let cli = BenchCli::parse_from([
            "launchgate-bench",
            "--output",
            "/tmp/reports",
            "run",
            "--scenario",
            "fallback-clobber",
            "--iterations",
            "10",
        ]);
        assert_eq!(cli.output, Some(PathBuf::from("/tmp/reports")));
        match cli.command {
            BenchCommand::Run(cmd) => {
                assert_eq!(cmd.scenario.as_deref(), Some("fallback-clobber"));
                assert_eq!(cmd.iterations, 10);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn scenario_lookup_ignores_case() {
        assert!(find_scenario("Direct-Intent").is_some());
        assert!(find_scenario("  ").is_none());
        assert!(find_scenario("missing").is_none());
    }

    #[test]
    fn every_scenario_reaches_its_expected_rule() {
        let settings = InterceptSettings::default();
        let denylist = DenyList::new(&settings.denylist_patterns);
        for scenario in scenarios() {
            let result = run_scenario(scenario, &settings, &denylist, 1);
            assert!(
                result.matched,
                "{} ended on {:?}",
                scenario.name, result.rule
            );
        }
    }
}
