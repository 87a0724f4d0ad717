//! thinking-server CLI
//!
//! Runs a branching business simulation from a seed description and prints
//! the per-month outcomes and the state tree.
//!
//! Usage:
//!   thinking-server simulate <seed description...>
//!       [--months=N] [--beam=N] [--concurrency=N] [--stub] [--json]

use std::sync::Arc;

use anyhow::{bail, Result};
use thinking_server::oracle::{StubActionOracle, StubPredictionOracle};
use thinking_server::{
    metrics, CompletionConfig, SimulationConfig, SimulationEngine, SimulationRun,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("simulate") => run_simulate(&args[2..]).await,
        Some("--help") | Some("-h") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            bail!("unknown command {other:?}; try --help");
        }
    }
}

fn print_usage() {
    println!("thinking-server - branching business-state simulation");
    println!();
    println!("USAGE:");
    println!("  thinking-server simulate <seed description...> [options]");
    println!();
    println!("OPTIONS:");
    println!("  --months=N       months to simulate (default 2)");
    println!("  --beam=N         beam width (default 4)");
    println!("  --concurrency=N  max prediction calls in flight (default 8)");
    println!("  --stub           use deterministic stub oracles (no API key needed)");
    println!("  --json           print the full tree snapshot as JSON");
}

async fn run_simulate(args: &[String]) -> Result<()> {
    let months = flag_value(args, "--months=")?.unwrap_or(2);
    let beam = flag_value(args, "--beam=")?.unwrap_or(4);
    let concurrency = flag_value(args, "--concurrency=")?.unwrap_or(8);
    let use_stub = args.iter().any(|a| a == "--stub");
    let json_output = args.iter().any(|a| a == "--json");

    let seed: String = args
        .iter()
        .filter(|a| !a.starts_with("--"))
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");
    if seed.is_empty() {
        bail!("missing seed description; usage: thinking-server simulate <seed...>");
    }

    let config = SimulationConfig {
        month_length: months,
        beam_width: beam as usize,
        concurrency_cap: concurrency as usize,
        ..Default::default()
    };

    let engine = if use_stub {
        SimulationEngine::new(
            Arc::new(StubActionOracle::new(["expand", "hire", "cut costs"])),
            Arc::new(StubPredictionOracle),
            config,
        )
    } else {
        let completion = CompletionConfig::default();
        if completion.api_key.is_empty() {
            bail!("OPENAI_API_KEY not set; set it or pass --stub");
        }
        SimulationEngine::with_remote_oracles(config, completion)
    };

    let run = engine.run(&seed).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&run.snapshot())?);
    } else {
        print_run_summary(&run);
    }
    Ok(())
}

/// Per-month table of states and their extracted metrics; this is the text
/// a downstream summarizer consumes.
fn print_run_summary(run: &SimulationRun) {
    println!("simulation {} ({} months)\n", run.id, run.month_index);

    for (month, generation) in run.history.iter().enumerate() {
        if month == 0 {
            println!("seed:");
        } else {
            println!("month {month} ({} states):", generation.len());
        }
        for state in generation {
            let m = metrics::extract(&state.description);
            let path = state.path.segments().join(" > ");
            let label = if path.is_empty() { "-".to_string() } else { path };
            println!(
                "  [revenue {:>12.0} | funding {:>12.0}] {}",
                m.revenue, m.funding, label
            );
            println!("      {}", state.description);
        }
        println!();
    }
}

/// `None` when the flag is absent; an error when its value is not a number.
fn flag_value(args: &[String], prefix: &str) -> Result<Option<u32>> {
    let Some(raw) = args
        .iter()
        .find(|a| a.starts_with(prefix))
        .and_then(|a| a.strip_prefix(prefix))
    else {
        return Ok(None);
    };
    match raw.parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) => bail!(
            "invalid value {raw:?} for {}",
            prefix.trim_end_matches('=')
        ),
    }
}
