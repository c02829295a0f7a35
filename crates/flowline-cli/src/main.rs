use anyhow::{Context, Result, bail};
use clap::Parser;
use flowline_core::data_loader::{ScenarioData, build_factory};
use flowline_core::event::EventKind;
use flowline_core::factory::Factory;
use flowline_core::fixed::{Fixed64, fixed64_to_f64};
use flowline_core::validation::check_invariants;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Built-in scenario: five miners, five furnaces and five gear assemblers.
const IRON_GEARS: &str = include_str!("../scenarios/iron_gears.json");

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "flowline", about = "Run a production line flow simulation")]
struct Cli {
    /// Scenario JSON file. Defaults to the built-in iron gear line.
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Number of frames to run.
    #[arg(long, default_value_t = 600)]
    ticks: u64,
    /// Seconds per frame.
    #[arg(long, default_value_t = 0.1)]
    dt: f64,
    /// Overrides the scenario seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Log a status report every N frames (0 disables).
    #[arg(long, default_value_t = 100)]
    report_every: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut factory = load(&cli)?;
    let dt = Fixed64::checked_from_num(cli.dt).with_context(|| format!("--dt {} is out of range", cli.dt))?;
    if dt <= Fixed64::ZERO {
        bail!("--dt must be positive, got {}", cli.dt);
    }

    info!(
        machines = factory.machine_count(),
        connections = factory.connection_count(),
        seed = factory.config().seed,
        "factory ready"
    );

    for frame in 1..=cli.ticks {
        factory.advance(dt).with_context(|| format!("frame {frame}"))?;
        for event in factory.drain_events() {
            debug!(?event);
        }
        if cli.report_every > 0 && frame % cli.report_every == 0 {
            report(&factory);
        }
    }

    let violations = check_invariants(&factory);
    for v in &violations {
        warn!(?v, "invariant violated");
    }
    summary(&factory);
    if !violations.is_empty() {
        bail!("{} invariant violations", violations.len());
    }
    Ok(())
}

fn load(cli: &Cli) -> Result<Factory> {
    let text = match &cli.scenario {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        None => IRON_GEARS.to_string(),
    };
    let mut data = ScenarioData::from_json(&text).context("parsing scenario")?;
    if let Some(seed) = cli.seed {
        data.config.seed = Some(seed);
    }
    build_factory(data).context("building factory")
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

fn stocks(stocks: &[flowline_core::query::Stock]) -> String {
    stocks
        .iter()
        .map(|s| format!("{} {:.2}", s.name, fixed64_to_f64(s.amount)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn report(factory: &Factory) {
    info!(
        tick = factory.tick(),
        elapsed = fixed64_to_f64(factory.elapsed()),
        "status"
    );
    for m in factory.snapshot_all_machines() {
        info!(
            "  {:<12} {:<9} progress {:>5.1}% in [{}] out [{}]",
            m.name,
            format!("{:?}", m.state),
            fixed64_to_f64(m.progress) * 100.0,
            stocks(&m.inputs),
            stocks(&m.outputs),
        );
    }
    for c in factory.snapshot_all_connections() {
        info!(
            "  {:<12} {:.3}/{:.3} per s ({:.0}% utilized)",
            c.ingredient_name,
            fixed64_to_f64(c.last_flow),
            fixed64_to_f64(c.max_flow_rate),
            fixed64_to_f64(c.utilization) * 100.0,
        );
    }
}

fn summary(factory: &Factory) {
    let events = factory.events();
    info!(
        ticks = factory.tick(),
        elapsed = fixed64_to_f64(factory.elapsed()),
        crafts_started = events.total_emitted(EventKind::CraftStarted),
        crafts_completed = events.total_emitted(EventKind::CraftCompleted),
        blocked = events.total_emitted(EventKind::OutputBlocked),
        "run finished"
    );
    for m in factory.snapshot_all_machines() {
        info!("  {:<12} {} crafts", m.name, m.crafts_completed);
    }
}
