use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use culture_app::{RunSummary, TracingRecorder, format_generation, load_config, render_map};
use culture_core::{Simulation, SimulationConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "culture-sim",
    version,
    about = "Run the horizontal/vertical social-learning simulation headlessly"
)]
struct Cli {
    /// JSON file with simulation settings; flags below override it.
    #[arg(long, env = "CULTURE_CONFIG")]
    config: Option<PathBuf>,

    /// Grid width in cells.
    #[arg(long)]
    width: Option<u32>,

    /// Grid height in cells.
    #[arg(long)]
    height: Option<u32>,

    /// Fraction of key positions rewritten each generation.
    #[arg(long)]
    key_change: Option<f64>,

    /// Fraction of new agents that learn from peers.
    #[arg(long)]
    horizontal_ratio: Option<f64>,

    /// Fraction of learners kept as role models at each generation boundary.
    #[arg(long)]
    role_model_ratio: Option<f64>,

    /// RNG seed for a reproducible run.
    #[arg(long, env = "CULTURE_SEED")]
    seed: Option<u64>,

    /// Number of generations to simulate.
    #[arg(long, default_value_t = 10)]
    generations: u64,

    /// Emit generation snapshots and the final summary as JSON lines.
    #[arg(long)]
    json: bool,

    /// Print the final grid as ASCII.
    #[arg(long)]
    map: bool,
}

impl Cli {
    fn resolve_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(key_change) = self.key_change {
            config.key_change = key_change;
        }
        if let Some(ratio) = self.horizontal_ratio {
            config.horizontal_ratio = ratio;
        }
        if let Some(ratio) = self.role_model_ratio {
            config.role_model_ratio = ratio;
        }
        if self.seed.is_some() {
            config.rng_seed = self.seed;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    if cli.generations == 0 {
        bail!("--generations must be at least 1");
    }
    let config = cli.resolve_config()?;
    info!(?config, generations = cli.generations, "starting simulation");

    let mut sim = Simulation::with_recorder(config, Box::new(TracingRecorder))?;
    let mut completed = 0;
    while completed < cli.generations {
        if !sim.step().generation_completed() {
            continue;
        }
        completed += 1;
        if let Some(snapshot) = sim.history().last() {
            if cli.json {
                println!("{}", serde_json::to_string(snapshot)?);
            } else {
                println!("{}", format_generation(snapshot));
            }
        }
    }

    let summary = RunSummary::of(&sim);
    if cli.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "accumulated gain {}  horizontal mean {:.2}  vertical mean {:.2}",
            summary.accumulated_gain,
            summary.horizontal_final_average,
            summary.vertical_final_average
        );
    }
    if cli.map {
        print!("{}", render_map(&sim));
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
