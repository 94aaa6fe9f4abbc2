//! Shared plumbing for the headless social-learning driver.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use culture_core::{AgentId, RoundSnapshot, Simulation, SimulationConfig, StatsRecorder};
use culture_grid::{CellSpace, TorusGrid};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Read a JSON configuration file. Missing fields fall back to defaults.
pub fn load_config(path: &Path) -> Result<SimulationConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: SimulationConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Forwards snapshots to `tracing`: generation boundaries at info, other rounds at debug.
#[derive(Debug, Default)]
pub struct TracingRecorder;

impl StatsRecorder for TracingRecorder {
    fn on_round(&mut self, snapshot: &RoundSnapshot) {
        match snapshot.generation_gain {
            Some(gain) => {
                info!(
                    generation = snapshot.generation,
                    gain,
                    accumulated = snapshot.accumulated_gain,
                    horizontal = snapshot.horizontal_average,
                    vertical = snapshot.vertical_average,
                    "generation complete"
                );
                if snapshot.population == 0 {
                    warn!(generation = snapshot.generation, "population is empty");
                }
            }
            None => debug!(
                generation = snapshot.generation,
                round = snapshot.round,
                horizontal = snapshot.horizontal_average,
                vertical = snapshot.vertical_average,
                total = snapshot.total_score,
                "round recorded"
            ),
        }
    }
}

/// Final figures for a finished run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    pub generations: u64,
    pub accumulated_gain: u64,
    pub horizontal_final_average: f64,
    pub vertical_final_average: f64,
    pub role_models: usize,
    /// Seed the run used, if one was fixed.
    pub seed: Option<u64>,
}

impl RunSummary {
    #[must_use]
    pub fn of(sim: &Simulation<TorusGrid<AgentId>>) -> Self {
        let (horizontal, vertical) = sim
            .history()
            .last()
            .map(|snapshot| {
                (
                    snapshot.horizontal_final_average,
                    snapshot.vertical_final_average,
                )
            })
            .unwrap_or_default();
        Self {
            generations: sim.generation(),
            accumulated_gain: sim.accumulated_gain(),
            horizontal_final_average: horizontal,
            vertical_final_average: vertical,
            role_models: sim.role_models().len(),
            seed: sim.config().rng_seed,
        }
    }
}

/// One character per cell: `R` role model, `H`/`V` learners, `.` empty.
#[must_use]
pub fn render_map(sim: &Simulation<TorusGrid<AgentId>>) -> String {
    let grid = sim.grid();
    let width = grid.width() as usize;
    let height = grid.height() as usize;
    let mut glyphs = vec!['.'; grid.cell_count()];
    for (cell, portrayal) in sim.portrayals() {
        if let Some(glyph) = glyphs.get_mut(cell.index()) {
            *glyph = portrayal.glyph;
        }
    }
    let mut out = String::with_capacity(glyphs.len() + height);
    for row in glyphs.chunks(width.max(1)) {
        out.extend(row);
        out.push('\n');
    }
    out
}

/// Human-readable line for a generation boundary snapshot.
#[must_use]
pub fn format_generation(snapshot: &RoundSnapshot) -> String {
    format!(
        "gen {:>4}  gain {:>5}  accumulated {:>7}  horizontal {:>6.2}  vertical {:>6.2}",
        snapshot.generation,
        snapshot.generation_gain.unwrap_or(snapshot.total_score),
        snapshot.accumulated_gain,
        snapshot.horizontal_average,
        snapshot.vertical_average,
    )
}
