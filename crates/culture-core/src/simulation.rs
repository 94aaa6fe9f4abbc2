//! Round/generation state machine owning the key, grid, and population.

use std::cmp::Reverse;
use std::collections::{HashSet, VecDeque};
use std::fmt;

use culture_grid::{CellId, CellSpace, TorusGrid};
use rand::{rngs::SmallRng, seq::SliceRandom};
use tracing::{debug, warn};

use crate::agent::{Agent, AgentId, LearnerType, StepAction};
use crate::config::{SimulationConfig, SimulationError};
use crate::population::Population;
use crate::stats::{
    NullRecorder, Portrayal, RefreshReport, RoundEvents, RoundSnapshot, SelectionReport,
    StatsRecorder,
};
use crate::strategy::{AccuracySampler, Key, NormalAccuracy};

/// Rounds that make up one generation.
pub const ROUNDS_PER_GENERATION: u8 = 5;

/// Generational social-learning simulation over a cell space `G`.
///
/// Each call to [`Simulation::step`] advances one round. Round 0 of every generation
/// mutates the key and refills the grid around the surviving role models; the final
/// round of a generation banks the learners' total score and promotes the top
/// performers to role model.
///
/// Agents act in population order. Anything processed earlier in a round is visible
/// to later agents with its updated strategy and score.
pub struct Simulation<G = TorusGrid<AgentId>> {
    config: SimulationConfig,
    rng: SmallRng,
    sampler: Box<dyn AccuracySampler>,
    key: Key,
    grid: G,
    population: Population,
    role_models: Vec<AgentId>,
    round: u8,
    generation: u64,
    accumulated_gain: u64,
    horizontal_history: Vec<f64>,
    vertical_history: Vec<f64>,
    horizontal_sum: f64,
    vertical_sum: f64,
    history: VecDeque<RoundSnapshot>,
    recorder: Box<dyn StatsRecorder>,
}

impl<G> fmt::Debug for Simulation<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("round", &self.round)
            .field("generation", &self.generation)
            .field("population", &self.population.len())
            .field("role_models", &self.role_models.len())
            .field("accumulated_gain", &self.accumulated_gain)
            .finish()
    }
}

impl Simulation<TorusGrid<AgentId>> {
    /// Instantiate a simulation on a `width × height` torus.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        Self::with_recorder(config, Box::new(NullRecorder))
    }

    /// Instantiate a simulation on a torus, forwarding snapshots to `recorder`.
    pub fn with_recorder(
        config: SimulationConfig,
        recorder: Box<dyn StatsRecorder>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let grid = TorusGrid::new(config.width, config.height)?;
        let sampler = NormalAccuracy::standard()?;
        Self::with_parts(config, grid, Box::new(sampler), recorder)
    }
}

impl<G: CellSpace<AgentId>> Simulation<G> {
    /// Instantiate a simulation over a caller-supplied empty cell space.
    ///
    /// The grid dimensions in `config` are ignored; the population fills every cell of
    /// `grid`.
    pub fn with_parts(
        config: SimulationConfig,
        grid: G,
        sampler: Box<dyn AccuracySampler>,
        recorder: Box<dyn StatsRecorder>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        if grid.cell_count() == 0 {
            return Err(SimulationError::InvalidConfig("grid must contain cells"));
        }
        if grid.empty_cells().len() != grid.cell_count() {
            return Err(SimulationError::InvalidConfig("grid must start empty"));
        }
        let mut rng = config.seeded_rng();
        let key = Key::random(&mut rng);
        let history_capacity = config.history_capacity;
        let mut simulation = Self {
            population: Population::with_capacity(grid.cell_count()),
            config,
            rng,
            sampler,
            key,
            grid,
            role_models: Vec::new(),
            round: 0,
            generation: 0,
            accumulated_gain: 0,
            horizontal_history: Vec::new(),
            vertical_history: Vec::new(),
            horizontal_sum: 0.0,
            vertical_sum: 0.0,
            history: VecDeque::with_capacity(history_capacity),
            recorder,
        };
        simulation.try_refresh_population()?;
        simulation.record(None);
        Ok(simulation)
    }

    /// Advance one round, returning what happened.
    pub fn step(&mut self) -> RoundEvents {
        let mut events = RoundEvents::default();

        if self.round == 0 {
            let changed = self.key.mutate(self.config.key_change, &mut self.rng);
            self.generation += 1;
            debug!(generation = self.generation, changed, "mutated key");
            events.refresh = Some(self.refresh_population());
        }

        events.adoptions = self.stage_learning();

        let horizontal = self.average_score(LearnerType::Horizontal);
        let vertical = self.average_score(LearnerType::Vertical);
        self.horizontal_history.push(horizontal);
        self.vertical_history.push(vertical);
        self.horizontal_sum += horizontal;
        self.vertical_sum += vertical;

        self.round = (self.round + 1) % ROUNDS_PER_GENERATION;

        if self.round == 0 {
            let generation_gain = self.total_score();
            self.accumulated_gain += generation_gain;
            self.record(Some(generation_gain));
            events.selection = Some(self.select_role_models());
        } else {
            self.record(None);
        }

        events.generation = self.generation;
        events.round = self.round;
        events
    }

    /// Every agent takes one turn in population order; returns the number of adoptions.
    fn stage_learning(&mut self) -> usize {
        let order = self.population.ids().to_vec();
        let mut adoptions = 0;
        for id in order {
            let action = self
                .population
                .step_agent(id, &self.grid, &self.key, &mut self.rng);
            if matches!(action, Some(StepAction::Learn(Some(_)))) {
                adoptions += 1;
            }
        }
        adoptions
    }

    /// Clear every learner, then fill the empty cells with new agents.
    ///
    /// Empty cells are shuffled; the first `⌊empty · horizontal_ratio⌋` receive
    /// horizontal learners and the rest vertical ones. Role models keep their cells.
    /// Every cell ends up occupied only if `G` accepts placements into the cells it
    /// reports as empty; a rejected placement is logged and leaves the rest unfilled.
    fn refresh_population(&mut self) -> RefreshReport {
        match self.try_refresh_population() {
            Ok(report) => report,
            Err(err) => {
                warn!(%err, "population refresh left cells empty");
                RefreshReport {
                    retained: self.role_models.len(),
                    ..RefreshReport::default()
                }
            }
        }
    }

    fn try_refresh_population(&mut self) -> Result<RefreshReport, SimulationError> {
        let stale: HashSet<AgentId> = self
            .population
            .learners()
            .map(|(id, _)| id)
            .collect();
        let cleared = self.evict(&stale);

        let mut empty = self.grid.empty_cells();
        empty.shuffle(&mut self.rng);
        let horizontal = (empty.len() as f64 * self.config.horizontal_ratio) as usize;

        let mut report = RefreshReport {
            cleared,
            retained: self.population.len(),
            ..RefreshReport::default()
        };
        for (idx, cell) in empty.into_iter().enumerate() {
            let learner_type = if idx < horizontal {
                LearnerType::Horizontal
            } else {
                LearnerType::Vertical
            };
            self.spawn_learner(cell, learner_type)?;
            match learner_type {
                LearnerType::Horizontal => report.spawned_horizontal += 1,
                LearnerType::Vertical => report.spawned_vertical += 1,
            }
        }
        debug!(
            generation = self.generation,
            cleared = report.cleared,
            retained = report.retained,
            horizontal = report.spawned_horizontal,
            vertical = report.spawned_vertical,
            "refreshed population"
        );
        Ok(report)
    }

    fn spawn_learner(
        &mut self,
        cell: CellId,
        learner_type: LearnerType,
    ) -> Result<AgentId, SimulationError> {
        let agent = Agent::spawn(
            cell,
            Some(learner_type),
            &self.key,
            self.config.horizontal_ratio,
            self.sampler.as_ref(),
            &mut self.rng,
        );
        let id = self.population.insert(agent);
        if let Err(err) = self.grid.place(id, cell) {
            self.population.remove(id);
            return Err(err.into());
        }
        Ok(id)
    }

    /// Remove `ids` from both the population and the grid.
    fn evict(&mut self, ids: &HashSet<AgentId>) -> usize {
        let removed = self.population.remove_many(ids);
        for agent in &removed {
            self.grid.remove(agent.cell());
        }
        removed.len()
    }

    /// Retire the previous role models and promote the best learners in their place.
    ///
    /// Previous role models are removed regardless of age. Learners are ranked by score
    /// with a stable sort, so equal scores keep population order. The top
    /// `⌊learners · role_model_ratio⌋` become role models; everyone else is removed.
    pub fn select_role_models(&mut self) -> SelectionReport {
        let previous: HashSet<AgentId> = self
            .population
            .role_models()
            .map(|(id, _)| id)
            .chain(self.role_models.drain(..))
            .collect();
        let retired = self.evict(&previous);

        let mut ranked: Vec<(AgentId, u32)> = self
            .population
            .learners()
            .map(|(id, agent)| (id, agent.score()))
            .collect();
        ranked.sort_by_key(|(_, score)| Reverse(*score));
        let keep = (ranked.len() as f64 * self.config.role_model_ratio) as usize;
        let keep = keep.min(ranked.len());
        let (kept, discarded) = ranked.split_at(keep);

        for (id, _) in kept {
            if let Some(agent) = self.population.get_mut(*id) {
                agent.promote();
            }
        }
        self.role_models = kept.iter().map(|(id, _)| *id).collect();

        let losers: HashSet<AgentId> = discarded.iter().map(|(id, _)| *id).collect();
        self.evict(&losers);

        let report = SelectionReport {
            retired,
            kept: kept.len(),
            discarded: discarded.len(),
            lowest_kept: kept.last().map(|(_, score)| *score),
            highest_discarded: discarded.first().map(|(_, score)| *score),
        };
        debug!(
            generation = self.generation,
            retired = report.retired,
            kept = report.kept,
            discarded = report.discarded,
            "selected role models"
        );
        report
    }

    fn record(&mut self, generation_gain: Option<u64>) {
        let snapshot = RoundSnapshot {
            generation: self.generation,
            round: self.round,
            population: self.population.len(),
            horizontal_average: self.average_score(LearnerType::Horizontal),
            vertical_average: self.average_score(LearnerType::Vertical),
            total_score: self.total_score(),
            accumulated_gain: self.accumulated_gain,
            horizontal_final_average: running_mean(
                self.horizontal_sum,
                self.horizontal_history.len(),
            ),
            vertical_final_average: running_mean(self.vertical_sum, self.vertical_history.len()),
            generation_gain,
        };
        self.recorder.on_round(&snapshot);
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
    }

    /// Mean score of active learners of `learner_type`; role models never count.
    #[must_use]
    pub fn average_score(&self, learner_type: LearnerType) -> f64 {
        self.population.average_score(learner_type)
    }

    /// Sum of active learner scores; role models never count.
    #[must_use]
    pub fn total_score(&self) -> u64 {
        self.population.total_score()
    }

    /// Running total of every completed generation's learner score.
    #[must_use]
    pub const fn accumulated_gain(&self) -> u64 {
        self.accumulated_gain
    }

    /// Round within the current generation, in `0..ROUNDS_PER_GENERATION`.
    #[must_use]
    pub const fn round(&self) -> u8 {
        self.round
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn key(&self) -> &Key {
        &self.key
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn grid(&self) -> &G {
        &self.grid
    }

    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.population.get(id)
    }

    /// Role models selected at the most recent generation boundary.
    #[must_use]
    pub fn role_models(&self) -> &[AgentId] {
        &self.role_models
    }

    /// Horizontal average recorded after every round.
    #[must_use]
    pub fn horizontal_history(&self) -> &[f64] {
        &self.horizontal_history
    }

    /// Vertical average recorded after every round.
    #[must_use]
    pub fn vertical_history(&self) -> &[f64] {
        &self.vertical_history
    }

    /// Iterate over retained snapshots, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &RoundSnapshot> {
        self.history.iter()
    }

    /// Presentation attributes for every agent alongside its cell.
    pub fn portrayals(&self) -> impl Iterator<Item = (CellId, Portrayal)> + '_ {
        self.population
            .iter()
            .map(|(_, agent)| (agent.cell(), Portrayal::of(agent)))
    }
}

fn running_mean(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::FixedAccuracy;
    use culture_grid::{Coordinate, GridError, Neighborhood};
    use std::sync::{Arc, Mutex};

    fn seeded(width: u32, height: u32, seed: u64) -> SimulationConfig {
        SimulationConfig {
            width,
            height,
            rng_seed: Some(seed),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn construction_fills_every_cell() {
        let sim = Simulation::new(seeded(6, 4, 1)).expect("simulation");
        assert_eq!(sim.population().len(), 24);
        assert_eq!(sim.grid().occupied(), 24);
        assert_eq!(sim.round(), 0);
        assert_eq!(sim.generation(), 0);
        assert_eq!(sim.history().count(), 1);
        for (id, agent) in sim.population().iter() {
            assert_eq!(sim.grid().occupant(agent.cell()), Some(id));
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimulationConfig {
            role_model_ratio: 1.5,
            ..SimulationConfig::default()
        };
        assert_eq!(
            Simulation::new(config).unwrap_err(),
            SimulationError::InvalidConfig("role_model_ratio must lie in [0, 1]")
        );
    }

    #[test]
    fn refresh_splits_learner_types_by_ratio() {
        let config = SimulationConfig {
            horizontal_ratio: 0.25,
            ..seeded(4, 5, 3)
        };
        let mut sim = Simulation::new(config).expect("simulation");
        let events = sim.step();
        let refresh = events.refresh.expect("refresh");
        assert_eq!(refresh.spawned_horizontal, 5);
        assert_eq!(refresh.spawned_vertical, 15);
        assert_eq!(refresh.cleared, 20);
        assert_eq!(sim.generation(), 1);
    }

    #[test]
    fn role_models_keep_cells_across_refresh() {
        let mut sim = Simulation::new(seeded(8, 8, 42)).expect("simulation");
        for _ in 0..ROUNDS_PER_GENERATION {
            sim.step();
        }
        let elites: Vec<(AgentId, CellId, u32)> = sim
            .role_models()
            .iter()
            .map(|id| {
                let agent = sim.agent(*id).expect("role model");
                (*id, agent.cell(), agent.score())
            })
            .collect();
        assert_eq!(elites.len(), (64.0 * 0.3) as usize);

        let events = sim.step();
        assert_eq!(events.refresh.expect("refresh").retained, elites.len());
        assert_eq!(sim.population().len(), 64);
        assert_eq!(sim.grid().occupied(), 64);
        for (id, cell, score) in elites {
            let agent = sim.agent(id).expect("role model survives refresh");
            assert_eq!(agent.cell(), cell);
            assert!(agent.is_role_model());
            assert_eq!(agent.score(), score);
            assert_eq!(agent.role_model_age(), 1);
        }
    }

    #[test]
    fn previous_role_models_retire_at_next_boundary() {
        let mut sim = Simulation::new(seeded(6, 6, 9)).expect("simulation");
        for _ in 0..ROUNDS_PER_GENERATION {
            sim.step();
        }
        let first: Vec<AgentId> = sim.role_models().to_vec();
        let mut last = RoundEvents::default();
        for _ in 0..ROUNDS_PER_GENERATION {
            last = sim.step();
        }
        let selection = last.selection.expect("selection");
        assert_eq!(selection.retired, first.len());
        for id in first {
            assert!(sim.agent(id).is_none());
        }
        assert_eq!(sim.population().len(), sim.role_models().len());
    }

    #[test]
    fn selection_keeps_the_best_learners() {
        let mut sim = Simulation::new(seeded(10, 10, 77)).expect("simulation");
        for _ in 0..ROUNDS_PER_GENERATION - 1 {
            sim.step();
        }
        let learners = sim.population().learners().count();
        let events = sim.step();
        let selection = events.selection.expect("selection");
        assert_eq!(selection.kept, (learners as f64 * 0.3) as usize);
        assert_eq!(selection.kept + selection.discarded, learners);
        assert!(selection.lowest_kept >= selection.highest_discarded);
        let min_kept = sim
            .population()
            .iter()
            .map(|(_, agent)| agent.score())
            .min()
            .expect("role models");
        assert_eq!(Some(min_kept), selection.lowest_kept);
    }

    #[test]
    fn metrics_ignore_role_models() {
        let mut sim = Simulation::new(seeded(5, 5, 5)).expect("simulation");
        for _ in 0..ROUNDS_PER_GENERATION {
            sim.step();
        }
        // Only role models remain between the boundary and the next refresh.
        assert!(!sim.population().is_empty());
        assert_eq!(sim.total_score(), 0);
        assert_eq!(sim.average_score(LearnerType::Horizontal), 0.0);
        assert_eq!(sim.average_score(LearnerType::Vertical), 0.0);
    }

    #[test]
    fn zero_role_model_ratio_empties_the_grid_until_refresh() {
        let config = SimulationConfig {
            role_model_ratio: 0.0,
            ..seeded(4, 4, 2)
        };
        let mut sim = Simulation::new(config).expect("simulation");
        for _ in 0..ROUNDS_PER_GENERATION {
            sim.step();
        }
        assert!(sim.population().is_empty());
        assert!(sim.role_models().is_empty());
        let events = sim.step();
        assert_eq!(events.refresh.expect("refresh").retained, 0);
        assert_eq!(sim.population().len(), 16);
    }

    #[test]
    fn perfect_population_never_adopts() {
        let config = SimulationConfig {
            key_change: 0.0,
            ..seeded(4, 4, 8)
        };
        let mut sim = Simulation::with_parts(
            config,
            TorusGrid::<AgentId>::new(4, 4).expect("grid"),
            Box::new(FixedAccuracy(25)),
            Box::new(NullRecorder),
        )
        .expect("simulation");
        for _ in 0..ROUNDS_PER_GENERATION {
            assert_eq!(sim.step().adoptions, 0);
        }
        assert_eq!(sim.accumulated_gain(), 16 * 25);
    }

    #[test]
    fn history_capacity_bounds_retained_snapshots() {
        let config = SimulationConfig {
            history_capacity: 3,
            ..seeded(4, 4, 8)
        };
        let mut sim = Simulation::new(config).expect("simulation");
        for _ in 0..7 {
            sim.step();
        }
        let rounds: Vec<u8> = sim.history().map(|snapshot| snapshot.round).collect();
        assert_eq!(rounds, vec![0, 1, 2]);
        assert_eq!(sim.horizontal_history().len(), 7);
    }

    #[derive(Clone, Default)]
    struct SharedRecorder(Arc<Mutex<Vec<RoundSnapshot>>>);

    impl StatsRecorder for SharedRecorder {
        fn on_round(&mut self, snapshot: &RoundSnapshot) {
            self.0.lock().expect("lock").push(snapshot.clone());
        }
    }

    #[test]
    fn recorder_receives_every_snapshot() {
        let recorder = SharedRecorder::default();
        let mut sim = Simulation::with_recorder(seeded(5, 5, 13), Box::new(recorder.clone()))
            .expect("simulation");
        for _ in 0..ROUNDS_PER_GENERATION * 2 {
            sim.step();
        }
        let snapshots = recorder.0.lock().expect("lock").clone();
        assert_eq!(snapshots.len(), 11);
        let boundaries: Vec<_> = snapshots
            .iter()
            .filter(|snapshot| snapshot.is_generation_boundary())
            .collect();
        assert_eq!(boundaries.len(), 2);
        let gains: u64 = boundaries
            .iter()
            .filter_map(|snapshot| snapshot.generation_gain)
            .sum();
        assert_eq!(gains, sim.accumulated_gain());
        assert_eq!(boundaries[1].accumulated_gain, sim.accumulated_gain());
    }

    #[test]
    fn final_averages_match_full_history_mean() {
        let mut sim = Simulation::new(seeded(6, 6, 31)).expect("simulation");
        for _ in 0..ROUNDS_PER_GENERATION * 6 {
            sim.step();
        }
        let last = sim.history().last().expect("snapshot");
        let rounds = sim.horizontal_history().len() as f64;
        let horizontal = sim.horizontal_history().iter().sum::<f64>() / rounds;
        let vertical = sim.vertical_history().iter().sum::<f64>() / rounds;
        assert!((last.horizontal_final_average - horizontal).abs() < 1e-9);
        assert!((last.vertical_final_average - vertical).abs() < 1e-9);
        assert_eq!(sim.config().width, 6);
    }

    /// Torus that refuses every placement after the first `accept` succeed.
    struct RefusingGrid {
        inner: TorusGrid<AgentId>,
        accept: usize,
    }

    impl CellSpace<AgentId> for RefusingGrid {
        fn cell_count(&self) -> usize {
            self.inner.cell_count()
        }

        fn cells(&self) -> Vec<CellId> {
            self.inner.cells()
        }

        fn neighbors_of(&self, cell: CellId) -> Neighborhood {
            self.inner.neighbors_of(cell)
        }

        fn occupant(&self, cell: CellId) -> Option<AgentId> {
            self.inner.occupant(cell)
        }

        fn place(&mut self, occupant: AgentId, cell: CellId) -> Result<(), GridError> {
            if self.accept == 0 {
                return Err(GridError::OutOfBounds { cell });
            }
            self.accept -= 1;
            self.inner.place(occupant, cell)
        }

        fn remove(&mut self, cell: CellId) -> Option<AgentId> {
            self.inner.remove(cell)
        }

        fn coordinate_of(&self, cell: CellId) -> Option<Coordinate> {
            self.inner.coordinate_of(cell)
        }
    }

    #[test]
    fn rejected_placement_fails_construction() {
        let grid = RefusingGrid {
            inner: TorusGrid::new(3, 3).expect("grid"),
            accept: 4,
        };
        let err = Simulation::with_parts(
            seeded(3, 3, 1),
            grid,
            Box::new(FixedAccuracy(5)),
            Box::new(NullRecorder),
        )
        .unwrap_err();
        assert!(matches!(err, SimulationError::Grid(GridError::OutOfBounds { .. })));
    }
}
