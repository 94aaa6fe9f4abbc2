//! Learner agents: strategy ownership, learner type, and role-model status.

use culture_grid::{CellId, CellSpace};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::learning::{self, Adoption};
use crate::population::Population;
use crate::strategy::{AccuracySampler, Key, Strategy, Symbol};

new_key_type! {
    /// Stable handle for agents backed by a generational slot map.
    pub struct AgentId;
}

/// Whom an agent imitates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LearnerType {
    /// Copies from same-generation peers.
    Horizontal,
    /// Copies from retained role models of the previous generation.
    Vertical,
}

impl LearnerType {
    /// Horizontal with probability `horizontal_ratio`, vertical otherwise.
    pub fn draw(horizontal_ratio: f64, rng: &mut dyn RngCore) -> Self {
        if rng.random::<f64>() < horizontal_ratio {
            Self::Horizontal
        } else {
            Self::Vertical
        }
    }
}

/// What an agent does with its turn in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Role models only grow older.
    Age,
    /// Learners attempt imitation; `None` means nothing was copied.
    Learn(Option<Adoption>),
}

/// One member of the population.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    cell: CellId,
    learner_type: LearnerType,
    strategy: Strategy,
    score: u32,
    role_model: bool,
    role_model_age: u32,
}

impl Agent {
    /// Create a learner with a freshly sampled strategy.
    ///
    /// When `learner_type` is `None` the type is drawn using `horizontal_ratio`.
    pub fn spawn(
        cell: CellId,
        learner_type: Option<LearnerType>,
        key: &Key,
        horizontal_ratio: f64,
        sampler: &dyn AccuracySampler,
        rng: &mut dyn RngCore,
    ) -> Self {
        let strategy = Strategy::initialize(key, sampler, rng);
        let learner_type =
            learner_type.unwrap_or_else(|| LearnerType::draw(horizontal_ratio, rng));
        Self::with_strategy(cell, learner_type, strategy, key)
    }

    /// Create a learner with an explicit strategy, scored against `key`.
    #[must_use]
    pub fn with_strategy(
        cell: CellId,
        learner_type: LearnerType,
        strategy: Strategy,
        key: &Key,
    ) -> Self {
        Self {
            cell,
            learner_type,
            score: strategy.score(key),
            strategy,
            role_model: false,
            role_model_age: 0,
        }
    }

    #[must_use]
    pub const fn cell(&self) -> CellId {
        self.cell
    }

    #[must_use]
    pub const fn learner_type(&self) -> LearnerType {
        self.learner_type
    }

    #[must_use]
    pub const fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Cached score from the last recomputation.
    #[must_use]
    pub const fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub const fn is_role_model(&self) -> bool {
        self.role_model
    }

    /// Rounds spent as a role model since the last promotion.
    #[must_use]
    pub const fn role_model_age(&self) -> u32 {
        self.role_model_age
    }

    /// Mark this agent as a role model and restart its age.
    pub fn promote(&mut self) {
        self.role_model = true;
        self.role_model_age = 0;
    }

    /// Recompute the cached score against `key`.
    pub fn rescore(&mut self, key: &Key) -> u32 {
        self.score = self.strategy.score(key);
        self.score
    }

    /// Decide this round's action without mutating anything.
    pub fn plan_step<G>(
        &self,
        id: AgentId,
        population: &Population,
        grid: &G,
        key: &Key,
        rng: &mut dyn RngCore,
    ) -> StepAction
    where
        G: CellSpace<AgentId> + ?Sized,
    {
        if self.role_model {
            return StepAction::Age;
        }
        StepAction::Learn(learning::learn(id, self, population, grid, key, rng))
    }

    /// Apply a planned action. Learners always rescore afterwards.
    pub fn apply_step(&mut self, action: StepAction, key: &Key) {
        match action {
            StepAction::Age => {
                self.role_model_age = self.role_model_age.saturating_add(1);
            }
            StepAction::Learn(adoption) => {
                if let Some(Adoption { position, symbol }) = adoption {
                    self.set_symbol(position, symbol);
                }
                self.rescore(key);
            }
        }
    }

    fn set_symbol(&mut self, position: usize, symbol: Symbol) {
        if let Some(slot) = self.strategy.0.get_mut(position) {
            *slot = symbol;
        }
    }
}
