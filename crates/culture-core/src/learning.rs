//! Horizontal and vertical imitation.
//!
//! A learner looks for a model among its Moore neighbours first. Locally the
//! best-scoring candidate wins; when no neighbour qualifies the whole population
//! is searched and the candidate nearest on the plane wins regardless of score.
//! Imitation only happens when the model strictly outscores the learner, and then
//! copies a single digit.
//!
//! Ties go to the first candidate encountered: neighbour order for the local pool,
//! population order for the global pool.

use std::cmp::Reverse;

use culture_grid::{CellSpace, planar_distance};
use ordered_float::OrderedFloat;
use rand::{RngCore, seq::IndexedRandom};
use smallvec::SmallVec;

use crate::agent::{Agent, AgentId, LearnerType};
use crate::population::Population;
use crate::strategy::{Key, STRATEGY_LEN, Strategy, Symbol};

/// A single digit copied from a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adoption {
    pub position: usize,
    pub symbol: Symbol,
}

/// Where the chosen model was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Neighborhood,
    Population,
}

/// Model picked for a learner this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelChoice {
    pub id: AgentId,
    pub source: CandidateSource,
}

fn is_candidate(learner_id: AgentId, learner: &Agent, id: AgentId, other: &Agent) -> bool {
    match learner.learner_type() {
        LearnerType::Horizontal => !other.is_role_model() && id != learner_id,
        LearnerType::Vertical => other.is_role_model(),
    }
}

/// Choose the agent `learner` would imitate, if any qualifies.
pub fn select_model<G>(
    learner_id: AgentId,
    learner: &Agent,
    population: &Population,
    grid: &G,
) -> Option<ModelChoice>
where
    G: CellSpace<AgentId> + ?Sized,
{
    let local: SmallVec<[(AgentId, &Agent); 8]> = grid
        .neighbors_occupants(learner.cell())
        .into_iter()
        .filter_map(|id| population.get(id).map(|agent| (id, agent)))
        .filter(|(id, agent)| is_candidate(learner_id, learner, *id, agent))
        .collect();

    // min_by_key keeps the first of equal keys, so Reverse yields the first maximum.
    if let Some((id, _)) = local.iter().min_by_key(|(_, agent)| Reverse(agent.score())) {
        return Some(ModelChoice {
            id: *id,
            source: CandidateSource::Neighborhood,
        });
    }

    let origin = grid.coordinate_of(learner.cell())?;
    population
        .iter()
        .filter(|(id, agent)| is_candidate(learner_id, learner, *id, agent))
        .min_by_key(|(_, agent)| {
            let distance = grid
                .coordinate_of(agent.cell())
                .map_or(f64::INFINITY, |coordinate| planar_distance(origin, coordinate));
            OrderedFloat(distance)
        })
        .map(|(id, _)| ModelChoice {
            id,
            source: CandidateSource::Population,
        })
}

/// Run one learning attempt for `learner`, returning the digit to copy.
///
/// Role models never learn. The chosen model must strictly outscore the learner.
pub fn learn<G>(
    learner_id: AgentId,
    learner: &Agent,
    population: &Population,
    grid: &G,
    key: &Key,
    rng: &mut dyn RngCore,
) -> Option<Adoption>
where
    G: CellSpace<AgentId> + ?Sized,
{
    if learner.is_role_model() {
        return None;
    }
    let choice = select_model(learner_id, learner, population, grid)?;
    let model = population.get(choice.id)?;
    if model.score() <= learner.score() {
        return None;
    }
    adopt_one_digit(learner.strategy(), model.strategy(), key, rng)
}

/// Pick one wrong position of `own` where `other` differs and copy `other`'s digit.
///
/// Positions already matching the key are never candidates, so correct digits survive.
/// Returns `None` when every wrong position already agrees with `other`.
pub fn adopt_one_digit(
    own: &Strategy,
    other: &Strategy,
    key: &Key,
    rng: &mut dyn RngCore,
) -> Option<Adoption> {
    let learnable: SmallVec<[usize; STRATEGY_LEN]> = (0..STRATEGY_LEN)
        .filter(|&idx| own.0[idx] != key.0[idx] && own.0[idx] != other.0[idx])
        .collect();
    learnable.choose(rng).map(|&position| Adoption {
        position,
        symbol: other.0[position],
    })
}
