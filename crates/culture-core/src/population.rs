//! Population registry with generational handles and a stable iteration order.

use std::collections::HashSet;

use culture_grid::CellSpace;
use rand::RngCore;
use slotmap::SlotMap;

use crate::agent::{Agent, AgentId, LearnerType, StepAction};
use crate::strategy::Key;

/// Agents currently alive, iterated in insertion order.
///
/// Removals keep the relative order of survivors, so a fixed seed always replays the
/// same per-round processing order.
#[derive(Debug, Clone, Default)]
pub struct Population {
    agents: SlotMap<AgentId, Agent>,
    order: Vec<AgentId>,
}

impl Population {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            agents: SlotMap::with_capacity_and_key(capacity),
            order: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handles in iteration order.
    #[must_use]
    pub fn ids(&self) -> &[AgentId] {
        &self.order
    }

    /// Iterate `(id, agent)` pairs in iteration order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &Agent)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.agents.get(*id).map(|agent| (*id, agent)))
    }

    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// Append an agent to the end of the iteration order.
    pub fn insert(&mut self, agent: Agent) -> AgentId {
        let id = self.agents.insert(agent);
        self.order.push(id);
        id
    }

    /// Remove `id`, returning the agent if it was present.
    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        let agent = self.agents.remove(id)?;
        self.order.retain(|other| *other != id);
        Some(agent)
    }

    /// Remove every agent in `dead`, preserving the order of the rest.
    pub fn remove_many(&mut self, dead: &HashSet<AgentId>) -> Vec<Agent> {
        if dead.is_empty() {
            return Vec::new();
        }
        let mut removed = Vec::with_capacity(dead.len());
        let agents = &mut self.agents;
        self.order.retain(|id| {
            if !dead.contains(id) {
                return true;
            }
            if let Some(agent) = agents.remove(*id) {
                removed.push(agent);
            }
            false
        });
        removed
    }

    /// Run one turn for `id`: plan against the current population, then apply.
    ///
    /// Agents already processed this round are seen with their updated strategies and
    /// scores. Returns `None` if `id` is not alive.
    pub fn step_agent<G>(
        &mut self,
        id: AgentId,
        grid: &G,
        key: &Key,
        rng: &mut dyn RngCore,
    ) -> Option<StepAction>
    where
        G: CellSpace<AgentId> + ?Sized,
    {
        let action = self.agents.get(id)?.plan_step(id, self, grid, key, rng);
        self.agents.get_mut(id)?.apply_step(action, key);
        Some(action)
    }

    /// Non-role-model agents, the ones counted by the per-round metrics.
    pub fn learners(&self) -> impl Iterator<Item = (AgentId, &Agent)> + '_ {
        self.iter().filter(|(_, agent)| !agent.is_role_model())
    }

    /// Role models in iteration order.
    pub fn role_models(&self) -> impl Iterator<Item = (AgentId, &Agent)> + '_ {
        self.iter().filter(|(_, agent)| agent.is_role_model())
    }

    /// Mean score of non-role-model agents of `learner_type`; zero when there are none.
    #[must_use]
    pub fn average_score(&self, learner_type: LearnerType) -> f64 {
        let (count, total) = self
            .learners()
            .filter(|(_, agent)| agent.learner_type() == learner_type)
            .fold((0u64, 0u64), |(count, total), (_, agent)| {
                (count + 1, total + u64::from(agent.score()))
            });
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Sum of scores of non-role-model agents.
    #[must_use]
    pub fn total_score(&self) -> u64 {
        self.learners()
            .map(|(_, agent)| u64::from(agent.score()))
            .sum()
    }
}
