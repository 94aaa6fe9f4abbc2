//! Per-round statistics snapshots and the sinks that receive them.

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, LearnerType};
use crate::strategy::STRATEGY_LEN;

/// Aggregate metrics captured once per round (plus once at construction).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundSnapshot {
    /// Generation the round belonged to.
    pub generation: u64,
    /// Round counter after the step (0 at a generation boundary).
    pub round: u8,
    /// Agents alive when the snapshot was taken.
    pub population: usize,
    pub horizontal_average: f64,
    pub vertical_average: f64,
    pub total_score: u64,
    pub accumulated_gain: u64,
    /// Mean of every recorded horizontal round average so far.
    pub horizontal_final_average: f64,
    /// Mean of every recorded vertical round average so far.
    pub vertical_final_average: f64,
    /// Sum of learner scores for the generation that just ended; only set on boundaries.
    pub generation_gain: Option<u64>,
}

impl RoundSnapshot {
    /// Whether this snapshot closed a generation.
    #[must_use]
    pub const fn is_generation_boundary(&self) -> bool {
        self.generation_gain.is_some()
    }
}

/// Sink invoked for every recorded snapshot.
pub trait StatsRecorder: Send {
    fn on_round(&mut self, snapshot: &RoundSnapshot);
}

/// No-op statistics sink.
#[derive(Debug, Default)]
pub struct NullRecorder;

impl StatsRecorder for NullRecorder {
    fn on_round(&mut self, _snapshot: &RoundSnapshot) {}
}

/// Outcome of a survivor selection pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SelectionReport {
    /// Previous role models removed unconditionally.
    pub retired: usize,
    /// Learners promoted to role model.
    pub kept: usize,
    /// Learners removed for scoring below the cut.
    pub discarded: usize,
    pub lowest_kept: Option<u32>,
    pub highest_discarded: Option<u32>,
}

/// Outcome of a population refresh at the start of a generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RefreshReport {
    /// Learners left over from the previous generation that were cleared.
    pub cleared: usize,
    /// Role models carried into the new generation.
    pub retained: usize,
    pub spawned_horizontal: usize,
    pub spawned_vertical: usize,
}

/// Events emitted after processing one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundEvents {
    pub generation: u64,
    /// Round counter after the step.
    pub round: u8,
    /// Learners that copied a digit this round.
    pub adoptions: usize,
    pub refresh: Option<RefreshReport>,
    pub selection: Option<SelectionReport>,
}

impl RoundEvents {
    #[must_use]
    pub const fn generation_started(&self) -> bool {
        self.refresh.is_some()
    }

    #[must_use]
    pub const fn generation_completed(&self) -> bool {
        self.selection.is_some()
    }
}

/// Display attributes for one agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Portrayal {
    /// Black for role models, red for horizontal learners, blue for vertical learners.
    pub color: [f32; 3],
    /// 0.2 base opacity plus up to 0.8 scaled by score.
    pub alpha: f32,
    pub glyph: char,
}

impl Portrayal {
    #[must_use]
    pub fn of(agent: &Agent) -> Self {
        let normalized = (agent.score() as f32 / STRATEGY_LEN as f32).min(1.0);
        let alpha = 0.2 + 0.8 * normalized;
        let (color, glyph) = if agent.is_role_model() {
            ([0.0, 0.0, 0.0], 'R')
        } else {
            match agent.learner_type() {
                LearnerType::Horizontal => ([1.0, 0.0, 0.0], 'H'),
                LearnerType::Vertical => ([0.0, 0.0, 1.0], 'V'),
            }
        };
        Self {
            color,
            alpha,
            glyph,
        }
    }
}
