//! Core types for the social-learning simulation.
//!
//! Agents on a toroidal grid try to match a hidden [`Key`] that mutates every
//! generation. Horizontal learners imitate their best peer; vertical learners imitate
//! the role models retained from the previous generation.

pub mod agent;
pub mod config;
pub mod learning;
pub mod population;
pub mod simulation;
pub mod stats;
pub mod strategy;

pub use agent::{Agent, AgentId, LearnerType, StepAction};
pub use config::{SimulationConfig, SimulationError};
pub use learning::{Adoption, CandidateSource, ModelChoice, adopt_one_digit, learn, select_model};
pub use population::Population;
pub use simulation::{ROUNDS_PER_GENERATION, Simulation};
pub use stats::{
    NullRecorder, Portrayal, RefreshReport, RoundEvents, RoundSnapshot, SelectionReport,
    StatsRecorder,
};
pub use strategy::{
    ACCURACY_MEAN, ACCURACY_STD_DEV, ALPHABET_SIZE, AccuracySampler, FixedAccuracy, Key,
    NormalAccuracy, STRATEGY_LEN, Strategy, Symbol, score,
};
