//! Execution strategies.
//!
//! A strategy decides which safe candidate, if any, starts executing next on
//! a platform. Strategies are stateless policies: the two variants share no
//! state and are dispatched by a single `match`.

use std::cmp::Reverse;
use std::str::FromStr;

use crate::actor::Token;
use crate::ports::{ActorId, PortId};
use crate::simulation::ConfigError;
use crate::time::{ModelTime, PhysicalTime};

/// The execution strategy of a simulation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum StrategyKind {
    /// A firing never starts while another one is in progress on the same
    /// platform.
    #[default]
    NonPreemptive,
    /// A firing may start while others are in progress if its actor's
    /// priority strictly dominates every executing actor's priority; the
    /// preempted firings finish later by the newcomer's WCET.
    Preemptive,
}

impl StrategyKind {
    /// Picks at most one candidate to start executing, given the actors
    /// currently mid-execution.
    pub(crate) fn select(
        &self,
        candidates: &[Candidate],
        executing: &[Executing],
    ) -> Option<usize> {
        match self {
            Self::NonPreemptive => {
                if !executing.is_empty() {
                    return None;
                }
                best(candidates)
            }
            Self::Preemptive => {
                let idx = best(candidates)?;
                let candidate = &candidates[idx];
                executing
                    .iter()
                    .all(|entry| candidate.priority > entry.priority)
                    .then_some(idx)
            }
        }
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, ConfigError> {
        match name {
            "non-preemptive" => Ok(Self::NonPreemptive),
            "preemptive" => Ok(Self::Preemptive),
            _ => Err(ConfigError::UnknownStrategy(name.into())),
        }
    }
}

/// Deterministic tie-break: lowest timestamp, then highest declared
/// priority, then lowest actor id.
fn best(candidates: &[Candidate]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| (c.time, Reverse(c.priority), c.actor))
        .map(|(idx, _)| idx)
}

/// A safe event eligible for selection.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Candidate {
    pub(crate) actor: ActorId,
    pub(crate) time: ModelTime,
    pub(crate) priority: i32,
}

/// An actor whose firing is in progress.
///
/// The entry exists from the start of the firing until the physical clock
/// reaches its finish time; the finish time grows when the firing is
/// preempted. Outputs emitted by the start phase ride along until the
/// terminal phase delivers them.
#[derive(Debug)]
pub(crate) struct Executing {
    pub(crate) actor: ActorId,
    pub(crate) event_time: ModelTime,
    pub(crate) priority: i32,
    pub(crate) start: PhysicalTime,
    pub(crate) finish: PhysicalTime,
    pub(crate) outputs: Vec<(PortId, Token)>,
}
