//! Simulation assembly and execution.
//!
//! A simulation is assembled with the [`SimInit`] builder: platforms, actors
//! and ports are declared, connected and configured, then
//! [`SimInit::init()`] freezes the topology, runs the causal analysis and
//! returns a [`Simulation`].
//!
//! [`Simulation::run()`] drives the system to completion with one scheduling
//! thread per platform. Platforms execute independently: each one fires
//! whatever its safety analysis proves safe at the current physical time and
//! blocks on the shared time coordinator when nothing is actionable. The
//! physical clock only advances once every platform is blocked, to the
//! earliest time at which one of them asked to be reconsidered.
//!
//! A run ends in one of three ways:
//!
//! * [`RunOutcome::Completed`]: all events were exhausted, or the next clock
//!   advance would exceed the configured completion time;
//! * [`RunOutcome::Stopped`]: a [`Halter`] requested a stop; in-flight
//!   firings are abandoned, not drained;
//! * an [`ExecutionError`]: a platform reported a fatal condition, such as a
//!   protocol violation on a network interface or an unresolvable deadlock.

mod coordinator;
mod event_store;
mod platform;
mod safety;
mod sim_init;
mod strategy;

pub use sim_init::SimInit;
pub use strategy::StrategyKind;

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::thread;

use crate::causality::CausalityModel;
use crate::observer::{ScheduleNotice, ScheduleObserver};
use crate::ports::{ActorId, PortId, Receiver, Topology};
use crate::time::{Deadline, MonotonicTime, PhysicalTime};

use coordinator::{Coordinator, Halt};
use platform::Platform;

/// Execution parameters shared by every platform.
pub(crate) struct Config {
    pub(crate) strategy: StrategyKind,
    pub(crate) clock_sync_error: Duration,
    pub(crate) network_delay: Duration,
    pub(crate) completion_time: MonotonicTime,
    pub(crate) delay_analysis: bool,
}

/// Immutable state shared by the platforms of a simulation.
pub(crate) struct Core {
    pub(crate) topology: Topology,
    pub(crate) causality: CausalityModel,
    pub(crate) config: Config,
    /// One inbox per port, indexed by port id; entries for output ports are
    /// unused.
    pub(crate) receivers: Vec<Receiver>,
    pub(crate) observers: Vec<Box<dyn ScheduleObserver>>,
}

impl Core {
    pub(crate) fn notify(&self, notice: ScheduleNotice) {
        for observer in &self.observers {
            observer.notice(&notice);
        }
    }
}

/// An initialized simulation.
///
/// Initial pure events are queued with [`schedule_at()`](Self::schedule_at),
/// then [`run()`](Self::run) drives the system to completion. See the
/// [module documentation](crate::simulation) for an overview of the
/// execution model.
pub struct Simulation {
    core: Arc<Core>,
    coordinator: Arc<Coordinator>,
    platforms: Vec<Platform>,
}

impl Simulation {
    pub(crate) fn new(
        core: Arc<Core>,
        coordinator: Arc<Coordinator>,
        platforms: Vec<Platform>,
    ) -> Self {
        Self {
            core,
            coordinator,
            platforms,
        }
    }

    /// The current physical time.
    pub fn time(&self) -> PhysicalTime {
        self.coordinator.time()
    }

    /// Schedules a pure event for the specified actor.
    ///
    /// The deadline may be absolute or relative to the current physical
    /// time; an error is returned if it lies in the past.
    pub fn schedule_at(
        &mut self,
        actor: ActorId,
        deadline: impl Deadline,
    ) -> Result<(), SchedulingError> {
        let now = self.coordinator.time();
        let time = deadline.into_time(now);
        if time < now {
            return Err(SchedulingError::InvalidScheduledTime);
        }
        let platform = self.core.topology.actor(actor).platform;
        self.platforms[platform.0].schedule_pure(actor, time);

        Ok(())
    }

    /// Returns a handle with which the run can be stopped from another
    /// thread.
    pub fn halter(&self) -> Halter {
        Halter {
            coordinator: self.coordinator.clone(),
        }
    }

    /// A lower bound on the time a value takes to propagate from one port to
    /// another, or `None` if no causal path links them.
    pub fn minimum_delay(&self, source: PortId, destination: PortId) -> Option<Duration> {
        self.core
            .causality
            .minimum_delay(&self.core.topology, source, destination)
    }

    /// The input ports that must jointly observe events in non-decreasing
    /// timestamp order, including `port` itself.
    pub fn equivalence_class(&self, port: PortId) -> Vec<PortId> {
        self.core.causality.equivalence_class(port).to_vec()
    }

    /// Runs the simulation to completion, with one scheduling thread per
    /// platform.
    pub fn run(&mut self) -> Result<RunOutcome, ExecutionError> {
        let result = thread::scope(|scope| {
            for platform in &mut self.platforms {
                scope.spawn(move |_| platform.run());
            }
        });
        // Actor panics are caught and reported by the platforms; a panic
        // escaping a platform thread is a bug of the engine itself.
        if let Err(payload) = result {
            std::panic::resume_unwind(payload);
        }

        match self.coordinator.halted() {
            Some(Halt::Completed) | None => Ok(RunOutcome::Completed),
            Some(Halt::Halted) => Ok(RunOutcome::Stopped),
            Some(Halt::Fault(error)) => Err(error),
        }
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("time", &self.time())
            .field("platforms", &self.platforms.len())
            .finish_non_exhaustive()
    }
}

/// A cloneable handle for requesting a global stop of a running simulation.
///
/// Stopping unblocks every platform immediately and halts further clock
/// advancement; firings in progress are abandoned without completing.
#[derive(Clone)]
pub struct Halter {
    coordinator: Arc<Coordinator>,
}

impl Halter {
    /// Requests a stop.
    ///
    /// The associated [`Simulation::run()`] call returns
    /// [`RunOutcome::Stopped`]. A no-op if the run already ended.
    pub fn halt(&self) {
        self.coordinator.halt_external();
    }
}

impl fmt::Debug for Halter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Halter").finish_non_exhaustive()
    }
}

/// How a run came to an end.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// All events were exhausted or the completion time was reached.
    Completed,
    /// The run was stopped through a [`Halter`].
    Stopped,
}

/// Information on a platform that still held pending events when the run
/// stalled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeadlockInfo {
    /// Name of the platform.
    pub platform: String,
    /// Number of events it held in its buffers.
    pub pending_events: usize,
}

/// An error aborting a simulation run.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum ExecutionError {
    /// Every platform was blocked with no pending wakeup, while the enlisted
    /// platforms still held events that can never become safe to process.
    Deadlock(Vec<DeadlockInfo>),
    /// An inbound token arrived behind the physical clock by more than the
    /// configured clock-synchronization error and network delay, violating
    /// the network-interface constraint of its producer.
    ProtocolViolation {
        /// Dotted path of the receiving port.
        port: String,
        /// Timestamp carried by the offending token.
        event_time: MonotonicTime,
        /// Physical time at which the token arrived.
        physical_time: MonotonicTime,
    },
    /// An actor panicked during a firing phase.
    Panic {
        /// Dotted path of the actor.
        actor: String,
        /// The panic message, when one could be extracted from the payload.
        message: String,
    },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadlock(list) => {
                f.write_str(
                    "the simulation stalled with pending events on the following platforms: ",
                )?;
                let mut first_item = true;
                for info in list {
                    if first_item {
                        first_item = false;
                    } else {
                        f.write_str(", ")?;
                    }
                    write!(
                        f,
                        "'{}' ({} pending event{})",
                        info.platform,
                        info.pending_events,
                        if info.pending_events == 1 { "" } else { "s" }
                    )?;
                }

                Ok(())
            }
            Self::ProtocolViolation {
                port,
                event_time,
                physical_time,
            } => {
                write!(
                    f,
                    "a token with timestamp {event_time} arrived on port '{port}' at physical time {physical_time}, behind the allowed arrival deadline"
                )
            }
            Self::Panic { actor, message } => {
                if message.is_empty() {
                    write!(f, "actor '{actor}' has panicked")
                } else {
                    write!(
                        f,
                        "actor '{actor}' has panicked with the message: '{message}'"
                    )
                }
            }
        }
    }
}

impl Error for ExecutionError {}

/// An error returned when a pure event cannot be scheduled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SchedulingError {
    /// The specified time lies in the past of the reference time.
    InvalidScheduledTime,
}

impl fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidScheduledTime => {
                f.write_str("the specified scheduled time is not in the future")
            }
        }
    }
}

impl Error for SchedulingError {}

/// A configuration error detected before any platform thread starts.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The execution strategy name is not recognized.
    UnknownStrategy(String),
    /// A connection does not link an output port to an input port.
    InvalidConnection {
        /// Dotted path of the connection source.
        source: String,
        /// Dotted path of the connection destination.
        destination: String,
    },
    /// An actor was declared but never bound to an implementation.
    UnboundActor(String),
    /// The completion time lies before the simulation start time.
    InvalidCompletionTime(MonotonicTime),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStrategy(name) => {
                write!(f, "unknown execution strategy '{name}'")
            }
            Self::InvalidConnection {
                source,
                destination,
            } => {
                write!(
                    f,
                    "the connection from '{source}' to '{destination}' does not link an output port to an input port"
                )
            }
            Self::UnboundActor(actor) => {
                write!(f, "actor '{actor}' was declared but never bound")
            }
            Self::InvalidCompletionTime(time) => {
                write!(
                    f,
                    "the completion time ({time}) lies before the simulation start time"
                )
            }
        }
    }
}

impl Error for ConfigError {}
