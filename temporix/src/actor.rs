//! Actors and firing contexts.
//!
//! This module is the seam between the scheduling core and the surrounding
//! actor framework. The core does not know what an actor computes: it only
//! drives the two-phase firing protocol defined by the [`Actor`] trait and
//! honors the execution metadata the trait declares (worst-case execution
//! time, priority, real-time constraints).
//!
//! # Two-phase firing
//!
//! When an event is selected for processing, the platform engine invokes
//! [`fire_start()`](Actor::fire_start) and registers the actor as executing
//! for its declared WCET. When the physical clock reaches the firing's
//! finish time, [`fire_terminate()`](Actor::fire_terminate) is invoked and
//! the outputs emitted during either phase are delivered to the connected
//! ports. An actor whose execution time can only be determined by running it
//! should declare a zero WCET and perform its full computation in the start
//! phase; the terminal phase then runs at the same physical time.
//!
//! # Example
//!
//! An actor that forwards its input after stamping it with a sequence
//! number:
//!
//! ```
//! use temporix::actor::{Actor, Context};
//! use temporix::ports::PortId;
//! use std::time::Duration;
//!
//! pub struct Sequencer {
//!     output: PortId,
//!     count: u64,
//! }
//!
//! impl Sequencer {
//!     pub fn new(output: PortId) -> Self {
//!         Self { output, count: 0 }
//!     }
//! }
//!
//! impl Actor for Sequencer {
//!     fn fire_start(&mut self, ctx: &mut Context) -> bool {
//!         for (_, token) in ctx.take_inputs() {
//!             self.count += 1;
//!             ctx.send(self.output, Box::new(self.count));
//!             let _ = token;
//!         }
//!         true
//!     }
//!
//!     fn wcet(&self) -> Duration {
//!         Duration::from_millis(2)
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::time::Duration;

use dyn_clone::DynClone;

use crate::ports::{ActorId, PortId};
use crate::simulation::SchedulingError;
use crate::time::{Deadline, ModelTime, PhysicalTime};

/// A value carried by a port event.
///
/// The trait is blanket-implemented for any `Clone + Send + Debug` type, so
/// tokens are usually created with a plain `Box::new(value)`. Cloning is
/// required because an output port may fan out to several destinations.
pub trait TokenValue: DynClone + Any + Send + fmt::Debug {
    /// Returns a reference to the value as [`Any`], for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Converts the boxed value into a boxed [`Any`], for downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

dyn_clone::clone_trait_object!(TokenValue);

impl<T> TokenValue for T
where
    T: Clone + Any + Send + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A boxed event payload.
pub type Token = Box<dyn TokenValue>;

/// A unit of computation scheduled by a platform.
///
/// Apart from [`fire_start()`](Actor::fire_start), all methods have default
/// implementations, so a plain zero-WCET actor only needs to implement its
/// start phase.
pub trait Actor: Send + 'static {
    /// Begins a firing.
    ///
    /// Returning `false` signals that the actor's preconditions are not met
    /// (a *missed firing*): the triggering events are put back and the
    /// candidate is skipped until the platform next makes progress. An actor
    /// must not consume inputs or emit outputs before deciding to fire.
    fn fire_start(&mut self, ctx: &mut Context) -> bool;

    /// Completes a firing begun by [`fire_start()`](Actor::fire_start).
    ///
    /// Outputs emitted during either phase are delivered when this phase
    /// completes.
    fn fire_terminate(&mut self, ctx: &mut Context) {
        let _ = ctx;
    }

    /// The worst-case execution time of one firing.
    ///
    /// The simulated execution of a firing occupies the platform for this
    /// duration. May be zero.
    fn wcet(&self) -> Duration {
        Duration::ZERO
    }

    /// The declared scheduling priority; larger values dominate.
    fn priority(&self) -> i32 {
        0
    }

    /// Whether this actor's events must fire when the physical time equals
    /// their model time, as for sensors and actuators.
    fn real_time(&self) -> bool {
        false
    }
}

/// The environment handed to an actor's firing phases.
///
/// A `Context` gives access to the triggering tokens, to the firing's model
/// time and to the current physical time, and lets the actor emit output
/// tokens and schedule future pure events for itself.
pub struct Context {
    pub(crate) actor: ActorId,
    pub(crate) time: ModelTime,
    pub(crate) physical: PhysicalTime,
    pub(crate) inputs: Vec<(PortId, Token)>,
    pub(crate) outputs: Vec<(PortId, Token)>,
    pub(crate) requests: Vec<ModelTime>,
}

impl Context {
    pub(crate) fn new(
        actor: ActorId,
        time: ModelTime,
        physical: PhysicalTime,
        inputs: Vec<(PortId, Token)>,
    ) -> Self {
        Self {
            actor,
            time,
            physical,
            inputs,
            outputs: Vec::new(),
            requests: Vec::new(),
        }
    }

    /// Returns the model time of the firing.
    pub fn time(&self) -> ModelTime {
        self.time
    }

    /// Returns the current physical time.
    pub fn physical_time(&self) -> PhysicalTime {
        self.physical
    }

    /// Takes the first pending token received on the specified port, if any.
    pub fn take_input(&mut self, port: PortId) -> Option<Token> {
        let idx = self.inputs.iter().position(|(p, _)| *p == port)?;

        Some(self.inputs.remove(idx).1)
    }

    /// Takes all pending input tokens.
    pub fn take_inputs(&mut self) -> Vec<(PortId, Token)> {
        std::mem::take(&mut self.inputs)
    }

    /// Emits a token on the specified output port.
    ///
    /// The token carries the firing's model time; connection delays are
    /// added on delivery. Delivery happens when the terminal firing phase
    /// completes.
    pub fn send(&mut self, port: PortId, token: Token) {
        self.outputs.push((port, token));
    }

    /// Schedules a pure event for this actor at a future model time.
    ///
    /// An error is returned if the specified deadline is not in the future
    /// of the firing's model time.
    pub fn schedule_at(&mut self, deadline: impl Deadline) -> Result<(), SchedulingError> {
        let time = deadline.into_time(self.time);
        if time <= self.time {
            return Err(SchedulingError::InvalidScheduledTime);
        }
        self.requests.push(time);

        Ok(())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("actor", &self.actor)
            .field("time", &self.time)
            .field("physical", &self.physical)
            .finish_non_exhaustive()
    }
}
