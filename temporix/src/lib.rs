//! A discrete-event simulator for distributed real-time systems.
//!
//! Temporix simulates systems built from *platforms*: independent
//! computation nodes, each scheduled on its own thread, that exchange
//! time-stamped events over connections with declared minimum propagation
//! delays. Its job is to decide, at every instant of a simulated global
//! physical clock, which pending event on which platform is safe to process
//! next, honoring per-actor worst-case-execution-time (WCET) budgets,
//! preemption rules and cross-platform causal ordering constraints, without
//! a single global event queue or lock-step synchronization between
//! platforms.
//!
//! # Execution model
//!
//! A simulated system is a static topology of platforms, *actors* and
//! *ports*. Two kinds of timestamps coexist:
//!
//! * the *physical time* is the shared clock owned by the global time
//!   coordinator; it is monotonically non-decreasing for the lifetime of a
//!   run;
//! * the *model time* is the timestamp carried by an event; an event may be
//!   processed at a physical time equal to or later than its model time,
//!   never earlier.
//!
//! Strict timestamp order is deliberately relaxed: platforms fire whatever
//! they can prove safe at the current physical time, out of global
//! timestamp order if need be. The ordering that *is* guaranteed is local:
//! input ports of one actor form *equivalence classes*, and the ports of a
//! class jointly observe events in non-decreasing timestamp order. An event
//! is exposed to an actor only once the safe-to-process analysis proves
//! that no causally-connected source can still produce an earlier timestamp
//! for its class, either statically from precomputed delay bounds or by
//! walking the causality graph upstream.
//!
//! Firing an actor occupies its platform for the actor's declared WCET,
//! using a two-phase protocol: the starting phase runs when the firing is
//! selected, the terminal phase when the physical clock reaches the
//! firing's finish time, at which point its outputs are delivered. Under
//! the preemptive execution strategy, a higher-priority firing may start
//! while another is in progress, pushing back the finish time of the
//! preempted firing by the newcomer's WCET.
//!
//! The physical clock advances only when every platform has stalled: the
//! coordinator then pops the earliest requested wake-up time, synchronizes
//! the optional wall clock and releases every platform to re-evaluate.
//!
//! # Example
//!
//! A sensor platform samples a value every 100 ms of model time and ships
//! it over a network link to a recording platform:
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! use temporix::actor::{Actor, Context};
//! use temporix::ports::PortId;
//! use temporix::simulation::{RunOutcome, SimInit};
//! use temporix::time::MonotonicTime;
//!
//! struct Sampler {
//!     output: PortId,
//!     period: Duration,
//! }
//!
//! impl Actor for Sampler {
//!     fn fire_start(&mut self, ctx: &mut Context) -> bool {
//!         ctx.send(self.output, Box::new(42u64));
//!         ctx.schedule_at(self.period).unwrap();
//!         true
//!     }
//!
//!     fn wcet(&self) -> Duration {
//!         Duration::from_millis(1)
//!     }
//! }
//!
//! struct Recorder {
//!     input: PortId,
//!     log: Arc<Mutex<Vec<u64>>>,
//! }
//!
//! impl Actor for Recorder {
//!     fn fire_start(&mut self, ctx: &mut Context) -> bool {
//!         while let Some(token) = ctx.take_input(self.input) {
//!             let value = *token.into_any().downcast::<u64>().unwrap();
//!             self.log.lock().unwrap().push(value);
//!         }
//!         true
//!     }
//! }
//!
//! let t0 = MonotonicTime::EPOCH;
//! let log = Arc::new(Mutex::new(Vec::new()));
//!
//! let mut bench = SimInit::new().set_completion_time(t0 + Duration::from_secs(1));
//!
//! let plant = bench.add_platform("plant");
//! let sampler = bench.add_actor(plant, "sampler");
//! let sampler_out = bench.add_output(sampler, "out");
//! bench.bind_actor(
//!     sampler,
//!     Sampler {
//!         output: sampler_out,
//!         period: Duration::from_millis(100),
//!     },
//! );
//!
//! let control = bench.add_platform("control");
//! let recorder = bench.add_actor(control, "recorder");
//! let recorder_in = bench.add_input(recorder, "in");
//! bench.bind_actor(
//!     recorder,
//!     Recorder {
//!         input: recorder_in,
//!         log: log.clone(),
//!     },
//! );
//!
//! bench.connect(sampler_out, recorder_in, Duration::from_millis(10));
//!
//! let mut simu = bench.init(t0).unwrap();
//! simu.schedule_at(sampler, t0).unwrap();
//!
//! assert_eq!(simu.run().unwrap(), RunOutcome::Completed);
//! assert!(!log.lock().unwrap().is_empty());
//! ```
//!
//! # Modules documentation
//!
//! * the [`actor`] module defines the two-phase firing protocol and the
//!   execution metadata an actor declares,
//! * the [`simulation`] module covers assembly with
//!   [`SimInit`](simulation::SimInit), execution with
//!   [`Simulation`](simulation::Simulation) and the conditions under which
//!   a run ends,
//! * the [`time`] module discusses the monotonic timestamp format
//!   ([`time::MonotonicTime`]) and wall-clock synchronization,
//! * the [`observer`] module provides the schedule-event notification side
//!   channel.
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

pub mod actor;
pub(crate) mod causality;
pub mod observer;
pub mod ports;
pub mod simulation;
pub mod time;
pub(crate) mod util;
