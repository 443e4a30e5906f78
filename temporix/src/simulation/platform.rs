//! Per-platform execution engine.
//!
//! Each platform runs this scheduling loop on its own thread. An evaluation
//! pass at a given physical time repeatedly:
//!
//! 1. drains the platform's port receivers, withholding the delivered
//!    tokens until the safety analysis clears them for exposure to the
//!    scheduler;
//! 2. retires the firings whose finish time has been reached, running their
//!    terminal phase and delivering their buffered outputs;
//! 3. collects the safe candidates and asks the execution strategy to start
//!    at most one of them;
//!
//! until none of these steps makes progress. The engine then registers the
//! nearest future physical time at which its state can change and blocks on
//! the time coordinator.
//!
//! A token of remote origin that arrives behind the physical clock by more
//! than the clock-synchronization error and network delay allowances is a
//! protocol violation: the producing platform did not honor its network
//! interface constraint. This is fatal to the run and reported through the
//! coordinator, as is a panicking actor.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::actor::{Actor, Context, Token};
use crate::observer::{NoticeKind, ScheduleNotice};
use crate::ports::{ActorId, PlatformId, PortEvent, PortId};
use crate::time::{ModelTime, PhysicalTime};

use super::coordinator::Coordinator;
use super::event_store::EventStore;
use super::safety::{self, SafetyEnv};
use super::strategy::{Candidate, Executing};
use super::{Core, ExecutionError};

pub(crate) struct Platform {
    id: PlatformId,
    core: Arc<Core>,
    coordinator: Arc<Coordinator>,
    actors: BTreeMap<ActorId, Box<dyn Actor>>,
    /// All input ports of the platform's actors.
    inputs: Vec<PortId>,
    store: EventStore,
    /// Delivered tokens not yet cleared for exposure, sorted by timestamp.
    inbound: BTreeMap<PortId, Vec<PortEvent>>,
    executing: Vec<Executing>,
    /// Actors that missed a firing since the platform last made progress.
    skipped: Vec<ActorId>,
}

impl Platform {
    pub(crate) fn new(
        id: PlatformId,
        core: Arc<Core>,
        coordinator: Arc<Coordinator>,
        actors: &mut Vec<Option<Box<dyn Actor>>>,
    ) -> Self {
        let entry = core.topology.platform(id);
        let own: BTreeMap<ActorId, Box<dyn Actor>> = entry
            .actors
            .iter()
            .map(|&actor| (actor, actors[actor.0].take().expect("actor bound twice")))
            .collect();
        let inputs: Vec<PortId> = entry
            .actors
            .iter()
            .flat_map(|&actor| core.topology.actor(actor).inputs.iter().copied())
            .collect();
        let store = EventStore::new(own.keys().copied(), inputs.iter().copied());

        Self {
            id,
            core,
            coordinator,
            actors: own,
            inputs,
            store,
            inbound: BTreeMap::new(),
            executing: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Queues a pure event; used for initial events, before the platform
    /// thread starts.
    pub(crate) fn schedule_pure(&mut self, actor: ActorId, time: ModelTime) {
        self.store.schedule_pure(actor, time);
    }

    /// The platform scheduling loop; returns when the run ends.
    pub(crate) fn run(&mut self) {
        loop {
            if self.coordinator.halted().is_some() {
                return;
            }
            // The epoch is sampled before the evaluation pass: a release or
            // delivery racing with the pass makes the blocking call below
            // return immediately instead of suspending.
            let epoch = self.coordinator.epoch();
            let now = self.coordinator.time();
            if self.evaluate(now).is_err() {
                return;
            }
            if let Some(wakeup) = self.next_wakeup(now) {
                self.coordinator.schedule_wakeup(wakeup);
            }
            if self
                .coordinator
                .block_until_advance(self.id, self.pending(), epoch)
                .is_err()
            {
                return;
            }
        }
    }

    /// Runs token transfer, retirement and firing to a fixpoint at the given
    /// physical time.
    fn evaluate(&mut self, now: PhysicalTime) -> Result<(), ()> {
        // A firing missed in an earlier evaluation is worth another attempt
        // now that the platform was released.
        self.skipped.clear();
        loop {
            let mut changed = false;
            changed |= self.drain_receivers(now)?;
            changed |= self.expose_safe(now);
            changed |= self.retire_finished(now)?;
            changed |= self.start_firing(now)?;
            if !changed {
                return Ok(());
            }
            // Progress was made: previously missed firings are worth
            // another attempt.
            self.skipped.clear();
        }
    }

    /// Moves delivered tokens from the port receivers into the withheld
    /// buffers, checking the arrival deadline of tokens of remote origin.
    fn drain_receivers(&mut self, now: PhysicalTime) -> Result<bool, ()> {
        let allowance = self.core.config.clock_sync_error + self.core.config.network_delay;
        let mut any = false;
        for &port in &self.inputs {
            for (event, remote) in self.core.receivers[port.0].drain() {
                if remote && event.time + allowance < now {
                    self.coordinator.fault(ExecutionError::ProtocolViolation {
                        port: self.core.topology.port_path(port),
                        event_time: event.time,
                        physical_time: now,
                    });

                    return Err(());
                }
                let buffer = self.inbound.entry(port).or_default();
                let idx = buffer.partition_point(|pending| pending.time <= event.time);
                buffer.insert(idx, event);
                any = true;
            }
        }

        Ok(any)
    }

    /// Exposes withheld tokens cleared by the safety analysis, in timestamp
    /// order per port.
    fn expose_safe(&mut self, now: PhysicalTime) -> bool {
        let mut any = false;
        loop {
            let mut cleared = None;
            {
                let env = self.safety_env(now);
                for (&port, events) in env.inbound {
                    if let Some(event) = events.first() {
                        if safety::port_is_safe(&env, port, event.time) {
                            cleared = Some(port);
                            break;
                        }
                    }
                }
            }
            let Some(port) = cleared else {
                return any;
            };
            let event = self.inbound.get_mut(&port).expect("cleared port").remove(0);
            trace!(
                port = %self.core.topology.port_path(port),
                time = %event.time,
                "exposing token"
            );
            self.core.notify(ScheduleNotice {
                kind: NoticeKind::TransferInput,
                platform: self.id,
                actor: self.core.topology.port(port).actor,
                port: Some(port),
                model_time: event.time,
                physical_time: now,
            });
            self.store.expose(event);
            any = true;
        }
    }

    /// Completes the firings whose finish time has been reached: terminal
    /// phase, then delivery of the buffered outputs.
    fn retire_finished(&mut self, now: PhysicalTime) -> Result<bool, ()> {
        let mut any = false;
        loop {
            let idx = self
                .executing
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.finish <= now)
                .min_by_key(|(_, entry)| (entry.finish, entry.event_time, entry.actor))
                .map(|(idx, _)| idx);
            let Some(idx) = idx else {
                return Ok(any);
            };
            let mut entry = self.executing.remove(idx);
            let mut ctx = Context::new(entry.actor, entry.event_time, now, Vec::new());
            let actor = self.actors.get_mut(&entry.actor).expect("executing actor");
            if let Err(payload) =
                panic::catch_unwind(AssertUnwindSafe(|| actor.fire_terminate(&mut ctx)))
            {
                self.fault_panic(entry.actor, payload);

                return Err(());
            }
            debug!(
                actor = %self.core.topology.actor_path(entry.actor),
                time = %entry.event_time,
                started = %entry.start,
                "firing terminated"
            );
            for time in ctx.requests.drain(..) {
                self.store.schedule_pure(ctx.actor, time);
            }
            entry.outputs.append(&mut ctx.outputs);
            self.core.notify(ScheduleNotice {
                kind: NoticeKind::ExecutionStop,
                platform: self.id,
                actor: entry.actor,
                port: None,
                model_time: entry.event_time,
                physical_time: now,
            });
            self.deliver(entry.actor, entry.event_time, entry.outputs, now);
            any = true;
        }
    }

    /// Delivers output tokens to the ports connected to their emitting
    /// ports, adding the connection delay to the firing's model time.
    ///
    /// Blocked platforms are roused when a token crossed a platform
    /// boundary, so the receiver re-evaluates without waiting for a clock
    /// advance.
    fn deliver(
        &self,
        actor: ActorId,
        event_time: ModelTime,
        outputs: Vec<(PortId, Token)>,
        now: PhysicalTime,
    ) {
        let mut remote_delivery = false;
        for (port, token) in outputs {
            for link in &self.core.topology.port(port).targets {
                let time = event_time + link.delay;
                self.core.receivers[link.port.0].deliver(
                    PortEvent {
                        port: link.port,
                        time,
                        token: token.clone(),
                    },
                    link.cross_platform,
                );
                self.core.notify(ScheduleNotice {
                    kind: NoticeKind::TransferOutput,
                    platform: self.id,
                    actor,
                    port: Some(port),
                    model_time: time,
                    physical_time: now,
                });
                remote_delivery |= link.cross_platform;
            }
        }
        if remote_delivery {
            self.coordinator.rouse();
        }
    }

    /// Builds the safe candidate set and asks the execution strategy to
    /// start at most one firing.
    ///
    /// A candidate whose actor declines to fire is put back and ignored
    /// until the platform next makes progress; selection is then retried
    /// among the remaining candidates.
    fn start_firing(&mut self, now: PhysicalTime) -> Result<bool, ()> {
        loop {
            let candidates = self.candidates(now);
            let Some(idx) = self
                .core
                .config
                .strategy
                .select(&candidates, &self.executing)
            else {
                return Ok(false);
            };
            let candidate = candidates[idx];
            let inputs = self.core.topology.actor(candidate.actor).inputs.clone();
            let (tokens, pure_count) =
                self.store
                    .consume_firing(candidate.actor, candidate.time, &inputs);
            let mut ctx = Context::new(candidate.actor, candidate.time, now, tokens);
            let actor = self.actors.get_mut(&candidate.actor).expect("candidate actor");
            let wcet = actor.wcet();
            let fired = match panic::catch_unwind(AssertUnwindSafe(|| actor.fire_start(&mut ctx)))
            {
                Ok(fired) => fired,
                Err(payload) => {
                    self.fault_panic(candidate.actor, payload);

                    return Err(());
                }
            };
            if !fired {
                debug!(
                    actor = %self.core.topology.actor_path(candidate.actor),
                    time = %candidate.time,
                    "missed firing"
                );
                for _ in 0..pure_count {
                    self.store.schedule_pure(candidate.actor, candidate.time);
                }
                for (port, token) in ctx.inputs.drain(..) {
                    self.store.expose(PortEvent {
                        port,
                        time: candidate.time,
                        token,
                    });
                }
                self.skipped.push(candidate.actor);
                continue;
            }

            for time in ctx.requests.drain(..) {
                self.store.schedule_pure(ctx.actor, time);
            }
            let finish = now + wcet;
            debug!(
                actor = %self.core.topology.actor_path(candidate.actor),
                time = %candidate.time,
                finish = %finish,
                "firing started"
            );
            self.core.notify(ScheduleNotice {
                kind: NoticeKind::ExecutionStart,
                platform: self.id,
                actor: candidate.actor,
                port: None,
                model_time: candidate.time,
                physical_time: now,
            });
            // The newcomer runs first: every firing already in progress
            // finishes later by its WCET.
            for entry in &mut self.executing {
                entry.finish += wcet;
            }
            self.executing.push(Executing {
                actor: candidate.actor,
                event_time: candidate.time,
                priority: candidate.priority,
                start: now,
                finish,
                outputs: std::mem::take(&mut ctx.outputs),
            });

            return Ok(true);
        }
    }

    /// The safe events eligible for selection: per idle actor, its earliest
    /// pending event, when processable at the current physical time.
    fn candidates(&self, now: PhysicalTime) -> Vec<Candidate> {
        let env = self.safety_env(now);
        let mut candidates = Vec::new();
        for &actor in self.actors.keys() {
            if self.executing.iter().any(|entry| entry.actor == actor)
                || self.skipped.contains(&actor)
            {
                continue;
            }
            let entry = self.core.topology.actor(actor);
            let pure = self.store.pure_head(actor);
            let port = entry
                .inputs
                .iter()
                .filter_map(|&port| self.store.head_time(port))
                .min();
            let time = match (pure, port) {
                (Some(a), Some(b)) => a.min(b),
                (Some(time), None) | (None, Some(time)) => time,
                (None, None) => continue,
            };
            if time > now {
                continue;
            }
            // Real-time actors fire when the physical clock matches their
            // model time exactly.
            if entry.real_time && time != now {
                if time < now {
                    warn!(
                        actor = %self.core.topology.actor_path(actor),
                        time = %time,
                        "real-time event missed its instant"
                    );
                }
                continue;
            }
            if pure == Some(time) && !safety::pure_is_safe(&env, &entry.inputs, time) {
                continue;
            }
            candidates.push(Candidate {
                actor,
                time,
                priority: entry.priority,
            });
        }

        candidates
    }

    /// The nearest future physical time at which some pending event could
    /// become actionable, if any.
    fn next_wakeup(&self, now: PhysicalTime) -> Option<PhysicalTime> {
        let allowance = self.core.config.clock_sync_error + self.core.config.network_delay;
        let env = self.safety_env(now);
        let mut wakeup: Option<PhysicalTime> = None;
        let mut consider = |time: PhysicalTime| {
            if time > now {
                wakeup = Some(wakeup.map_or(time, |earliest| earliest.min(time)));
            }
        };

        for entry in &self.executing {
            consider(entry.finish);
        }
        for &port in &self.inputs {
            if let Some(head) = self.store.head_time(port) {
                consider(head);
            }
            // Withheld tokens become exposable at their static safety
            // threshold; when no threshold exists, the boundary-port
            // allowance bounds the dynamic check instead.
            if let Some(event) = self.inbound.get(&port).and_then(|events| events.first()) {
                consider(
                    safety::static_threshold(&env, port, event.time)
                        .unwrap_or(event.time + allowance),
                );
            }
        }
        for &actor in self.actors.keys() {
            let entry = self.core.topology.actor(actor);
            if let Some(time) = self.store.pure_head(actor) {
                if time > now {
                    consider(time);
                } else if !safety::pure_is_safe(&env, &entry.inputs, time) {
                    // A pure firing needs every input port of its actor to
                    // clear; the binding threshold is the latest one.
                    let threshold = entry
                        .inputs
                        .iter()
                        .map(|&port| {
                            safety::static_threshold(&env, port, time)
                                .unwrap_or(time + allowance)
                        })
                        .max();
                    if let Some(threshold) = threshold {
                        consider(threshold);
                    }
                }
            }
        }

        wakeup
    }

    /// Number of events the platform still holds in any buffer.
    fn pending(&self) -> usize {
        self.store.len()
            + self.inbound.values().map(Vec::len).sum::<usize>()
            + self.executing.len()
    }

    fn safety_env(&self, now: PhysicalTime) -> SafetyEnv<'_> {
        SafetyEnv {
            topology: &self.core.topology,
            causality: &self.core.causality,
            config: &self.core.config,
            store: &self.store,
            inbound: &self.inbound,
            executing: &self.executing,
            now,
        }
    }

    fn fault_panic(&self, actor: ActorId, payload: Box<dyn Any + Send>) {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            String::new()
        };
        self.coordinator.fault(ExecutionError::Panic {
            actor: self.core.topology.actor_path(actor),
            message,
        });
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("id", &self.id)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
