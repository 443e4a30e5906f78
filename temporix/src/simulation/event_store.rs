//! Per-platform storage of schedulable events.
//!
//! The store holds the events a platform may legitimately show to its
//! scheduler: pure (timer) events in one FIFO-stable priority queue per
//! actor, and port events in one timestamp-sorted buffer per input port.
//! Port events only enter the store once the safety analysis has cleared
//! them; until then they wait in the platform's inbound buffers. Events are
//! removed exactly once, when the firing they trigger starts.

use std::collections::{BTreeMap, VecDeque};

use crate::actor::Token;
use crate::ports::{ActorId, PortEvent, PortId};
use crate::time::ModelTime;
use crate::util::priority_queue::PriorityQueue;

pub(crate) struct EventStore {
    pure: BTreeMap<ActorId, PriorityQueue<ModelTime, ()>>,
    ports: BTreeMap<PortId, VecDeque<PortEvent>>,
}

impl EventStore {
    /// Creates a store for the given actors and their input ports.
    pub(crate) fn new(
        actors: impl Iterator<Item = ActorId>,
        inputs: impl Iterator<Item = PortId>,
    ) -> Self {
        Self {
            pure: actors.map(|a| (a, PriorityQueue::new())).collect(),
            ports: inputs.map(|p| (p, VecDeque::new())).collect(),
        }
    }

    /// Schedules a pure event.
    pub(crate) fn schedule_pure(&mut self, actor: ActorId, time: ModelTime) {
        self.pure
            .get_mut(&actor)
            .expect("pure event scheduled for an actor not on this platform")
            .insert(time, ());
    }

    /// The earliest pending pure event of an actor.
    pub(crate) fn pure_head(&self, actor: ActorId) -> Option<ModelTime> {
        self.pure[&actor].peek().map(|(&time, _)| time)
    }

    /// Exposes a port event to the scheduler, keeping the port buffer sorted
    /// by timestamp with FIFO order for equal timestamps.
    pub(crate) fn expose(&mut self, event: PortEvent) {
        let queue = self
            .ports
            .get_mut(&event.port)
            .expect("port event exposed on a port not on this platform");
        let mut idx = queue.len();
        while idx > 0 && queue[idx - 1].time > event.time {
            idx -= 1;
        }
        queue.insert(idx, event);
    }

    /// The earliest exposed event on a port.
    pub(crate) fn head_time(&self, port: PortId) -> Option<ModelTime> {
        self.ports[&port].front().map(|event| event.time)
    }

    /// The exposed events on a port, earliest first.
    pub(crate) fn port_events(&self, port: PortId) -> &VecDeque<PortEvent> {
        &self.ports[&port]
    }

    /// Consumes the events triggering a firing of `actor` at `time`: every
    /// pure event of the actor and every exposed event on its input ports
    /// carrying exactly that timestamp.
    ///
    /// Returns the consumed tokens and the number of consumed pure events.
    pub(crate) fn consume_firing(
        &mut self,
        actor: ActorId,
        time: ModelTime,
        inputs: &[PortId],
    ) -> (Vec<(PortId, Token)>, usize) {
        let mut pure_count = 0;
        let queue = self.pure.get_mut(&actor).expect("unknown actor");
        while queue.peek().map(|(&t, _)| t) == Some(time) {
            queue.pull();
            pure_count += 1;
        }

        let mut tokens = Vec::new();
        for &port in inputs {
            let queue = self.ports.get_mut(&port).expect("unknown port");
            while queue.front().map(|event| event.time) == Some(time) {
                let event = queue.pop_front().unwrap();
                tokens.push((port, event.token));
            }
        }

        (tokens, pure_count)
    }

    /// Total number of pending events.
    pub(crate) fn len(&self) -> usize {
        self.pure.values().map(|q| q.len()).sum::<usize>()
            + self.ports.values().map(|q| q.len()).sum::<usize>()
    }
}
