//! Platforms, actors, ports and their interconnection topology.
//!
//! A simulated system is declared as a static topology before execution
//! starts: *platforms* are independently scheduled nodes, each hosting a set
//! of *actors*; actors expose input and output *ports*; directed connections
//! link an output port to an input port with a minimum propagation delay.
//! Connections whose endpoints live on different platforms model network
//! links and are subject to the configured clock-synchronization error and
//! network delay allowances.
//!
//! The topology is built through [`SimInit`](crate::simulation::SimInit) and
//! frozen when the simulation is initialized; the scheduling core only ever
//! reads it. Elements are designated by the lightweight [`PlatformId`],
//! [`ActorId`] and [`PortId`] handles returned at declaration time.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use slab::Slab;

use crate::actor::Token;
use crate::time::ModelTime;

/// Identifier of a platform within a simulation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlatformId(pub(crate) usize);

/// Identifier of an actor within a simulation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(pub(crate) usize);

/// Identifier of a port within a simulation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(pub(crate) usize);

/// Direction of a port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PortDirection {
    Input,
    Output,
}

/// A directed connection endpoint.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Link {
    /// The port at the other end of the connection.
    pub(crate) port: PortId,
    /// Minimum propagation delay along the connection.
    pub(crate) delay: Duration,
    /// Whether the connection endpoints live on different platforms.
    pub(crate) cross_platform: bool,
}

pub(crate) struct PlatformEntry {
    pub(crate) name: String,
    pub(crate) actors: Vec<ActorId>,
}

pub(crate) struct ActorEntry {
    pub(crate) name: String,
    pub(crate) platform: PlatformId,
    pub(crate) inputs: Vec<PortId>,
    pub(crate) outputs: Vec<PortId>,
    pub(crate) priority: i32,
    pub(crate) real_time: bool,
}

pub(crate) struct PortEntry {
    pub(crate) name: String,
    pub(crate) actor: ActorId,
    pub(crate) direction: PortDirection,
    /// Inbound connections, for input ports.
    pub(crate) sources: Vec<Link>,
    /// Outbound connections, for output ports.
    pub(crate) targets: Vec<Link>,
}

/// The static structure of a simulated system.
pub(crate) struct Topology {
    pub(crate) platforms: Slab<PlatformEntry>,
    pub(crate) actors: Slab<ActorEntry>,
    pub(crate) ports: Slab<PortEntry>,
    /// Declared minimum delays from an input port to an output port of the
    /// same actor; pairs without an entry default to a direct, zero-delay
    /// feedthrough.
    pub(crate) internal: HashMap<(PortId, PortId), Option<Duration>>,
}

impl Topology {
    pub(crate) fn new() -> Self {
        Self {
            platforms: Slab::new(),
            actors: Slab::new(),
            ports: Slab::new(),
            internal: HashMap::new(),
        }
    }

    pub(crate) fn add_platform(&mut self, name: String) -> PlatformId {
        PlatformId(self.platforms.insert(PlatformEntry {
            name,
            actors: Vec::new(),
        }))
    }

    pub(crate) fn add_actor(
        &mut self,
        platform: PlatformId,
        name: String,
        priority: i32,
        real_time: bool,
    ) -> ActorId {
        let id = ActorId(self.actors.insert(ActorEntry {
            name,
            platform,
            inputs: Vec::new(),
            outputs: Vec::new(),
            priority,
            real_time,
        }));
        self.platforms[platform.0].actors.push(id);

        id
    }

    pub(crate) fn add_port(
        &mut self,
        actor: ActorId,
        name: String,
        direction: PortDirection,
    ) -> PortId {
        let id = PortId(self.ports.insert(PortEntry {
            name,
            actor,
            direction,
            sources: Vec::new(),
            targets: Vec::new(),
        }));
        match direction {
            PortDirection::Input => self.actors[actor.0].inputs.push(id),
            PortDirection::Output => self.actors[actor.0].outputs.push(id),
        }

        id
    }

    pub(crate) fn connect(&mut self, source: PortId, destination: PortId, delay: Duration) {
        let cross_platform = self.actor(self.port(source).actor).platform
            != self.actor(self.port(destination).actor).platform;

        self.ports[source.0].targets.push(Link {
            port: destination,
            delay,
            cross_platform,
        });
        self.ports[destination.0].sources.push(Link {
            port: source,
            delay,
            cross_platform,
        });
    }

    pub(crate) fn platform(&self, id: PlatformId) -> &PlatformEntry {
        &self.platforms[id.0]
    }

    pub(crate) fn actor(&self, id: ActorId) -> &ActorEntry {
        &self.actors[id.0]
    }

    pub(crate) fn port(&self, id: PortId) -> &PortEntry {
        &self.ports[id.0]
    }

    /// The declared minimum delay from an input port to an output port of
    /// the same actor, or `None` if the output does not depend on the input.
    pub(crate) fn internal_delay(&self, input: PortId, output: PortId) -> Option<Duration> {
        match self.internal.get(&(input, output)) {
            Some(delay) => *delay,
            None => Some(Duration::ZERO),
        }
    }

    /// Full dotted path of a port, for diagnostics.
    pub(crate) fn port_path(&self, id: PortId) -> String {
        let port = self.port(id);
        let actor = self.actor(port.actor);
        let platform = self.platform(actor.platform);

        format!("{}.{}.{}", platform.name, actor.name, port.name)
    }

    /// Full dotted path of an actor, for diagnostics.
    pub(crate) fn actor_path(&self, id: ActorId) -> String {
        let actor = self.actor(id);
        let platform = self.platform(actor.platform);

        format!("{}.{}", platform.name, actor.name)
    }
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("platforms", &self.platforms.len())
            .field("actors", &self.actors.len())
            .field("ports", &self.ports.len())
            .finish_non_exhaustive()
    }
}

/// A time-stamped token buffered at an input port.
#[derive(Clone, Debug)]
pub(crate) struct PortEvent {
    pub(crate) port: PortId,
    pub(crate) time: ModelTime,
    pub(crate) token: Token,
}

/// The inbox of an input port.
///
/// Producers deliver into the receiver from their own platform thread; the
/// owning platform periodically drains it into its local buffers. This is
/// the only structure through which platforms exchange event data. Events
/// delivered over a cross-platform connection are flagged as remote, since
/// they are subject to the network-interface arrival deadline.
pub(crate) struct Receiver {
    queue: Mutex<VecDeque<(PortEvent, bool)>>,
}

impl Receiver {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends a delivered event.
    pub(crate) fn deliver(&self, event: PortEvent, remote: bool) {
        self.queue.lock().unwrap().push_back((event, remote));
    }

    /// Takes all buffered events.
    pub(crate) fn drain(&self) -> Vec<(PortEvent, bool)> {
        self.queue.lock().unwrap().drain(..).collect()
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("len", &self.queue.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}
