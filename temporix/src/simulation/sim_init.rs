use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actor::Actor;
use crate::causality::CausalityModel;
use crate::observer::ScheduleObserver;
use crate::ports::{ActorId, PlatformId, PortDirection, PortId, Receiver, Topology};
use crate::time::{Clock, MonotonicTime, NoClock};

use super::coordinator::Coordinator;
use super::platform::Platform;
use super::{Config, ConfigError, Core, Simulation, StrategyKind};

/// Builder for a distributed real-time simulation.
///
/// The builder is used in three steps:
///
/// 1. declare the system structure: platforms with
///    [`add_platform()`](Self::add_platform), actors with
///    [`add_actor()`](Self::add_actor), their ports with
///    [`add_input()`](Self::add_input)/[`add_output()`](Self::add_output),
///    and the connections between ports with [`connect()`](Self::connect);
/// 2. bind each declared actor to its implementation with
///    [`bind_actor()`](Self::bind_actor); ports are declared before
///    binding so the implementation can hold the port identifiers it reads
///    and writes;
/// 3. configure the execution parameters with the chainable setters and
///    call [`init()`](Self::init), which validates the configuration,
///    freezes the topology and returns the [`Simulation`].
///
/// Configuration errors are reported by [`init()`](Self::init), before any
/// platform thread starts.
pub struct SimInit {
    topology: Topology,
    /// Actor implementations, indexed by actor id; `None` until bound.
    actors: Vec<Option<Box<dyn Actor>>>,
    groups: HashMap<ActorId, Vec<Vec<PortId>>>,
    offsets: HashMap<PortId, Duration>,
    config: Config,
    clock: Box<dyn Clock + 'static>,
    observers: Vec<Box<dyn ScheduleObserver>>,
}

impl SimInit {
    /// Creates a builder with default execution parameters.
    pub fn new() -> Self {
        Self {
            topology: Topology::new(),
            actors: Vec::new(),
            groups: HashMap::new(),
            offsets: HashMap::new(),
            config: Config {
                strategy: StrategyKind::default(),
                clock_sync_error: Duration::from_millis(100),
                network_delay: Duration::from_millis(100),
                completion_time: MonotonicTime::MAX,
                delay_analysis: true,
            },
            clock: Box::new(NoClock::new()),
            observers: Vec::new(),
        }
    }

    /// Declares a platform.
    ///
    /// Each platform is scheduled independently, on its own thread.
    pub fn add_platform(&mut self, name: impl Into<String>) -> PlatformId {
        self.topology.add_platform(name.into())
    }

    /// Declares an actor on a platform.
    ///
    /// The actor must be bound to an implementation with
    /// [`bind_actor()`](Self::bind_actor) before the simulation is
    /// initialized.
    pub fn add_actor(&mut self, platform: PlatformId, name: impl Into<String>) -> ActorId {
        let id = self.topology.add_actor(platform, name.into(), 0, false);
        self.actors.push(None);

        id
    }

    /// Declares an input port of an actor.
    pub fn add_input(&mut self, actor: ActorId, name: impl Into<String>) -> PortId {
        self.topology.add_port(actor, name.into(), PortDirection::Input)
    }

    /// Declares an output port of an actor.
    pub fn add_output(&mut self, actor: ActorId, name: impl Into<String>) -> PortId {
        self.topology.add_port(actor, name.into(), PortDirection::Output)
    }

    /// Binds a declared actor to its implementation.
    ///
    /// The actor's declared priority and real-time constraint are captured
    /// at this point.
    pub fn bind_actor(&mut self, actor: ActorId, implementation: impl Actor) {
        self.topology.actors[actor.0].priority = implementation.priority();
        self.topology.actors[actor.0].real_time = implementation.real_time();
        self.actors[actor.0] = Some(Box::new(implementation));
    }

    /// Connects an output port to an input port, with the specified minimum
    /// propagation delay.
    ///
    /// Connections whose endpoints live on different platforms model network
    /// links: tokens they carry are subject to the configured
    /// clock-synchronization error and network delay allowances.
    pub fn connect(&mut self, source: PortId, destination: PortId, delay: Duration) {
        self.topology.connect(source, destination, delay);
    }

    /// Declares the minimum delay contributed by an actor between one of its
    /// input ports and one of its output ports, or that the output does not
    /// depend on the input at all (`None`).
    ///
    /// Pairs without a declaration default to a direct, zero-delay
    /// feedthrough.
    pub fn set_feedthrough(&mut self, input: PortId, output: PortId, delay: Option<Duration>) {
        self.topology.internal.insert((input, output), delay);
    }

    /// Groups input ports of one actor into an equivalence class of their
    /// own.
    ///
    /// By default, all input ports of an actor form a single class and
    /// jointly observe events in non-decreasing timestamp order. Declaring
    /// groups relaxes this: each group orders only its own members, and
    /// ungrouped ports are left independent.
    pub fn group_inputs(&mut self, ports: &[PortId]) {
        if let Some(&first) = ports.first() {
            let actor = self.topology.port(first).actor;
            self.groups.entry(actor).or_default().push(ports.to_vec());
        }
    }

    /// Sets a manual safe-to-process offset for an input port.
    ///
    /// Mostly useful when the automatic delay analysis is disabled with
    /// [`set_delay_analysis()`](Self::set_delay_analysis): an event with
    /// timestamp `T` on the port is deemed safe once the physical clock
    /// reaches `T - offset`.
    pub fn set_port_offset(&mut self, port: PortId, offset: Duration) {
        self.offsets.insert(port, offset);
    }

    /// Sets the execution strategy.
    ///
    /// If the strategy is not explicitly set then the default
    /// [`StrategyKind::NonPreemptive`] is used.
    pub fn set_strategy(mut self, strategy: StrategyKind) -> Self {
        self.config.strategy = strategy;

        self
    }

    /// Sets the execution strategy from its configuration name.
    ///
    /// Recognized names are `non-preemptive` and `preemptive`.
    pub fn set_strategy_name(self, name: &str) -> Result<Self, ConfigError> {
        Ok(self.set_strategy(name.parse()?))
    }

    /// Sets the assumed bound on the clock-synchronization error between
    /// platforms (default: 100 ms).
    pub fn set_clock_sync_error(mut self, error: Duration) -> Self {
        self.config.clock_sync_error = error;

        self
    }

    /// Sets the assumed bound on the network delivery delay between
    /// platforms (default: 100 ms).
    pub fn set_network_delay(mut self, delay: Duration) -> Self {
        self.config.network_delay = delay;

        self
    }

    /// Sets the physical time past which the run completes, even if events
    /// remain (default: unbounded).
    pub fn set_completion_time(mut self, time: MonotonicTime) -> Self {
        self.config.completion_time = time;

        self
    }

    /// Enables or disables the automatic minimum-delay analysis (default:
    /// enabled).
    ///
    /// When disabled, the static safety check relies solely on the offsets
    /// declared with [`set_port_offset()`](Self::set_port_offset) and every
    /// other port falls back to the dynamic analysis.
    pub fn set_delay_analysis(mut self, enable: bool) -> Self {
        self.config.delay_analysis = enable;

        self
    }

    /// Synchronizes the physical clock with the provided [`Clock`].
    ///
    /// If the clock isn't explicitly set then the default [`NoClock`] is
    /// used, resulting in the simulation running as fast as possible.
    pub fn set_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);

        self
    }

    /// Registers a recipient for schedule-event notifications.
    pub fn attach_observer(
        mut self,
        observer: impl ScheduleObserver + 'static,
    ) -> Self {
        self.observers.push(Box::new(observer));

        self
    }

    /// Validates the configuration and builds a simulation initialized at
    /// the specified physical time.
    pub fn init(mut self, start: MonotonicTime) -> Result<Simulation, ConfigError> {
        if self.config.completion_time < start {
            return Err(ConfigError::InvalidCompletionTime(
                self.config.completion_time,
            ));
        }
        for (idx, actor) in self.actors.iter().enumerate() {
            if actor.is_none() {
                return Err(ConfigError::UnboundActor(
                    self.topology.actor_path(ActorId(idx)),
                ));
            }
        }
        // Every connection must link an output port to an input port.
        for (idx, port) in self.topology.ports.iter() {
            let misdirected = match port.direction {
                PortDirection::Input => port.targets.first(),
                PortDirection::Output => port.sources.first(),
            };
            if let Some(link) = misdirected {
                let (source, destination) = match port.direction {
                    PortDirection::Input => (PortId(idx), link.port),
                    PortDirection::Output => (link.port, PortId(idx)),
                };

                return Err(ConfigError::InvalidConnection {
                    source: self.topology.port_path(source),
                    destination: self.topology.port_path(destination),
                });
            }
        }

        let causality = CausalityModel::build(
            &self.topology,
            self.config.delay_analysis,
            &self.offsets,
            &self.groups,
        );
        let receivers = self.topology.ports.iter().map(|_| Receiver::new()).collect();
        let platform_names = self
            .topology
            .platforms
            .iter()
            .map(|(_, platform)| platform.name.clone())
            .collect();
        let coordinator = Arc::new(Coordinator::new(
            platform_names,
            start,
            self.clock,
            self.config.completion_time,
        ));
        let core = Arc::new(Core {
            topology: self.topology,
            causality,
            config: self.config,
            receivers,
            observers: self.observers,
        });
        let platforms = core
            .topology
            .platforms
            .iter()
            .map(|(idx, _)| {
                Platform::new(
                    PlatformId(idx),
                    core.clone(),
                    coordinator.clone(),
                    &mut self.actors,
                )
            })
            .collect();

        Ok(Simulation::new(core, coordinator, platforms))
    }
}

impl Default for SimInit {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimInit").finish_non_exhaustive()
    }
}
