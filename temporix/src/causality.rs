//! Causal analysis of the port graph.
//!
//! The causality model is computed once, when the simulation is initialized,
//! and is immutable afterwards. It provides two results consumed by the
//! safe-to-process analysis:
//!
//! * *equivalence classes*: the sets of input ports of one actor that must
//!   jointly observe events in non-decreasing timestamp order;
//! * *delay offsets*: per input port, a lower bound on the propagation delay
//!   from any port where not-yet-known events can originate: same-platform
//!   real-time sources on one hand, cross-platform boundary ports on the
//!   other hand.
//!
//! All distances are min-plus shortest paths over the port graph, whose
//! edges are the declared connections and the per-actor input-to-output
//! feedthrough delays. The analysis is platform-local: connections crossing
//! a platform boundary are not traversed, since remote state is not
//! observable; threats of remote origin are instead accounted at the
//! boundary port they enter through.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use crate::ports::{ActorId, PortDirection, PortId, Topology};

/// Equivalence classes and delay offsets of a frozen topology.
pub(crate) struct CausalityModel {
    classes: Vec<Vec<PortId>>,
    /// Class index per port; meaningless for output ports.
    class_of: Vec<usize>,
    /// Min delay from any same-platform real-time source, per port.
    sensor_offset: Vec<Option<Duration>>,
    /// Min delay from any cross-platform boundary port, per port.
    network_offset: Vec<Option<Duration>>,
}

impl CausalityModel {
    /// Builds the model for a frozen topology.
    ///
    /// When `auto_delays` is disabled, the delay offsets are limited to the
    /// explicitly provided per-port offsets and every other port relies on
    /// the dynamic analysis alone.
    pub(crate) fn build(
        topology: &Topology,
        auto_delays: bool,
        manual_offsets: &HashMap<PortId, Duration>,
        explicit_groups: &HashMap<ActorId, Vec<Vec<PortId>>>,
    ) -> Self {
        let num_ports = topology.ports.len();

        // Partition each actor's input ports into equivalence classes: the
        // declared groups if any, with ungrouped ports independent, or a
        // single class covering all inputs otherwise.
        let mut classes: Vec<Vec<PortId>> = Vec::new();
        let mut class_of = vec![usize::MAX; num_ports];
        for (actor_idx, actor) in topology.actors.iter() {
            match explicit_groups.get(&ActorId(actor_idx)) {
                Some(groups) => {
                    for group in groups {
                        let class = classes.len();
                        for &port in group {
                            class_of[port.0] = class;
                        }
                        classes.push(group.clone());
                    }
                    for &port in &actor.inputs {
                        if class_of[port.0] == usize::MAX {
                            class_of[port.0] = classes.len();
                            classes.push(vec![port]);
                        }
                    }
                }
                None => {
                    if !actor.inputs.is_empty() {
                        let class = classes.len();
                        for &port in &actor.inputs {
                            class_of[port.0] = class;
                        }
                        classes.push(actor.inputs.clone());
                    }
                }
            }
        }

        let (mut sensor_offset, mut network_offset) = if auto_delays {
            // Real-time actors stamp their outputs with the physical time at
            // which they fire, so their output ports seed the sensor
            // distances.
            let mut sensor_seeds = Vec::new();
            for (_, actor) in topology.actors.iter() {
                if actor.real_time {
                    sensor_seeds.extend(actor.outputs.iter().map(|&p| (p, Duration::ZERO)));
                }
            }

            // Ports fed from another platform can receive events whose
            // producers are not observable locally.
            let mut network_seeds = Vec::new();
            for (port_idx, port) in topology.ports.iter() {
                if port.sources.iter().any(|link| link.cross_platform) {
                    network_seeds.push((PortId(port_idx), Duration::ZERO));
                }
            }

            (
                shortest_distances(topology, &sensor_seeds, false),
                shortest_distances(topology, &network_seeds, false),
            )
        } else {
            (vec![None; num_ports], vec![None; num_ports])
        };

        for (&port, &offset) in manual_offsets {
            sensor_offset[port.0] = Some(offset);
        }

        // Ports of one equivalence class share fate: an event on any member
        // is threatened by arrivals on every member, so the binding offset
        // is the smallest among the class.
        for class in &classes {
            let sensor = class.iter().filter_map(|p| sensor_offset[p.0]).min();
            let network = class.iter().filter_map(|p| network_offset[p.0]).min();
            for &port in class {
                sensor_offset[port.0] = sensor;
                network_offset[port.0] = network;
            }
        }

        Self {
            classes,
            class_of,
            sensor_offset,
            network_offset,
        }
    }

    /// The equivalence class of an input port, including the port itself.
    pub(crate) fn equivalence_class(&self, port: PortId) -> &[PortId] {
        &self.classes[self.class_of[port.0]]
    }

    /// Min delay from any same-platform real-time source to this port.
    pub(crate) fn sensor_offset(&self, port: PortId) -> Option<Duration> {
        self.sensor_offset[port.0]
    }

    /// Min delay from any cross-platform boundary port to this port.
    pub(crate) fn network_offset(&self, port: PortId) -> Option<Duration> {
        self.network_offset[port.0]
    }

    /// Lower bound on the propagation delay from one port to another, or
    /// `None` if no causal path links them.
    ///
    /// Unlike the delay offsets, this bound follows connections across
    /// platform boundaries.
    pub(crate) fn minimum_delay(
        &self,
        topology: &Topology,
        source: PortId,
        destination: PortId,
    ) -> Option<Duration> {
        shortest_distances(topology, &[(source, Duration::ZERO)], true)[destination.0]
    }
}

/// Multi-source min-plus shortest path over the port graph.
///
/// Edges are the declared connections (optionally restricted to
/// same-platform ones) and the per-actor input-to-output feedthrough
/// delays.
fn shortest_distances(
    topology: &Topology,
    seeds: &[(PortId, Duration)],
    follow_cross_platform: bool,
) -> Vec<Option<Duration>> {
    let mut dist: Vec<Option<Duration>> = vec![None; topology.ports.len()];
    let mut heap = BinaryHeap::new();

    for &(port, d) in seeds {
        if dist[port.0].map_or(true, |known| d < known) {
            dist[port.0] = Some(d);
            heap.push(Reverse((d, port.0)));
        }
    }

    while let Some(Reverse((d, port_idx))) = heap.pop() {
        if dist[port_idx] != Some(d) {
            continue;
        }
        let port = topology.port(PortId(port_idx));
        match port.direction {
            PortDirection::Output => {
                for link in &port.targets {
                    if link.cross_platform && !follow_cross_platform {
                        continue;
                    }
                    let next = d + link.delay;
                    if dist[link.port.0].map_or(true, |known| next < known) {
                        dist[link.port.0] = Some(next);
                        heap.push(Reverse((next, link.port.0)));
                    }
                }
            }
            PortDirection::Input => {
                let actor = topology.actor(port.actor);
                for &output in &actor.outputs {
                    if let Some(feedthrough) =
                        topology.internal_delay(PortId(port_idx), output)
                    {
                        let next = d + feedthrough;
                        if dist[output.0].map_or(true, |known| next < known) {
                            dist[output.0] = Some(next);
                            heap.push(Reverse((next, output.0)));
                        }
                    }
                }
            }
        }
    }

    dist
}
