//! Safe-to-process analysis.
//!
//! An event with timestamp `T` on port `P` is *safe* when no causally
//! connected source can still produce an event with an earlier timestamp for
//! `P`'s equivalence class. Two independent checks are run; the event is
//! safe if either passes:
//!
//! * the *static* check compares the physical clock against `T` minus the
//!   precomputed delay offsets of `P` (see [`crate::causality`]), with the
//!   clock-synchronization error and network delay allowances added for
//!   threats of remote origin;
//! * the *dynamic* check walks the causality graph upstream from `P`'s
//!   equivalence class over an immutable snapshot of the topology,
//!   accumulating the minimum delay along every path, and verifies that each
//!   potential source (pending events, executing firings, real-time actors
//!   and platform boundary ports) is too far away to beat `T`.
//!
//! A failed check is not an error, merely "not yet provably safe": the same
//! event is re-examined once the clock or the platform state has moved.
//!
//! All state inspected here is local to the calling platform; remote
//! platforms are only accounted through the boundary-port allowances.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::time::Duration;

use crate::causality::CausalityModel;
use crate::ports::{PortDirection, PortEvent, PortId, Topology};
use crate::time::{ModelTime, MonotonicTime, PhysicalTime};

use super::event_store::EventStore;
use super::strategy::Executing;
use super::Config;

/// The platform-local state examined by the safety checks.
pub(crate) struct SafetyEnv<'a> {
    pub(crate) topology: &'a Topology,
    pub(crate) causality: &'a CausalityModel,
    pub(crate) config: &'a Config,
    pub(crate) store: &'a EventStore,
    /// Inbound tokens not yet exposed to the scheduler, sorted by timestamp.
    pub(crate) inbound: &'a BTreeMap<PortId, Vec<PortEvent>>,
    pub(crate) executing: &'a [Executing],
    pub(crate) now: PhysicalTime,
}

/// Whether an event with the given timestamp is safe to process on the given
/// input port.
pub(crate) fn port_is_safe(env: &SafetyEnv<'_>, port: PortId, time: ModelTime) -> bool {
    match statically_safe(env, port, time) {
        Some(true) => true,
        _ => dynamically_safe(env, port, time),
    }
}

/// Whether a pure event scheduled on an actor with the given input ports is
/// safe to process.
///
/// A pure firing may read any of the actor's inputs, so the event timestamp
/// must be safe on every one of them. An actor without inputs is always
/// safe.
pub(crate) fn pure_is_safe(env: &SafetyEnv<'_>, inputs: &[PortId], time: ModelTime) -> bool {
    inputs.iter().all(|&port| port_is_safe(env, port, time))
}

/// The earliest physical time at which the static check can succeed for an
/// event with the given timestamp, or `None` if it never can.
pub(crate) fn static_threshold(
    env: &SafetyEnv<'_>,
    port: PortId,
    time: ModelTime,
) -> Option<PhysicalTime> {
    let sensor = env.causality.sensor_offset(port);
    let network = env.causality.network_offset(port);
    if sensor.is_none() && network.is_none() {
        return None;
    }

    let mut threshold = MonotonicTime::EPOCH;
    if let Some(offset) = sensor {
        threshold = threshold.max(saturating_sub(time, offset));
    }
    if let Some(offset) = network {
        let adjusted = time + env.config.clock_sync_error + env.config.network_delay;
        threshold = threshold.max(saturating_sub(adjusted, offset));
    }

    Some(threshold)
}

/// The static check; `None` when both offsets are unbounded and the check is
/// inconclusive.
fn statically_safe(env: &SafetyEnv<'_>, port: PortId, time: ModelTime) -> Option<bool> {
    let sensor = env.causality.sensor_offset(port);
    let network = env.causality.network_offset(port);
    if sensor.is_none() && network.is_none() {
        return None;
    }

    let mut safe = true;
    if let Some(offset) = sensor {
        safe &= env.now + offset >= time;
    }
    if let Some(offset) = network {
        safe &= env.now + offset
            >= time + env.config.clock_sync_error + env.config.network_delay;
    }

    Some(safe)
}

/// The dynamic check: every upstream source, at its minimum accumulated
/// delay, must be unable to beat `time`.
fn dynamically_safe(env: &SafetyEnv<'_>, port: PortId, time: ModelTime) -> bool {
    let allowance = env.config.clock_sync_error + env.config.network_delay;

    for (upstream, acc) in upstream_distances(env, port) {
        let entry = env.topology.port(upstream);
        match entry.direction {
            PortDirection::Input => {
                // Events already buffered at this port, exposed or not.
                if let Some(pending) = earliest_pending(env, upstream) {
                    if pending + acc < time {
                        return false;
                    }
                }
                // Remote producers can still deliver events as old as
                // `now - allowance` through a boundary port.
                if entry.sources.iter().any(|link| link.cross_platform)
                    && env.now + acc < time + allowance
                {
                    return false;
                }
            }
            PortDirection::Output => {
                let actor = env.topology.actor(entry.actor);
                // A real-time actor stamps future firings with the physical
                // clock.
                if actor.real_time && env.now + acc < time {
                    return false;
                }
                // Pending pure events bound the actor's future outputs.
                if let Some(pending) = env.store.pure_head(entry.actor) {
                    if pending + acc < time {
                        return false;
                    }
                }
                // So does a firing in progress, which delivers its outputs
                // at its own event time.
                if let Some(entry) = env.executing.iter().find(|x| x.actor == entry.actor) {
                    if entry.event_time + acc < time {
                        return false;
                    }
                }
            }
        }
    }

    true
}

/// The earliest buffered event at a local input port, whether exposed to the
/// scheduler or still withheld.
fn earliest_pending(env: &SafetyEnv<'_>, port: PortId) -> Option<ModelTime> {
    let exposed = env.store.port_events(port).front().map(|event| event.time);
    let withheld = env
        .inbound
        .get(&port)
        .and_then(|events| events.first())
        .map(|event| event.time);

    match (exposed, withheld) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (time, None) | (None, time) => time,
    }
}

/// Minimum accumulated delay from the equivalence class of `origin` to every
/// upstream port reachable without crossing a platform boundary.
///
/// This is a Dijkstra traversal of the reversed port graph; the explicit
/// distance map doubles as the visited set, so cycles terminate.
fn upstream_distances(env: &SafetyEnv<'_>, origin: PortId) -> BTreeMap<PortId, Duration> {
    let mut dist: BTreeMap<PortId, Duration> = BTreeMap::new();
    let mut heap = BinaryHeap::new();

    for &port in env.causality.equivalence_class(origin) {
        dist.insert(port, Duration::ZERO);
        heap.push(Reverse((Duration::ZERO, port)));
    }

    while let Some(Reverse((d, port))) = heap.pop() {
        if dist.get(&port) != Some(&d) {
            continue;
        }
        let entry = env.topology.port(port);
        match entry.direction {
            PortDirection::Input => {
                for link in &entry.sources {
                    if link.cross_platform {
                        continue;
                    }
                    relax(&mut dist, &mut heap, link.port, d + link.delay);
                }
            }
            PortDirection::Output => {
                let actor = env.topology.actor(entry.actor);
                for &input in &actor.inputs {
                    if let Some(feedthrough) = env.topology.internal_delay(input, port) {
                        relax(&mut dist, &mut heap, input, d + feedthrough);
                    }
                }
            }
        }
    }

    dist
}

fn relax(
    dist: &mut BTreeMap<PortId, Duration>,
    heap: &mut BinaryHeap<Reverse<(Duration, PortId)>>,
    port: PortId,
    d: Duration,
) {
    if dist.get(&port).map_or(true, |&known| d < known) {
        dist.insert(port, d);
        heap.push(Reverse((d, port)));
    }
}

fn saturating_sub(time: MonotonicTime, delay: Duration) -> MonotonicTime {
    time.checked_sub(delay).unwrap_or(MonotonicTime::EPOCH)
}
