//! Run termination: completion, deadlock reporting, stop requests and
//! configuration validation.

use std::time::Duration;

use temporix::actor::{Actor, Context};
use temporix::simulation::{
    ConfigError, ExecutionError, RunOutcome, SchedulingError, SimInit,
};
use temporix::time::MonotonicTime;

fn t(secs: u64) -> MonotonicTime {
    MonotonicTime::EPOCH + Duration::from_secs(secs)
}

/// Reschedules itself forever.
struct Pulse {
    period: Duration,
}

impl Actor for Pulse {
    fn fire_start(&mut self, ctx: &mut Context) -> bool {
        ctx.schedule_at(self.period).unwrap();
        true
    }
}

/// Fires exactly once.
struct OneShot;

impl Actor for OneShot {
    fn fire_start(&mut self, _: &mut Context) -> bool {
        true
    }
}

/// Always declines to fire.
struct Refusenik;

impl Actor for Refusenik {
    fn fire_start(&mut self, _: &mut Context) -> bool {
        false
    }
}

/// Panics when fired.
struct Bomb;

impl Actor for Bomb {
    fn fire_start(&mut self, _: &mut Context) -> bool {
        panic!("boom")
    }
}

#[test]
fn run_completes_when_events_are_exhausted() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut bench = SimInit::new();
    let p0 = bench.add_platform("p0");
    let actor = bench.add_actor(p0, "one-shot");
    bench.bind_actor(actor, OneShot);

    let mut simu = bench.init(t(0)).unwrap();
    simu.schedule_at(actor, t(3)).unwrap();
    assert_eq!(simu.run().unwrap(), RunOutcome::Completed);
    assert_eq!(simu.time(), t(3));
}

#[test]
fn run_completes_at_the_completion_time() {
    let mut bench = SimInit::new().set_completion_time(t(10));
    let p0 = bench.add_platform("p0");
    let pulse = bench.add_actor(p0, "pulse");
    bench.bind_actor(
        pulse,
        Pulse {
            period: Duration::from_secs(1),
        },
    );

    let mut simu = bench.init(t(0)).unwrap();
    simu.schedule_at(pulse, t(0)).unwrap();
    assert_eq!(simu.run().unwrap(), RunOutcome::Completed);
    // The event at the completion time itself still runs; the next advance
    // would overshoot and ends the run instead.
    assert_eq!(simu.time(), t(10));
}

#[test]
fn unfireable_event_is_reported_as_deadlock() {
    let mut bench = SimInit::new();
    let p0 = bench.add_platform("stuck");
    let actor = bench.add_actor(p0, "refusenik");
    bench.bind_actor(actor, Refusenik);

    let mut simu = bench.init(t(0)).unwrap();
    simu.schedule_at(actor, t(1)).unwrap();
    match simu.run() {
        Err(ExecutionError::Deadlock(info)) => {
            assert_eq!(info.len(), 1);
            assert_eq!(info[0].platform, "stuck");
            assert_eq!(info[0].pending_events, 1);
        }
        other => panic!("expected a deadlock report, got {other:?}"),
    }
}

#[test]
fn halt_request_stops_the_run() {
    let mut bench = SimInit::new();
    let p0 = bench.add_platform("p0");
    let pulse = bench.add_actor(p0, "pulse");
    bench.bind_actor(
        pulse,
        Pulse {
            period: Duration::from_millis(10),
        },
    );

    let mut simu = bench.init(t(0)).unwrap();
    simu.schedule_at(pulse, t(0)).unwrap();
    let halter = simu.halter();

    std::thread::scope(|scope| {
        let stopper = scope.spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            halter.halt();
        });
        assert_eq!(simu.run().unwrap(), RunOutcome::Stopped);
        stopper.join().unwrap();
    });
}

#[test]
fn actor_panic_aborts_the_run() {
    let mut bench = SimInit::new();
    let p0 = bench.add_platform("p0");
    let bomb = bench.add_actor(p0, "bomb");
    bench.bind_actor(bomb, Bomb);

    let mut simu = bench.init(t(0)).unwrap();
    simu.schedule_at(bomb, t(1)).unwrap();
    match simu.run() {
        Err(ExecutionError::Panic { actor, message }) => {
            assert_eq!(actor, "p0.bomb");
            assert_eq!(message, "boom");
        }
        other => panic!("expected a panic report, got {other:?}"),
    }
}

#[test]
fn past_events_cannot_be_scheduled() {
    let mut bench = SimInit::new();
    let p0 = bench.add_platform("p0");
    let actor = bench.add_actor(p0, "one-shot");
    bench.bind_actor(actor, OneShot);

    let mut simu = bench.init(t(1)).unwrap();
    assert_eq!(
        simu.schedule_at(actor, t(0)),
        Err(SchedulingError::InvalidScheduledTime)
    );
    // The start time itself is still schedulable.
    assert!(simu.schedule_at(actor, t(1)).is_ok());
}

#[test]
fn unknown_strategy_name_is_rejected() {
    assert!(SimInit::new().set_strategy_name("non-preemptive").is_ok());
    assert!(SimInit::new().set_strategy_name("preemptive").is_ok());
    match SimInit::new().set_strategy_name("optimistic") {
        Err(ConfigError::UnknownStrategy(name)) => assert_eq!(name, "optimistic"),
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn misdirected_connection_is_rejected() {
    let mut bench = SimInit::new();
    let p0 = bench.add_platform("p0");
    let source = bench.add_actor(p0, "source");
    let source_out = bench.add_output(source, "out");
    bench.bind_actor(source, OneShot);
    let sink = bench.add_actor(p0, "sink");
    let sink_in = bench.add_input(sink, "in");
    bench.bind_actor(sink, OneShot);

    // Swapped endpoints.
    bench.connect(sink_in, source_out, Duration::ZERO);
    match bench.init(t(0)) {
        Err(ConfigError::InvalidConnection {
            source,
            destination,
        }) => {
            assert_eq!(source, "p0.sink.in");
            assert_eq!(destination, "p0.source.out");
        }
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn unbound_actor_is_rejected() {
    let mut bench = SimInit::new();
    let p0 = bench.add_platform("p0");
    let _ghost = bench.add_actor(p0, "ghost");

    match bench.init(t(0)) {
        Err(ConfigError::UnboundActor(actor)) => assert_eq!(actor, "p0.ghost"),
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn completion_before_start_is_rejected() {
    let bench = SimInit::new().set_completion_time(t(0));

    match bench.init(t(1)) {
        Err(ConfigError::InvalidCompletionTime(time)) => assert_eq!(time, t(0)),
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn causality_queries_reflect_the_topology() {
    let mut bench = SimInit::new();
    let p0 = bench.add_platform("p0");
    let source = bench.add_actor(p0, "source");
    let source_out = bench.add_output(source, "out");
    bench.bind_actor(source, OneShot);
    let sink = bench.add_actor(p0, "sink");
    let sink_in = bench.add_input(sink, "in");
    let sink_aux = bench.add_input(sink, "aux");
    bench.bind_actor(sink, OneShot);
    bench.connect(source_out, sink_in, Duration::from_secs(3));

    let simu = bench.init(t(0)).unwrap();
    assert_eq!(
        simu.minimum_delay(source_out, sink_in),
        Some(Duration::from_secs(3))
    );
    assert_eq!(simu.minimum_delay(source_out, sink_aux), None);
    assert_eq!(simu.equivalence_class(sink_in), vec![sink_in, sink_aux]);
}
