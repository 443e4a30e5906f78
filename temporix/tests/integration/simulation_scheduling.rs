//! Scheduling behavior of the platform execution engines.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use temporix::actor::{Actor, Context};
use temporix::observer::{NoticeKind, ScheduleNotice, ScheduleObserver};
use temporix::ports::{ActorId, PortId};
use temporix::simulation::{RunOutcome, SimInit, StrategyKind};
use temporix::time::MonotonicTime;

fn t(secs: u64) -> MonotonicTime {
    MonotonicTime::EPOCH + Duration::from_secs(secs)
}

/// Journals every schedule notice it receives.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<(NoticeKind, ActorId, MonotonicTime, MonotonicTime)>>>);

impl ScheduleObserver for Recorder {
    fn notice(&self, notice: &ScheduleNotice) {
        self.0.lock().unwrap().push((
            notice.kind,
            notice.actor,
            notice.model_time,
            notice.physical_time,
        ));
    }
}

/// An actor that does nothing but occupy its platform.
struct Busy {
    wcet: Duration,
    priority: i32,
}

impl Actor for Busy {
    fn fire_start(&mut self, _: &mut Context) -> bool {
        true
    }

    fn wcet(&self) -> Duration {
        self.wcet
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[test]
fn non_preemptive_platform_is_occupied_for_the_wcet() {
    let recorder = Recorder::default();
    let mut bench = SimInit::new().attach_observer(recorder.clone());
    let p0 = bench.add_platform("p0");
    let worker = bench.add_actor(p0, "worker");
    bench.bind_actor(
        worker,
        Busy {
            wcet: Duration::from_secs(10),
            priority: 0,
        },
    );
    let other = bench.add_actor(p0, "other");
    bench.bind_actor(
        other,
        Busy {
            wcet: Duration::ZERO,
            priority: 0,
        },
    );

    let mut simu = bench.init(t(0)).unwrap();
    simu.schedule_at(worker, t(0)).unwrap();
    simu.schedule_at(worker, t(1)).unwrap();
    simu.schedule_at(other, t(5)).unwrap();
    assert_eq!(simu.run().unwrap(), RunOutcome::Completed);

    // The platform stays occupied for the full WCET of each firing; the
    // pending events, though safe, wait for the terminal phase.
    let journal = recorder.0.lock().unwrap();
    let expected = [
        (NoticeKind::ExecutionStart, worker, t(0), t(0)),
        (NoticeKind::ExecutionStop, worker, t(0), t(10)),
        (NoticeKind::ExecutionStart, worker, t(1), t(10)),
        (NoticeKind::ExecutionStop, worker, t(1), t(20)),
        (NoticeKind::ExecutionStart, other, t(5), t(20)),
        (NoticeKind::ExecutionStop, other, t(5), t(20)),
    ];
    assert_eq!(*journal, expected);
}

#[test]
fn preemption_pushes_back_the_running_firing() {
    let recorder = Recorder::default();
    let mut bench = SimInit::new()
        .set_strategy(StrategyKind::Preemptive)
        .attach_observer(recorder.clone());
    let p0 = bench.add_platform("p0");
    let low = bench.add_actor(p0, "low");
    bench.bind_actor(
        low,
        Busy {
            wcet: Duration::from_secs(8),
            priority: 0,
        },
    );
    let high = bench.add_actor(p0, "high");
    bench.bind_actor(
        high,
        Busy {
            wcet: Duration::from_secs(5),
            priority: 10,
        },
    );

    let mut simu = bench.init(t(0)).unwrap();
    simu.schedule_at(low, t(0)).unwrap();
    simu.schedule_at(high, t(2)).unwrap();
    assert_eq!(simu.run().unwrap(), RunOutcome::Completed);

    // The dominant firing runs first and the preempted one finishes later
    // by the newcomer's WCET: 2 + 5 = 7 and 8 + 5 = 13.
    let journal = recorder.0.lock().unwrap();
    let expected = [
        (NoticeKind::ExecutionStart, low, t(0), t(0)),
        (NoticeKind::ExecutionStart, high, t(2), t(2)),
        (NoticeKind::ExecutionStop, high, t(2), t(7)),
        (NoticeKind::ExecutionStop, low, t(0), t(13)),
    ];
    assert_eq!(*journal, expected);
}

/// Emits `count` tokens carrying 0..count on each firing.
struct Burst {
    output: PortId,
    count: u64,
}

impl Actor for Burst {
    fn fire_start(&mut self, ctx: &mut Context) -> bool {
        for value in 0..self.count {
            ctx.send(self.output, Box::new(value));
        }
        true
    }
}

/// Journals the model time and value of every received token.
struct Sink {
    input: PortId,
    log: Arc<Mutex<Vec<(MonotonicTime, u64)>>>,
}

impl Actor for Sink {
    fn fire_start(&mut self, ctx: &mut Context) -> bool {
        let time = ctx.time();
        while let Some(token) = ctx.take_input(self.input) {
            let value = *token.into_any().downcast::<u64>().unwrap();
            self.log.lock().unwrap().push((time, value));
        }
        true
    }
}

#[test]
fn cross_platform_delivery_preserves_class_order() {
    let recorder = Recorder::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut bench = SimInit::new().attach_observer(recorder.clone());

    let p0 = bench.add_platform("p0");
    let burst = bench.add_actor(p0, "burst");
    let burst_out = bench.add_output(burst, "out");
    bench.bind_actor(
        burst,
        Burst {
            output: burst_out,
            count: 3,
        },
    );

    let p1 = bench.add_platform("p1");
    let sink = bench.add_actor(p1, "sink");
    let sink_in = bench.add_input(sink, "in");
    bench.bind_actor(
        sink,
        Sink {
            input: sink_in,
            log: log.clone(),
        },
    );

    bench.connect(burst_out, sink_in, Duration::from_secs(1));

    let mut simu = bench.init(t(0)).unwrap();
    simu.schedule_at(burst, t(1)).unwrap();
    simu.schedule_at(burst, t(2)).unwrap();
    assert_eq!(simu.run().unwrap(), RunOutcome::Completed);

    // Non-decreasing timestamps, FIFO within equal timestamps.
    let log = log.lock().unwrap();
    let expected = [
        (t(2), 0),
        (t(2), 1),
        (t(2), 2),
        (t(3), 0),
        (t(3), 1),
        (t(3), 2),
    ];
    assert_eq!(*log, expected);

    // Every delivered token was exposed exactly once, and every firing that
    // started also terminated.
    let journal = recorder.0.lock().unwrap();
    let count = |kind: NoticeKind| journal.iter().filter(|notice| notice.0 == kind).count();
    assert_eq!(count(NoticeKind::TransferOutput), 6);
    assert_eq!(count(NoticeKind::TransferInput), 6);
    assert_eq!(
        count(NoticeKind::ExecutionStart),
        count(NoticeKind::ExecutionStop)
    );
}

/// A sensor-like actor whose firings are pinned to the physical clock.
struct Probe;

impl Actor for Probe {
    fn fire_start(&mut self, _: &mut Context) -> bool {
        true
    }

    fn real_time(&self) -> bool {
        true
    }
}

#[test]
fn real_time_actor_fires_at_its_model_time() {
    let recorder = Recorder::default();
    let mut bench = SimInit::new().attach_observer(recorder.clone());
    let p0 = bench.add_platform("p0");
    let probe = bench.add_actor(p0, "probe");
    bench.bind_actor(probe, Probe);
    // A second platform with unrelated activity, so the clock has other
    // advances to make.
    let p1 = bench.add_platform("p1");
    let other = bench.add_actor(p1, "other");
    bench.bind_actor(
        other,
        Busy {
            wcet: Duration::from_millis(300),
            priority: 0,
        },
    );

    let mut simu = bench.init(t(0)).unwrap();
    simu.schedule_at(probe, t(1)).unwrap();
    simu.schedule_at(probe, t(2)).unwrap();
    simu.schedule_at(other, t(0)).unwrap();
    assert_eq!(simu.run().unwrap(), RunOutcome::Completed);

    let journal = recorder.0.lock().unwrap();
    for (kind, actor, model_time, physical_time) in journal.iter() {
        if *actor == probe && *kind == NoticeKind::ExecutionStart {
            assert_eq!(model_time, physical_time);
        }
    }
    assert!(journal
        .iter()
        .any(|notice| notice.1 == probe && notice.0 == NoticeKind::ExecutionStart));
}
