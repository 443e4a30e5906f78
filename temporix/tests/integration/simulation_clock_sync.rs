//! Pacing of the physical clock by a wall clock.

use std::time::{Duration, Instant};

use temporix::actor::{Actor, Context};
use temporix::simulation::{RunOutcome, SimInit};
use temporix::time::{AutoSystemClock, MonotonicTime};

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

#[test]
fn system_clock_paces_the_run() {
    let t0 = MonotonicTime::EPOCH;
    let mut bench = SimInit::new()
        .set_clock(AutoSystemClock::new())
        .set_completion_time(t0 + Duration::from_millis(200));
    let p0 = bench.add_platform("p0");
    let pulse = bench.add_actor(p0, "pulse");
    bench.bind_actor(
        pulse,
        Pulse {
            period: Duration::from_millis(50),
        },
    );

    let mut simu = bench.init(t0).unwrap();
    simu.schedule_at(pulse, t0).unwrap();

    // The clock reference is set on the first advance (t0+50ms), so the
    // remaining three advances are paced by the wall clock.
    let start = Instant::now();
    assert_eq!(simu.run().unwrap(), RunOutcome::Completed);
    let elapsed = start.elapsed();

    assert!(
        elapsed >= Duration::from_millis(140),
        "run completed in {elapsed:?}, expected at least 140ms of wall-clock pacing",
    );
    assert!(elapsed < Duration::from_secs(5));
}
