//! Example: closed-loop process control over a network link.
//!
//! This example demonstrates in particular:
//!
//! * multi-platform assembly with cross-platform connections,
//! * priority-driven preemption of a long-running firing,
//! * actors that schedule their own periodic firings.
//!
//! ```text
//! ┌─────────────────────┐            ┌──────────────────────┐
//! │ plant               │            │ control              │
//! │  ┌────────┐         │    meas    │  ┌────────────┐      │
//! │  │ Sensor ├─────────┼───────────►│  │ Controller │      │
//! │  └────────┘         │   (20 ms)  │  └─────┬──────┘      │
//! │  ┌──────────┐       │            │        │ cmd         │
//! │  │ Actuator │◄──────┼────────────┼────────┘             │
//! │  └──────────┘       │   (20 ms)  │  ┌───────┐           │
//! │                     │            │  │ Audit │           │
//! └─────────────────────┘            │  └───────┘           │
//!                                    └──────────────────────┘
//! ```

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use temporix::actor::{Actor, Context};
use temporix::ports::PortId;
use temporix::simulation::{RunOutcome, SimInit, StrategyKind};
use temporix::time::{ModelTime, MonotonicTime};

/// Periodically samples the plant state.
struct Sensor {
    /// Measurement -- output port.
    meas: PortId,
    /// Sampling period.
    period: Duration,
    /// Sample counter -- internal state.
    count: u64,
}

impl Actor for Sensor {
    fn fire_start(&mut self, ctx: &mut Context) -> bool {
        ctx.send(self.meas, Box::new(self.count));
        self.count += 1;
        ctx.schedule_at(self.period).unwrap();

        true
    }

    fn wcet(&self) -> Duration {
        Duration::from_millis(1)
    }
}

/// Computes a command from each measurement.
struct Controller {
    /// Measurement -- input port.
    meas: PortId,
    /// Command -- output port.
    cmd: PortId,
}

impl Actor for Controller {
    fn fire_start(&mut self, ctx: &mut Context) -> bool {
        while let Some(token) = ctx.take_input(self.meas) {
            let reading = *token.into_any().downcast::<u64>().unwrap();
            ctx.send(self.cmd, Box::new(reading * 2));
        }

        true
    }

    fn wcet(&self) -> Duration {
        Duration::from_millis(5)
    }

    fn priority(&self) -> i32 {
        10
    }
}

/// Applies received commands.
struct Actuator {
    /// Command -- input port.
    cmd: PortId,
    /// Journal of applied commands.
    log: Arc<Mutex<Vec<(ModelTime, u64)>>>,
}

impl Actor for Actuator {
    fn fire_start(&mut self, ctx: &mut Context) -> bool {
        let time = ctx.time();
        while let Some(token) = ctx.take_input(self.cmd) {
            let command = *token.into_any().downcast::<u64>().unwrap();
            self.log.lock().unwrap().push((time, command));
        }

        true
    }
}

/// Periodic low-priority bookkeeping, preempted by the controller whenever
/// their firings overlap.
struct Audit {
    period: Duration,
}

impl Actor for Audit {
    fn fire_start(&mut self, ctx: &mut Context) -> bool {
        ctx.schedule_at(self.period).unwrap();

        true
    }

    fn wcet(&self) -> Duration {
        Duration::from_millis(30)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // ---------------
    // Bench assembly.
    // ---------------

    let t0 = MonotonicTime::EPOCH;
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut bench = SimInit::new()
        .set_strategy(StrategyKind::Preemptive)
        .set_clock_sync_error(Duration::from_millis(1))
        .set_network_delay(Duration::from_millis(4))
        .set_completion_time(t0 + Duration::from_millis(500));

    // The plant platform samples the process and applies commands.
    let plant = bench.add_platform("plant");
    let sensor = bench.add_actor(plant, "sensor");
    let meas_out = bench.add_output(sensor, "meas");
    bench.bind_actor(
        sensor,
        Sensor {
            meas: meas_out,
            period: Duration::from_millis(100),
            count: 0,
        },
    );
    let actuator = bench.add_actor(plant, "actuator");
    let cmd_in = bench.add_input(actuator, "cmd");
    bench.bind_actor(
        actuator,
        Actuator {
            cmd: cmd_in,
            log: log.clone(),
        },
    );

    // The control platform hosts the controller and a background task.
    let control = bench.add_platform("control");
    let controller = bench.add_actor(control, "controller");
    let meas_in = bench.add_input(controller, "meas");
    let cmd_out = bench.add_output(controller, "cmd");
    bench.bind_actor(
        controller,
        Controller {
            meas: meas_in,
            cmd: cmd_out,
        },
    );
    let audit = bench.add_actor(control, "audit");
    bench.bind_actor(
        audit,
        Audit {
            period: Duration::from_millis(100),
        },
    );

    // Network links.
    bench.connect(meas_out, meas_in, Duration::from_millis(20));
    bench.connect(cmd_out, cmd_in, Duration::from_millis(20));

    let mut simu = bench.init(t0)?;
    simu.schedule_at(sensor, t0)?;
    simu.schedule_at(audit, t0)?;

    // -----------
    // Simulation.
    // -----------

    assert_eq!(simu.run()?, RunOutcome::Completed);
    assert_eq!(simu.time(), t0 + Duration::from_millis(500));

    // Each sample crosses the network (20 ms), clears the safe-to-process
    // allowance (5 ms), is turned into a command within the controller's
    // WCET (5 ms) and crosses back: the commands for the samples taken at
    // 0..=400 ms are applied in order, stamped 40 ms after their sample.
    let log = log.lock().unwrap();
    let expected: Vec<(MonotonicTime, u64)> = (0..5u64)
        .map(|k| (t0 + Duration::from_millis(k * 100 + 40), k * 2))
        .collect();
    assert_eq!(*log, expected);

    Ok(())
}
