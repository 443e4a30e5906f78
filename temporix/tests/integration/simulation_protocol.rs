//! Arrival-deadline enforcement on network interfaces.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use temporix::actor::{Actor, Context};
use temporix::ports::PortId;
use temporix::simulation::{ExecutionError, RunOutcome, SimInit};
use temporix::time::MonotonicTime;

fn t(secs: u64) -> MonotonicTime {
    MonotonicTime::EPOCH + Duration::from_secs(secs)
}

/// Occupies its platform for 6 s per firing.
struct Blocker;

impl Actor for Blocker {
    fn fire_start(&mut self, _: &mut Context) -> bool {
        true
    }

    fn wcet(&self) -> Duration {
        Duration::from_secs(6)
    }
}

/// Emits one token per firing.
struct Sender {
    output: PortId,
}

impl Actor for Sender {
    fn fire_start(&mut self, ctx: &mut Context) -> bool {
        ctx.send(self.output, Box::new(0u64));
        true
    }
}

/// Counts received tokens.
struct Receiver {
    received: Arc<Mutex<usize>>,
}

impl Actor for Receiver {
    fn fire_start(&mut self, ctx: &mut Context) -> bool {
        *self.received.lock().unwrap() += ctx.take_inputs().len();
        true
    }
}

/// A producer platform whose sender is scheduled at t=4 s but, with the
/// platform occupied until t=6 s, only fires then; its token reaches the
/// consumer platform with the given connection delay.
fn late_sender_bench(
    delay: Duration,
) -> (SimInit, temporix::ports::ActorId, temporix::ports::ActorId, Arc<Mutex<usize>>) {
    let mut bench = SimInit::new();

    let producer = bench.add_platform("producer");
    let blocker = bench.add_actor(producer, "blocker");
    bench.bind_actor(blocker, Blocker);
    let sender = bench.add_actor(producer, "sender");
    let sender_out = bench.add_output(sender, "out");
    bench.bind_actor(sender, Sender { output: sender_out });

    let consumer = bench.add_platform("consumer");
    let receiver = bench.add_actor(consumer, "receiver");
    let receiver_in = bench.add_input(receiver, "in");
    let received = Arc::new(Mutex::new(0));
    bench.bind_actor(
        receiver,
        Receiver {
            received: received.clone(),
        },
    );

    bench.connect(sender_out, receiver_in, delay);

    (bench, blocker, sender, received)
}

#[test]
fn late_token_is_a_protocol_violation() {
    let (bench, blocker, sender, received) = late_sender_bench(Duration::ZERO);

    let mut simu = bench.init(t(0)).unwrap();
    simu.schedule_at(blocker, t(0)).unwrap();
    simu.schedule_at(sender, t(4)).unwrap();

    // The token carries timestamp 4 s but only arrives at physical time
    // 6 s, far beyond the 200 ms of combined allowances.
    match simu.run() {
        Err(ExecutionError::ProtocolViolation {
            port,
            event_time,
            physical_time,
        }) => {
            assert_eq!(port, "consumer.receiver.in");
            assert_eq!(event_time, t(4));
            assert_eq!(physical_time, t(6));
        }
        other => panic!("expected a protocol violation, got {other:?}"),
    }
    assert_eq!(*received.lock().unwrap(), 0);
}

#[test]
fn connection_delay_masks_the_late_firing() {
    // With a 2 s connection delay the token carries timestamp 6 s and
    // arrives exactly on time.
    let (bench, blocker, sender, received) = late_sender_bench(Duration::from_secs(2));

    let mut simu = bench.init(t(0)).unwrap();
    simu.schedule_at(blocker, t(0)).unwrap();
    simu.schedule_at(sender, t(4)).unwrap();

    assert_eq!(simu.run().unwrap(), RunOutcome::Completed);
    assert_eq!(*received.lock().unwrap(), 1);
}
