//! Schedule-event notifications.
//!
//! Observers receive a notification whenever a platform starts or finishes
//! executing an actor, or transfers a token in or out. This is a pure side
//! channel meant for observability tooling such as schedule plotters: it
//! never affects scheduling decisions.
//!
//! Observers are registered with
//! [`SimInit::attach_observer()`](crate::simulation::SimInit::attach_observer)
//! and are invoked from the platform threads, so implementations must be
//! thread-safe and should return quickly.

use crate::ports::{ActorId, PlatformId, PortId};
use crate::time::{ModelTime, PhysicalTime};

/// A recipient of schedule-event notifications.
pub trait ScheduleObserver: Send + Sync {
    /// Called on every schedule event.
    fn notice(&self, notice: &ScheduleNotice);
}

/// A schedule event.
#[derive(Clone, Debug)]
pub struct ScheduleNotice {
    /// What happened.
    pub kind: NoticeKind,
    /// The platform on which it happened.
    pub platform: PlatformId,
    /// The actor concerned.
    pub actor: ActorId,
    /// The port concerned, for transfer notices.
    pub port: Option<PortId>,
    /// The model time of the event concerned.
    pub model_time: ModelTime,
    /// The physical time at which it happened.
    pub physical_time: PhysicalTime,
}

/// The kind of a schedule event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// An actor's starting firing phase ran.
    ExecutionStart,
    /// An actor's terminal firing phase ran.
    ExecutionStop,
    /// A buffered inbound token was exposed to the scheduler.
    TransferInput,
    /// An output token was delivered to a connected port.
    TransferOutput,
}
