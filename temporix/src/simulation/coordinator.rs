//! Global physical-time coordination.
//!
//! The coordinator owns the physical clock shared by every platform of a
//! simulation. Platforms run freely as long as they have something safe to
//! do; a platform with nothing actionable registers the next physical time
//! at which it wants to be reconsidered and blocks. When every platform is
//! blocked (the *quiescence* condition), the last one to block pops the
//! minimum pending wakeup, synchronizes the configured wall clock, advances
//! the shared clock and releases everyone. Releases are always broadcast:
//! every platform re-evaluates its own state independently after an advance.
//!
//! A single monitor (one mutex and one condition variable) guards the clock,
//! the blocked count and the wakeup set; all reads of the physical time go
//! through it, so no platform can observe a clock value it has not been
//! released to see.
//!
//! Quiescence with no pending wakeup ends the run: as a normal completion
//! when no platform reported pending work, as a reported deadlock otherwise.

use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex, MutexGuard};

use tracing::{debug, error, warn};

use crate::ports::PlatformId;
use crate::time::{Clock, MonotonicTime, PhysicalTime, SyncStatus};

use super::{DeadlockInfo, ExecutionError};

/// Why a run came to an end.
#[derive(Clone, Debug)]
pub(crate) enum Halt {
    /// All events were exhausted or the completion time was reached.
    Completed,
    /// A halt was requested through a [`Halter`](crate::simulation::Halter).
    Halted,
    /// A fatal error was reported by a platform or by the coordinator.
    Fault(ExecutionError),
}

pub(crate) struct Coordinator {
    monitor: Mutex<State>,
    released: Condvar,
    clock: Mutex<Box<dyn Clock>>,
    platform_names: Vec<String>,
    completion_time: MonotonicTime,
}

struct State {
    now: PhysicalTime,
    /// Bumped on every release; lets platforms detect releases and
    /// deliveries that raced with their own evaluation.
    epoch: u64,
    /// Number of platforms currently blocked under the current epoch.
    blocked: usize,
    wakeups: BTreeSet<PhysicalTime>,
    /// Pending-event count per platform, refreshed each time it blocks.
    reports: Vec<usize>,
    halt: Option<Halt>,
}

impl Coordinator {
    pub(crate) fn new(
        platform_names: Vec<String>,
        start: MonotonicTime,
        clock: Box<dyn Clock>,
        completion_time: MonotonicTime,
    ) -> Self {
        let num_platforms = platform_names.len();

        Self {
            monitor: Mutex::new(State {
                now: start,
                epoch: 0,
                blocked: 0,
                wakeups: BTreeSet::new(),
                reports: vec![0; num_platforms],
                halt: None,
            }),
            released: Condvar::new(),
            clock: Mutex::new(clock),
            platform_names,
            completion_time,
        }
    }

    /// The current physical time.
    pub(crate) fn time(&self) -> PhysicalTime {
        self.monitor.lock().unwrap().now
    }

    /// The current release epoch, to be passed back to
    /// [`block_until_advance()`](Self::block_until_advance).
    pub(crate) fn epoch(&self) -> u64 {
        self.monitor.lock().unwrap().epoch
    }

    /// The halt condition, if the run has ended.
    pub(crate) fn halted(&self) -> Option<Halt> {
        self.monitor.lock().unwrap().halt.clone()
    }

    /// Records a future physical time at which some platform wants to be
    /// reconsidered. A no-op if the time is not after the current clock.
    pub(crate) fn schedule_wakeup(&self, time: PhysicalTime) {
        let mut state = self.monitor.lock().unwrap();
        if state.halt.is_none() && time > state.now {
            state.wakeups.insert(time);
        }
    }

    /// Releases every blocked platform without advancing the clock.
    ///
    /// Called after delivering a token to another platform, so the receiver
    /// re-evaluates what it can do at the current physical time.
    pub(crate) fn rouse(&self) {
        let mut state = self.monitor.lock().unwrap();
        if state.halt.is_none() {
            state.epoch += 1;
            state.blocked = 0;
            self.released.notify_all();
        }
    }

    /// Suspends the calling platform thread until the next release.
    ///
    /// `pending_events` is the caller's count of events it still holds in
    /// any buffer; it discriminates completion from deadlock when quiescence
    /// is reached with no pending wakeup. `seen_epoch` must be the epoch
    /// observed before the caller last evaluated its state: if a release
    /// happened since, the call returns immediately so no delivery can be
    /// missed.
    ///
    /// Returns the (possibly unchanged) current physical time when the
    /// thread is released, or the halt condition if the run ended.
    pub(crate) fn block_until_advance(
        &self,
        platform: PlatformId,
        pending_events: usize,
        seen_epoch: u64,
    ) -> Result<PhysicalTime, Halt> {
        let mut state = self.monitor.lock().unwrap();
        if let Some(halt) = &state.halt {
            return Err(halt.clone());
        }
        if state.epoch != seen_epoch {
            return Ok(state.now);
        }
        state.reports[platform.0] = pending_events;
        state.blocked += 1;
        if state.blocked == self.platform_names.len() {
            return self.advance(state);
        }

        let epoch = state.epoch;
        loop {
            state = self.released.wait(state).unwrap();
            if let Some(halt) = &state.halt {
                return Err(halt.clone());
            }
            if state.epoch != epoch {
                return Ok(state.now);
            }
        }
    }

    /// Ends the run on an external halt request.
    pub(crate) fn halt_external(&self) {
        let state = self.monitor.lock().unwrap();
        if state.halt.is_none() {
            debug!("halt requested");
            self.halt_locked(state, Halt::Halted);
        }
    }

    /// Ends the run on a fatal error.
    pub(crate) fn fault(&self, error: ExecutionError) {
        let state = self.monitor.lock().unwrap();
        if state.halt.is_none() {
            self.halt_locked(state, Halt::Fault(error));
        }
    }

    /// Advances the clock to the minimum pending wakeup, called by the last
    /// platform to block.
    fn advance(&self, mut state: MutexGuard<'_, State>) -> Result<PhysicalTime, Halt> {
        let next = match state.wakeups.iter().next().copied() {
            Some(next) => next,
            None => {
                let stalled: Vec<DeadlockInfo> = state
                    .reports
                    .iter()
                    .zip(&self.platform_names)
                    .filter(|(&pending, _)| pending != 0)
                    .map(|(&pending, name)| DeadlockInfo {
                        platform: name.clone(),
                        pending_events: pending,
                    })
                    .collect();
                let halt = if stalled.is_empty() {
                    debug!("all events exhausted, run complete");
                    Halt::Completed
                } else {
                    Halt::Fault(ExecutionError::Deadlock(stalled))
                };

                return Err(self.halt_locked(state, halt));
            }
        };

        if next > self.completion_time {
            debug!(time = %next, "next wakeup lies beyond the completion time");

            return Err(self.halt_locked(state, Halt::Completed));
        }

        state.wakeups.remove(&next);
        drop(state);

        // Synchronizing the wall clock can block for a while. Every other
        // platform is waiting on the condition variable at this point, so
        // only an external halt can race with this section.
        let status = self.clock.lock().unwrap().synchronize(next);
        if let SyncStatus::OutOfSync(lag) = status {
            warn!(?lag, "physical clock lags behind the wall clock");
        }

        let mut state = self.monitor.lock().unwrap();
        if let Some(halt) = &state.halt {
            return Err(halt.clone());
        }
        debug!(time = %next, "advancing physical time");
        state.now = next;
        state.epoch += 1;
        state.blocked = 0;
        self.released.notify_all();

        Ok(next)
    }

    fn halt_locked(&self, mut state: MutexGuard<'_, State>, halt: Halt) -> Halt {
        if let Halt::Fault(error) = &halt {
            error!(%error, "run ended on a fatal condition");
        }
        state.halt = Some(halt.clone());
        state.epoch += 1;
        state.blocked = 0;
        self.released.notify_all();

        halt
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("time", &self.time())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::NoClock;
    use std::time::Duration;

    fn t_ms(millis: u64) -> MonotonicTime {
        MonotonicTime::EPOCH + Duration::from_millis(millis)
    }

    fn coordinator(num_platforms: usize) -> Coordinator {
        let names = (0..num_platforms).map(|i| format!("p{i}")).collect();
        Coordinator::new(
            names,
            MonotonicTime::EPOCH,
            Box::new(NoClock::new()),
            MonotonicTime::MAX,
        )
    }

    #[test]
    fn advances_to_minimum_wakeup() {
        let coordinator = coordinator(3);
        let wakeups = [t_ms(12_000), t_ms(7_500), t_ms(20_000)];

        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for (idx, wakeup) in wakeups.into_iter().enumerate() {
                let coordinator = &coordinator;
                handles.push(scope.spawn(move || {
                    let epoch = coordinator.epoch();
                    coordinator.schedule_wakeup(wakeup);
                    coordinator.block_until_advance(PlatformId(idx), 1, epoch)
                }));
            }
            for handle in handles {
                assert_eq!(handle.join().unwrap().unwrap(), t_ms(7_500));
            }
        });

        assert_eq!(coordinator.time(), t_ms(7_500));
    }

    #[test]
    fn quiescence_without_wakeup_is_completion_or_deadlock() {
        let coordinator = coordinator(1);

        let epoch = coordinator.epoch();
        match coordinator.block_until_advance(PlatformId(0), 0, epoch) {
            Err(Halt::Completed) => {}
            other => panic!("expected completion, got {other:?}"),
        }

        let coordinator = self::coordinator(1);
        let epoch = coordinator.epoch();
        match coordinator.block_until_advance(PlatformId(0), 3, epoch) {
            Err(Halt::Fault(ExecutionError::Deadlock(info))) => {
                assert_eq!(info.len(), 1);
                assert_eq!(info[0].platform, "p0");
                assert_eq!(info[0].pending_events, 3);
            }
            other => panic!("expected a deadlock report, got {other:?}"),
        }
    }

    #[test]
    fn wakeup_beyond_completion_time_completes() {
        let coordinator = Coordinator::new(
            vec!["p0".into()],
            MonotonicTime::EPOCH,
            Box::new(NoClock::new()),
            t_ms(1_000),
        );

        let epoch = coordinator.epoch();
        coordinator.schedule_wakeup(t_ms(2_000));
        match coordinator.block_until_advance(PlatformId(0), 1, epoch) {
            Err(Halt::Completed) => {}
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn missed_release_returns_immediately() {
        let coordinator = coordinator(2);

        // A delivery happening after the epoch was sampled must prevent the
        // platform from going to sleep.
        let epoch = coordinator.epoch();
        coordinator.rouse();
        let released = coordinator
            .block_until_advance(PlatformId(0), 1, epoch)
            .unwrap();
        assert_eq!(released, MonotonicTime::EPOCH);
    }

    #[test]
    fn past_wakeups_are_ignored() {
        let coordinator = coordinator(1);

        coordinator.schedule_wakeup(MonotonicTime::EPOCH);
        let epoch = coordinator.epoch();
        match coordinator.block_until_advance(PlatformId(0), 0, epoch) {
            Err(Halt::Completed) => {}
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn external_halt_unblocks_platforms() {
        let coordinator = coordinator(2);

        std::thread::scope(|scope| {
            let blocked = scope.spawn(|| {
                let epoch = coordinator.epoch();
                coordinator.block_until_advance(PlatformId(0), 0, epoch)
            });
            // Give the platform a chance to block, then halt.
            std::thread::sleep(Duration::from_millis(20));
            coordinator.halt_external();
            match blocked.join().unwrap() {
                Err(Halt::Halted) => {}
                other => panic!("expected a halt, got {other:?}"),
            }
        });
    }
}
