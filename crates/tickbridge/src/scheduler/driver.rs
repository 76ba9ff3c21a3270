//! Tick drivers: the strategies that decide when the scheduler iterates.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{EventLoop, OperatingMode, SCHEDULER_TARGET};

/// Weak handle through which drivers advance the scheduler.
///
/// Holding a handle never keeps a stopped service alive; once the service
/// stops every call reports that the loop is gone.
#[derive(Clone)]
pub struct TickHandle {
    event_loop: Weak<EventLoop>,
}

impl TickHandle {
    pub(crate) fn new(event_loop: &Rc<EventLoop>) -> Self {
        Self {
            event_loop: Rc::downgrade(event_loop),
        }
    }

    /// Runs one scheduler iteration. Returns false once the service stopped.
    pub fn drive_one_iteration(&self) -> bool {
        self.event_loop
            .upgrade()
            .is_some_and(|event_loop| event_loop.drive_one_iteration())
    }

    /// Lets network I/O progress for `duration` without running payloads.
    /// Returns false once the service stopped.
    pub fn idle(&self, duration: Duration) -> bool {
        match self.event_loop.upgrade() {
            Some(event_loop) if !event_loop.is_stopped() => {
                event_loop.idle(duration);
                !event_loop.is_stopped()
            }
            _ => false,
        }
    }

    /// Returns true while the service that issued the handle is running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.event_loop
            .upgrade()
            .is_some_and(|event_loop| !event_loop.is_stopped())
    }
}

impl fmt::Debug for TickHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Summary of a [`TickDriver::pump`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Iterations driven during the call.
    pub iterations: usize,
    /// True when the pump ended because the service stopped.
    pub service_stopped: bool,
}

/// Strategy that advances the scheduler on the host's cadence.
pub trait TickDriver {
    /// Operating mode this driver serves.
    fn mode(&self) -> OperatingMode;

    /// Begins driving the scheduler behind `handle`.
    fn attach(&mut self, handle: TickHandle);

    /// Stops driving the current scheduler. Must be safe to call repeatedly.
    fn detach(&mut self);

    /// Drives the scheduler from the caller's thread for up to `budget`.
    ///
    /// Drivers that are advanced by the host do nothing here.
    fn pump(&mut self, budget: Duration) -> PumpReport {
        let _ = budget;
        PumpReport::default()
    }
}

/// What a recurring host callback asks the host to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Invoke the callback again after the given delay.
    RunAgainAfter(Duration),
    /// Unregister the callback.
    Stop,
}

/// Callback registered with the host timer facility.
pub type TimerCallback = Box<dyn FnMut() -> TickOutcome>;

/// The host's recurring-callback facility.
///
/// The host invokes `callback` on its execution context after `first_delay`,
/// then after each delay the callback returns, until it returns
/// [`TickOutcome::Stop`].
pub trait HostTimers {
    /// Registers a recurring callback.
    fn register(&self, first_delay: Duration, callback: TimerCallback);
}

/// Driver for hosts with a UI loop: iterates from a recurring host timer.
pub struct InteractiveDriver {
    timers: Rc<dyn HostTimers>,
    interval: Duration,
    generation: Rc<Cell<u64>>,
}

impl InteractiveDriver {
    /// Creates a driver that re-arms the host timer every `interval`.
    #[must_use]
    pub fn new(timers: Rc<dyn HostTimers>, interval: Duration) -> Self {
        Self {
            timers,
            interval,
            generation: Rc::new(Cell::new(0)),
        }
    }
}

impl fmt::Debug for InteractiveDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractiveDriver")
            .field("interval", &self.interval)
            .field("generation", &self.generation.get())
            .finish_non_exhaustive()
    }
}

impl TickDriver for InteractiveDriver {
    fn mode(&self) -> OperatingMode {
        OperatingMode::Interactive
    }

    fn attach(&mut self, handle: TickHandle) {
        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);
        let current = Rc::clone(&self.generation);
        let interval = self.interval;
        self.timers.register(
            Duration::ZERO,
            Box::new(move || {
                // A later attach or a detach retires this callback.
                if current.get() != generation {
                    return TickOutcome::Stop;
                }
                if handle.drive_one_iteration() {
                    TickOutcome::RunAgainAfter(interval)
                } else {
                    TickOutcome::Stop
                }
            }),
        );
        debug!(
            target: SCHEDULER_TARGET,
            interval_ms = interval.as_millis(),
            "host timer registered"
        );
    }

    fn detach(&mut self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }
}

/// Driver for hosts without a UI loop: the embedding calls
/// [`pump`](TickDriver::pump) from its own main loop.
#[derive(Debug)]
pub struct HeadlessDriver {
    interval: Duration,
    handle: Option<TickHandle>,
}

impl HeadlessDriver {
    /// Creates a driver that idles the network for `interval` between
    /// iterations.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            handle: None,
        }
    }
}

impl TickDriver for HeadlessDriver {
    fn mode(&self) -> OperatingMode {
        OperatingMode::Headless
    }

    fn attach(&mut self, handle: TickHandle) {
        self.handle = Some(handle);
    }

    fn detach(&mut self) {
        self.handle = None;
    }

    fn pump(&mut self, budget: Duration) -> PumpReport {
        let Some(handle) = self.handle.as_ref() else {
            return PumpReport {
                iterations: 0,
                service_stopped: true,
            };
        };
        let deadline = Instant::now() + budget;
        let mut report = PumpReport::default();
        loop {
            if !handle.drive_one_iteration() {
                report.service_stopped = true;
                break;
            }
            report.iterations += 1;
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if !handle.idle(self.interval.min(deadline - now)) {
                report.service_stopped = true;
                break;
            }
        }
        report
    }
}

/// Picks the driver for `mode`.
///
/// Interactive mode needs the host's timer facility; without one the headless
/// driver is used instead.
#[must_use]
pub fn select_driver(
    mode: OperatingMode,
    timers: Option<Rc<dyn HostTimers>>,
    interval: Duration,
) -> Box<dyn TickDriver> {
    match (mode, timers) {
        (OperatingMode::Interactive, Some(timers)) => {
            Box::new(InteractiveDriver::new(timers, interval))
        }
        (OperatingMode::Interactive, None) => {
            warn!(
                target: SCHEDULER_TARGET,
                "interactive mode requested without host timers; falling back to headless"
            );
            Box::new(HeadlessDriver::new(interval))
        }
        (OperatingMode::Headless, _) => Box::new(HeadlessDriver::new(interval)),
    }
}
