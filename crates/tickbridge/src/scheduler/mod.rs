//! Cooperative scheduling bridge between the network loop and the host.
//!
//! The async runtime never runs on its own thread. Every bit of network
//! progress and every payload execution happens inside
//! [`TickHandle::drive_one_iteration`], called either from a recurring host
//! timer ([`InteractiveDriver`]) or from a bounded pump loop
//! ([`HeadlessDriver`]).

mod driver;
mod event_loop;
mod state;

pub use self::driver::{
    HeadlessDriver, HostTimers, InteractiveDriver, PumpReport, TickDriver, TickHandle,
    TickOutcome, TimerCallback, select_driver,
};
pub(crate) use self::event_loop::EventLoop;
pub use self::state::{AdapterState, OperatingMode};

const SCHEDULER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::scheduler");
