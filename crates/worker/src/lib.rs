//! Shared worker primitives for the typepad orchestration layer.
//!
//! * [`TaskClass`] tags spawned work for tracing.
//! * [`Debouncer`] collapses bursts of events per subject.
//! * [`RequestScheduler`] keeps at most one request in flight and coalesces
//!   the rest into a single latest-wins slot.

mod class;
pub mod debounce;
pub mod single_flight;
mod spawn;

pub use class::TaskClass;
pub use debounce::Debouncer;
pub use single_flight::{RequestScheduler, ScheduleError, SchedulerPhase};
pub use spawn::{spawn, spawn_named_thread};
