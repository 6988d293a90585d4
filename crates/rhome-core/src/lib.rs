//! ---
//! rhome_section: "01-core-functionality"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Dispatch loop, handlers and schedule lookup."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
//! Schedule service internals: the cooperative dispatch loop, per-type
//! message handlers and the schedule lookup they consult.

pub mod dispatch;
pub mod handlers;
pub mod schedule;

pub use dispatch::{CycleReport, DispatchError, DispatchMetrics, DispatchSettings, Dispatcher};
pub use handlers::{build_heartbeats, handle_get_device_scheduled_state, handle_heartbeat};
pub use schedule::{OracleError, ScheduleOracle, StaticSchedule};
