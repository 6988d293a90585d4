//! ---
//! rhome_section: "01-core-functionality"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Dispatch loop, handlers and schedule lookup."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
use std::fmt;

use chrono::{Datelike, Local, NaiveDateTime, Weekday};
use indexmap::IndexMap;
use rhome_common::config::{ScheduleConfig, ScheduleWindow};

/// Failure to answer a schedule lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// No schedule is configured for the named device.
    #[error("device `{0}` has no schedule")]
    UnknownDevice(String),
    /// The schedule source could not be consulted.
    #[error("schedule backend unavailable: {0}")]
    Unavailable(String),
}

/// Answers whether a named device should be powered right now.
pub trait ScheduleOracle: Send + Sync {
    /// `true` when `device` is inside one of its scheduled windows.
    fn is_on(&self, device: &str) -> Result<bool, OracleError>;
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Schedule built from the `[schedule.devices]` configuration table.
pub struct StaticSchedule {
    devices: IndexMap<String, Vec<ScheduleWindow>>,
    clock: Clock,
}

impl StaticSchedule {
    /// Schedule evaluated against local wall-clock time.
    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self {
            devices: config.devices.clone(),
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the clock used by [`ScheduleOracle::is_on`].
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Device names in configuration order.
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Scheduled state of `device` at a given local time.
    pub fn state_at(&self, device: &str, at: NaiveDateTime) -> Result<bool, OracleError> {
        let windows = self
            .devices
            .get(device)
            .ok_or_else(|| OracleError::UnknownDevice(device.to_owned()))?;
        Ok(windows.iter().any(|window| window_contains(window, at)))
    }
}

impl ScheduleOracle for StaticSchedule {
    fn is_on(&self, device: &str) -> Result<bool, OracleError> {
        self.state_at(device, (self.clock)())
    }
}

impl fmt::Debug for StaticSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSchedule")
            .field("devices", &self.devices)
            .finish_non_exhaustive()
    }
}

fn runs_on(window: &ScheduleWindow, day: Weekday) -> bool {
    window.days.is_empty() || window.days.contains(&day)
}

fn window_contains(window: &ScheduleWindow, at: NaiveDateTime) -> bool {
    let day = at.weekday();
    let time = at.time();
    if window.on < window.off {
        runs_on(window, day) && window.on <= time && time < window.off
    } else {
        // wraps midnight; the early-morning part belongs to the previous day's window
        (runs_on(window, day) && time >= window.on)
            || (runs_on(window, day.pred()) && time < window.off)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    // 2024-01-01 was a Monday.
    fn monday_at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .expect("valid date")
            .and_time(time(h, m))
    }

    fn schedule() -> StaticSchedule {
        let mut config = ScheduleConfig::default();
        config.devices.insert(
            "coffee_maker".into(),
            vec![ScheduleWindow {
                days: vec![Weekday::Mon, Weekday::Tue],
                on: time(6, 0),
                off: time(7, 0),
            }],
        );
        config.devices.insert(
            "porch_light".into(),
            vec![ScheduleWindow {
                days: vec![Weekday::Sun],
                on: time(20, 0),
                off: time(2, 0),
            }],
        );
        StaticSchedule::from_config(&config)
    }

    #[test]
    fn window_is_half_open() {
        let schedule = schedule();
        assert_eq!(schedule.state_at("coffee_maker", monday_at(5, 59)), Ok(false));
        assert_eq!(schedule.state_at("coffee_maker", monday_at(6, 0)), Ok(true));
        assert_eq!(schedule.state_at("coffee_maker", monday_at(7, 0)), Ok(false));
    }

    #[test]
    fn day_filter_applies() {
        let schedule = schedule();
        let wednesday = monday_at(6, 30) + chrono::Duration::days(2);
        assert_eq!(schedule.state_at("coffee_maker", wednesday), Ok(false));
    }

    #[test]
    fn overnight_window_belongs_to_start_day() {
        let schedule = schedule();
        // Sunday 20:00 -> Monday 02:00
        assert_eq!(schedule.state_at("porch_light", monday_at(1, 30)), Ok(true));
        assert_eq!(schedule.state_at("porch_light", monday_at(2, 0)), Ok(false));
        assert_eq!(schedule.state_at("porch_light", monday_at(21, 0)), Ok(false));
        let sunday_night = monday_at(21, 0) - chrono::Duration::days(1);
        assert_eq!(schedule.state_at("porch_light", sunday_night), Ok(true));
    }

    #[test]
    fn unknown_device_is_an_error() {
        assert_eq!(
            schedule().state_at("garage_heater", monday_at(12, 0)),
            Err(OracleError::UnknownDevice("garage_heater".into()))
        );
    }

    #[test]
    fn is_on_uses_injected_clock() {
        let schedule = schedule().with_clock(|| monday_at(6, 45));
        assert_eq!(schedule.is_on("coffee_maker"), Ok(true));
        assert_eq!(
            schedule.devices().collect::<Vec<_>>(),
            vec!["coffee_maker", "porch_light"]
        );
    }
}
