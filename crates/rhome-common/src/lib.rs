//! ---
//! rhome_section: "01-core-functionality"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Shared configuration and logging for rhome services."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
//! Shared primitives for rhome services: configuration loading and
//! tracing setup.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, DispatchConfig, LoadedAppConfig, LoggingConfig, ScheduleConfig, ScheduleWindow,
    ServiceConfig,
};
pub use logging::{init_tracing, LogFormat};
