// Public fallible APIs in this crate share one concrete error contract (`AgentError`).
#![allow(
    clippy::missing_errors_doc,
    reason = "crate-wide fallible API uses one explicit error type; per-item boilerplate would duplicate contract"
)]

pub mod agent;
pub mod config;
pub mod delivery;
pub mod detector;
pub mod error;
pub mod host;
pub mod models;
pub mod report;
pub mod sampler;
pub mod transport;
pub mod wire;

pub use agent::{CrashAgent, TickReport};
pub use config::{AgentConfig, DispatchMode};
pub use error::{AgentError, Result};
pub use reqwest::Url;
