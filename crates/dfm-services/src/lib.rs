//! Process, Scheduler, and Execute: the three worker services that carry a `Job`
//! from HTTP ingress through to completion. Each is a standalone binary under
//! `src/bin/`; this crate holds the logic those binaries wire up.

pub mod auth;
pub mod config;
pub mod discovery;
pub mod error;
pub mod execute;
pub mod process;
pub mod scheduler;

pub use config::{AuthConfig, ExecuteConfig, ProcessConfig, RedisSettings, SchedulerConfig};
pub use error::ApiError;
pub use execute::{ExecuteEngine, Node, NodeHandle};
pub use scheduler::Scheduler;
