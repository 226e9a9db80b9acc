//! Liveness/readiness HTTP endpoints for the outpost front-end suite
//! (spec §6 ambient interface). Reports the shared emergency lockdown
//! flag alongside per-daemon bind status so an orchestrator can stop
//! routing traffic to a process that has locked itself down.

mod checker;
mod config;
mod error;
mod server;

pub use checker::{HealthChecker, HealthStatus};
pub use config::HealthConfig;
pub use error::HealthError;
pub use server::HealthServer;
