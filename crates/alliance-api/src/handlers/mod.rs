//! API request handlers

pub mod health;
pub mod providers;
pub mod users;

pub use health::{health_check, liveness, readiness, service_status};
