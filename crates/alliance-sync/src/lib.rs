//! Alliance Sync - directory reconciliation
//!
//! Reconciles the local `ExternalUser`/`ExternalGroup` cache against each
//! provider's directory listing, and applies login-driven incremental
//! upserts and explicit link/unlink operations.

pub mod engine;


pub use engine::ReconciliationEngine;
