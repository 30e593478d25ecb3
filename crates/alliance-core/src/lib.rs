//! Alliance Core - Domain types and traits for the identity federation engine

pub mod client;
pub mod directory;
pub mod error;
pub mod ids;
pub mod provider;
pub mod traits;

pub use client::*;
pub use directory::*;
pub use error::*;
pub use ids::*;
pub use provider::*;
pub use traits::*;

#[cfg(test)]
mod tests;
