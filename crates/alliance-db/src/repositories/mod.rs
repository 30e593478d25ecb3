//! PostgreSQL repository implementations

mod client;
mod directory;
mod provider;

pub use client::PgClientRepository;
pub use directory::PgDirectoryRepository;
pub use provider::PgProviderRepository;
