//! Alliance DB - persistence for providers, clients, and the directory cache
//!
//! PostgreSQL repositories via sqlx, the AES-256-GCM secret cipher, and
//! in-memory repository implementations used by tests and single-node
//! evaluation deployments.

pub mod crypto;
pub mod memory;
pub mod pool;
pub mod repositories;

pub use crypto::AesGcmSecretCipher;
pub use memory::{
    MemoryClientRepository, MemoryDirectoryRepository, MemoryProviderRepository, MemoryStore,
};
pub use pool::{create_pool, run_migrations, DatabaseConfig};
pub use repositories::{PgClientRepository, PgDirectoryRepository, PgProviderRepository};
