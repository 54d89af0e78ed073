//! Conduit Store PG — PostgreSQL implementations of the storage seams.
//!
//! Aggregates are stored as JSONB snapshots with an optimistic version
//! column; outbox rows live next to them so both commit in one transaction.
//! Shared tenants get their own schema in the default database. Lock keys
//! live in a table every replica sees, so the distributed lock works across
//! processes.

pub mod directory;
pub mod factory;
pub mod lock;
pub mod schema;
pub mod storage;

pub use directory::PgTenantDirectory;
pub use factory::PgConnectionFactory;
pub use lock::PgLockCache;
pub use storage::{PgStorage, PgTransaction};
