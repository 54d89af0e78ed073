//! Conduit Tenancy — per-tenant storage routing.
//!
//! The [`TenantConnectionRouter`] resolves a tenant id to a storage engine
//! the first time it is seen and caches the result for the life of the
//! process. Shared tenants reuse the default database under their own
//! namespace; dedicated tenants get an engine of their own.

pub mod connection;
pub mod directory;
pub mod error;
pub mod router;

pub use connection::{ConnectionDescriptor, ConnectionFactory, TenantConnection};
pub use directory::{IsolationLevel, PassthroughDecryptor, SecretDecryptor, TenantDirectory, TenantInfo};
pub use error::TenancyError;
pub use router::{REGISTRATION_RESOURCE, TenantConnectionRouter};
