//! Request abstractions.

use uuid::Uuid;

/// Trait that every request sent through the dispatcher implements.
pub trait Request: Send + Sync + std::fmt::Debug {
    /// Value returned to the caller on success.
    type Response: Send;

    /// Marks requests that mutate state. Only these run inside a storage
    /// transaction with event draining; every other request bypasses the
    /// transactional pipeline.
    const TRANSACTIONAL: bool = false;

    /// The type name for this request (for logging/routing).
    fn request_type(&self) -> &'static str;

    /// Correlation ID to trace this request through the system.
    fn correlation_id(&self) -> Uuid;
}
