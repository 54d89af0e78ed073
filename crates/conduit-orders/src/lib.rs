//! Conduit — Orders and Stock bounded context.
//!
//! Placing an order reserves stock and confirms the order in the same
//! transaction through a cascade of domain events; placement, confirmation
//! and cancellation are announced to other services through the outbox.

pub mod application;
pub mod domain;
