//! Application layer for the Orders context.

pub mod command_handlers;
pub mod event_handlers;
pub mod query_handlers;

pub use event_handlers::register_event_handlers;
