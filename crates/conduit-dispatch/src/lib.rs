//! Conduit Dispatch — the transactional request pipeline.
//!
//! Every request marked transactional runs inside one storage transaction:
//! the business handler executes, domain events are published in-process
//! until no handler raises another, integration events are appended to the
//! outbox, and the whole unit commits or rolls back together.

pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod outbox;
pub mod publisher;
pub mod transaction;
pub mod unit_of_work;

pub use config::DispatcherConfig;
pub use dispatcher::{DispatchPhase, DispatchReport, Dispatched, TransactionalDispatcher};
pub use handler::RequestHandler;
pub use outbox::{EnvelopeHeaders, OutboxAppender, OutboxEnvelope};
pub use publisher::{DomainEventHandler, DomainEventPublisher};
pub use transaction::{JointTransaction, TransactionHandle};
pub use unit_of_work::UnitOfWork;
