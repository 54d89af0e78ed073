//! Business request handlers.

use async_trait::async_trait;
use conduit_core::error::DomainError;
use conduit_core::request::Request;

use crate::unit_of_work::UnitOfWork;

/// Executes the business logic of one request type.
///
/// Handlers load and save aggregates through the unit of work; events the
/// aggregates raise are staged automatically and drained by the dispatcher.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync {
    /// Handles `request`.
    async fn handle(&self, request: &R, uow: &mut UnitOfWork<'_>) -> Result<R::Response, DomainError>;
}
