//! The transactional dispatcher.

use std::fmt;
use std::sync::Arc;

use conduit_core::clock::{Clock, RandomTokenSource, SystemClock, TokenSource};
use conduit_core::error::DomainError;
use conduit_core::outbox::OutboxBroker;
use conduit_core::request::Request;
use conduit_core::scope::RequestScope;
use conduit_core::storage::StorageEngine;
use tracing::{debug, error, info, instrument, warn};

use crate::config::DispatcherConfig;
use crate::handler::RequestHandler;
use crate::outbox::OutboxAppender;
use crate::publisher::DomainEventPublisher;
use crate::transaction::{JointTransaction, TransactionHandle};
use crate::unit_of_work::UnitOfWork;

/// Stages a transactional request moves through.
///
/// `Idle → TransactionOpen → BusinessExecuted → DomainEventsDrained →
/// IntegrationEventsAppended → Committed`, or `→ RolledBack` from any stage
/// after the transaction opened; `Disposed` always comes last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Idle,
    TransactionOpen,
    BusinessExecuted,
    DomainEventsDrained,
    IntegrationEventsAppended,
    Committed,
    RolledBack,
    Disposed,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::TransactionOpen => "transaction_open",
            Self::BusinessExecuted => "business_executed",
            Self::DomainEventsDrained => "domain_events_drained",
            Self::IntegrationEventsAppended => "integration_events_appended",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// What the pipeline did for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Whether the request ran inside a transaction.
    pub transactional: bool,
    /// Domain drain passes that found events.
    pub domain_passes: usize,
    /// Domain events published.
    pub domain_events_published: usize,
    /// Integration drain passes that found events.
    pub integration_passes: usize,
    /// Outbox rows appended.
    pub outbox_rows_appended: usize,
    /// Outbox rows handed to the broker after commit.
    pub outbox_rows_handed_over: usize,
}

/// A response together with the pipeline report.
#[derive(Debug)]
pub struct Dispatched<T> {
    /// The handler's response.
    pub response: T,
    /// What the pipeline did.
    pub report: DispatchReport,
}

/// Wraps request handlers in a storage transaction with event draining.
pub struct TransactionalDispatcher {
    storage: Arc<dyn StorageEngine>,
    publisher: Arc<DomainEventPublisher>,
    broker: Option<Arc<dyn OutboxBroker>>,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenSource>,
    config: DispatcherConfig,
}

impl fmt::Debug for TransactionalDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalDispatcher")
            .field("storage", &self.storage.describe())
            .field("publisher", &self.publisher)
            .field("broker", &self.broker.as_ref().map(|b| b.version().to_owned()))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TransactionalDispatcher {
    /// Creates a dispatcher over the default storage `storage`.
    ///
    /// Without a broker, integration events are not appended.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageEngine>, publisher: Arc<DomainEventPublisher>) -> Self {
        Self {
            storage,
            publisher,
            broker: None,
            clock: Arc::new(SystemClock),
            tokens: Arc::new(RandomTokenSource::default()),
            config: DispatcherConfig::default(),
        }
    }

    /// Attaches the broker that takes over committed outbox rows.
    #[must_use]
    pub fn with_broker(mut self, broker: Arc<dyn OutboxBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Replaces the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the source of generated root trace ids.
    #[must_use]
    pub fn with_tokens(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Replaces the default configuration.
    #[must_use]
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// The dispatcher's clock.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Sends `request` to `handler`.
    ///
    /// Transactional requests run in a transaction on the scope's storage
    /// target (or the default storage); everything else runs against
    /// committed state with writes rejected.
    ///
    /// # Errors
    ///
    /// A business-rule violation is returned unchanged, an optimistic
    /// concurrency conflict becomes `DomainError::StaleData`, and any other
    /// error is logged and returned unchanged. Nothing the request wrote is
    /// visible after an error.
    #[instrument(
        skip_all,
        fields(
            request_type = request.request_type(),
            correlation_id = %request.correlation_id(),
            tenant_id = scope.tenant_id().unwrap_or("-"),
        )
    )]
    pub async fn send<R, H>(
        &self,
        request: &R,
        handler: &H,
        scope: &mut RequestScope,
    ) -> Result<Dispatched<R::Response>, DomainError>
    where
        R: Request,
        H: RequestHandler<R> + ?Sized,
    {
        let storage = self.target_storage(scope);

        if !R::TRANSACTIONAL {
            let mut uow = UnitOfWork::read_only(scope, storage, Arc::clone(&self.clock));
            let response = handler.handle(request, &mut uow).await?;
            return Ok(Dispatched {
                response,
                report: DispatchReport::default(),
            });
        }

        debug!(phase = %DispatchPhase::Idle, storage = %storage.describe());
        let tx = match storage.begin().await {
            Ok(tx) => tx,
            Err(err) => return Err(self.normalize(err, request.request_type())),
        };
        let handle = match &self.broker {
            Some(broker) => TransactionHandle::Joint(JointTransaction::new(tx, Arc::clone(broker))),
            None => TransactionHandle::Plain(tx),
        };
        debug!(phase = %DispatchPhase::TransactionOpen);

        let mut uow = UnitOfWork::transactional(scope, storage, handle, Arc::clone(&self.clock));
        let outcome = self.run(request, handler, &mut uow).await;
        let Some(tx) = uow.into_transaction() else {
            return Err(DomainError::Infrastructure(
                "transaction vanished before commit".into(),
            ));
        };

        let result = match outcome {
            Ok((response, mut report)) => match tx.commit().await {
                Ok(handed_over) => {
                    report.outbox_rows_handed_over = handed_over;
                    info!(
                        phase = %DispatchPhase::Committed,
                        domain_passes = report.domain_passes,
                        integration_passes = report.integration_passes,
                        outbox_rows = report.outbox_rows_appended,
                        "request committed"
                    );
                    Ok(Dispatched { response, report })
                }
                Err(err) => {
                    scope.events_mut().clear();
                    debug!(phase = %DispatchPhase::RolledBack, "commit failed");
                    Err(self.normalize(err, request.request_type()))
                }
            },
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err.detail(), "rollback failed");
                }
                scope.events_mut().clear();
                debug!(phase = %DispatchPhase::RolledBack);
                Err(self.normalize(err, request.request_type()))
            }
        };
        debug!(phase = %DispatchPhase::Disposed);
        result
    }

    fn target_storage(&self, scope: &RequestScope) -> Arc<dyn StorageEngine> {
        scope
            .target()
            .map_or_else(|| Arc::clone(&self.storage), |target| Arc::clone(&target.storage))
    }

    async fn run<R, H>(
        &self,
        request: &R,
        handler: &H,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<(R::Response, DispatchReport), DomainError>
    where
        R: Request,
        H: RequestHandler<R> + ?Sized,
    {
        let response = handler.handle(request, uow).await?;
        debug!(phase = %DispatchPhase::BusinessExecuted);

        let mut report = DispatchReport {
            transactional: true,
            ..DispatchReport::default()
        };
        self.drain_domain_events(uow, &mut report).await?;
        debug!(phase = %DispatchPhase::DomainEventsDrained, passes = report.domain_passes);
        self.drain_integration_events(uow, &mut report).await?;
        debug!(phase = %DispatchPhase::IntegrationEventsAppended, passes = report.integration_passes);

        Ok((response, report))
    }

    /// Publishes staged domain events until a pass finds none.
    async fn drain_domain_events(
        &self,
        uow: &mut UnitOfWork<'_>,
        report: &mut DispatchReport,
    ) -> Result<(), DomainError> {
        loop {
            let batch = uow.scope_mut().events_mut().drain_domain_events();
            if batch.is_empty() {
                return Ok(());
            }
            if report.domain_passes >= self.config.max_drain_passes {
                return Err(DomainError::Infrastructure(format!(
                    "domain events still cascading after {} passes",
                    report.domain_passes
                )));
            }
            report.domain_passes += 1;
            debug!(pass = report.domain_passes, events = batch.len(), "publishing domain events");

            for event in &batch {
                for handler in self.publisher.handlers_for(&event.event_type) {
                    handler.handle(event, uow).await?;
                }
                report.domain_events_published += 1;
            }
        }
    }

    /// Appends staged integration events to the outbox until a pass finds none.
    async fn drain_integration_events(
        &self,
        uow: &mut UnitOfWork<'_>,
        report: &mut DispatchReport,
    ) -> Result<(), DomainError> {
        let Some(version) = self.broker.as_ref().map(|b| b.version().to_owned()) else {
            let dropped = uow.scope_mut().events_mut().drain_integration_events().len();
            if dropped > 0 {
                warn!(dropped, "no outbox broker configured; integration events not appended");
            }
            return Ok(());
        };
        let appender = OutboxAppender::new(version);

        loop {
            let batch = uow.scope_mut().events_mut().drain_integration_events();
            if batch.is_empty() {
                return Ok(());
            }
            if report.integration_passes >= self.config.max_drain_passes {
                return Err(DomainError::Infrastructure(format!(
                    "integration events still cascading after {} passes",
                    report.integration_passes
                )));
            }
            report.integration_passes += 1;

            let now = uow.now();
            let scope = uow.scope_mut();
            let tenant_id = scope.tenant_id().map(str::to_owned);
            let app_id = scope.app_id().map(str::to_owned);
            let trace_id = scope
                .root_trace_id_or_insert_with(|| self.tokens.next_token())
                .to_owned();

            for mut event in batch {
                event.tenant_id = tenant_id.clone().or(event.tenant_id);
                event.app_id = app_id.clone().or(event.app_id);
                event.root_trace_id = Some(trace_id.clone());

                let Some(joint) = uow.transaction_mut().and_then(TransactionHandle::joint) else {
                    return Err(DomainError::Infrastructure(
                        "outbox append requires a joint transaction".into(),
                    ));
                };
                let row = appender.append(joint, &event, now).await?;
                debug!(msg_name = %row.name, status = %row.status, "outbox row appended");
                report.outbox_rows_appended += 1;
            }
        }
    }

    fn normalize(&self, err: DomainError, request_type: &str) -> DomainError {
        match err {
            err if err.is_business_rule() => {
                info!(request_type, error = %err, "request rejected by business rule");
                err
            }
            DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => {
                warn!(request_type, %aggregate_id, expected, actual, "optimistic concurrency conflict");
                DomainError::StaleData { aggregate_id }
            }
            other => {
                error!(
                    request_type,
                    storage = %self.storage.describe(),
                    error = %other.detail(),
                    "request failed"
                );
                other
            }
        }
    }
}
