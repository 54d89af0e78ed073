//! Route modules.

pub mod health;
pub mod orders;
pub mod stock;

use serde::Serialize;
use uuid::Uuid;

use conduit_dispatch::DispatchReport;

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The aggregate the command created or changed.
    pub aggregate_id: Uuid,
    /// Domain events published while the command ran.
    pub domain_events_published: usize,
    /// Integration events appended to the outbox.
    pub outbox_rows_appended: usize,
}

impl CommandResponse {
    pub(crate) fn new(aggregate_id: Uuid, report: &DispatchReport) -> Self {
        Self {
            aggregate_id,
            domain_events_published: report.domain_events_published,
            outbox_rows_appended: report.outbox_rows_appended,
        }
    }
}
