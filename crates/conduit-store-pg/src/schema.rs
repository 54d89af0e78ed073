//! Database schema.
//!
//! The same statements live in `migrations/` for the default schema; shared
//! tenant schemas are provisioned at runtime with [`provision_statements`].

/// Table holding aggregate snapshots.
pub const AGGREGATES_TABLE: &str = "aggregates";

/// Table holding outbox rows.
pub const OUTBOX_TABLE: &str = "outbox_messages";

/// Table holding the tenant directory.
pub const TENANTS_TABLE: &str = "tenants";

/// Table holding distributed lock keys.
pub const LOCKS_TABLE: &str = "distributed_locks";

/// SQL to create the aggregates table in `schema`.
#[must_use]
pub fn create_aggregates_table(schema: &str) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {schema}.{AGGREGATES_TABLE} (
    aggregate_type  VARCHAR(255) NOT NULL,
    id              UUID NOT NULL,
    version         BIGINT NOT NULL,
    state           JSONB NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (aggregate_type, id)
)"
    )
}

/// SQL to create the outbox table in `schema`.
#[must_use]
pub fn create_outbox_table(schema: &str) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {schema}.{OUTBOX_TABLE} (
    id           UUID PRIMARY KEY,
    name         VARCHAR(400) NOT NULL,
    content      JSONB NOT NULL,
    retries      INTEGER NOT NULL DEFAULT 0,
    added        TIMESTAMPTZ NOT NULL,
    expires_at   TIMESTAMPTZ NULL,
    status_name  VARCHAR(40) NOT NULL,
    version      VARCHAR(20) NOT NULL
)"
    )
}

/// SQL to index the outbox table for the retry scan.
#[must_use]
pub fn create_outbox_retry_index(schema: &str) -> String {
    format!(
        r"
CREATE INDEX IF NOT EXISTS idx_{OUTBOX_TABLE}_retry
    ON {schema}.{OUTBOX_TABLE} (version, status_name, added)"
    )
}

/// Statements creating a tenant schema and its tables, in order.
#[must_use]
pub fn provision_statements(schema: &str) -> Vec<String> {
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {schema}"),
        create_aggregates_table(schema),
        create_outbox_table(schema),
        create_outbox_retry_index(schema),
    ]
}

/// Quotes `name` as a PostgreSQL identifier.
///
/// Only ASCII letters, digits, `_` and `-` are accepted; anything else
/// returns `None`.
#[must_use]
pub fn quote_ident(name: &str) -> Option<String> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then(|| format!("\"{name}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_accepts_tenant_codes() {
        assert_eq!(quote_ident("acme-eu_1").as_deref(), Some("\"acme-eu_1\""));
    }

    #[test]
    fn test_quote_ident_rejects_injection() {
        assert_eq!(quote_ident("acme\"; DROP TABLE tenants; --"), None);
        assert_eq!(quote_ident(""), None);
        assert_eq!(quote_ident(&"x".repeat(64)), None);
    }

    #[test]
    fn test_provisioning_targets_the_schema() {
        let statements = provision_statements("\"acme\"");

        assert_eq!(statements.len(), 4);
        assert!(statements[0].contains("CREATE SCHEMA IF NOT EXISTS \"acme\""));
        assert!(statements[1].contains("\"acme\".aggregates"));
        assert!(statements[2].contains("\"acme\".outbox_messages"));
    }
}
