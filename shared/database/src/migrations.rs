use anyhow::{Context, Result};
use sqlx::PgPool;

/// Idempotent schema setup. Each table keeps the full record as JSONB next to
/// the columns used for lookups.
const STATEMENTS: &[(&str, &str)] = &[
    (
        "documents",
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id UUID PRIMARY KEY,
            stage VARCHAR NOT NULL,
            content_hash VARCHAR NOT NULL,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "parties",
        r#"
        CREATE TABLE IF NOT EXISTS parties (
            id UUID PRIMARY KEY,
            legal_name VARCHAR NOT NULL,
            trading_name VARCHAR,
            tax_id VARCHAR,
            duns_number VARCHAR,
            npi VARCHAR,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "locations",
        r#"
        CREATE TABLE IF NOT EXISTS locations (
            id UUID PRIMARY KEY,
            name VARCHAR NOT NULL,
            postal_code VARCHAR,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "contracts",
        r#"
        CREATE TABLE IF NOT EXISTS contracts (
            id UUID PRIMARY KEY,
            contract_number VARCHAR NOT NULL,
            effective_date DATE NOT NULL,
            expiration_date DATE NOT NULL CHECK (expiration_date > effective_date),
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "contract_parties",
        r#"
        CREATE TABLE IF NOT EXISTS contract_parties (
            id UUID PRIMARY KEY,
            contract_id UUID NOT NULL REFERENCES contracts(id),
            party_id UUID NOT NULL REFERENCES parties(id),
            role VARCHAR NOT NULL,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (contract_id, party_id, role)
        )
        "#,
    ),
    (
        "contract_locations",
        r#"
        CREATE TABLE IF NOT EXISTS contract_locations (
            id UUID PRIMARY KEY,
            contract_id UUID NOT NULL REFERENCES contracts(id),
            location_id UUID NOT NULL REFERENCES locations(id),
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (contract_id, location_id)
        )
        "#,
    ),
    (
        "billable_items",
        r#"
        CREATE TABLE IF NOT EXISTS billable_items (
            id UUID PRIMARY KEY,
            contract_id UUID NOT NULL REFERENCES contracts(id),
            item_code VARCHAR NOT NULL,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "pricing_models",
        r#"
        CREATE TABLE IF NOT EXISTS pricing_models (
            id UUID PRIMARY KEY,
            contract_id UUID NOT NULL REFERENCES contracts(id),
            billable_item_id UUID REFERENCES billable_items(id),
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "invoices",
        r#"
        CREATE TABLE IF NOT EXISTS invoices (
            id UUID PRIMARY KEY,
            invoice_number VARCHAR NOT NULL,
            vendor_party_id UUID NOT NULL REFERENCES parties(id),
            current_status VARCHAR NOT NULL,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "invoice_line_items",
        r#"
        CREATE TABLE IF NOT EXISTS invoice_line_items (
            id UUID PRIMARY KEY,
            invoice_id UUID NOT NULL REFERENCES invoices(id),
            line_number INTEGER NOT NULL,
            billable_item_id UUID REFERENCES billable_items(id),
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "invoice_validations",
        r#"
        CREATE TABLE IF NOT EXISTS invoice_validations (
            id UUID PRIMARY KEY,
            invoice_id UUID NOT NULL REFERENCES invoices(id),
            status VARCHAR NOT NULL,
            payload JSONB NOT NULL,
            validated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "validation_exceptions",
        r#"
        CREATE TABLE IF NOT EXISTS validation_exceptions (
            id UUID PRIMARY KEY,
            validation_id UUID NOT NULL REFERENCES invoice_validations(id),
            invoice_id UUID NOT NULL REFERENCES invoices(id),
            severity VARCHAR NOT NULL,
            resolved BOOLEAN NOT NULL DEFAULT FALSE,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "approval_levels",
        r#"
        CREATE TABLE IF NOT EXISTS approval_levels (
            id UUID PRIMARY KEY,
            sequence INTEGER NOT NULL UNIQUE,
            payload JSONB NOT NULL
        )
        "#,
    ),
    (
        "invoice_approval_requests",
        r#"
        CREATE TABLE IF NOT EXISTS invoice_approval_requests (
            id UUID PRIMARY KEY,
            invoice_id UUID NOT NULL REFERENCES invoices(id),
            validation_id UUID NOT NULL REFERENCES invoice_validations(id),
            status VARCHAR NOT NULL,
            required_by TIMESTAMPTZ NOT NULL,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (invoice_id, validation_id)
        )
        "#,
    ),
    (
        "approval_history",
        r#"
        CREATE TABLE IF NOT EXISTS approval_history (
            seq BIGSERIAL PRIMARY KEY,
            id UUID NOT NULL UNIQUE,
            request_id UUID NOT NULL REFERENCES invoice_approval_requests(id),
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_documents_stage ON documents(stage)",
    "CREATE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_parties_legal_name ON parties(lower(legal_name))",
    "CREATE INDEX IF NOT EXISTS idx_parties_tax_id ON parties(lower(tax_id))",
    "CREATE INDEX IF NOT EXISTS idx_parties_duns ON parties(lower(duns_number))",
    "CREATE INDEX IF NOT EXISTS idx_contracts_number ON contracts(lower(contract_number))",
    "CREATE INDEX IF NOT EXISTS idx_contract_parties_party ON contract_parties(party_id)",
    "CREATE INDEX IF NOT EXISTS idx_billable_items_contract ON billable_items(contract_id)",
    "CREATE INDEX IF NOT EXISTS idx_invoices_number ON invoices(lower(invoice_number))",
    "CREATE INDEX IF NOT EXISTS idx_line_items_invoice ON invoice_line_items(invoice_id)",
    "CREATE INDEX IF NOT EXISTS idx_validations_invoice ON invoice_validations(invoice_id)",
    "CREATE INDEX IF NOT EXISTS idx_exceptions_validation ON validation_exceptions(validation_id)",
    "CREATE INDEX IF NOT EXISTS idx_approval_requests_status ON invoice_approval_requests(status, required_by)",
    "CREATE INDEX IF NOT EXISTS idx_approval_history_request ON approval_history(request_id)",
];

pub async fn run_postgres_migrations(pool: &PgPool) -> Result<()> {
    tracing::info!("Running PostgreSQL migrations");

    for (table, statement) in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create table {}", table))?;
    }

    for statement in INDEXES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create index: {}", statement))?;
    }

    tracing::info!(tables = STATEMENTS.len(), "PostgreSQL migrations completed");
    Ok(())
}
