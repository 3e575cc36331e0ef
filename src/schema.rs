//! Destination provisioning.
//!
//! [`ensure`] makes sure the destination table exists with exactly the
//! `(tag varchar, time timestamp, data jsonb)` shape, creating the schema
//! and table when they are missing. Everything runs in one transaction.
//! Creation statements are wrapped in a savepoint so that losing a creation
//! race to another provisioner (duplicate-object error) is absorbed and the
//! table the other side created gets validated instead.

use std::collections::BTreeMap;

use sqlx::{PgConnection, PgPool};
use tracing::{debug, trace};

use crate::destination::Destination;
use crate::error::{Operation, OperationContext, Result, SinkError};

/// Column names and `information_schema.columns.data_type` values every
/// destination table must have, and nothing else.
pub const EXPECTED_COLUMNS: [(&str, &str); 3] = [
    ("tag", "character varying"),
    ("time", "timestamp without time zone"),
    ("data", "jsonb"),
];

const DUPLICATE_SCHEMA: &str = "42P06";
const DUPLICATE_TABLE: &str = "42P07";
// Concurrent CREATEs can also collide on the catalog's unique indexes.
const UNIQUE_VIOLATION: &str = "23505";

/// What [`ensure`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created { schema_created: bool },
    AlreadyPresent,
}

/// Compare an existing table's columns against [`EXPECTED_COLUMNS`].
///
/// `columns` maps column name to its `data_type`. Returns a human-readable
/// reason on mismatch.
pub fn check_shape(columns: &BTreeMap<String, String>) -> Result<(), String> {
    for (name, expected) in EXPECTED_COLUMNS {
        match columns.get(name) {
            None => return Err(format!("missing column {:?}", name)),
            Some(found) if found != expected => {
                return Err(format!(
                    "column {:?} has type {:?}, expected {:?}",
                    name, found, expected
                ))
            }
            Some(_) => {}
        }
    }

    let extra: Vec<&str> = columns
        .keys()
        .map(String::as_str)
        .filter(|name| !EXPECTED_COLUMNS.iter().any(|(expected, _)| expected == name))
        .collect();
    if !extra.is_empty() {
        return Err(format!("unexpected columns {:?}", extra));
    }

    Ok(())
}

/// Ensure `dest` exists with the expected shape.
///
/// A conflicting table yields [`SinkError::ProvisioningConflict`] and the
/// transaction is rolled back, so nothing is created.
pub async fn ensure(pool: &PgPool, dest: &Destination) -> Result<Provisioned> {
    let mut tx = pool.begin().await.during(Operation::Begin)?;

    trace!(schema = dest.schema(), "checking whether schema exists");
    let schema_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
    )
    .bind(dest.schema())
    .fetch_one(&mut *tx)
    .await
    .during(Operation::SchemaCheck)?;

    let outcome = if !schema_exists && create_schema(&mut tx, dest).await? {
        debug!(schema = dest.schema(), "schema created");
        if create_table(&mut tx, dest).await? {
            Provisioned::Created { schema_created: true }
        } else {
            verify_columns(&mut tx, dest).await?;
            Provisioned::AlreadyPresent
        }
    } else {
        trace!(schema = dest.schema(), "schema exists, skipping creation");
        provision_table(&mut tx, dest).await?
    };

    tx.commit().await.during(Operation::Commit)?;
    Ok(outcome)
}

async fn provision_table(conn: &mut PgConnection, dest: &Destination) -> Result<Provisioned> {
    let schemas: Vec<String> = sqlx::query_scalar(
        "SELECT table_schema::text FROM information_schema.tables WHERE table_name = $1",
    )
    .bind(dest.table())
    .fetch_all(&mut *conn)
    .await
    .during(Operation::TableCheck)?;

    trace!(table = dest.table(), found_in = ?schemas, "table lookup");

    if !schemas.iter().any(|s| s == dest.schema()) && create_table(conn, dest).await? {
        return Ok(Provisioned::Created { schema_created: false });
    }

    verify_columns(conn, dest).await?;
    debug!(destination = %dest, "table exists with expected shape, skipping creation");
    Ok(Provisioned::AlreadyPresent)
}

async fn verify_columns(conn: &mut PgConnection, dest: &Destination) -> Result<()> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT column_name::text, data_type::text FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2",
    )
    .bind(dest.schema())
    .bind(dest.table())
    .fetch_all(&mut *conn)
    .await
    .during(Operation::ColumnCheck)?;

    let columns: BTreeMap<String, String> = rows.into_iter().collect();
    check_shape(&columns).map_err(|reason| SinkError::ProvisioningConflict {
        destination: dest.to_string(),
        reason,
    })
}

/// Returns `false` when another session created the schema first.
async fn create_schema(conn: &mut PgConnection, dest: &Destination) -> Result<bool> {
    create_object(conn, &dest.create_schema_sql(), Operation::CreateSchema, DUPLICATE_SCHEMA).await
}

/// Returns `false` when another session created the table first.
async fn create_table(conn: &mut PgConnection, dest: &Destination) -> Result<bool> {
    let created =
        create_object(conn, &dest.create_table_sql(), Operation::CreateTable, DUPLICATE_TABLE).await?;
    if created {
        debug!(destination = %dest, "table created");
    }
    Ok(created)
}

async fn create_object(conn: &mut PgConnection, ddl: &str, op: Operation, duplicate_code: &str) -> Result<bool> {
    sqlx::query("SAVEPOINT pgsink_create")
        .execute(&mut *conn)
        .await
        .during(op)?;

    match sqlx::query(ddl).execute(&mut *conn).await {
        Ok(_) => {
            sqlx::query("RELEASE SAVEPOINT pgsink_create")
                .execute(&mut *conn)
                .await
                .during(op)?;
            Ok(true)
        }
        Err(e) if is_duplicate(&e, duplicate_code) => {
            debug!(%op, "object already created by a concurrent provisioner");
            sqlx::query("ROLLBACK TO SAVEPOINT pgsink_create")
                .execute(&mut *conn)
                .await
                .during(op)?;
            Ok(false)
        }
        Err(e) => Err(SinkError::Transport { op, source: e }),
    }
}

fn is_duplicate(err: &sqlx::Error, duplicate_code: &str) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map_or(false, |code| code == duplicate_code || code == UNIQUE_VIOLATION)
}
