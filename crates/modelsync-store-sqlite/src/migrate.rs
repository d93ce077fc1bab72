use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use modelsync_core::{ModelSchema, IDENTITY_COLUMN};

use crate::error::{StoreError, StoreResult};

const CREATE_SCHEMA_VERSIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS modelsync_schema_versions (
  table_name TEXT PRIMARY KEY,
  version INTEGER NOT NULL CHECK (version >= 1),
  applied_at TEXT NOT NULL
);
";

/// Stored versus declared version of one model table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub table_name: String,
    /// Zero when the table does not exist yet.
    pub current_version: u32,
    pub target_version: u32,
    pub pending_versions: Vec<u32>,
    /// The table exists but no version was ever recorded for it.
    pub inferred_from_legacy: bool,
}

pub(crate) fn schema_status(conn: &Connection, schema: &ModelSchema) -> StoreResult<SchemaStatus> {
    conn.execute_batch(CREATE_SCHEMA_VERSIONS_SQL)?;
    let (current_version, inferred_from_legacy) = detect_table_version(conn, schema.table_name())?;
    let target_version = schema.version();
    let pending_versions = if current_version < target_version {
        ((current_version + 1)..=target_version).collect()
    } else {
        Vec::new()
    };

    Ok(SchemaStatus {
        table_name: schema.table_name().to_string(),
        current_version,
        target_version,
        pending_versions,
        inferred_from_legacy,
    })
}

/// Bring the model table up to the declared version inside one transaction.
pub(crate) fn migrate(conn: &mut Connection, schema: &ModelSchema) -> StoreResult<()> {
    let table = schema.table_name();
    let target = schema.version();

    let tx = conn.transaction()?;
    tx.execute_batch(CREATE_SCHEMA_VERSIONS_SQL)?;
    let (current, inferred) = detect_table_version(&tx, table)?;

    if current == 0 {
        create_table(&tx, schema)?;
        record_table_version(&tx, table, target)?;
    } else if current > target {
        return Err(StoreError::Migration(format!(
            "table {table} is at version {current}, newer than declared version {target}"
        )));
    } else if current < target {
        if schema.retain_data_on_upgrade() {
            for version in (current + 1)..=target {
                for field in schema.fields_introduced_in(version) {
                    if table_has_column(&tx, table, field.name())? {
                        continue;
                    }
                    let ddl = format!(
                        "ALTER TABLE {table} ADD COLUMN {} {}",
                        field.name(),
                        field.kind().sql_type()
                    );
                    tracing::debug!("{}", ddl);
                    tx.execute_batch(&ddl)?;
                }
            }
        } else {
            tracing::debug!("Dropping table {} for destructive upgrade", table);
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
            create_table(&tx, schema)?;
        }
        record_table_version(&tx, table, target)?;
        tracing::info!("Migrated table {} from version {} to {}", table, current, target);
    } else if inferred {
        record_table_version(&tx, table, target)?;
    }

    tx.commit()?;
    Ok(())
}

pub(crate) fn drop_table(conn: &Connection, schema: &ModelSchema) -> StoreResult<()> {
    conn.execute_batch(CREATE_SCHEMA_VERSIONS_SQL)?;
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", schema.table_name()))?;
    conn.execute(
        "DELETE FROM modelsync_schema_versions WHERE table_name = ?1",
        params![schema.table_name()],
    )?;
    Ok(())
}

pub(crate) fn create_table_sql(schema: &ModelSchema) -> String {
    let mut columns = vec![format!("{IDENTITY_COLUMN} integer primary key autoincrement")];
    columns.extend(
        schema
            .fields()
            .iter()
            .filter(|field| !field.is_identity())
            .map(|field| format!("{} {}", field.name(), field.kind().sql_type())),
    );
    format!("CREATE TABLE IF NOT EXISTS {} ({})", schema.table_name(), columns.join(", "))
}

fn create_table(conn: &Connection, schema: &ModelSchema) -> StoreResult<()> {
    let ddl = create_table_sql(schema);
    tracing::debug!("{}", ddl);
    conn.execute_batch(&ddl)?;
    Ok(())
}

fn detect_table_version(conn: &Connection, table: &str) -> StoreResult<(u32, bool)> {
    if !table_exists(conn, table)? {
        return Ok((0, false));
    }

    match recorded_table_version(conn, table)? {
        Some(version) => Ok((version, false)),
        None => Ok((1, true)),
    }
}

fn recorded_table_version(conn: &Connection, table: &str) -> StoreResult<Option<u32>> {
    let version = conn
        .query_row(
            "SELECT version FROM modelsync_schema_versions WHERE table_name = ?1",
            params![table],
            |row| row.get::<_, u32>(0),
        )
        .optional()?;
    Ok(version)
}

fn record_table_version(conn: &Connection, table: &str, version: u32) -> StoreResult<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR REPLACE INTO modelsync_schema_versions(table_name, version, applied_at)
         VALUES (?1, ?2, ?3)",
        params![table, version, now],
    )?;
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    if !table_exists(conn, table)? {
        return Ok(false);
    }

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }

    Ok(false)
}

fn now_rfc3339() -> StoreResult<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| StoreError::Migration(format!("failed to format RFC3339 timestamp: {err}")))
}
