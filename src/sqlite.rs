use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use camino::Utf8Path;
use rusqlite::{Connection, params};

use crate::domain::RelationshipRecord;
use crate::error::IngestError;
use crate::persist::BulkWriter;

pub const DEFAULT_TABLE: &str = "internal_rating_events";

/// SQLite target for the bulk engine. SQLite admits a single writer, so the
/// connection sits behind a mutex; each batch is one transaction.
pub struct SqliteBulkWriter {
    connection: Mutex<Connection>,
    table: String,
    insert_sql: String,
}

impl SqliteBulkWriter {
    pub fn open(path: &Utf8Path, table: &str) -> Result<Self, IngestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                std::fs::create_dir_all(parent.as_std_path())
                    .map_err(|err| IngestError::Filesystem(err.to_string()))?;
            }
        }
        let connection = Connection::open(path.as_std_path())
            .map_err(|err| IngestError::Storage(format!("open {path}: {err}")))?;
        Self::with_connection(connection, table)
    }

    pub fn in_memory(table: &str) -> Result<Self, IngestError> {
        let connection =
            Connection::open_in_memory().map_err(|err| IngestError::Storage(err.to_string()))?;
        Self::with_connection(connection, table)
    }

    fn with_connection(connection: Connection, table: &str) -> Result<Self, IngestError> {
        validate_table_name(table)?;
        connection
            .busy_timeout(Duration::from_secs(30))
            .map_err(|err| IngestError::Storage(err.to_string()))?;
        connection
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    bdr_id TEXT NOT NULL,
                    business_entity TEXT NOT NULL,
                    nature TEXT NOT NULL,
                    status TEXT NOT NULL,
                    golden_bdr_id TEXT,
                    label TEXT
                )"
            ))
            .map_err(|err| IngestError::Storage(err.to_string()))?;

        tracing::debug!("sqlite table {table} ready");
        Ok(Self {
            connection: Mutex::new(connection),
            insert_sql: format!(
                "INSERT INTO {table} (bdr_id, business_entity, nature, status, golden_bdr_id, label)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            table: table.to_string(),
        })
    }

    pub fn row_count(&self) -> Result<usize, IngestError> {
        let guard = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let count: i64 = guard
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
                row.get(0)
            })
            .map_err(|err| IngestError::Storage(err.to_string()))?;
        Ok(count as usize)
    }

    /// All rows in insertion order, as the positional tuple the engine writes.
    pub fn rows(&self) -> Result<Vec<RelationshipRecord>, IngestError> {
        let guard = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let mut statement = guard
            .prepare(&format!(
                "SELECT bdr_id, business_entity, nature, status, golden_bdr_id, label
                 FROM {} ORDER BY id",
                self.table
            ))
            .map_err(|err| IngestError::Storage(err.to_string()))?;
        let rows = statement
            .query_map([], |row| {
                Ok(RelationshipRecord {
                    bdr_id: row.get(0)?,
                    business_entity: row.get(1)?,
                    nature: row.get(2)?,
                    status: row.get(3)?,
                    golden_bdr_id: row.get(4)?,
                    label: row.get(5)?,
                })
            })
            .map_err(|err| IngestError::Storage(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| IngestError::Storage(err.to_string()))
    }
}

impl BulkWriter for SqliteBulkWriter {
    fn write_batch(&self, rows: &[RelationshipRecord]) -> Result<usize, IngestError> {
        let mut guard = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard
            .transaction()
            .map_err(|err| IngestError::Storage(err.to_string()))?;
        let mut affected = 0usize;
        {
            let mut statement = tx
                .prepare_cached(&self.insert_sql)
                .map_err(|err| IngestError::Storage(err.to_string()))?;
            for row in rows {
                affected += statement
                    .execute(params![
                        row.bdr_id,
                        row.business_entity,
                        row.nature,
                        row.status,
                        row.golden_bdr_id,
                        row.label,
                    ])
                    .map_err(|err| IngestError::Storage(err.to_string()))?;
            }
        }
        tx.commit()
            .map_err(|err| IngestError::Storage(err.to_string()))?;
        Ok(affected)
    }
}

pub(crate) fn validate_table_name(table: &str) -> Result<(), IngestError> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        None => false,
    };
    if !valid {
        return Err(IngestError::InvalidConfig(format!(
            "invalid table name: {table}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_injected_table_name() {
        assert!(SqliteBulkWriter::in_memory("events; DROP TABLE x").is_err());
        assert!(SqliteBulkWriter::in_memory("").is_err());
        assert!(SqliteBulkWriter::in_memory("_events_2024").is_ok());
    }

    #[test]
    fn batch_round_trips_positional_fields() {
        let writer = SqliteBulkWriter::in_memory(DEFAULT_TABLE).unwrap();
        let rows = vec![
            RelationshipRecord::new("A1", "BE1", "parent", "active")
                .with_reason(Some("G1".to_string()), Some("merge".to_string())),
            RelationshipRecord::new("A2", "BE2", "child", "inactive"),
        ];
        assert_eq!(writer.write_batch(&rows).unwrap(), 2);
        assert_eq!(writer.row_count().unwrap(), 2);
        assert_eq!(writer.rows().unwrap(), rows);
    }
}
