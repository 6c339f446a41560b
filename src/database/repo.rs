use std::path::Path;
use std::time::Duration;

use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use thiserror::Error;
use tracing::{debug, error};

use crate::database::schema::SCHEMA;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("statement failed ({sql}): {source}")]
    Statement {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("invalid SQL identifier: {0:?}")]
    Identifier(String),

    #[error("failed to serialize row snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Owns the single SQLite connection used by the asset components.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StorageError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::Open {
            path: ":memory:".to_string(),
            source,
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|source| statement_error("PRAGMA busy_timeout", &[], source))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|source| statement_error("PRAGMA foreign_keys", &[], source))?;
        conn.execute_batch(SCHEMA)
            .map_err(|source| statement_error("schema", &[], source))?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begins an IMMEDIATE transaction: the write lock is taken up front, so a
    /// second writer waits and then reads the state the first one committed.
    /// Dropping the returned value without `commit` rolls back.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|source| statement_error("BEGIN IMMEDIATE", &[], source))
    }
}

pub fn commit(tx: Transaction<'_>) -> Result<()> {
    tx.commit()
        .map_err(|source| statement_error("COMMIT", &[], source))
}

pub fn rollback(tx: Transaction<'_>) -> Result<()> {
    tx.rollback()
        .map_err(|source| statement_error("ROLLBACK", &[], source))
}

/// Fetches at most one row. No match is `Ok(None)`.
pub fn fetch_one<T, F>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
    map: F,
) -> Result<Option<T>>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(sql, params, map)
        .optional()
        .map_err(|source| statement_error(sql, params, source))
}

/// Fetches exactly one row. No match is a `Statement` error carrying
/// `QueryReturnedNoRows`.
pub fn fetch_row<T, F>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
    map: F,
) -> Result<T>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(sql, params, map)
        .map_err(|source| statement_error(sql, params, source))
}

pub fn fetch_all<T, F>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
    map: F,
) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let run = || -> rusqlite::Result<Vec<T>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        rows.collect()
    };
    run().map_err(|source| statement_error(sql, params, source))
}

/// Inserts one row built from `(column, value)` pairs and returns its rowid.
pub fn insert(conn: &Connection, table: &str, columns: &[(&str, &dyn ToSql)]) -> Result<i64> {
    check_identifier(table)?;
    let mut names = Vec::with_capacity(columns.len());
    let mut values: Vec<&dyn ToSql> = Vec::with_capacity(columns.len());
    for (name, value) in columns {
        check_identifier(name)?;
        names.push(*name);
        values.push(*value);
    }
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    );
    execute(conn, &sql, &values)?;
    Ok(conn.last_insert_rowid())
}

/// Updates rows matching `filter`. Placeholders in `filter` are numbered after
/// the SET values, e.g. `update(conn, "t", &[("a", &1)], "id = ?2", &[&id])`.
pub fn update(
    conn: &Connection,
    table: &str,
    columns: &[(&str, &dyn ToSql)],
    filter: &str,
    filter_params: &[&dyn ToSql],
) -> Result<usize> {
    check_identifier(table)?;
    let mut sets = Vec::with_capacity(columns.len());
    let mut values: Vec<&dyn ToSql> = Vec::with_capacity(columns.len() + filter_params.len());
    for (i, (name, value)) in columns.iter().enumerate() {
        check_identifier(name)?;
        sets.push(format!("{name} = ?{}", i + 1));
        values.push(*value);
    }
    values.extend_from_slice(filter_params);
    let sql = format!("UPDATE {table} SET {} WHERE {filter}", sets.join(", "));
    execute(conn, &sql, &values)
}

pub fn delete(
    conn: &Connection,
    table: &str,
    filter: &str,
    filter_params: &[&dyn ToSql],
) -> Result<usize> {
    check_identifier(table)?;
    let sql = format!("DELETE FROM {table} WHERE {filter}");
    execute(conn, &sql, filter_params)
}

pub fn execute(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
    debug!(sql, "execute");
    conn.execute(sql, params)
        .map_err(|source| statement_error(sql, params, source))
}

fn statement_error(sql: &str, params: &[&dyn ToSql], source: rusqlite::Error) -> StorageError {
    let rendered: Vec<String> = params
        .iter()
        .map(|p| match p.to_sql() {
            Ok(value) => format!("{value:?}"),
            Err(_) => "<unrenderable>".to_string(),
        })
        .collect();
    error!(sql, params = ?rendered, error = %source, "statement failed");
    StorageError::Statement {
        sql: sql.to_string(),
        source,
    }
}

fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::Identifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn scratch() -> Result<Database> {
        let db = Database::open_in_memory()?;
        execute(
            db.conn(),
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL, pinned INTEGER NOT NULL DEFAULT 0)",
            &[],
        )?;
        Ok(db)
    }

    #[test]
    fn test_insert_update_delete_roundtrip() -> Result<()> {
        let db = scratch()?;
        let conn = db.conn();

        let id = insert(conn, "notes", &[("body", &"first"), ("pinned", &1)])?;
        assert_eq!(id, 1);

        let changed = update(conn, "notes", &[("body", &"edited")], "id = ?2", &[&id])?;
        assert_eq!(changed, 1);

        let body = fetch_one(conn, "SELECT body FROM notes WHERE id = ?1", params![id], |r| {
            r.get::<_, String>(0)
        })?;
        assert_eq!(body.as_deref(), Some("edited"));

        assert_eq!(delete(conn, "notes", "id = ?1", &[&id])?, 1);
        assert_eq!(delete(conn, "notes", "id = ?1", &[&id])?, 0);

        let missing = fetch_one(conn, "SELECT body FROM notes WHERE id = ?1", params![id], |r| {
            r.get::<_, String>(0)
        })?;
        assert!(missing.is_none());
        Ok(())
    }

    #[test]
    fn test_fetch_all_preserves_order() -> Result<()> {
        let db = scratch()?;
        for body in ["a", "b", "c"] {
            insert(db.conn(), "notes", &[("body", &body)])?;
        }
        let bodies = fetch_all(db.conn(), "SELECT body FROM notes ORDER BY id DESC", &[], |r| {
            r.get::<_, String>(0)
        })?;
        assert_eq!(bodies, vec!["c", "b", "a"]);
        Ok(())
    }

    #[test]
    fn test_identifiers_are_rejected() -> Result<()> {
        let db = scratch()?;
        let err = insert(db.conn(), "notes; DROP TABLE notes", &[("body", &"x")]).unwrap_err();
        assert!(matches!(err, StorageError::Identifier(_)));

        let err = update(db.conn(), "notes", &[("body = 1 --", &"x")], "1 = 1", &[]).unwrap_err();
        assert!(matches!(err, StorageError::Identifier(_)));
        Ok(())
    }

    #[test]
    fn test_dropped_transaction_rolls_back() -> Result<()> {
        let mut db = scratch()?;
        {
            let tx = db.transaction()?;
            insert(&tx, "notes", &[("body", &"never")])?;
        }
        let count = fetch_one(db.conn(), "SELECT COUNT(*) FROM notes", &[], |r| {
            r.get::<_, i64>(0)
        })?;
        assert_eq!(count, Some(0));

        let tx = db.transaction()?;
        insert(&tx, "notes", &[("body", &"kept")])?;
        commit(tx)?;
        let count = fetch_one(db.conn(), "SELECT COUNT(*) FROM notes", &[], |r| {
            r.get::<_, i64>(0)
        })?;
        assert_eq!(count, Some(1));
        Ok(())
    }

    #[test]
    fn test_statement_error_keeps_sql() -> Result<()> {
        let db = scratch()?;
        let err = execute(db.conn(), "INSERT INTO missing_table VALUES (?1)", &[&1]).unwrap_err();
        match err {
            StorageError::Statement { sql, .. } => assert!(sql.contains("missing_table")),
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn test_fetch_row_reports_missing_row() -> Result<()> {
        let db = scratch()?;
        let sql = "SELECT body FROM notes WHERE id = ?1";
        let err = fetch_row(db.conn(), sql, params![404], |r| r.get::<_, String>(0)).unwrap_err();
        match err {
            StorageError::Statement { sql: failed, source } => {
                assert_eq!(failed, sql);
                assert!(matches!(source, rusqlite::Error::QueryReturnedNoRows));
            }
            other => panic!("unexpected error: {other}"),
        }

        let id = insert(db.conn(), "notes", &[("body", &"here")])?;
        let body = fetch_row(db.conn(), sql, params![id], |r| r.get::<_, String>(0))?;
        assert_eq!(body, "here");
        Ok(())
    }

    #[test]
    fn test_failed_reads_keep_sql() -> Result<()> {
        let db = scratch()?;
        let err = fetch_one(db.conn(), "SELECT nope FROM notes WHERE id = ?1", params![1], |r| {
            r.get::<_, i64>(0)
        })
        .unwrap_err();
        assert!(matches!(err, StorageError::Statement { ref sql, .. } if sql.contains("nope")));

        let err = fetch_all(db.conn(), "SELECT body FROM ghosts WHERE id = ?1", params![1], |r| {
            r.get::<_, String>(0)
        })
        .unwrap_err();
        assert!(matches!(err, StorageError::Statement { ref sql, .. } if sql.contains("ghosts")));
        Ok(())
    }
}
