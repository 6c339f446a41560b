//! Append-only activity log written alongside every asset mutation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::database::repo::{self, Result};
use crate::database::schema::ACTIVITY_LOG;

pub const ACTION_UPLOAD: &str = "upload_product_image";
pub const ACTION_DELETE: &str = "delete_product_image";
pub const ACTION_UPDATE: &str = "update_product_image";
pub const ACTION_SET_PRIMARY: &str = "set_primary_image";

/// The signed-in user performing an operation, supplied by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub name: String,
}

impl Actor {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub id: i64,
    pub actor_id: Option<i64>,
    pub actor_name: Option<String>,
    pub action: String,
    pub table_name: String,
    pub record_id: Option<i64>,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            actor_id: row.get(1)?,
            actor_name: row.get(2)?,
            action: row.get(3)?,
            table_name: row.get(4)?,
            record_id: row.get(5)?,
            old_values: row.get(6)?,
            new_values: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

/// Appends one entry. An anonymous caller (`actor == None`) leaves the actor
/// columns null.
pub fn record<Old, New>(
    conn: &Connection,
    actor: Option<&Actor>,
    action: &str,
    table_name: &str,
    record_id: i64,
    old: Option<&Old>,
    new: Option<&New>,
) -> Result<i64>
where
    Old: Serialize,
    New: Serialize,
{
    let old_values = old.map(serde_json::to_string).transpose()?;
    let new_values = new.map(serde_json::to_string).transpose()?;
    let actor_id = actor.map(|a| a.id);
    let actor_name = actor.map(|a| a.name.as_str());

    repo::insert(
        conn,
        ACTIVITY_LOG,
        &[
            ("actor_id", &actor_id),
            ("actor_name", &actor_name),
            ("action", &action),
            ("table_name", &table_name),
            ("record_id", &record_id),
            ("old_values", &old_values),
            ("new_values", &new_values),
            ("created_at", &Utc::now()),
        ],
    )
}

pub fn for_record(conn: &Connection, table_name: &str, record_id: i64) -> Result<Vec<AuditRecord>> {
    repo::fetch_all(
        conn,
        &format!(
            "SELECT id, actor_id, actor_name, action, table_name, record_id, old_values, new_values, created_at
             FROM {ACTIVITY_LOG} WHERE table_name = ?1 AND record_id = ?2 ORDER BY id ASC"
        ),
        params![table_name, record_id],
        AuditRecord::from_row,
    )
}

pub fn count(conn: &Connection) -> Result<i64> {
    repo::fetch_one(
        conn,
        &format!("SELECT COUNT(*) FROM {ACTIVITY_LOG}"),
        &[],
        |row| row.get(0),
    )
    .map(|n| n.unwrap_or(0))
}
