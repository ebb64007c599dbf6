//! Recognition history.

use super::{optional, Database};
use crate::error::StoreResult;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};
use serde::{Deserialize, Serialize};

const COLUMNS: &str = "id, config_id, config_name, image_thumbnail, prompt, result, \
                       tokens_used, duration_ms, created_at";

/// Maximum number of records returned by an export.
pub const EXPORT_LIMIT: u32 = 10_000;

/// One successful recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: i64,
    /// May refer to a configuration that has since been deleted
    pub config_id: i64,
    pub config_name: String,
    /// The submitted image as a data URI
    pub image: Option<String>,
    pub prompt: String,
    pub result: String,
    pub tokens_used: Option<u32>,
    pub duration_ms: Option<u64>,
    pub created_at: String,
}

impl HistoryRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            config_id: row.get(1)?,
            config_name: row.get(2)?,
            image: row.get(3)?,
            prompt: row.get(4)?,
            result: row.get(5)?,
            tokens_used: row.get(6)?,
            duration_ms: row.get::<_, Option<i64>>(7)?.map(|v| v as u64),
            created_at: row.get(8)?,
        })
    }
}

/// Input for recording a recognition.
#[derive(Debug, Clone)]
pub struct NewHistoryRecord {
    pub config_id: i64,
    pub config_name: String,
    pub image: Option<String>,
    pub prompt: String,
    pub result: String,
    pub tokens_used: Option<u32>,
    pub duration_ms: Option<u64>,
}

/// Filters and paging for history listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryQuery {
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    pub config_id: Option<i64>,
    /// Substring matched against prompt or result
    pub keyword: Option<String>,
    /// Inclusive lower bound on `created_at` (`YYYY-MM-DD[ HH:MM:SS]`)
    pub start_date: Option<String>,
    /// Inclusive upper bound on `created_at`
    pub end_date: Option<String>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            config_id: None,
            keyword: None,
            start_date: None,
            end_date: None,
        }
    }
}

impl HistoryQuery {
    /// WHERE clause and its bind values.
    fn filter(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(config_id) = self.config_id {
            clauses.push("config_id = ?");
            values.push(Value::Integer(config_id));
        }
        if let Some(keyword) = self.keyword.as_deref().filter(|k| !k.is_empty()) {
            clauses.push("(prompt LIKE ? ESCAPE '\\' OR result LIKE ? ESCAPE '\\')");
            let pattern = format!("%{}%", escape_like(keyword));
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }
        if let Some(start) = &self.start_date {
            clauses.push("created_at >= ?");
            values.push(Value::Text(start.clone()));
        }
        if let Some(end) = &self.end_date {
            clauses.push("created_at <= ?");
            values.push(Value::Text(end.clone()));
        }

        let sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        (sql, values)
    }
}

/// Match `%`, `_` and the escape character literally in a LIKE pattern.
fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// One page of history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub records: Vec<HistoryRecord>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Operations on the `recognition_history` table.
pub struct HistoryStore<'a> {
    db: &'a Database,
}

impl<'a> HistoryStore<'a> {
    pub(super) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn list(&self, query: &HistoryQuery) -> StoreResult<HistoryPage> {
        let page = query.page.max(1);
        let page_size = query.page_size.max(1);
        let offset = (page - 1) as i64 * page_size as i64;
        let (where_sql, mut values) = query.filter();

        let conn = self.db.lock()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM recognition_history {where_sql}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Value::Integer(page_size as i64));
        values.push(Value::Integer(offset));
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM recognition_history {where_sql}
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), HistoryRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(HistoryPage {
            records,
            total: total as u64,
            page,
            page_size,
        })
    }

    pub fn get(&self, id: i64) -> StoreResult<Option<HistoryRecord>> {
        let conn = self.db.lock()?;
        optional(conn.query_row(
            &format!("SELECT {COLUMNS} FROM recognition_history WHERE id = ?1"),
            [id],
            HistoryRecord::from_row,
        ))
    }

    pub fn create(&self, input: NewHistoryRecord) -> StoreResult<HistoryRecord> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO recognition_history
             (config_id, config_name, image_thumbnail, prompt, result, tokens_used, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                input.config_id,
                input.config_name,
                input.image,
                input.prompt,
                input.result,
                input.tokens_used,
                input.duration_ms.map(|v| v as i64),
            ],
        )?;
        let id = conn.last_insert_rowid();
        let record = conn.query_row(
            &format!("SELECT {COLUMNS} FROM recognition_history WHERE id = ?1"),
            [id],
            HistoryRecord::from_row,
        )?;
        Ok(record)
    }

    pub fn delete(&self, id: i64) -> StoreResult<bool> {
        let conn = self.db.lock()?;
        let removed = conn.execute("DELETE FROM recognition_history WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    /// Delete several records at once, returning how many existed.
    pub fn delete_many(&self, ids: &[i64]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let conn = self.db.lock()?;
        let removed = conn.execute(
            &format!("DELETE FROM recognition_history WHERE id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;
        Ok(removed)
    }

    pub fn clear(&self) -> StoreResult<usize> {
        let conn = self.db.lock()?;
        let removed = conn.execute("DELETE FROM recognition_history", [])?;
        tracing::info!("Cleared {removed} history records");
        Ok(removed)
    }

    /// All records matching the query's filters, ignoring its paging.
    pub fn export(&self, query: &HistoryQuery) -> StoreResult<Vec<HistoryRecord>> {
        let all = HistoryQuery {
            page: 1,
            page_size: EXPORT_LIMIT,
            ..query.clone()
        };
        Ok(self.list(&all)?.records)
    }
}
