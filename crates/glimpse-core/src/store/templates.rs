//! Prompt templates.

use super::{optional, Database};
use crate::error::{StoreError, StoreResult};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

const COLUMNS: &str = "id, name, content, is_default, use_count, created_at";

/// Number of templates returned by [`TemplateStore::recent`] when no limit is given.
pub const DEFAULT_RECENT_LIMIT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub is_default: bool,
    pub use_count: u32,
    pub created_at: String,
}

impl PromptTemplate {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            content: row.get(2)?,
            is_default: row.get::<_, i32>(3)? != 0,
            use_count: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewPromptTemplate {
    pub name: String,
    pub content: String,
    pub is_default: bool,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct PromptTemplatePatch {
    pub name: Option<String>,
    pub content: Option<String>,
    pub is_default: Option<bool>,
}

/// Operations on the `prompt_templates` table.
pub struct TemplateStore<'a> {
    db: &'a Database,
}

impl<'a> TemplateStore<'a> {
    pub(super) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// All templates: default first, then most used, then newest.
    pub fn list(&self) -> StoreResult<Vec<PromptTemplate>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM prompt_templates
             ORDER BY is_default DESC, use_count DESC, created_at DESC, id DESC"
        );
        self.query(&sql, None)
    }

    /// The most used templates.
    pub fn recent(&self, limit: Option<u32>) -> StoreResult<Vec<PromptTemplate>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM prompt_templates
             ORDER BY use_count DESC, created_at DESC, id DESC LIMIT ?1"
        );
        self.query(&sql, Some(limit.unwrap_or(DEFAULT_RECENT_LIMIT)))
    }

    pub fn get(&self, id: i64) -> StoreResult<Option<PromptTemplate>> {
        let conn = self.db.lock()?;
        optional(conn.query_row(
            &format!("SELECT {COLUMNS} FROM prompt_templates WHERE id = ?1"),
            [id],
            PromptTemplate::from_row,
        ))
    }

    pub fn default_template(&self) -> StoreResult<Option<PromptTemplate>> {
        let conn = self.db.lock()?;
        optional(conn.query_row(
            &format!("SELECT {COLUMNS} FROM prompt_templates WHERE is_default = 1 LIMIT 1"),
            [],
            PromptTemplate::from_row,
        ))
    }

    pub fn create(&self, input: NewPromptTemplate) -> StoreResult<PromptTemplate> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        if input.is_default {
            tx.execute("UPDATE prompt_templates SET is_default = 0", [])?;
        }
        tx.execute(
            "INSERT INTO prompt_templates (name, content, is_default) VALUES (?1, ?2, ?3)",
            params![input.name, input.content, input.is_default as i32],
        )?;
        let template = Self::fetch(&tx, tx.last_insert_rowid())?;
        tx.commit()?;
        Ok(template)
    }

    pub fn update(&self, id: i64, patch: PromptTemplatePatch) -> StoreResult<PromptTemplate> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        let current = Self::fetch(&tx, id)?;

        if patch.is_default == Some(true) {
            tx.execute("UPDATE prompt_templates SET is_default = 0", [])?;
        }
        tx.execute(
            "UPDATE prompt_templates SET name = ?1, content = ?2, is_default = ?3 WHERE id = ?4",
            params![
                patch.name.unwrap_or(current.name),
                patch.content.unwrap_or(current.content),
                patch.is_default.unwrap_or(current.is_default) as i32,
                id,
            ],
        )?;
        let template = Self::fetch(&tx, id)?;
        tx.commit()?;
        Ok(template)
    }

    pub fn delete(&self, id: i64) -> StoreResult<bool> {
        let conn = self.db.lock()?;
        let removed = conn.execute("DELETE FROM prompt_templates WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    /// Make `id` the single default template.
    pub fn set_default(&self, id: i64) -> StoreResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        tx.execute("UPDATE prompt_templates SET is_default = 0", [])?;
        let updated = tx.execute("UPDATE prompt_templates SET is_default = 1 WHERE id = ?1", [id])?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "Prompt template",
                id,
            });
        }
        tx.commit()?;
        Ok(())
    }

    pub fn increment_use(&self, id: i64) -> StoreResult<()> {
        let conn = self.db.lock()?;
        conn.execute(
            "UPDATE prompt_templates SET use_count = use_count + 1 WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    fn fetch(conn: &rusqlite::Connection, id: i64) -> StoreResult<PromptTemplate> {
        optional(conn.query_row(
            &format!("SELECT {COLUMNS} FROM prompt_templates WHERE id = ?1"),
            [id],
            PromptTemplate::from_row,
        ))?
        .ok_or(StoreError::NotFound {
            entity: "Prompt template",
            id,
        })
    }

    fn query(&self, sql: &str, limit: Option<u32>) -> StoreResult<Vec<PromptTemplate>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = match limit {
            Some(limit) => stmt.query_map([limit], PromptTemplate::from_row)?,
            None => stmt.query_map([], PromptTemplate::from_row)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
