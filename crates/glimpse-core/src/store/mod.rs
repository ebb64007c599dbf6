//! SQLite-backed persistence for provider configs, history, templates and settings.
//!
//! One [`Database`] owns one connection behind a mutex. Table-specific
//! operations live on lightweight borrowing handles returned by
//! [`Database::configs`], [`Database::history`], [`Database::templates`]
//! and [`Database::settings`].

mod configs;
mod history;
mod settings;
mod templates;

pub use configs::{
    ConfigStore, NewProviderConfig, ProviderConfig, ProviderConfigPatch, ProviderConfigSummary,
};
pub use history::{HistoryPage, HistoryQuery, HistoryRecord, HistoryStore, NewHistoryRecord};
pub use settings::{AppSettings, SettingsStore};
pub use templates::{NewPromptTemplate, PromptTemplate, PromptTemplatePatch, TemplateStore};

#[cfg(test)]
pub(crate) use configs::new_config;

use crate::crypto::SecretCipher;
use crate::error::{StoreError, StoreResult};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS model_configs (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    name              TEXT NOT NULL UNIQUE,
    provider          TEXT NOT NULL,
    api_url           TEXT NOT NULL,
    api_key_encrypted TEXT NOT NULL,
    model_name        TEXT NOT NULL,
    max_tokens        INTEGER NOT NULL DEFAULT 4096,
    is_active         INTEGER NOT NULL DEFAULT 1,
    is_default        INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
    updated_at        TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
);

CREATE TABLE IF NOT EXISTS recognition_history (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    config_id       INTEGER NOT NULL,
    config_name     TEXT NOT NULL,
    image_thumbnail TEXT,
    prompt          TEXT NOT NULL,
    result          TEXT NOT NULL,
    tokens_used     INTEGER,
    duration_ms     INTEGER,
    created_at      TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
);

CREATE TABLE IF NOT EXISTS prompt_templates (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    content    TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    use_count  INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
);

CREATE TABLE IF NOT EXISTS app_settings (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
);

CREATE INDEX IF NOT EXISTS idx_history_created_at ON recognition_history(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_history_config_id ON recognition_history(config_id);
CREATE INDEX IF NOT EXISTS idx_templates_use_count ON prompt_templates(use_count DESC);
"#;

/// Built-in prompt templates seeded into an empty database: (name, content, is_default).
const DEFAULT_TEMPLATES: &[(&str, &str, bool)] = &[
    (
        "General description",
        "Describe the content of this image in detail.",
        true,
    ),
    (
        "Text extraction",
        "Extract all text in this image, preserving the original formatting.",
        false,
    ),
    (
        "Table to Markdown",
        "Recognize the table in this image and output it as Markdown.",
        false,
    ),
    (
        "Code extraction",
        "Recognize the code in this image, preserving the original formatting and indentation.",
        false,
    ),
    (
        "Formula to LaTeX",
        "Recognize the mathematical formulas in this image and output them as LaTeX.",
        false,
    ),
];

/// The application database.
pub struct Database {
    conn: Mutex<Connection>,
    cipher: SecretCipher,
}

impl Database {
    /// Open (or create) the database file, creating its parent directory.
    pub fn open(path: &Path, cipher: SecretCipher) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        tracing::debug!("Opened database at {}", path.display());
        Self::init(conn, cipher)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(cipher: SecretCipher) -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, cipher)
    }

    fn init(conn: Connection, cipher: SecretCipher) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        seed_templates(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    pub(crate) fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub(crate) fn cipher(&self) -> &SecretCipher {
        &self.cipher
    }

    pub fn configs(&self) -> ConfigStore<'_> {
        ConfigStore::new(self)
    }

    pub fn history(&self) -> HistoryStore<'_> {
        HistoryStore::new(self)
    }

    pub fn templates(&self) -> TemplateStore<'_> {
        TemplateStore::new(self)
    }

    pub fn settings(&self) -> SettingsStore<'_> {
        SettingsStore::new(self)
    }
}

fn seed_templates(conn: &Connection) -> StoreResult<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM prompt_templates", [], |row| row.get(0))?;
    if count > 0 {
        return Ok(());
    }

    let mut stmt = conn.prepare(
        "INSERT INTO prompt_templates (name, content, is_default) VALUES (?1, ?2, ?3)",
    )?;
    for (name, content, is_default) in DEFAULT_TEMPLATES {
        stmt.execute(rusqlite::params![name, content, *is_default as i32])?;
    }
    tracing::debug!("Seeded {} default prompt templates", DEFAULT_TEMPLATES.len());
    Ok(())
}

/// Map "no rows" to `None`, the way every `get` in the store reports absence.
pub(crate) fn optional<T>(result: rusqlite::Result<T>) -> StoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// A database over a fixed test key.
#[cfg(test)]
pub(crate) fn test_db() -> Database {
    let cipher = SecretCipher::from_key(&[42u8; 32]).unwrap();
    Database::open_in_memory(cipher).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_templates_are_seeded_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("glimpse.db");
        let cipher = SecretCipher::from_key(&[1u8; 32]).unwrap();

        let db = Database::open(&path, cipher.clone()).unwrap();
        assert_eq!(db.templates().list().unwrap().len(), 5);
        drop(db);

        let db = Database::open(&path, cipher).unwrap();
        let templates = db.templates().list().unwrap();
        assert_eq!(templates.len(), 5);
        assert!(templates[0].is_default);
        assert_eq!(templates[0].name, "General description");
    }
}
