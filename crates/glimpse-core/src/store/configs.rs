//! Provider configurations, with API keys encrypted at rest.

use super::{optional, Database};
use crate::crypto::mask_api_key;
use crate::error::{RecognitionError, StoreError, StoreResult};
use crate::llm::{AdapterConfig, ProviderKind};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

const COLUMNS: &str = "id, name, provider, api_url, api_key_encrypted, model_name, max_tokens, \
                       is_active, is_default, created_at, updated_at";

/// Default token ceiling for new configurations.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// A stored provider configuration with its API key decrypted.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: i64,
    pub name: String,
    /// Provider kind as stored; parsed at dispatch time
    pub provider: String,
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model_name", &self.model_name)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

impl ProviderConfig {
    pub fn kind(&self) -> Result<ProviderKind, RecognitionError> {
        self.provider.parse()
    }

    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            model_name: self.model_name.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

/// List view of a configuration, with the API key masked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSummary {
    pub id: i64,
    pub name: String,
    pub provider: String,
    pub api_url: String,
    pub api_key_masked: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a configuration.
#[derive(Debug, Clone)]
pub struct NewProviderConfig {
    pub name: String,
    pub provider: ProviderKind,
    pub api_url: String,
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: Option<u32>,
    pub is_active: bool,
    pub is_default: bool,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfigPatch {
    pub name: Option<String>,
    pub provider: Option<ProviderKind>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub max_tokens: Option<u32>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
}

/// A row as stored, key still encrypted.
struct StoredConfig {
    id: i64,
    name: String,
    provider: String,
    api_url: String,
    api_key_encrypted: String,
    model_name: String,
    max_tokens: u32,
    is_active: bool,
    is_default: bool,
    created_at: String,
    updated_at: String,
}

impl StoredConfig {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            provider: row.get(2)?,
            api_url: row.get(3)?,
            api_key_encrypted: row.get(4)?,
            model_name: row.get(5)?,
            max_tokens: row.get(6)?,
            is_active: row.get::<_, i32>(7)? != 0,
            is_default: row.get::<_, i32>(8)? != 0,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

/// Operations on the `model_configs` table.
pub struct ConfigStore<'a> {
    db: &'a Database,
}

impl<'a> ConfigStore<'a> {
    pub(super) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// All configurations, newest first.
    pub fn list(&self) -> StoreResult<Vec<ProviderConfigSummary>> {
        self.query_summaries(&format!(
            "SELECT {COLUMNS} FROM model_configs ORDER BY created_at DESC, id DESC"
        ))
    }

    /// Active configurations, default first.
    pub fn list_active(&self) -> StoreResult<Vec<ProviderConfigSummary>> {
        self.query_summaries(&format!(
            "SELECT {COLUMNS} FROM model_configs WHERE is_active = 1 \
             ORDER BY is_default DESC, created_at DESC, id DESC"
        ))
    }

    /// Fetch a configuration with its key decrypted.
    pub fn get(&self, id: i64) -> StoreResult<Option<ProviderConfig>> {
        let stored = {
            let conn = self.db.lock()?;
            optional(conn.query_row(
                &format!("SELECT {COLUMNS} FROM model_configs WHERE id = ?1"),
                [id],
                StoredConfig::from_row,
            ))?
        };
        stored.map(|s| self.decrypt(s)).transpose()
    }

    /// The active default configuration, if one is set.
    pub fn default_config(&self) -> StoreResult<Option<ProviderConfig>> {
        let stored = {
            let conn = self.db.lock()?;
            optional(conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM model_configs WHERE is_default = 1 AND is_active = 1"
                ),
                [],
                StoredConfig::from_row,
            ))?
        };
        stored.map(|s| self.decrypt(s)).transpose()
    }

    pub fn create(&self, input: NewProviderConfig) -> StoreResult<ProviderConfigSummary> {
        let encrypted = self.db.cipher().encrypt(&input.api_key)?;

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        if input.is_default {
            tx.execute("UPDATE model_configs SET is_default = 0", [])?;
        }
        tx.execute(
            "INSERT INTO model_configs
             (name, provider, api_url, api_key_encrypted, model_name, max_tokens, is_active, is_default)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                input.name,
                input.provider.as_str(),
                input.api_url,
                encrypted,
                input.model_name,
                input.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                input.is_active as i32,
                input.is_default as i32,
            ],
        )?;
        let id = tx.last_insert_rowid();
        let stored = Self::fetch_stored(&tx, id)?;
        tx.commit()?;
        drop(conn);

        tracing::info!("Created provider config {} ({})", id, input.name);
        Ok(self.summarize(stored))
    }

    pub fn update(
        &self,
        id: i64,
        patch: ProviderConfigPatch,
    ) -> StoreResult<ProviderConfigSummary> {
        let encrypted = patch
            .api_key
            .as_deref()
            .map(|key| self.db.cipher().encrypt(key))
            .transpose()?;

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        let current = Self::fetch_stored(&tx, id)?;

        if patch.is_default == Some(true) {
            tx.execute("UPDATE model_configs SET is_default = 0", [])?;
        }
        tx.execute(
            "UPDATE model_configs SET
                name = ?1, provider = ?2, api_url = ?3, api_key_encrypted = ?4,
                model_name = ?5, max_tokens = ?6, is_active = ?7, is_default = ?8,
                updated_at = datetime('now', 'localtime')
             WHERE id = ?9",
            params![
                patch.name.unwrap_or(current.name),
                patch
                    .provider
                    .map(|p| p.as_str().to_string())
                    .unwrap_or(current.provider),
                patch.api_url.unwrap_or(current.api_url),
                encrypted.unwrap_or(current.api_key_encrypted),
                patch.model_name.unwrap_or(current.model_name),
                patch.max_tokens.unwrap_or(current.max_tokens),
                patch.is_active.unwrap_or(current.is_active) as i32,
                patch.is_default.unwrap_or(current.is_default) as i32,
                id,
            ],
        )?;
        let stored = Self::fetch_stored(&tx, id)?;
        tx.commit()?;
        drop(conn);

        tracing::info!("Updated provider config {id}");
        Ok(self.summarize(stored))
    }

    /// Delete a configuration. History rows keep their dangling `config_id`.
    pub fn delete(&self, id: i64) -> StoreResult<bool> {
        let conn = self.db.lock()?;
        let removed = conn.execute("DELETE FROM model_configs WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    /// Make `id` the single default configuration.
    pub fn set_default(&self, id: i64) -> StoreResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        tx.execute("UPDATE model_configs SET is_default = 0", [])?;
        let updated = tx.execute(
            "UPDATE model_configs SET is_default = 1, updated_at = datetime('now', 'localtime')
             WHERE id = ?1",
            [id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "Provider config",
                id,
            });
        }
        tx.commit()?;
        Ok(())
    }

    fn fetch_stored(conn: &rusqlite::Connection, id: i64) -> StoreResult<StoredConfig> {
        optional(conn.query_row(
            &format!("SELECT {COLUMNS} FROM model_configs WHERE id = ?1"),
            [id],
            StoredConfig::from_row,
        ))?
        .ok_or(StoreError::NotFound {
            entity: "Provider config",
            id,
        })
    }

    fn query_summaries(&self, sql: &str) -> StoreResult<Vec<ProviderConfigSummary>> {
        let stored: Vec<StoredConfig> = {
            let conn = self.db.lock()?;
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], StoredConfig::from_row)?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        Ok(stored.into_iter().map(|s| self.summarize(s)).collect())
    }

    fn decrypt(&self, stored: StoredConfig) -> StoreResult<ProviderConfig> {
        let api_key = self.db.cipher().decrypt(&stored.api_key_encrypted)?;
        Ok(ProviderConfig {
            id: stored.id,
            name: stored.name,
            provider: stored.provider,
            api_url: stored.api_url,
            api_key,
            model_name: stored.model_name,
            max_tokens: stored.max_tokens,
            is_active: stored.is_active,
            is_default: stored.is_default,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }

    fn summarize(&self, stored: StoredConfig) -> ProviderConfigSummary {
        let api_key_masked = match self.db.cipher().decrypt(&stored.api_key_encrypted) {
            Ok(key) => mask_api_key(&key),
            Err(e) => {
                tracing::warn!("Cannot decrypt API key of config {}: {e}", stored.id);
                String::new()
            }
        };
        ProviderConfigSummary {
            id: stored.id,
            name: stored.name,
            provider: stored.provider,
            api_url: stored.api_url,
            api_key_masked,
            model_name: stored.model_name,
            max_tokens: stored.max_tokens,
            is_active: stored.is_active,
            is_default: stored.is_default,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }
}

#[cfg(test)]
pub(crate) fn new_config(name: &str, provider: ProviderKind, api_url: &str) -> NewProviderConfig {
    NewProviderConfig {
        name: name.to_string(),
        provider,
        api_url: api_url.to_string(),
        api_key: "sk-1234567890abcdef".to_string(),
        model_name: "gpt-4o".to_string(),
        max_tokens: None,
        is_active: true,
        is_default: false,
    }
}
