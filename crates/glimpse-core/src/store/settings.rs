//! Application settings stored as key/value rows.
//!
//! Each value is stored as JSON text, except plain strings which are stored
//! raw. Reads overlay stored keys on top of [`AppSettings::default`], so a
//! missing or ill-typed row never hides the rest of the settings.

use super::Database;
use crate::error::StoreResult;
use crate::pipeline::CompressionPolicy;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// "light", "dark" or "system"
    pub theme: String,
    pub language: String,
    /// Largest accepted upload, in MB
    pub image_max_size: u32,
    /// Compression budget, in KB
    pub compress_threshold: u32,
    pub auto_compress: bool,
    pub default_temperature: f64,
    pub default_top_p: f64,
    pub default_max_tokens: u32,
    pub default_stream: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: "system".to_string(),
            language: "en-US".to_string(),
            image_max_size: 10,
            compress_threshold: 2048,
            auto_compress: true,
            default_temperature: 0.0,
            default_top_p: 0.4,
            default_max_tokens: 2048,
            default_stream: true,
        }
    }
}

impl AppSettings {
    pub fn compression_policy(&self) -> CompressionPolicy {
        CompressionPolicy {
            auto_compress: self.auto_compress,
            max_size_bytes: self.compress_threshold as usize * 1024,
        }
    }
}

/// Operations on the `app_settings` table.
pub struct SettingsStore<'a> {
    db: &'a Database,
}

impl<'a> SettingsStore<'a> {
    pub(super) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Stored settings overlaid on defaults.
    pub fn get_all(&self) -> StoreResult<AppSettings> {
        let rows = self.raw()?;
        let defaults = AppSettings::default();
        let mut merged = match serde_json::to_value(&defaults)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        for (key, raw) in rows {
            if !merged.contains_key(&key) {
                tracing::debug!("Ignoring unknown setting '{key}'");
                continue;
            }
            let parsed = serde_json::from_str(&raw).ok();
            let previous = merged.get(&key).cloned();

            // A value like "123" stored for a string field parses as a number,
            // so the raw text is the second candidate
            let candidates = parsed.into_iter().chain([Value::String(raw)]);
            let accepted = candidates.into_iter().any(|value| {
                merged.insert(key.clone(), value);
                serde_json::from_value::<AppSettings>(Value::Object(merged.clone())).is_ok()
            });

            if !accepted {
                tracing::warn!("Ignoring invalid value for setting '{key}'");
                if let Some(previous) = previous {
                    merged.insert(key, previous);
                }
            }
        }

        Ok(serde_json::from_value(Value::Object(merged)).unwrap_or(defaults))
    }

    /// Upsert the given keys.
    pub fn update(&self, values: &BTreeMap<String, Value>) -> StoreResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        for (key, value) in values {
            tx.execute(
                "INSERT OR REPLACE INTO app_settings (key, value, updated_at)
                 VALUES (?1, ?2, datetime('now', 'localtime'))",
                params![key, encode(value)],
            )?;
        }
        tx.commit()?;
        tracing::debug!("Updated {} settings", values.len());
        Ok(())
    }

    pub fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.update(&BTreeMap::from([(key.to_string(), value)]))
    }

    /// Remove every stored setting so defaults apply again.
    pub fn reset(&self) -> StoreResult<()> {
        let conn = self.db.lock()?;
        conn.execute("DELETE FROM app_settings", [])?;
        Ok(())
    }

    fn raw(&self) -> StoreResult<Vec<(String, String)>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare("SELECT key, value FROM app_settings")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn encode(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
