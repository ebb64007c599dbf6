//! The `glimpse settings` command for user preferences stored in the database.

use clap::{Args, Subcommand};
use glimpse_core::{AppSettings, Config};
use serde_json::Value;

use super::theme::report_ok;

/// Arguments for the `settings` command.
#[derive(Args, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Display current settings
    Show {
        #[arg(long)]
        json: bool,
    },

    /// Change one setting, e.g. `set compressThreshold 1024`
    Set {
        /// Setting name (camelCase, as shown by `settings show --json`)
        key: String,

        /// New value; numbers and booleans are typed automatically
        value: String,
    },

    /// Restore all defaults
    Reset,
}

/// Execute the settings command.
pub async fn execute(config: Config, args: SettingsArgs) -> anyhow::Result<()> {
    let glimpse = super::open(config)?;
    let settings = glimpse.db().settings();

    match args.command {
        SettingsCommand::Show { json } => {
            let current = settings.get_all()?;
            if json {
                super::print_json(&current)?;
            } else {
                print_settings(&current);
            }
        }

        SettingsCommand::Set { key, value } => {
            let value = parse_value(&value);
            check_known(&key, &value)?;
            settings.set(&key, value)?;
            report_ok(format!("Updated {key}"));
        }

        SettingsCommand::Reset => {
            settings.reset()?;
            report_ok("Settings restored to defaults");
        }
    }

    Ok(())
}

fn print_settings(settings: &AppSettings) {
    println!("theme               {}", settings.theme);
    println!("language            {}", settings.language);
    println!("imageMaxSize        {} MB", settings.image_max_size);
    println!("compressThreshold   {} KB", settings.compress_threshold);
    println!("autoCompress        {}", settings.auto_compress);
    println!("defaultTemperature  {}", settings.default_temperature);
    println!("defaultTopP         {}", settings.default_top_p);
    println!("defaultMaxTokens    {}", settings.default_max_tokens);
    println!("defaultStream       {}", settings.default_stream);
}

/// JSON scalars are typed; anything else is kept as a string.
fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

/// Reject unknown keys and values of the wrong type before they are stored.
fn check_known(key: &str, value: &Value) -> anyhow::Result<()> {
    let Value::Object(mut fields) = serde_json::to_value(AppSettings::default())? else {
        anyhow::bail!("Settings are not an object");
    };
    if !fields.contains_key(key) {
        let known: Vec<&str> = fields.keys().map(String::as_str).collect();
        anyhow::bail!("Unknown setting '{key}'. Known settings: {}", known.join(", "));
    }
    fields.insert(key.to_string(), value.clone());
    serde_json::from_value::<AppSettings>(Value::Object(fields))
        .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1024"), Value::from(1024));
        assert_eq!(parse_value("false"), Value::Bool(false));
        assert_eq!(parse_value("dark"), Value::String("dark".into()));
        assert_eq!(parse_value("[1]"), Value::String("[1]".into()));
    }

    #[test]
    fn test_check_known() {
        assert!(check_known("compressThreshold", &Value::from(512)).is_ok());
        assert!(check_known("theme", &Value::String("dark".into())).is_ok());
        assert!(check_known("autoCompress", &Value::String("maybe".into())).is_err());
        let err = check_known("colour", &Value::Bool(true)).unwrap_err();
        assert!(err.to_string().contains("Unknown setting"));
    }
}
