//! The `glimpse providers` command for provider configurations.

use anyhow::Context;
use clap::{Args, Subcommand};
use dialoguer::Password;
use glimpse_core::llm::ConnectionTestResult;
use glimpse_core::store::{NewProviderConfig, ProviderConfigPatch, ProviderConfigSummary};
use glimpse_core::{mask_api_key, Config, ConnectionTarget, ProviderKind};

use super::theme::{dim, glimpse_theme, report_err, report_ok};

/// Arguments for the `providers` command.
#[derive(Args, Debug)]
pub struct ProvidersArgs {
    #[command(subcommand)]
    pub command: ProvidersCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProvidersCommand {
    /// List configurations
    List {
        /// Only active configurations, default first
        #[arg(long)]
        active: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show one configuration (API key masked)
    Show {
        id: i64,

        #[arg(long)]
        json: bool,
    },

    /// Add a configuration
    Add {
        /// Display name (unique)
        #[arg(long)]
        name: String,

        /// openai, anthropic, azure, oneapi or custom
        #[arg(long, value_parser = parse_provider)]
        provider: ProviderKind,

        /// Full endpoint URL, e.g. https://api.openai.com/v1/chat/completions
        #[arg(long)]
        api_url: String,

        /// API key (prompted for when omitted)
        #[arg(long, env = "GLIMPSE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        #[arg(long)]
        model: String,

        /// Default token ceiling
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Save the configuration as inactive
        #[arg(long)]
        inactive: bool,

        /// Make this the default configuration
        #[arg(long)]
        default: bool,
    },

    /// Change fields of a configuration
    Update {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_parser = parse_provider)]
        provider: Option<ProviderKind>,

        #[arg(long)]
        api_url: Option<String>,

        #[arg(long, hide_env_values = true)]
        api_key: Option<String>,

        /// Prompt for a new API key
        #[arg(long, conflicts_with = "api_key")]
        prompt_key: bool,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// Enable or disable the configuration
        #[arg(long)]
        active: Option<bool>,
    },

    /// Delete a configuration (its history is kept)
    Remove { id: i64 },

    /// Make a configuration the default
    SetDefault { id: i64 },

    /// Check that a saved configuration can reach its endpoint
    Test { id: i64 },

    /// Check connection details without saving them
    TestDraft {
        #[arg(long, value_parser = parse_provider)]
        provider: ProviderKind,

        #[arg(long)]
        api_url: String,

        #[arg(long, env = "GLIMPSE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        #[arg(long)]
        model: String,
    },
}

/// Execute the providers command.
pub async fn execute(config: Config, args: ProvidersArgs) -> anyhow::Result<()> {
    let glimpse = super::open(config)?;
    let configs = glimpse.db().configs();

    match args.command {
        ProvidersCommand::List { active, json } => {
            let list = if active {
                configs.list_active()?
            } else {
                configs.list()?
            };
            if json {
                super::print_json(&list)?;
            } else {
                print_table(&list);
            }
        }

        ProvidersCommand::Show { id, json } => {
            let config = configs
                .get(id)?
                .with_context(|| format!("Provider configuration {id} not found"))?;
            if json {
                super::print_json(&config)?;
            } else {
                println!("ID:          {}", config.id);
                println!("Name:        {}", config.name);
                println!("Provider:    {}", config.provider);
                println!("API URL:     {}", config.api_url);
                println!("API key:     {}", mask_api_key(&config.api_key));
                println!("Model:       {}", config.model_name);
                println!("Max tokens:  {}", config.max_tokens);
                println!("Active:      {}", config.is_active);
                println!("Default:     {}", config.is_default);
                println!("Created:     {}", config.created_at);
                println!("Updated:     {}", config.updated_at);
            }
        }

        ProvidersCommand::Add {
            name,
            provider,
            api_url,
            api_key,
            model,
            max_tokens,
            inactive,
            default,
        } => {
            let api_key = match api_key {
                Some(key) => key,
                None => prompt_api_key(&name)?,
            };
            let created = configs.create(NewProviderConfig {
                name,
                provider,
                api_url,
                api_key,
                model_name: model,
                max_tokens,
                is_active: !inactive,
                is_default: default,
            })?;
            report_ok(format!(
                "Saved provider configuration {} ({})",
                created.id, created.name
            ));
        }

        ProvidersCommand::Update {
            id,
            name,
            provider,
            api_url,
            api_key,
            prompt_key,
            model,
            max_tokens,
            active,
        } => {
            let api_key = if prompt_key {
                Some(prompt_api_key(&format!("configuration {id}"))?)
            } else {
                api_key
            };
            let updated = configs.update(
                id,
                ProviderConfigPatch {
                    name,
                    provider,
                    api_url,
                    api_key,
                    model_name: model,
                    max_tokens,
                    is_active: active,
                    is_default: None,
                },
            )?;
            report_ok(format!("Updated provider configuration {}", updated.id));
        }

        ProvidersCommand::Remove { id } => {
            if !configs.delete(id)? {
                anyhow::bail!("Provider configuration {id} not found");
            }
            report_ok(format!("Removed provider configuration {id}"));
        }

        ProvidersCommand::SetDefault { id } => {
            configs.set_default(id)?;
            report_ok(format!("Provider configuration {id} is now the default"));
        }

        ProvidersCommand::Test { id } => {
            let result = glimpse
                .dispatcher()
                .test_connection(ConnectionTarget::Saved(id))
                .await;
            report_test(result)?;
        }

        ProvidersCommand::TestDraft {
            provider,
            api_url,
            api_key,
            model,
        } => {
            let api_key = match api_key {
                Some(key) => key,
                None => prompt_api_key("this endpoint")?,
            };
            let result = glimpse
                .dispatcher()
                .test_connection(ConnectionTarget::Draft {
                    provider,
                    api_url,
                    api_key,
                    model_name: model,
                })
                .await;
            report_test(result)?;
        }
    }

    Ok(())
}

fn report_test(result: ConnectionTestResult) -> anyhow::Result<()> {
    if result.success {
        report_ok(&result.message);
        Ok(())
    } else {
        report_err(&result.message);
        anyhow::bail!("Connection test failed")
    }
}

fn print_table(list: &[ProviderConfigSummary]) {
    if list.is_empty() {
        eprintln!(
            "{}",
            dim().apply_to("No provider configurations. Add one with `glimpse providers add`.")
        );
        return;
    }

    println!(
        "{:>4}  {:<20} {:<10} {:<24} {:<20} {:>6}  {:<7}",
        "ID", "NAME", "PROVIDER", "MODEL", "API KEY", "ACTIVE", "DEFAULT"
    );
    for config in list {
        println!(
            "{:>4}  {:<20} {:<10} {:<24} {:<20} {:>6}  {:<7}",
            config.id,
            super::preview(&config.name, 20),
            config.provider,
            super::preview(&config.model_name, 24),
            super::preview(&config.api_key_masked, 20),
            super::flag(config.is_active),
            super::flag(config.is_default),
        );
    }
}

fn prompt_api_key(target: &str) -> anyhow::Result<String> {
    let key = Password::with_theme(&glimpse_theme())
        .with_prompt(format!("API key for {target}"))
        .interact()?;
    Ok(key)
}

fn parse_provider(raw: &str) -> Result<ProviderKind, String> {
    raw.parse().map_err(|_| {
        let names: Vec<&str> = ProviderKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown provider '{raw}', expected one of: {}", names.join(", "))
    })
}
