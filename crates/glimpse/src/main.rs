//! Glimpse CLI - Ask multimodal LLMs about images and keep the answers.
//!
//! Glimpse sends an image and a prompt to an OpenAI-compatible or Anthropic
//! endpoint using a saved provider configuration, streams the answer to the
//! terminal and records it in a local history.
//!
//! # Usage
//!
//! ```bash
//! # Save a provider configuration (prompts for the API key)
//! glimpse providers add --name gpt4o --provider openai \
//!     --api-url https://api.openai.com/v1/chat/completions --model gpt-4o --default
//!
//! # Recognize an image with the default configuration and template
//! glimpse recognize photo.jpg
//!
//! # Browse history
//! glimpse history list --keyword invoice
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Glimpse - Ask multimodal LLMs about images and keep the answers.
#[derive(Parser, Debug)]
#[command(name = "glimpse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Send an image and a prompt to a provider
    Recognize(cli::recognize::RecognizeArgs),

    /// Manage provider configurations
    Providers(cli::providers::ProvidersArgs),

    /// Browse and manage recognition history
    History(cli::history::HistoryArgs),

    /// Manage prompt templates
    Templates(cli::templates::TemplatesArgs),

    /// View and change user settings
    Settings(cli::settings::SettingsArgs),

    /// Run the image pipeline without calling a provider
    Image(cli::image::ImageArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match glimpse_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `glimpse config path`."
            );
            glimpse_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Glimpse v{}", glimpse_core::VERSION);

    match cli.command {
        Commands::Recognize(args) => cli::recognize::execute(config, args).await,
        Commands::Providers(args) => cli::providers::execute(config, args).await,
        Commands::History(args) => cli::history::execute(config, args).await,
        Commands::Templates(args) => cli::templates::execute(config, args).await,
        Commands::Settings(args) => cli::settings::execute(config, args).await,
        Commands::Image(args) => cli::image::execute(config, args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_recognize_with_params() {
        let cli = Cli::try_parse_from([
            "glimpse",
            "recognize",
            "photo.png",
            "--config",
            "3",
            "--param",
            "seed=42",
            "--param",
            "response_format=text",
            "--no-stream",
        ])
        .unwrap();
        let Commands::Recognize(args) = cli.command else {
            panic!("expected recognize");
        };
        assert_eq!(args.config, Some(3));
        assert_eq!(args.params.len(), 2);
        assert!(args.no_stream);
    }
}
