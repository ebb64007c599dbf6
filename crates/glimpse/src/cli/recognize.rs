//! The `glimpse recognize` command.

use anyhow::Context;
use clap::Args;
use glimpse_core::{
    AppSettings, Config, Glimpse, ImageSource, ParamValue, ProgressSink, RecognitionOptions,
    RecognitionRequest, RecognitionResult, RecognitionSession,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use super::theme::{dim, report_err};

/// Arguments for the `recognize` command.
#[derive(Args, Debug)]
pub struct RecognizeArgs {
    /// Image file, a `data:` URI, or `-` to read a data URI from stdin
    pub image: String,

    /// Provider configuration ID (defaults to the default configuration)
    #[arg(short, long)]
    pub config: Option<i64>,

    /// Prompt text
    #[arg(short, long, conflicts_with = "template")]
    pub prompt: Option<String>,

    /// Prompt template ID (defaults to the default template)
    #[arg(short, long)]
    pub template: Option<i64>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Nucleus sampling probability
    #[arg(long)]
    pub top_p: Option<f32>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Stream the answer as it is generated
    #[arg(long, conflicts_with = "no_stream")]
    pub stream: bool,

    /// Wait for the complete answer
    #[arg(long)]
    pub no_stream: bool,

    /// Extra request body field (OpenAI-compatible providers), repeatable
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, ParamValue)>,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the recognize command.
pub async fn execute(config: Config, args: RecognizeArgs) -> anyhow::Result<()> {
    let glimpse = super::open(config)?;
    let settings = glimpse.db().settings().get_all()?;

    let config_id = resolve_config_id(&glimpse, args.config)?;
    let prompt = resolve_prompt(&glimpse, args.prompt.clone(), args.template)?;
    let image = read_image(&args.image, &settings)?;
    let options = build_options(&args, &settings);
    let streaming = options.stream && !args.json;

    let request = RecognitionRequest {
        config_id,
        image,
        prompt,
        options,
    };

    let session = RecognitionSession::new();
    let active = session.begin()?;
    let token = active.token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let result = if streaming {
        let sink = |delta: &str| {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        };
        let result = glimpse
            .dispatcher()
            .recognize_with_cancel(request, Some(&sink as &dyn ProgressSink), active.token())
            .await;
        println!();
        result
    } else {
        let spinner = spinner();
        let result = glimpse
            .dispatcher()
            .recognize_with_cancel(request, None, active.token())
            .await;
        spinner.finish_and_clear();
        result
    };
    drop(active);

    report(&result, args.json, streaming)
}

fn report(result: &RecognitionResult, json: bool, streamed: bool) -> anyhow::Result<()> {
    if json {
        super::print_json(result)?;
    } else if result.success && !streamed {
        println!("{}", result.content.as_deref().unwrap_or_default());
    }

    if !result.success {
        let message = result.error.as_deref().unwrap_or("Recognition failed");
        if !json {
            report_err(message);
        }
        anyhow::bail!("{message}");
    }

    if !json {
        let mut footer = Vec::new();
        if let Some(tokens) = result.tokens_used {
            footer.push(format!("{tokens} tokens"));
        }
        if let Some(ms) = result.duration_ms {
            footer.push(format!("{ms} ms"));
        }
        if result.processed_image.is_some() {
            footer.push("image compressed".to_string());
        }
        if !footer.is_empty() {
            eprintln!("{}", dim().apply_to(footer.join(" · ")));
        }
    }
    Ok(())
}

fn resolve_config_id(glimpse: &Glimpse, explicit: Option<i64>) -> anyhow::Result<i64> {
    if let Some(id) = explicit {
        return Ok(id);
    }
    glimpse
        .db()
        .configs()
        .default_config()?
        .map(|c| c.id)
        .context(
            "No default provider configuration. \
             Pass --config or run `glimpse providers set-default <ID>`",
        )
}

fn resolve_prompt(
    glimpse: &Glimpse,
    prompt: Option<String>,
    template_id: Option<i64>,
) -> anyhow::Result<String> {
    if let Some(prompt) = prompt {
        return Ok(prompt);
    }

    let templates = glimpse.db().templates();
    let template = match template_id {
        Some(id) => templates
            .get(id)?
            .with_context(|| format!("Prompt template {id} not found"))?,
        None => templates
            .default_template()?
            .context("No prompt given and no default template. Pass --prompt or --template")?,
    };
    templates.increment_use(template.id)?;
    tracing::debug!("Using prompt template '{}'", template.name);
    Ok(template.content)
}

fn read_image(arg: &str, settings: &AppSettings) -> anyhow::Result<ImageSource> {
    if arg == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read image from stdin")?;
        return Ok(ImageSource::from_text(&text, "image/png"));
    }
    if arg.starts_with("data:") {
        return Ok(ImageSource::from_text(arg, "image/png"));
    }

    let path = PathBuf::from(shellexpand::tilde(arg).into_owned());
    Ok(ImageSource::load_path(&path, settings.image_max_size as u64)?)
}

fn build_options(args: &RecognizeArgs, settings: &AppSettings) -> RecognitionOptions {
    let stream = if args.stream {
        true
    } else if args.no_stream {
        false
    } else {
        settings.default_stream
    };

    RecognitionOptions {
        temperature: Some(args.temperature.unwrap_or(settings.default_temperature as f32)),
        top_p: Some(args.top_p.unwrap_or(settings.default_top_p as f32)),
        // Without a flag the configuration's own ceiling applies
        max_tokens: args.max_tokens,
        stream,
        custom_params: args.params.iter().cloned().collect::<BTreeMap<_, _>>(),
    }
}

fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("parameter name must not be empty".to_string());
    }
    Ok((key.to_string(), ParamValue::parse(value)))
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]")
    {
        pb.set_style(style);
    }
    pb.set_message("Waiting for the model...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
