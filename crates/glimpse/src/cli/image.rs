//! The `glimpse image` command: run the image pipeline locally.

use anyhow::Context;
use clap::{Args, Subcommand};
use glimpse_core::pipeline::ThumbnailGenerator;
use glimpse_core::{CompressionPolicy, Config, ImageNormalizer, ImageSource, NormalizedImage};
use std::path::PathBuf;

use super::theme::{dim, report_ok};

/// Arguments for the `image` command.
#[derive(Args, Debug)]
pub struct ImageArgs {
    #[command(subcommand)]
    pub command: ImageCommand,
}

#[derive(Subcommand, Debug)]
pub enum ImageCommand {
    /// Show what would be sent to a provider for this image
    Normalize {
        path: PathBuf,

        /// Byte budget in KB (defaults to the compressThreshold setting)
        #[arg(long)]
        max_size_kb: Option<u32>,

        /// Write the normalized image to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Write a 200x200 JPEG thumbnail
    Thumbnail {
        path: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Execute the image command.
pub async fn execute(config: Config, args: ImageArgs) -> anyhow::Result<()> {
    let glimpse = super::open(config)?;
    let settings = glimpse.db().settings().get_all()?;
    let max_file_size_mb = settings.image_max_size as u64;

    match args.command {
        ImageCommand::Normalize {
            path,
            max_size_kb,
            output,
            json,
        } => {
            let source = ImageSource::load_path(&expand(&path), max_file_size_mb)?;
            let mut policy = settings.compression_policy();
            if let Some(kb) = max_size_kb {
                policy = CompressionPolicy {
                    auto_compress: true,
                    max_size_bytes: kb as usize * 1024,
                };
            }

            let normalized = tokio::task::spawn_blocking(move || {
                ImageNormalizer::new(policy).normalize(source)
            })
            .await?;

            if let Some(output) = output {
                std::fs::write(&output, decode(&normalized)?)?;
                report_ok(format!("Wrote {}", output.display()));
            }

            if json {
                // The payload itself is rarely useful on a terminal
                let summary = NormalizedImage {
                    base64: String::new(),
                    ..normalized
                };
                super::print_json(&summary)?;
            } else {
                print_summary(&normalized);
            }
        }

        ImageCommand::Thumbnail { path, output } => {
            let source = ImageSource::load_path(&expand(&path), max_file_size_mb)?;
            let bytes = tokio::task::spawn_blocking(move || {
                ThumbnailGenerator::default().generate_bytes(source)
            })
            .await??;
            std::fs::write(&output, bytes)?;
            report_ok(format!("Thumbnail written to {}", output.display()));
        }
    }

    Ok(())
}

fn print_summary(image: &NormalizedImage) {
    println!("MIME type:      {}", image.mime_type);
    println!("Original size:  {} bytes", image.original_size);
    match image.compressed_size {
        Some(size) => println!("Compressed:     {size} bytes"),
        None => println!("Compressed:     no"),
    }
    if let Some(quality) = image.quality {
        println!("JPEG quality:   {quality}");
    }
    if !image.was_compressed {
        eprintln!("{}", dim().apply_to("Image is sent unchanged."));
    }
}

fn decode(image: &NormalizedImage) -> anyhow::Result<Vec<u8>> {
    use base64::Engine as _;

    base64::engine::general_purpose::STANDARD
        .decode(&image.base64)
        .context("Normalized image is not valid base64")
}

fn expand(path: &std::path::Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
