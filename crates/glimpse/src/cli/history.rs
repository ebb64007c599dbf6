//! The `glimpse history` command.

use anyhow::Context;
use clap::{Args, Subcommand};
use dialoguer::Confirm;
use glimpse_core::store::{HistoryPage, HistoryQuery};
use glimpse_core::Config;
use std::path::PathBuf;

use super::theme::{dim, glimpse_theme, report_ok};

/// Arguments for the `history` command.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistoryCommand,
}

/// Filters shared by `list` and `export`.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Only records from this provider configuration
    #[arg(long)]
    pub config: Option<i64>,

    /// Text to look for in the prompt or result
    #[arg(short, long)]
    pub keyword: Option<String>,

    /// Earliest creation time, e.g. 2024-05-01 or "2024-05-01 08:00:00"
    #[arg(long)]
    pub since: Option<String>,

    /// Latest creation time, inclusive
    #[arg(long)]
    pub until: Option<String>,
}

impl FilterArgs {
    fn query(self, page: u32, page_size: u32) -> HistoryQuery {
        HistoryQuery {
            page,
            page_size,
            config_id: self.config,
            keyword: self.keyword,
            start_date: self.since,
            end_date: self.until.map(|d| end_of_day(&d)),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// List recognitions, newest first
    List {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "20")]
        page_size: u32,

        #[arg(long)]
        json: bool,
    },

    /// Show one recognition in full
    Show {
        id: i64,

        /// Write the stored image to this file
        #[arg(long)]
        save_image: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Delete one or more records
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Delete all history
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Export matching records as JSON
    Export {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Execute the history command.
pub async fn execute(config: Config, args: HistoryArgs) -> anyhow::Result<()> {
    let glimpse = super::open(config)?;
    let history = glimpse.db().history();

    match args.command {
        HistoryCommand::List {
            filter,
            page,
            page_size,
            json,
        } => {
            let page = history.list(&filter.query(page, page_size))?;
            if json {
                super::print_json(&page)?;
            } else {
                print_page(&page);
            }
        }

        HistoryCommand::Show {
            id,
            save_image,
            json,
        } => {
            let record = history
                .get(id)?
                .with_context(|| format!("History record {id} not found"))?;

            if let Some(path) = save_image {
                let uri = record.image.as_deref().context("Record has no stored image")?;
                let bytes = decode_data_uri(uri)?;
                std::fs::write(&path, bytes)?;
                report_ok(format!("Image written to {}", path.display()));
            }

            if json {
                super::print_json(&record)?;
            } else {
                eprintln!(
                    "{}",
                    dim().apply_to(format!(
                        "#{} · {} · {} · {} tokens · {} ms",
                        record.id,
                        record.created_at,
                        record.config_name,
                        record.tokens_used.unwrap_or_default(),
                        record.duration_ms.unwrap_or_default()
                    ))
                );
                eprintln!("{}", dim().apply_to(format!("Prompt: {}", record.prompt)));
                println!("{}", record.result);
            }
        }

        HistoryCommand::Delete { ids } => {
            let removed = history.delete_many(&ids)?;
            report_ok(format!("Deleted {removed} of {} records", ids.len()));
        }

        HistoryCommand::Clear { yes } => {
            let confirmed = yes
                || Confirm::with_theme(&glimpse_theme())
                    .with_prompt("Delete all recognition history?")
                    .default(false)
                    .interact()?;
            if confirmed {
                let removed = history.clear()?;
                report_ok(format!("Deleted {removed} records"));
            }
        }

        HistoryCommand::Export { filter, output } => {
            let records = history.export(&filter.query(1, 1))?;
            let json = serde_json::to_string_pretty(&records)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    report_ok(format!(
                        "Exported {} records to {}",
                        records.len(),
                        path.display()
                    ));
                }
                None => println!("{json}"),
            }
        }
    }

    Ok(())
}

fn print_page(page: &HistoryPage) {
    if page.records.is_empty() {
        eprintln!("{}", dim().apply_to("No history records."));
        return;
    }

    println!(
        "{:>5}  {:<19}  {:<16}  {:<28}  {}",
        "ID", "CREATED", "CONFIG", "PROMPT", "RESULT"
    );
    for record in &page.records {
        println!(
            "{:>5}  {:<19}  {:<16}  {:<28}  {}",
            record.id,
            record.created_at,
            super::preview(&record.config_name, 16),
            super::preview(&record.prompt, 28),
            super::preview(&record.result, 50),
        );
    }

    let pages = page.total.div_ceil(page.page_size as u64).max(1);
    eprintln!(
        "{}",
        dim().apply_to(format!(
            "Page {} of {} · {} records",
            page.page, pages, page.total
        ))
    );
}

/// Widen a bare date to the end of that day so the bound is inclusive.
fn end_of_day(date: &str) -> String {
    if date.len() == 10 {
        format!("{date} 23:59:59")
    } else {
        date.to_string()
    }
}

fn decode_data_uri(uri: &str) -> anyhow::Result<Vec<u8>> {
    use base64::Engine as _;

    let (_, payload) =
        glimpse_core::pipeline::parse_data_uri(uri).context("Stored image is not a data URI")?;
    Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_of_day() {
        assert_eq!(end_of_day("2024-05-01"), "2024-05-01 23:59:59");
        assert_eq!(end_of_day("2024-05-01 08:00:00"), "2024-05-01 08:00:00");
    }

    #[test]
    fn test_filter_query() {
        let filter = FilterArgs {
            config: Some(2),
            keyword: Some("cat".into()),
            since: None,
            until: Some("2024-05-01".into()),
        };
        let query = filter.query(3, 10);
        assert_eq!(query.page, 3);
        assert_eq!(query.config_id, Some(2));
        assert_eq!(query.end_date.as_deref(), Some("2024-05-01 23:59:59"));
    }

    #[test]
    fn test_decode_data_uri() {
        assert_eq!(decode_data_uri("data:image/png;base64,AQID").unwrap(), vec![1, 2, 3]);
        assert!(decode_data_uri("AQID").is_err());
    }
}
