//! The `glimpse templates` command for prompt templates.

use anyhow::Context;
use clap::{Args, Subcommand};
use glimpse_core::store::{NewPromptTemplate, PromptTemplate, PromptTemplatePatch};
use glimpse_core::Config;

use super::theme::{dim, report_ok};

/// Arguments for the `templates` command.
#[derive(Args, Debug)]
pub struct TemplatesArgs {
    #[command(subcommand)]
    pub command: TemplatesCommand,
}

#[derive(Subcommand, Debug)]
pub enum TemplatesCommand {
    /// List all templates, default first
    List {
        #[arg(long)]
        json: bool,
    },

    /// List the most used templates
    Recent {
        /// Number of templates to show
        #[arg(short = 'n', long)]
        limit: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    /// Show one template's full prompt
    Show { id: i64 },

    /// Add a template
    Add {
        #[arg(long)]
        name: String,

        /// Prompt text
        #[arg(long)]
        content: String,

        /// Make this the default template
        #[arg(long)]
        default: bool,
    },

    /// Change a template's name or prompt
    Update {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        content: Option<String>,
    },

    /// Delete a template
    Remove { id: i64 },

    /// Make a template the default
    SetDefault { id: i64 },
}

/// Execute the templates command.
pub async fn execute(config: Config, args: TemplatesArgs) -> anyhow::Result<()> {
    let glimpse = super::open(config)?;
    let templates = glimpse.db().templates();

    match args.command {
        TemplatesCommand::List { json } => output(&templates.list()?, json)?,

        TemplatesCommand::Recent { limit, json } => output(&templates.recent(limit)?, json)?,

        TemplatesCommand::Show { id } => {
            let template = templates
                .get(id)?
                .with_context(|| format!("Prompt template {id} not found"))?;
            eprintln!(
                "{}",
                dim().apply_to(format!(
                    "#{} {} · used {} times",
                    template.id, template.name, template.use_count
                ))
            );
            println!("{}", template.content);
        }

        TemplatesCommand::Add {
            name,
            content,
            default,
        } => {
            let created = templates.create(NewPromptTemplate {
                name,
                content,
                is_default: default,
            })?;
            report_ok(format!("Saved template {} ({})", created.id, created.name));
        }

        TemplatesCommand::Update { id, name, content } => {
            let updated = templates.update(
                id,
                PromptTemplatePatch {
                    name,
                    content,
                    is_default: None,
                },
            )?;
            report_ok(format!("Updated template {}", updated.id));
        }

        TemplatesCommand::Remove { id } => {
            if !templates.delete(id)? {
                anyhow::bail!("Prompt template {id} not found");
            }
            report_ok(format!("Removed template {id}"));
        }

        TemplatesCommand::SetDefault { id } => {
            templates.set_default(id)?;
            report_ok(format!("Template {id} is now the default"));
        }
    }

    Ok(())
}

fn output(list: &[PromptTemplate], json: bool) -> anyhow::Result<()> {
    if json {
        return super::print_json(list);
    }

    println!("{:>4}  {:<24} {:>5}  {:<7}  {}", "ID", "NAME", "USES", "DEFAULT", "PROMPT");
    for template in list {
        println!(
            "{:>4}  {:<24} {:>5}  {:<7}  {}",
            template.id,
            super::preview(&template.name, 24),
            template.use_count,
            super::flag(template.is_default),
            super::preview(&template.content, 60),
        );
    }
    Ok(())
}
