//! Command implementations for the `glimpse` binary.

pub mod config;
pub mod history;
pub mod image;
pub mod providers;
pub mod recognize;
pub mod settings;
pub mod templates;
pub mod theme;

use glimpse_core::{Config, Glimpse};
use serde::Serialize;

/// Open the database and dispatcher for a command.
pub fn open(config: Config) -> anyhow::Result<Glimpse> {
    Ok(Glimpse::open(config)?)
}

/// Pretty-print a value as JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render a boolean flag as a check mark for table output.
pub fn flag(value: bool) -> &'static str {
    if value {
        "✓"
    } else {
        ""
    }
}

/// Shorten text to `max` characters on one line, for listings.
pub fn preview(text: &str, max: usize) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() <= max {
        return line;
    }
    let cut: String = line.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_collapses_and_truncates() {
        assert_eq!(preview("a\n  b", 10), "a b");
        assert_eq!(preview("abcdefghij", 5), "abcd…");
        assert_eq!(preview("héllo wörld", 20), "héllo wörld");
    }
}
