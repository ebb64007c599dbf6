//! Prompt theme and shared output styles.

use console::{style, Style};
use dialoguer::theme::ColorfulTheme;

/// `ColorfulTheme` with Glimpse's prompt glyphs, drawn on stderr.
pub fn glimpse_theme() -> ColorfulTheme {
    ColorfulTheme {
        prompt_prefix: style("?".to_string()).for_stderr().cyan(),
        prompt_style: Style::new().for_stderr().bold(),
        prompt_suffix: style("›".to_string()).for_stderr().bright().black(),
        success_prefix: style("✓".to_string()).for_stderr().green(),
        error_prefix: style("✗".to_string()).for_stderr().red(),
        error_style: Style::new().for_stderr().red(),
        values_style: Style::new().for_stderr().green(),
        ..ColorfulTheme::default()
    }
}

pub fn dim() -> Style {
    Style::new().for_stderr().dim()
}

pub fn success() -> Style {
    Style::new().for_stderr().green()
}

pub fn failure() -> Style {
    Style::new().for_stderr().red()
}

/// Print a green status line to stderr.
pub fn report_ok(message: impl std::fmt::Display) {
    eprintln!("{} {message}", success().apply_to("✓"));
}

/// Print a red status line to stderr.
pub fn report_err(message: impl std::fmt::Display) {
    eprintln!("{} {message}", failure().apply_to("✗"));
}
