//! TOML parser with helpful error messages

use super::settings::Settings;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse mcphub.toml with detailed error messages
pub fn parse_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

    parse_settings_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}

/// Parse mcphub.toml content from string
pub fn parse_settings_str(content: &str) -> Result<Settings> {
    let settings: Settings =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    settings.validate()?;

    Ok(settings)
}

/// Attach the offending lines to a TOML error.
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();

    let line_num = error
        .span()
        .map(|span| content[..span.start.min(content.len())].matches('\n').count() + 1);

    match line_num {
        Some(line_num) => anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num,
            line_context(content, line_num),
            message
        ),
        None => anyhow::anyhow!("TOML parsing error: {}", message),
    }
}

fn line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize settings to a TOML string
pub fn to_toml(settings: &Settings) -> Result<String> {
    toml::to_string_pretty(settings).with_context(|| "Failed to serialize settings to TOML")
}
