//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M").to_string()
    } else {
        ts.to_string()
    }
}

/// Format a temperature in degrees Celsius
pub fn format_temperature(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2} °C", v),
        None => "-".to_string(),
    }
}

/// Format the trailing squared error
pub fn format_error(error: Option<f64>) -> String {
    match error {
        Some(e) => format!("{:.4}", e),
        None => "-".to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color the trailing error: green below 1, yellow below 4, red above
pub fn color_error(error: Option<f64>) -> String {
    let formatted = format_error(error);
    match error {
        Some(e) if e < 1.0 => formatted.green().to_string(),
        Some(e) if e < 4.0 => formatted.yellow().to_string(),
        Some(_) => formatted.red().to_string(),
        None => formatted,
    }
}

/// Shorten a hex checksum for display
pub fn short_checksum(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp("2024-03-01T05:00:00Z"), "2024-03-01 05:00");
        assert_eq!(format_timestamp("garbage"), "garbage");
    }

    #[test]
    fn test_format_temperature() {
        assert_eq!(format_temperature(Some(12.345)), "12.35 °C");
        assert_eq!(format_temperature(None), "-");
    }

    #[test]
    fn test_format_error() {
        assert_eq!(format_error(Some(2.8325)), "2.8325");
        assert_eq!(format_error(None), "-");
    }

    #[test]
    fn test_short_checksum() {
        assert_eq!(short_checksum("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_checksum("abc"), "abc");
    }
}
