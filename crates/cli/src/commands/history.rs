//! Forecast history and latest prediction

use anyhow::{Context, Result};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use crate::client::{ApiClient, HistoryRow};
use crate::output::{
    color_error, format_temperature, format_timestamp, print_info, print_json, print_success,
    print_warning, OutputFormat,
};

/// Row for the history table
#[derive(Tabled)]
struct HistoryTableRow {
    #[tabled(rename = "Hour (UTC)")]
    timestamp: String,
    #[tabled(rename = "Observed")]
    value: String,
    #[tabled(rename = "Predicted")]
    predicted_value: String,
    #[tabled(rename = "Trailing MSE")]
    error: String,
}

impl From<&HistoryRow> for HistoryTableRow {
    fn from(row: &HistoryRow) -> Self {
        Self {
            timestamp: format_timestamp(&row.timestamp),
            value: format_temperature(row.value),
            predicted_value: format_temperature(row.predicted_value),
            error: color_error(row.error),
        }
    }
}

/// Show readings joined with predictions
pub async fn show_history(
    client: &ApiClient,
    limit: Option<usize>,
    output: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let history = client.history(limit).await?;

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&history)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path))?;
        print_success(&format!("Exported {} rows to {}", history.total, path));
        return Ok(());
    }

    match format {
        OutputFormat::Json => print_json(&history)?,
        OutputFormat::Table => {
            if history.rows.is_empty() {
                print_warning("No readings or predictions stored yet");
                return Ok(());
            }

            let rows: Vec<HistoryTableRow> = history.rows.iter().map(HistoryTableRow::from).collect();
            println!("{}", Table::new(rows).with(Style::rounded()).to_string());
            println!("\nTotal: {} rows", history.total);
        }
    }

    Ok(())
}

/// Show the most recent prediction
pub async fn show_latest(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let Some(prediction) = client.latest_prediction().await? else {
        print_warning("No prediction has been made yet");
        print_info("Predictions start once a model has been trained.");
        return Ok(());
    };

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => {
            println!("{}", "Latest Prediction".bold());
            println!("{}", "=".repeat(40));
            println!("Hour (UTC):    {}", format_timestamp(&prediction.timestamp).cyan());
            println!(
                "Predicted:     {}",
                format_temperature(Some(prediction.predicted_value)).bold()
            );
            println!("Trailing MSE:  {}", color_error(prediction.error));
        }
    }

    Ok(())
}
