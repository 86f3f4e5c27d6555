//! Forecaster status

use anyhow::Result;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use crate::client::ApiClient;
use crate::output::{
    color_error, color_status, format_temperature, format_timestamp, print_json, print_warning,
    short_checksum, OutputFormat,
};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last Success")]
    last_success: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show artifact, latest data and component health
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;

    if let OutputFormat::Json = format {
        return print_json(&status);
    }

    println!("{}", "Forecaster Status".bold());
    println!("{}", "=".repeat(50));
    println!("Health:          {}", color_status(&status.health.status));

    match &status.artifact {
        Some(artifact) => {
            println!("Model version:   {}", artifact.version.cyan());
            println!("Checksum:        {}", short_checksum(&artifact.checksum));
            println!("Saved at:        {}", format_timestamp(&artifact.saved_at));
        }
        None => println!("Model version:   {}", "none".yellow()),
    }

    let latest_reading = status
        .latest_reading
        .as_deref()
        .map(format_timestamp)
        .unwrap_or_else(|| "-".to_string());
    println!("Latest reading:  {}", latest_reading);

    if let Some(prediction) = &status.latest_prediction {
        println!(
            "Latest forecast: {} at {}",
            format_temperature(Some(prediction.predicted_value)),
            format_timestamp(&prediction.timestamp)
        );
        println!("Trailing MSE:    {}", color_error(prediction.error));
    }

    println!();
    if status.health.components.is_empty() {
        print_warning("No components registered");
        return Ok(());
    }

    let rows: Vec<ComponentRow> = status
        .health
        .components
        .iter()
        .map(|(name, health)| ComponentRow {
            name: name.clone(),
            status: color_status(&health.status),
            last_success: health
                .last_success
                .as_deref()
                .map(format_timestamp)
                .unwrap_or_else(|| "-".to_string()),
            message: health.message.clone().unwrap_or_default(),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()).to_string());

    Ok(())
}
