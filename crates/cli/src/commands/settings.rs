//! Stored CLI settings

use anyhow::Result;

use crate::config::Config;
use crate::output::{print_json, print_success};

/// Print the stored settings
pub fn show(config: &Config) -> Result<()> {
    print_json(config)
}

/// Update the stored settings and write them back
pub fn set(mut config: Config, api_url: Option<String>, history_limit: Option<usize>) -> Result<()> {
    if let Some(url) = api_url {
        url::Url::parse(&url)?;
        config.api_url = Some(url);
    }
    if history_limit.is_some() {
        config.history_limit = history_limit;
    }
    let path = config.save()?;
    print_success(&format!("Saved settings to {}", path.display()));
    Ok(())
}
