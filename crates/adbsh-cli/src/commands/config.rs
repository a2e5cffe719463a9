//! `adbsh config`: print the effective configuration.

use anyhow::{Context, Result};

use crate::config::Config;

pub async fn run(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("failed to serialize config")?;
    print!("{rendered}");
    Ok(())
}
