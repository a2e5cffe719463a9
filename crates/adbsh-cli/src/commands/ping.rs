//! `adbsh ping`: check that the configured device port accepts connections.

use adbsh_client::session::{check_reachable, ConnectOptions};
use anyhow::{Context, Result};

pub async fn run(options: &ConnectOptions) -> Result<()> {
    let peer = check_reachable(options)
        .await
        .with_context(|| format!("device at {} is not reachable", options.addr()))?;
    println!("{} reachable ({})", options.addr(), peer);
    Ok(())
}
