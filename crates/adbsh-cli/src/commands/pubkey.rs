//! `adbsh pubkey`: print the stored public key line.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub async fn run(dir: &Path) -> Result<()> {
    let (store, _pair) = super::load_existing(dir)?;
    let line = fs::read_to_string(store.public_key_path())
        .with_context(|| format!("failed to read {}", store.public_key_path().display()))?;
    println!("{}", line.trim_end());
    Ok(())
}
