//! `adbsh fingerprint`: print the full SHA-256 fingerprint of the stored key.

use std::path::Path;

use anyhow::Result;

pub async fn run(dir: &Path) -> Result<()> {
    let (_store, pair) = super::load_existing(dir)?;
    println!("{}", pair.fingerprint());
    Ok(())
}
