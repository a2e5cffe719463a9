//! `adbsh keygen`: load or create the device key pair.
//!
//! Reuses a valid stored pair; otherwise generates a fresh Ed25519 pair and
//! writes `public.key` / `private.key` into the key directory.

use std::path::Path;

use adbsh_client::KeyStore;
use anyhow::{Context, Result};
use tracing::info;

pub async fn run(dir: &Path) -> Result<()> {
    let store = KeyStore::new(dir);
    let pair = store
        .load_or_create()
        .with_context(|| format!("failed to prepare device key in {}", dir.display()))?;

    let fingerprint = pair.fingerprint();
    info!(dir = %dir.display(), fingerprint = %fingerprint, "device key ready");

    println!("Device key in {}", dir.display());
    println!("  Fingerprint: {}", adbsh_core::short_fingerprint(&fingerprint, 16));
    println!("  Public key:  {}", pair.public_key_base64());

    Ok(())
}
