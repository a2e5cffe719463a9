//! CLI subcommand implementations.

pub mod config;
pub mod fingerprint;
pub mod keygen;
pub mod ping;
pub mod pubkey;

use std::path::Path;

use adbsh_client::{KeyPair, KeyStore};
use anyhow::{bail, Context, Result};

/// Load the stored keypair without generating one.
pub(crate) fn load_existing(dir: &Path) -> Result<(KeyStore, KeyPair)> {
    let store = KeyStore::new(dir);
    let pair = store
        .load()
        .with_context(|| format!("stored key in {} is unusable", dir.display()))?;
    match pair {
        Some(pair) => Ok((store, pair)),
        None => bail!(
            "no device key in {}. Run `adbsh keygen` to create one.",
            dir.display()
        ),
    }
}
