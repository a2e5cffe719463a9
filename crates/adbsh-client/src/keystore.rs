//! File-based device key storage.
//!
//! One keypair per directory, stored as two sibling files:
//! - `private.key`: base64 of the 32-byte Ed25519 secret seed
//! - `public.key`: `<base64 public key> adbsh@<host>`
//!
//! Both files present and consistent means the pair is reused untouched.
//! Anything else (missing, partial, corrupt, mismatched) is treated as no key
//! and replaced wholesale by a freshly generated pair.

use std::fs;
use std::path::{Path, PathBuf};

use adbsh_core::{AdbError, AdbResult, KeyPair};

/// Default public key file name.
pub const PUBLIC_KEY_FILE: &str = "public.key";
/// Default private key file name.
pub const PRIVATE_KEY_FILE: &str = "private.key";

/// File-based key store rooted at one directory.
#[derive(Debug, Clone)]
pub struct KeyStore {
    base_dir: PathBuf,
    public_file: String,
    private_file: String,
}

impl KeyStore {
    /// Create a key store at the given directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            public_file: PUBLIC_KEY_FILE.to_string(),
            private_file: PRIVATE_KEY_FILE.to_string(),
        }
    }

    /// Create a key store at the default location (`~/.adbsh/`).
    pub fn default_location() -> AdbResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| AdbError::Other("cannot determine home directory".into()))?;
        Ok(Self::new(home.join(".adbsh")))
    }

    /// Override the key file names.
    pub fn with_file_names(mut self, public: impl Into<String>, private: impl Into<String>) -> Self {
        self.public_file = public.into();
        self.private_file = private.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.base_dir.join(&self.public_file)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.base_dir.join(&self.private_file)
    }

    /// Load the stored keypair.
    ///
    /// `Ok(None)` when either file is missing, `Err` when both exist but do
    /// not form a valid pair.
    pub fn load(&self) -> AdbResult<Option<KeyPair>> {
        let public_path = self.public_key_path();
        let private_path = self.private_key_path();
        if !public_path.exists() || !private_path.exists() {
            return Ok(None);
        }

        let private_text = fs::read_to_string(&private_path)?;
        let public_text = fs::read_to_string(&public_path)?;
        KeyPair::from_encoded(&private_text, &public_text).map(Some)
    }

    /// Return the stored keypair, generating and persisting a new one if the
    /// stored state is absent or unusable.
    ///
    /// Only key generation errors (`CryptoUnavailable`) and write failures
    /// are returned; load failures just trigger regeneration.
    pub fn load_or_create(&self) -> AdbResult<KeyPair> {
        match self.load() {
            Ok(Some(pair)) => {
                tracing::debug!(
                    dir = %self.base_dir.display(),
                    fingerprint = %pair.fingerprint(),
                    "loaded device key"
                );
                return Ok(pair);
            }
            Ok(None) => {
                tracing::info!(dir = %self.base_dir.display(), "no device key found, generating");
            }
            Err(e) => {
                tracing::warn!(
                    dir = %self.base_dir.display(),
                    "stored device key unusable ({}), regenerating",
                    e
                );
            }
        }

        let pair = KeyPair::generate()?;
        self.save(&pair)?;
        tracing::info!(fingerprint = %pair.fingerprint(), "device key generated");
        Ok(pair)
    }

    /// Write both key files, replacing whatever is there.
    pub fn save(&self, pair: &KeyPair) -> AdbResult<()> {
        self.ensure_dir()?;

        let private_path = self.private_key_path();
        fs::write(&private_path, format!("{}\n", pair.encode_private()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&private_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::write(
            self.public_key_path(),
            format!("{}\n", pair.encode_public(&key_comment())),
        )?;

        Ok(())
    }

    /// Ensure the key directory exists with owner-only permissions.
    fn ensure_dir(&self) -> AdbResult<()> {
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&self.base_dir, fs::Permissions::from_mode(0o700))?;
            }
        }
        Ok(())
    }
}

/// Comment appended to the public key: `adbsh@<host>`.
fn key_comment() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    format!("adbsh@{host}")
}
