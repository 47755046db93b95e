//! Process configuration from environment variables.

use anyhow::{Context, Result, ensure};
use std::path::PathBuf;

/// Required settings for a sync process.
///
/// Both values come from the environment (after `dotenvy` has loaded any
/// `.env` file); a missing variable is a startup failure, never a runtime
/// one.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory whose contents are mirrored into the secret.
    pub source_dir: PathBuf,
    /// Name of the secret object to create or update.
    pub secret_name: String,
}

impl Config {
    /// Reads `folder_to_read` and `secret_to_write` from the environment.
    pub fn from_env() -> Result<Self> {
        let source_dir = std::env::var("folder_to_read")
            .context("folder_to_read environment variable is required")?;
        let secret_name = std::env::var("secret_to_write")
            .context("secret_to_write environment variable is required")?;
        Self::new(source_dir, secret_name)
    }

    /// Validates the settings: the directory must exist and be a directory,
    /// and the secret name must be non-empty.
    pub fn new(source_dir: impl Into<PathBuf>, secret_name: impl Into<String>) -> Result<Self> {
        let source_dir = source_dir.into();
        let secret_name = secret_name.into();

        ensure!(!secret_name.is_empty(), "secret name must not be empty");

        let meta = std::fs::metadata(&source_dir)
            .with_context(|| format!("cannot access folder {}", source_dir.display()))?;
        ensure!(
            meta.is_dir(),
            "{} exists but is not a directory",
            source_dir.display()
        );

        Ok(Self {
            source_dir,
            secret_name,
        })
    }
}
