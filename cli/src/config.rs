use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Base URL of a `stride serve` instance to sync against instead of the
/// local database.
pub const REMOTE_ENV: &str = "STRIDE_REMOTE";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub remote: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "stride").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("stride.db");
        let remote = remote_from(std::env::var(REMOTE_ENV).ok());

        Ok(Config {
            db_path,
            data_dir,
            remote,
        })
    }
}

fn remote_from(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
