use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use once_cell::sync::Lazy;

use crate::config::DEFAULT_CONFIG;

static PROJECT_DIRS: Lazy<Option<directories::ProjectDirs>> =
    Lazy::new(|| directories::ProjectDirs::from("com", "trustconf", "trustconf"));

// Without a home directory everything lives next to the working directory
pub static USER_DATA_PATH: Lazy<PathBuf> = Lazy::new(|| {
    PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".trustconf"))
});

pub static USER_CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".trustconf"))
});

pub static TRUST_STORE_PATH: Lazy<PathBuf> = Lazy::new(|| USER_DATA_PATH.join("cacerts.pem"));

pub static SETTINGS_PATH: Lazy<PathBuf> = Lazy::new(|| USER_CONFIG_PATH.join("config.toml"));

/// Creates the directories of both files and a default config if there is none.
/// The trust store itself is created on the first addition.
pub fn create_base_files(settings_path: &Path, store_path: &Path) -> anyhow::Result<()> {
    for parent in [settings_path.parent(), store_path.parent()].into_iter().flatten() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }

    if !settings_path.exists() {
        DEFAULT_CONFIG
            .save(settings_path)
            .context("Failed writing default config")?;
    }

    Ok(())
}
