//! Configuration management command handlers
use anyhow::Result;
use std::path::{Path, PathBuf};
use studyguard_core::config::default_config_path;
use studyguard_core::GuardConfig;

use super::helpers::load_config;

fn resolve(path: Option<&Path>) -> Result<PathBuf> {
    path.map_or_else(default_config_path, |p| Ok(p.to_path_buf()))
}

pub fn handle_config_show(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

pub fn handle_config_validate(path: Option<&Path>) -> Result<()> {
    let resolved = resolve(path)?;
    load_config(Some(&resolved))?;
    println!("Configuration OK: {}", resolved.display());
    Ok(())
}

pub fn handle_config_path(path: Option<&Path>) -> Result<()> {
    let resolved = resolve(path)?;
    let state = if resolved.exists() { "" } else { " (not created yet)" };
    println!("{}{state}", resolved.display());
    Ok(())
}

pub fn handle_config_init(path: Option<&Path>, force: bool) -> Result<()> {
    let resolved = resolve(path)?;
    if resolved.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            resolved.display()
        );
    }
    GuardConfig::default().save(&resolved)?;
    println!("Wrote default configuration to {}", resolved.display());
    Ok(())
}
