//! CLI configuration utilities

use anyhow::{Context, Result, bail};
use harvest_core::ClientConfig;
use std::path::Path;

/// Load configuration from defaults, the optional file and `HARVEST_*` variables
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let config = ClientConfig::load(path).with_context(|| match path {
        Some(path) => format!("failed to load configuration from {}", path.display()),
        None => "failed to load configuration".to_string(),
    })?;
    Ok(config)
}

/// Generate a default configuration file
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn generate_default_config<P: AsRef<Path>>(path: P, force: bool) -> Result<()> {
    let path = path.as_ref();
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    ClientConfig::default().save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("harvest.toml");

        generate_default_config(&path, false).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.refresh_url, ClientConfig::default().refresh_url);

        assert!(generate_default_config(&path, false).is_err());
        generate_default_config(&path, true).unwrap();
    }
}
