use std::path::Path;

use anyhow::{Context, Result};

use crate::models::ProfileData;

/// Parses a profile data source into [`ProfileData`].
///
/// Implementations must be side-effect free: the store decides what happens
/// to its cache when a load fails.
pub trait ProfileLoader: Send + Sync {
    /// File extension (without the dot) of data sources this loader understands.
    fn extension(&self) -> &str;

    fn load(&self, path: &Path) -> Result<ProfileData>;
}

/// Loads `<input>/<id>.json` files.
pub struct JsonProfileLoader;

impl ProfileLoader for JsonProfileLoader {
    fn extension(&self) -> &str {
        "json"
    }

    fn load(&self, path: &Path) -> Result<ProfileData> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let data: ProfileData =
            serde_json::from_str(&raw).context("malformed profile data")?;
        if data.name.trim().is_empty() {
            anyhow::bail!("profile name must not be empty");
        }
        Ok(data)
    }
}
