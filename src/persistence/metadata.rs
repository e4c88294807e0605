use crate::domain::Screen;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// App metadata stored in meta.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub last_screen: Screen,
    /// Task ids the user picked for the Today bucket, in queue order
    #[serde(default)]
    pub today_task_ids: Vec<String>,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            last_screen: Screen::Capture,
            today_task_ids: Vec::new(),
        }
    }
}

/// Load app metadata from meta.json file
pub fn load_metadata<P: AsRef<Path>>(path: P) -> Result<AppMetadata> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(AppMetadata::default());
    }

    let content = std::fs::read_to_string(path)?;
    let metadata: AppMetadata = serde_json::from_str(&content)?;
    Ok(metadata)
}

/// Save app metadata to meta.json file
pub fn save_metadata<P: AsRef<Path>>(path: P, metadata: &AppMetadata) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata)?;
    crate::persistence::atomic_write(path, &json)?;
    Ok(())
}
