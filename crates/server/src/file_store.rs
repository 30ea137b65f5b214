// Snapshot storage for the employee collection

use anyhow::{Context, Result};
use protocol::Employee;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

// Collection state as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCollection {
    // Records in collection order
    pub employees: Vec<Employee>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

// File store holding one JSON snapshot of the collection
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    // Create a file store, creating the parent directory if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create snapshot directory")?;
        }

        Ok(FileStore { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Save the collection to disk
    pub async fn save_collection(&self, employees: &[Employee]) -> Result<()> {
        let stored = StoredCollection {
            employees: employees.to_vec(),
            updated_at: chrono::Utc::now(),
        };
        let json =
            serde_json::to_string_pretty(&stored).context("Failed to serialize collection")?;

        // Write to temporary file first, then rename (atomic operation)
        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .context("Failed to create temp file")?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to write collection")?;

        file.sync_all().await.context("Failed to sync file")?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .await
            .context("Failed to rename temp file")?;

        tracing::debug!(
            "Saved {} employees to {}",
            stored.employees.len(),
            self.path.display()
        );
        Ok(())
    }

    // Load the collection from disk, None if no snapshot exists yet
    pub async fn load_collection(&self) -> Result<Option<StoredCollection>> {
        if !self.exists().await {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .await
            .context("Failed to read snapshot file")?;

        let stored: StoredCollection =
            serde_json::from_str(&contents).context("Failed to deserialize snapshot")?;

        tracing::debug!(
            "Loaded {} employees from {}",
            stored.employees.len(),
            self.path.display()
        );
        Ok(Some(stored))
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }
}
