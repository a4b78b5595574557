use super::{KvStore, StorageArea, StorageError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Store that keeps the sync and local areas as JSON files in a directory.
/// The session area only lives as long as the process.
pub struct FileStore {
    dir: PathBuf,
    // Serializes read-modify-write of the backing files within this process.
    lock: Mutex<()>,
    session: Mutex<Map<String, Value>>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
            session: Mutex::new(Map::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, area: StorageArea) -> PathBuf {
        self.dir.join(format!("{}.json", area.name()))
    }

    async fn read_area(&self, area: StorageArea) -> Result<Map<String, Value>, StorageError> {
        let path = self.path_for(area);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&text).map_err(|source| StorageError::Corrupt {
            area: area.name(),
            source,
        })
    }

    async fn write_area(&self, area: StorageArea, values: &Map<String, Value>) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let text = serde_json::to_string_pretty(values)?;
        let path = self.path_for(area);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &path).await?;
        log::debug!("Wrote {} storage to {}", area.name(), path.display());
        Ok(())
    }
}

fn pick(values: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| values.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        if area == StorageArea::Session {
            return Ok(pick(&*self.session.lock().await, keys));
        }
        let _guard = self.lock.lock().await;
        let values = self.read_area(area).await?;
        Ok(pick(&values, keys))
    }

    async fn set(&self, area: StorageArea, items: Map<String, Value>) -> Result<(), StorageError> {
        if area == StorageArea::Session {
            self.session.lock().await.extend(items);
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut values = self.read_area(area).await?;
        values.extend(items);
        self.write_area(area, &values).await
    }

    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError> {
        if area == StorageArea::Session {
            let mut session = self.session.lock().await;
            for key in keys {
                session.remove(*key);
            }
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut values = self.read_area(area).await?;
        for key in keys {
            values.remove(*key);
        }
        self.write_area(area, &values).await
    }
}
