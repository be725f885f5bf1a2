use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::types::{Settings, ACTIVE_SCANS_KEY};

/// Persisted user settings plus the in-memory copy every cycle reads.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a concurrent loader sees either the old file or the new one.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    defaults: Settings,
    current: RwLock<Arc<Settings>>,
    /// Serialises writers so two saves never share the temp file.
    write_lock: Mutex<()>,
}

impl SettingsStore {
    /// Load persisted settings (or defaults) and keep them as the current copy.
    ///
    /// A missing file is created from the defaults. Failing to create it is
    /// logged; the store still serves the defaults.
    pub async fn open(path: impl Into<PathBuf>, defaults: Settings) -> Arc<Self> {
        let path = path.into();
        let existed = tokio::fs::try_exists(&path).await.unwrap_or(true);
        let store = Arc::new(Self {
            path,
            current: RwLock::new(Arc::new(defaults.clone())),
            defaults,
            write_lock: Mutex::new(()),
        });

        let loaded = store.load().await;
        info!(
            path = %store.path.display(),
            active = loaded.active_scans.len(),
            mute = loaded.mute,
            "Settings loaded",
        );
        if existed {
            *store.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(loaded);
        } else if store.save(loaded).await.is_ok() {
            info!(path = %store.path.display(), "Settings file created from defaults");
        }
        store
    }

    /// Read the persisted file. Missing or corrupt state yields the defaults.
    pub async fn load(&self) -> Settings {
        load_from(&self.path, &self.defaults).await
    }

    /// Consistent copy of the settings in effect.
    pub fn current(&self) -> Arc<Settings> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Persist `settings` atomically, then make them current.
    pub async fn save(&self, settings: Settings) -> Result<Arc<Settings>> {
        let _guard = self.write_lock.lock().await;
        self.persist_and_swap(settings).await
    }

    /// Read-modify-write against the current copy under the writer lock.
    pub async fn update<F>(&self, f: F) -> Result<Arc<Settings>>
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self.write_lock.lock().await;
        let mut next = (*self.current()).clone();
        f(&mut next);
        self.persist_and_swap(next).await
    }

    async fn persist_and_swap(&self, settings: Settings) -> Result<Arc<Settings>> {
        write_atomic(&self.path, &settings).await.map_err(|e| {
            warn!(path = %self.path.display(), "Settings save failed: {e}");
            e
        })?;
        let next = Arc::new(settings);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        Ok(next)
    }
}

async fn load_from(path: &Path, defaults: &Settings) -> Settings {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return defaults.clone(),
        Err(e) => {
            warn!(path = %path.display(), "Settings unreadable, using defaults: {e}");
            return defaults.clone();
        }
    };
    let mut value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), "Settings file corrupt, using defaults: {e}");
            return defaults.clone();
        }
    };
    if let Some(obj) = value.as_object_mut() {
        if !obj.contains_key(ACTIVE_SCANS_KEY) {
            warn!(path = %path.display(), "Settings file has no scan list, enabling the default scans");
            obj.insert(ACTIVE_SCANS_KEY.to_string(), serde_json::json!(defaults.active_scans));
        }
    }
    match serde_json::from_value::<Settings>(value) {
        Ok(mut settings) => {
            settings.normalize();
            settings
        }
        Err(e) => {
            warn!(path = %path.display(), "Settings file corrupt, using defaults: {e}");
            defaults.clone()
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_atomic(path: &Path, settings: &Settings) -> Result<()> {
    let body = serde_json::to_vec_pretty(settings)?;
    let tmp = temp_path(path);

    let write = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    };

    if let Err(e) = write.await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(AppError::Settings(format!(
            "failed to write {}: {e}",
            path.display()
        )));
    }
    Ok(())
}
