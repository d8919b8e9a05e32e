//! Incremental cursors: the last processed item id per (source, consumer).

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{domain::ItemId, Result};

pub trait CursorStore: Send + Sync {
    fn get(&self, key: &str) -> Option<ItemId>;

    /// Record `id` as processed. Call only after the item was delivered.
    fn set(&self, key: &str, id: ItemId) -> Result<()>;

    /// Manual reset; the next fetch for `key` is unbounded.
    fn reset(&self, key: &str) -> Result<()>;
}

/// Cursor key for a (source, consumer) pair.
pub fn cursor_key(source: &str, consumer: &str) -> String {
    format!("{source}=>{consumer}")
}

/// Move the cursor forward to `id`. Never moves it backward.
///
/// Returns `Ok(true)` if the stored value changed.
pub fn advance(store: &dyn CursorStore, key: &str, id: ItemId) -> Result<bool> {
    if store.get(key).is_some_and(|cur| cur >= id) {
        return Ok(false);
    }
    store.set(key, id)?;
    Ok(true)
}

#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<BTreeMap<String, ItemId>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn get(&self, key: &str) -> Option<ItemId> {
        self.cursors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }

    fn set(&self, key: &str, id: ItemId) -> Result<()> {
        self.cursors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), id);
        Ok(())
    }

    fn reset(&self, key: &str) -> Result<()> {
        self.cursors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Cursor store persisted as a JSON object `{ "<key>": <id>, ... }`.
///
/// Writes go to a sibling temp file that is renamed over the target. The
/// in-memory view only changes once the write succeeded, so a failed persist
/// leaves the last known-good cursor in place.
#[derive(Debug)]
pub struct JsonFileCursorStore {
    path: PathBuf,
    cursors: Mutex<BTreeMap<String, ItemId>>,
}

impl JsonFileCursorStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cursors = load_cursor_file(&path)?;
        Ok(Self {
            path,
            cursors: Mutex::new(cursors),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_with(&self, change: impl FnOnce(&mut BTreeMap<String, ItemId>)) -> Result<()> {
        let mut guard = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = guard.clone();
        change(&mut next);
        save_cursor_file(&self.path, &next)?;
        *guard = next;
        Ok(())
    }
}

impl CursorStore for JsonFileCursorStore {
    fn get(&self, key: &str) -> Option<ItemId> {
        self.cursors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }

    fn set(&self, key: &str, id: ItemId) -> Result<()> {
        self.write_with(|m| {
            m.insert(key.to_string(), id);
        })
    }

    fn reset(&self, key: &str) -> Result<()> {
        self.write_with(|m| {
            m.remove(key);
        })
    }
}

fn load_cursor_file(path: &Path) -> Result<BTreeMap<String, ItemId>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let txt = fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&txt)?)
}

fn save_cursor_file(path: &Path, cursors: &BTreeMap<String, ItemId>) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, serde_json::to_string_pretty(cursors)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
