//! Owned-card store kept in memory, optionally mirrored to a JSON file.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use cardrag_core::{OwnedCardSet, OwnedCardStore};

#[derive(Debug, Default)]
pub struct MemoryCardStore {
    users: RwLock<BTreeMap<String, OwnedCardSet>>,
    path: Option<PathBuf>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted at `path`; existing contents are loaded.
    pub fn open(path: &Path) -> Result<Self> {
        let users = if path.exists() {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        info!(path = %path.display(), users = users.len(), "owned-card store opened");
        Ok(Self { users: RwLock::new(users), path: Some(path.to_path_buf()) })
    }

    fn persist(&self, users: &BTreeMap<String, OwnedCardSet>) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(users)?)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "owned-card store saved");
        Ok(())
    }

    /// Applies `f` to a copy of the map; the copy replaces the live map only
    /// after it has been saved.
    fn update<T>(&self, f: impl FnOnce(&mut BTreeMap<String, OwnedCardSet>) -> T) -> Result<T> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = users.clone();
        let out = f(&mut next);
        self.persist(&next).context("saving owned cards")?;
        *users = next;
        Ok(out)
    }
}

impl OwnedCardStore for MemoryCardStore {
    fn add(&self, user: &str, card: &str) -> Result<bool> {
        self.update(|users| users.entry(user.to_string()).or_default().insert(card.to_string()))
    }

    fn remove(&self, user: &str, card: &str) -> Result<bool> {
        self.update(|users| {
            let removed = users.get_mut(user).is_some_and(|set| set.remove(card));
            if users.get(user).is_some_and(|set| set.is_empty()) {
                users.remove(user);
            }
            removed
        })
    }

    fn list(&self, user: &str) -> Result<OwnedCardSet> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(user).cloned().unwrap_or_default())
    }

    fn clear(&self, user: &str) -> Result<usize> {
        self.update(|users| users.remove(user).map_or(0, |set| set.len()))
    }

    fn count(&self, user: &str) -> Result<usize> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(user).map_or(0, |set| set.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_clear() {
        let store = MemoryCardStore::new();
        assert!(store.add("u1", "國泰CUBE卡").unwrap());
        assert!(!store.add("u1", "國泰CUBE卡").unwrap());
        assert!(store.add("u1", "台新Richart卡").unwrap());
        assert_eq!(store.count("u1").unwrap(), 2);
        assert_eq!(store.count("u2").unwrap(), 0);
        assert!(store.remove("u1", "國泰CUBE卡").unwrap());
        assert!(!store.remove("u1", "國泰CUBE卡").unwrap());
        assert_eq!(store.clear("u1").unwrap(), 1);
        assert!(store.list("u1").unwrap().is_empty());
    }

    #[test]
    fn persists_across_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("owned.json");
        {
            let store = MemoryCardStore::open(&path).unwrap();
            store.add("alice", "滙豐匯鑽卡").unwrap();
            store.add("alice", "國泰CUBE卡").unwrap();
        }
        let store = MemoryCardStore::open(&path).unwrap();
        let cards: Vec<String> = store.list("alice").unwrap().into_iter().collect();
        assert_eq!(cards, vec!["國泰CUBE卡".to_string(), "滙豐匯鑽卡".to_string()]);
    }

    #[test]
    fn failed_save_leaves_cards_unchanged() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let store = MemoryCardStore::open(&blocker.join("owned.json")).unwrap();

        assert!(store.add("u", "國泰CUBE卡").is_err());
        assert!(store.list("u").unwrap().is_empty());
        assert_eq!(store.count("u").unwrap(), 0);
        // a retry still reports a new card, not a duplicate
        assert!(store.add("u", "國泰CUBE卡").is_err());
        assert!(store.list("u").unwrap().is_empty());
    }

    #[test]
    fn failed_save_keeps_previous_state() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        let path = dir.join("owned.json");
        let store = MemoryCardStore::open(&path).unwrap();
        store.add("u", "國泰CUBE卡").unwrap();

        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::write(&dir, b"x").unwrap();
        assert!(store.remove("u", "國泰CUBE卡").is_err());
        assert!(store.clear("u").is_err());
        assert_eq!(store.count("u").unwrap(), 1);
    }
}
