//! `PathCatalog` (C1) and `InodeIndex` (C2), modeled as a single data
//! structure behind one lock per the design note in the engine's
//! specification ("two coordinated maps with a combined lock"): exposing a
//! bare pair of independently-lockable maps would let a caller update one
//! without the other and violate the inode invariant (I2).

use crate::entry::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

pub type InodeKey = (u64, u64);

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("path already present in catalog: {0}")]
    Duplicate(String),
    #[error("path not present in catalog: {0}")]
    Missing(String),
}

#[derive(Default)]
struct CatalogInner {
    paths: BTreeMap<String, Entry>,
    inodes: BTreeMap<InodeKey, BTreeSet<String>>,
}

impl CatalogInner {
    fn index_add(&mut self, key: InodeKey, path: &str) {
        self.inodes
            .entry(key)
            .or_default()
            .insert(path.to_string());
    }

    fn index_remove(&mut self, key: InodeKey, path: &str) {
        if let Some(set) = self.inodes.get_mut(&key) {
            set.remove(path);
            if set.is_empty() {
                self.inodes.remove(&key);
            }
        }
    }
}

/// Combined path catalog (C1) and inode index (C2). A single
/// [`std::sync::Mutex`] protects both maps as one unit so every mutation
/// that touches the inode index also keeps the path map consistent,
/// preserving invariant I2 (path <-> inode-index set membership) and I5
/// (no empty inode-index entries).
pub struct Catalog {
    inner: Mutex<CatalogInner>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            inner: Mutex::new(CatalogInner::default()),
        }
    }

    /// C1::get
    pub fn get(&self, path: &str) -> Option<Entry> {
        self.inner.lock().unwrap().paths.get(path).cloned()
    }

    /// C1::insert. Fails if the path is already present.
    pub fn insert(&self, path: &str, entry: Entry) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.paths.contains_key(path) {
            return Err(CatalogError::Duplicate(path.to_string()));
        }
        if let Some(key) = entry.inode_key() {
            inner.index_add(key, path);
        }
        inner.paths.insert(path.to_string(), entry);
        Ok(())
    }

    /// C1::replace. Fails if the path is not present. Keeps C2 consistent
    /// when the inode key changes between the old and new entry.
    pub fn replace(&self, path: &str, entry: Entry) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        let old = inner
            .paths
            .get(path)
            .cloned()
            .ok_or_else(|| CatalogError::Missing(path.to_string()))?;

        if old.inode_key() != entry.inode_key() {
            if let Some(old_key) = old.inode_key() {
                inner.index_remove(old_key, path);
            }
            if let Some(new_key) = entry.inode_key() {
                inner.index_add(new_key, path);
            }
        }
        inner.paths.insert(path.to_string(), entry);
        Ok(())
    }

    /// Insert-or-replace in a single atomic step, as recommended by the
    /// engine's combined-lock design note. This is the operation the
    /// walker and realtime/whodata intakes actually use.
    pub fn upsert(&self, path: &str, entry: Entry) {
        let mut inner = self.inner.lock().unwrap();
        let old_key = inner.paths.get(path).and_then(Entry::inode_key);
        let new_key = entry.inode_key();
        if old_key != new_key {
            if let Some(k) = old_key {
                inner.index_remove(k, path);
            }
            if let Some(k) = new_key {
                inner.index_add(k, path);
            }
        }
        inner.paths.insert(path.to_string(), entry);
    }

    /// C1::delete. Also removes the path from C2 if present there.
    pub fn delete(&self, path: &str) -> Option<Entry> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.paths.remove(path);
        if let Some(entry) = &removed
            && let Some(key) = entry.inode_key()
        {
            inner.index_remove(key, path);
        }
        removed
    }

    /// C1::snapshot_keys. A consistent, deterministically ordered copy
    /// taken under the catalog lock; later mutations do not affect it.
    pub fn snapshot_keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().paths.keys().cloned().collect()
    }

    /// C2::paths. Returns the set of paths sharing a (dev, inode) pair.
    pub fn paths_for_inode(&self, key: InodeKey) -> BTreeSet<String> {
        self.inner
            .lock()
            .unwrap()
            .inodes
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{DetectionMode, EntryType};

    fn entry(inode: u64, dev: u64) -> Entry {
        Entry {
            size: 0,
            perm: String::new(),
            attributes: String::new(),
            uid: String::new(),
            gid: String::new(),
            user_name: None,
            group_name: None,
            mtime: 0,
            inode,
            dev,
            hash_md5: String::new(),
            hash_sha1: String::new(),
            hash_sha256: String::new(),
            checksum: String::new(),
            mode: DetectionMode::Scheduled,
            options: 0,
            last_event: 0,
            entry_type: EntryType::File,
            scanned: false,
        }
    }

    #[test]
    fn insert_adds_to_inode_index() {
        let cat = Catalog::new();
        cat.insert("/a", entry(42, 1)).unwrap();
        assert_eq!(cat.paths_for_inode((1, 42)), BTreeSet::from(["/a".to_string()]));
    }

    #[test]
    fn insert_duplicate_path_fails() {
        let cat = Catalog::new();
        cat.insert("/a", entry(1, 1)).unwrap();
        assert!(matches!(
            cat.insert("/a", entry(1, 1)),
            Err(CatalogError::Duplicate(_))
        ));
    }

    #[test]
    fn hard_links_share_one_inode_index_entry() {
        let cat = Catalog::new();
        cat.insert("/a", entry(42, 1)).unwrap();
        cat.insert("/b", entry(42, 1)).unwrap();
        let paths = cat.paths_for_inode((1, 42));
        assert_eq!(paths.len(), 2);
        assert!(paths.contains("/a") && paths.contains("/b"));
    }

    #[test]
    fn delete_drops_empty_inode_index_key() {
        let cat = Catalog::new();
        cat.insert("/a", entry(42, 1)).unwrap();
        cat.delete("/a");
        assert!(cat.paths_for_inode((1, 42)).is_empty());
        assert!(cat.get("/a").is_none());
    }

    #[test]
    fn delete_keeps_inode_index_entry_for_remaining_hard_link() {
        let cat = Catalog::new();
        cat.insert("/a", entry(42, 1)).unwrap();
        cat.insert("/b", entry(42, 1)).unwrap();
        cat.delete("/a");
        assert_eq!(cat.paths_for_inode((1, 42)), BTreeSet::from(["/b".to_string()]));
    }

    #[test]
    fn upsert_moves_path_between_inode_keys() {
        let cat = Catalog::new();
        cat.insert("/a", entry(1, 1)).unwrap();
        cat.upsert("/a", entry(2, 1));
        assert!(cat.paths_for_inode((1, 1)).is_empty());
        assert_eq!(cat.paths_for_inode((1, 2)), BTreeSet::from(["/a".to_string()]));
    }

    #[test]
    fn registry_entries_never_touch_inode_index() {
        let cat = Catalog::new();
        let mut e = entry(7, 3);
        e.entry_type = EntryType::Registry;
        cat.insert("/reg/key", e).unwrap();
        assert!(cat.paths_for_inode((3, 7)).is_empty());
    }

    #[test]
    fn snapshot_keys_is_sorted_and_stable() {
        let cat = Catalog::new();
        cat.insert("/b", entry(1, 1)).unwrap();
        cat.insert("/a", entry(2, 1)).unwrap();
        let keys = cat.snapshot_keys();
        assert_eq!(keys, vec!["/a".to_string(), "/b".to_string()]);
        cat.insert("/c", entry(3, 1)).unwrap();
        assert_eq!(keys, vec!["/a".to_string(), "/b".to_string()]);
    }
}
