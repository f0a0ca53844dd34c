//! The catalog value type: a snapshot of a monitored object's metadata and
//! digests at the time it was last observed.

use serde::{Deserialize, Serialize};

/// The detection mode that produced or last touched an [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMode {
    Scheduled,
    #[serde(rename = "real-time")]
    Realtime,
    Whodata,
}

impl DetectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMode::Scheduled => "scheduled",
            DetectionMode::Realtime => "real-time",
            DetectionMode::Whodata => "whodata",
        }
    }
}

/// What kind of object an [`Entry`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    File,
    Registry,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::File => "file",
            EntryType::Registry => "registry",
        }
    }
}

/// Catalog value. Uniquely identified by its absolute path (the path itself
/// is the catalog key, not stored redundantly here).
///
/// All string fields default to empty when the corresponding collection
/// option was not set, matching `fim_entry_data` in the source this engine's
/// behavior is modeled on: a probe always produces a fully-initialized
/// record, never a partially-populated one carried over from a prior probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub size: i64,
    pub perm: String,
    pub attributes: String,
    pub uid: String,
    pub gid: String,
    pub user_name: Option<String>,
    pub group_name: Option<String>,
    pub mtime: i64,
    pub inode: u64,
    pub dev: u64,
    pub hash_md5: String,
    pub hash_sha1: String,
    pub hash_sha256: String,
    pub checksum: String,
    pub mode: DetectionMode,
    pub options: u32,
    pub last_event: i64,
    pub entry_type: EntryType,
    /// Transient: true while being visited during a scan, cleared by the
    /// end-of-scan reconciliation sweep. Never observed true outside that
    /// window (invariant I4).
    #[serde(skip)]
    pub scanned: bool,
}

impl Entry {
    /// The canonical, colon-separated field concatenation used as the input
    /// to the checksum hash. Field order is load-bearing: it is part of the
    /// on-wire contract for anything that recomputes a checksum to verify
    /// round-tripping (testable property: round-trip checksum).
    pub fn canonical_checksum_input(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
            self.size,
            self.perm,
            self.attributes,
            self.uid,
            self.gid,
            self.user_name.as_deref().unwrap_or(""),
            self.group_name.as_deref().unwrap_or(""),
            self.mtime,
            self.inode,
            self.hash_md5,
            self.hash_sha1,
            self.hash_sha256,
        )
    }

    /// (dev, inode) pair suitable as an [`crate::catalog::InodeKey`], or
    /// `None` for entries that must never be indexed by inode (registry
    /// entries, or entries with inode 0).
    pub fn inode_key(&self) -> Option<(u64, u64)> {
        if self.entry_type == EntryType::Registry || self.inode == 0 {
            None
        } else {
            Some((self.dev, self.inode))
        }
    }
}
