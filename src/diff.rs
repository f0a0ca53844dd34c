//! `DiffEngine` (C7): given old/new entries, produces a changed-field set
//! and a structured event, or `None` when there is nothing to report.
//! Grounded in `fim_json_compare_attrs` (per-field changed-attribute
//! construction, gated by the old entry's option bits) and
//! `fim_json_event` (event assembly and the `CHECK_SEECHANGES` first-backup
//! side effect).

use crate::config::OptionFlags;
use crate::entry::Entry;
use crate::event::{AttributeProjection, AuditInfo, ChangeEventData, ChangeKind};

/// Externally owned textual content-diff storage. Only `add_file` and
/// `diff_for` are consumed; everything else about how diffs are produced,
/// retained, or expired is the collaborator's concern.
pub trait ContentDiffStore: Send + Sync {
    /// Seeds or updates stored content for `path`; returns the diff against
    /// the previously stored content, if any existed.
    fn add_file(&self, path: &str, contents: &[u8]) -> Option<String>;
    fn diff_for(&self, path: &str) -> Option<String>;
}

/// Returns the set of field names that differ between `old` and `new`,
/// gated by the option bits recorded on `old` at the time it was
/// collected. `inode` is only ever reported on POSIX platforms.
/// `user_name`/`group_name` are compared only when both sides are
/// non-null.
pub fn changed_attributes(old: &Entry, new: &Entry) -> Vec<String> {
    let opts = OptionFlags::from_bits(old.options);
    let mut changed = Vec::new();

    if opts.check_size() && old.size != new.size {
        changed.push("size".to_string());
    }
    if opts.check_perm() && old.perm != new.perm {
        changed.push("permission".to_string());
    }
    if opts.check_owner() && old.uid != new.uid {
        changed.push("uid".to_string());
    }
    if opts.check_group() && old.gid != new.gid {
        changed.push("gid".to_string());
    }
    if let (Some(old_name), Some(new_name)) = (&old.user_name, &new.user_name)
        && opts.check_owner()
        && old_name != new_name
    {
        changed.push("user_name".to_string());
    }
    if let (Some(old_name), Some(new_name)) = (&old.group_name, &new.group_name)
        && opts.check_group()
        && old_name != new_name
    {
        changed.push("group_name".to_string());
    }
    if opts.check_mtime() && old.mtime != new.mtime {
        changed.push("mtime".to_string());
    }
    if opts.check_inode() && cfg!(unix) && old.inode != new.inode {
        changed.push("inode".to_string());
    }
    if opts.check_md5sum() && old.hash_md5 != new.hash_md5 {
        changed.push("md5".to_string());
    }
    if opts.check_sha1sum() && old.hash_sha1 != new.hash_sha1 {
        changed.push("sha1".to_string());
    }
    if opts.check_sha256sum() && old.hash_sha256 != new.hash_sha256 {
        changed.push("sha256".to_string());
    }
    if opts.check_attrs() && old.attributes != new.attributes {
        changed.push("attributes".to_string());
    }

    changed
}

/// `new` is the entry whose fields are projected into the event's
/// `attributes` object: for `added`/`modified` that is the freshly probed
/// entry, for `deleted` it is the last known (pre-deletion) entry. `old`
/// is only consulted when `change_type == Modified`; pass `None` for
/// `added` and `deleted` even if a prior entry exists.
pub struct DiffInput<'a> {
    pub path: &'a str,
    pub old: Option<&'a Entry>,
    pub new: &'a Entry,
    pub change_type: ChangeKind,
    pub timestamp: i64,
    pub audit: Option<AuditInfo>,
    pub tags: Option<String>,
    pub content_diff: Option<&'a dyn ContentDiffStore>,
    pub file_bytes: Option<&'a [u8]>,
}

/// Computes the event for one observation. Returns `None` iff `old` is
/// present and the attribute diff against `new` is empty (no spurious
/// events); `added` and `deleted` always produce an event.
pub fn diff(input: DiffInput<'_>) -> Option<ChangeEventData> {
    let options = OptionFlags::from_bits(input.new.options);

    let changed = if input.change_type == ChangeKind::Modified {
        input
            .old
            .map(|old| changed_attributes(old, input.new))
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    if input.change_type == ChangeKind::Modified && changed.is_empty() {
        return None;
    }

    let see_changes = options.check_seechanges();
    let content_changes = if let Some(store) = input.content_diff {
        match input.change_type {
            ChangeKind::Added => {
                // First-backup side effect: seed the store unconditionally
                // for new files, discarding the (typically absent) result.
                if see_changes && let Some(bytes) = input.file_bytes {
                    let _ = store.add_file(input.path, bytes);
                }
                None
            }
            ChangeKind::Modified if see_changes => {
                if let Some(bytes) = input.file_bytes {
                    store.add_file(input.path, bytes);
                }
                store.diff_for(input.path)
            }
            _ => None,
        }
    } else {
        None
    };

    Some(ChangeEventData {
        path: input.path.to_string(),
        mode: input.new.mode.as_str().to_string(),
        change_type: input.change_type,
        timestamp: input.timestamp,
        attributes: AttributeProjection::project(input.new, options),
        changed_attributes: changed,
        old_attributes: if input.change_type == ChangeKind::Modified {
            input
                .old
                .map(|old| AttributeProjection::project(old, OptionFlags::from_bits(old.options)))
        } else {
            None
        },
        audit: input.audit,
        content_changes,
        tags: input.tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{DetectionMode, EntryType};
    use std::sync::Mutex;

    fn entry(size: i64, mtime: i64, sha256: &str) -> Entry {
        Entry {
            size,
            perm: "0644".into(),
            attributes: String::new(),
            uid: "0".into(),
            gid: "0".into(),
            user_name: None,
            group_name: None,
            mtime,
            inode: 1,
            dev: 1,
            hash_md5: String::new(),
            hash_sha1: String::new(),
            hash_sha256: sha256.into(),
            checksum: String::new(),
            mode: DetectionMode::Scheduled,
            options: OptionFlags::all().bits(),
            last_event: 0,
            entry_type: EntryType::File,
            scanned: true,
        }
    }

    #[test]
    fn unchanged_entries_produce_no_event() {
        let old = entry(100, 1000, "aaa");
        let new = entry(100, 1000, "aaa");
        let result = diff(DiffInput {
            path: "/tmp/r/a.txt",
            old: Some(&old),
            new: &new,
            change_type: ChangeKind::Modified,
            timestamp: 1,
            audit: None,
            tags: None,
            content_diff: None,
            file_bytes: None,
        });
        assert!(result.is_none());
    }

    #[test]
    fn size_and_mtime_change_are_both_reported() {
        let old = entry(100, 1000, "aaa");
        let new = entry(150, 1100, "aaa");
        let event = diff(DiffInput {
            path: "/tmp/r/a.txt",
            old: Some(&old),
            new: &new,
            change_type: ChangeKind::Modified,
            timestamp: 2,
            audit: None,
            tags: None,
            content_diff: None,
            file_bytes: None,
        })
        .unwrap();
        assert!(event.changed_attributes.contains(&"size".to_string()));
        assert!(event.changed_attributes.contains(&"mtime".to_string()));
    }

    #[test]
    fn added_entry_always_produces_an_event() {
        let new = entry(0, 0, "");
        let event = diff(DiffInput {
            path: "/tmp/r/new.txt",
            old: None,
            new: &new,
            change_type: ChangeKind::Added,
            timestamp: 1,
            audit: None,
            tags: None,
            content_diff: None,
            file_bytes: None,
        })
        .unwrap();
        assert!(event.changed_attributes.is_empty());
        assert!(event.old_attributes.is_none());
    }

    struct FakeStore {
        seeded: Mutex<Vec<String>>,
    }

    impl ContentDiffStore for FakeStore {
        fn add_file(&self, path: &str, _contents: &[u8]) -> Option<String> {
            self.seeded.lock().unwrap().push(path.to_string());
            None
        }
        fn diff_for(&self, _path: &str) -> Option<String> {
            Some("- old\n+ new\n".to_string())
        }
    }

    #[test]
    fn first_backup_runs_unconditionally_for_new_files_and_result_is_discarded() {
        let store = FakeStore {
            seeded: Mutex::new(vec![]),
        };
        let new = entry(5, 0, "");
        let event = diff(DiffInput {
            path: "/tmp/r/new.txt",
            old: None,
            new: &new,
            change_type: ChangeKind::Added,
            timestamp: 1,
            audit: None,
            tags: None,
            content_diff: Some(&store),
            file_bytes: Some(b"hello"),
        })
        .unwrap();
        assert_eq!(store.seeded.lock().unwrap().len(), 1);
        assert!(event.content_changes.is_none());
    }

    #[test]
    fn modified_file_carries_content_diff_when_seechanges_enabled() {
        let store = FakeStore {
            seeded: Mutex::new(vec![]),
        };
        let old = entry(100, 1000, "aaa");
        let new = entry(150, 1100, "bbb");
        let event = diff(DiffInput {
            path: "/tmp/r/a.txt",
            old: Some(&old),
            new: &new,
            change_type: ChangeKind::Modified,
            timestamp: 2,
            audit: None,
            tags: None,
            content_diff: Some(&store),
            file_bytes: Some(b"new contents"),
        })
        .unwrap();
        assert_eq!(event.content_changes, Some("- old\n+ new\n".to_string()));
    }

    #[test]
    fn old_attributes_are_projected_with_old_entrys_own_options() {
        let mut old = entry(100, 1000, "aaa");
        old.options = OptionFlags::from_bits(OptionFlags::CHECK_SIZE).bits();
        old.uid = "0".into();
        let mut new = entry(150, 1000, "aaa");
        new.options = OptionFlags::all().bits();
        new.uid = "1000".into();

        let event = diff(DiffInput {
            path: "/tmp/r/a.txt",
            old: Some(&old),
            new: &new,
            change_type: ChangeKind::Modified,
            timestamp: 1,
            audit: None,
            tags: None,
            content_diff: None,
            file_bytes: None,
        })
        .unwrap();

        // old only had CHECK_SIZE in force when it was collected, so its
        // projected uid must stay absent even though `new`'s options (used
        // to project `new.attributes`) enable CHECK_OWNER.
        let old_attrs = event.old_attributes.unwrap();
        assert_eq!(old_attrs.size, Some(100));
        assert!(old_attrs.uid.is_none());
        assert_eq!(event.attributes.uid, Some("1000".to_string()));
    }

    #[test]
    fn user_name_comparison_skipped_when_either_side_is_null() {
        let mut old = entry(100, 1000, "aaa");
        old.user_name = None;
        let mut new = entry(100, 1000, "aaa");
        new.user_name = Some("alice".to_string());
        let result = diff(DiffInput {
            path: "/tmp/r/a.txt",
            old: Some(&old),
            new: &new,
            change_type: ChangeKind::Modified,
            timestamp: 1,
            audit: None,
            tags: None,
            content_diff: None,
            file_bytes: None,
        });
        assert!(result.is_none());
    }

    #[test]
    fn attributes_change_is_reported_when_check_attrs_is_set() {
        let mut old = entry(100, 1000, "aaa");
        old.attributes = "HR".to_string();
        let mut new = entry(100, 1000, "aaa");
        new.attributes = "HRS".to_string();
        let event = diff(DiffInput {
            path: "/tmp/r/a.txt",
            old: Some(&old),
            new: &new,
            change_type: ChangeKind::Modified,
            timestamp: 1,
            audit: None,
            tags: None,
            content_diff: None,
            file_bytes: None,
        })
        .unwrap();
        assert!(event.changed_attributes.contains(&"attributes".to_string()));
    }
}
