//! `Reconciler` (C9): the end-of-scan sweep that turns unseen catalog
//! entries into `deleted` events and resets the `scanned` flag on entries
//! that were visited. Grounded in `check_deleted_files`/`delete_inode_item`.

use crate::diff::DiffInput;
use crate::engine::Engine;
use crate::entry::EntryType;
use crate::event::{ChangeKind, Event};

/// Runs a single pass over a snapshot of catalog keys, deleting entries
/// that were not visited this scan and resetting `scanned` on the rest.
pub(crate) fn reconcile(engine: &Engine, timestamp: i64) {
    for path in engine.catalog.snapshot_keys() {
        let Some(mut entry) = engine.catalog.get(&path) else {
            // Concurrently deleted by another intake; nothing to reconcile.
            continue;
        };

        if entry.scanned {
            entry.scanned = false;
            engine.catalog.upsert(&path, entry);
            continue;
        }

        let root_index = engine.root_resolver.root_of(
            &path,
            entry.entry_type == EntryType::Registry,
        );
        if root_index.is_none() {
            // The path is no longer under any configured root; leave the
            // catalog entry alone rather than guessing at a root's tag.
            continue;
        }
        let tag = root_index.and_then(|idx| engine.config.roots[idx].tag.clone());

        let event_data = crate::diff::diff(DiffInput {
            path: &path,
            old: None,
            new: &entry,
            change_type: ChangeKind::Deleted,
            timestamp,
            audit: None,
            tags: tag,
            content_diff: None,
            file_bytes: None,
        });

        engine.catalog.delete(&path);

        if let Some(data) = event_data {
            engine.forward(Event::Event { data });
        }
    }
}
