//! `Walker` (C6): recursive directory traversal with per-entry dispatch
//! into C4 (skip?), C3 (attributes), and C7 (diff). Grounded in
//! `status.rs`'s recursive `walk_directory`/`compare_entries` shape and
//! `create_db.c`'s `fim_checker`/`fim_directory`/`fim_file` dispatch and
//! `fim_check_depth` depth accounting.
//!
//! `visit` is re-entrant by design: a realtime/whodata intake calls it
//! directly, outside of any `scan` call, carrying its own detection mode.
//!
//! Design note: the matcher (ignore prefixes/regex, restrict regex,
//! skip-fs) is applied once per path, uniformly for files, symlinks and
//! directories, before any type dispatch. This resolves an ambiguity in
//! how the walker's stat-outcome branches relate to the ignore rules:
//! applying the matcher to directories too means an ignored subtree is
//! never recursed into, rather than merely having its individual files
//! skipped one at a time.

use crate::attr_probe::{self, ProbeResult};
use crate::engine::Engine;
use crate::entry::{DetectionMode, EntryType};
use crate::event::{AuditInfo, ChangeKind, Event};
use crate::mode_gate;
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::debug;

/// Depth of `path` relative to `root`, measured as the count of path
/// separators after the root prefix. A direct child of the root has
/// depth 0.
fn depth_below(root: &str, path: &str) -> u32 {
    path[root.len()..]
        .trim_start_matches(['/', '\\'])
        .chars()
        .filter(|c| *c == '/' || *c == '\\')
        .count() as u32
}

/// Performs a full scan of one configured root: opens the root directory
/// and visits its immediate children (each of which may recurse further).
pub(crate) fn scan(engine: &Engine, root_index: usize) {
    let root_path = engine.config.roots[root_index].path.clone();
    visit_children(engine, &root_path, &root_path, root_index, DetectionMode::Scheduled);
}

fn visit_children(engine: &Engine, root_prefix: &str, dir: &str, root_index: usize, mode: DetectionMode) {
    if engine.stop_requested.load(Ordering::Relaxed) {
        return;
    }

    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            debug!(path = dir, "permission denied enumerating directory");
            return;
        }
        Err(e) => {
            debug!(path = dir, error = %e, "failed to enumerate directory");
            return;
        }
    };

    let recursion_level = engine.config.roots[root_index].recursion_level;

    for entry in read_dir.flatten() {
        let child = entry.path();
        let Some(child_str) = child.to_str() else {
            continue;
        };

        if depth_below(root_prefix, child_str) > recursion_level {
            continue;
        }

        visit(engine, child_str, mode, root_index);
    }
}

/// C6 step 3: one path's full admission -> probe -> diff -> catalog
/// update pipeline, for a single detection mode.
pub(crate) fn visit(engine: &Engine, path: &str, mode: DetectionMode, root_index: usize) {
    visit_with_audit(engine, path, mode, root_index, None)
}

/// Same as [`visit`], additionally carrying whodata attribution for the
/// triggering path (hard-link siblings visited as a side effect never
/// carry the original audit attribution; see
/// [`Engine::handle_whodata_event`]).
pub(crate) fn visit_with_audit(
    engine: &Engine,
    path: &str,
    mode: DetectionMode,
    root_index: usize,
    audit: Option<AuditInfo>,
) {
    let root_mode_bits = engine.config.roots[root_index].mode_bits();
    if !mode_gate::admit(mode, root_mode_bits) {
        return;
    }

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            handle_deletion(engine, path, root_index);
            return;
        }
        Err(e) => {
            debug!(path, error = %e, "failed to stat path, skipping");
            return;
        }
    };

    if engine.matchers[root_index].should_ignore(path, engine.fs_type_resolver.as_ref()) {
        return;
    }

    if metadata.is_dir() {
        let root_prefix = engine.config.roots[root_index].path.clone();
        visit_children(engine, &root_prefix, path, root_index, mode);
        return;
    }

    if !metadata.is_file() && !metadata.file_type().is_symlink() {
        return;
    }

    let options = engine.config.roots[root_index].options;
    let probe_result = attr_probe::probe(
        Path::new(path),
        options,
        mode,
        engine.config.global.file_max_size,
        engine.name_resolver.as_ref(),
        engine.prefilter.as_deref(),
    );

    match probe_result {
        Ok(ProbeResult::Absent) => handle_deletion(engine, path, root_index),
        Ok(ProbeResult::Found(mut new_entry)) => {
            if engine.config.roots[root_index].registry {
                new_entry.entry_type = EntryType::Registry;
            }
            handle_observation(engine, path, root_index, new_entry, audit)
        }
        Err(e) => {
            debug!(path, error = %e, "attribute probe failed, skipping");
        }
    }
}

/// Mid-visit missing-path handling (§4.6 step 3): distinct from the
/// end-of-scan reconciler sweep (C9), which always reconciles deletions
/// unconditionally. Here, a path observed missing while being directly
/// visited (per-child during a scheduled walk, or a realtime/whodata
/// intake racing a delete) is only reconciled immediately when the owning
/// root has `CHECK_SEECHANGES` set; otherwise the entry is left in the
/// catalog for the next scheduled scan's reconciler pass to catch.
fn handle_deletion(engine: &Engine, path: &str, root_index: usize) {
    if !engine.config.roots[root_index].options.check_seechanges() {
        return;
    }

    let Some(old) = engine.catalog.get(path) else {
        return;
    };

    let timestamp = engine.now();
    let event_data = crate::diff::diff(crate::diff::DiffInput {
        path,
        old: None,
        new: &old,
        change_type: ChangeKind::Deleted,
        timestamp,
        audit: None,
        tags: engine.config.roots[root_index].tag.clone(),
        content_diff: None,
        file_bytes: None,
    });

    engine.catalog.delete(path);

    if let Some(data) = event_data {
        engine.forward(Event::Event { data });
    }
}

fn handle_observation(
    engine: &Engine,
    path: &str,
    root_index: usize,
    mut new_entry: crate::entry::Entry,
    audit: Option<AuditInfo>,
) {
    // `scanned` only tracks membership in the current scheduled-scan
    // window (invariant I4); realtime/whodata observations happen outside
    // that window and must not leave a stale `true` for the reconciler to
    // misread on the next scheduled scan.
    new_entry.scanned = new_entry.mode == DetectionMode::Scheduled;

    let old = engine.catalog.get(path);
    let change_type = if old.is_some() {
        ChangeKind::Modified
    } else {
        ChangeKind::Added
    };

    let timestamp = engine.now();
    let needs_content_diff = engine.content_diff.is_some()
        && engine.config.roots[root_index].options.check_seechanges();
    let file_bytes = if needs_content_diff && new_entry.entry_type == EntryType::File {
        std::fs::read(path).ok()
    } else {
        None
    };

    let event_data = crate::diff::diff(crate::diff::DiffInput {
        path,
        old: old.as_ref(),
        new: &new_entry,
        change_type,
        timestamp,
        audit,
        tags: engine.config.roots[root_index].tag.clone(),
        content_diff: engine.content_diff.as_deref(),
        file_bytes: file_bytes.as_deref(),
    });

    engine.catalog.upsert(path, new_entry);

    if let Some(data) = event_data {
        engine.forward(Event::Event { data });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_below_counts_separators_after_root() {
        assert_eq!(depth_below("/tmp/r", "/tmp/r/a"), 0);
        assert_eq!(depth_below("/tmp/r", "/tmp/r/a/b"), 1);
        assert_eq!(depth_below("/tmp/r", "/tmp/r/a/b/c"), 2);
    }
}
