//! `AttrProbe` (C3): reads filesystem metadata and, where the option mask
//! calls for it, cryptographic digests for a single path. Grounded in the
//! mtime-before/after concurrent-modification check of `checksum_file` and
//! the `symlink_metadata`-based, never-follow-symlinks collection style of
//! `list_directory`, generalized to compute MD5/SHA-1/SHA-256 together in
//! one read pass and to collect the full attribute set the catalog needs.

use crate::config::OptionFlags;
use crate::entry::{DetectionMode, Entry, EntryType};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum AttrProbeError {
    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("hashing failed for {0}")]
    HashFailed(PathBuf),
    #[error("file modified during checksumming: {0}")]
    ConcurrentModification(PathBuf),
}

/// A byte-stream transform applied to file contents before hashing. Models
/// the `prefilter_cmd` external collaborator; the core treats it as opaque.
pub trait Prefilter: Send + Sync {
    fn apply(&self, chunk: &[u8]) -> Vec<u8>;
}

/// The outcome of probing a single path.
pub enum ProbeResult {
    /// The path does not exist.
    Absent,
    /// A freshly probed entry (`scanned` is always `true`, no diff yet).
    Found(Entry),
}

fn io_err(path: &Path, e: std::io::Error) -> AttrProbeError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        AttrProbeError::PermissionDenied(path.to_path_buf())
    } else {
        AttrProbeError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    }
}

struct Hashes {
    md5: String,
    sha1: String,
    sha256: String,
}

fn hash_file(
    path: &Path,
    options: OptionFlags,
    prefilter: Option<&dyn Prefilter>,
) -> Result<Hashes, AttrProbeError> {
    let mut md5 = options.check_md5sum().then(Md5::new);
    let mut sha1 = options.check_sha1sum().then(Sha1::new);
    let mut sha256 = options.check_sha256sum().then(Sha256::new);

    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut buffer = [0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|_| AttrProbeError::HashFailed(path.to_path_buf()))?;
        if n == 0 {
            break;
        }
        let chunk = match prefilter {
            Some(f) => f.apply(&buffer[..n]),
            None => buffer[..n].to_vec(),
        };
        if let Some(h) = md5.as_mut() {
            h.update(&chunk);
        }
        if let Some(h) = sha1.as_mut() {
            h.update(&chunk);
        }
        if let Some(h) = sha256.as_mut() {
            h.update(&chunk);
        }
    }

    Ok(Hashes {
        md5: md5.map(|h| format!("{:x}", h.finalize())).unwrap_or_default(),
        sha1: sha1.map(|h| format!("{:x}", h.finalize())).unwrap_or_default(),
        sha256: sha256
            .map(|h| format!("{:x}", h.finalize()))
            .unwrap_or_default(),
    })
}

/// SHA-1 hex digest of the canonical checksum input, the contract in
/// `Entry::canonical_checksum_input`.
pub fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolves numeric uid/gid to names. The default never resolves anything;
/// a caller embedding this engine on a real host can supply a resolver
/// backed by `libc::getpwuid_r`/`getgrgid_r`.
pub trait NameResolver: Send + Sync {
    fn user_name(&self, uid: u32) -> Option<String>;
    fn group_name(&self, gid: u32) -> Option<String>;
}

pub struct NoopNameResolver;

impl NameResolver for NoopNameResolver {
    fn user_name(&self, _uid: u32) -> Option<String> {
        None
    }
    fn group_name(&self, _gid: u32) -> Option<String> {
        None
    }
}

/// Probes a single path under the given option mask and detection mode.
///
/// Hash policy: MD5/SHA-1/SHA-256 are computed only if their option bit is
/// set, the object is a regular file, and `0 < size < file_max_size`.
/// Symbolic links are never hashed. If hashing fails mid-read, returns
/// `Err(HashFailed)` without yielding a partial entry.
///
/// Concurrent-modification guard: when a file is hashed, the modification
/// time is recorded before the read and compared against a fresh stat
/// taken after the read completes. A mismatch means the bytes just hashed
/// may not correspond to the file's final on-disk state, so the probe
/// returns `Err(ConcurrentModification)` rather than yielding an entry
/// whose checksum and mtime could be mutually inconsistent; the
/// post-hash stat's metadata (size, mtime, permissions, ownership) is
/// used for the returned entry's non-hash fields, matching `checksum_file`
/// in `examples/scode-treeward/src/checksum.rs`.
pub fn probe(
    path: &Path,
    options: OptionFlags,
    mode: DetectionMode,
    file_max_size: u64,
    name_resolver: &dyn NameResolver,
    prefilter: Option<&dyn Prefilter>,
) -> Result<ProbeResult, AttrProbeError> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ProbeResult::Absent),
        Err(e) => return Err(io_err(path, e)),
    };

    let file_type = metadata.file_type();
    let is_regular = file_type.is_file();
    let size = metadata.len();

    let should_hash = is_regular && size > 0 && size < file_max_size;

    let (hashes, metadata) = if should_hash {
        let mtime_before = metadata.modified().map_err(|e| io_err(path, e))?;
        let hashes = hash_file(path, options, prefilter)?;

        let metadata_after = std::fs::symlink_metadata(path).map_err(|e| io_err(path, e))?;
        let mtime_after = metadata_after.modified().map_err(|e| io_err(path, e))?;
        if mtime_before != mtime_after {
            return Err(AttrProbeError::ConcurrentModification(path.to_path_buf()));
        }

        (hashes, metadata_after)
    } else {
        (
            Hashes {
                md5: String::new(),
                sha1: String::new(),
                sha256: String::new(),
            },
            metadata,
        )
    };
    let size = metadata.len();

    let (uid, gid, inode, dev) = platform_ids(&metadata);
    let (user_name, group_name) = if options.check_owner() || options.check_group() {
        (
            name_resolver.user_name(uid as u32),
            name_resolver.group_name(gid as u32),
        )
    } else {
        (None, None)
    };

    let mtime = metadata
        .modified()
        .map_err(|e| io_err(path, e))?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let perm = if options.check_perm() {
        format!("{:o}", permission_bits(&metadata))
    } else {
        String::new()
    };

    let mut entry = Entry {
        size: if options.check_size() { size as i64 } else { 0 },
        perm,
        attributes: String::new(),
        uid: if options.check_owner() {
            uid.to_string()
        } else {
            String::new()
        },
        gid: if options.check_group() {
            gid.to_string()
        } else {
            String::new()
        },
        user_name,
        group_name,
        mtime: if options.check_mtime() { mtime } else { 0 },
        inode: if options.check_inode() { inode } else { 0 },
        dev,
        hash_md5: hashes.md5,
        hash_sha1: hashes.sha1,
        hash_sha256: hashes.sha256,
        checksum: String::new(),
        mode,
        options: options.bits(),
        last_event: 0,
        entry_type: EntryType::File,
        scanned: true,
    };

    let input = entry.canonical_checksum_input();
    entry.checksum = sha1_hex(&input);

    Ok(ProbeResult::Found(entry))
}

#[cfg(unix)]
fn platform_ids(metadata: &std::fs::Metadata) -> (u64, u64, u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (
        metadata.uid() as u64,
        metadata.gid() as u64,
        metadata.ino(),
        metadata.dev(),
    )
}

#[cfg(not(unix))]
fn platform_ids(_metadata: &std::fs::Metadata) -> (u64, u64, u64, u64) {
    (0, 0, 0, 0)
}

#[cfg(unix)]
fn permission_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(_metadata: &std::fs::Metadata) -> u32 {
    0
}

/// Cheap (dev, inode) lookup without hashing, used by realtime/whodata
/// intake to find hard-link siblings already known to the inode index.
pub(crate) fn stat_inode_key(path: &Path) -> Option<(u64, u64)> {
    let metadata = std::fs::symlink_metadata(path).ok()?;
    let (_, _, inode, dev) = platform_ids(&metadata);
    if inode == 0 { None } else { Some((dev, inode)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn probe_absent_path_returns_absent() {
        let result = probe(
            Path::new("/nonexistent/does/not/exist"),
            OptionFlags::all(),
            DetectionMode::Scheduled,
            u64::MAX,
            &NoopNameResolver,
            None,
        )
        .unwrap();
        assert!(matches!(result, ProbeResult::Absent));
    }

    #[test]
    fn probe_computes_requested_hashes_only() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"hello").unwrap();
        f.flush().unwrap();

        let options = OptionFlags::from_bits(OptionFlags::CHECK_SHA256SUM | OptionFlags::CHECK_SIZE);
        let result = probe(
            f.path(),
            options,
            DetectionMode::Scheduled,
            u64::MAX,
            &NoopNameResolver,
            None,
        )
        .unwrap();

        match result {
            ProbeResult::Found(entry) => {
                assert!(!entry.hash_sha256.is_empty());
                assert!(entry.hash_md5.is_empty());
                assert!(entry.hash_sha1.is_empty());
                assert_eq!(entry.size, 5);
            }
            ProbeResult::Absent => panic!("expected entry"),
        }
    }

    #[test]
    fn probe_skips_hashing_for_empty_files() {
        let f = NamedTempFile::new().unwrap();
        let options = OptionFlags::all();
        let result = probe(
            f.path(),
            options,
            DetectionMode::Scheduled,
            u64::MAX,
            &NoopNameResolver,
            None,
        )
        .unwrap();
        match result {
            ProbeResult::Found(entry) => assert!(entry.hash_sha256.is_empty()),
            ProbeResult::Absent => panic!("expected entry"),
        }
    }

    #[test]
    fn checksum_field_is_reproducible_from_canonical_input() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"content").unwrap();
        f.flush().unwrap();

        let options = OptionFlags::all();
        let result = probe(
            f.path(),
            options,
            DetectionMode::Scheduled,
            u64::MAX,
            &NoopNameResolver,
            None,
        )
        .unwrap();
        match result {
            ProbeResult::Found(entry) => {
                let recomputed = sha1_hex(&entry.canonical_checksum_input());
                assert_eq!(recomputed, entry.checksum);
            }
            ProbeResult::Absent => panic!("expected entry"),
        }
    }

    #[test]
    fn probe_detects_concurrent_modification_during_hashing() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"hello").unwrap();
        f.flush().unwrap();
        let path = f.path().to_path_buf();

        // Simulates a writer racing the probe: bump mtime from within the
        // prefilter hook, which runs mid-read, so the post-hash re-stat
        // disagrees with the pre-hash one.
        struct BumpMtimeMidRead(PathBuf);
        impl Prefilter for BumpMtimeMidRead {
            fn apply(&self, chunk: &[u8]) -> Vec<u8> {
                let future = filetime::FileTime::from_unix_time(
                    filetime::FileTime::from_system_time(std::time::SystemTime::now())
                        .unix_seconds()
                        + 100,
                    0,
                );
                let _ = filetime::set_file_mtime(&self.0, future);
                chunk.to_vec()
            }
        }

        let prefilter = BumpMtimeMidRead(path.clone());
        let result = probe(
            &path,
            OptionFlags::all(),
            DetectionMode::Scheduled,
            u64::MAX,
            &NoopNameResolver,
            Some(&prefilter),
        );

        assert!(matches!(
            result,
            Err(AttrProbeError::ConcurrentModification(_))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn symlinks_are_never_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.txt");
        std::fs::write(&target, b"hello").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let options = OptionFlags::all();
        let result = probe(
            &link,
            options,
            DetectionMode::Scheduled,
            u64::MAX,
            &NoopNameResolver,
            None,
        )
        .unwrap();
        match result {
            ProbeResult::Found(entry) => {
                assert!(entry.hash_sha256.is_empty());
                assert!(entry.hash_md5.is_empty());
            }
            ProbeResult::Absent => panic!("expected entry"),
        }
    }
}
