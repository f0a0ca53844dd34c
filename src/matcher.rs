//! `Matcher` (C4): ignore prefixes, ignore regex, restrict regex, and
//! skipped-filesystem tests. Grounded in `fim_check_ignore`/
//! `fim_check_restrict`: ignore-prefix matching is a *prefix* match (like
//! `strncasecmp` against `strlen(ignore[i])`), not a full-path equality
//! check, and a configured restriction that fails to match excludes the
//! path. The skip-fs test is backed by [`ProcMountsFsTypeResolver`] on
//! Linux, which parses `/proc/mounts` and picks the longest-matching mount
//! point the same way [`crate::root_resolver::RootResolver`] picks the
//! longest-matching configured root; on other platforms (or if
//! `/proc/mounts` can't be read) no filesystem type is ever identified, so
//! the skip-fs rule never fires.

use regex::Regex;
use std::collections::HashSet;

#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Resolves the filesystem type backing the mount a path lives under.
/// Default never identifies a filesystem type, so the skip-fs rule never
/// fires unless a real resolver is supplied by the embedding process.
pub trait FsTypeResolver: Send + Sync {
    fn fs_type_of(&self, path: &str) -> Option<String>;
}

pub struct UnknownFsTypeResolver;

impl FsTypeResolver for UnknownFsTypeResolver {
    fn fs_type_of(&self, _path: &str) -> Option<String> {
        None
    }
}

/// Resolves filesystem type by reading `/proc/mounts` and finding the
/// longest-matching mount-point prefix of `path`, the same
/// longest-prefix-wins strategy [`crate::root_resolver::RootResolver`]
/// uses for configured roots. Returns `None` (never skip) if
/// `/proc/mounts` can't be read or no entry covers the path.
#[cfg(target_os = "linux")]
pub struct ProcMountsFsTypeResolver;

#[cfg(target_os = "linux")]
impl FsTypeResolver for ProcMountsFsTypeResolver {
    fn fs_type_of(&self, path: &str) -> Option<String> {
        let Ok(contents) = std::fs::read_to_string("/proc/mounts") else {
            return None;
        };
        longest_matching_fs_type(path, &parse_mounts(&contents))
    }
}

/// Parses `/proc/mounts`-formatted text into `(mount_point, fs_type)`
/// pairs (the device and trailing options/dump/pass fields are unused by
/// the skip-fs test).
#[cfg(target_os = "linux")]
fn parse_mounts(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some((unescape_octal(mount_point), fs_type.to_string()))
        })
        .collect()
}

/// The filesystem type of whichever `(mount_point, fs_type)` pair is the
/// longest prefix of `path`, the same longest-prefix-wins strategy
/// [`crate::root_resolver::RootResolver`] uses for configured roots.
#[cfg(target_os = "linux")]
fn longest_matching_fs_type(path: &str, mounts: &[(String, String)]) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;
    for (mount_point, fs_type) in mounts {
        if path.starts_with(mount_point.as_str())
            && best.is_none_or(|(len, _)| mount_point.len() > len)
        {
            best = Some((mount_point.len(), fs_type.as_str()));
        }
    }
    best.map(|(_, fs_type)| fs_type.to_string())
}

/// Unescapes the octal escapes (`\040` for space, `\011` tab, `\012`
/// newline, `\134` backslash) `/proc/mounts` uses for mount points and
/// devices containing those bytes.
#[cfg(target_os = "linux")]
fn unescape_octal(field: &str) -> String {
    if !field.contains('\\') {
        return field.to_string();
    }
    let bytes = field.as_bytes();
    let mut out = String::with_capacity(field.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && let Ok(code) = u8::from_str_radix(&field[i + 1..i + 4], 8)
        {
            out.push(code as char);
            i += 4;
            continue;
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

/// The default [`FsTypeResolver`] for the current platform: `/proc/mounts`
/// parsing on Linux, otherwise a resolver that never identifies a
/// filesystem type (the skip-fs rule then never fires).
pub fn default_fs_type_resolver() -> Box<dyn FsTypeResolver> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ProcMountsFsTypeResolver)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(UnknownFsTypeResolver)
    }
}

pub struct Matcher {
    ignore_prefixes: Vec<String>,
    ignore_regex: Vec<Regex>,
    restrict_regex: Option<Regex>,
    skip_fs: HashSet<String>,
}

impl Matcher {
    pub fn new(
        ignore_prefixes: Vec<String>,
        ignore_regex: &[String],
        restrict_regex: Option<&str>,
        skip_fs: HashSet<String>,
    ) -> Result<Self, MatcherError> {
        let ignore_regex = ignore_regex
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| MatcherError::InvalidRegex {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let restrict_regex = restrict_regex
            .map(|p| {
                Regex::new(p).map_err(|source| MatcherError::InvalidRegex {
                    pattern: p.to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(Matcher {
            ignore_prefixes,
            ignore_regex,
            restrict_regex,
            skip_fs,
        })
    }

    /// True iff `path` starts with `prefix`, case-sensitively on POSIX and
    /// case-insensitively on Windows. This is a prefix match, not a
    /// full-path comparison.
    fn prefix_matches(path: &str, prefix: &str) -> bool {
        if prefix.len() > path.len() {
            return false;
        }
        let candidate = &path[..prefix.len()];
        if cfg!(windows) {
            candidate.eq_ignore_ascii_case(prefix)
        } else {
            candidate == prefix
        }
    }

    pub fn should_ignore(&self, path: &str, fs_resolver: &dyn FsTypeResolver) -> bool {
        if self
            .ignore_prefixes
            .iter()
            .any(|prefix| Self::prefix_matches(path, prefix))
        {
            return true;
        }

        if self.ignore_regex.iter().any(|re| re.is_match(path)) {
            return true;
        }

        if let Some(restrict) = &self.restrict_regex
            && !restrict.is_match(path)
        {
            return true;
        }

        if let Some(fs_type) = fs_resolver.fs_type_of(path)
            && self.skip_fs.contains(&fs_type)
        {
            return true;
        }

        false
    }
}
