//! `RootResolver` (C5): maps an arbitrary path to the configured root that
//! is its longest, separator-aligned prefix. Grounded in
//! `fim_configuration_directory`'s linear scan for the longest matching
//! configured directory.

use crate::config::RootConfig;

const ARCH_TAG_X64: &str = "[x64] ";

pub struct RootResolver {
    roots: Vec<String>,
}

impl RootResolver {
    pub fn new(roots: &[RootConfig]) -> Self {
        RootResolver {
            roots: roots.iter().map(|r| normalize(&r.path)).collect(),
        }
    }

    /// Returns the index of the configured root that is the longest prefix
    /// of `path`, where the prefix ends on a path-separator boundary (or
    /// the path is exactly the root). `registry` selects the architecture
    /// tag comparison used for Windows registry keys.
    pub fn root_of(&self, path: &str, registry: bool) -> Option<usize> {
        let candidate = if registry {
            strip_arch_tag(path)
        } else {
            path
        };

        let mut best: Option<(usize, usize)> = None; // (root_index, prefix_len)
        for (idx, root) in self.roots.iter().enumerate() {
            if is_separator_aligned_prefix(candidate, root)
                && best.is_none_or(|(_, len)| root.len() > len)
            {
                best = Some((idx, root.len()));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

fn normalize(path: &str) -> String {
    if path.len() > 1 && path.ends_with('/') {
        path.trim_end_matches('/').to_string()
    } else {
        path.to_string()
    }
}

fn strip_arch_tag(path: &str) -> &str {
    path.strip_prefix(ARCH_TAG_X64).unwrap_or(path)
}

fn is_separator_aligned_prefix(path: &str, root: &str) -> bool {
    if !path.starts_with(root) {
        return false;
    }
    if path.len() == root.len() {
        return true;
    }
    matches!(path.as_bytes()[root.len()], b'/' | b'\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(paths: &[&str]) -> RootResolver {
        let configs: Vec<RootConfig> = paths
            .iter()
            .map(|p| RootConfig {
                path: p.to_string(),
                options: Default::default(),
                recursion_level: 256,
                registry: false,
                restrict_regex: None,
                tag: None,
            })
            .collect();
        RootResolver::new(&configs)
    }

    #[test]
    fn resolves_exact_root_match() {
        let r = roots(&["/tmp/r"]);
        assert_eq!(r.root_of("/tmp/r", false), Some(0));
    }

    #[test]
    fn resolves_longest_prefix_among_nested_roots() {
        let r = roots(&["/tmp", "/tmp/r"]);
        assert_eq!(r.root_of("/tmp/r/a.txt", false), Some(1));
        assert_eq!(r.root_of("/tmp/other/a.txt", false), Some(0));
    }

    #[test]
    fn does_not_match_sibling_with_shared_string_prefix() {
        let r = roots(&["/tmp/r"]);
        assert_eq!(r.root_of("/tmp/r-other/a.txt", false), None);
    }

    #[test]
    fn returns_none_when_no_root_covers_path() {
        let r = roots(&["/tmp/r"]);
        assert_eq!(r.root_of("/var/log/x", false), None);
    }

    #[test]
    fn registry_lookup_strips_architecture_tag() {
        let r = roots(&["HKEY_LOCAL_MACHINE\\Software"]);
        assert_eq!(
            r.root_of("[x64] HKEY_LOCAL_MACHINE\\Software\\Key", true),
            Some(0)
        );
    }
}
