//! Configuration surface consumed (not owned) by the engine: option bits,
//! per-root configuration, and global settings. Loading these from an
//! XML/CLI source is an external collaborator's job; this module only
//! defines the typed shape the engine accepts, deserializable via `serde`
//! so a small outer loop (see `src/bin/fimcored.rs`) can build one from
//! TOML.

use serde::Deserialize;
use std::collections::HashSet;

/// Per-root, per-entry option bitset selecting which attributes and hashes
/// participate in fingerprinting and diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionFlags(u32);

macro_rules! flag_const {
    ($name:ident, $accessor:ident, $bit:expr) => {
        pub const $name: u32 = 1 << $bit;

        pub fn $accessor(self) -> bool {
            self.0 & Self::$name != 0
        }
    };
}

impl OptionFlags {
    flag_const!(CHECK_SIZE, check_size, 0);
    flag_const!(CHECK_PERM, check_perm, 1);
    flag_const!(CHECK_OWNER, check_owner, 2);
    flag_const!(CHECK_GROUP, check_group, 3);
    flag_const!(CHECK_MTIME, check_mtime, 4);
    flag_const!(CHECK_INODE, check_inode, 5);
    flag_const!(CHECK_MD5SUM, check_md5sum, 6);
    flag_const!(CHECK_SHA1SUM, check_sha1sum, 7);
    flag_const!(CHECK_SHA256SUM, check_sha256sum, 8);
    flag_const!(CHECK_ATTRS, check_attrs, 9);
    flag_const!(CHECK_SEECHANGES, check_seechanges, 10);
    flag_const!(REALTIME_ACTIVE, realtime_active, 11);
    flag_const!(WHODATA_ACTIVE, whodata_active, 12);

    pub const fn from_bits(bits: u32) -> Self {
        OptionFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn empty() -> Self {
        OptionFlags(0)
    }

    pub const fn all() -> Self {
        OptionFlags(
            Self::CHECK_SIZE
                | Self::CHECK_PERM
                | Self::CHECK_OWNER
                | Self::CHECK_GROUP
                | Self::CHECK_MTIME
                | Self::CHECK_INODE
                | Self::CHECK_MD5SUM
                | Self::CHECK_SHA1SUM
                | Self::CHECK_SHA256SUM
                | Self::CHECK_ATTRS
                | Self::CHECK_SEECHANGES,
        )
    }

    pub fn union(self, other: OptionFlags) -> OptionFlags {
        OptionFlags(self.0 | other.0)
    }
}

impl<'de> Deserialize<'de> for OptionFlags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let names: Vec<String> = Vec::deserialize(deserializer)?;
        let mut bits = 0u32;
        for name in names {
            bits |= match name.as_str() {
                "size" => Self::CHECK_SIZE,
                "perm" => Self::CHECK_PERM,
                "owner" => Self::CHECK_OWNER,
                "group" => Self::CHECK_GROUP,
                "mtime" => Self::CHECK_MTIME,
                "inode" => Self::CHECK_INODE,
                "md5" => Self::CHECK_MD5SUM,
                "sha1" => Self::CHECK_SHA1SUM,
                "sha256" => Self::CHECK_SHA256SUM,
                "attrs" => Self::CHECK_ATTRS,
                "seechanges" => Self::CHECK_SEECHANGES,
                "realtime" => Self::REALTIME_ACTIVE,
                "whodata" => Self::WHODATA_ACTIVE,
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "unknown option flag: {other}"
                    )));
                }
            };
        }
        Ok(OptionFlags(bits))
    }
}

/// A configured monitored subtree (or, on one platform, registry key).
#[derive(Debug, Clone, Deserialize)]
pub struct RootConfig {
    pub path: String,
    #[serde(default)]
    pub options: OptionFlags,
    #[serde(default = "default_recursion_level")]
    pub recursion_level: u32,
    #[serde(default)]
    pub registry: bool,
    #[serde(default)]
    pub restrict_regex: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

fn default_recursion_level() -> u32 {
    256
}

impl RootConfig {
    pub fn mode_bits(&self) -> OptionFlags {
        OptionFlags::from_bits(
            self.options.bits() & (OptionFlags::REALTIME_ACTIVE | OptionFlags::WHODATA_ACTIVE),
        )
    }
}

/// Global settings shared by every root.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub ignore_prefixes: Vec<String>,
    #[serde(default)]
    pub ignore_regex: Vec<String>,
    #[serde(default)]
    pub skip_fs: HashSet<String>,
    #[serde(default = "default_file_max_size")]
    pub file_max_size: u64,
}

fn default_file_max_size() -> u64 {
    // Matches the source's default maximum (`DEFAULT_MAX_ALERTS_FIM_FILES`
    // order of magnitude): large enough not to surprise small test fixtures,
    // small enough to bound pathological hashing of huge files by default.
    1024 * 1024 * 1024
}

/// Full configuration consumed by an [`crate::engine::Engine`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    pub roots: Vec<RootConfig>,
    #[serde(default)]
    pub global: GlobalConfig,
}
