//! Typed event schema and the sink collaborator. Serializes from a typed
//! record per the external interface schema rather than building a dynamic
//! JSON tree and projecting fields out of it afterwards.

use crate::entry::Entry;
use serde::Serialize;

/// Originating-user/process attribution carried by a whodata event.
/// Grounded in `fim_audit_json`'s field set.
#[derive(Debug, Clone, Serialize)]
pub struct AuditInfo {
    pub path: String,
    pub user_id: String,
    pub user_name: String,
    pub process_name: String,
    pub process_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ppid: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
}

/// The `attributes`/`old_attributes` object: exactly the fields whose
/// option bit is set, plus `type` (always) and `checksum` (when non-empty).
#[derive(Debug, Clone, Default, Serialize)]
pub struct AttributeProjection {
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inode: Option<u64>,
    #[serde(rename = "md5", skip_serializing_if = "Option::is_none")]
    pub hash_md5: Option<String>,
    #[serde(rename = "sha1", skip_serializing_if = "Option::is_none")]
    pub hash_sha1: Option<String>,
    #[serde(rename = "sha256", skip_serializing_if = "Option::is_none")]
    pub hash_sha256: Option<String>,
    #[serde(rename = "win_attributes", skip_serializing_if = "Option::is_none")]
    pub win_attributes: Option<String>,
}

impl AttributeProjection {
    pub fn project(entry: &Entry, options: crate::config::OptionFlags) -> Self {
        AttributeProjection {
            entry_type: entry.entry_type.as_str().to_string(),
            checksum: (!entry.checksum.is_empty()).then(|| entry.checksum.clone()),
            size: options.check_size().then_some(entry.size),
            perm: options.check_perm().then(|| entry.perm.clone()),
            uid: options.check_owner().then(|| entry.uid.clone()),
            gid: options.check_group().then(|| entry.gid.clone()),
            user_name: (options.check_owner() && entry.user_name.is_some())
                .then(|| entry.user_name.clone())
                .flatten(),
            group_name: (options.check_group() && entry.group_name.is_some())
                .then(|| entry.group_name.clone())
                .flatten(),
            mtime: options.check_mtime().then_some(entry.mtime),
            inode: (options.check_inode() && cfg!(unix)).then_some(entry.inode),
            hash_md5: (options.check_md5sum() && !entry.hash_md5.is_empty())
                .then(|| entry.hash_md5.clone()),
            hash_sha1: (options.check_sha1sum() && !entry.hash_sha1.is_empty())
                .then(|| entry.hash_sha1.clone()),
            hash_sha256: (options.check_sha256sum() && !entry.hash_sha256.is_empty())
                .then(|| entry.hash_sha256.clone()),
            win_attributes: (cfg!(windows)
                && options.check_attrs()
                && !entry.attributes.is_empty())
            .then(|| entry.attributes.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeEventData {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub change_type: ChangeKind,
    pub timestamp: i64,
    pub attributes: AttributeProjection,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_attributes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_attributes: Option<AttributeProjection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_changes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Event { data: ChangeEventData },
    ScanStart { data: ScanMarkerData },
    ScanEnd { data: ScanMarkerData },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanMarkerData {
    pub timestamp: i64,
}

impl Event {
    pub fn to_compact_json(&self) -> String {
        serde_json::to_string(self).expect("Event serialization is infallible")
    }
}

/// Destination for serialized events. The core only ever calls `send`; any
/// delivery failure is the sink's concern (logged and otherwise swallowed
/// by the caller per the `TransportError` policy).
pub trait EventSink: Send + Sync {
    fn send(&self, event: &Event);
}
