//! Backup folder naming: `Backup_<timestamp>` or `Backup_v<tag>_<timestamp>`

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};

/// Name of the directory that holds backups, next to the destination
pub const BACKUPS_DIR: &str = "Backups";

/// Prefix shared by every backup folder
pub const BACKUP_PREFIX: &str = "Backup_";

/// Sortable, second precision
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const TIMESTAMP_LEN: usize = 15;

/// Directory that receives backups of `destination`
pub fn backup_root_for(destination: &Path) -> PathBuf {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(BACKUPS_DIR),
        _ => PathBuf::from(BACKUPS_DIR),
    }
}

/// Folder name for a backup taken at `at`
pub fn backup_name(at: DateTime<Local>, version_tag: Option<&str>) -> String {
    let stamp = at.format(TIMESTAMP_FORMAT);
    match version_tag.map(sanitize_tag).filter(|t| !t.is_empty()) {
        Some(tag) => format!("{}v{}_{}", BACKUP_PREFIX, tag, stamp),
        None => format!("{}{}", BACKUP_PREFIX, stamp),
    }
}

/// Whether a folder name follows the backup convention: the prefix followed
/// by a timestamp or a `v<tag>_` label
pub fn is_backup_name(name: &str) -> bool {
    match name.strip_prefix(BACKUP_PREFIX).and_then(|rest| rest.chars().next()) {
        Some(c) => c.is_ascii_digit() || c == 'v',
        None => false,
    }
}

/// Timestamp encoded in a backup folder name.
///
/// Accepts an optional `-N` suffix added when two backups land in the same
/// second.
pub fn parse_backup_time(name: &str) -> Option<NaiveDateTime> {
    if !is_backup_name(name) {
        return None;
    }
    let body = match name.rsplit_once('-') {
        Some((head, counter)) if !counter.is_empty() && counter.bytes().all(|b| b.is_ascii_digit()) => head,
        _ => name,
    };
    let stamp = body.get(body.len().checked_sub(TIMESTAMP_LEN)?..)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

/// Path separators and other characters that cannot appear in a folder
/// name are replaced with `_`
fn sanitize_tag(tag: &str) -> String {
    tag.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
