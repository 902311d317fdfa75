//! Where a destination lives

use std::path::Path;

/// Host named by a network-style path such as `\\build01\share\app` or
/// `//build01/share/app`. Local paths yield `None`.
pub fn remote_host_from_path(path: &Path) -> Option<String> {
    let raw = path.to_string_lossy();
    let rest = raw
        .strip_prefix(r"\\")
        .or_else(|| raw.strip_prefix("//"))?;

    // \\?\C:\... and \\.\pipe\... are local device paths
    if rest.starts_with('?') || rest.starts_with('.') {
        return None;
    }

    rest.split(['\\', '/'])
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Host to control the service on: the explicit option wins over one derived
/// from the destination path.
pub fn resolve_host(explicit: Option<&str>, destination: &Path) -> Option<String> {
    match explicit.map(str::trim).filter(|h| !h.is_empty()) {
        Some(host) => Some(host.to_string()),
        None => remote_host_from_path(destination),
    }
}
