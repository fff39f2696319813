//! Content hashing and project naming via rapidhash.

use std::path::Path;

/// 64-bit content hash rendered as a 16-character lowercase hex string.
///
/// Fast, non-cryptographic; used to detect content drift between the index
/// and the working tree, never for security.
pub fn content_hash(data: &[u8]) -> String {
    format!("{:016x}", rapidhash::v3::rapidhash_v3(data))
}

/// Deterministic store-namespace slug for a project directory.
///
/// `<dir-name>-<first 8 hex of path hash>` so that two checkouts of the same
/// repository under different paths get distinct namespaces while the slug
/// stays recognizable in `redis-cli`.
pub fn project_slug(root: &Path) -> String {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string());
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let digest = content_hash(root.to_string_lossy().as_bytes());
    format!("{}-{}", sanitized, &digest[..8])
}
