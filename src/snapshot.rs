//! Directory snapshots and change detection.
//!
//! A snapshot flattens a directory tree into a key/value map: the key is the
//! file's path relative to the root with every separator replaced by `.`
//! (secret keys cannot contain slashes), the value is the raw file bytes.
//! Snapshots are plain values; deciding whether a resync is needed is a pure
//! comparison between two of them.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Flat key → bytes mapping shared by snapshots and remote secret data.
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// Character substituted for the platform path separator in secret keys.
pub const KEY_DELIMITER: char = '.';

/// Reads every file under `root` into a [`SecretData`] map.
///
/// Directories contribute no entry, only their contents. Symlinks and other
/// non-regular entries go through the same read path as regular files, so a
/// dangling link fails the whole snapshot. Any walk or read error aborts the
/// operation; no partial snapshot is ever returned.
pub fn read_dir_snapshot(root: &Path) -> Result<SecretData> {
    let mut data = SecretData::new();

    for entry in WalkDir::new(root) {
        let entry =
            entry.with_context(|| format!("failed to walk folder {}", root.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let content = std::fs::read(path)
            .with_context(|| format!("failed to read file {}", path.display()))?;

        let rel = path
            .strip_prefix(root)
            .with_context(|| format!("failed to get relative path for {}", path.display()))?;
        let key = rel
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, &KEY_DELIMITER.to_string());

        debug!(path = %path.display(), key = %key, bytes = content.len(), "Read file");
        data.insert(key, content);
    }

    Ok(data)
}

/// Returns `true` when `new` differs from `old` and a resync must happen.
///
/// Equality is key-count plus per-key byte identity; together those imply
/// full bidirectional equality, so one direction of key lookups suffices.
pub fn changed(old: &SecretData, new: &SecretData) -> bool {
    if old.len() != new.len() {
        return true;
    }

    for (key, new_value) in new {
        match old.get(key) {
            Some(old_value) if old_value == new_value => {}
            _ => return true,
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn data(entries: &[(&str, &str)]) -> SecretData {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn test_snapshot_flat_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();
        fs::write(dir.path().join("b.txt"), "22").unwrap();

        let snap = read_dir_snapshot(dir.path()).unwrap();
        assert_eq!(snap, data(&[("a.txt", "1"), ("b.txt", "22")]));
    }

    #[test]
    fn test_snapshot_normalizes_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b").join("c.txt"), "2").unwrap();

        let snap = read_dir_snapshot(dir.path()).unwrap();
        assert_eq!(snap, data(&[("a.txt", "1"), ("b.c.txt", "2")]));
    }

    #[test]
    fn test_snapshot_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let snap = read_dir_snapshot(dir.path()).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn test_snapshot_directories_contribute_no_key() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("only").join("dirs")).unwrap();

        let snap = read_dir_snapshot(dir.path()).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn test_snapshot_missing_root_fails() {
        let result = read_dir_snapshot(Path::new("/definitely/not/a/real/dir"));
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_snapshot_dangling_symlink_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("link")).unwrap();

        let result = read_dir_snapshot(dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_changed_is_reflexive() {
        let s = data(&[("a", "1"), ("b", "2")]);
        assert!(!changed(&s, &s));

        let empty = SecretData::new();
        assert!(!changed(&empty, &empty));
    }

    #[test]
    fn test_changed_on_cardinality_difference() {
        let one = data(&[("a", "1")]);
        let two = data(&[("a", "1"), ("b", "2")]);
        assert!(changed(&one, &two));
        assert!(changed(&two, &one));
    }

    #[test]
    fn test_changed_on_content_difference() {
        let old = data(&[("a", "x")]);
        let new = data(&[("a", "y")]);
        assert!(changed(&old, &new));
    }

    #[test]
    fn test_changed_on_key_difference_same_cardinality() {
        let old = data(&[("a", "1")]);
        let new = data(&[("b", "1")]);
        assert!(changed(&old, &new));
    }

    #[test]
    fn test_unchanged_for_equal_maps() {
        let old = data(&[("a", "1"), ("b", "2")]);
        let new = data(&[("a", "1"), ("b", "2")]);
        assert!(!changed(&old, &new));
    }
}
