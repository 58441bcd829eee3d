//! Snapshot encoding and file handling
//!
//! A snapshot is one JSON object mapping every key to its value. Files are
//! replaced atomically: the document goes to `<path>.tmp`, is fsynced, then
//! renamed over the destination. The destination's permissions carry over to
//! the new file, and on unix the directory is fsynced after the rename.

use crate::error::{Result, StoreError};
use crate::types::Value;
use serde::ser::Error as _;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Document written when loading from a path that does not exist yet
pub const EMPTY_DOCUMENT: &[u8] = b"{}";

/// Deepest container nesting allowed inside one entry
///
/// `serde_json` refuses documents nested 128 levels or more, and the
/// top-level object takes one of those levels.
pub const MAX_VALUE_DEPTH: usize = 126;

/// Encode the map as a compact JSON object with sorted keys
///
/// Fails for values `decode` could not read back: non-finite floats and
/// entries nested deeper than [`MAX_VALUE_DEPTH`].
pub fn encode(entries: &HashMap<String, Value>) -> Result<Vec<u8>> {
    let sorted: BTreeMap<&str, &Value> = entries.iter().map(|(k, v)| (k.as_str(), v)).collect();

    for (key, value) in &sorted {
        let depth = value.depth();
        if depth > MAX_VALUE_DEPTH {
            return Err(StoreError::Encode(serde_json::Error::custom(format!(
                "value for key {:?} is nested {} levels deep (limit {})",
                key, depth, MAX_VALUE_DEPTH
            ))));
        }
    }

    let mut buf = serde_json::to_vec(&sorted).map_err(StoreError::Encode)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Decode a JSON object document read from `path`
pub fn decode(path: &Path, bytes: &[u8]) -> Result<HashMap<String, Value>> {
    let document: Value = serde_json::from_slice(bytes).map_err(|e| StoreError::decode(path, e))?;

    match document {
        Value::Map(map) => Ok(map.into_iter().collect()),
        other => Err(StoreError::NotAnObject {
            path: path.to_path_buf(),
            found: other.type_name(),
        }),
    }
}

/// Read and decode the document at `path`
///
/// Returns `Ok(None)` when the file did not exist; in that case it is
/// created containing an empty object.
pub fn read_or_create(path: &Path) -> Result<Option<HashMap<String, Value>>> {
    match fs::read(path) {
        Ok(bytes) => decode(path, &bytes).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Snapshot {} not found, creating empty document", path.display());
            fs::write(path, EMPTY_DOCUMENT).map_err(|e| StoreError::io(path, e))?;
            Ok(None)
        }
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Replace the file at `path` with `bytes` atomically
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(path);

    if let Err(e) = write_and_sync(&temp_path, bytes) {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io(&temp_path, e));
    }

    // Keep the mode of the file being replaced
    if let Ok(metadata) = fs::metadata(path) {
        if let Err(e) = fs::set_permissions(&temp_path, metadata.permissions()) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io(&temp_path, e));
        }
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io(path, e));
    }

    let dir = parent_dir(path);
    sync_dir(dir).map_err(|e| StoreError::io(dir, e))
}

/// Directory holding `path`; `.` for a bare file name
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Persist the directory entry created by a rename
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

/// Sibling temp file: `data.json` -> `data.json.tmp`
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("snapshot"));
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_empty_map() {
        let encoded = encode(&HashMap::new()).unwrap();
        assert_eq!(encoded, b"{}\n");
    }

    #[test]
    fn test_encode_sorts_keys() {
        let mut entries = HashMap::new();
        entries.insert("zeta".to_string(), Value::Int(1));
        entries.insert("alpha".to_string(), Value::from("x"));

        let encoded = encode(&entries).unwrap();
        assert_eq!(encoded, b"{\"alpha\":\"x\",\"zeta\":1}\n");
    }

    #[test]
    fn test_encode_non_finite_float() {
        let mut entries = HashMap::new();
        entries.insert("bad".to_string(), Value::Float(f64::NAN));

        let err = encode(&entries).unwrap_err();
        assert!(matches!(err, StoreError::Encode(_)));
    }

    fn nested_list(depth: usize) -> Value {
        let mut value = Value::Null;
        for _ in 0..depth {
            value = Value::List(vec![value]);
        }
        value
    }

    #[test]
    fn test_encode_deepest_value_decodes() {
        let mut entries = HashMap::new();
        entries.insert("deep".to_string(), nested_list(MAX_VALUE_DEPTH));

        let encoded = encode(&entries).unwrap();
        let decoded = decode(Path::new("deep.json"), &encoded).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn test_encode_rejects_too_deep_value() {
        for depth in [MAX_VALUE_DEPTH + 1, 200] {
            let mut entries = HashMap::new();
            entries.insert("shallow".to_string(), Value::Int(1));
            entries.insert("deep".to_string(), nested_list(depth));

            let err = encode(&entries).unwrap_err();
            assert!(matches!(err, StoreError::Encode(_)));
            assert!(err.to_string().contains("deep"));
        }
    }

    #[test]
    fn test_decode_rejects_non_object() {
        let path = Path::new("list.json");

        let err = decode(path, b"[1, 2]").unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject { found: "array", .. }));
        assert!(err.is_decode());

        let err = decode(path, b"{\"unterminated\": ").unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));

        let err = decode(path, b"").unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_read_or_create_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fresh.json");

        assert!(read_or_create(&path).unwrap().is_none());
        assert_eq!(fs::read(&path).unwrap(), EMPTY_DOCUMENT);

        // Second read decodes the empty document it just wrote
        let entries = read_or_create(&path).unwrap().unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_read_or_create_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("no-such-dir").join("data.json");

        let err = read_or_create(&path).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");
        fs::write(&path, b"{\"old\":true}").unwrap();

        write_atomic(&path, b"{\"new\":true}\n").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"{\"new\":true}\n");
        assert!(!temp_path_for(&path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("secret.json");
        fs::write(&path, b"{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        write_atomic(&path, b"{\"token\":\"x\"}\n").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(fs::read(&path).unwrap(), b"{\"token\":\"x\"}\n");
    }

    #[test]
    fn test_sync_dir() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");

        assert_eq!(parent_dir(&path), temp_dir.path());
        assert_eq!(parent_dir(Path::new("data.json")), Path::new("."));
        sync_dir(parent_dir(&path)).unwrap();
        sync_dir(parent_dir(Path::new("data.json"))).unwrap();
    }

    #[test]
    fn test_write_atomic_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("data.json");

        let err = write_atomic(&path, b"{}").unwrap_err();
        assert!(err.is_io());
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_path_for() {
        assert_eq!(
            temp_path_for(Path::new("/var/lib/keva/data.json")),
            PathBuf::from("/var/lib/keva/data.json.tmp")
        );
    }
}
