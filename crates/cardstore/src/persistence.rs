use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::StoreError;

/// Writes `body` to `path`, failing instead of overwriting an existing file.
///
/// The check-then-write callers perform beforehand can race with another
/// writer; `create_new` is what guarantees nothing is replaced.
pub fn write_new(path: &Path, body: &[u8]) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|err| StoreError::io_at(err, dir))?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| exclusive_error(err, path))?;
    file.write_all(body)
        .map_err(|err| StoreError::io_at(err, path))?;
    Ok(())
}

/// Pretty-prints `value` as JSON into a new file.
pub fn write_json_new<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let body = format!("{}\n", serde_json::to_string_pretty(value)?);
    write_new(path, body.as_bytes())
}

/// Replaces the whole content of `path` with `value` as JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let body = format!("{}\n", serde_json::to_string_pretty(value)?);
    fs::write(path, body).map_err(|err| StoreError::io_at(err, path))
}

/// Copies `source` to `target` without replacing an existing `target`.
///
/// A copy that fails midway removes the partial `target`.
pub fn copy_new(source: &Path, target: &Path) -> Result<(), StoreError> {
    let mut input = fs::File::open(source).map_err(|err| StoreError::io_at(err, source))?;
    stream_new(&mut input, target)
}

fn stream_new(input: &mut impl Read, target: &Path) -> Result<(), StoreError> {
    let mut output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .map_err(|err| exclusive_error(err, target))?;
    if let Err(err) = io::copy(input, &mut output) {
        drop(output);
        if let Err(cleanup) = fs::remove_file(target) {
            tracing::warn!(path = %target.display(), error = %cleanup, "failed to remove partial copy");
        }
        return Err(StoreError::io_at(err, target));
    }
    Ok(())
}

/// Creates exactly one directory; an existing directory is an error.
pub fn create_dir_new(path: &Path) -> Result<(), StoreError> {
    fs::create_dir(path).map_err(|err| exclusive_error(err, path))
}

fn exclusive_error(err: io::Error, path: &Path) -> StoreError {
    if err.kind() == ErrorKind::AlreadyExists {
        StoreError::AlreadyExists(path.display().to_string())
    } else {
        StoreError::io_at(err, path)
    }
}

/// Rejects names that would escape their collection directory.
pub fn ensure_safe_name(name: &str, kind: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidInput(format!(
            "{kind} name must not be empty"
        )));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(StoreError::InvalidInput(format!(
            "{kind} name '{name}' must not contain path separators"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_new_refuses_to_overwrite() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("file.json");
        write_new(&path, b"one").unwrap();

        let err = write_new(&path, b"two").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "one");
    }

    #[test]
    fn copy_new_refuses_to_overwrite() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("source.txt");
        let target = temp.path().join("target.txt");
        fs::write(&source, "data").unwrap();
        copy_new(&source, &target).unwrap();
        assert!(matches!(
            copy_new(&source, &target),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    struct BrokenReader {
        sent: bool,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::other("device lost"));
            }
            self.sent = true;
            buf[..3].copy_from_slice(b"abc");
            Ok(3)
        }
    }

    #[test]
    fn failed_copy_leaves_no_partial_target() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("target.txt");

        let err = stream_new(&mut BrokenReader { sent: false }, &target).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)), "{err}");
        assert!(!target.exists());

        let source = temp.path().join("source.txt");
        fs::write(&source, "data").unwrap();
        copy_new(&source, &target).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "data");
    }

    #[test]
    fn unsafe_names_are_rejected() {
        assert!(ensure_safe_name("", "card type").is_err());
        assert!(ensure_safe_name("a/b", "card type").is_err());
        assert!(ensure_safe_name("..", "card type").is_err());
        assert!(ensure_safe_name("task", "card type").is_ok());
    }
}
