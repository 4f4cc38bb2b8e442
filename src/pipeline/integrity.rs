//! Validation of engine output before anything is published

use std::path::Path;

use crate::error::{Error, Result};

/// Checks that `path` exists and holds more than `min_bytes`.
///
/// Returns the file size. Engines can report success while leaving a
/// near-empty file behind, so the call result alone is not trusted.
pub fn check_output(path: &Path, min_bytes: u64) -> Result<u64> {
    let size = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => {
            return Err(Error::Integrity(format!(
                "Warp output {} is missing",
                path.display()
            )))
        }
    };

    if size <= min_bytes {
        return Err(Error::Integrity(format!(
            "Warp output is {} bytes, expected more than {}",
            size, min_bytes
        )));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_output(&dir.path().join("warped.tif"), 1024).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warped.tif");

        std::fs::write(&path, vec![0u8; 1024]).unwrap();
        assert!(matches!(check_output(&path, 1024), Err(Error::Integrity(_))));

        std::fs::write(&path, vec![0u8; 1025]).unwrap();
        assert_eq!(check_output(&path, 1024).unwrap(), 1025);
    }

    #[test]
    fn test_directory_is_not_output() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_output(dir.path(), 0).is_err());
    }
}
