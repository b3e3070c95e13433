use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Error that occurs when opening or reading a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to read file `{path}`: {source}")]
pub struct FileReadError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileReadError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use creo_manager::fsutil;
/// let reader = fsutil::open_file_reader("/sys/fs/cgroup/cpu.stat")?;
/// # Ok::<(), fsutil::FileReadError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileReadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Opens the file at `path`, returning `None` when it does not exist.
///
/// Any other failure (permissions, I/O) is still reported as an error, so a missing
/// controller file can be told apart from a broken one.
pub fn open_optional_reader(
    path: impl AsRef<Path>,
) -> Result<Option<BufReader<File>>, FileReadError> {
    match open_file_reader(path) {
        Ok(reader) => Ok(Some(reader)),
        Err(err) if err.source.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Reads the whole file at `path` into a trimmed string.
pub fn read_trimmed(path: impl AsRef<Path>) -> Result<String, FileReadError> {
    let path = path.as_ref();
    std::fs::read_to_string(path)
        .map(|content| content.trim().to_owned())
        .map_err(|source| FileReadError {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_open_file_reader_success() {
        let tmp = tempfile::NamedTempFile::new().expect("failed to create temp file");
        let path = tmp.path();
        let reader = open_file_reader(path).expect("should open test file");
        let metadata = reader.get_ref().metadata().unwrap();
        assert!(metadata.is_file());
    }

    #[test]
    fn test_open_file_reader_error() {
        let result = open_file_reader("/definitely/does/not/exist");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.path, PathBuf::from("/definitely/does/not/exist"));
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_open_optional_reader_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let reader = open_optional_reader(dir.path().join("memory.max")).unwrap();
        assert!(reader.is_none());
    }

    #[test]
    fn test_read_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostname");
        std::fs::write(&path, "  node-1\n").unwrap();
        assert_eq!(read_trimmed(&path).unwrap(), "node-1");
    }
}
