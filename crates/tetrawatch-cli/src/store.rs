use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tetrawatch_pipeline::{KeyValueStore, StoreError};

const EXTENSION: &str = "json";

/// Key-value store backed by a directory: key `a/b/c` lives in `<root>/a/b/c.json`.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
        if !valid {
            return Err(StoreError::Io {
                key: key.to_owned(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "malformed key"),
            });
        }
        Ok(self.root.join(format!("{key}.{EXTENSION}")))
    }
}

fn collect_keys(dir: &Path, prefix: &str, keys: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if entry.file_type()?.is_dir() {
            collect_keys(&path, &format!("{prefix}{name}/"), keys)?;
        } else if let Some(stem) = name.strip_suffix(&format!(".{EXTENSION}")) {
            keys.push(format!("{prefix}{stem}"));
        }
    }
    Ok(())
}

impl KeyValueStore for DirStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_owned(),
                source,
            }),
        }
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path(key)?;
        let io_error = |source| StoreError::Io {
            key: key.to_owned(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(&path, bytes).map_err(io_error)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        if !self.root.exists() {
            return Ok(keys);
        }
        collect_keys(&self.root, "", &mut keys).map_err(|source| StoreError::Io {
            key: self.root.display().to_string(),
            source,
        })?;
        keys.sort();
        Ok(keys)
    }
}
