use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use super::{BlobRef, BlobStore};
use crate::error::{BackendError, BackendResult};

/// Blob store rooted at a directory. References are relative paths and
/// resolve to `file://` URLs.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn open(root: &Path) -> BackendResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn resolve_path(&self, relative: &str) -> BackendResult<PathBuf> {
        let candidate = Path::new(relative);
        let safe = !relative.is_empty()
            && candidate
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(BackendError::InvalidPath(relative.to_string()));
        }
        Ok(self.root.join(candidate))
    }
}

impl BlobStore for FsBlobStore {
    fn upload(&self, path: &str, bytes: &[u8]) -> BackendResult<BlobRef> {
        let target = self.resolve_path(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = target.as_os_str().to_owned();
        tmp_name.push(".part");
        let tmp = PathBuf::from(tmp_name);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        tracing::debug!(path, size = bytes.len(), "blob uploaded");
        Ok(BlobRef(path.to_string()))
    }

    fn resolve_url(&self, reference: &BlobRef) -> BackendResult<String> {
        let path = self.resolve_path(&reference.0)?;
        if !path.is_file() {
            return Err(BackendError::NotFound(reference.0.clone()));
        }
        let absolute = fs::canonicalize(&path)?;
        Ok(format!("file://{}", absolute.display()))
    }
}
