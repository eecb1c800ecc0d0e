use std::path::{Path, PathBuf};

/// Where the store keeps canonical files and in-flight chunked uploads.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the canonical files.
    pub root: PathBuf,
    /// Directory for staged (shallow) copies of chunked uploads.
    ///
    /// Kept outside `root` so partially uploaded content is never reachable
    /// through a canonical path.
    pub staging: PathBuf,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>, staging: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staging: staging.into(),
        }
    }

    /// Root and staging side by side under `base`.
    pub fn under(base: &Path) -> Self {
        Self::new(base.join("root"), base.join("staging"))
    }
}
