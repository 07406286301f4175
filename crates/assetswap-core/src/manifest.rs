//! The fixed, ordered list of resource paths a cache version must contain.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AssetManifest {
    paths: Vec<String>,
}

impl AssetManifest {
    /// Build a manifest, rejecting empty lists, duplicates and relative paths.
    pub fn new<I, S>(paths: I) -> Result<Self, ManifestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            return Err(ManifestError::Empty);
        }

        let mut seen = HashSet::with_capacity(paths.len());
        for path in &paths {
            if !path.starts_with('/') {
                return Err(ManifestError::NotAbsolute(path.clone()));
            }
            if !seen.insert(path.as_str()) {
                return Err(ManifestError::Duplicate(path.clone()));
            }
        }

        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Always false; a manifest cannot be constructed empty.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn key_set(&self) -> BTreeSet<&str> {
        self.paths.iter().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

impl TryFrom<Vec<String>> for AssetManifest {
    type Error = ManifestError;

    fn try_from(paths: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(paths)
    }
}

impl From<AssetManifest> for Vec<String> {
    fn from(manifest: AssetManifest) -> Self {
        manifest.paths
    }
}
