// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::id::ComponentId;
use std::path::{Path, PathBuf};

/// Absolute path of a single component file
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FileReference(PathBuf);

impl FileReference {
    /// Creates a file reference.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self(path.into())
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Returns the file name, or an empty string if the path has none.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|x| x.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for FileReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// The file triple backing a disk component
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComponentFileReferences {
    /// Live entries
    pub insert_index: FileReference,

    /// Tombstoned keys
    pub delete_index: Option<FileReference>,

    /// Bloom filter over all keys
    pub bloom_filter: Option<FileReference>,
}

impl ComponentFileReferences {
    /// Iterates over all present files.
    pub fn iter(&self) -> impl Iterator<Item = &FileReference> + '_ {
        std::iter::once(&self.insert_index)
            .chain(self.delete_index.as_ref())
            .chain(self.bloom_filter.as_ref())
    }
}

/// Where a flush, merge or bulk load writes its output
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComponentTarget {
    /// ID of the component to be created
    pub id: ComponentId,

    /// Level of the component to be created
    pub level: usize,

    /// Files of the component to be created
    pub files: ComponentFileReferences,
}
