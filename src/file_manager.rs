// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::component::{ComponentFileReferences, ComponentId, ComponentTarget, FileReference};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

const INDEX_EXT: &str = "run";
const DELETE_EXT: &str = "del";
const BLOOM_EXT: &str = "bf";

/// Names component files and recovers the set of valid components
#[allow(clippy::module_name_repetitions)]
pub trait FileManager: Send + Sync {
    /// Directory holding the component files
    fn base_dir(&self) -> &Path;

    /// Files of the component with the given ID and level.
    fn file_references(&self, id: ComponentId, level: usize) -> ComponentFileReferences;

    /// Files of a flushed or bulk-loaded component.
    fn flush_file_references(&self, id: ComponentId) -> ComponentFileReferences {
        self.file_references(id, 0)
    }

    /// Deletes leftovers of crashed operations and returns the valid components,
    /// newest first.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn cleanup_and_get_valid_files(&self) -> crate::Result<Vec<ComponentTarget>>;

    /// Creates the base directory.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn create_dirs(&self) -> crate::Result<()>;

    /// Deletes the base directory and everything in it.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn delete_dirs(&self) -> crate::Result<()>;

    /// Makes file creations and deletions in the base directory durable.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn sync(&self) -> crate::Result<()> {
        Ok(())
    }
}

/// File manager keeping all components in a single directory
///
/// Files are named `c_{min}_{max}_{partition}_{level}.{run,del,bf}`.
#[derive(Clone, Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct DirectoryFileManager {
    base: PathBuf,
}

#[derive(Default)]
struct FileGroup {
    index: bool,
    delete: bool,
    bloom: bool,
    names: Vec<PathBuf>,
}

fn parse_file_name(name: &str) -> Option<(ComponentId, usize, &str)> {
    let (stem, ext) = name.rsplit_once('.')?;
    let mut parts = stem.strip_prefix("c_")?.split('_');

    let min = parts.next()?.parse().ok()?;
    let max = parts.next()?.parse().ok()?;
    let partition = parts.next()?.parse().ok()?;
    let level = parts.next()?.parse().ok()?;

    if parts.next().is_some() || min > max {
        return None;
    }

    Some((
        ComponentId::range(min, max).with_partition(partition),
        level,
        ext,
    ))
}

impl DirectoryFileManager {
    /// Creates a file manager for `base`.
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base: base.into() }
    }

    fn file_name(id: ComponentId, level: usize, ext: &str) -> String {
        format!(
            "c_{}_{}_{}_{level}.{ext}",
            id.min, id.max, id.partition
        )
    }

    fn delete_quietly(path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to delete {}: {e:?}", path.display());
            }
        }
    }
}

impl FileManager for DirectoryFileManager {
    fn base_dir(&self) -> &Path {
        &self.base
    }

    fn file_references(&self, id: ComponentId, level: usize) -> ComponentFileReferences {
        ComponentFileReferences {
            insert_index: FileReference::new(
                self.base.join(Self::file_name(id, level, INDEX_EXT)),
            ),
            delete_index: Some(FileReference::new(
                self.base.join(Self::file_name(id, level, DELETE_EXT)),
            )),
            bloom_filter: Some(FileReference::new(
                self.base.join(Self::file_name(id, level, BLOOM_EXT)),
            )),
        }
    }

    fn cleanup_and_get_valid_files(&self) -> crate::Result<Vec<ComponentTarget>> {
        let mut groups: BTreeMap<(ComponentIdKey, usize), FileGroup> = BTreeMap::new();

        for dirent in std::fs::read_dir(&self.base)? {
            let dirent = dirent?;
            let path = dirent.path();

            if !dirent.file_type()?.is_file() {
                continue;
            }

            let name = dirent.file_name();
            let Some(name) = name.to_str() else {
                log::warn!("ignoring file with invalid name: {}", path.display());
                continue;
            };

            let Some((id, level, ext)) = parse_file_name(name) else {
                log::debug!("ignoring unknown file {name:?}");
                continue;
            };

            let group = groups.entry((ComponentIdKey(id), level)).or_default();

            match ext {
                INDEX_EXT => group.index = true,
                DELETE_EXT => group.delete = true,
                BLOOM_EXT => group.bloom = true,
                _ => {
                    log::debug!("ignoring unknown file {name:?}");
                    continue;
                }
            }

            group.names.push(path);
        }

        let mut valid = Vec::with_capacity(groups.len());

        for ((ComponentIdKey(id), level), group) in groups {
            if group.index && group.delete && group.bloom {
                valid.push((id, level));
            } else {
                log::info!("deleting incomplete component {id} (L{level})");
                for path in &group.names {
                    Self::delete_quietly(path);
                }
            }
        }

        let (covered, mut valid): (Vec<_>, Vec<_>) = valid.iter().copied().partition(|(id, _)| {
            valid.iter().any(|(other, _)| {
                other.covers(id) && (other.min, other.max) != (id.min, id.max)
            })
        });

        for (id, level) in covered {
            log::info!("deleting merged leftover component {id} (L{level})");

            for file in self.file_references(id, level).iter() {
                Self::delete_quietly(file.path());
            }
        }

        valid.sort_by(|(a, _), (b, _)| {
            b.max
                .cmp(&a.max)
                .then(b.min.cmp(&a.min))
                .then(a.partition.cmp(&b.partition))
        });

        Ok(valid
            .into_iter()
            .map(|(id, level)| ComponentTarget {
                id,
                level,
                files: self.file_references(id, level),
            })
            .collect())
    }

    fn create_dirs(&self) -> crate::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        self.sync()
    }

    fn delete_dirs(&self) -> crate::Result<()> {
        match std::fs::remove_dir_all(&self.base) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn sync(&self) -> crate::Result<()> {
        // NOTE: Cannot fsync directories on Windows
        #[cfg(not(target_os = "windows"))]
        {
            let folder = std::fs::File::open(&self.base)?;
            folder.sync_all()?;
        }

        Ok(())
    }
}

/// Orders component IDs by range, then partition
#[derive(Copy, Clone, Eq, PartialEq)]
struct ComponentIdKey(ComponentId);

impl Ord for ComponentIdKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.0.min, self.0.max, self.0.partition).cmp(&(other.0.min, other.0.max, other.0.partition))
    }
}

impl PartialOrd for ComponentIdKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn touch(refs: &ComponentFileReferences) -> crate::Result<()> {
        for file in refs.iter() {
            std::fs::write(file.path(), b"x")?;
        }
        Ok(())
    }

    #[test]
    fn file_manager_parse_name() {
        assert_eq!(
            Some((ComponentId::range(1, 4).with_partition(2), 3, "run")),
            parse_file_name("c_1_4_2_3.run")
        );
        assert_eq!(None, parse_file_name("c_4_1_0_0.run"));
        assert_eq!(None, parse_file_name("journal.log"));
        assert_eq!(None, parse_file_name("c_1_2_3.run"));
    }

    #[test]
    fn file_manager_cleanup() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let fm = DirectoryFileManager::new(folder.path());

        // merged leftovers, covered by [1, 3]
        touch(&fm.file_references(ComponentId::single(1), 0))?;
        touch(&fm.file_references(ComponentId::single(2), 0))?;
        touch(&fm.file_references(ComponentId::range(1, 3), 0))?;

        // leveled outputs share a range
        touch(&fm.file_references(ComponentId::range(4, 5), 1))?;
        touch(&fm.file_references(ComponentId::range(4, 5).with_partition(1), 1))?;

        touch(&fm.file_references(ComponentId::single(6), 0))?;

        // incomplete flush
        let incomplete = fm.flush_file_references(ComponentId::single(7));
        std::fs::write(incomplete.insert_index.path(), b"x")?;

        let valid = fm.cleanup_and_get_valid_files()?;
        let ids = valid.iter().map(|x| x.id).collect::<Vec<_>>();

        assert_eq!(
            vec![
                ComponentId::single(6),
                ComponentId::range(4, 5),
                ComponentId::range(4, 5).with_partition(1),
                ComponentId::range(1, 3),
            ],
            ids
        );

        assert_eq!(1, valid.get(1).map(|x| x.level).unwrap_or_default());
        assert!(!incomplete.insert_index.path().exists());
        assert!(!fm
            .flush_file_references(ComponentId::single(1))
            .insert_index
            .path()
            .exists());

        Ok(())
    }
}
