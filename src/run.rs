// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! On-disk format of sorted-run components
//!
//! A component is a triple of files:
//!
//! - the index file holds the live entries (key and value), followed by the
//!   component filter,
//! - the delete-index file holds the keys of tombstones,
//! - the bloom filter file holds a bloom filter over all keys.
//!
//! Index and delete-index files end with an xxh3 checksum of their contents.

use crate::{
    bloom::BloomFilter,
    buffer_cache::BufferCache,
    component::{ComponentFileReferences, FileReference},
    operation::SearchPredicate,
    value::{Entry, Slice, ValueType},
    Error,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    io::{Read, Write},
    ops::Bound,
};

const INDEX_MAGIC: [u8; 4] = *b"LSMR";
const DELETE_MAGIC: [u8; 4] = *b"LSMD";
const FORMAT_VERSION: u8 = 1;

/// How a run is written
#[derive(Clone, Debug)]
pub struct RunWriteOptions {
    /// False positive rate of the bloom filter
    pub bloom_filter_fp_rate: f32,

    /// Sync files to disk after writing
    pub durable: bool,

    /// Component filter bounds stored in the index file
    pub filter: Option<(Slice, Slice)>,
}

/// A sorted, immutable set of entries loaded from component files
#[derive(Debug)]
pub struct SortedRun {
    entries: Vec<Entry>,
    bloom: Option<BloomFilter>,
    filter: Option<(Slice, Slice)>,
    size_bytes: u64,
}

fn write_slice<W: Write>(writer: &mut W, bytes: &[u8]) -> crate::Result<()> {
    #[allow(clippy::cast_possible_truncation)]
    writer.write_u32::<BigEndian>(bytes.len() as u32)?;
    writer.write_all(bytes)?;
    Ok(())
}

fn read_slice<R: Read>(reader: &mut R) -> crate::Result<Slice> {
    let len = reader.read_u32::<BigEndian>()? as usize;
    let mut bytes = vec![0; len];
    reader.read_exact(&mut bytes)?;
    Ok(Slice::from(bytes))
}

fn seal_checksum(mut buf: Vec<u8>) -> crate::Result<Vec<u8>> {
    let checksum = xxhash_rust::xxh3::xxh3_64(&buf);
    buf.write_u64::<BigEndian>(checksum)?;
    Ok(buf)
}

fn verify_checksum(bytes: &[u8]) -> crate::Result<&[u8]> {
    let split = bytes
        .len()
        .checked_sub(std::mem::size_of::<u64>())
        .ok_or(Error::Corrupted("run file is truncated"))?;

    let (body, mut trailer) = bytes.split_at(split);
    let expected = trailer.read_u64::<BigEndian>()?;

    if xxhash_rust::xxh3::xxh3_64(body) != expected {
        return Err(Error::Corrupted("run file checksum mismatch"));
    }

    Ok(body)
}

fn read_header<R: Read>(reader: &mut R, magic: [u8; 4]) -> crate::Result<u64> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;

    if buf != magic {
        return Err(Error::Corrupted("run file header"));
    }

    if reader.read_u8()? != FORMAT_VERSION {
        return Err(Error::Corrupted("run file version"));
    }

    Ok(reader.read_u64::<BigEndian>()?)
}

fn write_file(
    cache: &dyn BufferCache,
    file: &FileReference,
    bytes: &[u8],
    durable: bool,
) -> crate::Result<()> {
    let mut handle = cache.create_file(file)?;
    handle.write_all(bytes)?;
    handle.flush()?;

    if durable {
        handle.sync_all()?;
    }

    Ok(())
}

fn read_file(cache: &dyn BufferCache, file: &FileReference) -> crate::Result<Vec<u8>> {
    let mut handle = cache.open_file(file)?;
    let mut bytes = vec![];
    handle.read_to_end(&mut bytes)?;
    Ok(bytes)
}

impl SortedRun {
    /// Writes entries into the component files and returns the loaded run.
    ///
    /// Entries must be sorted by key without duplicates.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn write<I: IntoIterator<Item = Entry>>(
        cache: &dyn BufferCache,
        files: &ComponentFileReferences,
        entries: I,
        opts: &RunWriteOptions,
    ) -> crate::Result<Self> {
        let entries = entries.into_iter().collect::<Vec<_>>();

        debug_assert!(
            entries.windows(2).all(|w| match w {
                [a, b] => a.key < b.key,
                _ => true,
            }),
            "run entries should be sorted"
        );

        let live_count = entries.iter().filter(|x| !x.is_tombstone()).count();
        let tombstone_count = entries.len() - live_count;

        let mut index = vec![];
        index.write_all(&INDEX_MAGIC)?;
        index.write_u8(FORMAT_VERSION)?;
        index.write_u64::<BigEndian>(live_count as u64)?;

        for entry in entries.iter().filter(|x| !x.is_tombstone()) {
            write_slice(&mut index, &entry.key)?;
            write_slice(&mut index, &entry.value)?;
        }

        match &opts.filter {
            Some((min, max)) => {
                index.write_u8(1)?;
                write_slice(&mut index, min)?;
                write_slice(&mut index, max)?;
            }
            None => index.write_u8(0)?,
        }

        let index = seal_checksum(index)?;
        write_file(cache, &files.insert_index, &index, opts.durable)?;

        let mut size_bytes = index.len() as u64;

        if let Some(file) = &files.delete_index {
            let mut deletes = vec![];
            deletes.write_all(&DELETE_MAGIC)?;
            deletes.write_u8(FORMAT_VERSION)?;
            deletes.write_u64::<BigEndian>(tombstone_count as u64)?;

            for entry in entries.iter().filter(|x| x.is_tombstone()) {
                write_slice(&mut deletes, &entry.key)?;
            }

            let deletes = seal_checksum(deletes)?;
            write_file(cache, file, &deletes, opts.durable)?;
            size_bytes += deletes.len() as u64;
        }

        let bloom = if let Some(file) = &files.bloom_filter {
            let mut bloom = BloomFilter::with_fp_rate(entries.len(), opts.bloom_filter_fp_rate);
            for entry in &entries {
                bloom.set_with_hash(BloomFilter::get_hash(&entry.key));
            }

            let mut bytes = vec![];
            bloom.encode_into(&mut bytes)?;
            write_file(cache, file, &bytes, opts.durable)?;
            size_bytes += bytes.len() as u64;

            Some(bloom)
        } else {
            None
        };

        Ok(Self {
            entries,
            bloom,
            filter: opts.filter.clone(),
            size_bytes,
        })
    }

    /// Loads a run from its component files.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or a file is malformed.
    pub fn load(cache: &dyn BufferCache, files: &ComponentFileReferences) -> crate::Result<Self> {
        let bytes = read_file(cache, &files.insert_index)?;
        let mut size_bytes = bytes.len() as u64;
        let mut reader = verify_checksum(&bytes)?;

        let live_count = read_header(&mut reader, INDEX_MAGIC)?;

        let mut entries = Vec::with_capacity(live_count as usize);
        for _ in 0..live_count {
            let key = read_slice(&mut reader)?;
            let value = read_slice(&mut reader)?;
            entries.push(Entry::new(key, value));
        }

        let filter = match reader.read_u8()? {
            0 => None,
            _ => Some((read_slice(&mut reader)?, read_slice(&mut reader)?)),
        };

        if let Some(file) = &files.delete_index {
            let bytes = read_file(cache, file)?;
            size_bytes += bytes.len() as u64;
            let mut reader = verify_checksum(&bytes)?;

            let tombstone_count = read_header(&mut reader, DELETE_MAGIC)?;

            for _ in 0..tombstone_count {
                entries.push(Entry::new_tombstone(read_slice(&mut reader)?));
            }

            entries.sort_by(|a, b| a.key.cmp(&b.key));
        }

        let bloom = if let Some(file) = &files.bloom_filter {
            let bytes = read_file(cache, file)?;
            size_bytes += bytes.len() as u64;
            Some(BloomFilter::decode_from(&mut &bytes[..])?)
        } else {
            None
        };

        Ok(Self {
            entries,
            bloom,
            filter,
            size_bytes,
        })
    }

    /// Number of entries, tombstones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the run has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all file sizes
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Sum of key and value lengths
    #[must_use]
    pub fn payload_size(&self) -> u64 {
        self.entries
            .iter()
            .map(|x| (x.key.len() + x.value.len()) as u64)
            .sum()
    }

    /// All entries, sorted by key
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Lowest and highest key
    #[must_use]
    pub fn key_range(&self) -> Option<(Slice, Slice)> {
        let first = self.entries.first()?;
        let last = self.entries.last()?;
        Some((first.key.clone(), last.key.clone()))
    }

    /// Component filter bounds stored in the index file
    #[must_use]
    pub fn filter(&self) -> Option<&(Slice, Slice)> {
        self.filter.as_ref()
    }

    /// Returns `false` if the key is definitely not in the run.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.bloom.as_ref().map_or(true, |bloom| bloom.contains(key))
    }

    /// Point read, tombstones included.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&Entry> {
        if !self.may_contain(key) {
            return None;
        }

        self.entries
            .binary_search_by(|x| (*x.key).cmp(key))
            .ok()
            .and_then(|idx| self.entries.get(idx))
    }

    /// Entries inside the predicate's key bounds, tombstones included.
    pub fn range<'a>(&'a self, predicate: &'a SearchPredicate) -> impl Iterator<Item = &'a Entry> {
        let start = match &predicate.low {
            Bound::Included(key) => self.entries.partition_point(|x| x.key < *key),
            Bound::Excluded(key) => self.entries.partition_point(|x| x.key <= *key),
            Bound::Unbounded => 0,
        };

        self.entries
            .iter()
            .skip(start)
            .take_while(|x| predicate.contains(&x.key))
    }

    /// Value type of the entry stored under `key`, if any.
    #[must_use]
    pub fn value_type(&self, key: &[u8]) -> Option<ValueType> {
        self.get(key).map(|x| x.value_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_cache::FileBufferCache;
    use test_log::test;

    fn refs(folder: &std::path::Path) -> ComponentFileReferences {
        ComponentFileReferences {
            insert_index: FileReference::new(folder.join("c.run")),
            delete_index: Some(FileReference::new(folder.join("c.del"))),
            bloom_filter: Some(FileReference::new(folder.join("c.bf"))),
        }
    }

    fn opts() -> RunWriteOptions {
        RunWriteOptions {
            bloom_filter_fp_rate: 0.01,
            durable: false,
            filter: Some(("a".into(), "d".into())),
        }
    }

    #[test]
    fn run_write_load() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let cache = FileBufferCache::new();
        let files = refs(folder.path());

        let written = SortedRun::write(
            &cache,
            &files,
            vec![
                Entry::new("a", "1"),
                Entry::new_tombstone("b"),
                Entry::new("c", "3"),
                Entry::new_tombstone("d"),
            ],
            &opts(),
        )?;

        let loaded = SortedRun::load(&cache, &files)?;
        assert_eq!(written.entries(), loaded.entries());
        assert_eq!(written.size_bytes(), loaded.size_bytes());
        assert_eq!(Some(&(Slice::from("a"), Slice::from("d"))), loaded.filter());
        assert_eq!(Some((Slice::from("a"), Slice::from("d"))), loaded.key_range());

        assert_eq!(Some(ValueType::Value), loaded.value_type(b"a"));
        assert_eq!(Some(ValueType::Tombstone), loaded.value_type(b"b"));
        assert_eq!(None, loaded.value_type(b"x"));

        Ok(())
    }

    #[test]
    fn run_range() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let cache = FileBufferCache::new();

        let run = SortedRun::write(
            &cache,
            &refs(folder.path()),
            ["a", "b", "c", "d", "e"].into_iter().map(|k| Entry::new(k, k)),
            &opts(),
        )?;

        let predicate = SearchPredicate::range(
            Bound::Excluded("a".into()),
            Bound::Included("d".into()),
        );

        let keys = run
            .range(&predicate)
            .map(|x| x.key.clone())
            .collect::<Vec<Slice>>();

        assert_eq!(
            vec![Slice::from("b"), Slice::from("c"), Slice::from("d")],
            keys
        );

        Ok(())
    }

    #[test]
    fn run_detects_corruption() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let cache = FileBufferCache::new();
        let files = refs(folder.path());

        SortedRun::write(&cache, &files, vec![Entry::new("a", "1")], &opts())?;

        let mut bytes = std::fs::read(files.insert_index.path())?;
        if let Some(byte) = bytes.get_mut(10) {
            *byte ^= 0xFF;
        }
        std::fs::write(files.insert_index.path(), bytes)?;

        assert!(matches!(
            SortedRun::load(&cache, &files),
            Err(Error::Corrupted(_))
        ));

        Ok(())
    }
}
