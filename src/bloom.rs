// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Error;
use bit_vec::BitVec;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const MAGIC_BYTES: [u8; 4] = *b"LSMB";

/// A basic bloom filter
///
/// Stored in the bloom filter file of a disk component.
#[derive(Debug, Eq, PartialEq)]
pub struct BloomFilter {
    /// Raw bytes exposed as bit field
    inner: BitVec,

    /// Bit count
    m: usize,

    /// Number of hash functions
    k: usize,
}

impl BloomFilter {
    /// Writes the filter.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn encode_into<W: Write>(&self, writer: &mut W) -> crate::Result<()> {
        writer.write_all(&MAGIC_BYTES)?;
        writer.write_u64::<BigEndian>(self.m as u64)?;
        writer.write_u64::<BigEndian>(self.k as u64)?;
        writer.write_all(&self.inner.to_bytes())?;
        Ok(())
    }

    /// Reads a filter written by [`BloomFilter::encode_into`].
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the filter is malformed.
    pub fn decode_from<R: Read>(reader: &mut R) -> crate::Result<Self> {
        let mut magic = [0u8; MAGIC_BYTES.len()];
        reader.read_exact(&mut magic)?;

        if magic != MAGIC_BYTES {
            return Err(Error::Corrupted("bloom filter header"));
        }

        let m = reader.read_u64::<BigEndian>()? as usize;
        let k = reader.read_u64::<BigEndian>()? as usize;

        if m == 0 || m % 8 != 0 || k == 0 {
            return Err(Error::Corrupted("bloom filter size"));
        }

        let mut bytes = vec![0; m / 8];
        reader.read_exact(&mut bytes)?;

        Ok(Self::from_raw(m, k, &bytes))
    }

    fn from_raw(m: usize, k: usize, bytes: &[u8]) -> Self {
        Self {
            inner: BitVec::from_bytes(bytes),
            m,
            k,
        }
    }

    pub(crate) fn calculate_m(n: usize, fp_rate: f32) -> usize {
        use std::f32::consts::LN_2;

        let n = n as f32;
        let ln2_squared = LN_2.powi(2);

        let m = -(n * fp_rate.ln() / ln2_squared);
        ((m / 8.0).ceil() * 8.0) as usize
    }

    /// Constructs a bloom filter that can hold `item_count` items
    /// while maintaining a certain false positive rate.
    #[must_use]
    pub fn with_fp_rate(item_count: usize, fp_rate: f32) -> Self {
        // NOTE: Some sensible minimum
        let fp_rate = fp_rate.clamp(0.000_001, 0.999);

        let k = 7;
        let m = Self::calculate_m(item_count.max(1), fp_rate).max(8);

        Self {
            inner: BitVec::from_elem(m, false),
            m,
            k,
        }
    }

    fn split_hash(hash: u128) -> (usize, usize) {
        let h1 = (hash & 0xFFFF_FFFF_FFFF_FFFF) as usize;
        let h2 = ((hash >> 64) & 0xFFFF_FFFF_FFFF_FFFF) as usize;
        (h1, h2)
    }

    fn set_pos(&mut self, idx: usize) {
        self.inner.set(idx, true);
    }

    /// Returns `true` if the item may be contained.
    ///
    /// Will never have a false negative.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = Self::split_hash(Self::get_hash(key));

        let mut hash = h1;
        for _ in 0..self.k {
            hash = hash.wrapping_add(self.k.wrapping_mul(h2));
            let idx = hash % self.m;

            if !self.inner.get(idx).unwrap_or(false) {
                return false;
            }
        }

        true
    }

    /// Adds the key to the filter
    pub fn set_with_hash(&mut self, hash: u128) {
        let (h1, h2) = Self::split_hash(hash);

        let mut hash = h1;
        for _ in 0..self.k {
            hash = hash.wrapping_add(self.k.wrapping_mul(h2));
            let idx = hash % self.m;

            self.set_pos(idx);
        }
    }

    /// Gets the hash of a key
    #[must_use]
    pub fn get_hash(key: &[u8]) -> u128 {
        xxhash_rust::xxh3::xxh3_128(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn bloom_calculate_m() {
        assert_eq!(9_592, BloomFilter::calculate_m(1_000, 0.01));
        assert_eq!(4_800, BloomFilter::calculate_m(1_000, 0.1));
        assert_eq!(4_792_536, BloomFilter::calculate_m(1_000_000, 0.1));
    }

    #[test]
    fn bloom_basic() {
        let mut filter = BloomFilter::with_fp_rate(10, 0.0001);

        for key in [
            b"item0", b"item1", b"item2", b"item3", b"item4", b"item5", b"item6", b"item7",
            b"item8", b"item9",
        ] {
            assert!(!filter.contains(key));
            filter.set_with_hash(BloomFilter::get_hash(key));
            assert!(filter.contains(key));

            assert!(!filter.contains(nanoid::nanoid!().as_bytes()));
        }
    }

    #[test]
    fn bloom_encode_decode() -> crate::Result<()> {
        let mut filter = BloomFilter::with_fp_rate(100, 0.01);
        filter.set_with_hash(BloomFilter::get_hash(b"a"));

        let mut bytes = vec![];
        filter.encode_into(&mut bytes)?;

        let decoded = BloomFilter::decode_from(&mut &bytes[..])?;
        assert_eq!(filter, decoded);
        assert!(decoded.contains(b"a"));
        Ok(())
    }

    #[test]
    fn bloom_decode_garbage() {
        let bytes = b"nope0000000000000000";
        assert!(matches!(
            BloomFilter::decode_from(&mut &bytes[..]),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn bloom_fpr() {
        let item_count = 100_000;
        let fpr = 0.01;

        let mut filter = BloomFilter::with_fp_rate(item_count, fpr);

        for key in (0..item_count).map(|_| nanoid::nanoid!()) {
            let key = key.as_bytes();

            filter.set_with_hash(BloomFilter::get_hash(key));
            assert!(filter.contains(key));
        }

        let mut false_positives = 0;

        for key in (0..item_count).map(|_| nanoid::nanoid!()) {
            let key = key.as_bytes();

            if filter.contains(key) {
                false_positives += 1;
            }
        }

        assert!(false_positives < 2_000);
    }
}
