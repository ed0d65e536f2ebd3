// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use byteview::ByteView;

/// An immutable, cheaply clonable byte slice
///
/// Used for keys, values and filter tuples.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Slice(ByteView);

impl Slice {
    /// Constructs a [`Slice`] from a byte slice.
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        Self(ByteView::new(bytes))
    }

    /// Constructs an empty [`Slice`].
    #[must_use]
    pub fn empty() -> Self {
        Self::new(&[])
    }
}

impl std::fmt::Debug for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", &**self)
    }
}

impl std::ops::Deref for Slice {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Slice {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl std::borrow::Borrow<[u8]> for Slice {
    fn borrow(&self) -> &[u8] {
        self
    }
}

impl From<&[u8]> for Slice {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl<const N: usize> From<&[u8; N]> for Slice {
    fn from(value: &[u8; N]) -> Self {
        Self::new(value)
    }
}

impl<const N: usize> From<[u8; N]> for Slice {
    fn from(value: [u8; N]) -> Self {
        Self::new(&value)
    }
}

impl From<Vec<u8>> for Slice {
    fn from(value: Vec<u8>) -> Self {
        Self::new(&value)
    }
}

impl From<&Vec<u8>> for Slice {
    fn from(value: &Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Slice {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<String> for Slice {
    fn from(value: String) -> Self {
        Self::new(value.as_bytes())
    }
}

/// User defined key
pub type UserKey = Slice;

/// User defined data (blob of bytes)
pub type UserValue = Slice;

/// Value type (regular value or tombstone)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub enum ValueType {
    /// Existing value
    Value,

    /// Deleted value
    Tombstone,
}

impl From<u8> for ValueType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Value,
            _ => Self::Tombstone,
        }
    }
}

impl From<ValueType> for u8 {
    fn from(value: ValueType) -> Self {
        match value {
            ValueType::Value => 0,
            ValueType::Tombstone => 1,
        }
    }
}

/// A single key-value entry as stored in a component
#[derive(Clone, Eq, PartialEq)]
pub struct Entry {
    /// User-defined key
    pub key: UserKey,

    /// User-defined value, empty for tombstones
    pub value: UserValue,

    /// Tombstone marker
    pub value_type: ValueType,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}:{}",
            &*self.key,
            match self.value_type {
                ValueType::Value => "V",
                ValueType::Tombstone => "T",
            }
        )
    }
}

impl Entry {
    /// Creates a new entry.
    pub fn new<K: Into<UserKey>, V: Into<UserValue>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            value_type: ValueType::Value,
        }
    }

    /// Creates a new tombstone.
    pub fn new_tombstone<K: Into<UserKey>>(key: K) -> Self {
        Self {
            key: key.into(),
            value: Slice::empty(),
            value_type: ValueType::Tombstone,
        }
    }

    /// Returns `true` if the entry is a tombstone marker.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value_type == ValueType::Tombstone
    }

    /// Approximate in-memory size of the entry.
    #[must_use]
    pub fn size(&self) -> usize {
        std::mem::size_of::<Self>() + self.key.len() + self.value.len()
    }
}
