//! Typed views over disjoint prefixes of a [Reader] keyspace.
//!
//! Keys are stored as `prefix || encode(key)`. Every key type used with a
//! collection must encode to fixed-width big-endian bytes so that scans
//! return keys in logical order.

use crate::{
    kv::{prefix_end, Batch, Direction, Reader},
    Error,
};
use bytes::Buf;
use commonware_codec::{Encode, EncodeSize, Read, ReadExt, Write};
use std::{marker::PhantomData, ops::Bound};

/// A value that can be stored in a collection.
pub trait Codec: Write + EncodeSize + Read<Cfg = ()> {}

impl<T: Write + EncodeSize + Read<Cfg = ()>> Codec for T {}

fn decode<T: Codec>(raw: &[u8]) -> Result<T, Error> {
    let mut buf = raw;
    let value = T::read(&mut buf)?;
    if buf.has_remaining() {
        return Err(Error::TrailingBytes);
    }
    Ok(value)
}

/// Shared key handling for [Map] and [KeySet].
#[derive(Clone, Copy, Debug)]
struct Space {
    prefix: u8,
}

impl Space {
    fn key<K: Codec>(&self, key: &K) -> Vec<u8> {
        let mut raw = Vec::with_capacity(1 + key.encode_size());
        raw.push(self.prefix);
        raw.extend_from_slice(&key.encode());
        raw
    }

    fn scan<R: Reader, K: Codec>(
        &self,
        db: &R,
        start: Bound<&K>,
        end: Bound<&K>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(K, Vec<u8>)>, Error> {
        let start = match start {
            Bound::Included(key) => Bound::Included(self.key(key)),
            Bound::Excluded(key) => Bound::Excluded(self.key(key)),
            Bound::Unbounded => Bound::Included(vec![self.prefix]),
        };
        let end = match end {
            Bound::Included(key) => Bound::Included(self.key(key)),
            Bound::Excluded(key) => Bound::Excluded(self.key(key)),
            Bound::Unbounded => upper(vec![self.prefix]),
        };
        self.scan_raw(db, start, end, direction, limit)
    }

    fn scan_prefix<R: Reader, K: Codec, P: Codec>(
        &self,
        db: &R,
        prefix: &P,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(K, Vec<u8>)>, Error> {
        let start = self.key(prefix);
        let end = upper(start.clone());
        self.scan_raw(db, Bound::Included(start), end, direction, limit)
    }

    fn scan_raw<R: Reader, K: Codec>(
        &self,
        db: &R,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(K, Vec<u8>)>, Error> {
        let entries = db.scan(
            as_slice_bound(&start),
            as_slice_bound(&end),
            direction,
            limit,
        )?;
        entries
            .into_iter()
            .map(|(raw, value)| Ok((decode::<K>(&raw[1..])?, value)))
            .collect()
    }
}

fn upper(prefix: Vec<u8>) -> Bound<Vec<u8>> {
    match prefix_end(&prefix) {
        Some(end) => Bound::Excluded(end),
        None => Bound::Unbounded,
    }
}

fn as_slice_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_slice()),
        Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// A typed map stored under a single-byte prefix.
#[derive(Clone, Copy, Debug)]
pub struct Map<K, V> {
    space: Space,
    _phantom: PhantomData<(K, V)>,
}

impl<K: Codec, V: Codec> Map<K, V> {
    /// Create a map over the keys starting with `prefix`.
    pub const fn new(prefix: u8) -> Self {
        Self {
            space: Space { prefix },
            _phantom: PhantomData,
        }
    }

    /// Get the value at `key`.
    pub fn get(&self, db: &impl Reader, key: &K) -> Result<Option<V>, Error> {
        match db.get(&self.space.key(key))? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Returns true if `key` is present.
    pub fn has(&self, db: &impl Reader, key: &K) -> Result<bool, Error> {
        Ok(db.get(&self.space.key(key))?.is_some())
    }

    /// Stage a write of `value` at `key`.
    pub fn set<R: Reader>(&self, batch: &mut Batch<'_, R>, key: &K, value: &V) {
        batch.put(self.space.key(key), value.encode().to_vec());
    }

    /// Stage a delete of `key`.
    pub fn remove<R: Reader>(&self, batch: &mut Batch<'_, R>, key: &K) {
        batch.delete(self.space.key(key));
    }

    /// Return up to `limit` entries with keys within `(start, end)`.
    pub fn scan(
        &self,
        db: &impl Reader,
        start: Bound<&K>,
        end: Bound<&K>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(K, V)>, Error> {
        self.space
            .scan(db, start, end, direction, limit)?
            .into_iter()
            .map(|(key, raw)| Ok((key, decode(&raw)?)))
            .collect()
    }

    /// Return up to `limit` entries whose encoded key starts with the
    /// encoding of `prefix`.
    pub fn scan_prefix<P: Codec>(
        &self,
        db: &impl Reader,
        prefix: &P,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(K, V)>, Error> {
        self.space
            .scan_prefix(db, prefix, direction, limit)?
            .into_iter()
            .map(|(key, raw)| Ok((key, decode(&raw)?)))
            .collect()
    }
}

/// A typed set of keys stored under a single-byte prefix.
#[derive(Clone, Copy, Debug)]
pub struct KeySet<K> {
    space: Space,
    _phantom: PhantomData<K>,
}

impl<K: Codec> KeySet<K> {
    /// Create a set over the keys starting with `prefix`.
    pub const fn new(prefix: u8) -> Self {
        Self {
            space: Space { prefix },
            _phantom: PhantomData,
        }
    }

    /// Returns true if `key` is present.
    pub fn has(&self, db: &impl Reader, key: &K) -> Result<bool, Error> {
        Ok(db.get(&self.space.key(key))?.is_some())
    }

    /// Stage an insert of `key`.
    pub fn insert<R: Reader>(&self, batch: &mut Batch<'_, R>, key: &K) {
        batch.put(self.space.key(key), Vec::new());
    }

    /// Stage a delete of `key`.
    pub fn remove<R: Reader>(&self, batch: &mut Batch<'_, R>, key: &K) {
        batch.delete(self.space.key(key));
    }

    /// Return up to `limit` keys within `(start, end)`.
    pub fn scan(
        &self,
        db: &impl Reader,
        start: Bound<&K>,
        end: Bound<&K>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<K>, Error> {
        Ok(self
            .space
            .scan(db, start, end, direction, limit)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }
}
