//! Ordered key-value storage with staged, all-or-nothing writes.

use crate::Error;
use std::{collections::BTreeMap, ops::Bound};

/// A key-value pair returned by [Reader::scan].
pub type Entry = (Vec<u8>, Vec<u8>);

/// Iteration order of [Reader::scan].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Read access to an ordered key-value store.
pub trait Reader {
    /// Get the value stored at `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    /// Return up to `limit` entries with keys within `(start, end)`, in the
    /// given direction.
    fn scan(
        &self,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<Entry>, Error>;
}

/// An ordered key-value store that accepts atomic change sets.
pub trait Kv: Reader {
    /// Apply every change in `changes`, or none of them.
    fn write(&mut self, changes: Changes) -> Result<(), Error>;
}

/// A set of pending writes (`Some`) and deletes (`None`).
#[derive(Debug, Default)]
pub struct Changes(BTreeMap<Vec<u8>, Option<Vec<u8>>>);

impl Changes {
    /// Number of pending changes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no pending changes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Changes {
    type Item = (Vec<u8>, Option<Vec<u8>>);
    type IntoIter = std::collections::btree_map::IntoIter<Vec<u8>, Option<Vec<u8>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A batch of changes staged on top of a [Reader].
///
/// Writes and deletes are not applied to the underlying store until the batch
/// is turned into [Changes] and written, but they are reflected in reads from
/// the batch.
pub struct Batch<'a, R: Reader> {
    db: &'a R,
    /// If the value is Some, the key is being created or updated.
    /// If the value is None, the key is being deleted.
    diff: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, R: Reader> Batch<'a, R> {
    /// Returns a new, empty batch over `db`.
    pub fn new(db: &'a R) -> Self {
        Self {
            db,
            diff: BTreeMap::new(),
        }
    }

    /// Stage a write of `value` at `key`.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.diff.insert(key, Some(value));
    }

    /// Stage a delete of `key`.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.diff.insert(key, None);
    }

    /// Consume the batch, returning the staged changes.
    pub fn into_changes(self) -> Changes {
        Changes(self.diff)
    }
}

impl<R: Reader> Reader for Batch<'_, R> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        if let Some(value) = self.diff.get(key) {
            return Ok(value.clone());
        }
        self.db.get(key)
    }

    fn scan(
        &self,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<Entry>, Error> {
        if !is_valid_range(start, end) || limit == 0 {
            return Ok(Vec::new());
        }

        // Each staged delete can hide at most one underlying entry
        let staged: Vec<(&Vec<u8>, &Option<Vec<u8>>)> =
            self.diff.range::<[u8], _>((start, end)).collect();
        let fetch = limit.saturating_add(staged.len());
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .db
            .scan(start, end, direction, fetch)?
            .into_iter()
            .collect();

        // The underlying scan may have stopped early, so only overlay staged
        // keys that fall within the window it covered
        let covered = |key: &[u8]| -> bool {
            let complete = merged.len() < fetch;
            if complete {
                return true;
            }
            match direction {
                Direction::Forward => merged
                    .keys()
                    .next_back()
                    .is_some_and(|last| key <= last.as_slice()),
                Direction::Reverse => merged
                    .keys()
                    .next()
                    .is_some_and(|first| key >= first.as_slice()),
            }
        };
        let overlay: Vec<(Vec<u8>, Option<Vec<u8>>)> = staged
            .into_iter()
            .filter(|(key, _)| covered(key.as_slice()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, value) in overlay {
            match value {
                Some(value) => {
                    merged.insert(key, value);
                }
                None => {
                    merged.remove(&key);
                }
            }
        }

        let entries: Vec<Entry> = match direction {
            Direction::Forward => merged.into_iter().take(limit).collect(),
            Direction::Reverse => merged.into_iter().rev().take(limit).collect(),
        };
        Ok(entries)
    }
}

/// Run `f` against a fresh [Batch] over `db` and write the staged changes
/// only if `f` succeeds.
pub fn transact<K, T, E, F>(db: &mut K, f: F) -> Result<T, E>
where
    K: Kv,
    E: From<Error>,
    F: FnOnce(&mut Batch<'_, K>) -> Result<T, E>,
{
    let (value, changes) = {
        let mut batch = Batch::new(&*db);
        let value = f(&mut batch)?;
        (value, batch.into_changes())
    };
    db.write(changes)?;
    Ok(value)
}

/// Exclusive upper bound of all keys that start with `prefix`.
///
/// Returns `None` if no such bound exists (the prefix is all `0xff`).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn is_valid_range(start: Bound<&[u8]>, end: Bound<&[u8]>) -> bool {
    match (start, end) {
        (Bound::Included(s), Bound::Included(e)) => s <= e,
        (Bound::Included(s), Bound::Excluded(e))
        | (Bound::Excluded(s), Bound::Included(e))
        | (Bound::Excluded(s), Bound::Excluded(e)) => s < e,
        _ => true,
    }
}

/// An in-memory [Kv].
#[derive(Debug, Default)]
pub struct Memory {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    fail_writes: bool,
}

impl Memory {
    /// Make every subsequent [Kv::write] fail (or succeed again).
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Reader for Memory {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.map.get(key).cloned())
    }

    fn scan(
        &self,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<Entry>, Error> {
        if !is_valid_range(start, end) {
            return Ok(Vec::new());
        }
        let range = self.map.range::<[u8], _>((start, end));
        let entries = match direction {
            Direction::Forward => range
                .take(limit)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Direction::Reverse => range
                .rev()
                .take(limit)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        Ok(entries)
    }
}

impl Kv for Memory {
    fn write(&mut self, changes: Changes) -> Result<(), Error> {
        if self.fail_writes {
            return Err(Error::Backend("write rejected".into()));
        }
        for (key, value) in changes {
            match value {
                Some(value) => {
                    self.map.insert(key, value);
                }
                None => {
                    self.map.remove(&key);
                }
            }
        }
        Ok(())
    }
}
