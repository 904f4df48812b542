//! Priority-indexed storage of data requests by lifecycle status.

use crate::{
    collection::{KeySet, Map},
    kv::{Batch, Direction, Reader},
    Error,
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, ReadExt, Write};
use oracle_primitives::{
    DataRequest, DataRequestIndex, Identity, RequestId, RevealBody, Status, DIGEST_LENGTH,
};
use std::ops::Bound;
use tracing::debug;

const REQUESTS_PREFIX: u8 = 0x00;
const INDEX_PREFIX: u8 = 0x01;
const COUNTS_PREFIX: u8 = 0x02;
const REVEALS_PREFIX: u8 = 0x03;

/// Key of the secondary index: `status || index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatusIndex {
    pub status: Status,
    pub index: DataRequestIndex,
}

impl StatusIndex {
    fn lowest(status: Status) -> Self {
        Self {
            status,
            index: DataRequestIndex::new(0, u64::MAX, &RequestId::new([0; DIGEST_LENGTH])),
        }
    }

    fn highest(status: Status) -> Self {
        Self {
            status,
            index: DataRequestIndex::new(u128::MAX, 0, &RequestId::new([u8::MAX; DIGEST_LENGTH])),
        }
    }
}

impl Write for StatusIndex {
    fn write(&self, buf: &mut impl BufMut) {
        self.status.write(buf);
        self.index.write(buf);
    }
}

impl Read for StatusIndex {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self {
            status: Status::read(buf)?,
            index: DataRequestIndex::read(buf)?,
        })
    }
}

impl EncodeSize for StatusIndex {
    fn encode_size(&self) -> usize {
        self.status.encode_size() + self.index.encode_size()
    }
}

/// Key of a stored reveal body: `request id || identity`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealKey {
    pub id: RequestId,
    pub identity: Identity,
}

impl Write for RevealKey {
    fn write(&self, buf: &mut impl BufMut) {
        self.id.write(buf);
        self.identity.write(buf);
    }
}

impl Read for RevealKey {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self {
            id: RequestId::read(buf)?,
            identity: Identity::read(buf)?,
        })
    }
}

impl EncodeSize for RevealKey {
    fn encode_size(&self) -> usize {
        self.id.encode_size() + self.identity.encode_size()
    }
}

/// One page of [RequestIndexStore::list_by_status].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    /// Requests in descending index order.
    pub requests: Vec<DataRequest>,
    /// Cursor to pass to the next call, `None` if the page is empty.
    pub last_seen_index: Option<DataRequestIndex>,
    /// Number of requests with the listed status.
    pub total: u64,
}

/// Data requests keyed by id, a `(status, index)` secondary index and a
/// per-status counter, kept in lockstep.
///
/// Every mutating method validates all of its preconditions before staging
/// any change, so a failed call leaves the [Batch] untouched.
#[derive(Debug)]
pub struct RequestIndexStore {
    requests: Map<RequestId, DataRequest>,
    index: KeySet<StatusIndex>,
    counts: Map<Status, u64>,
    reveals: Map<RevealKey, RevealBody>,
}

impl Default for RequestIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIndexStore {
    pub const fn new() -> Self {
        Self {
            requests: Map::new(REQUESTS_PREFIX),
            index: KeySet::new(INDEX_PREFIX),
            counts: Map::new(COUNTS_PREFIX),
            reveals: Map::new(REVEALS_PREFIX),
        }
    }

    /// Insert a new request under its current status.
    pub fn store<R: Reader>(
        &self,
        batch: &mut Batch<'_, R>,
        request: &DataRequest,
    ) -> Result<(), Error> {
        if self.requests.has(&*batch, &request.id)? {
            return Err(Error::AlreadyExists(request.id));
        }
        let count = self.count(&*batch, request.status)?;
        let count = count
            .checked_add(1)
            .ok_or(Error::UnexpectedCount(request.status))?;

        self.requests.set(batch, &request.id, request);
        self.index.insert(
            batch,
            &StatusIndex {
                status: request.status,
                index: request.index(),
            },
        );
        self.counts.set(batch, &request.status, &count);
        debug!(id = %request.id, status = %request.status, "stored data request");
        Ok(())
    }

    /// Get the request with `id`.
    pub fn get(&self, db: &impl Reader, id: &RequestId) -> Result<DataRequest, Error> {
        self.requests.get(db, id)?.ok_or(Error::NotFound(*id))
    }

    /// Returns true if a request with `id` exists.
    pub fn has(&self, db: &impl Reader, id: &RequestId) -> Result<bool, Error> {
        self.requests.has(db, id)
    }

    /// Persist `request`, moving it to `new_status` if provided.
    ///
    /// `request.status` is only changed once every check has passed.
    pub fn update<R: Reader>(
        &self,
        batch: &mut Batch<'_, R>,
        request: &mut DataRequest,
        new_status: Option<Status>,
    ) -> Result<(), Error> {
        if !self.requests.has(&*batch, &request.id)? {
            return Err(Error::NotFound(request.id));
        }
        let Some(next) = new_status else {
            self.requests.set(batch, &request.id, request);
            return Ok(());
        };

        let current = request.status;
        current.check_transition(next)?;
        let index = request.index();
        let old = StatusIndex {
            status: current,
            index,
        };
        if !self.index.has(&*batch, &old)? {
            return Err(Error::IndexNotFound(current, index));
        }
        let old_count = self
            .count(&*batch, current)?
            .checked_sub(1)
            .ok_or(Error::UnexpectedCount(current))?;
        let new_count = self
            .count(&*batch, next)?
            .checked_add(1)
            .ok_or(Error::UnexpectedCount(next))?;

        request.status = next;
        self.index.remove(batch, &old);
        self.counts.set(batch, &current, &old_count);
        self.index.insert(
            batch,
            &StatusIndex {
                status: next,
                index,
            },
        );
        self.counts.set(batch, &next, &new_count);
        self.requests.set(batch, &request.id, request);
        debug!(id = %request.id, from = %current, to = %next, "moved data request");
        Ok(())
    }

    /// Remove the request indexed at `(status, index)` along with its reveal
    /// bodies.
    pub fn remove<R: Reader>(
        &self,
        batch: &mut Batch<'_, R>,
        index: &DataRequestIndex,
        status: Status,
    ) -> Result<(), Error> {
        let key = StatusIndex {
            status,
            index: *index,
        };
        if !self.index.has(&*batch, &key)? {
            return Err(Error::IndexNotFound(status, *index));
        }
        let count = self
            .count(&*batch, status)?
            .checked_sub(1)
            .ok_or(Error::UnexpectedCount(status))?;
        let id = index.id();
        let reveals = self.reveal_bodies(&*batch, &id)?;

        self.index.remove(batch, &key);
        self.counts.set(batch, &status, &count);
        self.requests.remove(batch, &id);
        for (identity, _) in reveals {
            self.reveals.remove(batch, &RevealKey { id, identity });
        }
        debug!(%id, %status, "removed data request");
        Ok(())
    }

    /// Number of requests with `status`.
    pub fn count(&self, db: &impl Reader, status: Status) -> Result<u64, Error> {
        Ok(self.counts.get(db, &status)?.unwrap_or_default())
    }

    /// Up to `limit` requests with `status` in descending index order,
    /// starting strictly after `last_seen_index` (or from the top).
    pub fn list_by_status(
        &self,
        db: &impl Reader,
        status: Status,
        limit: usize,
        last_seen_index: Option<&DataRequestIndex>,
    ) -> Result<Page, Error> {
        let indices = self.indices(db, status, last_seen_index, limit)?;
        let mut requests = Vec::with_capacity(indices.len());
        for index in &indices {
            requests.push(self.get(db, &index.id())?);
        }
        Ok(Page {
            requests,
            last_seen_index: indices.last().copied(),
            total: self.count(db, status)?,
        })
    }

    /// Every index with `status`, in descending order.
    pub fn indices_by_status(
        &self,
        db: &impl Reader,
        status: Status,
    ) -> Result<Vec<DataRequestIndex>, Error> {
        self.indices(db, status, None, usize::MAX)
    }

    /// Every request id with `status`, in descending index order.
    pub fn ids_by_status(&self, db: &impl Reader, status: Status) -> Result<Vec<RequestId>, Error> {
        Ok(self
            .indices_by_status(db, status)?
            .iter()
            .map(DataRequestIndex::id)
            .collect())
    }

    /// Status of each of `ids`, `None` for unknown ids.
    pub fn statuses(
        &self,
        db: &impl Reader,
        ids: &[RequestId],
    ) -> Result<Vec<Option<Status>>, Error> {
        ids.iter()
            .map(|id| Ok(self.requests.get(db, id)?.map(|request| request.status)))
            .collect()
    }

    /// Stage the reveal body submitted by `identity` for request `id`.
    pub fn set_reveal_body<R: Reader>(
        &self,
        batch: &mut Batch<'_, R>,
        id: &RequestId,
        identity: &Identity,
        body: &RevealBody,
    ) {
        let key = RevealKey {
            id: *id,
            identity: identity.clone(),
        };
        self.reveals.set(batch, &key, body);
    }

    /// Reveal body submitted by `identity` for request `id`.
    pub fn reveal_body(
        &self,
        db: &impl Reader,
        id: &RequestId,
        identity: &Identity,
    ) -> Result<Option<RevealBody>, Error> {
        let key = RevealKey {
            id: *id,
            identity: identity.clone(),
        };
        self.reveals.get(db, &key)
    }

    /// Every reveal body stored for request `id`.
    pub fn reveal_bodies(
        &self,
        db: &impl Reader,
        id: &RequestId,
    ) -> Result<Vec<(Identity, RevealBody)>, Error> {
        Ok(self
            .reveals
            .scan_prefix(db, id, Direction::Forward, usize::MAX)?
            .into_iter()
            .map(|(key, body)| (key.identity, body))
            .collect())
    }

    fn indices(
        &self,
        db: &impl Reader,
        status: Status,
        after: Option<&DataRequestIndex>,
        limit: usize,
    ) -> Result<Vec<DataRequestIndex>, Error> {
        let lowest = StatusIndex::lowest(status);
        let highest = StatusIndex::highest(status);
        let cursor = after.map(|index| StatusIndex {
            status,
            index: *index,
        });
        let end = match &cursor {
            Some(cursor) => Bound::Excluded(cursor),
            None => Bound::Included(&highest),
        };
        Ok(self
            .index
            .scan(db, Bound::Included(&lowest), end, Direction::Reverse, limit)?
            .into_iter()
            .map(|key| key.index)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{transact, Memory};
    use commonware_macros::test_traced;
    use oracle_primitives::RequestBody;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::{BTreeMap, BTreeSet, HashSet};
    use test_case::test_case;

    const STORE: RequestIndexStore = RequestIndexStore::new();

    fn request(seed: u8, price: u128, height: u64) -> DataRequest {
        let body = RequestBody {
            version: "1.0.0".into(),
            memo: vec![seed],
            gas_price: price,
            replication_factor: 1,
            ..Default::default()
        };
        DataRequest {
            id: body.id(),
            body,
            poster: "poster".into(),
            posted_gas_price: price,
            height,
            timeout_height: Some(height + 50),
            status: Status::Committing,
            escrow: 1_000,
            commits: BTreeMap::new(),
            reveals: BTreeSet::new(),
        }
    }

    fn store_all(db: &mut Memory, requests: &[DataRequest]) {
        transact(db, |batch| -> Result<(), Error> {
            for request in requests {
                STORE.store(batch, request)?;
            }
            Ok(())
        })
        .unwrap();
    }

    fn index_entries(db: &Memory, status: Status) -> usize {
        STORE.indices_by_status(db, status).unwrap().len()
    }

    fn assert_consistent(db: &Memory) {
        for status in Status::ALL {
            let indices = STORE.indices_by_status(db, status).unwrap();
            assert_eq!(STORE.count(db, status).unwrap(), indices.len() as u64);
            for index in indices {
                let request = STORE.get(db, &index.id()).unwrap();
                assert_eq!(request.status, status);
                assert_eq!(request.index(), index);
            }
        }
    }

    #[test_traced]
    fn test_store_and_get() {
        let mut db = Memory::default();
        let dr = request(1, 2_000, 10);
        store_all(&mut db, &[dr.clone()]);

        assert_eq!(STORE.get(&db, &dr.id).unwrap(), dr);
        assert!(STORE.has(&db, &dr.id).unwrap());
        assert_eq!(STORE.count(&db, Status::Committing).unwrap(), 1);
        assert_eq!(STORE.count(&db, Status::Revealing).unwrap(), 0);

        let missing = RequestId::new([9; DIGEST_LENGTH]);
        assert!(matches!(STORE.get(&db, &missing), Err(Error::NotFound(id)) if id == missing));
    }

    #[test_traced]
    fn test_store_duplicate() {
        let mut db = Memory::default();
        let dr = request(1, 2_000, 10);
        store_all(&mut db, &[dr.clone()]);

        let result = transact(&mut db, |batch| STORE.store(batch, &dr));
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert_eq!(STORE.count(&db, Status::Committing).unwrap(), 1);
    }

    #[test_case(Status::Committing, Status::Revealing, true; "commit to reveal")]
    #[test_case(Status::Committing, Status::Tallying, true; "commit to tally")]
    #[test_case(Status::Revealing, Status::Tallying, true; "reveal to tally")]
    #[test_case(Status::Revealing, Status::Committing, false; "reveal to commit")]
    #[test_case(Status::Tallying, Status::Revealing, false; "tally to reveal")]
    #[test_case(Status::Tallying, Status::Committing, false; "tally to commit")]
    #[test_case(Status::Committing, Status::Committing, false; "commit to commit")]
    fn test_update_transition(from: Status, to: Status, legal: bool) {
        let mut db = Memory::default();
        let mut dr = request(1, 2_000, 10);
        dr.status = from;
        store_all(&mut db, &[dr.clone()]);

        let mut updated = dr.clone();
        updated.escrow = 5;
        let result = transact(&mut db, |batch| STORE.update(batch, &mut updated, Some(to)));
        assert_eq!(result.is_ok(), legal);

        let stored = STORE.get(&db, &dr.id).unwrap();
        if legal {
            assert_eq!(stored.status, to);
            assert_eq!(stored.escrow, 5);
            assert_eq!(updated.status, to);
            assert_eq!(STORE.count(&db, from).unwrap(), 0);
            assert_eq!(STORE.count(&db, to).unwrap(), 1);
        } else {
            assert!(matches!(result, Err(Error::InvalidTransition(_))));
            assert_eq!(stored, dr);
            assert_eq!(updated.status, from);
            assert_eq!(STORE.count(&db, from).unwrap(), 1);
        }
        assert_consistent(&db);
    }

    #[test_traced]
    fn test_update_without_status() {
        let mut db = Memory::default();
        let mut dr = request(1, 2_000, 10);
        store_all(&mut db, &[dr.clone()]);

        dr.timeout_height = None;
        transact(&mut db, |batch| STORE.update(batch, &mut dr, None)).unwrap();
        assert_eq!(STORE.get(&db, &dr.id).unwrap().timeout_height, None);
        assert_eq!(STORE.count(&db, Status::Committing).unwrap(), 1);

        let mut unknown = request(2, 2_000, 10);
        let result = transact(&mut db, |batch| STORE.update(batch, &mut unknown, None));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test_traced]
    fn test_remove() {
        let mut db = Memory::default();
        let first = request(1, 2_000, 10);
        let second = request(2, 3_000, 10);
        store_all(&mut db, &[first.clone(), second.clone()]);
        transact(&mut db, |batch| -> Result<(), Error> {
            STORE.set_reveal_body(
                batch,
                &first.id,
                &Identity::new(vec![1]),
                &RevealBody::default(),
            );
            STORE.set_reveal_body(
                batch,
                &first.id,
                &Identity::new(vec![2]),
                &RevealBody::default(),
            );
            STORE.set_reveal_body(
                batch,
                &second.id,
                &Identity::new(vec![1]),
                &RevealBody::default(),
            );
            Ok(())
        })
        .unwrap();
        assert_eq!(STORE.reveal_bodies(&db, &first.id).unwrap().len(), 2);

        transact(&mut db, |batch| {
            STORE.remove(batch, &first.index(), Status::Committing)
        })
        .unwrap();
        assert_eq!(STORE.count(&db, Status::Committing).unwrap(), 1);
        assert!(matches!(STORE.get(&db, &first.id), Err(Error::NotFound(_))));
        assert!(STORE.reveal_bodies(&db, &first.id).unwrap().is_empty());
        assert_eq!(STORE.reveal_bodies(&db, &second.id).unwrap().len(), 1);
        assert_consistent(&db);
    }

    #[test_traced]
    fn test_remove_missing_leaves_store_unchanged() {
        let mut db = Memory::default();
        let dr = request(1, 2_000, 10);
        store_all(&mut db, &[dr.clone()]);
        let entries = db.len();

        // Wrong status
        let result = transact(&mut db, |batch| {
            STORE.remove(batch, &dr.index(), Status::Revealing)
        });
        assert!(matches!(result, Err(Error::IndexNotFound(Status::Revealing, _))));

        // Removed twice
        transact(&mut db, |batch| {
            STORE.remove(batch, &dr.index(), Status::Committing)
        })
        .unwrap();
        let after_first = db.len();
        let result = transact(&mut db, |batch| {
            STORE.remove(batch, &dr.index(), Status::Committing)
        });
        assert!(matches!(result, Err(Error::IndexNotFound(Status::Committing, _))));
        assert_eq!(db.len(), after_first);
        assert!(after_first < entries);
        assert_eq!(STORE.count(&db, Status::Committing).unwrap(), 0);
    }

    #[test_traced]
    fn test_failed_write_is_not_applied() {
        let mut db = Memory::default();
        let mut dr = request(1, 2_000, 10);
        store_all(&mut db, &[dr.clone()]);

        db.fail_writes(true);
        let result = transact(&mut db, |batch| {
            STORE.update(batch, &mut dr, Some(Status::Revealing))
        });
        assert!(matches!(result, Err(Error::Backend(_))));
        db.fail_writes(false);

        assert_eq!(STORE.get(&db, &dr.id).unwrap().status, Status::Committing);
        assert_eq!(index_entries(&db, Status::Revealing), 0);
        assert_consistent(&db);
    }

    #[test_traced]
    fn test_list_order_and_ties() {
        let mut db = Memory::default();
        let cheap = request(1, 2_000, 5);
        let expensive = request(2, 9_000, 20);
        let early = request(3, 5_000, 10);
        let late = request(4, 5_000, 11);
        let tie_a = request(5, 4_000, 12);
        let tie_b = request(6, 4_000, 12);
        store_all(
            &mut db,
            &[
                cheap.clone(),
                expensive.clone(),
                early.clone(),
                late.clone(),
                tie_a.clone(),
                tie_b.clone(),
            ],
        );

        let page = STORE
            .list_by_status(&db, Status::Committing, 10, None)
            .unwrap();
        assert_eq!(page.total, 6);
        let ids: Vec<RequestId> = page.requests.iter().map(|r| r.id).collect();
        let (high_tie, low_tie) = if tie_a.id > tie_b.id {
            (tie_a.id, tie_b.id)
        } else {
            (tie_b.id, tie_a.id)
        };
        assert_eq!(
            ids,
            vec![expensive.id, early.id, late.id, high_tie, low_tie, cheap.id]
        );
        assert_eq!(page.last_seen_index, Some(cheap.index()));

        let empty = STORE
            .list_by_status(&db, Status::Committing, 10, Some(&cheap.index()))
            .unwrap();
        assert!(empty.requests.is_empty());
        assert_eq!(empty.last_seen_index, None);
        assert_eq!(empty.total, 6);

        let other = STORE
            .list_by_status(&db, Status::Tallying, 10, None)
            .unwrap();
        assert!(other.requests.is_empty());
        assert_eq!(other.total, 0);
    }

    #[test_case(1; "page of one")]
    #[test_case(3; "page of three")]
    #[test_case(7; "page of seven")]
    #[test_case(100; "single page")]
    fn test_pagination_completeness(page_size: usize) {
        let mut rng = StdRng::seed_from_u64(page_size as u64);
        let mut db = Memory::default();
        let mut requests = Vec::new();
        for seed in 0..50u8 {
            let mut dr = request(seed, rng.gen_range(2_000..2_010), rng.gen_range(1..5));
            if rng.gen_bool(0.3) {
                dr.status = Status::Revealing;
            }
            requests.push(dr);
        }
        store_all(&mut db, &requests);
        assert_consistent(&db);

        let expected = requests
            .iter()
            .filter(|r| r.status == Status::Committing)
            .count();
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = STORE
                .list_by_status(&db, Status::Committing, page_size, cursor.as_ref())
                .unwrap();
            assert_eq!(page.total, expected as u64);
            if page.requests.is_empty() {
                break;
            }
            seen.extend(page.requests.iter().map(|r| r.index()));
            cursor = page.last_seen_index;
        }

        assert_eq!(seen.len(), expected);
        assert!(seen.windows(2).all(|pair| pair[0] > pair[1]));
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), expected);
    }

    #[test_traced]
    fn test_pagination_tolerates_removal() {
        let mut db = Memory::default();
        let requests: Vec<DataRequest> = (0..6u8)
            .map(|seed| request(seed, 2_000 + seed as u128, 1))
            .collect();
        store_all(&mut db, &requests);

        let first = STORE
            .list_by_status(&db, Status::Committing, 2, None)
            .unwrap();
        let removed = requests[2].index();
        transact(&mut db, |batch| STORE.remove(batch, &removed, Status::Committing)).unwrap();

        let second = STORE
            .list_by_status(&db, Status::Committing, 10, first.last_seen_index.as_ref())
            .unwrap();
        let ids: Vec<RequestId> = second.requests.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![requests[3].id, requests[1].id, requests[0].id]);
        assert_eq!(second.total, 5);
    }

    #[test_traced]
    fn test_statuses() {
        let mut db = Memory::default();
        let mut revealing = request(1, 2_000, 1);
        revealing.status = Status::Revealing;
        let committing = request(2, 2_000, 1);
        store_all(&mut db, &[revealing.clone(), committing.clone()]);

        let unknown = RequestId::new([0; DIGEST_LENGTH]);
        let statuses = STORE
            .statuses(&db, &[committing.id, unknown, revealing.id])
            .unwrap();
        assert_eq!(
            statuses,
            vec![Some(Status::Committing), None, Some(Status::Revealing)]
        );
        assert_eq!(
            STORE.ids_by_status(&db, Status::Revealing).unwrap(),
            vec![revealing.id]
        );
    }

    #[test_traced]
    fn test_random_lifecycle_stays_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut db = Memory::default();
        let mut live: Vec<DataRequest> = Vec::new();
        for seed in 0..100u8 {
            let action = rng.gen_range(0..3);
            if action == 0 || live.is_empty() {
                let dr = request(seed, rng.gen_range(2_000..2_100), rng.gen_range(1..100));
                store_all(&mut db, &[dr.clone()]);
                live.push(dr);
            } else if action == 1 {
                let position = rng.gen_range(0..live.len());
                let next = match live[position].status {
                    Status::Committing if rng.gen_bool(0.5) => Status::Revealing,
                    _ => Status::Tallying,
                };
                let mut dr = live[position].clone();
                let result = transact(&mut db, |batch| STORE.update(batch, &mut dr, Some(next)));
                if result.is_ok() {
                    live[position] = dr;
                } else {
                    assert_eq!(live[position].status, Status::Tallying);
                }
            } else {
                let position = rng.gen_range(0..live.len());
                let dr = live.swap_remove(position);
                transact(&mut db, |batch| STORE.remove(batch, &dr.index(), dr.status)).unwrap();
            }
            assert_consistent(&db);
        }
    }
}
