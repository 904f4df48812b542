//! Expiry queue of data requests ordered by timeout height.

use crate::{
    collection::KeySet,
    kv::{Batch, Direction, Reader},
    Error,
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, ReadExt, Write};
use oracle_primitives::RequestId;
use std::ops::Bound;
use tracing::debug;

const TIMEOUTS_PREFIX: u8 = 0x04;

/// A `(timeout height, request id)` pair.
///
/// Heights are encoded big-endian so that entries iterate in expiry order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeoutEntry {
    pub height: u64,
    pub id: RequestId,
}

impl Write for TimeoutEntry {
    fn write(&self, buf: &mut impl BufMut) {
        self.height.write(buf);
        self.id.write(buf);
    }
}

impl Read for TimeoutEntry {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self {
            height: u64::read(buf)?,
            id: RequestId::read(buf)?,
        })
    }
}

impl EncodeSize for TimeoutEntry {
    fn encode_size(&self) -> usize {
        8 + self.id.encode_size()
    }
}

/// Requests in `Committing` or `Revealing`, keyed by the height at which
/// their current phase ends.
#[derive(Debug)]
pub struct TimeoutQueue {
    entries: KeySet<TimeoutEntry>,
}

impl Default for TimeoutQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutQueue {
    pub const fn new() -> Self {
        Self {
            entries: KeySet::new(TIMEOUTS_PREFIX),
        }
    }

    /// Schedule `id` to time out at `height`.
    pub fn add<R: Reader>(&self, batch: &mut Batch<'_, R>, id: &RequestId, height: u64) {
        self.entries.insert(batch, &TimeoutEntry { height, id: *id });
    }

    /// Cancel the timeout of `id` scheduled at `height`.
    pub fn remove<R: Reader>(
        &self,
        batch: &mut Batch<'_, R>,
        id: &RequestId,
        height: u64,
    ) -> Result<(), Error> {
        let entry = TimeoutEntry { height, id: *id };
        if !self.entries.has(&*batch, &entry)? {
            return Err(Error::TimeoutNotFound(height, *id));
        }
        self.entries.remove(batch, &entry);
        Ok(())
    }

    /// Move the timeout of `id` from `old_height` to `new_height`.
    pub fn update<R: Reader>(
        &self,
        batch: &mut Batch<'_, R>,
        id: &RequestId,
        old_height: u64,
        new_height: u64,
    ) -> Result<(), Error> {
        self.remove(batch, id, old_height)?;
        self.add(batch, id, new_height);
        debug!(%id, old_height, new_height, "rescheduled timeout");
        Ok(())
    }

    /// Returns true if `id` is scheduled at `height`.
    pub fn contains(&self, db: &impl Reader, id: &RequestId, height: u64) -> Result<bool, Error> {
        self.entries.has(db, &TimeoutEntry { height, id: *id })
    }

    /// Every entry due at or before `height`, earliest first.
    pub fn due(&self, db: &impl Reader, height: u64) -> Result<Vec<TimeoutEntry>, Error> {
        let last = TimeoutEntry {
            height,
            id: RequestId::new([u8::MAX; 32]),
        };
        self.entries.scan(
            db,
            Bound::Unbounded,
            Bound::Included(&last),
            Direction::Forward,
            usize::MAX,
        )
    }
}
