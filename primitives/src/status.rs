use crate::Error;
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, ReadExt, Write};
use std::fmt::{self, Display, Formatter};

/// Lifecycle phase of a data request.
///
/// Phases only move forward: `Committing -> Revealing -> Tallying`, with the
/// timeout path allowed to skip straight to `Tallying`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Committing,
    Revealing,
    Tallying,
}

impl Status {
    /// All statuses in lifecycle order.
    pub const ALL: [Status; 3] = [Status::Committing, Status::Revealing, Status::Tallying];

    /// Stable one-byte tag.
    pub const fn tag(self) -> u8 {
        match self {
            Status::Committing => 1,
            Status::Revealing => 2,
            Status::Tallying => 3,
        }
    }

    /// Parse a one-byte tag.
    pub fn from_tag(tag: u8) -> Result<Self, Error> {
        match tag {
            1 => Ok(Status::Committing),
            2 => Ok(Status::Revealing),
            3 => Ok(Status::Tallying),
            other => Err(Error::InvalidStatus(other)),
        }
    }

    /// Check that moving from `self` to `next` is a legal transition.
    pub fn check_transition(self, next: Status) -> Result<(), Error> {
        match (self, next) {
            (Status::Committing, Status::Revealing)
            | (Status::Committing, Status::Tallying)
            | (Status::Revealing, Status::Tallying) => Ok(()),
            (from, to) => Err(Error::InvalidTransition(from, to)),
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Status::Committing => write!(f, "committing"),
            Status::Revealing => write!(f, "revealing"),
            Status::Tallying => write!(f, "tallying"),
        }
    }
}

impl Write for Status {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.tag());
    }
}

impl Read for Status {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let tag = u8::read(buf)?;
        Status::from_tag(tag).map_err(|_| CodecError::Invalid("Status", "unknown tag"))
    }
}

impl EncodeSize for Status {
    fn encode_size(&self) -> usize {
        1
    }
}
