//! Fixed-width identifiers and participant identities.

use crate::{wire, Error, DIGEST_LENGTH};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, Write};
use commonware_utils::{from_hex, hex};
use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

macro_rules! digest_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; DIGEST_LENGTH]);

        impl $name {
            /// Wrap raw digest bytes.
            pub const fn new(value: [u8; DIGEST_LENGTH]) -> Self {
                Self(value)
            }

            /// Returns the raw digest bytes.
            pub const fn get(&self) -> &[u8; DIGEST_LENGTH] {
                &self.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; DIGEST_LENGTH]> for $name {
            fn from(value: [u8; DIGEST_LENGTH]) -> Self {
                Self(value)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = Error;

            fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
                let array: [u8; DIGEST_LENGTH] =
                    value.try_into().map_err(|_| Error::InvalidLength {
                        expected: DIGEST_LENGTH,
                        actual: value.len(),
                    })?;
                Ok(Self(array))
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = from_hex(s).ok_or_else(|| Error::InvalidHex(s.to_string()))?;
                Self::try_from(raw.as_slice())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex(&self.0))
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex(&self.0))
            }
        }

        impl Write for $name {
            fn write(&self, buf: &mut impl BufMut) {
                buf.put_slice(&self.0);
            }
        }

        impl Read for $name {
            type Cfg = ();

            fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
                Ok(Self(wire::read_array(buf)?))
            }
        }

        impl EncodeSize for $name {
            fn encode_size(&self) -> usize {
                DIGEST_LENGTH
            }
        }
    };
}

digest_type!(
    /// Content hash of a posted request body.
    RequestId
);

digest_type!(
    /// Content hash of an oracle program.
    ProgramId
);

digest_type!(
    /// Blind commitment to a reveal.
    Commitment
);

/// Maximum length of an [Identity] in bytes.
pub const MAX_IDENTITY_LENGTH: usize = 128;

/// Public key of a committee participant.
///
/// Identities are opaque to the engine: their only meaning is what the
/// configured proof verifier assigns to them.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(Vec<u8>);

impl Identity {
    /// Wrap raw public key bytes.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }

    /// Lowercase hex encoding of the identity.
    pub fn to_hex(&self) -> String {
        hex(&self.0)
    }
}

impl AsRef<[u8]> for Identity {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = from_hex(s).ok_or_else(|| Error::InvalidHex(s.to_string()))?;
        Ok(Self(raw))
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl Debug for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl Write for Identity {
    fn write(&self, buf: &mut impl BufMut) {
        wire::write_bytes(&self.0, buf);
    }
}

impl Read for Identity {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self(wire::read_bytes(buf, MAX_IDENTITY_LENGTH)?))
    }
}

impl EncodeSize for Identity {
    fn encode_size(&self) -> usize {
        wire::bytes_size(&self.0)
    }
}
