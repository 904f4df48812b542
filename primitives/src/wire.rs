//! Helpers for encoding variable-length fields.
//!
//! Variable-length fields are written as a big-endian `u32` length followed
//! by the raw bytes. Readers reject lengths above a caller-supplied maximum
//! before allocating.

use bytes::{Buf, BufMut};
use commonware_codec::{Error, ReadExt, Write};

/// Upper bound applied when decoding any single variable-length field.
pub const MAX_FIELD_LENGTH: usize = 1 << 20;

/// Write `value` with a length prefix.
pub fn write_bytes(value: &[u8], buf: &mut impl BufMut) {
    (value.len() as u32).write(buf);
    buf.put_slice(value);
}

/// Read a length-prefixed field of at most `max` bytes.
pub fn read_bytes(buf: &mut impl Buf, max: usize) -> Result<Vec<u8>, Error> {
    let len = u32::read(buf)? as usize;
    if len > max {
        return Err(Error::Invalid("wire", "field too long"));
    }
    if buf.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    let mut value = vec![0u8; len];
    buf.copy_to_slice(&mut value);
    Ok(value)
}

/// Encoded size of a length-prefixed field.
pub const fn bytes_size(value: &[u8]) -> usize {
    4 + value.len()
}

/// Write a UTF-8 string with a length prefix.
pub fn write_str(value: &str, buf: &mut impl BufMut) {
    write_bytes(value.as_bytes(), buf);
}

/// Read a length-prefixed UTF-8 string.
pub fn read_str(buf: &mut impl Buf, max: usize) -> Result<String, Error> {
    let raw = read_bytes(buf, max)?;
    String::from_utf8(raw).map_err(|_| Error::Invalid("wire", "invalid utf-8"))
}

/// Write a list of strings: a `u32` count followed by each string.
pub fn write_strs(values: &[String], buf: &mut impl BufMut) {
    (values.len() as u32).write(buf);
    for value in values {
        write_str(value, buf);
    }
}

/// Read a list of at most `max_items` strings.
pub fn read_strs(buf: &mut impl Buf, max_items: usize) -> Result<Vec<String>, Error> {
    let count = u32::read(buf)? as usize;
    if count > max_items {
        return Err(Error::Invalid("wire", "too many items"));
    }
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_str(buf, MAX_FIELD_LENGTH)?);
    }
    Ok(values)
}

/// Encoded size of a list written by [write_strs].
pub fn strs_size(values: &[String]) -> usize {
    4 + values.iter().map(|v| bytes_size(v.as_bytes())).sum::<usize>()
}

/// Read exactly `N` bytes.
pub fn read_array<const N: usize>(buf: &mut impl Buf) -> Result<[u8; N], Error> {
    if buf.remaining() < N {
        return Err(Error::EndOfBuffer);
    }
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_prefix() {
        let mut buf = Vec::new();
        write_bytes(b"hello", &mut buf);
        assert_eq!(buf.len(), bytes_size(b"hello"));
        assert_eq!(&buf[..4], &[0, 0, 0, 5]);

        let decoded = read_bytes(&mut buf.as_slice(), 16).unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn test_bytes_too_long() {
        let mut buf = Vec::new();
        write_bytes(&[7u8; 32], &mut buf);
        assert!(matches!(
            read_bytes(&mut buf.as_slice(), 31),
            Err(Error::Invalid(_, _))
        ));
    }

    #[test]
    fn test_bytes_truncated() {
        let mut buf = Vec::new();
        write_bytes(&[7u8; 32], &mut buf);
        buf.truncate(20);
        assert!(matches!(
            read_bytes(&mut buf.as_slice(), 64),
            Err(Error::EndOfBuffer)
        ));
    }

    #[test]
    fn test_strs() {
        let values = vec!["a".to_string(), "".to_string(), "xyz".to_string()];
        let mut buf = Vec::new();
        write_strs(&values, &mut buf);
        assert_eq!(buf.len(), strs_size(&values));
        assert_eq!(read_strs(&mut buf.as_slice(), 8).unwrap(), values);
        assert!(read_strs(&mut buf.as_slice(), 2).is_err());
    }
}
