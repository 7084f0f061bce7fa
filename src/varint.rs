//! Bijective variable-length integers used throughout the beat format.
//!
//! Each byte carries seven value bits. A set high bit marks the last byte.
//! After every non-terminal byte the running shift is added to the value, so
//! no two byte sequences decode to the same number.
use std::io::{Error, ErrorKind, Read, Result, Write};

/// Longest encoding of a `u64`.
pub const MAX_NUMBER_LEN: usize = 10;

/// Decodes one unsigned number from a stream, one byte at a time.
pub fn decode_number<R: Read>(r: &mut R) -> Result<u64> {
    let mut data: u64 = 0;
    let mut shift: u64 = 1;
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte)?;
        data = accumulate(data, byte[0], shift)?;
        if byte[0] & 0x80 != 0 {
            return Ok(data);
        }
        shift = advance(&mut data, shift)?;
    }
}

/// Decodes one unsigned number from the front of a slice.
///
/// Returns the value and the count of bytes consumed.
pub fn read_number(b: &[u8]) -> Result<(u64, usize)> {
    let mut data: u64 = 0;
    let mut shift: u64 = 1;
    for (i, &x) in b.iter().enumerate() {
        data = accumulate(data, x, shift)?;
        if x & 0x80 != 0 {
            return Ok((data, i + 1));
        }
        shift = advance(&mut data, shift)?;
    }
    Err(Error::new(
        ErrorKind::UnexpectedEof,
        "truncated variable-length number",
    ))
}

/// Decodes one signed relative offset from a stream.
#[inline]
pub fn decode_offset<R: Read>(r: &mut R) -> Result<i64> {
    decode_number(r).map(offset_from_number)
}

/// Decodes one signed relative offset from the front of a slice.
#[inline]
pub fn read_offset(b: &[u8]) -> Result<(i64, usize)> {
    let (v, n) = read_number(b)?;
    Ok((offset_from_number(v), n))
}

/// Splits a number into sign (low bit) and magnitude.
#[inline]
pub fn offset_from_number(v: u64) -> i64 {
    let magnitude = (v >> 1) as i64;
    if v & 1 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Encodes an unsigned number, appending to `out`.
pub fn encode_number(mut x: u64, out: &mut Vec<u8>) {
    loop {
        let low = (x & 0x7f) as u8;
        x >>= 7;
        if x == 0 {
            out.push(low | 0x80);
            return;
        }
        out.push(low);
        x -= 1;
    }
}

/// Encodes a signed relative offset, appending to `out`.
#[inline]
pub fn encode_offset(x: i64, out: &mut Vec<u8>) {
    let negative = (x < 0) as u64;
    encode_number((x.unsigned_abs() << 1) | negative, out);
}

/// Writes an unsigned number to a sink.
pub fn write_number<W: Write>(w: &mut W, x: u64) -> Result<()> {
    let mut buf = Vec::with_capacity(MAX_NUMBER_LEN);
    encode_number(x, &mut buf);
    w.write_all(&buf[..])
}

/// Writes a signed relative offset to a sink.
pub fn write_offset<W: Write>(w: &mut W, x: i64) -> Result<()> {
    let mut buf = Vec::with_capacity(MAX_NUMBER_LEN);
    encode_offset(x, &mut buf);
    w.write_all(&buf[..])
}

#[inline]
fn accumulate(data: u64, byte: u8, shift: u64) -> Result<u64> {
    u64::from(byte & 0x7f)
        .checked_mul(shift)
        .and_then(|v| data.checked_add(v))
        .ok_or_else(overflow)
}

#[inline]
fn advance(data: &mut u64, shift: u64) -> Result<u64> {
    let shift = shift.checked_mul(128).ok_or_else(overflow)?;
    *data = data.checked_add(shift).ok_or_else(overflow)?;
    Ok(shift)
}

fn overflow() -> Error {
    Error::new(ErrorKind::InvalidData, "variable-length number overflow")
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::io::Cursor;

    fn encoded(x: u64) -> Vec<u8> {
        let mut v = Vec::new();
        encode_number(x, &mut v);
        v
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encoded(0), vec![0x80]);
        assert_eq!(encoded(127), vec![0xff]);
        // 128 needs a continuation byte: 0x00 contributes 0, then shift 128 is added.
        assert_eq!(encoded(128), vec![0x00, 0x80]);
        assert_eq!(encoded(255), vec![0x7f, 0x80]);
        assert_eq!(encoded(256), vec![0x00, 0x81]);
        assert_eq!(encoded(16511), vec![0x7f, 0xff]);
        assert_eq!(encoded(16512), vec![0x00, 0x00, 0x80]);
    }

    #[test]
    fn two_byte_sequences_are_distinct() {
        // Every two-byte sequence maps to its own value, disjoint from one-byte values.
        let mut seen = std::collections::HashSet::new();
        for lo in 0..0x80u8 {
            for hi in 0x80..=0xffu8 {
                let (v, n) = read_number(&[lo, hi]).unwrap();
                assert_eq!(n, 2);
                assert!(v >= 128);
                assert!(seen.insert(v));
            }
        }
        assert_eq!(seen.len(), 128 * 128);
    }

    #[test]
    fn truncated_stream() {
        let err = decode_number(&mut Cursor::new(&[0x01u8, 0x02][..])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        let err = read_number(&[0x7f, 0x7f]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn overflowing_number() {
        let mut b = vec![0x7fu8; 11];
        b.push(0xff);
        assert_eq!(read_number(&b).unwrap_err().kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn max_number() {
        let b = encoded(u64::MAX);
        assert!(b.len() <= MAX_NUMBER_LEN);
        assert_eq!(read_number(&b).unwrap(), (u64::MAX, b.len()));
    }

    #[test]
    fn offsets() {
        assert_eq!(offset_from_number(0), 0);
        assert_eq!(offset_from_number(1), 0);
        assert_eq!(offset_from_number(3), -1);
        assert_eq!(offset_from_number(10), 5);
        let mut b = Vec::new();
        encode_offset(-1, &mut b);
        assert_eq!(b, vec![0x83]);
    }

    #[quickcheck]
    fn number_roundtrip(x: u64) -> bool {
        let b = encoded(x);
        let mut c = Cursor::new(&b[..]);
        decode_number(&mut c).unwrap() == x
            && c.position() as usize == b.len()
            && read_number(&b).unwrap() == (x, b.len())
    }

    #[quickcheck]
    fn decoding_is_injective(a: Vec<u8>, b: Vec<u8>) -> bool {
        match (read_number(&a), read_number(&b)) {
            (Ok((x, n)), Ok((y, m))) if x == y => a[..n] == b[..m],
            _ => true,
        }
    }

    #[quickcheck]
    fn offset_roundtrip(x: i32) -> bool {
        let x = i64::from(x);
        let mut b = Vec::new();
        encode_offset(x, &mut b);
        let mut w = Vec::new();
        write_offset(&mut w, x).unwrap();
        decode_offset(&mut Cursor::new(&b[..])).unwrap() == x
            && read_offset(&b).unwrap() == (x, b.len())
            && w == b
    }
}
