//! Canonical serialization helpers for the Bitcoin wire format.
//!
//! Integers are little-endian, variable-length quantities use the
//! CompactSize encoding, and frame checksums are the leading four bytes
//! of a double SHA-256.  This crate keeps byte-level conventions in a
//! single place so the rest of the workspace can rely on a consistent
//! API.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};

/// Write a CompactSize variable-length integer, choosing the smallest
/// encoding that fits the value.
pub fn write_var_int<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    match value {
        0..=0xfc => writer.write_u8(value as u8),
        0xfd..=0xffff => {
            writer.write_u8(0xfd)?;
            writer.write_u16::<LittleEndian>(value as u16)
        }
        0x1_0000..=0xffff_ffff => {
            writer.write_u8(0xfe)?;
            writer.write_u32::<LittleEndian>(value as u32)
        }
        _ => {
            writer.write_u8(0xff)?;
            writer.write_u64::<LittleEndian>(value)
        }
    }
}

/// Read a CompactSize variable-length integer.
pub fn read_var_int<R: Read>(reader: &mut R) -> io::Result<u64> {
    let first = reader.read_u8()?;
    match first {
        0xfd => Ok(u64::from(reader.read_u16::<LittleEndian>()?)),
        0xfe => Ok(u64::from(reader.read_u32::<LittleEndian>()?)),
        0xff => reader.read_u64::<LittleEndian>(),
        value => Ok(u64::from(value)),
    }
}

/// Number of bytes `write_var_int` produces for the value.
pub fn var_int_size(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Write a length-prefixed byte string.
pub fn write_var_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_var_int(writer, bytes.len() as u64)?;
    writer.write_all(bytes)
}

/// Read a length-prefixed byte string, bounding the declared length
/// before allocating.
pub fn read_var_bytes<R: Read>(reader: &mut R, max_len: usize) -> io::Result<Vec<u8>> {
    let len = read_var_int(reader)?;
    if len > max_len as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("declared length {len} exceeds limit {max_len}"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a length-prefixed UTF-8 string.
pub fn read_var_string<R: Read>(reader: &mut R, max_len: usize) -> io::Result<String> {
    let bytes = read_var_bytes(reader, max_len)?;
    String::from_utf8(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

/// Write a length-prefixed UTF-8 string.
pub fn write_var_string<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    write_var_bytes(writer, value.as_bytes())
}

/// Double SHA-256 digest.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// Frame checksum: the first four bytes of the double SHA-256, read as a
/// little-endian word.
pub fn checksum(data: &[u8]) -> u32 {
    let digest = sha256d(data);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(value: u64) -> (usize, u64) {
        let mut buf = Vec::new();
        write_var_int(&mut buf, value).expect("encode");
        let written = buf.len();
        let decoded = read_var_int(&mut Cursor::new(buf)).expect("decode");
        (written, decoded)
    }

    #[test]
    fn var_int_round_trips_at_boundaries() {
        for value in [
            0u64,
            1,
            0xfc,
            0xfd,
            0xffff,
            0x1_0000,
            0xffff_ffff,
            0x1_0000_0000,
            u64::MAX,
        ] {
            let (written, decoded) = round_trip(value);
            assert_eq!(decoded, value);
            assert_eq!(written, var_int_size(value));
        }
    }

    #[test]
    fn var_int_picks_smallest_encoding() {
        assert_eq!(var_int_size(0xfc), 1);
        assert_eq!(var_int_size(0xfd), 3);
        assert_eq!(var_int_size(0xffff), 3);
        assert_eq!(var_int_size(0x1_0000), 5);
        assert_eq!(var_int_size(0x1_0000_0000), 9);
    }

    #[test]
    fn var_bytes_rejects_oversized_declaration() {
        let mut buf = Vec::new();
        write_var_int(&mut buf, 1024).expect("encode");
        let err = read_var_bytes(&mut Cursor::new(buf), 16).expect_err("must reject");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn var_bytes_round_trips() {
        let payload = vec![7u8; 300];
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, &payload).expect("encode");
        let decoded = read_var_bytes(&mut Cursor::new(buf), 4096).expect("decode");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn empty_payload_checksum_matches_reference() {
        // Every verack frame on the network carries this value.
        assert_eq!(checksum(b""), u32::from_le_bytes([0x5d, 0xf6, 0xe0, 0xe2]));
    }

    #[test]
    fn sha256d_differs_from_single_pass() {
        let single: [u8; 32] = Sha256::digest(b"abc").into();
        assert_ne!(sha256d(b"abc"), single);
    }
}
