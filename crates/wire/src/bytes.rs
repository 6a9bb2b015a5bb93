//! Primitive reads/writes on a payload buffer, with explicit endianness.
//!
//! Every operation here fails with [`WireError::Range`] rather than panicking
//! when the access would run past the end of `buf` — payload buffers arrive
//! off the wire and are never trusted to be the expected shape.

use crate::error::WireError;

/// Byte order of multi-byte fields on the wire, as reported by the device in
/// `GET_INFO`. See [`crate::model::DeviceInfo::endianness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub const fn is_little(self) -> bool {
        matches!(self, Endianness::Little)
    }
}

fn check_range(buf: &[u8], off: usize, len: usize) -> Result<(), WireError> {
    if off.checked_add(len).is_none_or(|end| end > buf.len()) {
        return Err(WireError::Range);
    }
    Ok(())
}

pub fn read_u8(buf: &[u8], off: usize) -> Result<u8, WireError> {
    check_range(buf, off, 1)?;
    Ok(buf[off])
}

pub fn write_u8(buf: &mut [u8], off: usize, value: u8) -> Result<(), WireError> {
    check_range(buf, off, 1)?;
    buf[off] = value;
    Ok(())
}

pub fn read_u16(buf: &[u8], off: usize, endianness: Endianness) -> Result<u16, WireError> {
    check_range(buf, off, 2)?;
    let bytes = [buf[off], buf[off + 1]];
    Ok(if endianness.is_little() {
        u16::from_le_bytes(bytes)
    } else {
        u16::from_be_bytes(bytes)
    })
}

pub fn write_u16(
    buf: &mut [u8],
    off: usize,
    value: u16,
    endianness: Endianness,
) -> Result<(), WireError> {
    check_range(buf, off, 2)?;
    let bytes = if endianness.is_little() {
        value.to_le_bytes()
    } else {
        value.to_be_bytes()
    };
    buf[off..off + 2].copy_from_slice(&bytes);
    Ok(())
}

pub fn read_u32(buf: &[u8], off: usize, endianness: Endianness) -> Result<u32, WireError> {
    check_range(buf, off, 4)?;
    let bytes = [buf[off], buf[off + 1], buf[off + 2], buf[off + 3]];
    Ok(if endianness.is_little() {
        u32::from_le_bytes(bytes)
    } else {
        u32::from_be_bytes(bytes)
    })
}

pub fn write_u32(
    buf: &mut [u8],
    off: usize,
    value: u32,
    endianness: Endianness,
) -> Result<(), WireError> {
    check_range(buf, off, 4)?;
    let bytes = if endianness.is_little() {
        value.to_le_bytes()
    } else {
        value.to_be_bytes()
    };
    buf[off..off + 4].copy_from_slice(&bytes);
    Ok(())
}

pub fn read_f32(buf: &[u8], off: usize, endianness: Endianness) -> Result<f32, WireError> {
    let bits = read_u32(buf, off, endianness)?;
    Ok(f32::from_bits(bits))
}

pub fn write_f32(
    buf: &mut [u8],
    off: usize,
    value: f32,
    endianness: Endianness,
) -> Result<(), WireError> {
    write_u32(buf, off, value.to_bits(), endianness)
}

/// Scans `buf[off..off+len]` for a NUL terminator (or the end of the field),
/// decodes the preceding bytes as UTF-8, and trims any trailing NULs.
pub fn read_fixed_string(buf: &[u8], off: usize, len: usize) -> Result<String, WireError> {
    check_range(buf, off, len)?;
    let field = &buf[off..off + len];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .map(|s| s.trim_end_matches('\0').to_string())
        .map_err(|e| WireError::decode(format!("device name is not valid utf-8: {e}")))
}

/// Encodes `s` as UTF-8 into `buf[off..off+len]`, truncating at `len` bytes
/// and zero-filling the remainder.
pub fn write_fixed_string(buf: &mut [u8], off: usize, len: usize, s: &str) -> Result<(), WireError> {
    check_range(buf, off, len)?;
    let field = &mut buf[off..off + len];
    field.fill(0);
    let bytes = s.as_bytes();
    let copy_len = bytes.len().min(len);
    field[..copy_len].copy_from_slice(&bytes[..copy_len]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_reads() {
        let buf = [1u8, 2, 3];
        assert!(matches!(read_u32(&buf, 0, Endianness::Little), Err(WireError::Range)));
        assert!(matches!(read_u8(&buf, 3), Err(WireError::Range)));
    }

    #[test]
    fn u16_roundtrip_both_endianness() {
        let mut buf = [0u8; 2];
        write_u16(&mut buf, 0, 0x1234, Endianness::Little).unwrap();
        assert_eq!(buf, [0x34, 0x12]);
        assert_eq!(read_u16(&buf, 0, Endianness::Little).unwrap(), 0x1234);

        write_u16(&mut buf, 0, 0x1234, Endianness::Big).unwrap();
        assert_eq!(buf, [0x12, 0x34]);
        assert_eq!(read_u16(&buf, 0, Endianness::Big).unwrap(), 0x1234);
    }

    #[test]
    fn string_roundtrip_with_nul_padding() {
        let mut buf = [0xAAu8; 8];
        write_fixed_string(&mut buf, 0, 8, "hi").unwrap();
        assert_eq!(&buf, b"hi\0\0\0\0\0\0");
        assert_eq!(read_fixed_string(&buf, 0, 8).unwrap(), "hi");
    }

    #[test]
    fn string_truncates_at_field_length() {
        let mut buf = [0u8; 4];
        write_fixed_string(&mut buf, 0, 4, "abcdef").unwrap();
        assert_eq!(&buf, b"abcd");
    }
}
