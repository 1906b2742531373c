//! Little-endian primitive and 4-byte-aligned string encode/decode helpers
//! shared by every packet variant's `encode`/`decode`.

use crate::error::ProtocolError;

/// Append `s` as a length-prefixed (u16), 4-byte-aligned padded string.
pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
    let written = 2 + bytes.len();
    let pad = (4 - written % 4) % 4;
    buf.extend(std::iter::repeat(0u8).take(pad));
}

/// Read a length-prefixed, 4-byte-aligned padded string starting at
/// `buf[*pos]`, advancing `*pos` past the padding.
pub fn read_string(buf: &[u8], pos: &mut usize) -> Result<String, ProtocolError> {
    if buf.len() < *pos + 2 {
        return Err(ProtocolError::TruncatedString {
            claimed: 0,
            remaining: buf.len().saturating_sub(*pos),
        });
    }
    let len = u16::from_le_bytes([buf[*pos], buf[*pos + 1]]) as usize;
    let remaining = buf.len() - *pos - 2;
    if len > remaining {
        return Err(ProtocolError::TruncatedString {
            claimed: len,
            remaining,
        });
    }
    let start = *pos + 2;
    let s = String::from_utf8(buf[start..start + len].to_vec())
        .map_err(|_| ProtocolError::InvalidUtf8)?;
    let written = 2 + len;
    let pad = (4 - written % 4) % 4;
    *pos += written + pad;
    Ok(s)
}

/// Read a u16 at `buf[*pos]`, advancing `*pos` by 2.
pub fn read_u16(buf: &[u8], pos: &mut usize) -> u16 {
    let v = u16::from_le_bytes([buf[*pos], buf[*pos + 1]]);
    *pos += 2;
    v
}

/// Read a u32 at `buf[*pos]`, advancing `*pos` by 4.
pub fn read_u32(buf: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_le_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    *pos += 4;
    v
}

/// Read a u8 at `buf[*pos]`, advancing `*pos` by 1.
pub fn read_u8(buf: &[u8], pos: &mut usize) -> u8 {
    let v = buf[*pos];
    *pos += 1;
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip_various_lengths() {
        for s in ["", "a", "ab", "abc", "abcd", "a longer string value"] {
            let mut buf = Vec::new();
            write_string(&mut buf, s);
            assert_eq!(buf.len() % 4, 0);
            let mut pos = 0;
            let decoded = read_string(&buf, &mut pos).unwrap();
            assert_eq!(decoded, s);
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn truncated_string_is_rejected() {
        let mut buf = Vec::new();
        write_string(&mut buf, "hello world");
        buf.truncate(4);
        let mut pos = 0;
        assert!(read_string(&buf, &mut pos).is_err());
    }
}
