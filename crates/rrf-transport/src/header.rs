//! Transfer header layout and checksums
//!
//! The header is exchanged first on every transfer and is always 16 bytes,
//! little-endian. See the module-level docs in `lib.rs` for the four-step
//! exchange this header participates in.

use crc::{Crc, CRC_32_ISCSI};

/// CRC32C (Castagnoli): init 0xFFFFFFFF, reflected in/out, xorout 0xFFFFFFFF.
const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Size in bytes of the on-wire transfer header.
pub const HEADER_SIZE: usize = 16;

/// Constant format code identifying this protocol family.
pub const FORMAT_CODE: u8 = 0xA5;

/// Maximum payload size in bytes.
pub const MAX_DATA_LENGTH: usize = 2048;

fn crc32c(data: &[u8]) -> u32 {
    CRC32C.checksum(data)
}

/// The 16-byte header exchanged at the start of every transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHeader {
    /// Constant format code identifying the protocol family.
    pub format_code: u8,
    /// Number of packets contained in the payload.
    pub num_packets: u8,
    /// Protocol version; the peer must echo a version we accept.
    pub protocol_version: u16,
    /// Monotonically increasing (mod 2^16) sequence number for this side.
    pub sequence_number: u16,
    /// Number of payload bytes that follow (before zero padding).
    pub data_length: u16,
    /// CRC32C of exactly `data_length` payload bytes.
    pub checksum_data: u32,
    /// CRC32C of bytes `[0..12)` of this header.
    pub checksum_header: u32,
}

impl TransferHeader {
    /// Build a header for `payload`, computing both checksums.
    pub fn new(
        protocol_version: u16,
        sequence_number: u16,
        num_packets: u8,
        payload: &[u8],
    ) -> Self {
        let checksum_data = crc32c(payload);
        let mut header = Self {
            format_code: FORMAT_CODE,
            num_packets,
            protocol_version,
            sequence_number,
            data_length: payload.len() as u16,
            checksum_data,
            checksum_header: 0,
        };
        header.checksum_header = crc32c(&header.to_bytes()[..12]);
        header
    }

    /// Serialize to the 16-byte wire layout.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.format_code;
        buf[1] = self.num_packets;
        buf[2..4].copy_from_slice(&self.protocol_version.to_le_bytes());
        buf[4..6].copy_from_slice(&self.sequence_number.to_le_bytes());
        buf[6..8].copy_from_slice(&self.data_length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum_data.to_le_bytes());
        buf[12..16].copy_from_slice(&self.checksum_header.to_le_bytes());
        buf
    }

    /// Parse a 16-byte buffer. Does not itself validate the checksum; callers
    /// must call [`TransferHeader::header_checksum_valid`] before trusting
    /// any other field, per the wire protocol's invariant 4.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            format_code: buf[0],
            num_packets: buf[1],
            protocol_version: u16::from_le_bytes([buf[2], buf[3]]),
            sequence_number: u16::from_le_bytes([buf[4], buf[5]]),
            data_length: u16::from_le_bytes([buf[6], buf[7]]),
            checksum_data: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            checksum_header: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        }
    }

    /// Verify `checksum_header` against bytes `[0..12)` of this header.
    pub fn header_checksum_valid(&self) -> bool {
        crc32c(&self.to_bytes()[..12]) == self.checksum_header
    }

    /// Verify `checksum_data` against the given (pre-padding) payload bytes.
    pub fn data_checksum_valid(&self, payload: &[u8]) -> bool {
        payload.len() == self.data_length as usize && crc32c(payload) == self.checksum_data
    }
}

/// Response codes exchanged as 4-byte little-endian values after each
/// header and payload phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResponseCode {
    Success = 1,
    BadFormat = 2,
    BadProtocolVersion = 3,
    BadHeaderChecksum = 4,
    BadDataChecksum = 5,
    BadResponse = 6,
}

impl ResponseCode {
    /// Size in bytes of a response code on the wire.
    pub const WIRE_SIZE: usize = 4;

    /// Serialize to the 4-byte wire layout.
    pub fn to_bytes(self) -> [u8; 4] {
        (self as u32).to_le_bytes()
    }

    /// Parse a 4-byte response code, mapping any unrecognized value to
    /// [`ResponseCode::BadResponse`] rather than failing outright — an
    /// unrecognized response is itself information (the peer is confused or
    /// desynced), not a transport-fatal condition.
    pub fn from_bytes(buf: [u8; 4]) -> Self {
        match u32::from_le_bytes(buf) {
            1 => Self::Success,
            2 => Self::BadFormat,
            3 => Self::BadProtocolVersion,
            4 => Self::BadHeaderChecksum,
            5 => Self::BadDataChecksum,
            _ => Self::BadResponse,
        }
    }

    /// Whether this response code indicates the preceding phase succeeded.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let header = TransferHeader::new(1, 42, 1, &payload);
        let bytes = header.to_bytes();
        let decoded = TransferHeader::from_bytes(&bytes);
        assert_eq!(header, decoded);
        assert!(decoded.header_checksum_valid());
        assert!(decoded.data_checksum_valid(&payload));
    }

    #[test]
    fn corrupt_header_byte_detected() {
        let payload = [0u8; 0];
        let header = TransferHeader::new(1, 1, 0, &payload);
        let mut bytes = header.to_bytes();
        bytes[3] ^= 0xFF; // flip a bit in protocol_version
        let decoded = TransferHeader::from_bytes(&bytes);
        assert!(!decoded.header_checksum_valid());
    }

    #[test]
    fn corrupt_payload_byte_detected() {
        let mut payload = [0u8; 8];
        let header = TransferHeader::new(1, 1, 1, &payload);
        payload[3] ^= 0xFF;
        assert!(!header.data_checksum_valid(&payload));
    }

    #[test]
    fn response_code_round_trip() {
        for code in [
            ResponseCode::Success,
            ResponseCode::BadFormat,
            ResponseCode::BadProtocolVersion,
            ResponseCode::BadHeaderChecksum,
            ResponseCode::BadDataChecksum,
        ] {
            assert_eq!(ResponseCode::from_bytes(code.to_bytes()), code);
        }
    }

    #[test]
    fn unknown_response_code_maps_to_bad_response() {
        assert_eq!(
            ResponseCode::from_bytes(0xDEAD_BEEFu32.to_le_bytes()),
            ResponseCode::BadResponse
        );
    }
}
