use crate::error::NetworkError;

/// Wire size of a message heading.
pub const HEADING_SIZE: usize = 24;

const COMMAND_SIZE: usize = 12;

/// 24 byte frame prefix: magic, null-padded command, payload size and
/// payload checksum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heading {
    pub magic: u32,
    pub command: String,
    pub payload_size: u32,
    pub checksum: u32,
}

impl Heading {
    /// Heading for a payload about to be sent.
    pub fn for_payload(magic: u32, command: &str, payload: &[u8]) -> Self {
        Self {
            magic,
            command: command.to_string(),
            payload_size: payload.len() as u32,
            checksum: codec::checksum(payload),
        }
    }

    pub fn encode(&self) -> [u8; HEADING_SIZE] {
        let mut buffer = [0u8; HEADING_SIZE];
        buffer[0..4].copy_from_slice(&self.magic.to_le_bytes());
        let command = self.command.as_bytes();
        debug_assert!(command.len() <= COMMAND_SIZE);
        let len = command.len().min(COMMAND_SIZE);
        buffer[4..4 + len].copy_from_slice(&command[..len]);
        buffer[16..20].copy_from_slice(&self.payload_size.to_le_bytes());
        buffer[20..24].copy_from_slice(&self.checksum.to_le_bytes());
        buffer
    }

    /// Decode a received heading.  The command must be printable ASCII
    /// padded with trailing zero bytes; anything else is a framing
    /// fault.
    pub fn decode(buffer: &[u8; HEADING_SIZE]) -> Result<Self, NetworkError> {
        let magic = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
        let command_field = &buffer[4..4 + COMMAND_SIZE];
        let end = command_field
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(COMMAND_SIZE);
        let (name, padding) = command_field.split_at(end);
        if name.is_empty()
            || !name.iter().all(u8::is_ascii_graphic)
            || padding.iter().any(|byte| *byte != 0)
        {
            return Err(NetworkError::BadStream);
        }
        let command = String::from_utf8(name.to_vec()).map_err(|_| NetworkError::BadStream)?;
        let payload_size = u32::from_le_bytes([buffer[16], buffer[17], buffer[18], buffer[19]]);
        let checksum = u32::from_le_bytes([buffer[20], buffer[21], buffer[22], buffer[23]]);
        Ok(Self {
            magic,
            command,
            payload_size,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_encode_is_byte_identical() {
        let heading = Heading::for_payload(0xd9b4_bef9, "ping", &8u64.to_le_bytes());
        let encoded = heading.encode();
        let decoded = Heading::decode(&encoded).expect("decode");
        assert_eq!(decoded, heading);
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn command_is_null_padded_ascii() {
        let encoded = Heading::for_payload(1, "verack", b"").encode();
        assert_eq!(&encoded[4..10], b"verack");
        assert!(encoded[10..16].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn empty_payload_checksum_is_the_well_known_constant() {
        let heading = Heading::for_payload(1, "verack", b"");
        assert_eq!(heading.checksum.to_le_bytes(), [0x5d, 0xf6, 0xe0, 0xe2]);
        assert_eq!(heading.payload_size, 0);
    }

    #[test]
    fn garbage_command_fields_are_rejected() {
        let mut buffer = Heading::for_payload(1, "ping", b"").encode();
        buffer[5] = 0x01; // unprintable inside the name
        assert!(Heading::decode(&buffer).is_err());

        let mut buffer = Heading::for_payload(1, "ping", b"").encode();
        buffer[10] = b'x'; // data after the null terminator
        assert!(Heading::decode(&buffer).is_err());

        let buffer = [0u8; HEADING_SIZE]; // empty command
        assert!(Heading::decode(&buffer).is_err());
    }
}
