use crate::constants::frame::CRC_LENGTH;

/// precomputes the CRC table as a constant!
const CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);

/// Compute the Modbus CRC-16 of `bytes`
pub fn checksum(bytes: &[u8]) -> u16 {
    CRC.checksum(bytes)
}

/// Returns true if the last two bytes of `frame` are the little-endian CRC of the bytes that precede them
///
/// Sequences shorter than the trailer are never valid.
pub fn is_valid(frame: &[u8]) -> bool {
    match split_trailer(frame) {
        Some((body, received)) => checksum(body) == received,
        None => false,
    }
}

/// Append the little-endian CRC trailer of `bytes` to `bytes`
pub fn append_checksum(bytes: &mut Vec<u8>) {
    let crc = checksum(bytes);
    bytes.extend_from_slice(&crc.to_le_bytes());
}

/// Split a frame into its body and the received CRC value
pub(crate) fn split_trailer(frame: &[u8]) -> Option<(&[u8], u16)> {
    if frame.len() < CRC_LENGTH {
        return None;
    }
    let (body, trailer) = frame.split_at(frame.len() - CRC_LENGTH);
    Some((body, u16::from_le_bytes([trailer[0], trailer[1]])))
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ_HOLDING_REGISTERS_REQUEST: &[u8] = &[
        0x2A, // unit id
        0x03, // function code
        0x00, 0x10, // starting address
        0x00, 0x03, // qty of registers
        0x02, 0x15, // crc
    ];

    const READ_HOLDING_REGISTERS_RESPONSE: &[u8] = &[
        0x2A, // unit id
        0x03, // function code
        0x06, // byte count
        0x12, 0x34, 0x56, 0x78, 0x23, 0x45, // register values
        0x30, 0x60, // crc
    ];

    #[test]
    fn computes_known_checksums() {
        assert_eq!(checksum(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), 0xCDC5);
        assert_eq!(checksum(&READ_HOLDING_REGISTERS_REQUEST[..6]), 0x1502);
    }

    #[test]
    fn validates_frames_with_correct_trailer() {
        assert!(is_valid(READ_HOLDING_REGISTERS_REQUEST));
        assert!(is_valid(READ_HOLDING_REGISTERS_RESPONSE));
    }

    #[test]
    fn rejects_frames_with_wrong_trailer() {
        let mut frame = READ_HOLDING_REGISTERS_REQUEST.to_vec();
        frame[7] ^= 0xFF;
        assert!(!is_valid(&frame));

        let mut frame = READ_HOLDING_REGISTERS_RESPONSE.to_vec();
        frame[4] = 0x00;
        assert!(!is_valid(&frame));
    }

    #[test]
    fn short_sequences_are_accepted_but_never_valid() {
        assert!(!is_valid(&[]));
        assert!(!is_valid(&[0x01]));
        // any input produces a value, including nothing at all
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn two_byte_frame_is_checked_against_empty_body() {
        let trailer = checksum(&[]).to_le_bytes();
        assert!(is_valid(&trailer));
    }

    #[test]
    fn appended_checksum_always_validates() {
        let inputs: [&[u8]; 4] = [
            &[],
            &[0x00],
            &[0x11, 0x04, 0x00, 0x08, 0x00, 0x01],
            &[0xFF; 253],
        ];

        for input in inputs {
            let mut bytes = input.to_vec();
            append_checksum(&mut bytes);
            assert_eq!(bytes.len(), input.len() + 2);
            assert!(is_valid(&bytes));
            // running the whole frame through the polynomial yields zero
            assert_eq!(checksum(&bytes), 0);
        }
    }
}
