use crate::common::crc;
use crate::constants::frame::{CRC_LENGTH, HEADER_LENGTH};
use crate::decode::FrameDecodeLevel;

/// A complete frame as written to or read from a transport: unit id, PDU and CRC trailer
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Frame {
    bytes: Vec<u8>,
}

/// Errors that occur when parsing a frame from hexadecimal text
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HexError {
    /// the text contains no hex digits
    Empty,
    /// the text contains a character other than hex digits, spaces and dashes
    InvalidCharacter(char),
    /// the number of hex digits is odd
    OddLength,
}

impl std::fmt::Display for HexError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            HexError::Empty => f.write_str("frame text is empty"),
            HexError::InvalidCharacter(c) => write!(f, "invalid character in frame text: {c:?}"),
            HexError::OddLength => f.write_str("frame text contains an odd number of hex digits"),
        }
    }
}

impl std::error::Error for HexError {}

impl Frame {
    /// Wrap raw bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Parse frame text such as `01 03 00 64 00 02 85 D4`
    ///
    /// Spaces and dashes between digits are ignored. The CRC is not checked, the text is
    /// sent exactly as written.
    pub fn from_hex(text: &str) -> Result<Self, HexError> {
        if let Some(c) = text
            .chars()
            .find(|c| !(c.is_ascii_hexdigit() || *c == ' ' || *c == '-'))
        {
            return Err(HexError::InvalidCharacter(c));
        }

        let digits: String = text.chars().filter(|c| c.is_ascii_hexdigit()).collect();
        if digits.is_empty() {
            return Err(HexError::Empty);
        }

        match hex::decode(digits) {
            Ok(bytes) => Ok(Self { bytes }),
            Err(hex::FromHexError::InvalidHexCharacter { c, .. }) => {
                Err(HexError::InvalidCharacter(c))
            }
            Err(_) => Err(HexError::OddLength),
        }
    }

    /// Raw bytes of the frame
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes in the frame
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// true if the frame contains no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// true if the CRC trailer matches the rest of the frame
    pub fn is_valid(&self) -> bool {
        crc::is_valid(&self.bytes)
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut first = true;
        for byte in &self.bytes {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Frame[{self}]")
    }
}

pub(crate) struct FrameDisplay<'a> {
    level: FrameDecodeLevel,
    frame: &'a [u8],
}

impl<'a> FrameDisplay<'a> {
    pub(crate) fn new(level: FrameDecodeLevel, frame: &'a [u8]) -> Self {
        FrameDisplay { level, frame }
    }
}

impl std::fmt::Display for FrameDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.frame.len() < HEADER_LENGTH + CRC_LENGTH {
            return write!(f, "runt frame (len = {})", self.frame.len());
        }

        let payload = &self.frame[HEADER_LENGTH..self.frame.len() - CRC_LENGTH];
        let crc = crc::split_trailer(self.frame).map(|(_, crc)| crc).unwrap_or_default();
        write!(
            f,
            "dest: {:#04X} fc: {:#04X} crc: {:#06X} (payload len = {})",
            self.frame[0],
            self.frame[1],
            crc,
            payload.len(),
        )?;
        if self.level.payload_enabled() {
            crate::common::phys::format_bytes(f, payload)?;
        }
        Ok(())
    }
}
