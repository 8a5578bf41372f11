use crate::exception::ExceptionCode;
use crate::types::UnitId;

/// The task processing a queue has shut down
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Shutdown;

impl std::fmt::Display for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("the task processing the queue has shut down")
    }
}

impl std::error::Error for Shutdown {}

/// Errors that stop polling on a transport until it is spawned again
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The serial port could not be opened or the TCP connection could not be established
    Open(String),
    /// An I/O error occurred while reading or writing the open transport
    Io(std::io::ErrorKind),
    /// The remote end closed the stream
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransportError::Open(details) => write!(f, "unable to open transport: {details}"),
            TransportError::Io(kind) => write!(f, "i/o error: {kind}"),
            TransportError::Closed => f.write_str("the remote end closed the stream"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => TransportError::Closed,
            kind => TransportError::Io(kind),
        }
    }
}

/// Errors that result from an invalid start/count pair
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InvalidRange {
    /// Count of zero not allowed
    CountOfZero,
    /// Address in range overflows u16
    AddressOverflow(u16, u16),
}

impl std::fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InvalidRange::CountOfZero => f.write_str("range contains count == 0"),
            InvalidRange::AddressOverflow(start, count) => write!(
                f,
                "start == {start} and count = {count} would overflow the representation of u16"
            ),
        }
    }
}

impl std::error::Error for InvalidRange {}

/// Errors that result from an invalid measurement point definition
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InvalidPoint {
    /// The words occupied by the point extend beyond address 0xFFFF
    AddressOverflow {
        /// first word of the point
        address: u16,
        /// number of words the value type occupies
        words: u16,
    },
}

impl std::fmt::Display for InvalidPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InvalidPoint::AddressOverflow { address, words } => write!(
                f,
                "a value of {words} word(s) at address {address} would overflow the register space"
            ),
        }
    }
}

impl std::error::Error for InvalidPoint {}

/// Reasons an inbound frame is discarded instead of being decoded
///
/// These never reach the caller. They are logged and the frame is dropped, the next poll
/// cycle requests the same data again.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// frame is too short to contain a header and a CRC
    TooShort(usize),
    /// CRC trailer doesn't match the computed value (received, expected)
    CrcMismatch(u16, u16),
    /// the device answered with an exception
    Exception(ExceptionCode),
    /// a frame arrived while no request was outstanding
    NoOutstandingRequest,
    /// unit id doesn't match the outstanding request (expected, actual)
    UnitIdMismatch(UnitId, UnitId),
    /// function code doesn't match the outstanding request (expected, actual)
    FunctionMismatch(u8, u8),
    /// byte count doesn't match twice the requested register count (expected, actual)
    CountMismatch(u16, u8),
    /// byte count doesn't match the number of payload bytes present (count, remaining)
    ByteCountMismatch(u8, usize),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameError::TooShort(len) => write!(f, "frame of {len} byte(s) is too short"),
            FrameError::CrcMismatch(received, expected) => write!(
                f,
                "received crc {received:#06X} doesn't match the expected value {expected:#06X}"
            ),
            FrameError::Exception(ex) => write!(f, "modbus exception: {ex}"),
            FrameError::NoOutstandingRequest => f.write_str("no request is outstanding"),
            FrameError::UnitIdMismatch(expected, actual) => {
                write!(f, "expected unit id {expected} but received {actual}")
            }
            FrameError::FunctionMismatch(expected, actual) => write!(
                f,
                "expected function {expected:#04X} but received {actual:#04X}"
            ),
            FrameError::CountMismatch(count, byte_count) => write!(
                f,
                "byte count ({byte_count}) doesn't match the requested register count ({count})"
            ),
            FrameError::ByteCountMismatch(count, remaining) => write!(
                f,
                "byte count ({count}) doesn't match the actual number of bytes remaining ({remaining})"
            ),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<scursor::ReadError> for FrameError {
    fn from(_: scursor::ReadError) -> Self {
        FrameError::TooShort(0)
    }
}
