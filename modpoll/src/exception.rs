/// Exception codes a device may return instead of the requested registers
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ExceptionCode {
    /// The function code received in the query is not an allowable action for the server
    IllegalFunction,
    /// The data address received in the query is not an allowable address for the server
    IllegalDataAddress,
    /// A value contained in the request is not an allowable value for server
    IllegalDataValue,
    /// An unrecoverable error occurred while the server was attempting to perform the requested
    /// action
    ServerDeviceFailure,
    /// The server has accepted the request and is processing it
    Acknowledge,
    /// The server is engaged in processing a long-duration program command, try again later
    ServerDeviceBusy,
    /// The server attempted to read a record file, but detected a parity error in the memory
    MemoryParityError,
    /// The gateway was unable to allocate an internal communication path from the input port
    /// to the output port for processing the request
    GatewayPathUnavailable,
    /// No response was obtained from the target device behind a gateway
    GatewayTargetDeviceFailedToRespond,
    /// The exception code received is not defined in the standard
    Unknown(u8),
}

impl From<u8> for ExceptionCode {
    fn from(value: u8) -> Self {
        use crate::constants::exceptions::*;

        match value {
            ILLEGAL_FUNCTION => ExceptionCode::IllegalFunction,
            ILLEGAL_DATA_ADDRESS => ExceptionCode::IllegalDataAddress,
            ILLEGAL_DATA_VALUE => ExceptionCode::IllegalDataValue,
            SERVER_DEVICE_FAILURE => ExceptionCode::ServerDeviceFailure,
            ACKNOWLEDGE => ExceptionCode::Acknowledge,
            SERVER_DEVICE_BUSY => ExceptionCode::ServerDeviceBusy,
            MEMORY_PARITY_ERROR => ExceptionCode::MemoryParityError,
            GATEWAY_PATH_UNAVAILABLE => ExceptionCode::GatewayPathUnavailable,
            GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND => {
                ExceptionCode::GatewayTargetDeviceFailedToRespond
            }
            _ => ExceptionCode::Unknown(value),
        }
    }
}

impl From<ExceptionCode> for u8 {
    fn from(ex: ExceptionCode) -> Self {
        use crate::constants::exceptions::*;

        match ex {
            ExceptionCode::IllegalFunction => ILLEGAL_FUNCTION,
            ExceptionCode::IllegalDataAddress => ILLEGAL_DATA_ADDRESS,
            ExceptionCode::IllegalDataValue => ILLEGAL_DATA_VALUE,
            ExceptionCode::ServerDeviceFailure => SERVER_DEVICE_FAILURE,
            ExceptionCode::Acknowledge => ACKNOWLEDGE,
            ExceptionCode::ServerDeviceBusy => SERVER_DEVICE_BUSY,
            ExceptionCode::MemoryParityError => MEMORY_PARITY_ERROR,
            ExceptionCode::GatewayPathUnavailable => GATEWAY_PATH_UNAVAILABLE,
            ExceptionCode::GatewayTargetDeviceFailedToRespond => {
                GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND
            }
            ExceptionCode::Unknown(value) => value,
        }
    }
}

impl std::error::Error for ExceptionCode {}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match self {
            ExceptionCode::IllegalFunction => f.write_str("function code received in the query is not an allowable action for the server"),
            ExceptionCode::IllegalDataAddress => f.write_str("data address received in the query is not an allowable address for the server"),
            ExceptionCode::IllegalDataValue => f.write_str("value contained in the request is not an allowable value for server"),
            ExceptionCode::ServerDeviceFailure => f.write_str("unrecoverable error occurred while the server was attempting to perform the requested action"),
            ExceptionCode::Acknowledge => f.write_str("server has accepted the request and is processing it"),
            ExceptionCode::ServerDeviceBusy => f.write_str("server is engaged in processing a long-duration program command, try again later"),
            ExceptionCode::MemoryParityError => f.write_str("server attempted to read a record file, but detected a parity error in the memory"),
            ExceptionCode::GatewayPathUnavailable => f.write_str("gateway was unable to allocate an internal communication path from the input port to the output port for processing the request"),
            ExceptionCode::GatewayTargetDeviceFailedToRespond => f.write_str("gateway did not receive a response from the target device"),
            ExceptionCode::Unknown(code) => write!(f, "received unknown exception code: {code}")
        }
    }
}
