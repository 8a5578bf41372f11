pub(crate) mod frame {
    /// Maximum length of a Modbus RTU frame, address through CRC
    pub(crate) const MAX_FRAME_LENGTH: usize = 256;
    /// Unit id + function code
    pub(crate) const HEADER_LENGTH: usize = 2;
    pub(crate) const CRC_LENGTH: usize = 2;
    /// Length of a serialized read request: unit id, function, start, count, crc
    pub(crate) const READ_REQUEST_LENGTH: usize = HEADER_LENGTH + 4 + CRC_LENGTH;
    /// Bit set in the function code of an exception response
    pub(crate) const EXCEPTION_MASK: u8 = 0x80;
}

pub(crate) mod limits {
    /// Largest span (last - first) of an interval that is read with a single request
    pub(crate) const MAX_SINGLE_SPAN: u16 = 100;
    /// Number of words read by each chunk when an interval is split
    pub(crate) const SPLIT_CHUNK_COUNT: u16 = 62;
    /// Number of words shared by consecutive chunks of a split interval
    pub(crate) const SPLIT_OVERLAP: u16 = 4;
}

pub(crate) mod timing {
    use std::time::Duration;

    pub(crate) const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);
    pub(crate) const DEFAULT_INTER_FRAME_DELAY: Duration = Duration::from_millis(50);
    pub(crate) const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(20);
}

pub(crate) mod queues {
    pub(crate) const OUTBOUND_QUEUE_SIZE: usize = 16;
    pub(crate) const INBOUND_QUEUE_SIZE: usize = 16;
}

pub(crate) mod exceptions {
    pub(crate) const ILLEGAL_FUNCTION: u8 = 0x01;
    pub(crate) const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
    pub(crate) const ILLEGAL_DATA_VALUE: u8 = 0x03;
    pub(crate) const SERVER_DEVICE_FAILURE: u8 = 0x04;
    pub(crate) const ACKNOWLEDGE: u8 = 0x05;
    pub(crate) const SERVER_DEVICE_BUSY: u8 = 0x06;
    pub(crate) const MEMORY_PARITY_ERROR: u8 = 0x08;
    pub(crate) const GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;
    pub(crate) const GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND: u8 = 0x0B;
}
