//! Function codes issued by the poller. Only the two register reads are supported.

pub(crate) const READ_HOLDING_REGISTERS: u8 = 3;
pub(crate) const READ_INPUT_REGISTERS: u8 = 4;
