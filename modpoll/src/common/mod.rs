pub(crate) mod crc;
pub(crate) mod frame;
pub(crate) mod function;
pub(crate) mod phys;
