use crate::error::InvalidRange;

/// Modbus unit identifier, just a type-safe wrapper around `u8`
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialization", serde(transparent))]
pub struct UnitId {
    /// underlying raw value
    pub value: u8,
}

/// Start and count tuple used when making read requests
/// Cannot be constructed with invalid start/count
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    /// Starting address of the range
    pub start: u16,
    /// Count of registers in the range
    pub count: u16,
}

/// Register bank a measurement point is read from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterBank {
    /// Holding registers, read with function code 0x03
    Holding,
    /// Input registers, read with function code 0x04
    Input,
}

/// How the register words of a measurement point are interpreted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueType {
    /// unsigned 16-bit integer (1 word)
    U16,
    /// signed 16-bit integer (1 word)
    I16,
    /// unsigned 32-bit integer (2 words)
    U32,
    /// signed 32-bit integer (2 words)
    I32,
    /// unsigned 64-bit integer (4 words)
    U64,
    /// signed 64-bit integer (4 words)
    I64,
    /// IEEE-754 single precision float (2 words), rounded to 2 decimals
    F32,
    /// IEEE-754 double precision float (4 words)
    F64,
    /// the raw bytes of a single word, not decoded numerically
    Hex,
}

/// Order of the bytes of a multi-byte value as transmitted by the device
///
/// The letters name the bytes of the value from most to least significant, in the order
/// they appear on the wire. `Abcd` is plain Modbus big-endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    /// big-endian words in big-endian order
    #[default]
    Abcd,
    /// bytes swapped within each word, words in big-endian order
    Badc,
    /// big-endian words in little-endian order
    Cdab,
    /// fully little-endian
    Dcba,
}

/// A decoded measurement value
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// unsigned 16-bit integer
    U16(u16),
    /// signed 16-bit integer
    I16(i16),
    /// unsigned 32-bit integer
    U32(u32),
    /// signed 32-bit integer
    I32(i32),
    /// unsigned 64-bit integer
    U64(u64),
    /// signed 64-bit integer
    I64(i64),
    /// single precision float
    F32(f32),
    /// double precision float
    F64(f64),
    /// raw register bytes as received
    Hex(Vec<u8>),
}

impl UnitId {
    /// Create a new UnitId
    pub fn new(value: u8) -> Self {
        Self { value }
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self { value: 0x01 }
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04X}", self.value)
    }
}

impl AddressRange {
    /// Create a new address range
    pub fn try_from(start: u16, count: u16) -> Result<Self, InvalidRange> {
        if count == 0 {
            return Err(InvalidRange::CountOfZero);
        }

        let max_start = u16::MAX - (count - 1);

        if start > max_start {
            return Err(InvalidRange::AddressOverflow(start, count));
        }

        Ok(Self { start, count })
    }

    /// Address of the last register in the range
    pub fn last(&self) -> u16 {
        // cannot overflow, checked at construction
        self.start + (self.count - 1)
    }

    /// true if `[first, last]` lies entirely inside the range
    pub fn contains(&self, first: u16, last: u16) -> bool {
        self.start <= first && last <= self.last()
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "start: {:#06X} qty: {}", self.start, self.count)
    }
}

impl RegisterBank {
    /// Function code used to read this bank
    pub fn function_code(self) -> u8 {
        match self {
            RegisterBank::Holding => crate::common::function::READ_HOLDING_REGISTERS,
            RegisterBank::Input => crate::common::function::READ_INPUT_REGISTERS,
        }
    }

    /// Bank read by a function code, if it is one of the supported read functions
    pub fn from_function_code(function: u8) -> Option<Self> {
        match function {
            crate::common::function::READ_HOLDING_REGISTERS => Some(RegisterBank::Holding),
            crate::common::function::READ_INPUT_REGISTERS => Some(RegisterBank::Input),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegisterBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterBank::Holding => {
                write!(f, "READ HOLDING REGISTERS ({:#04X})", self.function_code())
            }
            RegisterBank::Input => {
                write!(f, "READ INPUT REGISTERS ({:#04X})", self.function_code())
            }
        }
    }
}

impl ValueType {
    /// Number of 16-bit registers occupied by the type
    pub fn word_width(self) -> u16 {
        match self {
            ValueType::U16 | ValueType::I16 | ValueType::Hex => 1,
            ValueType::U32 | ValueType::I32 | ValueType::F32 => 2,
            ValueType::U64 | ValueType::I64 | ValueType::F64 => 4,
        }
    }

    /// Number of bytes occupied by the type
    pub fn byte_width(self) -> usize {
        2 * self.word_width() as usize
    }
}

impl ByteOrder {
    /// Rearrange `bytes` as transmitted by the device into big-endian order
    pub(crate) fn to_big_endian(self, bytes: &mut [u8]) {
        match self {
            ByteOrder::Abcd => {}
            ByteOrder::Badc => bytes.chunks_exact_mut(2).for_each(|word| word.swap(0, 1)),
            ByteOrder::Cdab => {
                let words = bytes.len() / 2;
                for i in 0..words / 2 {
                    let (first, second) = (2 * i, 2 * (words - 1 - i));
                    bytes.swap(first, second);
                    bytes.swap(first + 1, second + 1);
                }
            }
            ByteOrder::Dcba => bytes.reverse(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::U16(x) => write!(f, "{x}"),
            Value::I16(x) => write!(f, "{x}"),
            Value::U32(x) => write!(f, "{x}"),
            Value::I32(x) => write!(f, "{x}"),
            Value::U64(x) => write!(f, "{x}"),
            Value::I64(x) => write!(f, "{x}"),
            Value::F32(x) => write!(f, "{x}"),
            Value::F64(x) => write!(f, "{x}"),
            Value::Hex(bytes) => {
                let mut first = true;
                for byte in bytes {
                    if !first {
                        f.write_str(" ")?;
                    }
                    first = false;
                    write!(f, "{byte:02X}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_start_max_count_of_one_is_allowed() {
        AddressRange::try_from(u16::MAX, 1).unwrap();
    }

    #[test]
    fn address_maximum_range_is_ok() {
        AddressRange::try_from(0, 0xFFFF).unwrap();
    }

    #[test]
    fn address_range_catches_zero_and_overflow() {
        assert_eq!(
            AddressRange::try_from(u16::MAX, 2),
            Err(InvalidRange::AddressOverflow(u16::MAX, 2))
        );

        assert_eq!(AddressRange::try_from(0, 0), Err(InvalidRange::CountOfZero));
    }

    #[test]
    fn banks_map_to_and_from_read_function_codes() {
        for bank in [RegisterBank::Holding, RegisterBank::Input] {
            assert_eq!(RegisterBank::from_function_code(bank.function_code()), Some(bank));
        }
        assert_eq!(RegisterBank::from_function_code(0x06), None);
        assert_eq!(RegisterBank::from_function_code(0x83), None);
    }

    #[test]
    fn range_containment_is_inclusive() {
        let range = AddressRange::try_from(100, 2).unwrap();
        assert_eq!(range.last(), 101);
        assert!(range.contains(100, 101));
        assert!(range.contains(101, 101));
        assert!(!range.contains(99, 100));
        assert!(!range.contains(101, 102));
    }

    #[test]
    fn word_width_follows_value_type() {
        assert_eq!(ValueType::U16.word_width(), 1);
        assert_eq!(ValueType::Hex.word_width(), 1);
        assert_eq!(ValueType::F32.word_width(), 2);
        assert_eq!(ValueType::I64.word_width(), 4);
        assert_eq!(ValueType::F64.byte_width(), 8);
    }

    #[test]
    fn byte_orders_produce_big_endian() {
        let cases = [
            (ByteOrder::Abcd, [0x01, 0x02, 0x03, 0x04]),
            (ByteOrder::Badc, [0x02, 0x01, 0x04, 0x03]),
            (ByteOrder::Cdab, [0x03, 0x04, 0x01, 0x02]),
            (ByteOrder::Dcba, [0x04, 0x03, 0x02, 0x01]),
        ];

        for (order, mut wire) in cases {
            order.to_big_endian(&mut wire);
            assert_eq!(wire, [0x01, 0x02, 0x03, 0x04], "{order:?}");
        }
    }

    #[test]
    fn word_swap_reverses_all_words_of_64_bit_values() {
        let mut wire = [0x07, 0x08, 0x05, 0x06, 0x03, 0x04, 0x01, 0x02];
        ByteOrder::Cdab.to_big_endian(&mut wire);
        assert_eq!(wire, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    }

    #[test]
    fn hex_values_display_as_spaced_bytes() {
        assert_eq!(Value::Hex(vec![0x0A, 0xFF]).to_string(), "0A FF");
        assert_eq!(Value::I16(-3).to_string(), "-3");
    }
}
