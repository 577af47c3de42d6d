//! Byte order of multi-byte integers and of bit-field packing.

use std::{fmt, str::FromStr};

use crate::errors::Error;

/// Byte order used by integer leaves, pointer address fields and the
/// byte/bit adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    /// Most significant byte first.
    #[default]
    BigEndian,
    /// Least significant byte first.
    LittleEndian,
}

impl ByteOrder {
    /// Byte order of the machine the engine runs on.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }

    /// Decodes `bytes` as an unsigned integer. At most 16 bytes are meaningful.
    pub fn decode(self, bytes: &[u8]) -> u128 {
        let fold = |acc: u128, b: &u8| (acc << 8) | u128::from(*b);
        match self {
            ByteOrder::BigEndian => bytes.iter().fold(0, fold),
            ByteOrder::LittleEndian => bytes.iter().rev().fold(0, fold),
        }
    }

    /// Encodes the low `size` bytes of `value`.
    pub fn encode(self, value: u128, size: usize) -> Vec<u8> {
        let mut out: Vec<u8> = (0..size)
            .map(|i| if i < 16 { (value >> (8 * i)) as u8 } else { 0 })
            .collect();
        if self == ByteOrder::BigEndian {
            out.reverse();
        }
        out
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::BigEndian => f.write_str("big-endian"),
            ByteOrder::LittleEndian => f.write_str("little-endian"),
        }
    }
}

impl FromStr for ByteOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "big" | "bigendian" | "big-endian" | "be" => Ok(ByteOrder::BigEndian),
            "little" | "littleendian" | "little-endian" | "le" => Ok(ByteOrder::LittleEndian),
            _ => Err(Error::invalid("byte order", format!("unknown byte order `{}`", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_both_orders() {
        assert_eq!(ByteOrder::BigEndian.decode(&[0xde, 0xad]), 0xdead);
        assert_eq!(ByteOrder::LittleEndian.decode(&[0xde, 0xad]), 0xadde);
    }

    #[test]
    fn test_encode_both_orders() {
        assert_eq!(ByteOrder::BigEndian.encode(0x0102_0304, 4), vec![1, 2, 3, 4]);
        assert_eq!(ByteOrder::LittleEndian.encode(0x0102_0304, 4), vec![4, 3, 2, 1]);
        assert_eq!(ByteOrder::BigEndian.encode(0x1ff, 1), vec![0xff]);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!("le".parse::<ByteOrder>().unwrap(), ByteOrder::LittleEndian);
        assert!(matches!(
            "middle".parse::<ByteOrder>(),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
