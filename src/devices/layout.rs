//! Register layouts and the decode engine.
//!
//! A layout declares, field by field, how a block of holding registers turns
//! into integers. Arity is fixed up front, so decoding never relies on running
//! out of data to know where to stop.

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

use crate::utils::error::DecodeError;

/// Order of the two bytes inside a register, or of the registers inside a
/// multi-register field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Big,
    Little,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Big => write!(f, "big"),
            Endianness::Little => write!(f, "little"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FieldWidth {
    Bits16,
    Bits32,
}

impl FieldWidth {
    /// 16-bit registers consumed by one field of this width.
    pub fn registers(self) -> usize {
        match self {
            FieldWidth::Bits16 => 1,
            FieldWidth::Bits32 => 2,
        }
    }
}

impl TryFrom<u8> for FieldWidth {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            16 => Ok(FieldWidth::Bits16),
            32 => Ok(FieldWidth::Bits32),
            other => Err(format!("unsupported field width {} (expected 16 or 32)", other)),
        }
    }
}

impl From<FieldWidth> for u8 {
    fn from(width: FieldWidth) -> u8 {
        match width {
            FieldWidth::Bits16 => 16,
            FieldWidth::Bits32 => 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Column header in the sink file.
    pub name: String,
    pub width: FieldWidth,
    #[serde(default)]
    pub signed: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, width: FieldWidth, signed: bool) -> Self {
        Self {
            name: name.into(),
            width,
            signed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterLayout {
    fields: Vec<FieldSpec>,
}

impl RegisterLayout {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// `count` identical fields named after the register they start at.
    pub fn uniform(start_address: u16, count: usize, width: FieldWidth, signed: bool) -> Self {
        let fields = (0..count)
            .map(|i| {
                let register = start_address as usize + i * width.registers();
                FieldSpec::new(format!("reg_{}", register), width, signed)
            })
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Number of values a decode yields.
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    /// Registers the layout consumes.
    pub fn register_count(&self) -> usize {
        self.fields.iter().map(|f| f.width.registers()).sum()
    }

    pub fn header_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

fn order_bytes(register: u16, byte_order: Endianness) -> u16 {
    match byte_order {
        Endianness::Big => register,
        Endianness::Little => register.swap_bytes(),
    }
}

/// Decode `raw` registers into one integer per layout field.
///
/// Registers beyond what the layout consumes are ignored.
pub fn decode(
    raw: &[u16],
    byte_order: Endianness,
    word_order: Endianness,
    layout: &RegisterLayout,
) -> Result<Vec<i64>, DecodeError> {
    let mut values = Vec::with_capacity(layout.arity());
    let mut cursor = 0usize;

    for (index, field) in layout.fields().iter().enumerate() {
        let needed = field.width.registers();
        let available = raw.len().saturating_sub(cursor);
        if available < needed {
            return Err(DecodeError::InsufficientRegisters {
                field: index,
                needed,
                available,
            });
        }

        let value = match field.width {
            FieldWidth::Bits16 => {
                let word = order_bytes(raw[cursor], byte_order);
                if field.signed {
                    word as i16 as i64
                } else {
                    word as i64
                }
            }
            FieldWidth::Bits32 => {
                let first = order_bytes(raw[cursor], byte_order);
                let second = order_bytes(raw[cursor + 1], byte_order);
                let (high, low) = match word_order {
                    Endianness::Big => (first, second),
                    Endianness::Little => (second, first),
                };
                let combined = ((high as u32) << 16) | low as u32;
                if field.signed {
                    combined as i32 as i64
                } else {
                    combined as i64
                }
            }
        };

        values.push(value);
        cursor += needed;
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_layout(n: usize) -> RegisterLayout {
        RegisterLayout::uniform(0, n, FieldWidth::Bits32, false)
    }

    #[test]
    fn word_order_selects_high_register() {
        let raw = [0x0001, 0x0002];
        let layout = u32_layout(1);

        let big = decode(&raw, Endianness::Big, Endianness::Big, &layout).unwrap();
        assert_eq!(big, vec![0x0001_0002]);

        let little = decode(&raw, Endianness::Big, Endianness::Little, &layout).unwrap();
        assert_eq!(little, vec![0x0002_0001]);
    }

    #[test]
    fn byte_order_swaps_inside_each_register() {
        let layout = RegisterLayout::uniform(0, 1, FieldWidth::Bits16, false);
        let raw = [0x1234];

        assert_eq!(
            decode(&raw, Endianness::Big, Endianness::Big, &layout).unwrap(),
            vec![0x1234]
        );
        assert_eq!(
            decode(&raw, Endianness::Little, Endianness::Big, &layout).unwrap(),
            vec![0x3412]
        );

        let wide = u32_layout(1);
        assert_eq!(
            decode(&[0x0102, 0x0304], Endianness::Little, Endianness::Little, &wide).unwrap(),
            vec![0x0403_0201]
        );
    }

    #[test]
    fn signedness_is_applied_after_assembly() {
        let layout = RegisterLayout::new(vec![
            FieldSpec::new("a", FieldWidth::Bits16, true),
            FieldSpec::new("b", FieldWidth::Bits16, false),
            FieldSpec::new("c", FieldWidth::Bits32, true),
            FieldSpec::new("d", FieldWidth::Bits32, false),
        ]);
        let raw = [0xFFFE, 0xFFFE, 0xFFFF, 0xFFF6, 0xFFFF, 0xFFF6];

        let values = decode(&raw, Endianness::Big, Endianness::Big, &layout).unwrap();
        assert_eq!(values, vec![-2, 65534, -10, 4_294_967_286]);
    }

    #[test]
    fn eight_unsigned_32_bit_fields() {
        let raw = [0, 1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0, 7, 0, 8];
        let layout = u32_layout(8);
        assert_eq!(layout.register_count(), 16);

        let big = decode(&raw, Endianness::Big, Endianness::Big, &layout).unwrap();
        assert_eq!(big, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let little = decode(&raw, Endianness::Big, Endianness::Little, &layout).unwrap();
        assert_eq!(
            little,
            vec![65536, 131072, 196608, 262144, 327680, 393216, 458752, 524288]
        );
    }

    #[test]
    fn short_block_fails_at_the_field_boundary() {
        let layout = RegisterLayout::new(vec![
            FieldSpec::new("a", FieldWidth::Bits16, false),
            FieldSpec::new("b", FieldWidth::Bits32, false),
        ]);

        let err = decode(&[1, 2], Endianness::Big, Endianness::Big, &layout).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InsufficientRegisters {
                field: 1,
                needed: 2,
                available: 1
            }
        );
    }

    #[test]
    fn trailing_registers_are_ignored() {
        let layout = RegisterLayout::uniform(0, 2, FieldWidth::Bits16, false);
        let values = decode(&[7, 8, 9], Endianness::Big, Endianness::Big, &layout).unwrap();
        assert_eq!(values, vec![7, 8]);
    }

    #[test]
    fn uniform_names_follow_register_addresses() {
        let layout = RegisterLayout::uniform(19, 3, FieldWidth::Bits16, true);
        assert_eq!(layout.header_names(), vec!["reg_19", "reg_20", "reg_21"]);

        let wide = RegisterLayout::uniform(0, 2, FieldWidth::Bits32, false);
        assert_eq!(wide.header_names(), vec!["reg_0", "reg_2"]);
    }

    #[test]
    fn width_rejects_unknown_bit_counts() {
        assert_eq!(FieldWidth::try_from(32), Ok(FieldWidth::Bits32));
        assert!(FieldWidth::try_from(64).is_err());
    }
}
