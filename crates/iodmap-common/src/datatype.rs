//! Datatype descriptors and representation conversion
//!
//! A map stores keys and values in a *stored* representation that may differ
//! from the client's in-memory one (width, signedness, byte order). Handlers
//! convert fixed-size elements between the two before storing and after
//! retrieving. Variable-length elements are self-describing and pass through
//! untouched.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Byte order of a fixed-size numeric type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Descriptor of one element's representation
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datatype {
    /// Two's complement or unsigned integer of 1, 2, 4 or 8 bytes
    Integer {
        size: u8,
        signed: bool,
        order: ByteOrder,
    },
    /// IEEE 754 float of 4 or 8 bytes
    Float { size: u8, order: ByteOrder },
    /// Uninterpreted fixed-size bytes
    Opaque { size: u32 },
    /// Variable-length string
    VarString,
    /// Variable-length sequence of a base type
    VarSequence(Box<Datatype>),
}

impl Datatype {
    pub const STD_I8: Self = Self::int(1, true, ByteOrder::Little);
    pub const STD_U8: Self = Self::int(1, false, ByteOrder::Little);
    pub const STD_I16LE: Self = Self::int(2, true, ByteOrder::Little);
    pub const STD_I32LE: Self = Self::int(4, true, ByteOrder::Little);
    pub const STD_I32BE: Self = Self::int(4, true, ByteOrder::Big);
    pub const STD_U32LE: Self = Self::int(4, false, ByteOrder::Little);
    pub const STD_I64LE: Self = Self::int(8, true, ByteOrder::Little);
    pub const STD_I64BE: Self = Self::int(8, true, ByteOrder::Big);
    pub const STD_U64LE: Self = Self::int(8, false, ByteOrder::Little);
    pub const IEEE_F32LE: Self = Self::Float {
        size: 4,
        order: ByteOrder::Little,
    };
    pub const IEEE_F64LE: Self = Self::Float {
        size: 8,
        order: ByteOrder::Little,
    };
    pub const IEEE_F64BE: Self = Self::Float {
        size: 8,
        order: ByteOrder::Big,
    };

    const fn int(size: u8, signed: bool, order: ByteOrder) -> Self {
        Self::Integer {
            size,
            signed,
            order,
        }
    }

    /// Size of one element, or `None` for variable-length types
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            Self::Integer { size, .. } | Self::Float { size, .. } => Some(*size as usize),
            Self::Opaque { size } => Some(*size as usize),
            Self::VarString | Self::VarSequence(_) => None,
        }
    }

    #[must_use]
    pub const fn is_variable_length(&self) -> bool {
        matches!(self, Self::VarString | Self::VarSequence(_))
    }

    /// Reject descriptors with widths the converter doesn't handle
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Integer { size, .. } if !matches!(size, 1 | 2 | 4 | 8) => Err(
                Error::conversion(format!("unsupported integer width {size}")),
            ),
            Self::Float { size, .. } if !matches!(size, 4 | 8) => {
                Err(Error::conversion(format!("unsupported float width {size}")))
            }
            Self::VarSequence(base) => base.validate(),
            _ => Ok(()),
        }
    }
}

/// A buffer after adjustment to the stored representation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Converted {
    pub bytes: Vec<u8>,
    /// The element was variable-length and passed through as-is
    pub variable_length: bool,
}

/// Adjust a client buffer to the stored representation.
///
/// Variable-length elements pass through untouched (the two descriptors must
/// both be variable-length and of the same class); fixed-size ones are
/// converted element-wise.
pub fn to_stored(mem: &Datatype, stored: &Datatype, buf: &[u8]) -> Result<Converted> {
    if mem.is_variable_length() || stored.is_variable_length() {
        check_vl_compatible(mem, stored)?;
        return Ok(Converted {
            bytes: buf.to_vec(),
            variable_length: true,
        });
    }
    Ok(Converted {
        bytes: convert(mem, stored, buf)?,
        variable_length: false,
    })
}

fn check_vl_compatible(a: &Datatype, b: &Datatype) -> Result<()> {
    match (a, b) {
        (Datatype::VarString, Datatype::VarString) => Ok(()),
        (Datatype::VarSequence(x), Datatype::VarSequence(y)) if x == y => Ok(()),
        _ => Err(Error::conversion(format!(
            "can't convert between {a:?} and {b:?}"
        ))),
    }
}

/// Convert one fixed-size element from `src` to `dst` representation
pub fn convert(src: &Datatype, dst: &Datatype, buf: &[u8]) -> Result<Vec<u8>> {
    src.validate()?;
    dst.validate()?;

    let src_size = src
        .size()
        .ok_or_else(|| Error::conversion("source is variable-length"))?;
    if buf.len() != src_size {
        return Err(Error::conversion(format!(
            "buffer is {} bytes, {src:?} needs {src_size}",
            buf.len()
        )));
    }
    if src == dst {
        return Ok(buf.to_vec());
    }

    match (src, dst) {
        (Datatype::Opaque { size: a }, Datatype::Opaque { size: b }) if a == b => Ok(buf.to_vec()),
        (Datatype::Integer { .. } | Datatype::Float { .. }, _) => {
            let value = decode(src, buf);
            encode(dst, value)
        }
        _ => Err(Error::conversion(format!(
            "can't convert between {src:?} and {dst:?}"
        ))),
    }
}

/// Intermediate numeric value
#[derive(Clone, Copy, Debug)]
enum Number {
    Int(i128),
    Float(f64),
}

fn read_raw(buf: &[u8], order: ByteOrder) -> u64 {
    let mut raw = 0u64;
    match order {
        ByteOrder::Big => {
            for byte in buf {
                raw = (raw << 8) | u64::from(*byte);
            }
        }
        ByteOrder::Little => {
            for byte in buf.iter().rev() {
                raw = (raw << 8) | u64::from(*byte);
            }
        }
    }
    raw
}

fn write_raw(raw: u64, size: usize, order: ByteOrder) -> Vec<u8> {
    let le = raw.to_le_bytes();
    let mut out = le[..size].to_vec();
    if order == ByteOrder::Big {
        out.reverse();
    }
    out
}

fn decode(ty: &Datatype, buf: &[u8]) -> Number {
    match ty {
        Datatype::Integer {
            size,
            signed,
            order,
        } => {
            let raw = read_raw(buf, *order);
            if *signed {
                let shift = 64 - u32::from(*size) * 8;
                // sign-extend from the element width
                Number::Int(i128::from((raw << shift).cast_signed() >> shift))
            } else {
                Number::Int(i128::from(raw))
            }
        }
        Datatype::Float { size: 4, order } => {
            let raw = read_raw(buf, *order);
            Number::Float(f64::from(f32::from_bits(raw as u32)))
        }
        Datatype::Float { order, .. } => Number::Float(f64::from_bits(read_raw(buf, *order))),
        _ => unreachable!("decode called on non-numeric type"),
    }
}

fn encode(ty: &Datatype, value: Number) -> Result<Vec<u8>> {
    match ty {
        Datatype::Integer {
            size,
            signed,
            order,
        } => {
            let int = match value {
                Number::Int(v) => v,
                Number::Float(f) if f.is_finite() => f.trunc() as i128,
                Number::Float(f) => {
                    return Err(Error::conversion(format!(
                        "{f} has no integer representation"
                    )));
                }
            };
            let bits = u32::from(*size) * 8;
            let (min, max) = if *signed {
                (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
            } else {
                (0, (1i128 << bits) - 1)
            };
            if int < min || int > max {
                return Err(Error::conversion(format!(
                    "{int} out of range for {ty:?}"
                )));
            }
            // two's complement truncation to the target width
            let raw = (int as u128 & u128::from(u64::MAX)) as u64;
            Ok(write_raw(raw, *size as usize, *order))
        }
        Datatype::Float { size, order } => {
            let float = match value {
                Number::Int(v) => v as f64,
                Number::Float(f) => f,
            };
            let raw = if *size == 4 {
                u64::from((float as f32).to_bits())
            } else {
                float.to_bits()
            };
            Ok(write_raw(raw, *size as usize, *order))
        }
        _ => Err(Error::conversion(format!("can't encode into {ty:?}"))),
    }
}
