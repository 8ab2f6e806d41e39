//! The FIT base types and the decoded value model.
//!
//! Every field in a FIT record is stored as one of sixteen base types, each
//! with a fixed width and an "invalid" bit pattern meaning no value was
//! recorded. Reads compare the raw bits against that sentinel first, so a
//! missing value surfaces as `None` rather than as the sentinel itself.

use crate::codec::{self, CodecError};

/// A FIT base type: wire code, width, signedness, and invalid sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseType {
    pub code: u8,
    pub name: &'static str,
    pub width: usize,
    pub signed: bool,
    pub float: bool,
    pub invalid: u64,
}

pub const ENUM: BaseType = BaseType {
    code: 0x00,
    name: "enum",
    width: 1,
    signed: false,
    float: false,
    invalid: 0xFF,
};
pub const SINT8: BaseType = BaseType {
    code: 0x01,
    name: "sint8",
    width: 1,
    signed: true,
    float: false,
    invalid: 0x7F,
};
pub const UINT8: BaseType = BaseType {
    code: 0x02,
    name: "uint8",
    width: 1,
    signed: false,
    float: false,
    invalid: 0xFF,
};
pub const SINT16: BaseType = BaseType {
    code: 0x83,
    name: "sint16",
    width: 2,
    signed: true,
    float: false,
    invalid: 0x7FFF,
};
pub const UINT16: BaseType = BaseType {
    code: 0x84,
    name: "uint16",
    width: 2,
    signed: false,
    float: false,
    invalid: 0xFFFF,
};
pub const SINT32: BaseType = BaseType {
    code: 0x85,
    name: "sint32",
    width: 4,
    signed: true,
    float: false,
    invalid: 0x7FFF_FFFF,
};
pub const UINT32: BaseType = BaseType {
    code: 0x86,
    name: "uint32",
    width: 4,
    signed: false,
    float: false,
    invalid: 0xFFFF_FFFF,
};
pub const STRING: BaseType = BaseType {
    code: 0x07,
    name: "string",
    width: 1,
    signed: false,
    float: false,
    invalid: 0x00,
};
pub const FLOAT32: BaseType = BaseType {
    code: 0x88,
    name: "float32",
    width: 4,
    signed: false,
    float: true,
    invalid: 0xFFFF_FFFF,
};
pub const FLOAT64: BaseType = BaseType {
    code: 0x89,
    name: "float64",
    width: 8,
    signed: false,
    float: true,
    invalid: 0xFFFF_FFFF_FFFF_FFFF,
};
pub const UINT8Z: BaseType = BaseType {
    code: 0x0A,
    name: "uint8z",
    width: 1,
    signed: false,
    float: false,
    invalid: 0,
};
pub const UINT16Z: BaseType = BaseType {
    code: 0x8B,
    name: "uint16z",
    width: 2,
    signed: false,
    float: false,
    invalid: 0,
};
pub const UINT32Z: BaseType = BaseType {
    code: 0x8C,
    name: "uint32z",
    width: 4,
    signed: false,
    float: false,
    invalid: 0,
};
pub const BYTE: BaseType = BaseType {
    code: 0x0D,
    name: "byte",
    width: 1,
    signed: false,
    float: false,
    invalid: 0xFF,
};
pub const SINT64: BaseType = BaseType {
    code: 0x8E,
    name: "sint64",
    width: 8,
    signed: true,
    float: false,
    invalid: 0x7FFF_FFFF_FFFF_FFFF,
};
pub const UINT64: BaseType = BaseType {
    code: 0x8F,
    name: "uint64",
    width: 8,
    signed: false,
    float: false,
    invalid: 0xFFFF_FFFF_FFFF_FFFF,
};

impl BaseType {
    /// Look a base type up by its wire code.
    pub fn from_code(code: u8) -> Option<&'static BaseType> {
        match code {
            0x00 => Some(&ENUM),
            0x01 => Some(&SINT8),
            0x02 => Some(&UINT8),
            0x83 => Some(&SINT16),
            0x84 => Some(&UINT16),
            0x85 => Some(&SINT32),
            0x86 => Some(&UINT32),
            0x07 => Some(&STRING),
            0x88 => Some(&FLOAT32),
            0x89 => Some(&FLOAT64),
            0x0A => Some(&UINT8Z),
            0x8B => Some(&UINT16Z),
            0x8C => Some(&UINT32Z),
            0x0D => Some(&BYTE),
            0x8E => Some(&SINT64),
            0x8F => Some(&UINT64),
            _ => None,
        }
    }
}

/// A decoded field value.
///
/// Arrays appear when a field's declared size spans more than one type
/// width; each slot may independently hold no value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    UInt(u64),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Option<Value>>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value, when it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::UInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Element `index` of an array value.
    pub fn element(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Array(slots) => slots.get(index).and_then(|s| s.as_ref()),
            _ => None,
        }
    }
}

type Result<T> = std::result::Result<T, CodecError>;

/// Read one scalar of type `ty` at `pos`.
///
/// The raw bits are fetched as an unsigned integer first; a match against
/// the type's invalid sentinel reports no value without a typed decode.
pub fn read_one(
    buf: &[u8],
    pos: usize,
    ty: &BaseType,
    big_endian: bool,
) -> Result<(Option<Value>, usize)> {
    let (raw, next) = codec::read_uint(buf, pos, ty.width, big_endian)?;
    if raw == ty.invalid {
        return Ok((None, next));
    }
    let value = if ty.float {
        let (f, _) = codec::read_float(buf, pos, ty.width, big_endian)?;
        Value::Float(f)
    } else if ty.signed {
        let (i, _) = codec::read_sint(buf, pos, ty.width, big_endian)?;
        Value::Int(i)
    } else {
        Value::UInt(raw)
    };
    Ok((Some(value), next))
}

/// Read a field of `total_size` bytes holding one or more values of `ty`.
///
/// Strings collapse to the run of non-zero bytes; multi-element byte
/// fields materialise as raw byte strings; everything else longer than one
/// width becomes an array with independently absent slots.
pub fn read_value(
    buf: &[u8],
    pos: usize,
    total_size: usize,
    ty: &BaseType,
    big_endian: bool,
) -> Result<(Option<Value>, usize)> {
    let end = pos + total_size;
    if end > buf.len() {
        return Err(CodecError::OutOfBounds {
            pos,
            len: total_size,
            cap: buf.len(),
        });
    }

    if ty.code == STRING.code {
        let run = buf[pos..end].iter().take_while(|b| **b != 0).copied();
        let bytes: Vec<u8> = run.collect();
        let value = if bytes.is_empty() {
            None
        } else {
            Some(Value::Text(String::from_utf8_lossy(&bytes).into_owned()))
        };
        return Ok((value, end));
    }

    let count = total_size / ty.width;
    if count == 0 {
        // A declared size below one type width holds no decodable value.
        return Ok((None, end));
    }
    if count == 1 {
        let (value, _) = read_one(buf, pos, ty, big_endian)?;
        return Ok((value, end));
    }

    if ty.code == BYTE.code {
        let bytes = buf[pos..end].to_vec();
        let value = if bytes.iter().all(|b| *b == 0xFF) {
            None
        } else {
            Some(Value::Bytes(bytes))
        };
        return Ok((value, end));
    }

    let mut slots = Vec::with_capacity(count);
    let mut at = pos;
    for _ in 0..count {
        let (slot, next) = read_one(buf, at, ty, big_endian)?;
        slots.push(slot);
        at = next;
    }
    let value = if slots.iter().all(Option::is_none) {
        None
    } else {
        Some(Value::Array(slots))
    };
    Ok((value, end))
}

fn write_scalar(
    buf: &mut [u8],
    pos: usize,
    value: &Value,
    ty: &BaseType,
    big_endian: bool,
) -> Result<usize> {
    if ty.float {
        let f = value.as_f64().unwrap_or(f64::NAN);
        return codec::write_float(buf, pos, f, ty.width, big_endian);
    }
    if ty.signed {
        let i = match value {
            Value::Float(f) => f.round() as i64,
            other => other.as_i64().unwrap_or(0),
        };
        return codec::write_sint(buf, pos, i, ty.width, big_endian);
    }
    let u = match value {
        Value::Float(f) => f.round() as u64,
        other => other.as_u64().unwrap_or(0),
    };
    codec::write_uint(buf, pos, u, ty.width, big_endian)
}

fn write_invalid(buf: &mut [u8], pos: usize, ty: &BaseType, big_endian: bool) -> Result<usize> {
    codec::write_uint(buf, pos, ty.invalid, ty.width, big_endian)
}

/// Write a field of `total_size` bytes from an optional value.
///
/// Missing values fill the whole field with the type's invalid sentinel.
/// Strings and byte strings are padded out to the declared size.
pub fn write_value(
    buf: &mut [u8],
    pos: usize,
    value: Option<&Value>,
    ty: &BaseType,
    total_size: usize,
    big_endian: bool,
) -> Result<usize> {
    let end = pos + total_size;
    if end > buf.len() {
        return Err(CodecError::OutOfBounds {
            pos,
            len: total_size,
            cap: buf.len(),
        });
    }

    let count = total_size / ty.width;
    match value {
        None => {
            let mut at = pos;
            for _ in 0..count {
                at = write_invalid(buf, at, ty, big_endian)?;
            }
        }

        Some(Value::Text(s)) => {
            let bytes = s.as_bytes();
            let take = bytes.len().min(total_size.saturating_sub(1));
            buf[pos..pos + take].copy_from_slice(&bytes[..take]);
            for b in &mut buf[pos + take..end] {
                *b = 0;
            }
        }

        Some(Value::Bytes(bytes)) => {
            let take = bytes.len().min(total_size);
            buf[pos..pos + take].copy_from_slice(&bytes[..take]);
            for b in &mut buf[pos + take..end] {
                *b = 0xFF;
            }
        }

        Some(Value::Array(slots)) => {
            let mut at = pos;
            for i in 0..count {
                at = match slots.get(i).and_then(|s| s.as_ref()) {
                    Some(slot) => write_scalar(buf, at, slot, ty, big_endian)?,
                    None => write_invalid(buf, at, ty, big_endian)?,
                };
            }
        }

        Some(scalar) => {
            write_scalar(buf, pos, scalar, ty, big_endian)?;
            let mut at = pos + ty.width;
            for _ in 1..count {
                at = write_invalid(buf, at, ty, big_endian)?;
            }
        }
    }
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sentinel_reads_as_none() -> Result<()> {
        let buf = [0xFFu8, 0xFF];
        assert_eq!(read_one(&buf, 0, &UINT16, false)?, (None, 2));
        // The z-variants use zero as their sentinel.
        let buf = [0x00u8, 0x00];
        assert_eq!(read_one(&buf, 0, &UINT16Z, false)?, (None, 2));
        let buf = [0x01u8, 0x00];
        assert_eq!(
            read_one(&buf, 0, &UINT16Z, false)?,
            (Some(Value::UInt(1)), 2)
        );
        Ok(())
    }

    #[test]
    fn test_signed_decode() -> Result<()> {
        let buf = [0xFEu8, 0xFF];
        assert_eq!(
            read_one(&buf, 0, &SINT16, false)?,
            (Some(Value::Int(-2)), 2)
        );
        assert_eq!(read_one(&buf, 0, &SINT8, false)?, (Some(Value::Int(-2)), 1));
        Ok(())
    }

    #[test]
    fn test_string_is_run_of_nonzero_bytes() -> Result<()> {
        let buf = *b"Test\0\0\0\0";
        assert_eq!(
            read_value(&buf, 0, 8, &STRING, false)?,
            (Some(Value::Text("Test".to_owned())), 8)
        );
        let buf = [0u8; 4];
        assert_eq!(read_value(&buf, 0, 4, &STRING, false)?, (None, 4));
        Ok(())
    }

    #[test]
    fn test_array_slots_are_independent() -> Result<()> {
        let buf = [0x0Au8, 0x00, 0xFF, 0xFF, 0x14, 0x00];
        let (value, next) = read_value(&buf, 0, 6, &UINT16, false)?;
        assert_eq!(next, 6);
        assert_eq!(
            value,
            Some(Value::Array(vec![
                Some(Value::UInt(10)),
                None,
                Some(Value::UInt(20)),
            ]))
        );
        Ok(())
    }

    #[test]
    fn test_all_invalid_array_elides() -> Result<()> {
        let buf = [0xFFu8; 6];
        assert_eq!(read_value(&buf, 0, 6, &UINT16, false)?, (None, 6));
        Ok(())
    }

    #[test]
    fn test_scalar_round_trip() -> Result<()> {
        for (ty, value) in [
            (&UINT8, Value::UInt(85)),
            (&UINT16, Value::UInt(0x1234)),
            (&UINT32, Value::UInt(1_000_000)),
            (&SINT16, Value::Int(-500)),
            (&SINT32, Value::Int(-70_000)),
            (&FLOAT32, Value::Float(2.5)),
            (&FLOAT64, Value::Float(-0.125)),
        ] {
            let mut buf = [0u8; 8];
            write_value(&mut buf, 0, Some(&value), ty, ty.width, true)?;
            let (back, _) = read_value(&buf, 0, ty.width, ty, true)?;
            assert_eq!(back, Some(value.clone()), "{}", ty.name);
        }
        Ok(())
    }

    #[test]
    fn test_missing_round_trip() -> Result<()> {
        for ty in [&UINT8, &UINT16, &SINT32, &UINT32Z, &FLOAT32] {
            let mut buf = [0u8; 8];
            write_value(&mut buf, 0, None, ty, ty.width, false)?;
            let (back, _) = read_value(&buf, 0, ty.width, ty, false)?;
            assert_eq!(back, None, "{}", ty.name);
        }
        Ok(())
    }

    #[test]
    fn test_string_write_pads_with_zeros() -> Result<()> {
        let mut buf = [0xAAu8; 8];
        write_value(
            &mut buf,
            0,
            Some(&Value::Text("Test".to_owned())),
            &STRING,
            8,
            false,
        )?;
        assert_eq!(&buf, b"Test\0\0\0\0");
        Ok(())
    }
}
