//! Fixed-width binary values as carried inside TLV entries

use crate::value::{ObjectLink, Valuer, Value};
use bytes::{BufMut, Bytes, BytesMut};
use lwm2m_core::{Lwm2mError, Lwm2mResult};

/// Binary value of a TLV resource or resource instance
///
/// Integers and times are signed big-endian of 1, 2, 4 or 8 bytes, floats
/// are IEEE 754 of 4 or 8 bytes, booleans are one byte and object links are
/// two big-endian `u16`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BinaryValue {
    bytes: Bytes,
}

impl BinaryValue {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Encode a typed value using the smallest width that holds it
    pub fn from_value(value: &Value) -> Self {
        let mut buffer = BytesMut::new();
        match value {
            Value::String(s) => buffer.put_slice(s.as_bytes()),
            Value::Integer(i) | Value::Time(i) => put_integer(&mut buffer, *i),
            Value::Float(f) => {
                let narrow = *f as f32;
                if f64::from(narrow) == *f || f.is_nan() {
                    buffer.put_f32(narrow);
                } else {
                    buffer.put_f64(*f);
                }
            }
            Value::Boolean(b) => buffer.put_u8(u8::from(*b)),
            Value::Opaque(bytes) => buffer.put_slice(bytes),
            Value::ObjectLink(link) => {
                buffer.put_u16(link.object_id);
                buffer.put_u16(link.instance_id);
            }
            Value::None => {}
        }
        Self {
            bytes: buffer.freeze(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

impl From<Bytes> for BinaryValue {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes)
    }
}

fn put_integer(buffer: &mut BytesMut, value: i64) {
    if let Ok(v) = i8::try_from(value) {
        buffer.put_i8(v);
    } else if let Ok(v) = i16::try_from(value) {
        buffer.put_i16(v);
    } else if let Ok(v) = i32::try_from(value) {
        buffer.put_i32(v);
    } else {
        buffer.put_i64(value);
    }
}

pub(crate) fn decode_string(bytes: &[u8]) -> Lwm2mResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Lwm2mError::InvalidValue(format!("String is not UTF-8: {}", e)))
}

pub(crate) fn decode_integer(bytes: &[u8]) -> Lwm2mResult<i64> {
    match bytes.len() {
        1 => Ok(i64::from(bytes[0] as i8)),
        2 => Ok(i64::from(i16::from_be_bytes([bytes[0], bytes[1]]))),
        4 => Ok(i64::from(i32::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        8 => Ok(i64::from_be_bytes(eight(bytes))),
        actual => Err(Lwm2mError::InvalidLength {
            expected: "integer of 1, 2, 4 or 8 bytes",
            actual,
        }),
    }
}

pub(crate) fn decode_float(bytes: &[u8]) -> Lwm2mResult<f64> {
    match bytes.len() {
        4 => Ok(f64::from(f32::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        8 => Ok(f64::from_be_bytes(eight(bytes))),
        actual => Err(Lwm2mError::InvalidLength {
            expected: "float of 4 or 8 bytes",
            actual,
        }),
    }
}

pub(crate) fn decode_time(bytes: &[u8]) -> Lwm2mResult<i64> {
    match bytes.len() {
        4 | 8 => decode_integer(bytes),
        actual => Err(Lwm2mError::InvalidLength {
            expected: "time of 4 or 8 bytes",
            actual,
        }),
    }
}

pub(crate) fn decode_object_link(bytes: &[u8]) -> Lwm2mResult<ObjectLink> {
    match bytes.len() {
        4 => Ok(ObjectLink::new(
            u16::from_be_bytes([bytes[0], bytes[1]]),
            u16::from_be_bytes([bytes[2], bytes[3]]),
        )),
        actual => Err(Lwm2mError::InvalidLength {
            expected: "object link of 4 bytes",
            actual,
        }),
    }
}

fn eight(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}

impl Valuer for BinaryValue {
    fn string_value(&self) -> Lwm2mResult<String> {
        decode_string(&self.bytes)
    }

    fn integer(&self) -> Lwm2mResult<i64> {
        decode_integer(&self.bytes)
    }

    fn float(&self) -> Lwm2mResult<f64> {
        decode_float(&self.bytes)
    }

    fn boolean(&self) -> Lwm2mResult<bool> {
        match self.bytes.len() {
            1 => Ok(self.bytes[0] != 0x00),
            actual => Err(Lwm2mError::InvalidLength {
                expected: "boolean of 1 byte",
                actual,
            }),
        }
    }

    fn opaque(&self) -> Lwm2mResult<Bytes> {
        Ok(self.bytes.clone())
    }

    fn time(&self) -> Lwm2mResult<i64> {
        decode_time(&self.bytes)
    }

    fn object_link(&self) -> Lwm2mResult<ObjectLink> {
        decode_object_link(&self.bytes)
    }

    fn raw(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(bytes: &[u8]) -> BinaryValue {
        BinaryValue::new(Bytes::copy_from_slice(bytes))
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(binary(&[0x64]).integer().unwrap(), 100);
        assert_eq!(binary(&[0xFF]).integer().unwrap(), -1);
        assert_eq!(binary(&[0x0E, 0xD8]).integer().unwrap(), 3800);
        assert_eq!(binary(&[0x51, 0x82, 0x42, 0x8F]).integer().unwrap(), 1367491215);
        assert_eq!(
            binary(&[0, 0, 0, 1, 0, 0, 0, 0]).integer().unwrap(),
            4_294_967_296
        );
    }

    #[test]
    fn test_invalid_lengths() {
        assert!(matches!(
            binary(&[0, 0, 0]).integer(),
            Err(Lwm2mError::InvalidLength { actual: 3, .. })
        ));
        assert!(matches!(
            binary(&[0, 0]).float(),
            Err(Lwm2mError::InvalidLength { actual: 2, .. })
        ));
        assert!(matches!(
            binary(&[1, 1]).boolean(),
            Err(Lwm2mError::InvalidLength { .. })
        ));
        assert!(matches!(
            binary(&[0]).time(),
            Err(Lwm2mError::InvalidLength { .. })
        ));
        assert!(matches!(
            binary(&[0, 3]).object_link(),
            Err(Lwm2mError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_boolean_non_zero_is_true() {
        assert!(binary(&[0x01]).boolean().unwrap());
        assert!(binary(&[0x7F]).boolean().unwrap());
        assert!(!binary(&[0x00]).boolean().unwrap());
    }

    #[test]
    fn test_from_value_picks_smallest_width() {
        assert_eq!(BinaryValue::from_value(&Value::Integer(5)).raw(), &[0x05]);
        assert_eq!(BinaryValue::from_value(&Value::Integer(900)).raw(), &[0x03, 0x84]);
        assert_eq!(BinaryValue::from_value(&Value::Integer(-70000)).raw().len(), 4);
        assert_eq!(BinaryValue::from_value(&Value::Integer(i64::MAX)).raw().len(), 8);
        assert_eq!(BinaryValue::from_value(&Value::Float(1.5)).raw().len(), 4);
        assert_eq!(BinaryValue::from_value(&Value::Float(23.1)).raw().len(), 8);
        assert_eq!(
            BinaryValue::from_value(&Value::ObjectLink(ObjectLink::new(0x4200, 1))).raw(),
            &[0x42, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_float_values() {
        let value = BinaryValue::from_value(&Value::Float(-12.5));
        assert_eq!(value.float().unwrap(), -12.5);
        let value = BinaryValue::from_value(&Value::Float(23.1));
        assert_eq!(value.float().unwrap(), 23.1);
    }

    #[test]
    fn test_invalid_utf8_string() {
        assert!(matches!(
            binary(&[0xC3, 0x28]).string_value(),
            Err(Lwm2mError::InvalidValue(_))
        ));
    }
}
