//! `application/octet-stream` values

use crate::value::binary::{
    decode_float, decode_integer, decode_object_link, decode_string, decode_time,
};
use crate::value::{BinaryValue, ObjectLink, Valuer, Value};
use bytes::Bytes;
use lwm2m_core::{Lwm2mError, Lwm2mResult};

/// Octet-stream value
///
/// Shares the binary layout of TLV values, except that a boolean must be
/// exactly `0x00` or `0x01`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpaqueValue {
    bytes: Bytes,
}

impl OpaqueValue {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    pub fn from_value(value: &Value) -> Self {
        Self {
            bytes: BinaryValue::from_value(value).bytes().clone(),
        }
    }
}

impl From<Bytes> for OpaqueValue {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes)
    }
}

impl Valuer for OpaqueValue {
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
        match self.bytes.as_ref() {
            [0x00] => Ok(false),
            [0x01] => Ok(true),
            [other] => Err(Lwm2mError::InvalidValue(format!(
                "Not a valid boolean: 0x{:02X}",
                other
            ))),
            bytes => Err(Lwm2mError::InvalidLength {
                expected: "boolean of 1 byte",
                actual: bytes.len(),
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

    #[test]
    fn test_opaque_boolean_is_strict() {
        assert!(OpaqueValue::new(Bytes::from_static(&[1])).boolean().unwrap());
        assert!(!OpaqueValue::new(Bytes::from_static(&[0])).boolean().unwrap());
        assert!(matches!(
            OpaqueValue::new(Bytes::from_static(&[2])).boolean(),
            Err(Lwm2mError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_opaque_numbers() {
        let value = OpaqueValue::from_value(&Value::Integer(1388));
        assert_eq!(value.raw(), &[0x05, 0x6C]);
        assert_eq!(value.integer().unwrap(), 1388);
        assert_eq!(
            OpaqueValue::from_value(&Value::Float(3.25)).float().unwrap(),
            3.25
        );
    }
}
