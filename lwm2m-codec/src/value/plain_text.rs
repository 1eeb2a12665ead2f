//! `text/plain` values

use crate::value::{ObjectLink, Valuer, Value};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use lwm2m_core::{Lwm2mError, Lwm2mResult};

/// UTF-8 text value
///
/// Numbers are decimal, booleans are `1` or `0`, opaque data is base64 and
/// object links are `object:instance`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlainTextValue {
    text: Bytes,
}

impl PlainTextValue {
    pub fn new(text: Bytes) -> Self {
        Self { text }
    }

    /// Render a typed value as text
    pub fn from_value(value: &Value) -> Self {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Integer(i) | Value::Time(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(true) => "1".to_string(),
            Value::Boolean(false) => "0".to_string(),
            Value::Opaque(bytes) => STANDARD.encode(bytes),
            Value::ObjectLink(link) => link.to_string(),
            Value::None => String::new(),
        };
        Self {
            text: Bytes::from(text),
        }
    }

    fn as_str(&self) -> Lwm2mResult<&str> {
        std::str::from_utf8(&self.text)
            .map_err(|e| Lwm2mError::InvalidValue(format!("Text is not UTF-8: {}", e)))
    }

    fn parse_number<T: std::str::FromStr>(&self, what: &str) -> Lwm2mResult<T> {
        let text = self.as_str()?.trim();
        text.parse::<T>()
            .map_err(|_| Lwm2mError::InvalidValue(format!("Not a valid {}: {:?}", what, text)))
    }
}

impl From<&str> for PlainTextValue {
    fn from(text: &str) -> Self {
        Self::new(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl Valuer for PlainTextValue {
    fn string_value(&self) -> Lwm2mResult<String> {
        Ok(self.as_str()?.to_string())
    }

    fn integer(&self) -> Lwm2mResult<i64> {
        self.parse_number("integer")
    }

    fn float(&self) -> Lwm2mResult<f64> {
        self.parse_number("float")
    }

    fn boolean(&self) -> Lwm2mResult<bool> {
        match self.as_str()?.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(Lwm2mError::InvalidValue(format!(
                "Not a valid boolean: {:?}",
                other
            ))),
        }
    }

    fn opaque(&self) -> Lwm2mResult<Bytes> {
        STANDARD
            .decode(self.as_str()?.trim())
            .map(Bytes::from)
            .map_err(|e| Lwm2mError::InvalidValue(format!("Invalid base64: {}", e)))
    }

    fn time(&self) -> Lwm2mResult<i64> {
        self.parse_number("time")
    }

    fn object_link(&self) -> Lwm2mResult<ObjectLink> {
        let text = self.as_str()?.trim();
        let invalid = || Lwm2mError::InvalidValue(format!("Not a valid object link: {:?}", text));
        let (object, instance) = text.split_once(':').ok_or_else(invalid)?;
        Ok(ObjectLink::new(
            object.parse().map_err(|_| invalid())?,
            instance.parse().map_err(|_| invalid())?,
        ))
    }

    fn raw(&self) -> &[u8] {
        &self.text
    }
}
