//! Scalar value representations
//!
//! A resource value travels in one of three representations: the binary
//! form used inside TLV entries, UTF-8 text for `text/plain`, and the
//! `application/octet-stream` form. All of them expose the same [`Valuer`]
//! capability set so the node model does not care which one it holds.

pub mod binary;
pub mod opaque;
pub mod plain_text;

pub use binary::BinaryValue;
pub use opaque::OpaqueValue;
pub use plain_text::PlainTextValue;

use bytes::Bytes;
use lwm2m_core::Lwm2mResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared data type of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    String,
    Integer,
    Float,
    Boolean,
    Opaque,
    Time,
    ObjectLink,
    /// Executable resources and anything without a value
    None,
}

/// Object link value, `object:instance` in text form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectLink {
    pub object_id: u16,
    pub instance_id: u16,
}

impl ObjectLink {
    pub fn new(object_id: u16, instance_id: u16) -> Self {
        Self {
            object_id,
            instance_id,
        }
    }
}

impl fmt::Display for ObjectLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_id, self.instance_id)
    }
}

/// A typed resource value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Opaque(Bytes),
    /// Seconds since the Unix epoch
    Time(i64),
    ObjectLink(ObjectLink),
    None,
}

impl Value {
    /// The resource type this value naturally belongs to
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Value::String(_) => ResourceType::String,
            Value::Integer(_) => ResourceType::Integer,
            Value::Float(_) => ResourceType::Float,
            Value::Boolean(_) => ResourceType::Boolean,
            Value::Opaque(_) => ResourceType::Opaque,
            Value::Time(_) => ResourceType::Time,
            Value::ObjectLink(_) => ResourceType::ObjectLink,
            Value::None => ResourceType::None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Opaque(value)
    }
}

impl From<ObjectLink> for Value {
    fn from(value: ObjectLink) -> Self {
        Value::ObjectLink(value)
    }
}

/// Read access to a resource value in some wire representation
pub trait Valuer {
    fn string_value(&self) -> Lwm2mResult<String>;

    fn integer(&self) -> Lwm2mResult<i64>;

    fn float(&self) -> Lwm2mResult<f64>;

    fn boolean(&self) -> Lwm2mResult<bool>;

    fn opaque(&self) -> Lwm2mResult<Bytes>;

    fn time(&self) -> Lwm2mResult<i64>;

    fn object_link(&self) -> Lwm2mResult<ObjectLink>;

    /// The bytes exactly as carried on the wire
    fn raw(&self) -> &[u8];

    /// Interpret the value according to a declared resource type
    ///
    /// `ResourceType::None` yields the raw bytes as [`Value::Opaque`] when
    /// there are any, so values of unknown resources are not lost.
    fn typed(&self, resource_type: ResourceType) -> Lwm2mResult<Value> {
        Ok(match resource_type {
            ResourceType::String => Value::String(self.string_value()?),
            ResourceType::Integer => Value::Integer(self.integer()?),
            ResourceType::Float => Value::Float(self.float()?),
            ResourceType::Boolean => Value::Boolean(self.boolean()?),
            ResourceType::Opaque => Value::Opaque(self.opaque()?),
            ResourceType::Time => Value::Time(self.time()?),
            ResourceType::ObjectLink => Value::ObjectLink(self.object_link()?),
            ResourceType::None if self.raw().is_empty() => Value::None,
            ResourceType::None => Value::Opaque(Bytes::copy_from_slice(self.raw())),
        })
    }
}

/// A value in whichever representation it was received or built in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedValue {
    Binary(BinaryValue),
    PlainText(PlainTextValue),
    Opaque(OpaqueValue),
}

impl EncodedValue {
    fn inner(&self) -> &dyn Valuer {
        match self {
            EncodedValue::Binary(value) => value,
            EncodedValue::PlainText(value) => value,
            EncodedValue::Opaque(value) => value,
        }
    }

    /// Convert to the binary TLV representation
    ///
    /// Binary values pass through untouched; other representations are
    /// interpreted with `resource_type` and re-encoded.
    pub fn to_binary(&self, resource_type: ResourceType) -> Lwm2mResult<BinaryValue> {
        match self {
            EncodedValue::Binary(value) => Ok(value.clone()),
            other => Ok(BinaryValue::from_value(&other.typed(resource_type)?)),
        }
    }

    /// Convert to the plain-text representation
    pub fn to_plain_text(&self, resource_type: ResourceType) -> Lwm2mResult<PlainTextValue> {
        match self {
            EncodedValue::PlainText(value) => Ok(value.clone()),
            other => Ok(PlainTextValue::from_value(&other.typed(resource_type)?)),
        }
    }

    /// Convert to the octet-stream representation
    pub fn to_opaque(&self, resource_type: ResourceType) -> Lwm2mResult<OpaqueValue> {
        match self {
            EncodedValue::Opaque(value) => Ok(value.clone()),
            other => Ok(OpaqueValue::from_value(&other.typed(resource_type)?)),
        }
    }
}

impl From<BinaryValue> for EncodedValue {
    fn from(value: BinaryValue) -> Self {
        EncodedValue::Binary(value)
    }
}

impl From<PlainTextValue> for EncodedValue {
    fn from(value: PlainTextValue) -> Self {
        EncodedValue::PlainText(value)
    }
}

impl From<OpaqueValue> for EncodedValue {
    fn from(value: OpaqueValue) -> Self {
        EncodedValue::Opaque(value)
    }
}

impl Valuer for EncodedValue {
    fn string_value(&self) -> Lwm2mResult<String> {
        self.inner().string_value()
    }

    fn integer(&self) -> Lwm2mResult<i64> {
        self.inner().integer()
    }

    fn float(&self) -> Lwm2mResult<f64> {
        self.inner().float()
    }

    fn boolean(&self) -> Lwm2mResult<bool> {
        self.inner().boolean()
    }

    fn opaque(&self) -> Lwm2mResult<Bytes> {
        self.inner().opaque()
    }

    fn time(&self) -> Lwm2mResult<i64> {
        self.inner().time()
    }

    fn object_link(&self) -> Lwm2mResult<ObjectLink> {
        self.inner().object_link()
    }

    fn raw(&self) -> &[u8] {
        self.inner().raw()
    }
}
