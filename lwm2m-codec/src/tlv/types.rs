//! TLV entry types

use bytes::Bytes;
use lwm2m_core::{Lwm2mError, Lwm2mResult};

/// Largest value length representable by a 3-byte length field
pub const MAX_VALUE_LENGTH: usize = 0xFF_FFFF;

/// Entry kind carried in bits 7-6 of the type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlvKind {
    ObjectInstance = 0,
    ResourceInstance = 1,
    MultipleResource = 2,
    SingleResource = 3,
}

impl TlvKind {
    /// Get the kind from the type byte
    pub fn from_type_byte(byte: u8) -> Self {
        match byte >> 6 {
            0 => TlvKind::ObjectInstance,
            1 => TlvKind::ResourceInstance,
            2 => TlvKind::MultipleResource,
            _ => TlvKind::SingleResource,
        }
    }

    /// Bits 7-6 of the type byte for this kind
    pub fn type_bits(self) -> u8 {
        (self as u8) << 6
    }

    /// Whether entries of this kind carry nested entries
    pub fn is_container(self) -> bool {
        matches!(self, TlvKind::ObjectInstance | TlvKind::MultipleResource)
    }
}

/// Length field encoding, bits 4-3 of the type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthEncoding {
    /// Length of 0 to 7 stored in bits 2-0 of the type byte
    Inline(u8),
    /// One length byte follows the identifier
    OneByte,
    /// Two length bytes follow the identifier
    TwoBytes,
    /// Three length bytes follow the identifier
    ThreeBytes,
}

impl LengthEncoding {
    /// Pick the smallest encoding able to hold `length`
    pub fn for_length(length: usize) -> Lwm2mResult<Self> {
        match length {
            0..=7 => Ok(LengthEncoding::Inline(length as u8)),
            8..=0xFF => Ok(LengthEncoding::OneByte),
            0x100..=0xFFFF => Ok(LengthEncoding::TwoBytes),
            0x1_0000..=MAX_VALUE_LENGTH => Ok(LengthEncoding::ThreeBytes),
            _ => Err(Lwm2mError::InvalidLength {
                expected: "TLV value of at most 16777215 bytes",
                actual: length,
            }),
        }
    }

    /// Number of length bytes following the identifier
    pub fn field_size(self) -> usize {
        match self {
            LengthEncoding::Inline(_) => 0,
            LengthEncoding::OneByte => 1,
            LengthEncoding::TwoBytes => 2,
            LengthEncoding::ThreeBytes => 3,
        }
    }

    /// Bits 4-0 of the type byte for this encoding
    pub fn type_bits(self) -> u8 {
        match self {
            LengthEncoding::Inline(length) => length & 0x07,
            other => (other.field_size() as u8) << 3,
        }
    }
}

/// A decoded TLV entry
///
/// Container kinds hold their children already decoded; leaf kinds hold
/// the raw value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlvEntry {
    ObjectInstance { id: u16, resources: Vec<TlvEntry> },
    ResourceInstance { id: u16, value: Bytes },
    MultipleResource { id: u16, instances: Vec<TlvEntry> },
    SingleResource { id: u16, value: Bytes },
}

impl TlvEntry {
    pub fn kind(&self) -> TlvKind {
        match self {
            TlvEntry::ObjectInstance { .. } => TlvKind::ObjectInstance,
            TlvEntry::ResourceInstance { .. } => TlvKind::ResourceInstance,
            TlvEntry::MultipleResource { .. } => TlvKind::MultipleResource,
            TlvEntry::SingleResource { .. } => TlvKind::SingleResource,
        }
    }

    pub fn id(&self) -> u16 {
        match self {
            TlvEntry::ObjectInstance { id, .. }
            | TlvEntry::ResourceInstance { id, .. }
            | TlvEntry::MultipleResource { id, .. }
            | TlvEntry::SingleResource { id, .. } => *id,
        }
    }

    /// Nested entries of a container, empty for leaf entries
    pub fn children(&self) -> &[TlvEntry] {
        match self {
            TlvEntry::ObjectInstance { resources, .. } => resources,
            TlvEntry::MultipleResource { instances, .. } => instances,
            _ => &[],
        }
    }
}
