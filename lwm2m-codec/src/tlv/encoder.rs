//! TLV encoder

use crate::tlv::types::{LengthEncoding, TlvEntry, TlvKind};
use bytes::{BufMut, Bytes, BytesMut};
use lwm2m_core::Lwm2mResult;

/// TLV encoder writing into a growable buffer
pub struct TlvEncoder {
    buffer: BytesMut,
}

impl TlvEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Create a new encoder with initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Encode a sequence of entries
    pub fn encode_all(&mut self, entries: &[TlvEntry]) -> Lwm2mResult<()> {
        for entry in entries {
            self.encode_entry(entry)?;
        }
        Ok(())
    }

    /// Encode one entry, nested entries included
    pub fn encode_entry(&mut self, entry: &TlvEntry) -> Lwm2mResult<()> {
        match entry {
            TlvEntry::ObjectInstance { id, resources } => {
                let nested = Self::encode_nested(resources)?;
                self.encode_raw(TlvKind::ObjectInstance, *id, &nested)
            }
            TlvEntry::MultipleResource { id, instances } => {
                let nested = Self::encode_nested(instances)?;
                self.encode_raw(TlvKind::MultipleResource, *id, &nested)
            }
            TlvEntry::ResourceInstance { id, value } => {
                self.encode_raw(TlvKind::ResourceInstance, *id, value)
            }
            TlvEntry::SingleResource { id, value } => {
                self.encode_raw(TlvKind::SingleResource, *id, value)
            }
        }
    }

    /// Write a type byte, identifier, length and value
    pub fn encode_raw(&mut self, kind: TlvKind, id: u16, value: &[u8]) -> Lwm2mResult<()> {
        let length = LengthEncoding::for_length(value.len())?;
        let wide_id = id > 0xFF;

        let mut type_byte = kind.type_bits() | length.type_bits();
        if wide_id {
            type_byte |= 0x20;
        }
        self.buffer.put_u8(type_byte);

        if wide_id {
            self.buffer.put_u16(id);
        } else {
            self.buffer.put_u8(id as u8);
        }

        match length {
            LengthEncoding::Inline(_) => {}
            LengthEncoding::OneByte => self.buffer.put_u8(value.len() as u8),
            LengthEncoding::TwoBytes => self.buffer.put_u16(value.len() as u16),
            LengthEncoding::ThreeBytes => self.buffer.put_uint(value.len() as u64, 3),
        }

        self.buffer.put_slice(value);
        Ok(())
    }

    /// Get the encoded bytes
    pub fn finish(self) -> Bytes {
        self.buffer.freeze()
    }

    /// Get the length of the encoded data
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the encoder is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn encode_nested(entries: &[TlvEntry]) -> Lwm2mResult<Bytes> {
        let mut nested = TlvEncoder::new();
        nested.encode_all(entries)?;
        Ok(nested.finish())
    }
}

impl Default for TlvEncoder {
    fn default() -> Self {
        Self::new()
    }
}
