//! TLV decoder

use crate::tlv::types::{TlvEntry, TlvKind};
use bytes::Bytes;
use lwm2m_core::{Lwm2mError, Lwm2mResult};

/// Deepest container level: object instance -> multiple resource
const MAX_CONTAINER_DEPTH: usize = 2;

/// TLV decoder over a borrowed buffer
pub struct TlvDecoder<'a> {
    buffer: &'a [u8],
    position: usize,
    depth: usize,
}

impl<'a> TlvDecoder<'a> {
    /// Create a new decoder
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            depth: 0,
        }
    }

    fn nested(&self, buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            depth: self.depth + 1,
        }
    }

    /// Decode entries until the buffer is exhausted
    pub fn decode_all(&mut self) -> Lwm2mResult<Vec<TlvEntry>> {
        let mut entries = Vec::new();
        while self.remaining() > 0 {
            entries.push(self.decode_entry()?);
        }
        Ok(entries)
    }

    /// Decode a single entry, recursing into container values
    pub fn decode_entry(&mut self) -> Lwm2mResult<TlvEntry> {
        let type_byte = self.read_byte()?;
        let kind = TlvKind::from_type_byte(type_byte);

        let id = if type_byte & 0x20 != 0 {
            self.decode_u16()?
        } else {
            u16::from(self.read_byte()?)
        };

        let length = match (type_byte >> 3) & 0x03 {
            0 => usize::from(type_byte & 0x07),
            size => self.decode_length(usize::from(size))?,
        };

        let value = self.decode_fixed_bytes(length)?;
        if kind.is_container() && self.depth >= MAX_CONTAINER_DEPTH {
            return Err(Lwm2mError::InvalidFormat(format!(
                "TLV container {} nested too deep",
                id
            )));
        }
        let entry = match kind {
            TlvKind::ObjectInstance => TlvEntry::ObjectInstance {
                id,
                resources: self.nested(value).decode_all()?,
            },
            TlvKind::MultipleResource => TlvEntry::MultipleResource {
                id,
                instances: self.nested(value).decode_all()?,
            },
            TlvKind::ResourceInstance => TlvEntry::ResourceInstance {
                id,
                value: Bytes::copy_from_slice(value),
            },
            TlvKind::SingleResource => TlvEntry::SingleResource {
                id,
                value: Bytes::copy_from_slice(value),
            },
        };
        Ok(entry)
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.position
    }

    fn read_byte(&mut self) -> Lwm2mResult<u8> {
        Ok(self.decode_fixed_bytes(1)?[0])
    }

    fn decode_u16(&mut self) -> Lwm2mResult<u16> {
        let bytes = self.decode_fixed_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn decode_length(&mut self, size: usize) -> Lwm2mResult<usize> {
        let bytes = self.decode_fixed_bytes(size)?;
        Ok(bytes
            .iter()
            .fold(0usize, |length, byte| (length << 8) | usize::from(*byte)))
    }

    fn decode_fixed_bytes(&mut self, length: usize) -> Lwm2mResult<&'a [u8]> {
        if self.remaining() < length {
            return Err(Lwm2mError::NotEnoughData {
                needed: length,
                available: self.remaining(),
            });
        }
        let bytes = &self.buffer[self.position..self.position + length];
        self.position += length;
        Ok(bytes)
    }
}
