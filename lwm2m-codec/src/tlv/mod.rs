//! OMA LWM2M TLV encoding
//!
//! Every entry starts with a type byte:
//!
//! ```text
//!   7 6   5   4 3   2 1 0
//! +-----+---+-----+-------+
//! |kind |id |len  |inline |
//! +-----+---+-----+-------+
//! ```
//!
//! followed by a 1 or 2 byte identifier, an optional 1 to 3 byte length and
//! the value. Object instance and multiple resource values hold nested
//! entries.

pub mod decoder;
pub mod encoder;
pub mod types;

pub use decoder::TlvDecoder;
pub use encoder::TlvEncoder;
pub use types::{LengthEncoding, TlvEntry, TlvKind};

use bytes::Bytes;
use lwm2m_core::Lwm2mResult;

/// Decode a complete TLV payload into its top-level entries
pub fn decode(buffer: &[u8]) -> Lwm2mResult<Vec<TlvEntry>> {
    TlvDecoder::new(buffer).decode_all()
}

/// Encode entries into a TLV payload
pub fn encode(entries: &[TlvEntry]) -> Lwm2mResult<Bytes> {
    let mut encoder = TlvEncoder::new();
    encoder.encode_all(entries)?;
    Ok(encoder.finish())
}
