//! CoAP content-format identifiers used by LWM2M

use crate::error::{Lwm2mError, Lwm2mResult};
use std::fmt;

/// Media types negotiated between server and device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    /// `text/plain`
    TextPlain,
    /// `application/link-format`
    LinkFormat,
    /// `application/octet-stream`
    OctetStream,
    /// `application/cbor`
    Cbor,
    /// `application/senml+json`
    SenmlJson,
    /// `application/vnd.oma.lwm2m+tlv`
    Tlv,
    /// `application/vnd.oma.lwm2m+json`
    Lwm2mJson,
}

impl ContentFormat {
    /// Numeric CoAP content-format code
    pub fn code(&self) -> u16 {
        match self {
            Self::TextPlain => 0,
            Self::LinkFormat => 40,
            Self::OctetStream => 42,
            Self::Cbor => 60,
            Self::SenmlJson => 110,
            Self::Tlv => 11542,
            Self::Lwm2mJson => 11543,
        }
    }

    /// Look up a content format by its CoAP code
    ///
    /// # Returns
    ///
    /// `ContentFormatNotSupported` for codes this crate does not know
    pub fn from_code(code: u16) -> Lwm2mResult<Self> {
        match code {
            0 => Ok(Self::TextPlain),
            40 => Ok(Self::LinkFormat),
            42 => Ok(Self::OctetStream),
            60 => Ok(Self::Cbor),
            110 => Ok(Self::SenmlJson),
            11542 => Ok(Self::Tlv),
            11543 => Ok(Self::Lwm2mJson),
            other => Err(Lwm2mError::ContentFormatNotSupported(other)),
        }
    }

    /// MIME name of the format
    pub fn mime(&self) -> &'static str {
        match self {
            Self::TextPlain => "text/plain",
            Self::LinkFormat => "application/link-format",
            Self::OctetStream => "application/octet-stream",
            Self::Cbor => "application/cbor",
            Self::SenmlJson => "application/senml+json",
            Self::Tlv => "application/vnd.oma.lwm2m+tlv",
            Self::Lwm2mJson => "application/vnd.oma.lwm2m+json",
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.mime(), self.code())
    }
}
