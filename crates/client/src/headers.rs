//! Outgoing header sanitization.
//!
//! Header values travel as single-byte (Latin-1) text.  A header whose
//! name is not a valid token, or whose value holds a character outside
//! that range (a pasted token with a stray non-ASCII character, say),
//! is dropped with a warning instead of failing the whole request.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

/// Why a header was left out of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    InvalidName,
    /// A character above U+00FF.
    Unencodable,
    /// A control character other than tab.
    InvalidValue,
}

impl DropReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::InvalidName => "invalid header name",
            Self::Unencodable => "value is not single-byte encodable",
            Self::InvalidValue => "value contains control characters",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedHeader {
    pub name: String,
    pub reason: DropReason,
}

/// Result of [`sanitize_headers`].
#[derive(Debug, Clone, Default)]
pub struct SanitizedHeaders {
    pub headers: HeaderMap,
    pub dropped: Vec<DroppedHeader>,
}

/// Build a [`HeaderMap`] from `(name, value)` pairs, dropping (and
/// logging) every pair that cannot be sent.  Header values are never
/// logged.
pub fn sanitize_headers<'a, I>(pairs: I) -> SanitizedHeaders
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = SanitizedHeaders::default();

    for (name, value) in pairs {
        match encode_header(name, value) {
            Ok((header_name, header_value)) => {
                out.headers.insert(header_name, header_value);
            }
            Err(reason) => {
                tracing::warn!(header = %name, reason = reason.as_str(), "Dropping outgoing header");
                out.dropped.push(DroppedHeader {
                    name: name.to_string(),
                    reason,
                });
            }
        }
    }

    out
}

fn encode_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), DropReason> {
    let header_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|_| DropReason::InvalidName)?;
    let bytes = encode_latin1(value).ok_or(DropReason::Unencodable)?;
    let mut header_value =
        HeaderValue::from_bytes(&bytes).map_err(|_| DropReason::InvalidValue)?;
    if header_name == AUTHORIZATION {
        header_value.set_sensitive(true);
    }
    Ok((header_name, header_value))
}

/// Latin-1 encoding: one byte per char, `None` above U+00FF.
fn encode_latin1(value: &str) -> Option<Vec<u8>> {
    value
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}
