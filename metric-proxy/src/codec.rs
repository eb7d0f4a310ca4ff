//! Conversion between the wire payload (`base64(JSON)`) and its structured form.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::ProxyError;

/// Client libraries do not all pad their payloads.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a wire payload into `T`.
///
/// The decoded text is URI-decoded, then every single quote is replaced by a
/// double quote before parsing: the mixpanel iOS Swift 2.x library emits
/// single-quoted JSON. A property value that legitimately contains a single
/// quote is corrupted by this, or fails to parse.
///
/// URI decoding is plain percent decoding. Unlike javascript's `decodeURI`,
/// reserved escapes such as `%2F`, `%23` or `%26` are decoded too, and a
/// lone `%` is kept as is rather than failing.
pub fn decode<T: DeserializeOwned>(wire: &str) -> Result<T, ProxyError> {
    let bytes = LENIENT.decode(wire.trim())?;
    let text = String::from_utf8(bytes).map_err(|e| {
        tracing::debug!("payload is not utf-8: {}", e);
        ProxyError::InvalidEncoding(String::from("payload is not valid utf-8"))
    })?;
    let text = percent_decode_str(&text).decode_utf8().map_err(|e| {
        tracing::debug!("payload is not uri-decodable: {}", e);
        ProxyError::InvalidEncoding(String::from("payload is not valid uri encoding"))
    })?;

    Ok(serde_json::from_str(&text.replace('\'', "\""))?)
}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, ProxyError> {
    let json = serde_json::to_string(value)?;
    Ok(STANDARD.encode(json))
}
