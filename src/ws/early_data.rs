//! Early data carried in the WebSocket upgrade
//!
//! Clients may smuggle the first application bytes inside the
//! `Sec-WebSocket-Protocol` header of the upgrade request, saving a round
//! trip: the decoded bytes become the first chunk of the inbound stream
//! before any WebSocket message is observed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::error::EarlyDataError;

/// Decode the early-data header value.
///
/// The value is base64url (`-`/`_` variant); standard-alphabet input is
/// normalised and padding is stripped, so both padded and unpadded forms
/// decode. A missing or empty header contributes no bytes.
///
/// # Errors
///
/// Returns `EarlyDataError` if the value is present but not decodable.
pub fn decode_early_data(header: Option<&str>) -> Result<Option<Vec<u8>>, EarlyDataError> {
    let Some(raw) = header else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }

    let normalized: String = raw
        .chars()
        .filter(|c| *c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();

    let bytes = URL_SAFE_NO_PAD.decode(normalized.as_bytes())?;
    if bytes.is_empty() {
        Ok(None)
    } else {
        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_or_empty() {
        assert_eq!(decode_early_data(None).unwrap(), None);
        assert_eq!(decode_early_data(Some("")).unwrap(), None);
    }

    #[test]
    fn test_url_safe_no_pad() {
        let encoded = URL_SAFE_NO_PAD.encode(b"hello world");
        let decoded = decode_early_data(Some(&encoded)).unwrap();
        assert_eq!(decoded.as_deref(), Some(b"hello world".as_slice()));
    }

    #[test]
    fn test_padding_is_inferred() {
        // "ab" encodes to "YWI=" with padding
        assert_eq!(
            decode_early_data(Some("YWI=")).unwrap().as_deref(),
            Some(b"ab".as_slice())
        );
        assert_eq!(
            decode_early_data(Some("YWI")).unwrap().as_deref(),
            Some(b"ab".as_slice())
        );
    }

    #[test]
    fn test_standard_alphabet_is_normalised() {
        // 0xfb 0xef 0xbe encodes to "++++" in the standard alphabet
        let decoded = decode_early_data(Some("++++")).unwrap().unwrap();
        assert_eq!(decoded, vec![0xfb, 0xef, 0xbe]);

        let decoded = decode_early_data(Some("//79")).unwrap().unwrap();
        assert_eq!(decoded, vec![0xff, 0xfe, 0xfd]);
    }

    #[test]
    fn test_binary_round_trip() {
        let chunk: Vec<u8> = (0u8..=255).collect();
        let encoded = URL_SAFE_NO_PAD.encode(&chunk);
        assert_eq!(decode_early_data(Some(&encoded)).unwrap().unwrap(), chunk);
    }

    #[test]
    fn test_invalid_input() {
        assert!(decode_early_data(Some("not base64 at all!")).is_err());
        assert!(decode_early_data(Some("a")).is_err());
    }
}
