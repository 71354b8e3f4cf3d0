//! Unverified JWT claims decoding.
//!
//! The service's tokens are only inspected for the `sub` and `exp` claims,
//! so the signature is deliberately not checked. The payload segment is
//! base64url encoded, with or without padding.

use crate::error::{ClientError, ClientResult};

/// Decode the claims document of a JWT without verifying its signature.
pub fn decode_claims(token: &str) -> ClientResult<serde_json::Value> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_header), Some(payload)) => payload,
        _ => return Err(ClientError::Auth("malformed JWT: missing claims segment".into())),
    };

    let raw = base64url_decode(payload)
        .ok_or_else(|| ClientError::Auth("malformed JWT: claims segment is not base64url".into()))?;

    serde_json::from_slice(&raw)
        .map_err(|err| ClientError::Auth(format!("malformed JWT claims: {err}")))
}

fn b64url_val(b: u8) -> Option<u8> {
    match b {
        b'A'..=b'Z' => Some(b - b'A'),
        b'a'..=b'z' => Some(b - b'a' + 26),
        b'0'..=b'9' => Some(b - b'0' + 52),
        b'-' => Some(62),
        b'_' => Some(63),
        _ => None,
    }
}

/// Decode a base64url string. Padding is optional.
fn base64url_decode(s: &str) -> Option<Vec<u8>> {
    let bytes = s.trim_end_matches('=').as_bytes();
    if bytes.len() % 4 == 1 {
        return None;
    }
    let mut out = Vec::with_capacity(bytes.len() / 4 * 3 + 2);

    for chunk in bytes.chunks(4) {
        if chunk.len() < 2 {
            return None;
        }
        let a = b64url_val(chunk[0])? as u32;
        let b = b64url_val(chunk[1])? as u32;
        out.push(((a << 2) | (b >> 4)) as u8);

        if chunk.len() > 2 {
            let c = b64url_val(chunk[2])? as u32;
            out.push((((b & 0x0F) << 4) | (c >> 2)) as u8);

            if chunk.len() > 3 {
                let d = b64url_val(chunk[3])? as u32;
                out.push((((c & 0x03) << 6) | d) as u8);
            }
        }
    }

    Some(out)
}

#[cfg(test)]
const B64URL_CHARS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Encode bytes as unpadded base64url. Test helper for assembling tokens.
#[cfg(test)]
pub(crate) fn base64url_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = if chunk.len() > 1 { chunk[1] as u32 } else { 0 };
        let b2 = if chunk.len() > 2 { chunk[2] as u32 } else { 0 };
        let triple = (b0 << 16) | (b1 << 8) | b2;

        out.push(B64URL_CHARS[((triple >> 18) & 0x3F) as usize] as char);
        out.push(B64URL_CHARS[((triple >> 12) & 0x3F) as usize] as char);
        if chunk.len() > 1 {
            out.push(B64URL_CHARS[((triple >> 6) & 0x3F) as usize] as char);
        }
        if chunk.len() > 2 {
            out.push(B64URL_CHARS[(triple & 0x3F) as usize] as char);
        }
    }
    out
}

/// Assemble an unsigned JWT carrying the given claims. Test helper.
#[cfg(test)]
pub(crate) fn encode_unsigned_token(claims: &serde_json::Value) -> String {
    format!(
        "{}.{}.unsigned",
        base64url_encode(br#"{"alg":"none","typ":"JWT"}"#),
        base64url_encode(claims.to_string().as_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_claims_roundtrip() {
        let claims = serde_json::json!({"sub": "user-1234", "exp": 1700000000});
        let token = encode_unsigned_token(&claims);
        let decoded = decode_claims(&token).unwrap();
        assert_eq!(decoded["sub"], "user-1234");
        assert_eq!(decoded["exp"], 1700000000);
    }

    #[test]
    fn test_decode_claims_accepts_padding() {
        let claims = serde_json::json!({"sub": "x"});
        let mut token = encode_unsigned_token(&claims);
        // Re-pad the payload segment to a multiple of four.
        let parts: Vec<&str> = token.split('.').collect();
        let mut payload = parts[1].to_string();
        while payload.len() % 4 != 0 {
            payload.push('=');
        }
        token = format!("{}.{}.{}", parts[0], payload, parts[2]);
        assert_eq!(decode_claims(&token).unwrap()["sub"], "x");
    }

    #[test]
    fn test_decode_claims_missing_segment() {
        assert!(matches!(
            decode_claims("onlyonesegment"),
            Err(ClientError::Auth(_))
        ));
    }

    #[test]
    fn test_decode_claims_invalid_base64() {
        assert!(matches!(
            decode_claims("aGVhZGVy.!!!invalid!!!.sig"),
            Err(ClientError::Auth(_))
        ));
    }

    #[test]
    fn test_decode_claims_non_json_payload() {
        let token = format!("{}.{}.sig", base64url_encode(b"h"), base64url_encode(b"not json"));
        assert!(matches!(decode_claims(&token), Err(ClientError::Auth(_))));
    }

    #[test]
    fn test_base64url_rejects_stray_length() {
        assert!(base64url_decode("AAAAA").is_none());
    }
}
