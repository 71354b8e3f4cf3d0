//! Multipart metadata envelope.
//!
//! Create operations POST their metadata as a `multipart/related` body
//! with a single `application/json` part.

use rand::RngCore;
use serde::Serialize;

use crate::error::ClientResult;

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// A fully assembled `multipart/related` body.
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartBody {
    /// Build a body whose single part is `metadata` serialized as JSON.
    pub fn new<T: Serialize>(metadata: &T) -> ClientResult<MultipartBody> {
        let json = serde_json::to_vec(metadata)?;
        let boundary = random_boundary();

        let mut body = Vec::with_capacity(json.len() + boundary.len() * 2 + 64);
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Type: application/json\r\n\r\n");
        body.extend_from_slice(&json);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Ok(MultipartBody { boundary, body })
    }

    /// The `Content-Type` header value announcing the boundary.
    pub fn content_type(&self) -> String {
        format!("multipart/related; boundary={}", self.boundary)
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }
}

fn random_boundary() -> String {
    let mut raw = [0u8; 15];
    rand::thread_rng().fill_bytes(&mut raw);

    let mut out = String::with_capacity(raw.len() * 2);
    for &b in &raw {
        out.push(HEX_CHARS[(b >> 4) as usize] as char);
        out.push(HEX_CHARS[(b & 0x0f) as usize] as char);
    }
    out
}
