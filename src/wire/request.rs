//! Request head serialization.

use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderMap, Method};

/// Serialize the request line and header block, ending with the blank line.
pub fn encode_head(method: &Method, target: &str, headers: &HeaderMap) -> Bytes {
    let mut buf = BytesMut::with_capacity(64 + headers.len() * 32);

    buf.put_slice(method.as_str().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(target.as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");

    for (name, value) in headers {
        buf.put_slice(canonical_name(name.as_str()).as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"\r\n");

    buf.freeze()
}

/// `content-length` → `Content-Length`.
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}
