//! Minimal HPACK (RFC 7541) encoder.
//!
//! Every field is written as a "literal header field without indexing". The
//! encoder keeps no dynamic table, so every block decodes on its own.

use bytes::{BufMut, Bytes, BytesMut};

/// Names of the RFC 7541 Appendix A static table, 1-indexed by position.
const STATIC_NAMES: [&str; 61] = [
    ":authority",
    ":method",
    ":method",
    ":path",
    ":path",
    ":scheme",
    ":scheme",
    ":status",
    ":status",
    ":status",
    ":status",
    ":status",
    ":status",
    ":status",
    "accept-charset",
    "accept-encoding",
    "accept-language",
    "accept-ranges",
    "accept",
    "access-control-allow-origin",
    "age",
    "allow",
    "authorization",
    "cache-control",
    "content-disposition",
    "content-encoding",
    "content-language",
    "content-length",
    "content-location",
    "content-range",
    "content-type",
    "cookie",
    "date",
    "etag",
    "expect",
    "expires",
    "from",
    "host",
    "if-match",
    "if-modified-since",
    "if-none-match",
    "if-range",
    "if-unmodified-since",
    "last-modified",
    "link",
    "location",
    "max-forwards",
    "proxy-authenticate",
    "proxy-authorization",
    "range",
    "referer",
    "refresh",
    "retry-after",
    "server",
    "set-cookie",
    "strict-transport-security",
    "transfer-encoding",
    "user-agent",
    "vary",
    "via",
    "www-authenticate",
];

/// Literal Header Field without Indexing: `0000` pattern, 4-bit name index.
const LITERAL_WITHOUT_INDEXING: u8 = 0x00;

#[derive(Debug, Default, Clone)]
pub struct HeaderBlockEncoder {
    buf: BytesMut,
}

impl HeaderBlockEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one field to the block under construction.
    pub fn field(&mut self, name: &str, value: &str) -> &mut Self {
        match static_name_index(name) {
            Some(index) => encode_integer(&mut self.buf, LITERAL_WITHOUT_INDEXING, 4, index),
            None => {
                encode_integer(&mut self.buf, LITERAL_WITHOUT_INDEXING, 4, 0);
                encode_string(&mut self.buf, name.as_bytes());
            }
        }
        encode_string(&mut self.buf, value.as_bytes());
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Hands out the finished block and leaves the encoder empty for the next one.
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn encode<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Bytes {
        let mut encoder = Self::new();
        for (name, value) in fields {
            encoder.field(name, value);
        }
        encoder.finish()
    }
}

fn static_name_index(name: &str) -> Option<usize> {
    STATIC_NAMES.iter().position(|n| *n == name).map(|i| i + 1)
}

/// RFC 7541 §5.1 prefixed integer. `first` carries the representation bits
/// above the prefix.
fn encode_integer(out: &mut BytesMut, first: u8, prefix_bits: u8, mut value: usize) {
    let prefix_max = (1usize << prefix_bits) - 1;
    if value < prefix_max {
        out.put_u8(first | value as u8);
        return;
    }

    out.put_u8(first | prefix_max as u8);
    value -= prefix_max;
    while value >= 128 {
        out.put_u8((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    out.put_u8(value as u8);
}

/// RFC 7541 §5.2 string literal, never Huffman-coded.
fn encode_string(out: &mut BytesMut, bytes: &[u8]) {
    encode_integer(out, 0x00, 7, bytes.len());
    out.put_slice(bytes);
}
