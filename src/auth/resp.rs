//! RESP (REdis Serialization Protocol) codec
//!
//! Only the subset needed by the credential lookup is implemented:
//!
//! ```text
//! +OK\r\n                  - Simple string
//! -ERR message\r\n         - Error
//! :1000\r\n                - Integer
//! $5\r\nhello\r\n          - Bulk string ($-1\r\n = nil)
//! *2\r\n...                - Array (*-1\r\n = nil)
//! ```
//!
//! Commands are always sent as arrays of bulk strings.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::StoreError;

/// Maximum nesting depth for arrays
const MAX_NESTING_DEPTH: usize = 32;

/// Largest bulk string accepted from the server (512 MB, the Redis limit)
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// A decoded RESP value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Option<Bytes>),
    Array(Option<Vec<RespValue>>),
}

/// Encode a command as an array of bulk strings
pub fn encode_command(buf: &mut BytesMut, args: &[&[u8]]) {
    buf.put_u8(b'*');
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");

    for arg in args {
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
}

/// Decode one value from the front of `buf`
///
/// Returns `Ok(None)` if the buffer does not yet hold a complete value, in
/// which case nothing is consumed.
pub fn decode(buf: &mut BytesMut) -> Result<Option<RespValue>, StoreError> {
    match parse(&buf[..], 0, 0)? {
        Some((value, consumed)) => {
            buf.advance(consumed);
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn parse(src: &[u8], pos: usize, depth: usize) -> Result<Option<(RespValue, usize)>, StoreError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(StoreError::Protocol("reply nested too deeply".into()));
    }

    let Some((line, next)) = read_line(src, pos) else {
        return Ok(None);
    };
    if line.is_empty() {
        return Err(StoreError::Protocol("empty reply line".into()));
    }

    let body = &line[1..];
    match line[0] {
        b'+' => Ok(Some((RespValue::SimpleString(to_string(body)?), next))),
        b'-' => Ok(Some((RespValue::Error(to_string(body)?), next))),
        b':' => Ok(Some((RespValue::Integer(to_int(body)?), next))),
        b'$' => {
            let len = to_int(body)?;
            if len < 0 {
                return Ok(Some((RespValue::BulkString(None), next)));
            }
            let len = len as usize;
            if len > MAX_BULK_LEN {
                return Err(StoreError::Protocol(format!("bulk string too large: {}", len)));
            }
            let end = next + len;
            if src.len() < end + 2 {
                return Ok(None);
            }
            if &src[end..end + 2] != b"\r\n" {
                return Err(StoreError::Protocol("bulk string not terminated".into()));
            }
            let data = Bytes::copy_from_slice(&src[next..end]);
            Ok(Some((RespValue::BulkString(Some(data)), end + 2)))
        }
        b'*' => {
            let count = to_int(body)?;
            if count < 0 {
                return Ok(Some((RespValue::Array(None), next)));
            }
            let mut items = Vec::with_capacity((count as usize).min(64));
            let mut cursor = next;
            for _ in 0..count {
                match parse(src, cursor, depth + 1)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((RespValue::Array(Some(items)), cursor)))
        }
        other => Err(StoreError::Protocol(format!(
            "unknown reply type byte: 0x{:02x}",
            other
        ))),
    }
}

/// Find the line starting at `pos`; returns it without CRLF and the position after CRLF
fn read_line(src: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = src.get(pos..)?;
    let idx = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..idx], pos + idx + 2))
}

fn to_string(body: &[u8]) -> Result<String, StoreError> {
    String::from_utf8(body.to_vec()).map_err(|_| StoreError::Protocol("invalid UTF-8 in reply".into()))
}

fn to_int(body: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::Protocol("invalid integer in reply".into()))
}
