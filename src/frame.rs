// https://redis.io/docs/reference/protocol-spec

use std::io::Cursor;

use bytes::{Buf, Bytes};
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("invalid frame data type: {0}")]
    InvalidDataType(u8),
    #[error("invalid frame encoding: {0}")]
    Invalid(String),
}

/// A single RESP reply. Requests arrive as `Array`s of `Bulk`s; replies use
/// every variant. `Null` is the null bulk (`$-1`), which is distinct from a
/// zero-length `Bulk`. `NoReply` writes nothing to the wire at all.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
    NoReply,
}

impl Frame {
    /// Whether this reply would reach the client as a RESP error, i.e. its
    /// first serialized byte is `-`. Aggregators use this to pick the first
    /// failure out of a set of replies.
    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// Serializes the frame into its exact RESP1 wire form. The encoding is
    /// deterministic: the same frame always produces the same bytes.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Frame::Simple(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(b'+');
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Error(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(b'-');
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Integer(i) => {
                let digits = i.to_string();
                let mut bytes = Vec::with_capacity(1 + digits.len() + CRLF.len());
                bytes.push(b':');
                bytes.extend_from_slice(digits.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            // A zero-length bulk serializes as `$0\r\n\r\n`, not as the null
            // bulk. Clients rely on the distinction.
            Frame::Bulk(data) => {
                let digits = data.len().to_string();
                let mut bytes =
                    Vec::with_capacity(1 + digits.len() + 2 * CRLF.len() + data.len());
                bytes.push(b'$');
                bytes.extend_from_slice(digits.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Null => b"$-1\r\n".to_vec(),
            Frame::Array(items) => {
                let digits = items.len().to_string();
                let mut bytes = Vec::with_capacity(1 + digits.len() + CRLF.len());
                bytes.push(b'*');
                bytes.extend_from_slice(digits.as_bytes());
                bytes.extend_from_slice(CRLF);
                for item in items {
                    bytes.extend(item.serialize());
                }
                bytes
            }
            Frame::NoReply => Vec::new(),
        }
    }

    /// Parses one RESP1 frame out of the cursor, advancing it past the frame.
    /// Returns `Error::Incomplete` when the buffer does not yet hold a whole
    /// frame.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, Error> {
        let first_byte = get_byte(src)?;

        match first_byte {
            b'+' => {
                let line = get_line(src)?.to_vec();
                Ok(Frame::Simple(String::from_utf8_lossy(&line).into_owned()))
            }
            b'-' => {
                let line = get_line(src)?.to_vec();
                Ok(Frame::Error(String::from_utf8_lossy(&line).into_owned()))
            }
            b':' => {
                let line = get_line(src)?;
                let integer = parse_decimal(line)?;
                Ok(Frame::Integer(integer))
            }
            // $<length>\r\n<data>\r\n
            b'$' => {
                let line = get_line(src)?;
                let length = parse_decimal(line)?;

                if length == -1 {
                    return Ok(Frame::Null);
                }
                if length < 0 {
                    return Err(Error::Invalid(format!("bulk length {length}")));
                }

                let data = get_exact(src, length as usize)?;
                expect_crlf(src)?;
                Ok(Frame::Bulk(data))
            }
            // *<count>\r\n<element-1>...<element-n>
            b'*' => {
                let line = get_line(src)?;
                let count = parse_decimal(line)?;

                if count == -1 {
                    return Ok(Frame::Null);
                }
                if count < 0 {
                    return Err(Error::Invalid(format!("array length {count}")));
                }

                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    items.push(Frame::parse(src)?);
                }
                Ok(Frame::Array(items))
            }
            byte => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

// Returns the current line without its CRLF terminator and advances past it.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf = *src.get_ref();

    let newline = buf[start..]
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(Error::Incomplete)
        .map(|index| start + index)?;

    if newline == start || buf[newline - 1] != b'\r' {
        return Err(Error::Invalid("line is not CRLF terminated".to_string()));
    }

    src.set_position((newline + 1) as u64);
    Ok(&buf[start..newline - 1])
}

// Fixed-length read. Bulk payloads may contain CR and LF bytes, so they are
// never scanned for newlines.
fn get_exact(src: &mut Cursor<&[u8]>, len: usize) -> Result<Bytes, Error> {
    if src.remaining() < len {
        return Err(Error::Incomplete);
    }
    let start = src.position() as usize;
    let data = Bytes::copy_from_slice(&src.get_ref()[start..start + len]);
    src.set_position((start + len) as u64);
    Ok(data)
}

fn expect_crlf(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
    if src.remaining() < 2 {
        return Err(Error::Incomplete);
    }
    let start = src.position() as usize;
    if &src.get_ref()[start..start + 2] != CRLF {
        return Err(Error::Invalid(
            "bulk payload is not CRLF terminated".to_string(),
        ));
    }
    src.set_position((start + 2) as u64);
    Ok(())
}

fn parse_decimal(line: &[u8]) -> Result<i64, Error> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::Invalid(String::from_utf8_lossy(line).into_owned()))
}
