use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error as ThisError;
use tokio_util::codec::Decoder;

use crate::frame::Frame;

// Upper bounds accepted on the wire. A count or length past these is
// malformed input, not a reason to allocate unbounded memory.
const MAX_ARGS: i64 = 1024 * 1024;
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// A recoverable wire-protocol error. The connection answers it with an error
/// reply and keeps going; the codec has already arranged to resynchronize on
/// the next plausible frame start.
#[derive(Debug, ThisError, PartialEq)]
#[error("ERR Protocol error: '{snippet}'")]
pub struct ProtocolError {
    pub snippet: String,
}

impl ProtocolError {
    fn new(offending: &[u8]) -> ProtocolError {
        ProtocolError {
            snippet: String::from_utf8_lossy(offending).into_owned(),
        }
    }
}

/// One emission of the request parser: either a complete decoded frame or a
/// protocol error. IO errors are not represented here, they terminate the
/// stream through the `Decoder::Error` channel instead.
#[derive(Debug, PartialEq)]
pub enum Payload {
    Frame(Frame),
    Error(ProtocolError),
}

/// Incremental RESP request decoder.
///
/// The state machine survives across `decode` calls, so a frame may arrive in
/// arbitrarily small chunks. Bulk payloads are consumed by exact length and
/// may contain any byte value, including CR and LF. Malformed input emits a
/// `Payload::Error` and flips the codec into resync mode, where bytes are
/// discarded until the next `* $ + - :` byte.
#[derive(Debug, Default)]
pub struct FrameCodec {
    reading_multi_line: bool,
    expected_args: usize,
    msg_type: u8,
    args: Vec<Bytes>,
    // None while a `$<len>` header line is expected, Some(len) once the
    // header has been read and `len + 2` payload bytes are owed.
    bulk_len: Option<usize>,
    resyncing: bool,
}

impl FrameCodec {
    pub fn new() -> FrameCodec {
        FrameCodec::default()
    }

    fn reset(&mut self) {
        self.reading_multi_line = false;
        self.expected_args = 0;
        self.msg_type = 0;
        self.args = Vec::new();
        self.bulk_len = None;
    }

    fn protocol_error(&mut self, offending: &[u8]) -> Payload {
        self.reset();
        self.resyncing = true;
        Payload::Error(ProtocolError::new(offending))
    }

    // Reads one CRLF-terminated line off the buffer, excluding the
    // terminator. Ok(None) means the line has not fully arrived yet.
    fn take_line(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Payload> {
        let Some(newline) = src.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line = src.split_to(newline + 1).freeze();
        if line.len() < 2 || line[line.len() - 2] != b'\r' {
            let offending = line.slice(..line.len() - 1);
            return Err(self.protocol_error(&offending));
        }
        Ok(Some(line.slice(..line.len() - 2)))
    }

    // Handles a line received outside multi-line mode: a request header or a
    // complete single-line frame.
    fn decode_header(&mut self, line: Bytes) -> Option<Payload> {
        let Some(&first) = line.first() else {
            return Some(self.protocol_error(&line));
        };

        match first {
            b'*' => match parse_decimal(&line[1..]) {
                Some(0) => Some(Payload::Frame(Frame::Array(vec![]))),
                Some(count) if count > 0 && count <= MAX_ARGS => {
                    self.msg_type = b'*';
                    self.reading_multi_line = true;
                    self.expected_args = count as usize;
                    self.args = Vec::with_capacity(count as usize);
                    self.bulk_len = None;
                    None
                }
                _ => Some(self.protocol_error(&line)),
            },
            b'$' => match parse_decimal(&line[1..]) {
                Some(-1) => Some(Payload::Frame(Frame::Null)),
                Some(len) if (0..=MAX_BULK_LEN).contains(&len) => {
                    self.msg_type = b'$';
                    self.reading_multi_line = true;
                    self.expected_args = 1;
                    self.bulk_len = Some(len as usize);
                    None
                }
                _ => Some(self.protocol_error(&line)),
            },
            b'+' => Some(Payload::Frame(Frame::Simple(
                String::from_utf8_lossy(&line[1..]).into_owned(),
            ))),
            b'-' => Some(Payload::Frame(Frame::Error(
                String::from_utf8_lossy(&line[1..]).into_owned(),
            ))),
            b':' => match parse_decimal(&line[1..]) {
                Some(value) => Some(Payload::Frame(Frame::Integer(value))),
                None => Some(self.protocol_error(&line)),
            },
            _ => Some(self.protocol_error(&line)),
        }
    }

    // A `$<len>` header line inside an array body. A null or zero length
    // forwards as an empty argument with no payload bytes owed.
    fn decode_bulk_header(&mut self, line: Bytes) -> Option<Payload> {
        if line.first() != Some(&b'$') {
            return Some(self.protocol_error(&line));
        }
        match parse_decimal(&line[1..]) {
            Some(-1) => {
                self.args.push(Bytes::new());
                None
            }
            Some(len) if (0..=MAX_BULK_LEN).contains(&len) => {
                self.bulk_len = Some(len as usize);
                None
            }
            _ => Some(self.protocol_error(&line)),
        }
    }

    fn finish(&mut self) -> Payload {
        let args = std::mem::take(&mut self.args);
        let frame = if self.msg_type == b'*' {
            Frame::Array(args.into_iter().map(Frame::Bulk).collect())
        } else {
            Frame::Bulk(args.into_iter().next().unwrap_or_default())
        };
        self.reset();
        Payload::Frame(frame)
    }
}

impl Decoder for FrameCodec {
    type Item = Payload;
    type Error = crate::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Payload>, Self::Error> {
        loop {
            if self.resyncing {
                match src.iter().position(|&b| is_frame_start(b)) {
                    Some(position) => {
                        src.advance(position);
                        self.resyncing = false;
                    }
                    None => {
                        src.clear();
                        return Ok(None);
                    }
                }
            }

            if !self.reading_multi_line {
                let line = match self.take_line(src) {
                    Ok(Some(line)) => line,
                    Ok(None) => return Ok(None),
                    Err(error) => return Ok(Some(error)),
                };
                if let Some(payload) = self.decode_header(line) {
                    return Ok(Some(payload));
                }
                continue;
            }

            match self.bulk_len {
                None => {
                    let line = match self.take_line(src) {
                        Ok(Some(line)) => line,
                        Ok(None) => return Ok(None),
                        Err(error) => return Ok(Some(error)),
                    };
                    if let Some(payload) = self.decode_bulk_header(line) {
                        return Ok(Some(payload));
                    }
                }
                Some(len) => {
                    if src.len() < len + 2 {
                        src.reserve(len + 2 - src.len());
                        return Ok(None);
                    }
                    let mut payload = src.split_to(len + 2);
                    if &payload[len..] != b"\r\n" {
                        let offending = payload.split_to(len).freeze();
                        return Ok(Some(self.protocol_error(&offending)));
                    }
                    payload.truncate(len);
                    self.args.push(payload.freeze());
                    self.bulk_len = None;
                }
            }

            if self.args.len() == self.expected_args {
                return Ok(Some(self.finish()));
            }
        }
    }
}

fn is_frame_start(byte: u8) -> bool {
    matches!(byte, b'*' | b'$' | b'+' | b'-' | b':')
}

fn parse_decimal(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse::<i64>().ok()
}
