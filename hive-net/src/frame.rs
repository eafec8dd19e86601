//! # Wire Framing
//!
//! Purpose: Encode peer commands and parse responses without external
//! dependencies, keeping allocations under control.
//!
//! ## Design Principles
//! 1. **Binary-Safe**: Payloads are length-prefixed raw bytes.
//! 2. **Incremental Parsing**: The server parser consumes nothing until a
//!    complete frame is buffered.
//! 3. **Fail Fast**: Invalid framing and oversized frames error immediately.
//!
//! Requests are arrays of bulk strings (`*2\r\n$3\r\nGET\r\n...`);
//! responses are one of `+simple`, `-error`, `:integer`, or `$bulk`.

use std::io::BufRead;

use bytes::{Buf, BytesMut};

/// Upper bound on arguments per command frame.
pub const MAX_FRAME_ARGS: usize = 8;
/// Upper bound on a single bulk payload.
pub const MAX_BULK_LEN: usize = 64 * 1024 * 1024;

/// Framing failures.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The byte stream violates the framing rules.
    #[error("malformed frame")]
    Protocol,
    /// The underlying reader failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One parsed response value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+OK` style responses.
    Simple(Vec<u8>),
    /// `-ERR ...` responses.
    Error(Vec<u8>),
    /// `:123` responses.
    Integer(i64),
    /// `$...` bulk payloads, `None` for the null bulk.
    Bulk(Option<Vec<u8>>),
}

/// Incremental parser for request frames (arrays of bulk strings).
#[derive(Debug, Default)]
pub struct FrameReader;

impl FrameReader {
    pub fn new() -> Self {
        FrameReader
    }

    /// Attempts to parse one complete command from `buf`.
    ///
    /// Returns `Ok(None)` until a full frame is buffered; bytes are drained
    /// from `buf` only once a frame parses completely.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, FrameError> {
        let Some((consumed, args)) = parse_command(&buf[..])? else {
            return Ok(None);
        };
        buf.advance(consumed);
        Ok(Some(args))
    }
}

fn parse_command(data: &[u8]) -> Result<Option<(usize, Vec<Vec<u8>>)>, FrameError> {
    let mut pos = 0;
    let Some(header) = take_line(data, &mut pos)? else {
        return Ok(None);
    };
    if header.first() != Some(&b'*') {
        return Err(FrameError::Protocol);
    }
    let count = parse_len(&header[1..])?;
    if count == 0 || count > MAX_FRAME_ARGS {
        return Err(FrameError::Protocol);
    }

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let Some(line) = take_line(data, &mut pos)? else {
            return Ok(None);
        };
        if line.first() != Some(&b'$') {
            return Err(FrameError::Protocol);
        }
        let len = parse_len(&line[1..])?;
        if len > MAX_BULK_LEN {
            return Err(FrameError::Protocol);
        }
        if data.len() < pos + len + 2 {
            return Ok(None);
        }
        if &data[pos + len..pos + len + 2] != b"\r\n" {
            return Err(FrameError::Protocol);
        }
        args.push(data[pos..pos + len].to_vec());
        pos += len + 2;
    }

    Ok(Some((pos, args)))
}

/// Returns the next CRLF-terminated line starting at `*pos`, advancing
/// `*pos` past it, or `None` when the line is still incomplete.
fn take_line<'a>(data: &'a [u8], pos: &mut usize) -> Result<Option<&'a [u8]>, FrameError> {
    let rest = &data[(*pos).min(data.len())..];
    let Some(newline) = rest.iter().position(|&b| b == b'\n') else {
        return Ok(None);
    };
    if newline == 0 || rest[newline - 1] != b'\r' {
        return Err(FrameError::Protocol);
    }
    let line = &rest[..newline - 1];
    *pos += newline + 1;
    Ok(Some(line))
}

fn parse_len(data: &[u8]) -> Result<usize, FrameError> {
    if data.is_empty() {
        return Err(FrameError::Protocol);
    }
    let mut value: usize = 0;
    for &b in data {
        if !b.is_ascii_digit() {
            return Err(FrameError::Protocol);
        }
        value = value
            .saturating_mul(10)
            .saturating_add((b - b'0') as usize);
    }
    Ok(value)
}

/// Encodes a command (array of bulk strings) into the provided buffer.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    out.push(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Encodes a `+simple` response.
pub fn encode_simple(message: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 3);
    out.push(b'+');
    out.extend_from_slice(message.as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

/// Encodes a `-ERR` response.
pub fn encode_error(message: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 7);
    out.extend_from_slice(b"-ERR ");
    out.extend_from_slice(message.as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

/// Encodes a `$bulk` response.
pub fn encode_bulk(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    out.push(b'$');
    out.extend_from_slice(data.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

/// Reads one response frame from a blocking buffered reader.
///
/// `line` is a scratch buffer owned by the caller so repeated reads on one
/// connection reuse its allocation.
pub fn read_frame<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> Result<Frame, FrameError> {
    read_line(reader, line)?;
    if line.is_empty() {
        return Err(FrameError::Protocol);
    }

    match line[0] {
        b'+' => Ok(Frame::Simple(line[1..].to_vec())),
        b'-' => Ok(Frame::Error(line[1..].to_vec())),
        b':' => Ok(Frame::Integer(parse_i64(&line[1..])?)),
        b'$' => {
            if line.get(1) == Some(&b'-') {
                return Ok(Frame::Bulk(None));
            }
            let len = parse_len(&line[1..])?;
            if len > MAX_BULK_LEN {
                return Err(FrameError::Protocol);
            }
            let mut data = vec![0u8; len];
            reader.read_exact(&mut data)?;
            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf)?;
            if crlf != [b'\r', b'\n'] {
                return Err(FrameError::Protocol);
            }
            Ok(Frame::Bulk(Some(data)))
        }
        _ => Err(FrameError::Protocol),
    }
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<(), FrameError> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(FrameError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed mid-frame",
        )));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(FrameError::Protocol);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> Result<i64, FrameError> {
    let text = std::str::from_utf8(data).map_err(|_| FrameError::Protocol)?;
    text.parse().map_err(|_| FrameError::Protocol)
}
