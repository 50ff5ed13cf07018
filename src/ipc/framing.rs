//! Line framing for the controller socket protocol.
//!
//! Requests are single ASCII lines; a command that carries a body appends the
//! body length as its last argument and the raw bytes follow the newline.
//! Responses are JSON lines; a binary response is a JSON header line followed
//! by exactly the announced number of raw bytes.
//!
//! # Wire Format
//!
//! ```text
//! client:  setpattern 10 20 False 6\n foobar
//! server:  {"msg_type": "ok", "message": "New pattern set."}\n
//!
//! client:  getpattern True\n
//! server:  {"msg_type": "bindata", "length_bytes": 4}\n \x89PNG
//! ```
//!
//! [`read_line`] strips the line terminator (`\n`, or `\r\n`) before
//! returning. Binary bodies are never line framed and may contain any byte.

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::command::Command;
use super::error::TransportError;

/// Default ceiling for a single binary body (16 MiB).
pub const MAX_BINDATA_SIZE: usize = 16 * 1024 * 1024;

/// Write a command line, and its body if it carries one, then flush.
///
/// # Errors
///
/// Returns the underlying I/O error if the write or flush fails.
pub async fn write_command<W>(writer: &mut W, command: &Command) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = command.to_line();
    if let Some(body) = command.body() {
        return write_command_with_body(writer, &line, body).await;
    }
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Write a command line whose last argument announces `body.len()`, then the
/// raw body, then flush.
pub async fn write_command_with_body<W>(
    writer: &mut W,
    line: &str,
    body: &[u8],
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.write_all(body).await?;
    writer.flush().await
}

/// Read one response line with its terminator stripped.
///
/// Returns `Ok(None)` when the peer closed the stream before sending
/// anything. A line cut off by EOF is reported as `UnexpectedEof`.
pub async fn read_line<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let bytes_read = reader.read_until(b'\n', &mut line).await?;

    if bytes_read == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("connection closed after partial line of {} bytes", line.len()),
        ));
    }

    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Parse a response line as JSON.
///
/// # Errors
///
/// Returns `TransportError::MalformedResponse` for anything that is not a
/// single valid JSON value, including an empty line.
pub fn parse_response(line: &[u8]) -> Result<Value, TransportError> {
    serde_json::from_slice(line).map_err(|e| TransportError::malformed(line, e))
}

/// Header preceding a binary body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BinaryHeader {
    pub msg_type: String,
    #[serde(alias = "bindata_length")]
    pub length_bytes: usize,
}

impl BinaryHeader {
    /// Validate a parsed response as a binary header.
    ///
    /// The discriminator must equal `expected_tag`. An error response from the
    /// controller (`{"msg_type": "error", "message": ...}`) is a violation too,
    /// and its message is carried into the error text.
    pub fn from_response(
        value: &Value,
        expected_tag: &str,
        max_len: usize,
    ) -> Result<Self, TransportError> {
        let msg_type = value.get("msg_type").and_then(Value::as_str);
        if msg_type != Some(expected_tag) {
            let detail = value
                .get("message")
                .or_else(|| value.get("error_msg"))
                .and_then(Value::as_str)
                .map(|m| format!(": {}", m))
                .unwrap_or_default();
            return Err(TransportError::ProtocolViolation(format!(
                "expected {:?} header, got msg_type {:?}{}",
                expected_tag,
                msg_type.unwrap_or("<missing>"),
                detail
            )));
        }

        let header = BinaryHeader::deserialize(value).map_err(|e| {
            TransportError::ProtocolViolation(format!("invalid binary header: {}", e))
        })?;

        if header.length_bytes > max_len {
            return Err(TransportError::ProtocolViolation(format!(
                "binary body of {} bytes exceeds maximum {} bytes",
                header.length_bytes, max_len
            )));
        }

        Ok(header)
    }
}

/// Read a binary header line and exactly the body it announces.
///
/// # Errors
///
/// - `TransportBroken` if the stream closes or fails before the body is complete
/// - `MalformedResponse` if the header line is not JSON
/// - `ProtocolViolation` if the header tag or length is wrong
pub async fn read_binary<R>(
    reader: &mut R,
    expected_tag: &str,
    max_len: usize,
) -> Result<Vec<u8>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader)
        .await?
        .ok_or_else(TransportError::peer_closed)?;
    let value = parse_response(&line)?;
    let header = BinaryHeader::from_response(&value, expected_tag, max_len)?;

    let mut body = vec![0u8; header.length_bytes];
    reader.read_exact(&mut body).await?;
    Ok(body)
}
