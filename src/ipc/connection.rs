//! Connection manager for the controller socket.
//!
//! A [`Connection`] starts out disconnected, connects on first use, and drops
//! its link after any failure that leaves the stream position unknown. The
//! next call reconnects from scratch. There is at most one request in flight
//! per connection: every method takes `&mut self`.
//!
//! While a request is in flight its link is held by the request, not by the
//! connection. If the request future is dropped before the reply has been
//! read (an outer `timeout`, a cancelled task), the link goes with it and the
//! connection is left disconnected. A late reply can never be read as the
//! answer to the next command.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use super::command::{Command, ResponseKind};
use super::error::{ErrorKind, LastError, TransportError};
use super::framing::{self, MAX_BINDATA_SIZE};

/// An open socket, split for buffered reading.
#[derive(Debug)]
pub struct Link {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Link {
    async fn open(path: &Path) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| TransportError::connect(path, e))?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Send a command line, followed by its body if it carries one.
    pub async fn send(&mut self, command: &Command) -> Result<(), TransportError> {
        framing::write_command(&mut self.writer, command).await?;
        Ok(())
    }

    /// Read one line, terminator stripped. `None` on orderly peer close.
    pub async fn receive_line(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(framing::read_line(&mut self.reader).await?)
    }

    /// Read one line and parse it as JSON. Peer close is a broken transport.
    pub async fn receive_parsed(&mut self) -> Result<Value, TransportError> {
        let line = self
            .receive_line()
            .await?
            .ok_or_else(TransportError::peer_closed)?;
        framing::parse_response(&line)
    }

    /// Read a binary header tagged `expected_tag` and the body it announces.
    pub async fn receive_binary(
        &mut self,
        expected_tag: &str,
        max_len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        framing::read_binary(&mut self.reader, expected_tag, max_len).await
    }

    /// One full round-trip: send `command`, then read the response shape the
    /// command table declares for it.
    async fn exchange(
        &mut self,
        command: &Command,
        max_bindata: usize,
    ) -> Result<Response, TransportError> {
        match command.body() {
            Some(body) => debug!(command = %command, body_len = body.len(), "-> controller"),
            None => debug!(command = %command, "-> controller"),
        }
        self.send(command).await?;

        let response = match command.response_kind() {
            ResponseKind::Parsed => Response::Parsed(self.receive_parsed().await?),
            ResponseKind::Binary(tag) => {
                Response::Binary(self.receive_binary(tag, max_bindata).await?)
            }
        };
        debug!(command = command.verb(), "<- controller");
        Ok(response)
    }
}

/// Transport state of a connection.
#[derive(Debug, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connected(Link),
}

/// Decoded answer to a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Parsed(Value),
    Binary(Vec<u8>),
}

impl Response {
    pub fn into_parsed(self) -> Result<Value, TransportError> {
        match self {
            Response::Parsed(value) => Ok(value),
            Response::Binary(_) => Err(TransportError::ProtocolViolation(
                "expected a JSON response, got binary data".to_string(),
            )),
        }
    }

    pub fn into_binary(self) -> Result<Vec<u8>, TransportError> {
        match self {
            Response::Binary(bytes) => Ok(bytes),
            Response::Parsed(_) => Err(TransportError::ProtocolViolation(
                "expected binary data, got a JSON response".to_string(),
            )),
        }
    }
}

/// Lazily connected, self-healing connection to the controller.
#[derive(Debug)]
pub struct Connection {
    socket_path: PathBuf,
    state: LinkState,
    last_error: Option<LastError>,
    request_timeout: Option<Duration>,
    max_bindata_bytes: usize,
}

impl Connection {
    /// Create a disconnected connection for the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            state: LinkState::Disconnected,
            last_error: None,
            request_timeout: None,
            max_bindata_bytes: MAX_BINDATA_SIZE,
        }
    }

    /// Bound every round-trip by `timeout`. Expiry breaks the transport.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Largest binary body accepted from the controller.
    pub fn with_max_bindata_bytes(mut self, max: usize) -> Self {
        self.max_bindata_bytes = max;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected(_))
    }

    /// Most recent failure, cleared by the next successful round-trip.
    pub fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    /// Connect if currently disconnected and return the live link.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectFailed` if the socket does not exist or
    /// the controller refuses the connection. The failure is also recorded
    /// as the last error.
    pub async fn ensure_connected(&mut self) -> Result<&mut Link, TransportError> {
        if let LinkState::Disconnected = self.state {
            let link = self.open_link().await?;
            self.state = LinkState::Connected(link);
        }
        if let LinkState::Connected(link) = &mut self.state {
            return Ok(link);
        }
        Err(TransportError::TransportBroken(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "controller link was not established",
        )))
    }

    /// Drop the link and record why. The next call reconnects.
    pub fn invalidate(&mut self, err: &TransportError) {
        if let LinkState::Connected(_) = std::mem::take(&mut self.state) {
            warn!(
                socket = %self.socket_path.display(),
                kind = %err.kind(),
                error = %err,
                "Dropping controller connection"
            );
        }
        self.last_error = Some(LastError::from(err));
    }

    /// Send a command and read the response shape the command table declares.
    ///
    /// # Errors
    ///
    /// Any failure is recorded as the last error. Transport failures, and any
    /// failure in the middle of a binary transfer, also drop the link.
    pub async fn execute(&mut self, command: &Command) -> Result<Response, TransportError> {
        let result = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.round_trip(command)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(command = command.verb(), ?limit, "Request timed out");
                    Err(TransportError::TransportBroken(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("no response to {} within {:?}", command.verb(), limit),
                    )))
                }
            },
            None => self.round_trip(command).await,
        };

        match result {
            Ok(response) => {
                self.last_error = None;
                Ok(response)
            }
            Err(e) => {
                if drops_link(e.kind(), command.response_kind()) {
                    self.invalidate(&e);
                } else {
                    warn!(command = command.verb(), kind = %e.kind(), error = %e, "Request failed");
                    self.last_error = Some(LastError::from(&e));
                }
                Err(e)
            }
        }
    }

    async fn round_trip(&mut self, command: &Command) -> Result<Response, TransportError> {
        let max_bindata = self.max_bindata_bytes;
        let mut link = self.checkout().await?;
        let result = link.exchange(command, max_bindata).await;
        // Reached only when the exchange ran to completion
        self.state = LinkState::Connected(link);
        result
    }

    /// Take the link out of the connection for one exchange, connecting first
    /// if needed. The connection reads as disconnected until it is put back.
    async fn checkout(&mut self) -> Result<Link, TransportError> {
        match std::mem::take(&mut self.state) {
            LinkState::Connected(link) => Ok(link),
            LinkState::Disconnected => self.open_link().await,
        }
    }

    async fn open_link(&mut self) -> Result<Link, TransportError> {
        match Link::open(&self.socket_path).await {
            Ok(link) => {
                info!(socket = %self.socket_path.display(), "Connected to controller");
                Ok(link)
            }
            Err(e) => {
                debug!(socket = %self.socket_path.display(), error = %e, "Connect failed");
                self.last_error = Some(LastError::from(&e));
                Err(e)
            }
        }
    }
}

/// Whether a failure leaves the stream in a state that cannot be reused.
fn drops_link(error: ErrorKind, response: ResponseKind) -> bool {
    match (error, response) {
        (ErrorKind::ConnectFailed, _) => true,
        (ErrorKind::TransportBroken, _) => true,
        // A whole line was consumed; the stream is still aligned.
        (ErrorKind::MalformedResponse, ResponseKind::Parsed) => false,
        (ErrorKind::ProtocolViolation, ResponseKind::Parsed) => false,
        // The body length is unknown or untrusted.
        (ErrorKind::MalformedResponse, ResponseKind::Binary(_)) => true,
        (ErrorKind::ProtocolViolation, ResponseKind::Binary(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    fn test_socket_path(test_name: &str) -> PathBuf {
        let pid = std::process::id();
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        PathBuf::from(format!(
            "/tmp/knitpi-conn-{}-{}-{}.sock",
            test_name, pid, timestamp
        ))
    }

    #[test]
    fn test_new_connection_is_disconnected() {
        let conn = Connection::new("/tmp/knitpi-never.sock");
        assert!(!conn.is_connected());
        assert!(conn.last_error().is_none());
        assert_eq!(conn.socket_path(), Path::new("/tmp/knitpi-never.sock"));
    }

    #[test]
    fn test_drops_link_policy() {
        assert!(drops_link(ErrorKind::TransportBroken, ResponseKind::Parsed));
        assert!(!drops_link(ErrorKind::MalformedResponse, ResponseKind::Parsed));
        assert!(drops_link(ErrorKind::MalformedResponse, ResponseKind::Binary("bindata")));
        assert!(drops_link(ErrorKind::ProtocolViolation, ResponseKind::Binary("bindata")));
    }

    #[tokio::test]
    async fn test_ensure_connected_missing_socket() {
        let path = test_socket_path("missing");
        let mut conn = Connection::new(&path);

        let err = conn.ensure_connected().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectFailed);
        assert_eq!(
            conn.last_error().map(|e| e.kind),
            Some(ErrorKind::ConnectFailed)
        );
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_ensure_connected_is_idempotent() {
        let path = test_socket_path("idempotent");
        let listener = UnixListener::bind(&path).expect("bind");
        let mut conn = Connection::new(&path);

        conn.ensure_connected().await.expect("first connect");
        let (_server, _) = listener.accept().await.expect("accept");
        conn.ensure_connected().await.expect("second connect");
        assert!(conn.is_connected());

        // A second connect would queue a second client on the listener
        let pending = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(pending.is_err(), "ensure_connected opened a second socket");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_abandoned_request_leaves_connection_disconnected() {
        let path = test_socket_path("abandoned");
        let listener = UnixListener::bind(&path).expect("bind");
        let mut conn = Connection::new(&path);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut reader = tokio::io::BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await.expect("read");
            tokio::time::sleep(Duration::from_millis(300)).await;
            // Late reply for the abandoned request
            let _ = reader.get_mut().write_all(b"{\"reply_to\":\"status\"}\n").await;
            line
        });

        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), conn.execute(&Command::Status)).await;
        assert!(abandoned.is_err(), "request should still be waiting for its reply");
        assert!(!conn.is_connected());
        assert_eq!(server.await.expect("server task"), "status\n");

        let _ = std::fs::remove_file(&path);
    }
}
