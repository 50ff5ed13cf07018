//! Typed client for the knitting-machine controller.
//!
//! `KnitClient` wraps one [`Connection`] and exposes one method per entry in
//! the command table. Successful state-changing commands raise the shared
//! [`Interrupter`], so a status watcher in another task polls again at once.

use std::path::PathBuf;

use serde_json::Value;

use super::command::{Command, EditMode, MockEvent, RepeatMode};
use super::connection::Connection;
use super::error::{LastError, TransportError};
use super::longpoll::Interrupter;
use crate::config::ClientConfig;

/// Request/response client for one session.
///
/// # Example
///
/// ```ignore
/// use knitpi_link::ipc::KnitClient;
///
/// let mut client = KnitClient::new("/run/knitpi.sock");
/// let status = client.get_status(0).await?;
/// client.set_row(12).await?;
/// ```
#[derive(Debug)]
pub struct KnitClient {
    conn: Connection,
    interrupter: Option<Interrupter>,
}

impl KnitClient {
    /// Create a disconnected client with default transport settings.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            conn: Connection::new(socket_path),
            interrupter: None,
        }
    }

    /// Create a disconnected client from configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        let conn = Connection::new(&config.socket_path)
            .with_request_timeout(config.request_timeout())
            .with_max_bindata_bytes(config.max_bindata_bytes);
        Self {
            conn,
            interrupter: None,
        }
    }

    /// Raise `interrupter` after every successful state-changing command.
    pub fn with_interrupter(mut self, interrupter: Interrupter) -> Self {
        self.interrupter = Some(interrupter);
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Most recent transport or protocol failure, if the last call failed.
    pub fn last_error(&self) -> Option<&LastError> {
        self.conn.last_error()
    }

    /// Fetch the machine status.
    ///
    /// With `wait_ms == 0` this is a plain `status`; otherwise the controller
    /// may hold the answer for up to `wait_ms` until something changes.
    pub async fn get_status(&mut self, wait_ms: u64) -> Result<Value, TransportError> {
        let command = if wait_ms == 0 {
            Command::Status
        } else {
            Command::StatusWait { timeout_ms: wait_ms }
        };
        self.request(command).await
    }

    pub async fn get_hardware_info(&mut self) -> Result<Value, TransportError> {
        self.request(Command::HardwareInfo).await
    }

    /// Download the current pattern as PNG.
    ///
    /// `raw` selects the one-pixel-per-stitch image instead of the rendered
    /// preview. A controller without a pattern answers with an error message,
    /// which surfaces as `ProtocolViolation`.
    pub async fn get_pattern(&mut self, raw: bool) -> Result<Vec<u8>, TransportError> {
        self.conn
            .execute(&Command::GetPattern { raw })
            .await?
            .into_binary()
    }

    /// Upload a PNG pattern placed at (`x`, `y`), optionally merged onto the
    /// current one.
    pub async fn set_pattern(
        &mut self,
        x: i32,
        y: i32,
        merge: bool,
        png: &[u8],
    ) -> Result<Value, TransportError> {
        let png = png.to_vec();
        self.request(Command::SetPattern { x, y, merge, png }).await
    }

    pub async fn edit_pattern(&mut self, mode: EditMode) -> Result<Value, TransportError> {
        self.request(Command::EditPattern(mode)).await
    }

    pub async fn set_row(&mut self, row: i32) -> Result<Value, TransportError> {
        self.request(Command::SetRow(row)).await
    }

    pub async fn set_offset(&mut self, offset: i32) -> Result<Value, TransportError> {
        self.request(Command::SetOffset(offset)).await
    }

    pub async fn set_knitting_mode(&mut self, enabled: bool) -> Result<Value, TransportError> {
        self.request(Command::SetKnitMode(enabled)).await
    }

    pub async fn set_repeat_mode(&mut self, mode: RepeatMode) -> Result<Value, TransportError> {
        self.request(Command::SetRepeatMode(mode)).await
    }

    /// Inject a simulated hardware event. Refused by controllers driving real hardware.
    pub async fn mock_hardware(
        &mut self,
        event: MockEvent,
        value: i64,
    ) -> Result<Value, TransportError> {
        self.request(Command::HardwareMock { event, value }).await
    }

    async fn request(&mut self, command: Command) -> Result<Value, TransportError> {
        let value = self.conn.execute(&command).await?.into_parsed()?;
        if command.is_mutating() {
            if let Some(interrupter) = &self.interrupter {
                interrupter.interrupt();
            }
        }
        Ok(value)
    }
}
