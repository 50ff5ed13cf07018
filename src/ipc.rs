//! Transport to the knitting-machine controller.
//!
//! The controller firmware listens on a Unix domain socket and speaks a
//! line-oriented protocol: ASCII command lines in, JSON lines out, with raw
//! binary bodies for pattern upload and download.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐          Unix Socket          ┌────────────────────┐
//! │  KnitClient      │  ◄──────────────────────────► │  knitting-machine  │
//! │  (Connection)    │   ASCII lines / JSON + bytes  │  controller        │
//! └──────────────────┘                               └────────────────────┘
//!          ▲ interrupt()
//!          │
//! ┌──────────────────┐
//! │  StatusWatcher   │  own Connection, LongPoll between statuswait calls
//! └──────────────────┘
//! ```
//!
//! - `command`: the command table (verbs, arguments, response shapes)
//! - `framing`: line and binary body encoding/decoding
//! - `connection`: lazy connect, invalidate-on-failure, last error
//! - `longpoll`: interruptible wait between status polls
//! - `client` / `watcher`: the collaborator-facing API
//!
//! # Usage
//!
//! ```ignore
//! use knitpi_link::ipc::{EditMode, KnitClient};
//!
//! let mut client = KnitClient::new("/run/knitpi.sock");
//! let status = client.get_status(0).await?;
//! client.edit_pattern(EditMode::Center).await?;
//! ```

mod client;
mod command;
mod connection;
mod error;
mod framing;
mod longpoll;
mod watcher;

pub use client::KnitClient;
pub use command::{Command, EditMode, MockEvent, RepeatMode, ResponseKind, BINDATA_TAG};
pub use connection::{Connection, Link, LinkState, Response};
pub use error::{ErrorKind, LastError, TransportError};
pub use framing::{
    parse_response, read_binary, read_line, write_command, write_command_with_body,
    BinaryHeader, MAX_BINDATA_SIZE,
};
pub use longpoll::{Interrupter, LongPoll, PollPhase, WaitOutcome, MIN_POLL_INTERVAL};
pub use watcher::StatusWatcher;
