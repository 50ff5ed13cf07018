//! knitpi link library
//!
//! Command/response transport for the knitting-machine controller socket:
//!
//! - `ipc` - connection manager, framing codec, long-poll coordinator, client API
//! - `config` - socket path resolution and transport settings
//! - `controller` - shared interrupt signal and per-session client factory
//! - `models` - typed views of controller responses
//!
//! # Example
//!
//! ```ignore
//! use knitpi_link::{config::ClientConfig, controller::Controller};
//!
//! let controller = Controller::new(ClientConfig::default());
//! let mut watcher = controller.watcher();
//! let mut actions = controller.client();
//!
//! tokio::spawn(async move {
//!     loop {
//!         match watcher.next_status().await {
//!             Ok(status) => println!("{}", status),
//!             Err(e) => eprintln!("{}", e),
//!         }
//!     }
//! });
//!
//! // Wakes the watcher so the new row shows up immediately
//! actions.set_row(12).await?;
//! ```

pub mod config;
pub mod controller;
pub mod ipc;
pub mod models;
