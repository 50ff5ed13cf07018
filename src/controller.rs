//! Shared entry point for the sessions of one front end.
//!
//! A `Controller` holds the configuration and the interrupt signal. Each
//! session asks it for its own client or watcher; they never share a
//! connection, only the signal.

use crate::config::ClientConfig;
use crate::ipc::{Interrupter, KnitClient, StatusWatcher};

#[derive(Debug, Clone)]
pub struct Controller {
    config: ClientConfig,
    interrupter: Interrupter,
}

impl Controller {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            interrupter: Interrupter::default(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Wake every watcher created by this controller. Each one sees the
    /// interrupt once, whether or not it is waiting right now.
    pub fn interrupt(&self) {
        self.interrupter.interrupt();
    }

    /// New action client; its state-changing commands wake the watchers.
    pub fn client(&self) -> KnitClient {
        KnitClient::from_config(&self.config).with_interrupter(self.interrupter.clone())
    }

    /// New status watcher with its own connection.
    pub fn watcher(&self) -> StatusWatcher {
        StatusWatcher::new(&self.config, self.interrupter.clone())
    }
}
