//! Shared helpers for the client's unit tests.

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use crate::events::ClientEvent;
use crate::logger::{error_chain, Logger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    Info,
    Severe,
    Exception,
}

/// Logger that keeps every report for later assertions.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingLogger {
    entries: Arc<Mutex<Vec<(Level, String)>>>,
}

impl RecordingLogger {
    fn with_level(&self, level: Level) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub(crate) fn infos(&self) -> Vec<String> {
        self.with_level(Level::Info)
    }

    pub(crate) fn severes(&self) -> Vec<String> {
        self.with_level(Level::Severe)
    }

    pub(crate) fn exceptions(&self) -> Vec<String> {
        self.with_level(Level::Exception)
    }
}

impl Logger for RecordingLogger {
    fn info(&self, msg: &str) {
        self.entries.lock().unwrap().push((Level::Info, msg.to_string()));
    }

    fn severe(&self, msg: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((Level::Severe, msg.to_string()));
    }

    fn exception(&self, err: &(dyn Error + 'static)) {
        self.entries
            .lock()
            .unwrap()
            .push((Level::Exception, error_chain(err)));
    }
}

/// Next event, failing the test if none shows up within five seconds.
pub(crate) async fn recv_event(rx: &mut UnboundedReceiver<ClientEvent>) -> ClientEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timed out waiting for event")
        .expect("Event channel closed")
}
