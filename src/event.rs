use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::worker::{ControlMessage, SyncTag};

/// Agent events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// Connectivity changed; `true` means the server became reachable
  Connectivity(bool),
  /// Periodic background-sync wake
  SyncWake(SyncTag),
  /// Control message read from stdin
  Message(ControlMessage),
  /// Ctrl-C
  Shutdown,
}

/// Event handler that merges connectivity changes, a sync timer, Ctrl-C and
/// (optionally) stdin control messages into one stream
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler waking sync every `sync_interval`
  pub fn new(mut online: watch::Receiver<bool>, sync_interval: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Connectivity watcher
    let conn_tx = tx.clone();
    tokio::spawn(async move {
      while online.changed().await.is_ok() {
        let is_online = *online.borrow_and_update();
        if conn_tx.send(Event::Connectivity(is_online)).is_err() {
          break;
        }
      }
    });

    // Periodic sync wake; the first tick fires immediately and is skipped
    let tick_tx = tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(sync_interval);
      interval.tick().await;
      loop {
        interval.tick().await;
        for tag in SyncTag::ALL {
          if tick_tx.send(Event::SyncWake(tag)).is_err() {
            return;
          }
        }
      }
    });

    let signal_tx = tx.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        let _ = signal_tx.send(Event::Shutdown);
      }
    });

    Self { tx, rx }
  }

  /// Read control messages from stdin, one per line
  pub fn listen_stdin(&self) {
    let stdin_tx = self.tx.clone();
    tokio::spawn(async move {
      let mut lines = BufReader::new(tokio::io::stdin()).lines();
      loop {
        match lines.next_line().await {
          Ok(Some(line)) if line.trim().is_empty() => continue,
          Ok(Some(line)) => match ControlMessage::parse(&line) {
            Ok(message) => {
              if stdin_tx.send(Event::Message(message)).is_err() {
                break;
              }
            }
            Err(e) => warn!(error = %e, "Ignoring control message"),
          },
          Ok(None) => {
            debug!("stdin closed");
            break;
          }
          Err(e) => {
            warn!(error = %e, "Failed to read stdin");
            break;
          }
        }
      }
    });
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
