use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// A bridge event re-published for outside listeners, payload untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub name: String,
    pub args: Vec<Value>,
}

impl BusEvent {
    /// Same shape as the bridge wire format: `["name", arg0, ...]`.
    pub fn to_json_line(&self) -> String {
        let mut values = Vec::with_capacity(self.args.len() + 1);
        values.push(Value::String(self.name.clone()));
        values.extend(self.args.iter().cloned());
        Value::Array(values).to_string()
    }
}

/// Broadcasts every bridge event to all subscribers.
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, name: &str, args: &[Value]) {
        let event = BusEvent {
            name: name.to_string(),
            args: args.to_vec(),
        };
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }
}

/// Append every event from `rx` to `path` as NDJSON until the bus closes.
pub fn spawn_event_log(
    mut rx: broadcast::Receiver<BusEvent>,
    path: &Path,
) -> Result<JoinHandle<()>> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("failed to open event log {}", path.display()))?;

    Ok(tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = writeln!(file, "{}", event.to_json_line()) {
                        tracing::warn!(?e, "Event log write failed");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event log fell behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }))
}
