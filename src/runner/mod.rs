pub mod phantom;
#[cfg(test)]
pub mod scripted;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::Config;

/// Name the bridge uses for raw page output.
pub const CONSOLE_EVENT: &str = "console";

/// One message from the headless browser, as it appeared on the wire:
/// `["qunit.testDone", "adds numbers", 0, 2, 2]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub name: String,
    pub args: Vec<Value>,
}

impl RawEvent {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn console(text: impl Into<String>) -> Self {
        Self::new(CONSOLE_EVENT, vec![Value::String(text.into())])
    }

    /// Decode one stdout line. Anything that is not a JSON array headed by an
    /// event name is page output and becomes a `console` event.
    pub fn from_line(line: &str) -> Self {
        let Ok(values) = serde_json::from_str::<Vec<Value>>(line) else {
            return Self::console(line);
        };
        match values.split_first() {
            Some((Value::String(name), args)) => Self::new(name.clone(), args.to_vec()),
            _ => Self::console(line),
        }
    }
}

/// Process-level failures that end the whole series.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeFailure {
    #[error("headless browser unable to load \"{url}\" URI")]
    LoadFailed { url: String },

    #[error("headless browser timed out, possibly due to a missing QUnit start() call")]
    TimedOut,

    #[error("headless browser failed to start for \"{url}\": {reason}")]
    Unavailable { url: String, reason: String },
}

/// A process manager that runs one page in a headless browser and streams its events.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Spawn a browser for `url` and stream events until the page goes quiet,
    /// the process exits, or [`Bridge::halt`] is called.
    async fn spawn(&self, url: &str, tx: mpsc::UnboundedSender<RawEvent>) -> Result<()>;

    /// Stop the active run.
    fn halt(&self);

    /// Display name for this bridge (e.g., "PhantomJS").
    fn name(&self) -> &str;
}

/// Construct the bridge described by the configuration.
pub fn detect(config: &Config) -> Result<Arc<dyn Bridge>> {
    Ok(Arc::new(phantom::PhantomBridge::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_line_reads_event_arrays() {
        let event = RawEvent::from_line(r#"["qunit.done",1,2,3,40]"#);
        assert_eq!(event.name, "qunit.done");
        assert_eq!(event.args, vec![json!(1), json!(2), json!(3), json!(40)]);
    }

    #[test]
    fn test_from_line_treats_other_output_as_console() {
        assert_eq!(
            RawEvent::from_line("hello from the page"),
            RawEvent::console("hello from the page")
        );
        assert_eq!(RawEvent::from_line("[1, 2]"), RawEvent::console("[1, 2]"));
        assert_eq!(RawEvent::from_line("[]"), RawEvent::console("[]"));
    }

    #[test]
    fn test_failure_messages() {
        let failure = BridgeFailure::LoadFailed {
            url: "test/index.html".into(),
        };
        assert_eq!(
            failure.to_string(),
            "headless browser unable to load \"test/index.html\" URI"
        );
    }
}
