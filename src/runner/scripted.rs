use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Bridge, RawEvent};

/// Replays a fixed event sequence per URL instead of launching a browser.
#[derive(Default)]
pub struct ScriptedBridge {
    runs: Mutex<HashMap<String, Vec<RawEvent>>>,
    spawned: Mutex<Vec<String>>,
    halts: AtomicUsize,
}

impl ScriptedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run(self, url: &str, events: Vec<RawEvent>) -> Self {
        self.runs.lock().unwrap().insert(url.to_string(), events);
        self
    }

    /// URLs spawned so far, in order.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn halts(&self) -> usize {
        self.halts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Bridge for ScriptedBridge {
    async fn spawn(&self, url: &str, tx: mpsc::UnboundedSender<RawEvent>) -> Result<()> {
        self.spawned.lock().unwrap().push(url.to_string());
        let Some(events) = self.runs.lock().unwrap().remove(url) else {
            anyhow::bail!("no script for {}", url);
        };
        for event in events {
            let _ = tx.send(event);
        }
        Ok(())
    }

    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
