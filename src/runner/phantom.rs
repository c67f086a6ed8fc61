use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

use super::{Bridge, RawEvent};

/// Guard that kills the browser process (and its entire process group) on drop.
struct ChildGuard {
    child: Option<tokio::process::Child>,
    /// Process group ID saved at spawn time so we can kill the whole group.
    #[cfg(unix)]
    pgid: Option<u32>,
}

impl ChildGuard {
    fn new(child: tokio::process::Child) -> Self {
        #[cfg(unix)]
        let pgid = child.id();
        Self {
            child: Some(child),
            #[cfg(unix)]
            pgid,
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        // Browsers fork helper processes; take the whole group down with the parent.
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
        }
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
    }
}

const MAIN_SOURCE: &str = include_str!("../../bridge/phantom-main.js");
const BRIDGE_SOURCE: &str = include_str!("../../bridge/qunit-bridge.js");

const TIMEOUT_EVENT: &str = "fail.timeout";

/// PhantomJS-style bridge: runs `<browser> <main.js> <inject.js> <url>` and reads
/// one JSON event array per stdout line.
pub struct PhantomBridge {
    program: String,
    browser_args: Vec<String>,
    inject: Option<PathBuf>,
    timeout: Duration,
    /// Signals the active run to stop streaming.
    halt_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl PhantomBridge {
    pub fn new(config: &Config) -> Result<Self> {
        let mut words = shell_words::split(&config.browser)
            .with_context(|| format!("invalid browser command '{}'", config.browser))?;
        if words.is_empty() {
            anyhow::bail!("browser command is empty");
        }
        let program = words.remove(0);

        Ok(Self {
            program,
            browser_args: words,
            inject: config.inject.clone(),
            timeout: Duration::from_millis(config.timeout),
            halt_tx: Arc::new(Mutex::new(None)),
        })
    }

    /// Write an embedded script to a temp file and return it.
    fn write_asset(prefix: &str, source: &str) -> Result<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".js")
            .tempfile()
            .context("failed to create temp script file")?;

        use std::io::Write;
        file.write_all(source.as_bytes())
            .context("failed to write script to temp file")?;

        Ok(file)
    }

    async fn spawn_and_stream(&self, url: &str, tx: mpsc::UnboundedSender<RawEvent>) -> Result<()> {
        let main_file = Self::write_asset("blanket-qunit-main-", MAIN_SOURCE)?;
        let bridge_file = match self.inject {
            Some(_) => None,
            None => Some(Self::write_asset("blanket-qunit-bridge-", BRIDGE_SOURCE)?),
        };
        let inject_path = match (&self.inject, &bridge_file) {
            (Some(path), _) => path.clone(),
            (None, Some(file)) => file.path().to_path_buf(),
            (None, None) => anyhow::bail!("no bridge script to inject"),
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.browser_args)
            .arg(main_file.path())
            .arg(&inject_path)
            .arg(url);

        tracing::debug!(command = ?cmd.as_std(), "Spawning headless browser");

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.as_std_mut().process_group(0);
        }

        let mut child = cmd
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;

        let stdout = child.stdout.take().context("missing stdout")?;
        let stderr = child.stderr.take().context("missing stderr")?;

        let (halt_tx, mut halt_rx) = oneshot::channel();
        if let Ok(mut slot) = self.halt_tx.lock() {
            *slot = Some(halt_tx);
        }

        // The child stays in the guard so it is killed even if this future is dropped.
        let mut child_guard = ChildGuard::new(child);

        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "browser", "{}", line);
            }
        });

        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        let mut halted = false;

        loop {
            buf.clear();
            tokio::select! {
                _ = &mut halt_rx => {
                    halted = true;
                    break;
                }
                read = tokio::time::timeout(self.timeout, reader.read_until(b'\n', &mut buf)) => match read {
                    Err(_) => {
                        tracing::debug!(url, timeout_ms = self.timeout.as_millis() as u64, "Page went quiet");
                        let _ = tx.send(RawEvent::new(TIMEOUT_EVENT, Vec::new()));
                        halted = true;
                        break;
                    }
                    Ok(Ok(0)) => break,
                    Ok(Ok(_)) => {
                        // Page output is not guaranteed to be UTF-8
                        let text = String::from_utf8_lossy(&buf);
                        let line = text.strip_suffix('\n').unwrap_or(&text);
                        let line = line.strip_suffix('\r').unwrap_or(line);
                        tracing::trace!(line, "Bridge output");
                        if tx.send(RawEvent::from_line(line)).is_err() {
                            // Nobody is listening any more
                            halted = true;
                            break;
                        }
                    }
                    Ok(Err(e)) => return Err(e).context("failed to read browser output"),
                },
            }
        }

        if let Ok(mut slot) = self.halt_tx.lock() {
            slot.take();
        }

        if !halted && let Some(ref mut child) = child_guard.child {
            let status = child
                .wait()
                .await
                .context("failed to wait for headless browser")?;
            if !status.success() {
                tracing::warn!(url, code = ?status.code(), "Headless browser exited with failure");
            }
        }

        drop(child_guard);
        stderr_handle.await.ok();

        // Keep the scripts on disk until the browser is gone
        drop(bridge_file);
        drop(main_file);

        Ok(())
    }
}

#[async_trait]
impl Bridge for PhantomBridge {
    async fn spawn(&self, url: &str, tx: mpsc::UnboundedSender<RawEvent>) -> Result<()> {
        self.spawn_and_stream(url, tx).await
    }

    fn halt(&self) {
        if let Ok(mut slot) = self.halt_tx.lock()
            && let Some(tx) = slot.take()
        {
            let _ = tx.send(());
        }
    }

    fn name(&self) -> &str {
        "PhantomJS"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable stand-in for the browser binary.
    fn fake_browser(dir: &std::path::Path, script: &str) -> String {
        let path = dir.join("fake-browser");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    fn bridge_for(browser: String, timeout: u64) -> PhantomBridge {
        let config = Config {
            browser,
            timeout,
            ..Config::default()
        };
        PhantomBridge::new(&config).unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RawEvent>) -> Vec<RawEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_streams_events_and_console_lines() {
        let dir = tempfile::tempdir().unwrap();
        let browser = fake_browser(
            dir.path(),
            r#"echo '["qunit.moduleStart","math"]'
echo 'page says hi'
echo ''
echo "[\"page\",\"$3\"]""#,
        );
        let bridge = bridge_for(browser, 5000);
        let (tx, mut rx) = mpsc::unbounded_channel();

        bridge.spawn("test/index.html", tx).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                RawEvent::new("qunit.moduleStart", vec![json!("math")]),
                RawEvent::console("page says hi"),
                RawEvent::console(""),
                RawEvent::new("page", vec![json!("test/index.html")]),
            ]
        );
    }

    #[tokio::test]
    async fn test_console_lines_keep_their_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let browser = fake_browser(
            dir.path(),
            r#"echo '    indented page output  '
printf 'crlf line\r\n'
printf '  ["qunit.log",true,"ok"]  \n'"#,
        );
        let bridge = bridge_for(browser, 5000);
        let (tx, mut rx) = mpsc::unbounded_channel();

        bridge.spawn("test/index.html", tx).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                RawEvent::console("    indented page output  "),
                RawEvent::console("crlf line"),
                RawEvent::new("qunit.log", vec![json!(true), json!("ok")]),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_is_console_text() {
        let dir = tempfile::tempdir().unwrap();
        let browser = fake_browser(
            dir.path(),
            r#"printf 'caf\351 log\n'
echo '["qunit.done",0,1,1,5]'"#,
        );
        let bridge = bridge_for(browser, 5000);
        let (tx, mut rx) = mpsc::unbounded_channel();

        bridge.spawn("a.html", tx).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                RawEvent::console("caf\u{FFFD} log"),
                RawEvent::new(
                    "qunit.done",
                    vec![json!(0), json!(1), json!(1), json!(5)]
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_silence_reports_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let browser = fake_browser(dir.path(), "sleep 5");
        let bridge = bridge_for(browser, 100);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let started = std::time::Instant::now();
        bridge.spawn("test/index.html", tx).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(drain(&mut rx), vec![RawEvent::new(TIMEOUT_EVENT, Vec::new())]);
    }

    #[tokio::test]
    async fn test_halt_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let browser = fake_browser(dir.path(), "echo '[\"qunit.begin\"]'\nsleep 5");
        let bridge = Arc::new(bridge_for(browser, 10_000));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let runner = Arc::clone(&bridge);
        let handle = tokio::spawn(async move { runner.spawn("test/index.html", tx).await });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.name, "qunit.begin");
        bridge.halt();

        let result = tokio::time::timeout(Duration::from_secs(3), handle).await;
        assert!(result.is_ok(), "halt should end the run");
    }

    #[tokio::test]
    async fn test_missing_browser_is_an_error() {
        let bridge = bridge_for("/nonexistent/phantomjs".into(), 100);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = bridge.spawn("test/index.html", tx).await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[test]
    fn test_browser_command_is_split() {
        let bridge = bridge_for("phantomjs --ignore-ssl-errors=true".into(), 100);
        assert_eq!(bridge.program, "phantomjs");
        assert_eq!(bridge.browser_args, vec!["--ignore-ssl-errors=true".to_string()]);
    }
}
