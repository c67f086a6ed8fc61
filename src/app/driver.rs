use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    app::{Flow, RunContext, dispatch},
    models::TestVerdict,
    runner::{Bridge, BridgeFailure},
    ui::Tone,
};

/// Published on the bus right before a browser is spawned for a URL.
pub const SPAWN_EVENT: &str = "qunit.spawn";

#[derive(Debug, Clone, PartialEq, Eq)]
enum SeriesState {
    Idle,
    Running(usize),
    Completed,
    Aborted(BridgeFailure),
}

/// How an invocation ended. Produced exactly once, by [`run_series`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Passed,
    /// Assertion failures, nothing asserted, or coverage below the threshold.
    Failed,
    Aborted(BridgeFailure),
}

impl Completion {
    pub fn success(&self) -> bool {
        matches!(self, Completion::Passed)
    }
}

/// Run every URL in order, one browser at a time, then report the verdict.
pub async fn run_series(
    ctx: &mut RunContext,
    bridge: Arc<dyn Bridge>,
    urls: &[String],
) -> Completion {
    let mut state = SeriesState::Idle;

    loop {
        tracing::debug!(?state, "Series state");
        state = match state {
            SeriesState::Idle if urls.is_empty() => SeriesState::Completed,
            SeriesState::Idle => SeriesState::Running(0),

            SeriesState::Running(index) => match run_url(ctx, &bridge, &urls[index]).await {
                Some(failure) => SeriesState::Aborted(failure),
                None if index + 1 < urls.len() => SeriesState::Running(index + 1),
                None => SeriesState::Completed,
            },

            SeriesState::Completed => return report_summary(ctx),

            SeriesState::Aborted(failure) => {
                tracing::error!(%failure, "Test series aborted");
                return Completion::Aborted(failure);
            }
        };
    }
}

/// Drive one page to its terminal event. Returns the failure if the series must stop.
async fn run_url(
    ctx: &mut RunContext,
    bridge: &Arc<dyn Bridge>,
    url: &str,
) -> Option<BridgeFailure> {
    if ctx.console.verbose() {
        ctx.console.subhead(&format!("Testing {}", url));
    } else {
        ctx.console.write(&format!("Testing {}", url));
    }

    ctx.session.reset_module();
    ctx.bus.publish(SPAWN_EVENT, &[Value::String(url.to_string())]);
    tracing::info!(url, bridge = bridge.name(), "Spawning browser run");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = Arc::clone(bridge);
    let target = url.to_string();
    let handle = tokio::spawn(async move { runner.spawn(&target, tx).await });

    let mut finished = false;
    while let Some(raw) = rx.recv().await {
        match dispatch(ctx, raw) {
            Flow::Continue => {}
            Flow::Halt => {
                bridge.halt();
                finished = true;
                break;
            }
            Flow::Fatal(failure) => {
                bridge.halt();
                let _ = handle.await;
                return Some(failure);
            }
        }
    }
    drop(rx);

    let result = match handle.await {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("bridge task failed: {}", e)),
    };

    match result {
        Err(e) if !finished => {
            let failure = BridgeFailure::Unavailable {
                url: url.to_string(),
                reason: format!("{:#}", e),
            };
            ctx.console.error_mark();
            ctx.console.warn(&format!("{}.", failure));
            Some(failure)
        }
        Err(e) => {
            tracing::warn!(url, error = %format!("{:#}", e), "Bridge failed after the run finished");
            None
        }
        Ok(()) => {
            if !finished {
                tracing::warn!(url, "Run ended without qunit.done");
                ctx.console.newline();
            }
            None
        }
    }
}

/// Print the coverage and test verdict lines and turn them into a completion.
fn report_summary(ctx: &mut RunContext) -> Completion {
    let status = ctx.status;
    let verdict = status.verdict();
    let threshold_msg = format!("({}% minimum)", ctx.threshold);
    let console = &mut ctx.console;

    console.newline();
    console.write("Code Coverage Results: ");
    if verdict.coverage_ok {
        console.writeln_painted(
            &format!(
                "{} files passed coverage {}",
                status.coverage_pass_count, threshold_msg
            ),
            Tone::Green,
        );
    } else {
        console.writeln_painted(
            &format!(
                "{} files failed coverage {}",
                status.coverage_fail_count, threshold_msg
            ),
            Tone::Red,
        );
    }

    console.write("Unit Test Results: ");
    match verdict.tests {
        TestVerdict::Failed => console.writeln_painted(
            &format!(
                "{}/{} assertions failed ({}ms)",
                status.failed_assertions, status.total_assertions, status.duration_ms
            ),
            Tone::Red,
        ),
        TestVerdict::NoAssertions => console.writeln_painted(
            &format!("0/0 assertions ran ({}ms)", status.duration_ms),
            Tone::Red,
        ),
        TestVerdict::Passed => console.writeln_painted(
            &format!(
                "{} assertions passed ({}ms)",
                status.total_assertions, status.duration_ms
            ),
            Tone::Green,
        ),
    }

    if verdict.ok() {
        console.ok("No issues found.");
        Completion::Passed
    } else {
        console.warn("Issues were found.");
        Completion::Failed
    }
}
