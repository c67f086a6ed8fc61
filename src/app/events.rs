use serde_json::Value;

use crate::{
    app::RunContext,
    models::{FileCoverage, PendingAssertionFailure, result::as_count},
    runner::{BridgeFailure, RawEvent},
    ui::Tone,
};

/// Typed view of the bridge events the aggregator reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    ModuleStart {
        name: String,
    },
    ModuleDone {
        name: String,
    },
    TestStart {
        name: String,
    },
    Log {
        result: bool,
        actual: Value,
        expected: Value,
        message: String,
        source: Option<String>,
    },
    TestDone {
        name: String,
        failed: u64,
    },
    CoverageFileDone {
        coverage: FileCoverage,
        filename: String,
    },
    CoverageDone,
    Done {
        failed: u64,
        passed: u64,
        total: u64,
        duration_ms: u64,
    },
    LoadFailed {
        url: String,
    },
    TimedOut,
    Console {
        text: String,
    },
    /// Forwarded to the bus but not folded.
    Other,
}

/// What the driver should do after an event has been folded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The page finished; stop the browser and move on.
    Halt,
    /// Stop the browser and abandon the remaining URLs.
    Fatal(BridgeFailure),
}

impl BridgeEvent {
    pub fn from_raw(raw: &RawEvent) -> Self {
        let args = raw.args.as_slice();
        match raw.name.as_str() {
            "qunit.moduleStart" => BridgeEvent::ModuleStart {
                name: arg_str(args, 0),
            },
            "qunit.moduleDone" => BridgeEvent::ModuleDone {
                name: arg_str(args, 0),
            },
            "qunit.testStart" => BridgeEvent::TestStart {
                name: arg_str(args, 0),
            },
            "qunit.log" => BridgeEvent::Log {
                result: args.first().and_then(Value::as_bool).unwrap_or(false),
                actual: arg_value(args, 1),
                expected: arg_value(args, 2),
                message: arg_str(args, 3),
                source: Some(arg_str(args, 4)).filter(|s| !s.is_empty()),
            },
            "qunit.testDone" => BridgeEvent::TestDone {
                name: arg_str(args, 0),
                failed: arg_count(args, 1),
            },
            "qunit.done" => BridgeEvent::Done {
                failed: arg_count(args, 0),
                passed: arg_count(args, 1),
                total: arg_count(args, 2),
                duration_ms: arg_count(args, 3),
            },
            "blanket:fileDone" => {
                match args.first().and_then(FileCoverage::from_payload) {
                    Some(coverage) => BridgeEvent::CoverageFileDone {
                        coverage,
                        filename: arg_str(args, 1),
                    },
                    None => {
                        tracing::debug!(?args, "Malformed coverage payload");
                        BridgeEvent::Other
                    }
                }
            }
            "blanket:done" => BridgeEvent::CoverageDone,
            "fail.load" => BridgeEvent::LoadFailed {
                url: arg_str(args, 0),
            },
            "fail.timeout" => BridgeEvent::TimedOut,
            "console" => BridgeEvent::Console {
                text: arg_str(args, 0),
            },
            _ => BridgeEvent::Other,
        }
    }
}

/// Forward `raw` to the bus, then fold it into the context.
pub fn dispatch(ctx: &mut RunContext, raw: RawEvent) -> Flow {
    ctx.bus.publish(&raw.name, &raw.args);
    let event = BridgeEvent::from_raw(&raw);
    if event == BridgeEvent::Other {
        tracing::trace!(name = %raw.name, "Event forwarded only");
    }
    handle_bridge_event(ctx, event)
}

/// Process a bridge event.
pub fn handle_bridge_event(ctx: &mut RunContext, event: BridgeEvent) -> Flow {
    match event {
        BridgeEvent::ModuleStart { name } => {
            ctx.session.unfinished.insert(name.clone());
            ctx.session.current_module = Some(name);
        }

        BridgeEvent::ModuleDone { name } => {
            ctx.session.unfinished.remove(&name);
        }

        BridgeEvent::TestStart { name } => {
            ctx.session.current_test = ctx.session.qualified_test_name(&name);
            if ctx.console.verbose() {
                let line = format!("{}...", ctx.session.current_test);
                ctx.console.write(&line);
            }
        }

        BridgeEvent::Log {
            result,
            actual,
            expected,
            message,
            source,
        } => {
            if !result {
                ctx.failures.push_back(PendingAssertionFailure {
                    test_name: ctx.session.current_test.clone(),
                    message,
                    actual,
                    expected,
                    source,
                });
            }
        }

        BridgeEvent::TestDone { name: _name, failed } => {
            if failed > 0 {
                if ctx.console.verbose() {
                    ctx.console.error_mark();
                    log_failed_assertions(ctx);
                } else {
                    ctx.console.write_painted("F", Tone::Red);
                }
            } else if ctx.console.verbose() {
                ctx.console.ok_mark();
            } else {
                ctx.console.write(".");
            }
        }

        BridgeEvent::CoverageFileDone { coverage, filename } => {
            if !ctx.coverage_started {
                ctx.coverage_started = true;
                ctx.console.newline();
            }

            let pass = coverage.passes(ctx.threshold);
            tracing::debug!(
                file = %filename,
                percent = coverage.percent(),
                pass,
                "Coverage reported"
            );
            ctx.status.record_coverage(pass);
            if !pass {
                let line = coverage.report_line(&filename, ctx.threshold);
                ctx.console.writeln_painted(&line, Tone::Red);
            }
        }

        BridgeEvent::CoverageDone => {}

        BridgeEvent::Done {
            failed,
            passed,
            total,
            duration_ms,
        } => {
            ctx.status.add_run(failed, passed, total, duration_ms);
            if !ctx.console.verbose() {
                ctx.console.newline();
                if failed > 0 {
                    log_failed_assertions(ctx);
                }
            }
            return Flow::Halt;
        }

        BridgeEvent::LoadFailed { url } => {
            if ctx.console.verbose() {
                ctx.console.write("Running headless browser...");
            } else {
                ctx.console.write("...");
            }
            ctx.console.error_mark();
            let failure = BridgeFailure::LoadFailed { url };
            ctx.console.warn(&format!("{}.", failure));
            return Flow::Fatal(failure);
        }

        BridgeEvent::TimedOut => {
            ctx.console.newline();
            let failure = BridgeFailure::TimedOut;
            ctx.console.warn(&format!("{}.", failure));
            return Flow::Fatal(failure);
        }

        BridgeEvent::Console { text } => {
            ctx.console.passthrough(&text);
        }

        BridgeEvent::Other => {}
    }

    Flow::Continue
}

/// Print and drain queued assertion failures, oldest first.
fn log_failed_assertions(ctx: &mut RunContext) {
    while let Some(failure) = ctx.failures.pop_front() {
        let console = &mut ctx.console;
        if !console.verbose() {
            console.error(&failure.test_name);
        }

        let message = console.paint_lines(&failure.message, Tone::Magenta);
        console.error(&format!("Message: {}", message));

        if failure.actual != failure.expected {
            let actual = console.paint_lines(&display_value(&failure.actual), Tone::Magenta);
            let expected = console.paint_lines(&display_value(&failure.expected), Tone::Magenta);
            console.error(&format!("Actual: {}", actual));
            console.error(&format!("Expected: {}", expected));
        }

        if let Some(source) = &failure.source {
            console.error(&source.replace("    at", "  at"));
        }

        console.newline();
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn arg_value(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null)
}

fn arg_str(args: &[Value], index: usize) -> String {
    match args.get(index) {
        None | Some(Value::Null) => String::new(),
        Some(value) => display_value(value),
    }
}

fn arg_count(args: &[Value], index: usize) -> u64 {
    args.get(index).and_then(as_count).unwrap_or(0)
}
