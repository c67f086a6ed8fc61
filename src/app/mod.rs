use std::collections::{HashSet, VecDeque};

use crate::{
    app::bus::EventBus,
    models::{PendingAssertionFailure, RunStatus},
    ui::Console,
};

pub mod bus;
pub mod driver;
pub mod events;

pub use driver::run_series;
pub use events::{Flow, dispatch};

/// Where the page currently is, so later events can be attributed.
#[derive(Debug, Default)]
pub struct Session {
    pub current_module: Option<String>,
    pub current_test: String,
    /// Modules that have started but not finished.
    pub unfinished: HashSet<String>,
}

impl Session {
    /// `"module - test"`, or just the test name outside a module.
    pub fn qualified_test_name(&self, test: &str) -> String {
        match self.current_module.as_deref() {
            Some(module) if !module.is_empty() => format!("{} - {}", module, test),
            _ => test.to_string(),
        }
    }

    pub fn reset_module(&mut self) {
        self.current_module = None;
    }
}

/// All mutable state of one invocation, threaded through every event handler.
pub struct RunContext {
    pub status: RunStatus,
    pub session: Session,
    pub failures: VecDeque<PendingAssertionFailure>,
    pub threshold: u32,
    pub console: Console,
    pub bus: EventBus,
    /// Whether the blank line before the first coverage report has been written.
    pub coverage_started: bool,
}

impl RunContext {
    pub fn new(console: Console, bus: EventBus, threshold: u32) -> Self {
        Self {
            status: RunStatus::default(),
            session: Session::default(),
            failures: VecDeque::new(),
            threshold,
            console,
            bus,
            coverage_started: false,
        }
    }
}
