/// Counters accumulated across every URL of one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatus {
    pub failed_assertions: u64,
    pub passed_assertions: u64,
    pub total_assertions: u64,
    pub duration_ms: u64,
    pub coverage_pass_count: u64,
    pub coverage_fail_count: u64,
}

impl RunStatus {
    /// Fold one `qunit.done` segment into the totals.
    pub fn add_run(&mut self, failed: u64, passed: u64, total: u64, duration_ms: u64) {
        self.failed_assertions = self.failed_assertions.saturating_add(failed);
        self.passed_assertions = self.passed_assertions.saturating_add(passed);
        self.total_assertions = self.total_assertions.saturating_add(total);
        self.duration_ms = self.duration_ms.saturating_add(duration_ms);
    }

    pub fn record_coverage(&mut self, pass: bool) {
        if pass {
            self.coverage_pass_count += 1;
        } else {
            self.coverage_fail_count += 1;
        }
    }

    pub fn verdict(&self) -> Verdict {
        let tests = if self.failed_assertions > 0 {
            TestVerdict::Failed
        } else if self.total_assertions == 0 {
            TestVerdict::NoAssertions
        } else {
            TestVerdict::Passed
        };

        Verdict {
            coverage_ok: self.coverage_fail_count == 0,
            tests,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestVerdict {
    Passed,
    Failed,
    /// Nothing was asserted, which is not evidence of correctness.
    NoAssertions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub coverage_ok: bool,
    pub tests: TestVerdict,
}

impl Verdict {
    pub fn tests_ok(&self) -> bool {
        self.tests == TestVerdict::Passed
    }

    pub fn ok(&self) -> bool {
        self.coverage_ok && self.tests_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_run_keeps_total_consistent() {
        let mut status = RunStatus::default();
        status.add_run(1, 2, 3, 40);
        status.add_run(0, 5, 5, 10);

        assert_eq!(status.total_assertions, 8);
        assert_eq!(
            status.total_assertions,
            status.passed_assertions + status.failed_assertions
        );
        assert_eq!(status.duration_ms, 50);
    }

    #[test]
    fn test_add_run_saturates_huge_counts() {
        let mut status = RunStatus::default();
        status.add_run(0, u64::MAX, u64::MAX, u64::MAX);
        status.add_run(1, 1, 2, 5);

        assert_eq!(status.total_assertions, u64::MAX);
        assert_eq!(status.passed_assertions, u64::MAX);
        assert_eq!(status.duration_ms, u64::MAX);
        assert_eq!(status.failed_assertions, 1);
        assert_eq!(status.verdict().tests, TestVerdict::Failed);
    }

    #[test]
    fn test_zero_assertions_fail_the_test_verdict() {
        let status = RunStatus::default();
        let verdict = status.verdict();

        assert!(verdict.coverage_ok);
        assert_eq!(verdict.tests, TestVerdict::NoAssertions);
        assert!(!verdict.ok());
    }

    #[test]
    fn test_coverage_failure_fails_overall() {
        let mut status = RunStatus::default();
        status.add_run(0, 4, 4, 12);
        status.record_coverage(true);
        status.record_coverage(false);

        let verdict = status.verdict();
        assert!(verdict.tests_ok());
        assert!(!verdict.coverage_ok);
        assert!(!verdict.ok());
    }

    #[test]
    fn test_clean_run_passes() {
        let mut status = RunStatus::default();
        status.add_run(0, 4, 4, 12);
        status.record_coverage(true);

        assert_eq!(status.coverage_pass_count, 1);
        assert!(status.verdict().ok());
    }
}
