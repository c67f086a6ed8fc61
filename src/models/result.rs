use std::collections::HashMap;

use serde_json::Value;

/// A failing assertion waiting to be printed.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAssertionFailure {
    pub test_name: String,
    pub message: String,
    pub actual: Value,
    pub expected: Value,
    pub source: Option<String>,
}

/// Per-line classification of a raw Blanket coverage map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineTally {
    pub hits: u64,
    pub misses: u64,
    pub sloc: u64,
}

impl LineTally {
    /// Classify every source line. `hits` maps 1-based line numbers to hit counts;
    /// lines without an entry are not executable.
    pub fn classify(source: &[String], hits: &HashMap<usize, u64>) -> Self {
        let mut tally = Self::default();
        for num in 1..=source.len() {
            match hits.get(&num) {
                Some(0) => {
                    tally.misses += 1;
                    tally.sloc += 1;
                }
                Some(_) => {
                    tally.hits += 1;
                    tally.sloc += 1;
                }
                None => {}
            }
        }
        tally
    }
}

/// Coverage of one instrumented file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCoverage {
    pub covered_lines: u64,
    pub total_lines: u64,
}

impl FileCoverage {
    pub fn new(covered_lines: u64, total_lines: u64) -> Self {
        Self {
            covered_lines,
            total_lines,
        }
    }

    /// Decode a `blanket:fileDone` payload: either a `[covered, total]` pair or a
    /// raw line map object (`{"source": [...], "1": 3, "2": 0, ...}`).
    pub fn from_payload(payload: &Value) -> Option<Self> {
        match payload {
            Value::Array(pair) if pair.len() == 2 => {
                let covered = as_count(&pair[0])?;
                let total = as_count(&pair[1])?;
                Some(Self::new(covered, total))
            }
            Value::Object(map) => {
                let source: Vec<String> = map
                    .get("source")?
                    .as_array()?
                    .iter()
                    .map(|line| line.as_str().unwrap_or_default().to_string())
                    .collect();
                let hits: HashMap<usize, u64> = map
                    .iter()
                    .filter_map(|(key, value)| Some((key.parse::<usize>().ok()?, as_count(value)?)))
                    .collect();
                let tally = LineTally::classify(&source, &hits);
                Some(Self::new(tally.hits, tally.sloc))
            }
            _ => None,
        }
    }

    /// Percentage of executable lines that were hit. A file with no executable
    /// lines reports 0.
    pub fn percent(&self) -> f64 {
        if self.total_lines == 0 {
            return 0.0;
        }
        self.covered_lines as f64 / self.total_lines as f64 * 100.0
    }

    /// The threshold is an exclusive floor.
    pub fn passes(&self, threshold: u32) -> bool {
        self.percent() > f64::from(threshold)
    }

    /// `"FAIL [ 5%] : lib/foo.js (1 / 20)"`
    pub fn report_line(&self, filename: &str, threshold: u32) -> String {
        let result = if self.passes(threshold) { "PASS" } else { "FAIL" };
        format!(
            "{} [{:>2}%] : {} ({} / {})",
            result,
            self.percent().floor() as u64,
            filename,
            self.covered_lines,
            self.total_lines
        )
    }
}

pub(crate) fn as_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|n| *n >= 0.0).map(|n| n as u64))
}
