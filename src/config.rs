use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "blanket-qunit.toml";

/// Options for one invocation: defaults, then `blanket-qunit.toml`, then CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Milliseconds of page silence before the bridge reports a timeout.
    pub timeout: u64,
    /// Script injected into each tested page. Defaults to the embedded QUnit/Blanket bridge.
    pub inject: Option<PathBuf>,
    /// Explicit non-file URLs, tested before `files`.
    pub urls: Vec<String>,
    /// Minimum coverage percent a file must exceed to pass.
    pub threshold: u32,
    /// Glob patterns (relative to the workspace root) of HTML test pages.
    /// Example: ["test/**/*.html"]
    pub files: Vec<String>,
    /// Headless browser command line.
    /// Example: "phantomjs --ignore-ssl-errors=true"
    pub browser: String,
    pub verbose: bool,
    pub color: ColorMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: 5000,
            inject: None,
            urls: Vec::new(),
            threshold: 20,
            files: Vec::new(),
            browser: "phantomjs".into(),
            verbose: false,
            color: ColorMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    /// `None` leaves the decision to terminal detection.
    pub fn enabled(self) -> Option<bool> {
        match self {
            ColorMode::Auto => None,
            ColorMode::Always => Some(true),
            ColorMode::Never => Some(false),
        }
    }
}

impl Config {
    /// Load `explicit` if given, otherwise `blanket-qunit.toml` from the workspace
    /// root, falling back to defaults if that file is absent.
    pub fn load(workspace: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = workspace.join(CONFIG_FILE);
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Explicit URLs followed by every file matched by `files`, in pattern order.
    pub fn url_list(&self, workspace: &Path) -> Result<Vec<String>> {
        let mut urls = self.urls.clone();
        for pattern in &self.files {
            let full = workspace.join(pattern).to_string_lossy().to_string();
            let mut matched = false;
            for entry in glob::glob(&full)
                .with_context(|| format!("invalid file pattern '{}'", pattern))?
                .flatten()
            {
                matched = true;
                let entry = entry.to_string_lossy().to_string();
                if !urls.contains(&entry) {
                    urls.push(entry);
                }
            }
            if !matched {
                tracing::warn!(pattern = %pattern, "File pattern matched nothing");
            }
        }
        Ok(urls)
    }
}
