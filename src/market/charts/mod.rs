// SPDX-License-Identifier: MIT

//! Chart materialization
//!
//! Generated plotting code is handed to a [`ChartRenderer`], which writes
//! images named `chart_<n>.png` into the run's output directory. The helpers
//! here clear and discover those files.

pub mod policy;
pub mod sandbox;

pub use policy::ScriptPolicy;
pub use sandbox::PythonSandbox;

use crate::adk::error::SandboxError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::Path;
use tokio::fs;

static CHART_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^chart_(\d+)\.png$").expect("chart file pattern is valid"));

/// Executes drawing instructions against a constrained plotting surface
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Run `script` with `out_dir` as its working directory
    async fn render(&self, script: &str, out_dir: &Path) -> Result<(), SandboxError>;
}

/// Index of a conventional chart file name, `None` for anything else
pub fn chart_index(file_name: &str) -> Option<u32> {
    CHART_FILE
        .captures(file_name)
        .and_then(|c| c[1].parse().ok())
}

/// Chart files currently in `dir`, ordered by index
pub async fn list_chart_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut charts: Vec<(u32, String)> = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if let Some(idx) = chart_index(name) {
                charts.push((idx, name.to_string()));
            }
        }
    }
    charts.sort();
    Ok(charts.into_iter().map(|(_, name)| name).collect())
}

/// Delete chart files left in `dir` by a previous render; returns how many were removed
pub async fn clear_chart_files(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for name in list_chart_files(dir).await? {
        match fs::remove_file(dir.join(&name)).await {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Could not remove stale chart {}: {}", name, e),
        }
    }
    Ok(removed)
}

/// Strip Markdown code fences a model may wrap its code in
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```python", "")
        .replace("```py", "")
        .replace("```", "")
        .trim()
        .to_string()
}
