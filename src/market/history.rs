// SPDX-License-Identifier: MIT

//! Report persistence
//!
//! [`DirectoryReportStore`] keeps one directory per saved report holding the
//! Markdown, copies of the chart images, an optional rendered document and a
//! `metadata.json` index entry.

use crate::adk::error::Result;
use crate::market::workflow::WorkflowState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const METADATA_FILE: &str = "metadata.json";
const REPORT_FILE: &str = "report.md";

/// Index entry for a saved report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub id: String,
    pub topic: String,
    pub date: String,
    /// Chart file names stored alongside the report
    pub charts: Vec<String>,
    /// File name of the rendered document, if one was stored
    #[serde(default)]
    pub document: Option<String>,
}

/// A report loaded back from the store
#[derive(Debug, Clone)]
pub struct StoredReport {
    pub metadata: ReportMetadata,
    pub content: String,
    pub chart_paths: Vec<PathBuf>,
    pub document_path: Option<PathBuf>,
}

/// Durable storage for finished reports
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a report and return its id
    async fn save(
        &self,
        topic: &str,
        report: &str,
        chart_paths: &[PathBuf],
        document: Option<&Path>,
    ) -> Result<String>;

    /// All saved reports, newest first
    async fn list(&self) -> Result<Vec<ReportMetadata>>;

    /// Load a report by id; `None` if it doesn't exist
    async fn load(&self, id: &str) -> Result<Option<StoredReport>>;
}

/// Keep the characters that are safe in a file name, spaces become `_`
pub fn slugify(topic: &str) -> String {
    topic
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .replace(' ', "_")
}

/// Write the finished report into the run directory
pub async fn write_run_report(state: &WorkflowState) -> Result<PathBuf> {
    fs::create_dir_all(&state.output_dir).await?;
    let path = state.report_path();
    fs::write(&path, &state.final_report).await?;
    Ok(path)
}

/// Persist a finished run's report and charts to `store`
pub async fn save_run(store: &dyn ReportStore, state: &WorkflowState) -> Result<String> {
    store
        .save(&state.topic, &state.final_report, &state.chart_paths(), None)
        .await
}

/// Filesystem-backed [`ReportStore`]
pub struct DirectoryReportStore {
    root: PathBuf,
}

impl DirectoryReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ids are single path components produced by `save`
    fn report_dir(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains(['/', '\\']);
        valid.then(|| self.root.join(id))
    }

    async fn unique_id(&self, topic: &str) -> String {
        let base = format!(
            "{}_{}",
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            slugify(topic)
        );
        let mut id = base.clone();
        let mut n = 2;
        while fs::try_exists(self.root.join(&id)).await.unwrap_or(false) {
            id = format!("{}_{}", base, n);
            n += 1;
        }
        id
    }
}

#[async_trait]
impl ReportStore for DirectoryReportStore {
    async fn save(
        &self,
        topic: &str,
        report: &str,
        chart_paths: &[PathBuf],
        document: Option<&Path>,
    ) -> Result<String> {
        fs::create_dir_all(&self.root).await?;
        let id = self.unique_id(topic).await;
        let dir = self.root.join(&id);
        fs::create_dir(&dir).await?;

        fs::write(dir.join(REPORT_FILE), report).await?;

        let mut charts = Vec::new();
        for path in chart_paths {
            let Some(name) = path.file_name() else { continue };
            if !fs::try_exists(path).await.unwrap_or(false) {
                log::warn!("Skipping missing chart {}", path.display());
                continue;
            }
            fs::copy(path, dir.join(name)).await?;
            charts.push(name.to_string_lossy().into_owned());
        }

        let mut stored_document = None;
        if let Some(doc) = document {
            match doc.file_name() {
                Some(name) if fs::try_exists(doc).await.unwrap_or(false) => {
                    fs::copy(doc, dir.join(name)).await?;
                    stored_document = Some(name.to_string_lossy().into_owned());
                }
                _ => log::warn!("Skipping missing document {}", doc.display()),
            }
        }

        let metadata = ReportMetadata {
            id: id.clone(),
            topic: topic.to_string(),
            date: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            charts,
            document: stored_document,
        };
        fs::write(
            dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?,
        )
        .await?;

        log::info!("Saved report {} to {}", id, dir.display());
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<ReportMetadata>> {
        let mut reports = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(reports),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let meta_path = entry.path().join(METADATA_FILE);
            let Ok(raw) = fs::read_to_string(&meta_path).await else {
                continue;
            };
            match serde_json::from_str::<ReportMetadata>(&raw) {
                Ok(meta) => reports.push(meta),
                Err(e) => log::warn!("Ignoring unreadable {}: {}", meta_path.display(), e),
            }
        }

        // Ids start with a timestamp, so this is newest first
        reports.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(reports)
    }

    async fn load(&self, id: &str) -> Result<Option<StoredReport>> {
        let Some(dir) = self.report_dir(id) else {
            return Ok(None);
        };
        if !fs::try_exists(dir.join(METADATA_FILE)).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = fs::read_to_string(dir.join(REPORT_FILE)).await?;
        let metadata: ReportMetadata =
            serde_json::from_str(&fs::read_to_string(dir.join(METADATA_FILE)).await?)?;

        Ok(Some(StoredReport {
            chart_paths: metadata.charts.iter().map(|c| dir.join(c)).collect(),
            document_path: metadata.document.as_ref().map(|d| dir.join(d)),
            metadata,
            content,
        }))
    }
}
