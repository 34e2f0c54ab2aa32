//! Catalog persistence
//!
//! The pipeline hands each published generation to a [`CatalogPersister`].
//! [`FileCatalogStore`] writes:
//! - `catalog.json`, the full generation, reloaded at startup
//! - `live.txt`, a TVBox list of servable entries grouped by category,
//!   ordered by a [`ChannelTemplate`] when one is configured
//! - `live.m3u`, the same entries as an M3U playlist
//! - `stats.json`, the summary of the last run
//!
//! Every file is written to a temp file and renamed into place.

pub mod catalog;
pub mod dedup;
pub mod template;

pub use catalog::{Catalog, CatalogQuery, CatalogStore};
pub use dedup::{DedupConfig, Deduplicator};
pub use template::ChannelTemplate;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::models::{ChannelEntry, RunResult};
use crate::utils::error::StorageError;
use crate::utils::normalize_tag;

/// Durable sink for published generations
#[async_trait]
pub trait CatalogPersister: Send + Sync {
    async fn persist(&self, catalog: &Catalog) -> Result<(), StorageError>;

    /// Record the summary of a finished run, published or not
    async fn persist_run(&self, _result: &RunResult) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Persister that discards everything
pub struct NullPersister;

#[async_trait]
impl CatalogPersister for NullPersister {
    async fn persist(&self, _catalog: &Catalog) -> Result<(), StorageError> {
        Ok(())
    }
}

/// On-disk form of a catalog generation
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogDocument {
    version: u32,
    generation: u64,
    built_at: DateTime<Utc>,
    entries: Vec<ChannelEntry>,
}

const DOCUMENT_VERSION: u32 = 1;

/// Repository totals of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub total: usize,
    pub valid: usize,
    pub failed: usize,
}

/// On-disk run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub version: u32,
    pub elapsed_seconds: f64,
    pub sources: SourceStats,
    #[serde(flatten)]
    pub run: RunResult,
}

impl From<&RunResult> for RunStats {
    fn from(result: &RunResult) -> Self {
        let failed = result.failed_repositories.len();
        Self {
            version: DOCUMENT_VERSION,
            elapsed_seconds: result.elapsed_secs(),
            sources: SourceStats {
                total: result.repository_count,
                valid: result.repository_count.saturating_sub(failed),
                failed,
            },
            run: result.clone(),
        }
    }
}

/// Writes the catalog and its exports into one directory
#[derive(Debug, Clone)]
pub struct FileCatalogStore {
    output_dir: PathBuf,
    catalog_file: String,
    stats_file: Option<String>,
    export_txt: bool,
    export_m3u: bool,
    template: Option<PathBuf>,
    template_strict: bool,
    dedup: Deduplicator,
}

impl FileCatalogStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            catalog_file: "catalog.json".to_string(),
            stats_file: Some("stats.json".to_string()),
            export_txt: true,
            export_m3u: true,
            template: None,
            template_strict: false,
            dedup: Deduplicator::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let storage = &config.storage;
        Self {
            output_dir: storage.output_dir.clone(),
            catalog_file: storage.catalog_file.clone(),
            stats_file: Some(storage.stats_file.clone()).filter(|f| !f.trim().is_empty()),
            export_txt: storage.export_txt,
            export_m3u: storage.export_m3u,
            template: storage.template.clone(),
            template_strict: storage.template_strict,
            dedup: Deduplicator::from_config(config),
        }
    }

    /// Order `live.txt` by the template file at `path`
    ///
    /// Channel names are matched through `dedup`'s aliases. The file is read
    /// on every persist; when it cannot be read the default order is used.
    pub fn with_template(mut self, path: impl Into<PathBuf>, strict: bool, dedup: Deduplicator) -> Self {
        self.template = Some(path.into());
        self.template_strict = strict;
        self.dedup = dedup;
        self
    }

    /// Toggle the TXT and M3U exports
    pub fn with_exports(mut self, txt: bool, m3u: bool) -> Self {
        self.export_txt = txt;
        self.export_m3u = m3u;
        self
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.output_dir.join(&self.catalog_file)
    }

    pub fn txt_path(&self) -> PathBuf {
        self.output_dir.join("live.txt")
    }

    pub fn m3u_path(&self) -> PathBuf {
        self.output_dir.join("live.m3u")
    }

    pub fn stats_path(&self) -> Option<PathBuf> {
        self.stats_file.as_ref().map(|f| self.output_dir.join(f))
    }

    async fn load_template(&self) -> Option<ChannelTemplate> {
        let path = self.template.as_ref()?;
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let template = ChannelTemplate::parse(&text).strict(self.template_strict);
                if template.is_empty() {
                    tracing::warn!(path = %path.display(), "Channel template lists no channels");
                }
                Some(template)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Channel template unreadable, using catalog order"
                );
                None
            }
        }
    }

    async fn render_export_txt(&self, catalog: &Catalog) -> String {
        match self.load_template().await {
            Some(template) => template.render_txt(catalog, &self.dedup),
            None => render_txt(catalog),
        }
    }

    /// Load the last persisted generation
    ///
    /// # Errors
    ///
    /// `StorageError::NoCatalog` when no catalog file exists yet.
    pub async fn load(&self) -> Result<Catalog, StorageError> {
        let path = self.catalog_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NoCatalog(path.display().to_string()));
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let doc: CatalogDocument = serde_json::from_slice(&bytes)?;
        tracing::info!(
            path = %path.display(),
            generation = doc.generation,
            entries = doc.entries.len(),
            "Loaded persisted catalog"
        );
        Ok(Catalog::from_parts(doc.generation, doc.built_at, doc.entries))
    }
}

#[async_trait]
impl CatalogPersister for FileCatalogStore {
    async fn persist(&self, catalog: &Catalog) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| StorageError::io(&self.output_dir, e))?;

        let doc = CatalogDocument {
            version: DOCUMENT_VERSION,
            generation: catalog.generation(),
            built_at: catalog.built_at(),
            entries: catalog.entries().to_vec(),
        };
        let json = serde_json::to_vec_pretty(&doc)?;
        write_atomic(&self.catalog_path(), &json).await?;

        if self.export_txt {
            let txt = self.render_export_txt(catalog).await;
            write_atomic(&self.txt_path(), txt.as_bytes()).await?;
        }
        if self.export_m3u {
            write_atomic(&self.m3u_path(), render_m3u(catalog).as_bytes()).await?;
        }

        tracing::debug!(
            dir = %self.output_dir.display(),
            generation = catalog.generation(),
            "Catalog persisted"
        );
        Ok(())
    }

    async fn persist_run(&self, result: &RunResult) -> Result<(), StorageError> {
        let Some(path) = self.stats_path() else {
            return Ok(());
        };
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| StorageError::io(&self.output_dir, e))?;

        let json = serde_json::to_vec_pretty(&RunStats::from(result))?;
        write_atomic(&path, &json).await
    }
}

/// Write to `<path>.tmp`, then rename over `path`
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    tokio::fs::write(&temp, contents)
        .await
        .map_err(|e| StorageError::io(&temp, e))?;
    tokio::fs::rename(&temp, path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    Ok(())
}

/// Servable entries grouped by category, categories in first-seen order
///
/// Labels differing only in case share a group under the first label seen.
fn servable_groups(catalog: &Catalog) -> Vec<(&str, Vec<&ChannelEntry>)> {
    let mut groups: Vec<(String, &str, Vec<&ChannelEntry>)> = Vec::new();
    for entry in catalog.servable() {
        let key = normalize_tag(&entry.category);
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, members)) => members.push(entry),
            None => groups.push((key, entry.category.as_str(), vec![entry])),
        }
    }
    groups
        .into_iter()
        .map(|(_, label, members)| (label, members))
        .collect()
}

/// Append one `label,#genre#` section, blank-line separated from the last
pub(crate) fn push_txt_section<'a>(
    out: &mut String,
    category: &str,
    rows: impl IntoIterator<Item = (&'a str, &'a str)>,
) {
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&format!("{category},#genre#\n"));
    for (name, url) in rows {
        out.push_str(&format!("{name},{url}\n"));
    }
}

/// Render servable entries as a TVBox text list
pub fn render_txt(catalog: &Catalog) -> String {
    let mut out = String::new();
    for (category, members) in servable_groups(catalog) {
        let rows = members
            .iter()
            .filter_map(|e| e.url().map(|url| (e.name.as_str(), url)));
        push_txt_section(&mut out, category, rows);
    }
    out
}

/// Render servable entries as an M3U playlist
pub fn render_m3u(catalog: &Catalog) -> String {
    let mut out = String::from("#EXTM3U\n");
    for (category, members) in servable_groups(catalog) {
        for entry in members {
            if let Some(url) = entry.url() {
                out.push_str(&format!(
                    "#EXTINF:-1 tvg-name=\"{}\" tvg-country=\"{}\" tvg-language=\"{}\" group-title=\"{}\",{}\n{}\n",
                    attr(&entry.name),
                    attr(&entry.country),
                    attr(&entry.language),
                    attr(category),
                    entry.name,
                    url
                ));
            }
        }
    }
    out
}

fn attr(value: &str) -> String {
    value.replace('"', "'")
}
