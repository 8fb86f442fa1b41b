use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use super::{Generation, ResultStore, Snapshot};
use crate::config::OutputConfig;
use crate::constants;
use crate::error::{ComputationError, PipelineError, Result};
use crate::pipeline::aggregate::{ColumnKind, ResultTable};
use crate::pipeline::processing::Violation;
use crate::pipeline::summary::Summary;

/// One file of a published generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the generation directory
    pub path: String,
    pub sha256: String,
    pub bytes: usize,
    /// Data rows, for tables only
    pub rows: Option<usize>,
    /// Cell kind per column, for tables only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnKind>>,
}

/// A file ready to be written into a generation.
struct RenderedFile {
    path: String,
    bytes: Vec<u8>,
    rows: Option<usize>,
    columns: Option<Vec<ColumnKind>>,
}

impl RenderedFile {
    fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
            rows: None,
            columns: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generation: String,
    pub created_at: DateTime<Utc>,
    pub decimal_places: usize,
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FailureMarker {
    generation: String,
    failed_at: DateTime<Utc>,
    table: String,
    row: usize,
    column: String,
    value: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn violations_csv(violations: &[Violation]) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record([
        "table",
        "row",
        "transaction_id",
        "field",
        "rule",
        "severity",
        "observed",
    ])?;
    for v in violations {
        wtr.serialize(v)?;
    }
    wtr.into_inner()
        .map_err(|e| PipelineError::Export(format!("violations buffer: {}", e)))
}

/// Generations as directories under an output root.
///
/// Layout: `generations/<id>/` holds the published files, `CURRENT` names the live id,
/// `.staging/` holds generations being written and `failed/` holds rejection markers.
pub struct FsResultStore {
    root: PathBuf,
    decimal_places: usize,
    keep_generations: usize,
}

impl FsResultStore {
    pub fn new(root: impl Into<PathBuf>, decimal_places: usize, keep_generations: usize) -> Self {
        Self {
            root: root.into(),
            decimal_places,
            keep_generations: keep_generations.max(1),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.root, config.decimal_places, config.keep_generations)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation_dir(&self, id: &str) -> PathBuf {
        self.root.join(constants::GENERATIONS_DIR).join(id)
    }

    fn current_pointer(&self) -> PathBuf {
        self.root.join(constants::CURRENT_POINTER)
    }

    /// Id named by `CURRENT`, if any.
    pub async fn current_id(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.current_pointer()).await {
            Ok(text) => {
                let id = text.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Published generation ids, oldest first.
    pub async fn list_generations(&self) -> Result<Vec<String>> {
        let dir = self.root.join(constants::GENERATIONS_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub async fn read_manifest(&self, id: &str) -> Result<Manifest> {
        let text = fs::read_to_string(self.generation_dir(id).join(constants::MANIFEST_JSON)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load a generation, verifying every file against the manifest.
    #[instrument(skip(self))]
    pub async fn load_generation(&self, id: &str) -> Result<Snapshot> {
        let dir = self.generation_dir(id);
        let manifest = self.read_manifest(id).await?;

        let mut tables = Vec::new();
        let mut summary: Option<Summary> = None;
        for entry in &manifest.files {
            let bytes = fs::read(dir.join(&entry.path)).await?;
            if sha256_hex(&bytes) != entry.sha256 {
                return Err(PipelineError::Export(format!(
                    "checksum mismatch for {} in generation {}",
                    entry.path, id
                )));
            }
            if entry.path == constants::SUMMARY_JSON {
                summary = Some(serde_json::from_slice(&bytes)?);
            } else if let Some(name) = table_name(&entry.path) {
                let kinds = entry.columns.as_deref().ok_or_else(|| {
                    PipelineError::Export(format!(
                        "manifest of generation {} records no column kinds for {}",
                        id, entry.path
                    ))
                })?;
                tables.push(ResultTable::read_csv(name, bytes.as_slice(), kinds)?);
            }
        }

        let summary = summary.ok_or_else(|| {
            PipelineError::Export(format!("generation {} has no {}", id, constants::SUMMARY_JSON))
        })?;
        debug!("Loaded {} tables from generation {}", tables.len(), id);
        Ok(Snapshot::new(id, manifest.created_at, summary, tables))
    }

    /// Serialize every file of the generation in publication order.
    fn render_files(&self, generation: &Generation) -> Result<Vec<RenderedFile>> {
        let mut files = Vec::with_capacity(generation.tables.len() + 4);
        for table in &generation.tables {
            files.push(RenderedFile {
                path: format!("{}/{}.csv", constants::TABLES_DIR, table.name),
                bytes: table.to_csv_bytes(self.decimal_places)?,
                rows: Some(table.len()),
                columns: Some(table.column_kinds()),
            });
        }
        files.push(RenderedFile::new(
            constants::SUMMARY_JSON,
            serde_json::to_vec_pretty(&generation.summary)?,
        ));
        files.push(RenderedFile::new(
            constants::SUMMARY_REPORT,
            generation
                .summary
                .render_report(&generation.run, self.decimal_places)
                .into_bytes(),
        ));
        files.push(RenderedFile::new(
            constants::EXECUTION_LOG,
            serde_json::to_vec_pretty(&generation.run)?,
        ));
        files.push(RenderedFile {
            rows: Some(generation.violations.len()),
            ..RenderedFile::new(constants::VIOLATIONS_CSV, violations_csv(&generation.violations)?)
        });
        Ok(files)
    }

    /// Write every file and the manifest under `staging`, then move the finished directory
    /// into `generations/`. Returns the number of files written.
    async fn stage(&self, generation: &Generation, staging: &Path) -> Result<usize> {
        fs::create_dir_all(staging.join(constants::TABLES_DIR)).await?;

        let mut manifest = Manifest {
            generation: generation.id.clone(),
            created_at: generation.created_at,
            decimal_places: self.decimal_places,
            files: Vec::new(),
        };
        for file in self.render_files(generation)? {
            fs::write(staging.join(&file.path), &file.bytes).await?;
            manifest.files.push(ManifestEntry {
                sha256: sha256_hex(&file.bytes),
                bytes: file.bytes.len(),
                path: file.path,
                rows: file.rows,
                columns: file.columns,
            });
        }
        fs::write(
            staging.join(constants::MANIFEST_JSON),
            serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;

        // The generation becomes visible only once it is complete
        fs::create_dir_all(self.root.join(constants::GENERATIONS_DIR)).await?;
        fs::rename(staging, self.generation_dir(&generation.id)).await?;
        Ok(manifest.files.len())
    }

    /// Drop the oldest generations beyond the retention limit. The current one is kept.
    async fn prune(&self, current: &str) -> Result<()> {
        let ids = self.list_generations().await?;
        if ids.len() <= self.keep_generations {
            return Ok(());
        }
        let excess = ids.len() - self.keep_generations;
        for id in ids.iter().take(excess).filter(|id| id.as_str() != current) {
            info!("Pruning generation {}", id);
            if let Err(e) = fs::remove_dir_all(self.generation_dir(id)).await {
                warn!("Failed to prune generation {}: {}", id, e);
            }
        }
        Ok(())
    }
}

/// `tables/<name>.csv` → `<name>`
fn table_name(path: &str) -> Option<&str> {
    path.strip_prefix(constants::TABLES_DIR)?
        .strip_prefix('/')?
        .strip_suffix(".csv")
}

#[async_trait]
impl ResultStore for FsResultStore {
    #[instrument(skip_all, fields(generation = %generation.id, root = %self.root.display()))]
    async fn publish(&self, generation: &Generation) -> Result<()> {
        let staging = self
            .root
            .join(constants::STAGING_DIR)
            .join(&generation.id);
        if fs::metadata(&staging).await.is_ok() {
            fs::remove_dir_all(&staging).await?;
        }
        let files = match self.stage(generation, &staging).await {
            Ok(files) => files,
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging).await {
                    warn!("Failed to remove staging {}: {}", staging.display(), cleanup);
                }
                return Err(e);
            }
        };

        let pointer = self.current_pointer();
        let tmp = pointer.with_extension("tmp");
        fs::write(&tmp, format!("{}\n", generation.id)).await?;
        fs::rename(&tmp, &pointer).await?;
        info!("Generation {} is now current ({} files)", generation.id, files);

        self.prune(&generation.id).await
    }

    async fn load_current(&self) -> Result<Option<Snapshot>> {
        match self.current_id().await? {
            Some(id) => Ok(Some(self.load_generation(&id).await?)),
            None => Ok(None),
        }
    }

    async fn mark_failed(&self, generation_id: &str, error: &ComputationError) -> Result<()> {
        let dir = self.root.join(constants::FAILED_DIR);
        fs::create_dir_all(&dir).await?;
        let marker = FailureMarker {
            generation: generation_id.to_string(),
            failed_at: Utc::now(),
            table: error.table.clone(),
            row: error.row,
            column: error.column.clone(),
            value: error.value.to_string(),
        };
        let path = dir.join(format!("{}.json", generation_id));
        fs::write(&path, serde_json::to_vec_pretty(&marker)?).await?;
        warn!("Wrote failure marker {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregate::fixtures::{table, Line};
    use crate::pipeline::aggregate::{combined_result, Aggregator, TrendsAggregator, Value};
    use crate::pipeline::report::RunReport;
    use crate::pipeline::storage::export;
    use tempfile::TempDir;

    fn generation(id: &str) -> Generation {
        let combined = table(vec![
            Line { id: "I1", ..Default::default() },
            Line { id: "I2", mall: "M9", region: None, ..Default::default() },
        ]);
        let mut tables = vec![combined_result(&combined)];
        tables.extend(TrendsAggregator.aggregate(&combined));
        Generation {
            id: id.to_string(),
            created_at: Utc::now(),
            summary: Summary::from_combined(&combined),
            tables,
            run: RunReport::new(id, Utc::now()),
            violations: Vec::new(),
        }
    }

    #[test]
    fn test_table_name_from_path() {
        assert_eq!(table_name("tables/daily_sales.csv"), Some("daily_sales"));
        assert_eq!(table_name("summary.json"), None);
    }

    #[tokio::test]
    async fn test_publish_then_load_current() {
        let dir = TempDir::new().unwrap();
        let store = FsResultStore::new(dir.path(), 2, 3);

        assert!(store.load_current().await.unwrap().is_none());
        store.publish(&generation("20240101T000000-aaaaaaaa")).await.unwrap();

        let snap = store.load_current().await.unwrap().unwrap();
        assert_eq!(snap.generation(), "20240101T000000-aaaaaaaa");
        assert_eq!(snap.table("combined_data").unwrap().len(), 2);
        assert!(snap.table("seasonal_trends").is_some());
        assert_eq!(snap.summary().data_overview.unmatched_region_rows, 1);
        assert!(!dir.path().join(".staging/20240101T000000-aaaaaaaa").exists());

        let manifest = store.read_manifest("20240101T000000-aaaaaaaa").await.unwrap();
        assert!(manifest.files.iter().any(|f| f.path == "violations.csv"));
        assert!(manifest.files.iter().any(|f| f.path == "summary_report.txt"));
    }

    #[tokio::test]
    async fn test_tampered_file_fails_checksum() {
        let dir = TempDir::new().unwrap();
        let store = FsResultStore::new(dir.path(), 2, 3);
        store.publish(&generation("g1")).await.unwrap();

        std::fs::write(dir.path().join("generations/g1/tables/seasonal_trends.csv"), "x\n").unwrap();
        let err = store.load_current().await.unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[tokio::test]
    async fn test_prunes_old_generations() {
        let dir = TempDir::new().unwrap();
        let store = FsResultStore::new(dir.path(), 2, 2);
        for id in ["g1", "g2", "g3"] {
            store.publish(&generation(id)).await.unwrap();
        }
        assert_eq!(store.list_generations().await.unwrap(), vec!["g2", "g3"]);
        assert_eq!(store.current_id().await.unwrap().as_deref(), Some("g3"));
    }

    #[tokio::test]
    async fn test_non_finite_value_leaves_current_untouched() {
        let dir = TempDir::new().unwrap();
        let store = FsResultStore::new(dir.path(), 2, 3);
        store.publish(&generation("g1")).await.unwrap();

        let mut bad = generation("g2");
        bad.tables[1].rows[0][1] = crate::pipeline::aggregate::Value::Number(f64::NAN);
        let err = export(&store, bad).await.unwrap_err();

        assert!(matches!(err, PipelineError::Computation(_)));
        assert_eq!(store.current_id().await.unwrap().as_deref(), Some("g1"));
        assert!(dir.path().join("failed/g2.json").exists());
        assert!(!dir.path().join("generations/g2").exists());
    }

    #[tokio::test]
    async fn test_numeric_looking_text_reads_back_as_text() {
        let dir = TempDir::new().unwrap();
        let store = FsResultStore::new(dir.path(), 2, 3);
        let combined = table(vec![Line {
            customer: "007",
            mall: "0042",
            category: "NaN",
            ..Default::default()
        }]);
        let mut g = generation("g1");
        g.tables = vec![combined_result(&combined)];
        store.publish(&g).await.unwrap();

        let manifest = store.read_manifest("g1").await.unwrap();
        let kinds = manifest.files[0].columns.as_ref().unwrap();
        assert_eq!(kinds[0], ColumnKind::Text);
        assert!(manifest.files.iter().skip(1).all(|f| f.columns.is_none()));

        let snap = store.load_current().await.unwrap().unwrap();
        let loaded = snap.table("combined_data").unwrap();
        let at = |c: &str| loaded.column_index(c).unwrap();
        assert_eq!(loaded.rows[0][at("customer_id")], Value::from("007"));
        assert_eq!(loaded.rows[0][at("mall")], Value::from("0042"));
        assert_eq!(loaded.rows[0][at("category")], Value::from("NaN"));
        assert_eq!(loaded.rows[0][at("quantity")], Value::Integer(1));
    }

    #[tokio::test]
    async fn test_failed_publish_removes_staging() {
        let dir = TempDir::new().unwrap();
        let store = FsResultStore::new(dir.path(), 2, 3);
        // A file where the generations directory belongs makes the final move fail
        std::fs::write(dir.path().join(constants::GENERATIONS_DIR), "").unwrap();

        assert!(store.publish(&generation("g1")).await.is_err());
        assert!(!dir.path().join(".staging/g1").exists());
        assert!(store.current_id().await.unwrap().is_none());
    }
}
