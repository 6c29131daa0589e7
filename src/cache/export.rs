use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::cache::store::{CacheStore, StoreError};
use crate::cache::versioning::{ExportIndex, ExportManifest, STORE_FORMAT_VERSION};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),
    #[error("Output directory already exists: {0}")]
    OutputExists(PathBuf),
    #[error("Filename collision detected for hash fragment: {0}")]
    FilenameCollision(String),
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub root: PathBuf,
    pub manifest: ExportManifest,
    pub index: ExportIndex,
}

/// Dump every entry of `store` into a fresh directory.
///
/// ```text
/// <output>/manifest.json
/// <output>/index.json          key -> entries/<stem>.json
/// <output>/entries/<stem>.json
/// ```
/// The directory is assembled next to `output_dir` and renamed into place, so
/// a failed export leaves nothing behind.
pub fn export_store(store: &dyn CacheStore, output_dir: &Path) -> Result<ExportSummary, ExportError> {
    if output_dir.exists() {
        return Err(ExportError::OutputExists(output_dir.to_path_buf()));
    }

    let entries = store.entries()?;

    let mut index_entries = BTreeMap::new();
    let mut seen_stems = BTreeSet::new();
    let mut files = Vec::with_capacity(entries.len());

    for entry in &entries {
        let stem = entry.key.file_stem();
        if !seen_stems.insert(stem.clone()) {
            return Err(ExportError::FilenameCollision(stem));
        }
        let relative_path = format!("entries/{stem}.json");
        index_entries.insert(entry.key.clone(), relative_path.clone());
        files.push((entry, relative_path));
    }

    let manifest = ExportManifest {
        format_version: STORE_FORMAT_VERSION.into(),
        source: store.location(),
        exported_at: Utc::now(),
        entry_count: entries.len(),
    };
    let index = ExportIndex::new(index_entries);

    let temp_dir = output_dir.with_extension(format!("tmp.{}", std::process::id()));
    if temp_dir.exists() {
        fs::remove_dir_all(&temp_dir)?;
    }
    fs::create_dir_all(temp_dir.join("entries"))?;

    for (entry, relative_path) in files {
        let f = fs::File::create(temp_dir.join(relative_path))?;
        serde_json::to_writer_pretty(&f, entry)?;
        f.sync_all()?;
    }

    // BTreeMap keeps index keys sorted
    let f_idx = fs::File::create(temp_dir.join("index.json"))?;
    serde_json::to_writer_pretty(&f_idx, &index)?;
    f_idx.sync_all()?;

    let f_man = fs::File::create(temp_dir.join("manifest.json"))?;
    serde_json::to_writer_pretty(&f_man, &manifest)?;
    f_man.sync_all()?;

    fs::rename(&temp_dir, output_dir)?;

    info!(
        source = %manifest.source,
        output = %output_dir.display(),
        entries = manifest.entry_count,
        "exported cache tier"
    );

    Ok(ExportSummary {
        root: output_dir.to_path_buf(),
        manifest,
        index,
    })
}
