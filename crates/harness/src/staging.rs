//! Packing per-dataset input folders into archives the worker container accepts

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::error::Result;

/// One kind of input data and how it is shipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataCategory {
    /// Folder name under `{data_dir}/{dataset}/`
    pub folder: &'static str,
    /// Data set type the ingestion job reports
    pub dataset_type: &'static str,
    pub extensions: &'static [&'static str],
    /// Files are zipped into `{folder}.zip` before being tarred
    pub zipped: bool,
}

/// Categories in push order
pub const DATA_CATEGORIES: [DataCategory; 5] = [
    DataCategory {
        folder: "fusio",
        dataset_type: "fusio",
        extensions: &[".txt", ".csv"],
        zipped: true,
    },
    DataCategory {
        folder: "osm",
        dataset_type: "osm",
        extensions: &[".pbf"],
        zipped: false,
    },
    DataCategory {
        folder: "fusio-poi",
        dataset_type: "poi",
        extensions: &[".txt"],
        zipped: true,
    },
    DataCategory {
        folder: "geopal",
        dataset_type: "geopal",
        extensions: &[".txt"],
        zipped: true,
    },
    DataCategory {
        folder: "fusio-geopal",
        dataset_type: "geopal",
        extensions: &[".txt"],
        zipped: true,
    },
];

/// Tar archive ready to be pushed into the worker container
#[derive(Debug, Clone)]
pub struct StagedArchive {
    pub category: DataCategory,
    pub tar_name: String,
    /// Entry names inside the tar
    pub entries: Vec<String>,
    pub bytes: Vec<u8>,
}

/// Stage every category present under `{data_dir}/{dataset}`.
pub fn stage_dataset(data_dir: &Path, dataset: &str) -> Result<Vec<StagedArchive>> {
    let root = data_dir.join(dataset);
    let mut staged = Vec::new();
    for category in DATA_CATEGORIES {
        if let Some(archive) = stage_category(&root, category)? {
            staged.push(archive);
        }
    }
    Ok(staged)
}

/// Archive one category folder; `None` when the folder does not exist.
pub fn stage_category(dataset_dir: &Path, category: DataCategory) -> Result<Option<StagedArchive>> {
    let folder = dataset_dir.join(category.folder);
    if !folder.is_dir() {
        warn!("{} path does not exist: {}", category.folder, folder.display());
        return Ok(None);
    }
    info!("Putting {} data: {}", category.folder, folder.display());

    let files = matching_files(&folder, category.extensions)?;
    let mut entries = Vec::new();
    let mut tar = tar::Builder::new(Vec::new());

    if category.zipped {
        let name = format!("{}.zip", category.folder);
        let zipped = zip_files(&files)?;
        append(&mut tar, &name, &zipped)?;
        entries.push(name);
    } else {
        for path in &files {
            let name = file_name(path);
            let data = std::fs::read(path)?;
            append(&mut tar, &name, &data)?;
            entries.push(name);
        }
    }

    Ok(Some(StagedArchive {
        category,
        tar_name: format!("{}.tar", category.folder),
        entries,
        bytes: tar.into_inner()?,
    }))
}

/// Regular files directly under `folder` with one of `extensions`, by name
fn matching_files(folder: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if extensions.iter().any(|ext| name.ends_with(ext)) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn zip_files(files: &[PathBuf]) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for path in files {
        writer.start_file(file_name(path), options)?;
        writer.write_all(&std::fs::read(path)?)?;
    }
    Ok(writer.finish()?.into_inner())
}

fn append(tar: &mut tar::Builder<Vec<u8>>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    tar.append_data(&mut header, name, data)?;
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
