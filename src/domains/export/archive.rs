use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::domains::export::types::ArchiveFormat;
use crate::errors::{DomainError, DomainResult};

pub const CSV_ENTRY_NAME: &str = "export.csv";
pub const DOCUMENTS_ENTRY_DIR: &str = "documents";

fn archive_error(context: &str, e: impl std::fmt::Display) -> DomainError {
    DomainError::ArchiveFailure(format!("{}: {}", context, e))
}

/// Every regular file under `root` as `(absolute path, archive entry name)`, sorted.
fn document_entries(root: &Path) -> DomainResult<Vec<(PathBuf, String)>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| archive_error("Failed to walk documents", e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| archive_error("Invalid document path", e))?;
        let mut name = String::from(DOCUMENTS_ENTRY_DIR);
        for component in relative.components() {
            name.push('/');
            name.push_str(&component.as_os_str().to_string_lossy());
        }
        entries.push((entry.path().to_path_buf(), name));
    }
    Ok(entries)
}

/// Temporary sibling of `target`, removed on drop unless persisted.
fn sibling_temp(target: &Path, suffix: &str) -> DomainResult<NamedTempFile> {
    let dir = target
        .parent()
        .ok_or_else(|| DomainError::ArchiveFailure(format!("Invalid archive target: {}", target.display())))?;
    tempfile::Builder::new()
        .prefix(".export-")
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| archive_error("Failed to create temporary archive", e))
}

fn write_zip(file: &mut File, csv_path: &Path, documents: &[(PathBuf, String)]) -> DomainResult<()> {
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut add_file = |path: &Path, name: &str| -> DomainResult<()> {
        zip.start_file(name, options)
            .map_err(|e| archive_error("Failed to add zip entry", e))?;
        let mut source = File::open(path).map_err(|e| archive_error("Failed to open archive input", e))?;
        io::copy(&mut source, &mut zip).map_err(|e| archive_error("Failed to write zip entry", e))?;
        Ok(())
    };

    add_file(csv_path, CSV_ENTRY_NAME)?;
    for (path, name) in documents {
        add_file(path, name)?;
    }

    zip.finish().map_err(|e| archive_error("Failed to finish zip", e))?;
    Ok(())
}

fn write_tar(file: &mut File, csv_path: &Path, documents: &[(PathBuf, String)]) -> DomainResult<()> {
    let mut builder = tar::Builder::new(file);
    builder
        .append_path_with_name(csv_path, CSV_ENTRY_NAME)
        .map_err(|e| archive_error("Failed to add tar entry", e))?;
    for (path, name) in documents {
        builder
            .append_path_with_name(path, name)
            .map_err(|e| archive_error("Failed to add tar entry", e))?;
    }
    builder.finish().map_err(|e| archive_error("Failed to finish tar", e))?;
    Ok(())
}

/// Build an archive holding `export.csv` and, if given, every file under
/// `documents_root` as `documents/<relative path>`.
///
/// The archive is written next to `target` and renamed over it on success, so a
/// failed build leaves nothing under the final name.
pub fn build(
    csv_path: &Path,
    documents_root: Option<&Path>,
    format: ArchiveFormat,
    target: &Path,
) -> DomainResult<PathBuf> {
    let documents = match documents_root {
        Some(root) if root.is_dir() => document_entries(root)?,
        _ => Vec::new(),
    };

    let finished = match format {
        ArchiveFormat::Zip => {
            let mut temp = sibling_temp(target, ".zip.part")?;
            write_zip(temp.as_file_mut(), csv_path, &documents)?;
            temp
        }
        ArchiveFormat::TarGz => {
            // Plain tar first; dropped (and deleted) once it has been compressed.
            let mut tar_file = sibling_temp(target, ".tar.part")?;
            write_tar(tar_file.as_file_mut(), csv_path, &documents)?;

            let gz_file = sibling_temp(target, ".tar.gz.part")?;
            let mut encoder = GzEncoder::new(gz_file, Compression::default());
            let source = tar_file.as_file_mut();
            source
                .seek(SeekFrom::Start(0))
                .map_err(|e| archive_error("Failed to rewind tar", e))?;
            io::copy(source, &mut encoder).map_err(|e| archive_error("Failed to compress tar", e))?;
            let mut gz_file = encoder.finish().map_err(|e| archive_error("Failed to finish gzip", e))?;
            gz_file.flush().map_err(|e| archive_error("Failed to flush gzip", e))?;
            gz_file
        }
    };

    finished
        .persist(target)
        .map_err(|e| archive_error("Failed to move archive into place", e.error))?;

    log::info!(
        "Built {} archive {} with {} document(s)",
        format,
        target.display(),
        documents.len()
    );
    Ok(target.to_path_buf())
}
