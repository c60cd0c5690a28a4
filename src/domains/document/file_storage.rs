use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum FileStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("File already exists: {0}")]
    AlreadyExists(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid path component: {0}")]
    InvalidPathComponent(String),
}

pub type FileStorageResult<T> = Result<T, FileStorageError>;

/// Top-level storage areas under the storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    Originals,
    Documents,
    Thumbnails,
    Exports,
}

impl StorageArea {
    pub fn dir_name(&self) -> &'static str {
        match self {
            StorageArea::Originals => "originals",
            StorageArea::Documents => "documents",
            StorageArea::Thumbnails => "thumbnails",
            StorageArea::Exports => "exports",
        }
    }
}

/// Service trait for abstracting file storage operations
#[async_trait]
pub trait FileStorageService: Send + Sync {
    /// Create the storage areas if missing. Idempotent.
    async fn ensure_layout(&self) -> FileStorageResult<()>;

    /// Write a new file into `area`, returning its relative path.
    /// Never overwrites an existing file.
    async fn write_new_file(&self, area: StorageArea, filename: &str, data: &[u8]) -> FileStorageResult<String>;

    /// Delete a file by relative path. A file that is already gone counts as deleted.
    async fn delete_file(&self, relative_path: &str) -> FileStorageResult<()>;

    async fn get_file_data(&self, relative_path: &str) -> FileStorageResult<Vec<u8>>;

    async fn file_exists(&self, relative_path: &str) -> bool;

    /// Get the full absolute path for a given relative path
    fn get_absolute_path(&self, relative_path: &str) -> PathBuf;

    fn area_path(&self, area: StorageArea) -> PathBuf;
}

// --- Local File Storage Implementation ---

pub struct LocalFileStorageService {
    base_path: PathBuf,
}

impl LocalFileStorageService {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Sanitizes a path component to prevent directory traversal issues.
    fn sanitize_component(component: &str) -> FileStorageResult<&str> {
        if component.is_empty()
            || component.contains('/')
            || component.contains('\\')
            || component == "."
            || component == ".."
        {
            Err(FileStorageError::InvalidPathComponent(component.to_string()))
        } else {
            Ok(component)
        }
    }

    fn checked_path(&self, relative_path: &str) -> FileStorageResult<PathBuf> {
        let absolute_path = self.get_absolute_path(relative_path);
        if absolute_path == self.base_path || !absolute_path.starts_with(&self.base_path) {
            return Err(FileStorageError::PermissionDenied(format!(
                "Path outside storage root: {}",
                relative_path
            )));
        }
        Ok(absolute_path)
    }
}

#[async_trait]
impl FileStorageService for LocalFileStorageService {
    async fn ensure_layout(&self) -> FileStorageResult<()> {
        for area in [
            StorageArea::Originals,
            StorageArea::Documents,
            StorageArea::Thumbnails,
            StorageArea::Exports,
        ] {
            fs::create_dir_all(self.area_path(area)).await?;
        }
        Ok(())
    }

    async fn write_new_file(&self, area: StorageArea, filename: &str, data: &[u8]) -> FileStorageResult<String> {
        let filename = Self::sanitize_component(filename)?;
        let relative_path = format!("{}/{}", area.dir_name(), filename);
        let absolute_path = self.checked_path(&relative_path)?;

        fs::create_dir_all(self.area_path(area)).await?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&absolute_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(FileStorageError::AlreadyExists(relative_path));
            }
            Err(e) => return Err(FileStorageError::Io(e)),
        };

        let written = async {
            file.write_all(data).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            // Leave no truncated file behind.
            let _ = fs::remove_file(&absolute_path).await;
            return Err(FileStorageError::Io(e));
        }

        Ok(relative_path)
    }

    async fn delete_file(&self, relative_path: &str) -> FileStorageResult<()> {
        let absolute_path = self.checked_path(relative_path)?;

        match fs::remove_file(&absolute_path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileStorageError::Io(e)),
        }
    }

    async fn get_file_data(&self, relative_path: &str) -> FileStorageResult<Vec<u8>> {
        let absolute_path = self.checked_path(relative_path)?;

        match fs::read(&absolute_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FileStorageError::NotFound(relative_path.to_string())),
            Err(e) => Err(FileStorageError::Io(e)),
        }
    }

    async fn file_exists(&self, relative_path: &str) -> bool {
        match self.checked_path(relative_path) {
            Ok(path) => fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false),
            Err(_) => false,
        }
    }

    fn get_absolute_path(&self, relative_path: &str) -> PathBuf {
        // Only normal components are kept, so ".." and absolute prefixes cannot escape the root.
        let mut abs_path = self.base_path.clone();
        for component in Path::new(relative_path).components() {
            if let Component::Normal(part) = component {
                abs_path.push(part);
            }
        }
        abs_path
    }

    fn area_path(&self, area: StorageArea) -> PathBuf {
        self.base_path.join(area.dir_name())
    }
}
