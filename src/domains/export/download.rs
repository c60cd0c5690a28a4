use serde::Deserialize;
use tokio::fs::File;

use crate::domains::export::lifecycle::ExportLifecycle;
use crate::errors::{DomainError, DomainResult};
use crate::utils::content_type_for;

/// Query parameters of the download endpoint, as received.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRequest {
    pub name: String,
    pub expires: String,
    pub signature: String,
}

/// An opened artifact plus the headers to send with it.
#[derive(Debug)]
pub struct DownloadResponse {
    pub file: File,
    pub filename: String,
    pub content_type: String,
    pub content_disposition: String,
    pub content_length: u64,
}

/// Check the capability, then open the artifact it grants.
pub async fn open_download(lifecycle: &ExportLifecycle, request: &DownloadRequest) -> DomainResult<DownloadResponse> {
    let expires_at = request
        .expires
        .trim()
        .parse::<i64>()
        .map_err(|_| DomainError::CapabilityInvalid)?;

    if !lifecycle.validate_capability(&request.name, expires_at, &request.signature) {
        log::warn!("Rejected download of {}: invalid or expired signature", request.name);
        return Err(DomainError::CapabilityInvalid);
    }

    let path = lifecycle.resolve_artifact(&request.name)?;
    let file = File::open(&path)
        .await
        .map_err(|e| DomainError::Internal(format!("Failed to open {}: {}", path.display(), e)))?;
    let content_length = file
        .metadata()
        .await
        .map_err(|e| DomainError::Internal(format!("Failed to stat {}: {}", path.display(), e)))?
        .len();

    log::info!("Serving export {} ({} bytes)", request.name, content_length);
    Ok(DownloadResponse {
        file,
        content_type: content_type_for(&request.name).to_string(),
        content_disposition: format!("attachment; filename=\"{}\"", request.name),
        filename: request.name.clone(),
        content_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::export::capability::CapabilitySigner;
    use crate::domains::export::types::ExportConfig;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    const NAME: &str = "2024-01-05_export_documents_1700000000.tar.gz";

    fn lifecycle(dir: &TempDir) -> ExportLifecycle {
        let signer = CapabilitySigner::new("download-test-key").unwrap();
        ExportLifecycle::new(dir.path(), signer, ExportConfig::default())
    }

    fn request(lifecycle: &ExportLifecycle, name: &str) -> DownloadRequest {
        let capability = lifecycle.issue_capability(name);
        DownloadRequest {
            name: capability.filename,
            expires: capability.expires_at.to_string(),
            signature: capability.signature,
        }
    }

    #[tokio::test]
    async fn test_valid_capability_opens_artifact() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(NAME), b"archive").unwrap();
        let lifecycle = lifecycle(&dir);

        let mut response = open_download(&lifecycle, &request(&lifecycle, NAME)).await.unwrap();
        assert_eq!(response.content_type, "application/gzip");
        assert_eq!(response.content_disposition, format!("attachment; filename=\"{}\"", NAME));
        assert_eq!(response.content_length, 7);

        let mut body = Vec::new();
        response.file.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"archive");
    }

    #[tokio::test]
    async fn test_bad_signature_and_expiry_are_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(NAME), b"archive").unwrap();
        let lifecycle = lifecycle(&dir);

        let mut tampered = request(&lifecycle, NAME);
        tampered.signature = "0".repeat(64);
        assert!(matches!(
            open_download(&lifecycle, &tampered).await,
            Err(DomainError::CapabilityInvalid)
        ));

        let mut garbage = request(&lifecycle, NAME);
        garbage.expires = "tomorrow".to_string();
        assert!(matches!(
            open_download(&lifecycle, &garbage).await,
            Err(DomainError::CapabilityInvalid)
        ));

        let past = (Utc::now() - Duration::minutes(1)).timestamp();
        let signer = CapabilitySigner::new("download-test-key").unwrap();
        let expired = DownloadRequest {
            name: NAME.to_string(),
            expires: past.to_string(),
            signature: signer.sign(NAME, past),
        };
        assert!(matches!(
            open_download(&lifecycle, &expired).await,
            Err(DomainError::CapabilityInvalid)
        ));
    }

    #[tokio::test]
    async fn test_signed_but_missing_artifact_is_not_found() {
        let dir = TempDir::new().unwrap();
        let lifecycle = lifecycle(&dir);

        let result = open_download(&lifecycle, &request(&lifecycle, NAME)).await;
        assert!(matches!(result, Err(DomainError::NotFound(..))));

        // A validly signed name outside the artifact pattern is never served.
        std::fs::write(dir.path().join("secrets.txt"), b"x").unwrap();
        let result = open_download(&lifecycle, &request(&lifecycle, "secrets.txt")).await;
        assert!(matches!(result, Err(DomainError::NotFound(..))));
    }
}
