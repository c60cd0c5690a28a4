use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domains::export::types::DownloadCapability;
use crate::errors::{DomainError, DomainResult};

type HmacSha256 = Hmac<Sha256>;

/// Issues and checks signed, expiring download capabilities.
///
/// The signature is `hex(HMAC-SHA256(key, filename || expires_at))` with
/// `expires_at` in decimal unix seconds. No state is kept; a capability is
/// valid exactly when its signature matches and it has not expired.
#[derive(Clone)]
pub struct CapabilitySigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for CapabilitySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySigner").finish_non_exhaustive()
    }
}

impl CapabilitySigner {
    pub fn new(key: impl AsRef<[u8]>) -> DomainResult<Self> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(DomainError::Configuration("Signing key must not be empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| DomainError::Configuration(format!("Invalid signing key: {}", e)))?;
        Ok(Self { mac })
    }

    pub fn sign(&self, filename: &str, expires_at: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(filename.as_bytes());
        mac.update(expires_at.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn issue_at(&self, filename: &str, ttl: Duration, now: DateTime<Utc>) -> DownloadCapability {
        // A TTL past the representable range saturates.
        let expires_at = now
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .timestamp();
        DownloadCapability {
            filename: filename.to_string(),
            expires_at,
            signature: self.sign(filename, expires_at),
        }
    }

    pub fn issue(&self, filename: &str, ttl: Duration) -> DownloadCapability {
        self.issue_at(filename, ttl, Utc::now())
    }

    pub fn validate_at(&self, filename: &str, expires_at: i64, signature: &str, now: DateTime<Utc>) -> bool {
        let expected = self.sign(filename, expires_at);
        let matches: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();
        matches && now.timestamp() <= expires_at
    }

    pub fn validate(&self, filename: &str, expires_at: i64, signature: &str) -> bool {
        self.validate_at(filename, expires_at, signature, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FILE: &str = "2024-01-05_export_documents_1700000000.zip";

    fn signer() -> CapabilitySigner {
        CapabilitySigner::new("base64:test-key").unwrap()
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let capability = signer().issue_at(FILE, Duration::hours(6), now);
        assert_eq!(capability.expires_at, 1_700_021_600);

        let at_expiry = Utc.timestamp_opt(capability.expires_at, 0).unwrap();
        assert!(signer().validate_at(FILE, capability.expires_at, &capability.signature, at_expiry));
        assert!(!signer().validate_at(
            FILE,
            capability.expires_at,
            &capability.signature,
            at_expiry + Duration::seconds(1)
        ));
    }

    #[test]
    fn test_tampering_is_rejected() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let capability = signer().issue_at(FILE, Duration::hours(6), now);

        assert!(!signer().validate_at("2024-01-05_export_1700000000.zip", capability.expires_at, &capability.signature, now));
        assert!(!signer().validate_at(FILE, capability.expires_at + 3600, &capability.signature, now));
        assert!(!signer().validate_at(FILE, capability.expires_at, "deadbeef", now));

        let other = CapabilitySigner::new("another-key").unwrap();
        assert!(!other.validate_at(FILE, capability.expires_at, &capability.signature, now));
    }

    #[test]
    fn test_signature_is_hex_hmac_of_name_and_expiry() {
        let signature = signer().sign(FILE, 1_700_021_600);
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(signature, signer().sign(FILE, 1_700_021_600));
    }

    #[test]
    fn test_oversized_ttl_saturates() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let capability = signer().issue_at(FILE, Duration::max_value(), now);
        assert_eq!(capability.expires_at, DateTime::<Utc>::MAX_UTC.timestamp());
        assert!(signer().validate_at(FILE, capability.expires_at, &capability.signature, now));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        assert!(matches!(CapabilitySigner::new(""), Err(DomainError::Configuration(_))));
    }
}
