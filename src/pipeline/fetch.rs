//! Download a source object and fingerprint it.

use crate::error::OcrLambdaError;
use crate::storage::object_path;
use object_store::ObjectStore;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Raw bytes of a source document plus their SHA-256.
#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub bytes: Vec<u8>,
    /// Lowercase hex digest of `bytes`.
    pub sha256: String,
}

impl FetchedObject {
    pub fn new(bytes: Vec<u8>) -> Self {
        let sha256 = sha256_hex(&bytes);
        Self { bytes, sha256 }
    }

    /// Whether the content carries the `%PDF` magic.
    pub fn looks_like_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF")
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Download `key` from `store` in full.
///
/// `uri` is only used for error messages and logs.
pub async fn download(
    store: &dyn ObjectStore,
    key: &str,
    uri: &str,
) -> Result<FetchedObject, OcrLambdaError> {
    let map_err = |source| OcrLambdaError::DownloadFailed {
        uri: uri.to_string(),
        source,
    };
    let location = object_path(key)?;
    let bytes = store
        .get(&location)
        .await
        .map_err(map_err)?
        .bytes()
        .await
        .map_err(map_err)?;

    let fetched = FetchedObject::new(bytes.to_vec());
    debug!("Downloaded {} ({} bytes, sha256 {})", uri, fetched.bytes.len(), fetched.sha256);
    if !fetched.looks_like_pdf() {
        warn!("{} does not start with %PDF; passing it to Docling anyway", uri);
    }
    Ok(fetched)
}
