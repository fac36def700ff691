//! Bucket access.
//!
//! Notifications name their bucket per record, so the handler does not hold
//! a single store; it asks a [`BucketResolver`] for one by name. Three
//! resolvers exist:
//!
//! * [`S3Buckets`] — AWS S3, credentials and region from the environment
//!   (the Lambda execution role in production).
//! * [`LocalBuckets`] — one directory per bucket, for `ocr-lambda invoke
//!   --local-root` runs.
//! * [`MemoryBuckets`] — in-memory stores, for tests.

use crate::error::OcrLambdaError;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Store path for an S3 key, byte for byte.
///
/// `ObjectPath::from` percent-encodes characters such as `#`, `[` or `%` and
/// collapses `//`, which would address a different S3 object. Keys are
/// parsed verbatim instead, and rejected when the store would still
/// normalise them.
pub fn object_path(key: &str) -> Result<ObjectPath, OcrLambdaError> {
    let unsupported = |detail: String| OcrLambdaError::UnsupportedKey {
        key: key.to_string(),
        detail,
    };
    let path = ObjectPath::parse(key).map_err(|e| unsupported(e.to_string()))?;
    if path.as_ref() != key {
        return Err(unsupported(format!("would be stored as '{}'", path.as_ref())));
    }
    Ok(path)
}

/// Maps a bucket name to an object store rooted at that bucket.
pub trait BucketResolver: Send + Sync {
    fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, OcrLambdaError>;

    /// Whether stores accept a `Content-Type` attribute on put.
    fn supports_content_type(&self) -> bool {
        true
    }
}

type StoreCache = Mutex<HashMap<String, Arc<dyn ObjectStore>>>;

fn cached(
    cache: &StoreCache,
    name: &str,
    open: impl FnOnce() -> Result<Arc<dyn ObjectStore>, OcrLambdaError>,
) -> Result<Arc<dyn ObjectStore>, OcrLambdaError> {
    let mut guard = cache.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(store) = guard.get(name) {
        return Ok(Arc::clone(store));
    }
    let store = open()?;
    guard.insert(name.to_string(), Arc::clone(&store));
    Ok(store)
}

/// S3 buckets, one client per bucket name, reused across invocations.
#[derive(Default)]
pub struct S3Buckets {
    stores: StoreCache,
}

impl S3Buckets {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BucketResolver for S3Buckets {
    fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, OcrLambdaError> {
        cached(&self.stores, name, || {
            debug!("Opening S3 bucket {}", name);
            let s3 = AmazonS3Builder::from_env()
                .with_bucket_name(name)
                .build()
                .map_err(|e| OcrLambdaError::BucketUnavailable {
                    bucket: name.to_string(),
                    detail: e.to_string(),
                })?;
            Ok(Arc::new(s3) as Arc<dyn ObjectStore>)
        })
    }
}

/// Directory-backed buckets: bucket `b` lives in `{root}/b/`.
pub struct LocalBuckets {
    root: PathBuf,
    stores: StoreCache,
}

impl LocalBuckets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stores: StoreCache::default(),
        }
    }
}

impl BucketResolver for LocalBuckets {
    fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, OcrLambdaError> {
        cached(&self.stores, name, || {
            let dir = self.root.join(name);
            std::fs::create_dir_all(&dir)
                .map_err(|e| OcrLambdaError::io("creating bucket directory", &dir, e))?;
            let fs = LocalFileSystem::new_with_prefix(&dir).map_err(|e| {
                OcrLambdaError::BucketUnavailable {
                    bucket: name.to_string(),
                    detail: e.to_string(),
                }
            })?;
            Ok(Arc::new(fs) as Arc<dyn ObjectStore>)
        })
    }

    fn supports_content_type(&self) -> bool {
        false
    }
}

/// In-memory buckets created on first use.
#[derive(Default)]
pub struct MemoryBuckets {
    stores: Mutex<HashMap<String, Arc<InMemory>>>,
}

impl MemoryBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle to a bucket, for seeding and inspecting objects.
    pub fn store(&self, name: &str) -> Arc<InMemory> {
        let mut guard = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            guard
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(InMemory::new())),
        )
    }
}

impl BucketResolver for MemoryBuckets {
    fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, OcrLambdaError> {
        Ok(self.store(name) as Arc<dyn ObjectStore>)
    }
}
