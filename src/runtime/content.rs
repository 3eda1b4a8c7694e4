// src/runtime/content.rs
//! Quota-guarded side effects
//!
//! File writes and asset uploads leave the session through
//! [`ContentGateway`], which checks the session's quota before calling the
//! content store. The store itself is an external collaborator; any retry
//! policy lives there.

use crate::exception::{ExceptionKey, ExceptionRecord};
use crate::protocol::message::DetailKey;
use crate::runtime::quota::{QuotaClass, ResourceQuotaGuard};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Content store failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store rejected request: {0}")]
    Rejected(String),

    #[error("store is out of space: {0}")]
    OutOfSpace(String),
}

/// Asset/content store contract
pub trait ContentStore: Send + Sync {
    /// Persist `bytes` and return a URL for them
    fn put(
        &self,
        session_id: &str,
        filename: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError>;

    /// Return a URL the client may upload `filename` to before `ttl` expires
    fn presign_upload(
        &self,
        session_id: &str,
        filename: &str,
        ttl: Duration,
    ) -> Result<String, StoreError>;
}

/// Content store backed by a local directory
pub struct LocalContentStore {
    base_dir: PathBuf,
}

impl LocalContentStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        let dir = self.base_dir.join(session_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl ContentStore for LocalContentStore {
    fn put(
        &self,
        session_id: &str,
        filename: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError> {
        let path = self.session_dir(session_id)?.join(filename);
        std::fs::write(&path, bytes)?;

        debug!(
            session_id,
            path = %path.display(),
            bytes = bytes.len(),
            content_type,
            "stored content"
        );
        Ok(format!("file://{}", path.display()))
    }

    fn presign_upload(
        &self,
        session_id: &str,
        filename: &str,
        ttl: Duration,
    ) -> Result<String, StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Rejected(format!("invalid ttl: {}", e)))?;
        let expires = Utc::now() + ttl;
        let path = self.session_dir(session_id)?.join(filename);

        Ok(format!("file://{}?expires={}", path.display(), expires.timestamp()))
    }
}

/// Session-scoped gateway for side-effecting operations
#[derive(Clone)]
pub struct ContentGateway {
    session_id: String,
    quotas: Arc<ResourceQuotaGuard>,
    store: Arc<dyn ContentStore>,
    upload_ttl: Duration,
}

impl ContentGateway {
    pub fn new(
        session_id: impl Into<String>,
        quotas: Arc<ResourceQuotaGuard>,
        store: Arc<dyn ContentStore>,
        upload_ttl: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            quotas,
            store,
            upload_ttl,
        }
    }

    /// Write a file produced by the hosted program
    pub fn write_file(
        &self,
        filename: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> anyhow::Result<String> {
        validate_filename(filename)?;
        self.quotas.try_consume(QuotaClass::FileWrite)?;

        let url = self
            .store
            .put(&self.session_id, filename, bytes, content_type)
            .map_err(|e| store_failure(e, filename))?;

        info!(session_id = %self.session_id, filename, "file written");
        Ok(url)
    }

    /// Presign an asset upload
    pub fn generate_upload_url(&self, filename: &str) -> anyhow::Result<String> {
        validate_filename(filename)?;
        self.quotas.try_consume(QuotaClass::AssetUpload)?;

        let url = self
            .store
            .presign_upload(&self.session_id, filename, self.upload_ttl)
            .map_err(|e| store_failure(e, filename))?;

        debug!(session_id = %self.session_id, filename, "upload url issued");
        Ok(url)
    }
}

fn validate_filename(filename: &str) -> Result<(), ExceptionRecord> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);

    if invalid {
        return Err(ExceptionRecord::user(ExceptionKey::InvalidFileName)
            .with_detail(DetailKey::FileName, filename));
    }
    Ok(())
}

fn store_failure(err: StoreError, filename: &str) -> ExceptionRecord {
    let record = match err {
        StoreError::OutOfSpace(_) => ExceptionRecord::fatal(ExceptionKey::LowDiskSpace),
        _ => ExceptionRecord::internal(ExceptionKey::ContentStoreFailure),
    };
    record
        .with_detail(DetailKey::FileName, filename)
        .with_cause(err)
        .raised_by_host()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ErrorKind;
    use crate::runtime::quota::QuotaLimits;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        puts: Mutex<Vec<String>>,
        presigns: Mutex<Vec<String>>,
    }

    impl ContentStore for RecordingStore {
        fn put(&self, _: &str, filename: &str, _: &[u8], _: &str) -> Result<String, StoreError> {
            self.puts.lock().push(filename.to_string());
            Ok(format!("mem://{}", filename))
        }

        fn presign_upload(&self, _: &str, filename: &str, _: Duration) -> Result<String, StoreError> {
            self.presigns.lock().push(filename.to_string());
            Ok(format!("mem://upload/{}", filename))
        }
    }

    struct FullStore;

    impl ContentStore for FullStore {
        fn put(&self, _: &str, _: &str, _: &[u8], _: &str) -> Result<String, StoreError> {
            Err(StoreError::OutOfSpace("0 bytes free".into()))
        }

        fn presign_upload(&self, _: &str, _: &str, _: Duration) -> Result<String, StoreError> {
            Err(StoreError::Rejected("nope".into()))
        }
    }

    fn gateway(store: Arc<dyn ContentStore>) -> ContentGateway {
        ContentGateway::new(
            "session",
            Arc::new(ResourceQuotaGuard::new(&QuotaLimits::default())),
            store,
            Duration::from_secs(60),
        )
    }

    fn key_of(err: anyhow::Error) -> ExceptionKey {
        err.downcast::<ExceptionRecord>().unwrap().key()
    }

    #[test]
    fn test_third_write_rejected_before_store() {
        let store = Arc::new(RecordingStore::default());
        let gateway = gateway(store.clone());

        gateway.write_file("scene.gif", b"GIF89a", "image/gif").unwrap();
        gateway.write_file("scene.wav", b"RIFF", "audio/wav").unwrap();
        let err = gateway.write_file("extra.wav", b"RIFF", "audio/wav").unwrap_err();

        assert_eq!(key_of(err), ExceptionKey::TooManyWrites);
        assert_eq!(*store.puts.lock(), vec!["scene.gif", "scene.wav"]);
    }

    #[test]
    fn test_upload_quota() {
        let store = Arc::new(RecordingStore::default());
        let gateway = gateway(store.clone());

        for i in 0..20 {
            gateway.generate_upload_url(&format!("asset{}.png", i)).unwrap();
        }
        let err = gateway.generate_upload_url("asset20.png").unwrap_err();
        assert_eq!(key_of(err), ExceptionKey::TooManyUploads);
        assert_eq!(store.presigns.lock().len(), 20);
    }

    #[test]
    fn test_invalid_filename_does_not_consume_quota() {
        let gateway = gateway(Arc::new(RecordingStore::default()));

        for name in ["", "..", "../etc/passwd", "a\\b"] {
            let err = gateway.write_file(name, b"", "text/plain").unwrap_err();
            assert_eq!(key_of(err), ExceptionKey::InvalidFileName);
        }
        assert_eq!(gateway.quotas.snapshot(QuotaClass::FileWrite).counter(), 0);
    }

    #[test]
    fn test_store_failures_classified() {
        let gateway = gateway(Arc::new(FullStore));

        let err = gateway.write_file("a.txt", b"x", "text/plain").unwrap_err();
        let record = err.downcast::<ExceptionRecord>().unwrap();
        assert_eq!(record.kind(), ErrorKind::Fatal);
        assert_eq!(record.key(), ExceptionKey::LowDiskSpace);

        let err = gateway.generate_upload_url("b.png").unwrap_err();
        let record = err.downcast::<ExceptionRecord>().unwrap();
        assert_eq!(record.kind(), ErrorKind::InternalServer);
    }

    #[test]
    fn test_local_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalContentStore::new(dir.path());

        let url = store.put("s1", "out.txt", b"hello", "text/plain").unwrap();
        assert!(url.starts_with("file://"));
        assert_eq!(std::fs::read(dir.path().join("s1").join("out.txt")).unwrap(), b"hello");

        let upload = store.presign_upload("s1", "in.png", Duration::from_secs(30)).unwrap();
        assert!(upload.contains("expires="));
    }
}
