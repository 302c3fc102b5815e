//! Uniform content-addressed storage (§4.1): an object store (GCS) in
//! production, a local filesystem in development and tests, behind one
//! [`context_core::Storage`] implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use context_core::{BlobMeta, EngineError, EngineResult, Storage};
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};

/// `STORAGE_BACKEND` values (§6 configuration surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Local,
    Gcs,
}

impl Backend {
    fn from_env() -> Self {
        match std::env::var("STORAGE_BACKEND").ok().as_deref() {
            Some("gcs") => Self::Gcs,
            _ => Self::Local,
        }
    }
}

/// The [`Storage`] implementation used everywhere above this crate. Holds an
/// `object_store` handle plus whatever conventions (cache-control header,
/// content-type) callers pass explicitly — the gateway itself is a thin,
/// honest wrapper, not a policy layer.
pub struct ObjectStoreGateway {
    store: Arc<dyn ObjectStore>,
    backend: Backend,
}

impl ObjectStoreGateway {
    /// Builds a gateway from the environment: `STORAGE_BACKEND`,
    /// `GCS_BUCKET_NAME`, `LOCAL_STORAGE_ROOT`.
    pub fn from_env() -> EngineResult<Self> {
        match Backend::from_env() {
            Backend::Local => {
                let root = std::env::var("LOCAL_STORAGE_ROOT").unwrap_or_else(|_| "./storage".to_string());
                std::fs::create_dir_all(&root)
                    .map_err(|e| EngineError::storage(format!("creating local storage root {root}: {e}")))?;
                let store = LocalFileSystem::new_with_prefix(&root)
                    .map_err(|e| EngineError::storage(format!("opening local storage root {root}: {e}")))?;
                Ok(Self { store: Arc::new(store), backend: Backend::Local })
            }
            Backend::Gcs => {
                let bucket = std::env::var("GCS_BUCKET_NAME")
                    .map_err(|_| EngineError::config("GCS_BUCKET_NAME is required when STORAGE_BACKEND=gcs"))?;
                let store = GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket)
                    .build()
                    .map_err(|e| EngineError::storage(format!("opening GCS bucket: {e}")))?;
                Ok(Self { store: Arc::new(store), backend: Backend::Gcs })
            }
        }
    }

    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        Self { store, backend: Backend::Local }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

fn object_path(path: &str) -> EngineResult<ObjectPath> {
    ObjectPath::parse(path).map_err(|e| EngineError::config(format!("illegal storage path {path:?}: {e}")))
}

#[async_trait]
impl Storage for ObjectStoreGateway {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: Option<&str>,
    ) -> EngineResult<()> {
        let p = object_path(path)?;
        let mut attrs = object_store::Attributes::new();
        attrs.insert(object_store::Attribute::ContentType, content_type.to_string().into());
        if let Some(cc) = cache_control {
            attrs.insert(object_store::Attribute::CacheControl, cc.to_string().into());
        }
        let opts = PutOptions { attributes: attrs, ..Default::default() };
        self.store
            .put_opts(&p, PutPayload::from(bytes), opts)
            .await
            .map_err(|e| EngineError::storage(format!("put {path}: {e}")))?;
        Ok(())
    }

    async fn put_if_absent(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> EngineResult<bool> {
        let p = object_path(path)?;
        let mut attrs = object_store::Attributes::new();
        attrs.insert(object_store::Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions { mode: PutMode::Create, attributes: attrs, ..Default::default() };
        match self.store.put_opts(&p, PutPayload::from(bytes), opts).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(EngineError::storage(format!("put_if_absent {path}: {e}"))),
        }
    }

    async fn get(&self, path: &str) -> EngineResult<Option<Vec<u8>>> {
        let p = object_path(path)?;
        match self.store.get(&p).await {
            Ok(result) => {
                let bytes = result
                    .bytes()
                    .await
                    .map_err(|e| EngineError::storage(format!("reading {path}: {e}")))?;
                Ok(Some(bytes.to_vec()))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(EngineError::storage(format!("get {path}: {e}"))),
        }
    }

    async fn list(&self, prefix: &str) -> EngineResult<Vec<BlobMeta>> {
        use futures::StreamExt;

        let p = if prefix.is_empty() { None } else { Some(object_path(prefix)?) };
        let mut stream = self.store.list(p.as_ref());
        let mut out = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta.map_err(|e| EngineError::storage(format!("list {prefix}: {e}")))?;
            out.push(BlobMeta { path: meta.location.to_string() });
        }
        Ok(out)
    }

    async fn age(&self, path: &str, now: DateTime<Utc>) -> EngineResult<Option<chrono::Duration>> {
        let Some(bytes) = self.get(path).await? else {
            return Ok(None);
        };
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::storage(format!("parsing {path} for age check: {e}")))?;
        let stamp = value
            .get("fetched_at")
            .or_else(|| value.get("discovered_at"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(stamp.map(|t| now - t))
    }
}

/// Filters out manifests, directory markers, and AI-context entries from a
/// raw `list()` result, mirroring the caller-side filtering §4.1 calls for.
pub fn filter_listable(blobs: Vec<BlobMeta>, exclude_ai_context: bool) -> Vec<BlobMeta> {
    blobs
        .into_iter()
        .filter(|b| !b.path.ends_with(".manifest.json"))
        .filter(|b| !b.path.ends_with('/'))
        .filter(|b| !exclude_ai_context || !b.path.starts_with("ai_context/"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_core::Storage as _;
    use std::sync::Arc;

    fn gateway() -> ObjectStoreGateway {
        ObjectStoreGateway::with_store(Arc::new(object_store::memory::InMemory::new()))
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let gw = gateway();
        gw.put("a/b.json", b"{\"x\":1}".to_vec(), "application/json", None).await.unwrap();
        let got = gw.get("a/b.json").await.unwrap().unwrap();
        assert_eq!(got, b"{\"x\":1}");
    }

    #[tokio::test]
    async fn get_missing_is_none_not_error() {
        let gw = gateway();
        assert!(gw.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_if_absent_refuses_conflict() {
        let gw = gateway();
        assert!(gw.put_if_absent("k", b"1".to_vec(), "application/json").await.unwrap());
        assert!(!gw.put_if_absent("k", b"2".to_vec(), "application/json").await.unwrap());
        assert_eq!(gw.get("k").await.unwrap().unwrap(), b"1");
    }

    #[tokio::test]
    async fn list_filters_manifests_and_ai_context() {
        let blobs = vec![
            BlobMeta { path: "raw-news/2025-02-03/.manifest.json".to_string() },
            BlobMeta { path: "raw-news/2025-02-03/AAPL/a.json".to_string() },
            BlobMeta { path: "ai_context/AAPL/2025-02-03__step1.txt".to_string() },
        ];
        let filtered = filter_listable(blobs, true);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].path, "raw-news/2025-02-03/AAPL/a.json");
    }

    #[tokio::test]
    async fn age_reads_fetched_at_field() {
        let gw = gateway();
        let now = Utc::now();
        let ten_min_ago = now - chrono::Duration::minutes(10);
        let body = serde_json::json!({ "fetched_at": ten_min_ago.to_rfc3339() });
        gw.put("snap.json", serde_json::to_vec(&body).unwrap(), "application/json", None).await.unwrap();
        let age = gw.age("snap.json", now).await.unwrap().unwrap();
        assert!(age.num_seconds() >= 599 && age.num_seconds() <= 601);
    }
}
