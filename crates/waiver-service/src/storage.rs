use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Lowercase, whitespace runs collapsed to `-`, path separators and NUL
/// dropped. Deterministic: the same name always sanitizes the same way.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.trim().chars() {
        if c.is_whitespace() {
            if !last_dash && !out.is_empty() { out.push('-'); last_dash = true; }
        } else if c == '/' || c == '\\' || c == '\0' {
            // dropped
        } else {
            for lc in c.to_lowercase() { out.push(lc); }
            last_dash = false;
        }
    }
    out.trim_end_matches('-').to_string()
}

/// Deterministic artifact key. Consumers depend on this exact layout.
pub fn document_key(checkin_date: NaiveDate, property: &str, activity: &str, name: &str, submission_id: &str) -> String {
    format!(
        "waivers/{:04}/{:02}/{:02}/{}/{}/{}-{}.pdf",
        checkin_date.year(),
        checkin_date.month(),
        checkin_date.day(),
        property,
        activity,
        sanitize_name(name),
        submission_id,
    )
}

#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    async fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

/// In-process store for tests and local hacking. Keys are not persisted.
#[derive(Debug, Default)]
pub struct MemoryStore { objects: tokio::sync::RwLock<HashMap<String, Vec<u8>>> }

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.objects.write().await.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.objects.read().await.get(key).cloned())
    }
}

/// Local directory store. Hierarchical keys map onto subdirectories.
#[derive(Debug, Clone)]
pub struct FsStore { root: PathBuf }

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }
    fn path_for(&self, key: &str) -> PathBuf { self.root.join(key) }
}

#[async_trait]
impl ArtifactStore for FsStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() { tokio::fs::create_dir_all(parent).await?; }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(feature = "s3")]
#[derive(Clone)]
pub struct S3Store { client: aws_sdk_s3::Client, bucket: String }

#[cfg(feature = "s3")]
impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store").field("bucket", &self.bucket).finish()
    }
}

#[cfg(feature = "s3")]
#[async_trait]
impl ArtifactStore for S3Store {
    async fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.client.put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(bytes.to_vec()))
            .send().await?;
        Ok(())
    }
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(out) => Ok(Some(out.body.collect().await?.into_bytes().to_vec())),
            Err(e) => {
                let svc = e.into_service_error();
                if svc.is_no_such_key() { Ok(None) } else { Err(svc.into()) }
            }
        }
    }
}

#[derive(Clone)]
pub struct StorageManager { inner: std::sync::Arc<dyn ArtifactStore> }

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("StorageManager").finish() }
}

impl StorageManager {
    pub async fn from_env() -> Self {
        let mode = std::env::var("WAIVER_STORAGE_MODE").unwrap_or_else(|_| "fs".into());
        if mode.eq_ignore_ascii_case("s3") {
            #[cfg(feature = "s3")]
            {
                let bucket = std::env::var("WAIVER_ARTIFACT_BUCKET").unwrap_or_else(|_| "waivers".into());
                use aws_config::BehaviorVersion;
                let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".into());
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(aws_sdk_s3::config::Region::new(region))
                    .load().await;
                let mut builder = aws_sdk_s3::config::Builder::from(&shared);
                if let Ok(ep) = std::env::var("WAIVER_S3_ENDPOINT_URL") {
                    builder = builder.endpoint_url(ep).force_path_style(true);
                }
                let client = aws_sdk_s3::Client::from_conf(builder.build());
                info!(bucket=%bucket, "storage.init_s3");
                return StorageManager { inner: std::sync::Arc::new(S3Store { client, bucket }) };
            }
            #[cfg(not(feature = "s3"))]
            warn!("s3 feature not enabled, falling back to fs backend");
        }
        if mode.eq_ignore_ascii_case("memory") {
            info!("storage.init_memory");
            return StorageManager { inner: std::sync::Arc::new(MemoryStore::default()) };
        }
        let dir = std::env::var("WAIVER_STORE_DIR").unwrap_or_else(|_| "./data/waivers".into());
        info!(dir=%dir, "storage.init_fs");
        StorageManager { inner: std::sync::Arc::new(FsStore::new(dir)) }
    }

    pub fn store(&self) -> std::sync::Arc<dyn ArtifactStore> { self.inner.clone() }
}

// Global accessor (lazy)
static STORAGE: once_cell::sync::OnceCell<StorageManager> = once_cell::sync::OnceCell::new();

pub async fn get_storage() -> &'static StorageManager {
    if let Some(s) = STORAGE.get() { return s; }
    let mgr = StorageManager::from_env().await;
    STORAGE.set(mgr).ok();
    STORAGE.get().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_exact() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let key = document_key(date, "resort-a", "archery", "John Doe", "abc123");
        assert_eq!(key, "waivers/2024/01/15/resort-a/archery/john-doe-abc123.pdf");
    }

    #[test]
    fn key_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 3).unwrap();
        let a = document_key(date, "resort-b", "kayaking", "Ana Maria Silva", "id9");
        let b = document_key(date, "resort-b", "kayaking", "Ana Maria Silva", "id9");
        assert_eq!(a, b);
        assert!(a.starts_with("waivers/2025/12/03/resort-b/kayaking/"));
    }

    #[test]
    fn sanitize_handles_awkward_names() {
        assert_eq!(sanitize_name("John Doe"), "john-doe");
        assert_eq!(sanitize_name("  Ana   Maria  "), "ana-maria");
        assert_eq!(sanitize_name("O'Brien/Jr"), "o'brienjr");
        assert_eq!(sanitize_name("MIXED Case"), "mixed-case");
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStore::default();
        store.put("waivers/a/b.pdf", b"bytes").await.unwrap();
        assert_eq!(store.get("waivers/a/b.pdf").await.unwrap().as_deref(), Some(&b"bytes"[..]));
        assert!(store.get("waivers/missing.pdf").await.unwrap().is_none());
    }
}
